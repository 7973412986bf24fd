// ============================================================================
// DRAWING SURFACE — owned RGBA surface + 2D context with a state stack
// ============================================================================

use std::ops::{Deref, DerefMut};

use image::{Rgba, RgbaImage};
use kurbo::{Affine, BezPath, Point, Rect, Shape};
use rayon::prelude::*;

/// An owned RGBA pixel surface.  Reused across renders via
/// [`Surface::ensure_capacity`].
#[derive(Clone, Debug)]
pub struct Surface {
    image: RgbaImage,
}

impl Default for Surface {
    fn default() -> Self {
        Self::new(0, 0)
    }
}

impl Surface {
    /// Create a fully transparent surface.
    pub fn new(width: u32, height: u32) -> Self {
        Self { image: RgbaImage::new(width, height) }
    }

    pub fn from_image(image: RgbaImage) -> Self {
        Self { image }
    }

    pub fn width(&self) -> u32 { self.image.width() }

    pub fn height(&self) -> u32 { self.image.height() }

    pub fn image(&self) -> &RgbaImage { &self.image }

    pub fn image_mut(&mut self) -> &mut RgbaImage { &mut self.image }

    pub fn into_image(self) -> RgbaImage { self.image }

    /// Resize to `width × height`, reusing the existing pixel allocation when
    /// it is large enough.  Returns `true` when a new allocation was needed.
    ///
    /// Pixel contents are unspecified after a resize; callers clear first.
    pub fn ensure_capacity(&mut self, width: u32, height: u32) -> bool {
        if self.image.width() == width && self.image.height() == height {
            return false;
        }
        let needed = width as usize * height as usize * 4;
        let mut buf = std::mem::take(&mut self.image).into_raw();
        let reallocated = needed > buf.capacity();
        buf.clear();
        buf.resize(needed, 0);
        self.image = RgbaImage::from_raw(width, height, buf)
            .unwrap_or_else(|| RgbaImage::new(width, height));
        reallocated
    }

    /// Make every pixel fully transparent.
    pub fn clear(&mut self) {
        let raw: &mut [u8] = &mut self.image;
        raw.fill(0);
    }

    /// A drawing context with the identity transform.
    pub fn context(&mut self) -> DrawContext<'_> {
        DrawContext::new(&mut self.image, Affine::IDENTITY)
    }

    /// A drawing context whose base transform is `base` (e.g. a zoom or
    /// device-pixel-ratio scale applied once for the lifetime of the context).
    pub fn context_with_transform(&mut self, base: Affine) -> DrawContext<'_> {
        DrawContext::new(&mut self.image, base)
    }
}

// ---------------------------------------------------------------------------
//  Context state
// ---------------------------------------------------------------------------

/// How drawn pixels combine with what is already on the surface.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum CompositeOp {
    /// Normal alpha compositing.
    #[default]
    SourceOver,
    /// Keep the destination only where the source is opaque; everything the
    /// source does not cover becomes transparent.
    DestinationIn,
}

#[derive(Clone, Debug)]
struct DrawState {
    transform: Affine,
    composite: CompositeOp,
    /// Clip paths in device space.  A pixel is drawable when its centre lies
    /// inside every path (nonzero winding).
    clips: Vec<BezPath>,
}

/// 2D drawing context over a borrowed RGBA image.
///
/// Transform, composite operation and clip form a save/restore-able state.
/// Image draws sample the source at pixel centres (nearest neighbour), which
/// keeps mirror and right-angle rotations exact.
pub struct DrawContext<'a> {
    target: &'a mut RgbaImage,
    state: DrawState,
    stack: Vec<DrawState>,
}

impl<'a> DrawContext<'a> {
    fn new(target: &'a mut RgbaImage, base: Affine) -> Self {
        Self {
            target,
            state: DrawState {
                transform: base,
                composite: CompositeOp::SourceOver,
                clips: Vec::new(),
            },
            stack: Vec::new(),
        }
    }

    pub fn width(&self) -> u32 { self.target.width() }

    pub fn height(&self) -> u32 { self.target.height() }

    // ---- state --------------------------------------------------------------

    /// Push the current state.
    pub fn save(&mut self) {
        self.stack.push(self.state.clone());
    }

    /// Pop the most recently saved state (no-op on an empty stack).
    pub fn restore(&mut self) {
        if let Some(s) = self.stack.pop() {
            self.state = s;
        }
    }

    /// Save the state and return a guard that restores it when dropped.
    ///
    /// Unbalanced `save` calls made through the guard are unwound as well, so
    /// the context always comes back exactly as it was.
    pub fn scoped(&mut self) -> StateGuard<'_, 'a> {
        self.save();
        let depth = self.stack.len();
        StateGuard { ctx: self, depth }
    }

    pub fn transform(&self) -> Affine { self.state.transform }

    pub fn composite(&self) -> CompositeOp { self.state.composite }

    pub fn set_composite(&mut self, op: CompositeOp) {
        self.state.composite = op;
    }

    pub fn translate(&mut self, x: f64, y: f64) {
        self.state.transform = self.state.transform * Affine::translate((x, y));
    }

    pub fn scale(&mut self, sx: f64, sy: f64) {
        self.state.transform = self.state.transform * Affine::scale_non_uniform(sx, sy);
    }

    pub fn rotate(&mut self, radians: f64) {
        self.state.transform = self.state.transform * Affine::rotate(radians);
    }

    /// Intersect the clip with a closed polygon given in user space.  The first
    /// point starts the path, the rest are line segments, and the path closes.
    pub fn clip_polygon(&mut self, points: &[Point]) {
        let mut path = BezPath::new();
        if let Some((first, rest)) = points.split_first() {
            path.move_to(*first);
            for p in rest {
                path.line_to(*p);
            }
            path.close_path();
        }
        path.apply_affine(self.state.transform);
        self.state.clips.push(path);
    }

    fn clip_allows(clips: &[BezPath], device: Point) -> bool {
        clips.iter().all(|c| c.winding(device) != 0)
    }

    // ---- raster ops ---------------------------------------------------------

    /// Make the whole target transparent, ignoring transform and clip.
    pub fn clear(&mut self) {
        let raw: &mut [u8] = &mut *self.target;
        raw.fill(0);
    }

    /// Overwrite every device pixel whose centre lies in the user-space `rect`
    /// (and in the clip) with `color`.
    pub fn fill_rect(&mut self, rect: Rect, color: Rgba<u8>) {
        let (tw, th) = (self.target.width(), self.target.height());
        let bbox = self.state.transform.transform_rect_bbox(rect);
        let Some((x0, y0, x1, y1)) = device_span(bbox, tw, th) else { return };
        let inv = self.state.transform.inverse();
        let clips = &self.state.clips;
        let stride = tw as usize * 4;
        let raw: &mut [u8] = &mut *self.target;
        raw[y0 as usize * stride..y1 as usize * stride]
            .par_chunks_mut(stride)
            .enumerate()
            .for_each(|(i, row)| {
                let py = (y0 as usize + i) as f64 + 0.5;
                for px in x0..x1 {
                    let device = Point::new(px as f64 + 0.5, py);
                    if !rect.contains(inv * device) || !Self::clip_allows(clips, device) {
                        continue;
                    }
                    let off = px as usize * 4;
                    row[off..off + 4].copy_from_slice(&color.0);
                }
            });
    }

    /// Transparent variant of [`DrawContext::fill_rect`].
    pub fn clear_rect(&mut self, rect: Rect) {
        self.fill_rect(rect, Rgba([0, 0, 0, 0]));
    }

    /// Draw `image` with its top-left corner at user-space `(x, y)`.
    pub fn draw_image(&mut self, image: &RgbaImage, x: f64, y: f64) {
        let (tw, th) = (self.target.width(), self.target.height());
        if tw == 0 || th == 0 {
            return;
        }
        let to_device = self.state.transform * Affine::translate((x, y));
        if to_device.determinant().abs() < 1e-12 {
            return;
        }
        let to_image = to_device.inverse();
        let (iw, ih) = (image.width(), image.height());
        let composite = self.state.composite;

        let span = match composite {
            CompositeOp::SourceOver => {
                if iw == 0 || ih == 0 {
                    return;
                }
                let bbox = to_device.transform_rect_bbox(Rect::new(0.0, 0.0, iw as f64, ih as f64));
                device_span(bbox, tw, th)
            }
            // Pixels outside the source are affected too (they are cleared).
            CompositeOp::DestinationIn => Some((0, 0, tw, th)),
        };
        let Some((x0, y0, x1, y1)) = span else { return };

        let clips = &self.state.clips;
        let src_raw = image.as_raw();
        let src_stride = iw as usize * 4;
        let sample = |p: Point| -> [u8; 4] {
            let sx = p.x.floor();
            let sy = p.y.floor();
            if sx < 0.0 || sy < 0.0 || sx >= iw as f64 || sy >= ih as f64 {
                return [0, 0, 0, 0];
            }
            let off = sy as usize * src_stride + sx as usize * 4;
            [src_raw[off], src_raw[off + 1], src_raw[off + 2], src_raw[off + 3]]
        };

        let stride = tw as usize * 4;
        let raw: &mut [u8] = &mut *self.target;
        raw[y0 as usize * stride..y1 as usize * stride]
            .par_chunks_mut(stride)
            .enumerate()
            .for_each(|(i, row)| {
                let py = (y0 as usize + i) as f64 + 0.5;
                for px in x0..x1 {
                    let device = Point::new(px as f64 + 0.5, py);
                    if !Self::clip_allows(clips, device) {
                        continue;
                    }
                    let src = sample(to_image * device);
                    let off = px as usize * 4;
                    let dst = Rgba([row[off], row[off + 1], row[off + 2], row[off + 3]]);
                    let out = match composite {
                        CompositeOp::SourceOver => alpha_blend(dst, Rgba(src)),
                        CompositeOp::DestinationIn => destination_in(dst, src[3]),
                    };
                    row[off..off + 4].copy_from_slice(&out.0);
                }
            });
    }

    /// Stroke the outline of a closed polygon with a one-device-pixel line.
    /// The clip applies; the composite operation does not.
    pub fn stroke_polygon(&mut self, points: &[Point], color: Rgba<u8>) {
        if points.len() < 2 {
            return;
        }
        let (tw, th) = (self.target.width() as i64, self.target.height() as i64);
        let device: Vec<Point> = points.iter().map(|p| self.state.transform * *p).collect();
        let bounds = Rect::new(-1.0, -1.0, tw as f64 + 1.0, th as f64 + 1.0);
        for (i, start) in device.iter().enumerate() {
            let end = device[(i + 1) % device.len()];
            let Some((a, b)) = clip_segment(*start, end, bounds) else { continue };
            let steps = (a.distance(b) * 2.0).ceil().max(1.0) as usize;
            for s in 0..=steps {
                let p = a.lerp(b, s as f64 / steps as f64);
                let (px, py) = (p.x.floor() as i64, p.y.floor() as i64);
                if px < 0 || py < 0 || px >= tw || py >= th {
                    continue;
                }
                let centre = Point::new(px as f64 + 0.5, py as f64 + 0.5);
                if !Self::clip_allows(&self.state.clips, centre) {
                    continue;
                }
                let dst = *self.target.get_pixel(px as u32, py as u32);
                self.target.put_pixel(px as u32, py as u32, alpha_blend(dst, color));
            }
        }
    }
}

/// Restores the saved [`DrawContext`] state on drop.
pub struct StateGuard<'c, 'a> {
    ctx: &'c mut DrawContext<'a>,
    depth: usize,
}

impl<'a> Deref for StateGuard<'_, 'a> {
    type Target = DrawContext<'a>;
    fn deref(&self) -> &Self::Target { self.ctx }
}

impl DerefMut for StateGuard<'_, '_> {
    fn deref_mut(&mut self) -> &mut Self::Target { self.ctx }
}

impl Drop for StateGuard<'_, '_> {
    fn drop(&mut self) {
        self.ctx.stack.truncate(self.depth);
        self.ctx.restore();
    }
}

/// Clamp a device-space bounding box to whole pixel rows/columns of the
/// target.  `None` when nothing remains.
fn device_span(bbox: Rect, tw: u32, th: u32) -> Option<(u32, u32, u32, u32)> {
    let x0 = bbox.x0.floor().max(0.0);
    let y0 = bbox.y0.floor().max(0.0);
    let x1 = bbox.x1.ceil().min(tw as f64);
    let y1 = bbox.y1.ceil().min(th as f64);
    if !(x0 < x1 && y0 < y1) {
        return None;
    }
    Some((x0 as u32, y0 as u32, x1 as u32, y1 as u32))
}

/// Liang-Barsky clip of the segment `a..b` to `rect`.  `None` when the
/// segment misses it or has non-finite ends.
fn clip_segment(a: Point, b: Point, rect: Rect) -> Option<(Point, Point)> {
    if !(a.is_finite() && b.is_finite()) {
        return None;
    }
    let d = b - a;
    let (mut t0, mut t1) = (0.0f64, 1.0f64);
    for (p, q) in [
        (-d.x, a.x - rect.x0),
        (d.x, rect.x1 - a.x),
        (-d.y, a.y - rect.y0),
        (d.y, rect.y1 - a.y),
    ] {
        if p == 0.0 {
            if q < 0.0 {
                return None;
            }
            continue;
        }
        let t = q / p;
        if p < 0.0 {
            t0 = t0.max(t);
        } else {
            t1 = t1.min(t);
        }
        if t0 > t1 {
            return None;
        }
    }
    Some((a.lerp(b, t0), a.lerp(b, t1)))
}

/// Source-over on unpremultiplied RGBA.
pub fn alpha_blend(dst: Rgba<u8>, src: Rgba<u8>) -> Rgba<u8> {
    if src[3] == 0 { return dst; }
    if src[3] == 255 || dst[3] == 0 { return src; }
    let sa = src[3] as f32 / 255.0;
    let da = dst[3] as f32 / 255.0;
    let out_a = sa + da * (1.0 - sa);
    if out_a < 0.001 { return Rgba([0, 0, 0, 0]); }
    let inv = 1.0 / out_a;
    let mix = |s: u8, d: u8| -> u8 {
        ((s as f32 * sa + d as f32 * da * (1.0 - sa)) * inv).round().clamp(0.0, 255.0) as u8
    };
    Rgba([
        mix(src[0], dst[0]),
        mix(src[1], dst[1]),
        mix(src[2], dst[2]),
        (out_a * 255.0).round().clamp(0.0, 255.0) as u8,
    ])
}

/// Destination-in on unpremultiplied RGBA: colour kept, alpha scaled by the
/// source coverage.
fn destination_in(dst: Rgba<u8>, src_alpha: u8) -> Rgba<u8> {
    let a = (dst[3] as u32 * src_alpha as u32 + 127) / 255;
    if a == 0 {
        return Rgba([0, 0, 0, 0]);
    }
    Rgba([dst[0], dst[1], dst[2], a as u8])
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::FRAC_PI_2;

    const RED: Rgba<u8> = Rgba([255, 0, 0, 255]);
    const BLUE: Rgba<u8> = Rgba([0, 0, 255, 255]);

    fn marked(w: u32, h: u32) -> RgbaImage {
        let mut img = RgbaImage::from_pixel(w, h, BLUE);
        img.put_pixel(0, 0, RED);
        img
    }

    #[test]
    fn ensure_capacity_reuses_storage() {
        let mut s = Surface::new(10, 10);
        assert!(!s.ensure_capacity(10, 10));
        assert!(!s.ensure_capacity(5, 5));
        assert_eq!((s.width(), s.height()), (5, 5));
        assert!(s.ensure_capacity(20, 20));
        assert_eq!(s.image().as_raw().len(), 20 * 20 * 4);
    }

    #[test]
    fn guard_restores_transform_and_composite() {
        let mut s = Surface::new(4, 4);
        let mut ctx = s.context();
        {
            let mut g = ctx.scoped();
            g.translate(3.0, 1.0);
            g.set_composite(CompositeOp::DestinationIn);
            g.save(); // left unbalanced on purpose
            g.scale(2.0, 2.0);
        }
        assert_eq!(ctx.transform(), Affine::IDENTITY);
        assert_eq!(ctx.composite(), CompositeOp::SourceOver);
    }

    #[test]
    fn mirrored_draw_lands_on_opposite_edge() {
        let mut s = Surface::new(8, 3);
        {
            let mut ctx = s.context();
            ctx.scale(-1.0, 1.0);
            ctx.draw_image(&marked(8, 3), -8.0, 0.0);
        }
        assert_eq!(*s.image().get_pixel(7, 0), RED);
        assert_eq!(*s.image().get_pixel(0, 0), BLUE);
    }

    #[test]
    fn quarter_turn_is_exact() {
        let mut s = Surface::new(4, 4);
        {
            let mut ctx = s.context();
            ctx.translate(2.0, 2.0);
            ctx.rotate(FRAC_PI_2);
            ctx.translate(-2.0, -2.0);
            ctx.draw_image(&marked(4, 4), 0.0, 0.0);
        }
        assert_eq!(*s.image().get_pixel(3, 0), RED);
        let reds = s.image().pixels().filter(|p| **p == RED).count();
        assert_eq!(reds, 1);
    }

    #[test]
    fn destination_in_clears_uncovered_pixels() {
        let mut s = Surface::from_image(RgbaImage::from_pixel(4, 4, BLUE));
        let mask = RgbaImage::from_pixel(2, 2, Rgba([0, 0, 0, 255]));
        {
            let mut ctx = s.context();
            ctx.set_composite(CompositeOp::DestinationIn);
            ctx.draw_image(&mask, 1.0, 1.0);
        }
        assert_eq!(*s.image().get_pixel(1, 1), BLUE);
        assert_eq!(*s.image().get_pixel(2, 2), BLUE);
        assert_eq!(*s.image().get_pixel(0, 0), Rgba([0, 0, 0, 0]));
        assert_eq!(*s.image().get_pixel(3, 3), Rgba([0, 0, 0, 0]));
    }

    #[test]
    fn polygon_clip_limits_draw() {
        let mut s = Surface::new(10, 10);
        {
            let mut ctx = s.context();
            ctx.clip_polygon(&[
                Point::new(0.0, 0.0),
                Point::new(5.0, 0.0),
                Point::new(5.0, 5.0),
                Point::new(0.0, 5.0),
            ]);
            ctx.draw_image(&RgbaImage::from_pixel(10, 10, RED), 0.0, 0.0);
        }
        assert_eq!(*s.image().get_pixel(4, 4), RED);
        assert_eq!(s.image().get_pixel(5, 5)[3], 0);
    }

    #[test]
    fn fill_rect_uses_user_units() {
        let mut s = Surface::new(8, 8);
        {
            let mut ctx = s.context_with_transform(Affine::scale(2.0));
            ctx.fill_rect(Rect::new(0.0, 0.0, 2.0, 2.0), RED);
        }
        assert_eq!(*s.image().get_pixel(3, 3), RED);
        assert_eq!(s.image().get_pixel(4, 4)[3], 0);
    }

    #[test]
    fn huge_outline_only_touches_visible_pixels() {
        let mut s = Surface::new(6, 6);
        let far = 1e12;
        let square = [
            Point::new(1.0, 1.0),
            Point::new(far, 1.0),
            Point::new(far, far),
            Point::new(1.0, far),
        ];
        s.context().stroke_polygon(&square, RED);
        assert_eq!(*s.image().get_pixel(5, 1), RED);
        assert_eq!(*s.image().get_pixel(1, 5), RED);
        assert_eq!(s.image().get_pixel(3, 3)[3], 0);
    }

    #[test]
    fn segment_clip_drops_misses() {
        let r = Rect::new(0.0, 0.0, 10.0, 10.0);
        assert!(clip_segment(Point::new(-5.0, 20.0), Point::new(30.0, 20.0), r).is_none());
        assert_eq!(
            clip_segment(Point::new(-10.0, 5.0), Point::new(20.0, 5.0), r),
            Some((Point::new(0.0, 5.0), Point::new(10.0, 5.0)))
        );
    }

    #[test]
    fn alpha_blend_half_over_opaque() {
        let out = alpha_blend(Rgba([0, 0, 0, 255]), Rgba([255, 255, 255, 128]));
        assert_eq!(out[3], 255);
        assert!((out[0] as i32 - 128).abs() <= 1);
    }
}
