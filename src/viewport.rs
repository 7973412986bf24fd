// ============================================================================
// VIEWPORT CONTROLLER — zoom, scrolling, frame loop and input translation
// ============================================================================
//
// Two coordinate spaces meet here:
//   * scaled    — on-screen pixels; the canvas extent and viewport live here.
//   * unscaled  — document units = scaled / zoom_factor.
//
// The frame surface's context is pre-scaled by the zoom factor once (when the
// zoom changes), so everything handed to scene nodes per frame is unscaled.
// ============================================================================

use image::Rgba;
use kurbo::{Affine, Point, Rect, Size};

use crate::document::Document;
use crate::geometry::pixel_extent;
use crate::scene::{InteractionEvent, InteractionKind, Scene};
use crate::settings::EngineSettings;
use crate::surface::Surface;

/// Visible scroll window over the canvas.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Viewport {
    pub left: f64,
    pub top: f64,
    pub width: f64,
    pub height: f64,
}

impl Viewport {
    /// Every field divided by `zoom`.
    pub fn unscaled(&self, zoom: f64) -> Viewport {
        Viewport {
            left: self.left / zoom,
            top: self.top / zoom,
            width: self.width / zoom,
            height: self.height / zoom,
        }
    }

    pub fn rect(&self) -> Rect {
        Rect::new(self.left, self.top, self.left + self.width, self.top + self.height)
    }
}

/// Per-frame hook that replaces the default child `update` pass.
pub type UpdateHook = Box<dyn FnMut(&mut Scene, f64)>;

pub struct ViewportController {
    /// Full canvas extent in scaled pixels.
    width: f64,
    height: f64,
    zoom_factor: f64,
    base_transform: Affine,
    document_scale: f64,
    /// Size of the on-screen window; `None` shows the whole canvas.
    requested_viewport: Option<Size>,
    viewport: Viewport,
    /// Canvas position on the page, for touch input.
    screen_offset: Point,
    wheel_pan_step: f64,
    background: Option<Rgba<u8>>,

    scene: Scene,
    frame: Surface,
    update_hook: Option<UpdateHook>,
    pending_resize: Option<(f64, f64)>,
    render_interval: f64,
    last_render: f64,
    animate: bool,
    frame_pending: bool,
    disposed: bool,
}

impl ViewportController {
    pub fn new(width: f64, height: f64, settings: &EngineSettings) -> Self {
        let mut ctrl = Self {
            width: 0.0,
            height: 0.0,
            zoom_factor: 1.0,
            base_transform: Affine::IDENTITY,
            document_scale: 1.0,
            requested_viewport: None,
            viewport: Viewport::default(),
            screen_offset: Point::ZERO,
            wheel_pan_step: settings.wheel_pan_step,
            background: settings.background,
            scene: Scene::new(),
            frame: Surface::default(),
            update_hook: None,
            pending_resize: None,
            render_interval: settings.render_interval(),
            last_render: 0.0,
            animate: settings.animate,
            frame_pending: false,
            disposed: false,
        };
        ctrl.set_dimensions(width, height);
        ctrl
    }

    // ---- accessors ----------------------------------------------------------

    pub fn width(&self) -> f64 { self.width }
    pub fn height(&self) -> f64 { self.height }
    pub fn zoom_factor(&self) -> f64 { self.zoom_factor }
    pub fn document_scale(&self) -> f64 { self.document_scale }
    pub fn viewport(&self) -> Viewport { self.viewport }
    pub fn frame(&self) -> &Surface { &self.frame }
    pub fn scene(&self) -> &Scene { &self.scene }
    pub fn scene_mut(&mut self) -> &mut Scene { &mut self.scene }
    /// Whether a frame has been requested, either directly or by a scene
    /// change such as a freshly published layer bitmap.
    pub fn is_frame_pending(&self) -> bool {
        !self.disposed && (self.frame_pending || self.scene.is_invalidated())
    }
    pub fn is_disposed(&self) -> bool { self.disposed }
    pub fn last_render(&self) -> f64 { self.last_render }

    // ---- geometry -----------------------------------------------------------

    /// Resize the canvas extent.  The viewport shrinks to fit and the scroll
    /// position is clamped to the new range.
    pub fn set_dimensions(&mut self, width: f64, height: f64) {
        self.width = width.max(0.0);
        self.height = height.max(0.0);
        let (vw, vh) = match self.requested_viewport {
            Some(size) => (size.width.min(self.width), size.height.min(self.height)),
            None => (self.width, self.height),
        };
        self.viewport.width = vw;
        self.viewport.height = vh;
        let (left, top) = (self.viewport.left, self.viewport.top);
        self.pan_viewport(left, top);
        self.invalidate();
    }

    /// Defer a resize to the start of the next frame.
    pub fn request_resize(&mut self, width: f64, height: f64) {
        self.pending_resize = Some((width, height));
        self.invalidate();
    }

    /// Size of the on-screen window, or `None` to show the whole canvas.
    pub fn set_viewport_size(&mut self, size: Option<Size>) {
        self.requested_viewport = size;
        self.set_dimensions(self.width, self.height);
    }

    /// Set the uniform zoom; the frame context's base scale is fixed here.
    pub fn set_zoom_factor(&mut self, zoom: f64) {
        if !zoom.is_finite() || zoom <= 0.0 {
            log_warn!("Ignoring invalid zoom factor {}", zoom);
            return;
        }
        self.zoom_factor = zoom;
        self.base_transform = Affine::scale(zoom);
        self.invalidate();
    }

    /// Scrollable range in scaled pixels.
    pub fn scroll_extent(&self) -> Size {
        Size::new(
            (self.width - self.viewport.width).max(0.0),
            (self.height - self.viewport.height).max(0.0),
        )
    }

    /// Scroll to `(left, top)`, clamped to the scroll range.
    pub fn pan_viewport(&mut self, left: f64, top: f64) {
        let extent = self.scroll_extent();
        let clamp = |v: f64, max: f64| if v.is_finite() { v.clamp(0.0, max) } else { 0.0 };
        self.viewport.left = clamp(left, extent.width);
        self.viewport.top = clamp(top, extent.height);
        self.invalidate();
    }

    /// Resize to `(target_width, target_height)` at zoom `scale * zoom` while
    /// keeping the relative scroll position.  Nothing scrollable counts as
    /// centred.
    pub fn set_document_scale(
        &mut self,
        target_width: f64,
        target_height: f64,
        scale: f64,
        zoom: f64,
        active_document: Option<&Document>,
    ) {
        let ratio = |offset: f64, total: f64, visible: f64| {
            let denom = total - visible;
            if denom == 0.0 { 0.5 } else { offset / denom }
        };
        let ratio_x = ratio(self.viewport.left, self.width, self.viewport.width);
        let ratio_y = ratio(self.viewport.top, self.height, self.viewport.height);

        self.set_dimensions(target_width, target_height);
        self.set_zoom_factor(scale * zoom);

        let extent = self.scroll_extent();
        self.pan_viewport(extent.width * ratio_x, extent.height * ratio_y);

        if let Some(doc) = active_document {
            if self.width > 0.0 {
                self.document_scale = doc.width as f64 / self.width;
            }
        }
    }

    pub fn set_screen_offset(&mut self, x: f64, y: f64) {
        self.screen_offset = Point::new(x, y);
    }

    // ---- frame loop ---------------------------------------------------------

    pub fn set_animate(&mut self, animate: bool) {
        self.animate = animate;
        if animate {
            self.invalidate();
        }
    }

    /// Replace the per-frame `update` pass over children.
    pub fn set_update_hook(&mut self, hook: Option<UpdateHook>) {
        self.update_hook = hook;
    }

    /// Request a frame.  At most one frame is ever pending.
    pub fn invalidate(&mut self) {
        if !self.disposed {
            self.frame_pending = true;
        }
    }

    /// Stop rendering and release the frame surface and scene.
    pub fn dispose(&mut self) {
        self.disposed = true;
        self.frame_pending = false;
        self.animate = false;
        self.update_hook = None;
        self.frame = Surface::default();
        self.scene = Scene::new();
    }

    /// Render one frame at wall-clock time `now` (milliseconds).
    ///
    /// Returns whether another frame was scheduled.
    pub fn render_frame(&mut self, now: f64) -> bool {
        if self.disposed {
            return false;
        }
        let delta = now - self.last_render;
        self.last_render = if self.render_interval > 0.0 && delta.is_finite() {
            now - delta.rem_euclid(self.render_interval)
        } else {
            now
        };

        if let Some((w, h)) = self.pending_resize.take() {
            self.set_dimensions(w, h);
        }

        let zoom = self.zoom_factor;
        let unscaled_width = self.width / zoom;
        let unscaled_height = self.height / zoom;
        let viewport = self.viewport.unscaled(zoom);

        self.frame
            .ensure_capacity(pixel_extent(self.viewport.width), pixel_extent(self.viewport.height));
        {
            let mut ctx = self.frame.context_with_transform(self.base_transform);
            match self.background {
                Some(color) => ctx.fill_rect(Rect::new(0.0, 0.0, unscaled_width, unscaled_height), color),
                None => ctx.clear(),
            }

            match self.update_hook.as_mut() {
                Some(hook) => hook(&mut self.scene, now),
                None => self.scene.update_all(now),
            }
            self.scene.draw_all(&mut ctx, &viewport);
        }
        self.scene.take_invalidated();
        self.frame_pending = false;

        if self.animate && !self.disposed && !self.frame_pending {
            self.frame_pending = true;
        }
        self.frame_pending
    }

    // ---- input --------------------------------------------------------------

    /// Map a page coordinate into document space.
    pub fn pointer_to_document(&self, page_x: f64, page_y: f64) -> Point {
        let local_x = page_x - self.screen_offset.x;
        let local_y = page_y - self.screen_offset.y;
        Point::new(
            (local_x + self.viewport.left) / self.zoom_factor,
            (local_y + self.viewport.top) / self.zoom_factor,
        )
    }

    /// Dispatch a pointer event topmost-first.  Returns whether a child
    /// handled it.
    pub fn handle_pointer(&mut self, kind: InteractionKind, page_x: f64, page_y: f64) -> bool {
        let p = self.pointer_to_document(page_x, page_y);
        let event = InteractionEvent::Pointer { kind, x: p.x, y: p.y };
        let handled = self.scene.dispatch_topmost(p.x, p.y, &event);
        if handled {
            self.invalidate();
        }
        handled
    }

    /// Dispatch every touch point to every child.
    pub fn handle_touch(&mut self, kind: InteractionKind, touches: &[Point]) -> bool {
        let mapped: Vec<Point> = touches
            .iter()
            .map(|t| self.pointer_to_document(t.x, t.y))
            .collect();
        let event = InteractionEvent::Touch { kind, touches: mapped.clone() };
        let mut handled = false;
        for p in &mapped {
            handled |= self.scene.dispatch_all(p.x, p.y, &event);
        }
        if handled {
            self.invalidate();
        }
        handled
    }

    /// Pan by a fixed step in the direction of each wheel delta.
    pub fn handle_wheel(&mut self, delta_x: f64, delta_y: f64) {
        let sign = |d: f64| {
            if d > 0.0 {
                1.0
            } else if d < 0.0 {
                -1.0
            } else {
                0.0
            }
        };
        let left = self.viewport.left + self.wheel_pan_step * sign(delta_x);
        let top = self.viewport.top + self.wheel_pan_step * sign(delta_y);
        self.pan_viewport(left, top);
    }
}
