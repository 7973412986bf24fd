// ============================================================================
// LAYER TRANSFORM — mirror / rotation draw into a rotated bounding box
// ============================================================================

use image::RgbaImage;
use kurbo::{Point, Size};

use crate::document::{Effects, Layer, Mask};
use crate::geometry::rotation_pivot;
use crate::ops::mask::composite_mask;
use crate::surface::DrawContext;

/// Whether a layer has to go through [`render_transformed_source`] instead of
/// a plain draw at the origin.
pub fn needs_transform(layer: &Layer) -> bool {
    layer.mask().is_some() || !layer.effects().is_identity()
}

/// Draw `source` into `ctx` with the layer's mirror flags and rotation.
///
/// `layer_size` is the layer's stored (unrotated) size and `bounds` the size of
/// the rotated bounding box the context covers.  When a mask is given it is
/// applied right after the source, under the same transform, so it mirrors and
/// rotates with the layer.
///
/// Returns the offset the source was drawn at (in transformed user space).
pub fn render_transformed_source(
    ctx: &mut DrawContext<'_>,
    source: &RgbaImage,
    layer_size: Size,
    bounds: Size,
    effects: &Effects,
    mask: Option<&Mask>,
) -> Point {
    let mut ctx = ctx.scoped();

    let sx = if effects.mirror_x { -1.0 } else { 1.0 };
    let sy = if effects.mirror_y { -1.0 } else { 1.0 };
    ctx.scale(sx, sy);

    // A mirrored axis runs from -dimension to 0.
    let mut target = Point::new(
        if effects.mirror_x { -bounds.width } else { 0.0 },
        if effects.mirror_y { -bounds.height } else { 0.0 },
    );

    let rotation = effects.normalized_rotation();
    if rotation != 0.0 {
        let pivot = rotation_pivot(0.0, 0.0, sx * bounds.width, sy * bounds.height);
        ctx.translate(pivot.x, pivot.y);
        ctx.rotate(rotation);
        ctx.translate(-pivot.x, -pivot.y);
        target = Point::new(
            pivot.x - layer_size.width * 0.5,
            pivot.y - layer_size.height * 0.5,
        );
    }

    ctx.draw_image(source, target.x, target.y);
    if let Some(mask) = mask {
        composite_mask(&mut ctx, mask, target.x, target.y);
    }
    target
}
