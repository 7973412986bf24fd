// ============================================================================
// LAYER MASK — destination-in compositing of a mask bitmap
// ============================================================================

use crate::document::Mask;
use crate::surface::{CompositeOp, DrawContext};

/// Cut the already-drawn layer content down to the mask.
///
/// The mask is positioned at `(mask.x, mask.y)` relative to the point the
/// source was drawn at (`target_x`, `target_y`).  Destination alpha is scaled
/// by the mask's alpha where the mask covers it; everything else becomes fully
/// transparent.  The context state is left as it was found.
pub fn composite_mask(ctx: &mut DrawContext<'_>, mask: &Mask, target_x: f64, target_y: f64) {
    let mut ctx = ctx.scoped();
    ctx.translate(target_x, target_y);
    ctx.set_composite(CompositeOp::DestinationIn);
    ctx.draw_image(&mask.bitmap, mask.x, mask.y);
}
