// ============================================================================
// PIXEL FILTERS — levels and contrast over an RGBA buffer
// ============================================================================
//
// Levels multiplies each colour channel by `levels²`; contrast stretches the
// channel around the mid-grey point.  Both are composed in floating point and
// only rounded/clamped when written back to bytes.  Alpha is never touched.
// ============================================================================

use rayon::prelude::*;

/// Contrast multiplier for a raw contrast value in `[-1, 1]`.
pub fn contrast_factor(contrast: f64) -> f64 {
    let f = (contrast * 100.0 + 100.0) / 100.0;
    f * f
}

/// Apply levels then contrast to one channel value, without clamping.
///
/// `levels_scaled` is the engine-side levels value (twice the raw setting).
pub fn adjust_channel(value: f64, levels_scaled: f64, contrast: f64) -> f64 {
    let mut v = value;
    if levels_scaled != 0.0 {
        v *= levels_scaled * levels_scaled;
    }
    if contrast != 0.0 {
        v = ((v / 255.0 - 0.5) * contrast_factor(contrast) + 0.5) * 255.0;
    }
    v
}

/// Filter a row-major RGBA buffer of `width × height` pixels in place.
///
/// A no-op (buffer left byte-identical) when both parameters are zero.
pub fn apply_filters(buf: &mut [u8], width: u32, height: u32, levels_scaled: f64, contrast: f64) {
    if levels_scaled == 0.0 && contrast == 0.0 {
        return;
    }
    let stride = width as usize * 4;
    if stride == 0 {
        return;
    }
    let len = (stride * height as usize).min(buf.len());

    buf[..len].par_chunks_mut(stride).for_each(|row| {
        for px in row.chunks_exact_mut(4) {
            for c in &mut px[..3] {
                let v = adjust_channel(*c as f64, levels_scaled, contrast);
                *c = v.round().clamp(0.0, 255.0) as u8;
            }
        }
    });
}
