// ============================================================================
// TEXT LAYERS — font loading, line layout and glyph rasterization
// ============================================================================

use std::collections::HashMap;

use ab_glyph::{point, Font, FontArc, GlyphId, ScaleFont};
use image::{Rgba, RgbaImage};

use crate::document::{Layer, LayerKind, TextDescriptor};
use crate::surface::alpha_blend;

/// Why a font family could not be provided.
#[derive(Debug)]
pub enum FontLoadError {
    /// No installed font matches the family.
    NotFound(String),
    /// A match was found but its data could not be read or parsed.
    InvalidData(String),
}

impl std::fmt::Display for FontLoadError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FontLoadError::NotFound(family) => write!(f, "font family '{}' not found", family),
            FontLoadError::InvalidData(family) => write!(f, "font family '{}' has unreadable data", family),
        }
    }
}

impl std::error::Error for FontLoadError {}

/// Source of font faces by family name.
///
/// Loading may suspend (remote or lazily indexed sources), so it is async.
#[allow(async_fn_in_trait)]
pub trait FontLoader {
    async fn load(&self, family: &str) -> Result<FontArc, FontLoadError>;
}

/// Looks fonts up in the operating system's installed fonts via `font-kit`.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemFontLoader;

impl FontLoader for SystemFontLoader {
    async fn load(&self, family: &str) -> Result<FontArc, FontLoadError> {
        load_system_font(family, 400, false)
    }
}

/// Load a system font by family name, weight and style.
pub fn load_system_font(family: &str, weight: u16, italic: bool) -> Result<FontArc, FontLoadError> {
    use font_kit::family_name::FamilyName;
    use font_kit::properties::{Properties, Style, Weight};
    use font_kit::source::SystemSource;

    let mut props = Properties::new();
    props.weight = Weight(weight as f32);
    if italic {
        props.style = Style::Italic;
    }

    let source = SystemSource::new();
    let handle = source
        .select_best_match(&[FamilyName::Title(family.to_string())], &props)
        .map_err(|_| FontLoadError::NotFound(family.to_string()))?;

    let font = handle
        .load()
        .map_err(|_| FontLoadError::InvalidData(family.to_string()))?;
    let data = font
        .copy_font_data()
        .ok_or_else(|| FontLoadError::InvalidData(family.to_string()))?;
    FontArc::try_from_vec((*data).clone()).map_err(|_| FontLoadError::InvalidData(family.to_string()))
}

// ---------------------------------------------------------------------------
//  Font cache
// ---------------------------------------------------------------------------

/// Loaded fonts keyed by family, with a single fallback family.
pub struct FontCache<L: FontLoader = SystemFontLoader> {
    loader: L,
    fallback_family: String,
    fonts: HashMap<String, FontArc>,
}

impl<L: FontLoader> FontCache<L> {
    pub fn new(loader: L, fallback_family: impl Into<String>) -> Self {
        Self {
            loader,
            fallback_family: fallback_family.into(),
            fonts: HashMap::new(),
        }
    }

    pub fn loader(&self) -> &L { &self.loader }

    pub fn fallback_family(&self) -> &str { &self.fallback_family }

    pub fn is_cached(&self, family: &str) -> bool {
        self.fonts.contains_key(family)
    }

    /// Resolve `family`, substituting the fallback family once on failure.
    ///
    /// Only successful loads are cached.  `None` means neither the family nor
    /// the fallback could be loaded; the failure has already been logged.
    pub async fn resolve(&mut self, family: &str) -> Option<FontArc> {
        if let Some(font) = self.fonts.get(family) {
            return Some(font.clone());
        }
        match self.loader.load(family).await {
            Ok(font) => {
                self.fonts.insert(family.to_string(), font.clone());
                return Some(font);
            }
            Err(e) => {
                log_warn!("Font load failed: {} (falling back to '{}')", e, self.fallback_family);
            }
        }

        let fallback = self.fallback_family.clone();
        if fallback == family {
            return None;
        }
        if let Some(font) = self.fonts.get(&fallback) {
            return Some(font.clone());
        }
        match self.loader.load(&fallback).await {
            Ok(font) => {
                self.fonts.insert(fallback, font.clone());
                Some(font)
            }
            Err(e) => {
                log_err!("Fallback font load failed: {}; text not drawn", e);
                None
            }
        }
    }
}

// ---------------------------------------------------------------------------
//  Layout + rasterization
// ---------------------------------------------------------------------------

/// Line height used when the descriptor does not set one: the font size plus
/// how far "Mg" reaches below the baseline.
pub fn default_line_height(font: &FontArc, font_size: f32) -> f32 {
    let scaled = font.as_scaled(font_size);
    let mut descent: Option<f32> = None;
    for ch in "Mg".chars() {
        let glyph = font.glyph_id(ch).with_scale_and_position(font_size, point(0.0, 0.0));
        if let Some(outlined) = font.outline_glyph(glyph) {
            let below = outlined.px_bounds().max.y;
            descent = Some(descent.map_or(below, |d: f32| d.max(below)));
        }
    }
    font_size + descent.unwrap_or_else(|| scaled.descent()).abs()
}

/// Glyph positions for one line; `x` is the pen position of each glyph.
fn layout_line(font: &FontArc, line: &str, font_size: f32, spacing: f32) -> Vec<(GlyphId, f32)> {
    let scaled = font.as_scaled(font_size);
    if spacing != 0.0 {
        return line
            .chars()
            .enumerate()
            .map(|(i, ch)| (font.glyph_id(ch), i as f32 * spacing))
            .collect();
    }
    let mut glyphs = Vec::with_capacity(line.len());
    let mut cursor_x = 0.0f32;
    let mut last_glyph: Option<GlyphId> = None;
    for ch in line.chars() {
        let id = font.glyph_id(ch);
        if let Some(prev) = last_glyph {
            cursor_x += scaled.kern(prev, id);
        }
        glyphs.push((id, cursor_x));
        cursor_x += scaled.h_advance(id);
        last_glyph = Some(id);
    }
    glyphs
}

/// Clear `target` and draw the descriptor's text into it.
///
/// Line `i` sits on the baseline `line_height * (i + 1)`.
pub fn rasterize_text(target: &mut RgbaImage, font: &FontArc, text: &TextDescriptor) {
    let raw: &mut [u8] = &mut *target;
    raw.fill(0);

    let font_size = text.size;
    if font_size <= 0.0 || !font_size.is_finite() {
        return;
    }
    let line_height = text
        .line_height
        .filter(|lh| lh.is_finite())
        .unwrap_or_else(|| default_line_height(font, font_size));
    let color = text.rgba();
    let (tw, th) = (target.width() as i32, target.height() as i32);

    for (line_idx, line) in text.value.split('\n').enumerate() {
        let baseline = line_height * (line_idx + 1) as f32;
        for (id, x) in layout_line(font, line, font_size, text.spacing) {
            let glyph = id.with_scale_and_position(font_size, point(x, baseline));
            let Some(outlined) = font.outline_glyph(glyph) else { continue };
            let bounds = outlined.px_bounds();
            let (bx, by) = (bounds.min.x as i32, bounds.min.y as i32);
            outlined.draw(|gx, gy, coverage| {
                let px = bx + gx as i32;
                let py = by + gy as i32;
                if px < 0 || py < 0 || px >= tw || py >= th {
                    return;
                }
                let a = (color[3] as f32 * coverage.clamp(0.0, 1.0)).round() as u8;
                let src = Rgba([color[0], color[1], color[2], a]);
                let dst = *target.get_pixel(px as u32, py as u32);
                target.put_pixel(px as u32, py as u32, alpha_blend(dst, src));
            });
        }
    }
}

/// Rebuild a text layer's source bitmap from its descriptor.
///
/// The source is (re)allocated at the layer size when missing or mis-sized.
/// Returns `true` when glyphs were drawn; `false` for bitmap layers or when no
/// font could be resolved (the source is left cleared in that case).
pub async fn render_text_layer<L: FontLoader>(layer: &mut Layer, fonts: &mut FontCache<L>) -> bool {
    let LayerKind::Text(text) = &layer.kind else {
        return false;
    };
    let (w, h) = (layer.width, layer.height);
    if layer.source.as_ref().map(|s| s.dimensions()) != Some((w, h)) {
        layer.source = Some(RgbaImage::new(w, h));
    }
    let Some(source) = layer.source.as_mut() else {
        return false;
    };
    let Some(font) = fonts.resolve(&text.font).await else {
        let raw: &mut [u8] = &mut *source;
        raw.fill(0);
        return false;
    };
    rasterize_text(source, &font, text);
    true
}
