// ============================================================================
// DOCUMENT MODEL — documents, layers, effects, filters, text
// ============================================================================

use image::{Rgba, RgbaImage};
use kurbo::Point;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::geometry::normalize_rotation;

// ---------------------------------------------------------------------------
//  Effects
// ---------------------------------------------------------------------------

/// Geometric transform applied to a layer's rendered output.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Effects {
    /// Radians, 0 = identity.
    pub rotation: f64,
    pub mirror_x: bool,
    pub mirror_y: bool,
}

impl Effects {
    /// Rotation normalized into `[0, 2π)`.
    pub fn normalized_rotation(&self) -> f64 {
        normalize_rotation(self.rotation)
    }

    pub fn is_identity(&self) -> bool {
        self.normalized_rotation() == 0.0 && !self.mirror_x && !self.mirror_y
    }

    /// Minimal persisted form.
    pub fn serialize(&self) -> EffectsRecord {
        EffectsRecord { r: self.rotation, x: self.mirror_x, y: self.mirror_y }
    }

    pub fn deserialize(record: &EffectsRecord) -> Self {
        Self { rotation: record.r, mirror_x: record.x, mirror_y: record.y }
    }
}

/// `{ r: rotation, x: mirrorX, y: mirrorY }`
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct EffectsRecord {
    pub r: f64,
    pub x: bool,
    pub y: bool,
}

/// Error type for effect record encoding.
#[derive(Debug)]
pub enum RecordError {
    Encode(String),
    Decode(String),
}

impl std::fmt::Display for RecordError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RecordError::Encode(e) => write!(f, "Effects record encode error: {}", e),
            RecordError::Decode(e) => write!(f, "Effects record decode error: {}", e),
        }
    }
}

impl std::error::Error for RecordError {}

impl EffectsRecord {
    /// Compact binary form (bincode) for undo stacks and persistence.
    pub fn to_bytes(&self) -> Result<Vec<u8>, RecordError> {
        bincode::serialize(self).map_err(|e| RecordError::Encode(e.to_string()))
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, RecordError> {
        bincode::deserialize(bytes).map_err(|e| RecordError::Decode(e.to_string()))
    }
}

// ---------------------------------------------------------------------------
//  Filters
// ---------------------------------------------------------------------------

/// Per-pixel colour adjustments.  Zero means "off".
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Filters {
    /// Raw levels value; doubled before use.
    pub levels: f64,
    /// Raw contrast value in `[-1, 1]`.
    pub contrast: f64,
}

impl Filters {
    pub fn is_active(&self) -> bool {
        self.levels != 0.0 || self.contrast != 0.0
    }

    /// Levels as consumed by the filter engine.
    pub fn scaled_levels(&self) -> f64 {
        self.levels * 2.0
    }
}

// ---------------------------------------------------------------------------
//  Text
// ---------------------------------------------------------------------------

/// What a text layer renders.
#[derive(Clone, Debug, PartialEq)]
pub struct TextDescriptor {
    /// May contain `\n` line breaks.
    pub value: String,
    pub font: String,
    pub size: f32,
    /// CSS colour: `#rgb`, `#rrggbb`, `#rrggbbaa` or a basic name.
    pub color: String,
    pub line_height: Option<f32>,
    pub spacing: f32,
}

impl Default for TextDescriptor {
    fn default() -> Self {
        Self {
            value: String::new(),
            font: "Arial".to_string(),
            size: 16.0,
            color: "#000000".to_string(),
            line_height: None,
            spacing: 0.0,
        }
    }
}

impl TextDescriptor {
    pub fn rgba(&self) -> Rgba<u8> {
        parse_css_color(&self.color).unwrap_or(Rgba([0, 0, 0, 255]))
    }
}

/// Parse a CSS hex colour or one of a handful of colour names.
pub fn parse_css_color(s: &str) -> Option<Rgba<u8>> {
    let s = s.trim();
    if let Some(hex) = s.strip_prefix('#') {
        let nibble = |i: usize| u8::from_str_radix(hex.get(i..i + 1)?, 16).ok();
        let byte = |i: usize| u8::from_str_radix(hex.get(i..i + 2)?, 16).ok();
        return match hex.len() {
            3 => Some(Rgba([nibble(0)? * 17, nibble(1)? * 17, nibble(2)? * 17, 255])),
            6 => Some(Rgba([byte(0)?, byte(2)?, byte(4)?, 255])),
            8 => Some(Rgba([byte(0)?, byte(2)?, byte(4)?, byte(6)?])),
            _ => None,
        };
    }
    match s.to_ascii_lowercase().as_str() {
        "black" => Some(Rgba([0, 0, 0, 255])),
        "white" => Some(Rgba([255, 255, 255, 255])),
        "red" => Some(Rgba([255, 0, 0, 255])),
        "green" => Some(Rgba([0, 128, 0, 255])),
        "blue" => Some(Rgba([0, 0, 255, 255])),
        "transparent" => Some(Rgba([0, 0, 0, 0])),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
//  Layers
// ---------------------------------------------------------------------------

/// Layer content type.
#[derive(Clone, Debug, PartialEq)]
pub enum LayerKind {
    Bitmap,
    /// The source bitmap is rebuilt from the descriptor on every render.
    Text(TextDescriptor),
}

/// Bitmap used to cut out parts of a layer, positioned in the layer's local
/// space.
#[derive(Clone, Debug)]
pub struct Mask {
    pub bitmap: RgbaImage,
    pub x: f64,
    pub y: f64,
}

/// One editable unit of a document.
///
/// Every setter that changes rendered output bumps `generation`, which marks
/// the sprite's cached bitmap as stale.
#[derive(Clone, Debug)]
pub struct Layer {
    pub id: Uuid,
    pub name: String,
    pub visible: bool,
    /// Placement in document space.
    pub x: f64,
    pub y: f64,
    pub(crate) kind: LayerKind,
    pub(crate) width: u32,
    pub(crate) height: u32,
    pub(crate) source: Option<RgbaImage>,
    pub(crate) mask: Option<Mask>,
    pub(crate) effects: Effects,
    pub(crate) filters: Filters,
    pub(crate) selection: Vec<Point>,
    pub(crate) generation: u64,
}

impl Layer {
    /// A bitmap layer sized to its source.
    pub fn new_bitmap(name: impl Into<String>, source: RgbaImage) -> Self {
        let (width, height) = source.dimensions();
        Self::blank(name.into(), LayerKind::Bitmap, width, height, Some(source))
    }

    /// A text layer; its source is allocated on first render.
    pub fn new_text(name: impl Into<String>, width: u32, height: u32, text: TextDescriptor) -> Self {
        Self::blank(name.into(), LayerKind::Text(text), width, height, None)
    }

    fn blank(name: String, kind: LayerKind, width: u32, height: u32, source: Option<RgbaImage>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name,
            visible: true,
            x: 0.0,
            y: 0.0,
            kind,
            width,
            height,
            source,
            mask: None,
            effects: Effects::default(),
            filters: Filters::default(),
            selection: Vec::new(),
            generation: 0,
        }
    }

    pub fn kind(&self) -> &LayerKind { &self.kind }
    pub fn width(&self) -> u32 { self.width }
    pub fn height(&self) -> u32 { self.height }
    pub fn source(&self) -> Option<&RgbaImage> { self.source.as_ref() }
    pub fn mask(&self) -> Option<&Mask> { self.mask.as_ref() }
    pub fn effects(&self) -> &Effects { &self.effects }
    pub fn filters(&self) -> &Filters { &self.filters }
    pub fn selection(&self) -> &[Point] { &self.selection }
    pub fn generation(&self) -> u64 { self.generation }

    pub fn text(&self) -> Option<&TextDescriptor> {
        match &self.kind {
            LayerKind::Text(t) => Some(t),
            LayerKind::Bitmap => None,
        }
    }

    fn touch(&mut self) {
        self.generation = self.generation.wrapping_add(1);
    }

    pub fn set_effects(&mut self, effects: Effects) {
        self.effects = effects;
        self.touch();
    }

    pub fn set_rotation(&mut self, radians: f64) {
        self.effects.rotation = radians;
        self.touch();
    }

    pub fn set_mirror(&mut self, mirror_x: bool, mirror_y: bool) {
        self.effects.mirror_x = mirror_x;
        self.effects.mirror_y = mirror_y;
        self.touch();
    }

    pub fn set_filters(&mut self, filters: Filters) {
        self.filters = filters;
        self.touch();
    }

    pub fn set_mask(&mut self, mask: Option<Mask>) {
        self.mask = mask;
        self.touch();
    }

    /// Replace the source bitmap (bitmap layers); the layer adopts its size.
    pub fn set_source(&mut self, source: RgbaImage) {
        self.width = source.width();
        self.height = source.height();
        self.source = Some(source);
        self.touch();
    }

    /// Replace the text descriptor.  Ignored for bitmap layers.
    pub fn set_text(&mut self, text: TextDescriptor) -> bool {
        match &mut self.kind {
            LayerKind::Text(t) => {
                *t = text;
                self.touch();
                true
            }
            LayerKind::Bitmap => false,
        }
    }

    /// Resize the layer box.  Text layers re-allocate their source on the next
    /// render; bitmap sources keep their pixels.
    pub fn resize(&mut self, width: u32, height: u32) {
        self.width = width;
        self.height = height;
        self.touch();
    }

    /// Replace the selection polygon (document space).  Selection changes do
    /// not alter rendered pixels, so the generation is left alone.
    pub fn set_selection(&mut self, points: Vec<Point>) {
        self.selection = points;
    }

    pub fn clear_selection(&mut self) {
        self.selection.clear();
    }
}

// ---------------------------------------------------------------------------
//  Document
// ---------------------------------------------------------------------------

/// Ordered layers; index 0 is the bottom of the stack.
#[derive(Clone, Debug)]
pub struct Document {
    pub name: String,
    pub width: u32,
    pub height: u32,
    pub layers: Vec<Layer>,
    active_layer_index: usize,
}

impl Document {
    pub fn new(name: impl Into<String>, width: u32, height: u32) -> Self {
        Self {
            name: name.into(),
            width,
            height,
            layers: Vec::new(),
            active_layer_index: 0,
        }
    }

    /// Push a layer on top and make it active.  Returns its index.
    pub fn add_layer(&mut self, layer: Layer) -> usize {
        self.layers.push(layer);
        self.active_layer_index = self.layers.len() - 1;
        self.active_layer_index
    }

    pub fn remove_layer(&mut self, index: usize) -> Option<Layer> {
        if index >= self.layers.len() {
            return None;
        }
        let removed = self.layers.remove(index);
        if index < self.active_layer_index {
            self.active_layer_index -= 1;
        }
        if self.active_layer_index >= self.layers.len() {
            self.active_layer_index = self.layers.len().saturating_sub(1);
        }
        Some(removed)
    }

    pub fn active_layer_index(&self) -> usize { self.active_layer_index }

    pub fn set_active_layer(&mut self, index: usize) -> bool {
        if index < self.layers.len() {
            self.active_layer_index = index;
            true
        } else {
            false
        }
    }

    pub fn active_layer(&self) -> Option<&Layer> {
        self.layers.get(self.active_layer_index)
    }

    pub fn active_layer_mut(&mut self) -> Option<&mut Layer> {
        self.layers.get_mut(self.active_layer_index)
    }

    pub fn layer(&self, id: Uuid) -> Option<&Layer> {
        self.layers.iter().find(|l| l.id == id)
    }

    pub fn layer_mut(&mut self, id: Uuid) -> Option<&mut Layer> {
        self.layers.iter_mut().find(|l| l.id == id)
    }
}
