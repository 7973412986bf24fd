// ============================================================================
// LayerFX — layer effects, document compositing and zoomable viewport core
// ============================================================================

#![allow(clippy::too_many_arguments)]

#[macro_use]
pub mod logger;

pub mod cli;
pub mod compositor;
pub mod document;
pub mod geometry;
pub mod io;
pub mod ops;
pub mod pipeline;
pub mod scene;
pub mod settings;
pub mod surface;
pub mod viewport;

pub use compositor::DocumentCompositor;
pub use document::{Document, Effects, EffectsRecord, Filters, Layer, LayerKind, Mask, TextDescriptor};
pub use io::{ImageIoError, SnapshotFormat};
pub use ops::text::{FontLoadError, FontLoader, SystemFontLoader};
pub use pipeline::LayerEffectPipeline;
pub use scene::{Drawable, InteractionEvent, InteractionKind, LayerSprite, Scene};
pub use settings::EngineSettings;
pub use surface::{CompositeOp, DrawContext, Surface};
pub use viewport::{Viewport, ViewportController};
