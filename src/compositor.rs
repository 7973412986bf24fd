// ============================================================================
// DOCUMENT COMPOSITOR — full-resolution snapshots and selection extraction
// ============================================================================
//
// Both operations build a transient stage (surface + scene of fresh sprites)
// at `document size × pixel ratio`, independent of the on-screen zoom.  The
// stage belongs to the running operation and is dropped on every return path.
// ============================================================================

use image::imageops::{self, FilterType};
use image::RgbaImage;
use kurbo::{Affine, Point, Rect};

use crate::document::{Document, Layer};
use crate::geometry::{pixel_extent, selection_rect};
use crate::io::{encode_image, ImageIoError, SnapshotFormat};
use crate::ops::text::FontLoader;
use crate::pipeline::LayerEffectPipeline;
use crate::scene::{LayerSprite, Scene};
use crate::settings::EngineSettings;
use crate::surface::Surface;
use crate::viewport::Viewport;

/// Off-screen surface and scene used by a single compositing operation.
struct TransientStage {
    surface: Surface,
    scene: Scene,
    pixel_ratio: f64,
    viewport: Viewport,
}

impl TransientStage {
    fn new(document: &Document, pixel_ratio: f64) -> Self {
        let width = pixel_extent(document.width as f64 * pixel_ratio);
        let height = pixel_extent(document.height as f64 * pixel_ratio);
        Self {
            surface: Surface::new(width, height),
            scene: Scene::new(),
            pixel_ratio,
            viewport: Viewport {
                left: 0.0,
                top: 0.0,
                width: document.width as f64,
                height: document.height as f64,
            },
        }
    }

    /// Add a non-interactive sprite without a selection outline, then run the
    /// layer's effect pipeline into it.
    async fn stage_layer<L: FontLoader>(&mut self, layer: &mut Layer, pipeline: &mut LayerEffectPipeline<L>) {
        let mut sprite = LayerSprite::new(layer);
        sprite.set_selection_outline(false);
        sprite.set_interactive(false);
        self.scene.add_child(Box::new(sprite));
        pipeline.render_effects_for_layer(layer, &mut self.scene).await;
    }

    /// Draw the staged sprites, optionally clipped to a document-space polygon.
    fn draw(&mut self, clip: Option<&[Point]>) {
        let mut ctx = self.surface.context_with_transform(Affine::scale(self.pixel_ratio));
        if let Some(points) = clip {
            ctx.clip_polygon(points);
        }
        self.scene.draw_all(&mut ctx, &self.viewport);
    }
}

/// Renders documents to images independent of any on-screen zoom.
#[derive(Clone, Copy, Debug)]
pub struct DocumentCompositor {
    pixel_ratio: f64,
}

impl Default for DocumentCompositor {
    fn default() -> Self {
        Self { pixel_ratio: 1.0 }
    }
}

impl DocumentCompositor {
    pub fn new(settings: &EngineSettings) -> Self {
        Self::default().with_pixel_ratio(settings.pixel_ratio)
    }

    pub fn with_pixel_ratio(mut self, pixel_ratio: f64) -> Self {
        if pixel_ratio.is_finite() && pixel_ratio > 0.0 {
            self.pixel_ratio = pixel_ratio;
        } else {
            log_warn!("Ignoring invalid pixel ratio {}", pixel_ratio);
        }
        self
    }

    pub fn pixel_ratio(&self) -> f64 { self.pixel_ratio }

    /// All visible layers, bottom to top, at the document's logical size.
    pub async fn composite<L: FontLoader>(
        &self,
        document: &mut Document,
        pipeline: &mut LayerEffectPipeline<L>,
    ) -> RgbaImage {
        let mut stage = TransientStage::new(document, self.pixel_ratio);
        for layer in document.layers.iter_mut().filter(|l| l.visible) {
            stage.stage_layer(layer, pipeline).await;
        }
        stage.draw(None);

        let image = stage.surface.into_image();
        if self.pixel_ratio != 1.0 && document.width > 0 && document.height > 0 {
            imageops::resize(&image, document.width, document.height, FilterType::Triangle)
        } else {
            image
        }
    }

    /// Encode the document composite in `format` at `quality` (0–100).
    pub async fn create_snapshot<L: FontLoader>(
        &self,
        document: &mut Document,
        pipeline: &mut LayerEffectPipeline<L>,
        format: SnapshotFormat,
        quality: u8,
    ) -> Result<Vec<u8>, ImageIoError> {
        let image = self.composite(document, pipeline).await;
        let bytes = encode_image(&image, format, quality)?;
        log_info!(
            "Snapshot of '{}': {}x{} {} ({} bytes)",
            document.name,
            image.width(),
            image.height(),
            format.mime_type(),
            bytes.len()
        );
        Ok(bytes)
    }

    /// Copy the active layer's pixels inside its selection polygon.
    ///
    /// The result covers the part of the selection's bounding box that lies
    /// inside the document, at the pixel ratio.  `None` when there is no
    /// active layer or that area is empty.
    pub async fn extract_selection<L: FontLoader>(
        &self,
        document: &mut Document,
        pipeline: &mut LayerEffectPipeline<L>,
    ) -> Option<RgbaImage> {
        let index = document.active_layer_index();
        let selection = document.layers.get(index)?.selection().to_vec();
        let document_rect = Rect::new(0.0, 0.0, document.width as f64, document.height as f64);
        let bounds = selection_rect(&selection).intersect(document_rect);
        if bounds.area() <= 0.0 {
            return None;
        }
        let ratio = self.pixel_ratio;
        let x = (bounds.x0 * ratio).floor().max(0.0) as u32;
        let y = (bounds.y0 * ratio).floor().max(0.0) as u32;
        let width = pixel_extent(bounds.width() * ratio);
        let height = pixel_extent(bounds.height() * ratio);
        if width == 0 || height == 0 {
            return None;
        }

        let mut stage = TransientStage::new(document, ratio);
        stage.stage_layer(&mut document.layers[index], pipeline).await;
        stage.draw(Some(&selection));

        let cropped = imageops::crop_imm(stage.surface.image(), x, y, width, height).to_image();
        if cropped.width() == 0 || cropped.height() == 0 {
            return None;
        }
        Some(cropped)
    }
}
