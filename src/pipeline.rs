// ============================================================================
// LAYER EFFECT PIPELINE — text → transform → mask → filters → publish
// ============================================================================
//
// Each run renders one layer's final pixels into a working surface sized to
// the rotated bounds and hands a copy to the layer's sprite.  Working surfaces
// are kept per layer for the lifetime of the pipeline so repeated edits reuse
// their storage.  Runs for a layer are serialized by the `&mut Layer` borrow.
// ============================================================================

use std::collections::HashMap;

use kurbo::Size;
use uuid::Uuid;

use crate::document::{Document, Layer, LayerKind};
use crate::geometry::{pixel_extent, rotated_bounding_size};
use crate::ops::filters::apply_filters;
use crate::ops::text::{render_text_layer, FontCache, FontLoader, SystemFontLoader};
use crate::ops::transform::{needs_transform, render_transformed_source};
use crate::scene::Scene;
use crate::settings::EngineSettings;
use crate::surface::Surface;

pub struct LayerEffectPipeline<L: FontLoader = SystemFontLoader> {
    surfaces: HashMap<Uuid, Surface>,
    fonts: FontCache<L>,
}

impl LayerEffectPipeline<SystemFontLoader> {
    pub fn new(settings: &EngineSettings) -> Self {
        Self::with_loader(SystemFontLoader, settings)
    }
}

impl<L: FontLoader> LayerEffectPipeline<L> {
    pub fn with_loader(loader: L, settings: &EngineSettings) -> Self {
        Self {
            surfaces: HashMap::new(),
            fonts: FontCache::new(loader, settings.fallback_font.clone()),
        }
    }

    pub fn fonts(&self) -> &FontCache<L> { &self.fonts }

    /// Number of layers currently holding a working surface.
    pub fn working_surfaces(&self) -> usize { self.surfaces.len() }

    /// Drop the working surface of a deleted layer.
    pub fn forget_layer(&mut self, id: Uuid) -> bool {
        self.surfaces.remove(&id).is_some()
    }

    /// Whether the layer's sprite shows the layer's current generation.
    pub fn is_current(layer: &Layer, scene: &Scene) -> bool {
        scene
            .sprite_for_layer(layer.id)
            .and_then(|s| s.rendered_generation())
            == Some(layer.generation())
    }

    /// Re-render the layer and publish the result to its sprite.
    ///
    /// A pending drag of the sprite is first written back to the layer's
    /// position so publishing does not snap the sprite back.
    ///
    /// Returns `false` without doing anything when the layer has no sprite in
    /// `scene` or no source bitmap.
    pub async fn render_effects_for_layer(&mut self, layer: &mut Layer, scene: &mut Scene) -> bool {
        let Some(sprite) = scene.sprite_for_layer_mut(layer.id) else {
            return false;
        };
        // a drag since the last publish moves the layer itself
        if let Some(origin) = sprite.take_layer_move() {
            layer.x = origin.x;
            layer.y = origin.y;
        }
        match layer.kind {
            LayerKind::Text(_) => {
                render_text_layer(layer, &mut self.fonts).await;
            }
            LayerKind::Bitmap => {}
        }
        let Some(source) = layer.source.as_ref() else {
            return false;
        };

        let layer_size = Size::new(layer.width as f64, layer.height as f64);
        let bounds = rotated_bounding_size(layer_size.width, layer_size.height, layer.effects.rotation);
        let (width, height) = (pixel_extent(bounds.width), pixel_extent(bounds.height));

        let surface = self.surfaces.entry(layer.id).or_default();
        if surface.ensure_capacity(width, height) {
            log_info!("Layer '{}': working surface grown to {}x{}", layer.name, width, height);
        }
        surface.clear();

        {
            let mut ctx = surface.context();
            if needs_transform(layer) {
                render_transformed_source(&mut ctx, source, layer_size, bounds, &layer.effects, layer.mask.as_ref());
            } else {
                ctx.draw_image(source, 0.0, 0.0);
            }
        }

        if layer.filters.is_active() {
            apply_filters(
                surface.image_mut(),
                width,
                height,
                layer.filters.scaled_levels(),
                layer.filters.contrast,
            );
        }

        let Some(sprite) = scene.sprite_for_layer_mut(layer.id) else {
            return false;
        };
        sprite.publish(layer, surface.image().clone());
        scene.invalidate();
        true
    }

    /// Render every layer whose sprite is out of date.  Returns how many
    /// layers were rendered.
    pub async fn render_stale_layers(&mut self, document: &mut Document, scene: &mut Scene) -> usize {
        let mut rendered = 0;
        for layer in document.layers.iter_mut() {
            if Self::is_current(layer, scene) {
                continue;
            }
            if self.render_effects_for_layer(layer, scene).await {
                rendered += 1;
            }
        }
        rendered
    }
}
