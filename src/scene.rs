// ============================================================================
// SCENE GRAPH — drawable nodes, z-ordered scene, layer sprites
// ============================================================================

use image::{Rgba, RgbaImage};
use kurbo::{Point, Rect};
use uuid::Uuid;

use crate::document::{Document, Layer};
use crate::surface::DrawContext;
use crate::viewport::Viewport;

/// Phase of a pointer or touch interaction.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InteractionKind {
    Down,
    Move,
    Up,
}

/// Input delivered to scene nodes, already translated into document space.
#[derive(Clone, Debug, PartialEq)]
pub enum InteractionEvent {
    Pointer { kind: InteractionKind, x: f64, y: f64 },
    /// All active touch points of a multi-touch gesture.
    Touch { kind: InteractionKind, touches: Vec<Point> },
    Wheel { delta_x: f64, delta_y: f64 },
}

/// A node of the scene.  Children are drawn in insertion order, so later
/// children cover earlier ones.
pub trait Drawable {
    /// Per-frame state update; `timestamp` is in milliseconds.
    fn update(&mut self, _timestamp: f64) {}

    /// Draw into `ctx`.  The context is already scaled to the output zoom, so
    /// `viewport` and all geometry are in unscaled document units.
    fn draw(&self, ctx: &mut DrawContext<'_>, viewport: &Viewport);

    /// Hit-test and react to input at document coordinate `(x, y)`.
    /// Returns `true` when the node consumed the event.
    fn handle_interaction(&mut self, _x: f64, _y: f64, _event: &InteractionEvent) -> bool {
        false
    }

    fn as_layer_sprite(&self) -> Option<&LayerSprite> { None }

    fn as_layer_sprite_mut(&mut self) -> Option<&mut LayerSprite> { None }
}

/// Owned, z-ordered list of drawables.
#[derive(Default)]
pub struct Scene {
    children: Vec<Box<dyn Drawable>>,
    invalidated: bool,
}

impl Scene {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize { self.children.len() }

    pub fn is_empty(&self) -> bool { self.children.is_empty() }

    /// Append a node on top of the stack.
    pub fn add_child(&mut self, child: Box<dyn Drawable>) {
        self.children.push(child);
        self.invalidated = true;
    }

    /// Remove the sprite that mirrors layer `id`.  Returns whether one existed.
    pub fn remove_layer_sprite(&mut self, id: Uuid) -> bool {
        let before = self.children.len();
        self.children
            .retain(|c| c.as_layer_sprite().is_none_or(|s| s.layer_id() != id));
        let removed = self.children.len() != before;
        self.invalidated |= removed;
        removed
    }

    pub fn sprite_for_layer(&self, id: Uuid) -> Option<&LayerSprite> {
        self.children
            .iter()
            .filter_map(|c| c.as_layer_sprite())
            .find(|s| s.layer_id() == id)
    }

    pub fn sprite_for_layer_mut(&mut self, id: Uuid) -> Option<&mut LayerSprite> {
        self.children
            .iter_mut()
            .filter_map(|c| c.as_layer_sprite_mut())
            .find(|s| s.layer_id() == id)
    }

    /// Flag the scene as needing a redraw.
    pub fn invalidate(&mut self) {
        self.invalidated = true;
    }

    pub fn is_invalidated(&self) -> bool { self.invalidated }

    /// Read and reset the redraw flag.
    pub fn take_invalidated(&mut self) -> bool {
        std::mem::take(&mut self.invalidated)
    }

    pub fn update_all(&mut self, timestamp: f64) {
        for child in &mut self.children {
            child.update(timestamp);
        }
    }

    pub fn draw_all(&self, ctx: &mut DrawContext<'_>, viewport: &Viewport) {
        for child in &self.children {
            let mut scope = ctx.scoped();
            child.draw(&mut scope, viewport);
        }
    }

    /// Write positions of dragged sprites back to their layers.  Returns how
    /// many layers moved.
    pub fn apply_layer_moves(&mut self, document: &mut Document) -> usize {
        let mut moved = 0;
        for sprite in self.children.iter_mut().filter_map(|c| c.as_layer_sprite_mut()) {
            let Some(layer) = document.layer_mut(sprite.layer_id()) else { continue };
            if let Some(origin) = sprite.take_layer_move() {
                layer.x = origin.x;
                layer.y = origin.y;
                moved += 1;
            }
        }
        moved
    }

    /// Offer the event to children topmost-first; stops at the first child
    /// that handles it.
    pub fn dispatch_topmost(&mut self, x: f64, y: f64, event: &InteractionEvent) -> bool {
        for child in self.children.iter_mut().rev() {
            if child.handle_interaction(x, y, event) {
                self.invalidated = true;
                return true;
            }
        }
        false
    }

    /// Offer the event to every child.  Returns whether any child handled it.
    pub fn dispatch_all(&mut self, x: f64, y: f64, event: &InteractionEvent) -> bool {
        let mut handled = false;
        for child in self.children.iter_mut().rev() {
            handled |= child.handle_interaction(x, y, event);
        }
        self.invalidated |= handled;
        handled
    }
}

// ---------------------------------------------------------------------------
//  Layer sprite
// ---------------------------------------------------------------------------

const SELECTION_OUTLINE: Rgba<u8> = Rgba([0, 120, 215, 255]);

/// On-screen counterpart of a [`Layer`]: holds the rendered (visible) bitmap
/// and draws it at the layer's position.
#[derive(Clone, Debug)]
pub struct LayerSprite {
    layer_id: Uuid,
    x: f64,
    y: f64,
    bitmap: Option<RgbaImage>,
    rendered_generation: Option<u64>,
    selection: Vec<Point>,
    show_selection_outline: bool,
    interactive: bool,
    drag_offset: Option<Point>,
    /// Unrotated layer box size, to map the sprite position back to a layer origin.
    layer_size: (u32, u32),
    moved: bool,
}

impl LayerSprite {
    pub fn new(layer: &Layer) -> Self {
        Self {
            layer_id: layer.id,
            x: layer.x,
            y: layer.y,
            bitmap: None,
            rendered_generation: None,
            selection: layer.selection().to_vec(),
            show_selection_outline: true,
            interactive: true,
            drag_offset: None,
            layer_size: (layer.width(), layer.height()),
            moved: false,
        }
    }

    pub fn layer_id(&self) -> Uuid { self.layer_id }

    pub fn position(&self) -> Point { Point::new(self.x, self.y) }

    pub fn bitmap(&self) -> Option<&RgbaImage> { self.bitmap.as_ref() }

    pub fn rendered_generation(&self) -> Option<u64> { self.rendered_generation }

    pub fn is_dragging(&self) -> bool { self.drag_offset.is_some() }

    /// Layer origin implied by the current sprite position.
    pub fn layer_origin(&self) -> Point {
        let (lw, lh) = self.layer_size;
        let (bw, bh) = self.bitmap.as_ref().map_or((lw, lh), |b| b.dimensions());
        Point::new(
            self.x - (lw as f64 - bw as f64) * 0.5,
            self.y - (lh as f64 - bh as f64) * 0.5,
        )
    }

    /// The new layer origin if the sprite was dragged since the last call.
    pub fn take_layer_move(&mut self) -> Option<Point> {
        std::mem::take(&mut self.moved).then(|| self.layer_origin())
    }

    pub fn set_interactive(&mut self, interactive: bool) {
        self.interactive = interactive;
        if !interactive {
            self.drag_offset = None;
        }
    }

    /// Toggle the selection outline; returns the previous setting so callers
    /// can put it back.
    pub fn set_selection_outline(&mut self, visible: bool) -> bool {
        std::mem::replace(&mut self.show_selection_outline, visible)
    }

    /// Install a freshly rendered bitmap for `layer`.
    ///
    /// The bitmap (sized to the rotated bounds) is centred over the layer's
    /// unrotated box.
    pub fn publish(&mut self, layer: &Layer, bitmap: RgbaImage) {
        self.x = layer.x + (layer.width() as f64 - bitmap.width() as f64) * 0.5;
        self.y = layer.y + (layer.height() as f64 - bitmap.height() as f64) * 0.5;
        self.bitmap = Some(bitmap);
        self.layer_size = (layer.width(), layer.height());
        self.moved = false;
        self.rendered_generation = Some(layer.generation());
        self.selection = layer.selection().to_vec();
    }

    /// Pick up a layer's position and selection without re-rendering.
    pub fn sync_from_layer(&mut self, layer: &Layer) {
        let (bw, bh) = self.bitmap.as_ref().map_or((layer.width(), layer.height()), |b| b.dimensions());
        self.x = layer.x + (layer.width() as f64 - bw as f64) * 0.5;
        self.y = layer.y + (layer.height() as f64 - bh as f64) * 0.5;
        self.layer_size = (layer.width(), layer.height());
        self.moved = false;
        self.selection = layer.selection().to_vec();
    }

    /// Document-space area covered by the visible bitmap.
    pub fn bounds(&self) -> Rect {
        let (w, h) = self.bitmap.as_ref().map_or((0, 0), |b| b.dimensions());
        Rect::new(self.x, self.y, self.x + w as f64, self.y + h as f64)
    }
}

impl Drawable for LayerSprite {
    fn draw(&self, ctx: &mut DrawContext<'_>, viewport: &Viewport) {
        if let Some(bitmap) = &self.bitmap {
            ctx.draw_image(bitmap, self.x - viewport.left, self.y - viewport.top);
        }
        if self.show_selection_outline && self.selection.len() > 1 {
            let outline: Vec<Point> = self
                .selection
                .iter()
                .map(|p| Point::new(p.x - viewport.left, p.y - viewport.top))
                .collect();
            ctx.stroke_polygon(&outline, SELECTION_OUTLINE);
        }
    }

    fn handle_interaction(&mut self, x: f64, y: f64, event: &InteractionEvent) -> bool {
        if !self.interactive {
            return false;
        }
        let kind = match event {
            InteractionEvent::Pointer { kind, .. } | InteractionEvent::Touch { kind, .. } => *kind,
            InteractionEvent::Wheel { .. } => return false,
        };
        match (kind, self.drag_offset) {
            (InteractionKind::Down, _) => {
                if !self.bounds().contains(Point::new(x, y)) {
                    return false;
                }
                self.drag_offset = Some(Point::new(x - self.x, y - self.y));
                true
            }
            (InteractionKind::Move, Some(offset)) => {
                self.x = x - offset.x;
                self.y = y - offset.y;
                self.moved = true;
                true
            }
            (InteractionKind::Up, Some(_)) => {
                self.drag_offset = None;
                true
            }
            _ => false,
        }
    }

    fn as_layer_sprite(&self) -> Option<&LayerSprite> { Some(self) }

    fn as_layer_sprite_mut(&mut self) -> Option<&mut LayerSprite> { Some(self) }
}
