use std::cell::RefCell;
use std::f64::consts::FRAC_PI_2;

use ab_glyph::FontArc;
use image::{Rgba, RgbaImage};
use kurbo::{Point, Size};

use layerfx::geometry::rotated_bounding_size;
use layerfx::io::decode_image;
use layerfx::ops::filters::{adjust_channel, apply_filters};
use layerfx::{
    Document, DocumentCompositor, Effects, EffectsRecord, EngineSettings, Filters, FontLoadError, FontLoader,
    InteractionKind, Layer, LayerEffectPipeline, LayerSprite, Mask, Scene, SnapshotFormat, TextDescriptor,
    ViewportController,
};

const RED: Rgba<u8> = Rgba([255, 0, 0, 255]);
const GREY: Rgba<u8> = Rgba([128, 128, 128, 255]);

/// Fails every load and remembers what was asked for.
#[derive(Default)]
struct RecordingLoader {
    requested: RefCell<Vec<String>>,
}

impl FontLoader for RecordingLoader {
    async fn load(&self, family: &str) -> Result<FontArc, FontLoadError> {
        self.requested.borrow_mut().push(family.to_string());
        Err(FontLoadError::NotFound(family.to_string()))
    }
}

fn pipeline() -> LayerEffectPipeline<RecordingLoader> {
    LayerEffectPipeline::with_loader(RecordingLoader::default(), &EngineSettings::default())
}

fn marked_layer(w: u32, h: u32) -> Layer {
    let mut img = RgbaImage::from_pixel(w, h, GREY);
    img.put_pixel(0, 0, RED);
    Layer::new_bitmap("marked", img)
}

fn render_alone(layer: &mut Layer) -> RgbaImage {
    let mut scene = Scene::new();
    scene.add_child(Box::new(LayerSprite::new(layer)));
    let mut p = pipeline();
    assert!(pollster::block_on(p.render_effects_for_layer(layer, &mut scene)));
    scene.sprite_for_layer(layer.id).and_then(|s| s.bitmap()).cloned().unwrap()
}

#[test]
fn quarter_turn_of_square_layer() {
    let mut layer = marked_layer(100, 100);
    layer.set_rotation(FRAC_PI_2);
    let bitmap = render_alone(&mut layer);
    assert_eq!(bitmap.dimensions(), (100, 100));
    assert_eq!(*bitmap.get_pixel(99, 0), RED);
    assert_eq!(bitmap.pixels().filter(|p| **p == RED).count(), 1);
    assert_eq!((layer.width(), layer.height()), (100, 100));
}

#[test]
fn mirror_x_lands_origin_on_last_column() {
    let mut layer = marked_layer(30, 7);
    layer.set_mirror(true, false);
    let bitmap = render_alone(&mut layer);
    assert_eq!(*bitmap.get_pixel(29, 0), RED);
    assert_eq!(*bitmap.get_pixel(0, 0), GREY);
}

#[test]
fn rotated_bounds_ignore_whole_turns() {
    for r in [0.4, -2.0, 7.0, 100.0] {
        assert_eq!(
            rotated_bounding_size(64.0, 20.0, r),
            rotated_bounding_size(64.0, 20.0, r.rem_euclid(std::f64::consts::TAU))
        );
    }
}

#[test]
fn single_colour_png_snapshot_decodes_exactly() {
    let colour = Rgba([12, 200, 99, 255]);
    let mut doc = Document::new("flat", 9, 5);
    doc.add_layer(Layer::new_bitmap("fill", RgbaImage::from_pixel(9, 5, colour)));
    let bytes = pollster::block_on(DocumentCompositor::default().create_snapshot(
        &mut doc,
        &mut pipeline(),
        SnapshotFormat::Png,
        92,
    ))
    .unwrap();
    let decoded = decode_image(&bytes).unwrap();
    assert_eq!(decoded.dimensions(), (9, 5));
    assert!(decoded.pixels().all(|p| *p == colour));
}

#[test]
fn fully_transparent_mask_empties_the_snapshot() {
    let mut doc = Document::new("masked", 8, 8);
    let mut layer = Layer::new_bitmap("fill", RgbaImage::from_pixel(8, 8, RED));
    layer.set_mask(Some(Mask { bitmap: RgbaImage::new(8, 8), x: 0.0, y: 0.0 }));
    doc.add_layer(layer);
    let out = pollster::block_on(DocumentCompositor::default().composite(&mut doc, &mut pipeline()));
    assert!(out.pixels().all(|p| p[3] == 0));
}

#[test]
fn neutral_filters_keep_bytes() {
    let mut buf: Vec<u8> = (0..64u8).collect();
    let before = buf.clone();
    apply_filters(&mut buf, 4, 4, 0.0, 0.0);
    assert_eq!(buf, before);
    let f = Filters::default();
    assert!(!f.is_active());
}

#[test]
fn raw_levels_one_quadruples_before_clamping() {
    let f = Filters { levels: 1.0, contrast: 0.0 };
    assert_eq!(adjust_channel(100.0, f.scaled_levels(), f.contrast), 400.0);

    let mut layer = Layer::new_bitmap("l", RgbaImage::from_pixel(1, 1, Rgba([100, 0, 0, 255])));
    layer.set_filters(f);
    let bitmap = render_alone(&mut layer);
    assert_eq!(*bitmap.get_pixel(0, 0), Rgba([255, 0, 0, 255]));
}

#[test]
fn effects_survive_serialization() {
    let e = Effects { rotation: 1.25, mirror_x: false, mirror_y: true };
    assert_eq!(Effects::deserialize(&e.serialize()), e);
    let bytes = e.serialize().to_bytes().unwrap();
    assert_eq!(EffectsRecord::from_bytes(&bytes).unwrap(), e.serialize());
}

#[test]
fn rescale_from_unscrolled_centres_exactly() {
    let settings = EngineSettings { animate: false, ..Default::default() };
    let mut ctrl = ViewportController::new(640.0, 480.0, &settings);
    ctrl.set_viewport_size(Some(Size::new(640.0, 480.0)));
    assert_eq!(ctrl.viewport().left, 0.0);
    assert_eq!(ctrl.scroll_extent().width, 0.0);

    let doc = Document::new("d", 640, 480);
    ctrl.set_document_scale(1280.0, 960.0, 1.0, 2.0, Some(&doc));
    let extent = ctrl.scroll_extent();
    assert_eq!(ctrl.viewport().left, extent.width / 2.0);
    assert_eq!(ctrl.viewport().top, extent.height / 2.0);
    assert_eq!(ctrl.document_scale(), 0.5);
}

#[test]
fn pointer_translation_through_zoom() {
    let settings = EngineSettings { animate: false, ..Default::default() };
    let mut ctrl = ViewportController::new(500.0, 500.0, &settings);
    ctrl.set_screen_offset(120.0, 80.0);
    ctrl.set_zoom_factor(2.0);
    assert_eq!(ctrl.pointer_to_document(120.0, 80.0), Point::ZERO);
    let at_two = ctrl.pointer_to_document(220.0, 180.0);
    ctrl.set_zoom_factor(4.0);
    let at_four = ctrl.pointer_to_document(220.0, 180.0);
    assert_eq!(at_four, Point::new(at_two.x / 2.0, at_two.y / 2.0));
}

#[test]
fn dragging_a_layer_through_the_controller() {
    let settings = EngineSettings { animate: false, ..Default::default() };
    let mut ctrl = ViewportController::new(200.0, 200.0, &settings);
    ctrl.set_zoom_factor(2.0);

    let mut layer = Layer::new_bitmap("l", RgbaImage::from_pixel(10, 10, RED));
    layer.x = 20.0;
    layer.y = 20.0;
    let mut p = pipeline();
    ctrl.scene_mut().add_child(Box::new(LayerSprite::new(&layer)));
    assert!(pollster::block_on(p.render_effects_for_layer(&mut layer, ctrl.scene_mut())));

    // scaled (50, 50) is document (25, 25), inside the sprite
    assert!(ctrl.handle_pointer(InteractionKind::Down, 50.0, 50.0));
    assert!(ctrl.handle_pointer(InteractionKind::Move, 70.0, 90.0));
    assert!(ctrl.handle_pointer(InteractionKind::Up, 70.0, 90.0));
    let moved = ctrl.scene().sprite_for_layer(layer.id).unwrap().position();
    assert_eq!(moved, Point::new(30.0, 40.0));
    assert!(!ctrl.handle_pointer(InteractionKind::Down, 2.0, 2.0));
}

#[test]
fn selection_extraction_and_degenerate_cases() {
    let mut doc = Document::new("d", 20, 20);
    let mut layer = Layer::new_bitmap("l", RgbaImage::from_pixel(20, 20, RED));
    layer.set_selection(vec![
        Point::new(5.0, 5.0),
        Point::new(15.0, 5.0),
        Point::new(15.0, 12.0),
        Point::new(5.0, 12.0),
    ]);
    doc.add_layer(layer);
    let comp = DocumentCompositor::default();
    let out = pollster::block_on(comp.extract_selection(&mut doc, &mut pipeline())).unwrap();
    assert_eq!(out.dimensions(), (10, 7));
    assert!(out.pixels().all(|p| *p == RED));

    doc.layers[0].set_selection(Vec::new());
    assert!(pollster::block_on(comp.extract_selection(&mut doc, &mut pipeline())).is_none());
    doc.layers[0].set_selection(vec![Point::new(1.0, 1.0)]);
    assert!(pollster::block_on(comp.extract_selection(&mut doc, &mut pipeline())).is_none());
}

#[test]
fn unavailable_font_falls_back_once_and_renders_nothing() {
    let settings = EngineSettings { fallback_font: "Backup Sans".into(), ..Default::default() };
    let mut p = LayerEffectPipeline::with_loader(RecordingLoader::default(), &settings);
    let mut doc = Document::new("d", 40, 20);
    let text = TextDescriptor { value: "Hi".into(), font: "Missing Serif".into(), ..Default::default() };
    doc.add_layer(Layer::new_text("t", 40, 20, text));

    let out = pollster::block_on(DocumentCompositor::default().composite(&mut doc, &mut p));
    assert!(out.pixels().all(|px| px[3] == 0));
    assert_eq!(*p.fonts().loader().requested.borrow(), vec!["Missing Serif", "Backup Sans"]);
}

#[test]
fn re_rendering_a_layer_asks_the_idle_controller_for_a_frame() {
    let settings = EngineSettings { animate: false, ..Default::default() };
    let mut ctrl = ViewportController::new(50.0, 50.0, &settings);
    let mut layer = Layer::new_bitmap("l", RgbaImage::from_pixel(5, 5, RED));
    ctrl.scene_mut().add_child(Box::new(LayerSprite::new(&layer)));
    assert!(!ctrl.render_frame(0.0));
    assert!(!ctrl.is_frame_pending());

    let mut p = pipeline();
    assert!(pollster::block_on(p.render_effects_for_layer(&mut layer, ctrl.scene_mut())));
    assert!(ctrl.is_frame_pending());

    ctrl.render_frame(16.0);
    assert!(!ctrl.is_frame_pending());
    assert_eq!(*ctrl.frame().image().get_pixel(2, 2), RED);
}

#[test]
fn dragged_layer_keeps_its_place_after_an_edit() {
    let settings = EngineSettings { animate: false, ..Default::default() };
    let mut ctrl = ViewportController::new(200.0, 200.0, &settings);
    let mut doc = Document::new("d", 200, 200);
    doc.add_layer(Layer::new_bitmap("l", RgbaImage::from_pixel(10, 10, GREY)));
    let mut p = pipeline();
    ctrl.scene_mut().add_child(Box::new(LayerSprite::new(&doc.layers[0])));
    pollster::block_on(p.render_stale_layers(&mut doc, ctrl.scene_mut()));

    assert!(ctrl.handle_pointer(InteractionKind::Down, 5.0, 5.0));
    assert!(ctrl.handle_pointer(InteractionKind::Move, 55.0, 45.0));
    assert!(ctrl.handle_pointer(InteractionKind::Up, 55.0, 45.0));

    doc.layers[0].set_filters(Filters { levels: 0.3, contrast: 0.1 });
    assert_eq!(pollster::block_on(p.render_stale_layers(&mut doc, ctrl.scene_mut())), 1);
    assert_eq!((doc.layers[0].x, doc.layers[0].y), (50.0, 40.0));
    let sprite = ctrl.scene().sprite_for_layer(doc.layers[0].id).unwrap();
    assert_eq!(sprite.position(), Point::new(50.0, 40.0));
}
