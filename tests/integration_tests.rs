//! Integration tests for the press-forge pipeline.
//!
//! These tests validate:
//! - Scene documents parse, or fail before anything is rendered
//! - Pixel output matches the declared geometry and paint order
//! - PNG / JPEG / PDF output has the requested size and a valid format
//! - Broken assets and unknown node kinds degrade instead of failing

use std::sync::Arc;

use press_forge::color;
use press_forge::fonts::FontCache;
use press_forge::pipeline::{DesignRenderer, RenderConfig};
use press_forge::raster::Rasterizer;
use press_forge::scene::{Canvas, ImageNode, Node, RectNode, TextNode};
use press_forge::{templates, units, RenderError};
use sha2::{Digest, Sha256};

// =====================================================================
// Helper
// =====================================================================

fn renderer() -> DesignRenderer {
    let dir = std::env::temp_dir();
    let config = RenderConfig::default()
        .with_font_dirs(Vec::new())
        .with_media_root(dir)
        .with_fetch_timeout(std::time::Duration::from_millis(500));
    DesignRenderer::new(config)
}

fn rasterizer() -> Rasterizer {
    Rasterizer::new(
        Arc::new(FontCache::builtin_only()),
        press_forge::assets::AssetLoader::default(),
    )
}

fn rect(x: f32, y: f32, w: f32, h: f32, fill: &str) -> Node {
    Node::Rect(RectNode {
        x,
        y,
        width: w,
        height: h,
        fill: Some(color::resolve(fill)),
        ..RectNode::default()
    })
}

fn decode(bytes: &[u8]) -> image::RgbaImage {
    image::load_from_memory(bytes).unwrap().to_rgba8()
}

fn assert_valid_pdf(bytes: &[u8]) {
    assert!(bytes.len() > 100, "PDF too small: {} bytes", bytes.len());
    assert_eq!(&bytes[0..5], b"%PDF-", "Missing PDF header");
}

// =====================================================================
// Scene parsing
// =====================================================================

#[test]
fn konva_stage_and_plain_canvas_agree() {
    let stage = r##"{"className": "Stage", "attrs": {"width": 100, "height": 100},
        "children": [{"className": "Layer", "children": [
            {"className": "Rect", "attrs": {"x": 10, "y": 10, "width": 30, "height": 20, "fill": "#ff0000"}}
        ]}]}"##;
    let a = renderer().export_png_from_json(stage, 100, 100, 72.0).unwrap();
    let b = renderer()
        .export_png_from_json(templates::minimal_template(), 100, 100, 72.0)
        .unwrap();
    assert_eq!(decode(&a.bytes), decode(&b.bytes));
}

#[test]
fn structural_errors_fail_before_rendering() {
    let cases = [
        "not json at all",
        r#"{"width": 100}"#,
        r#"{"width": 10, "height": 10, "children": [{"className": "Rect", "attrs": {"width": "abc"}}]}"#,
        r#"{"width": 10, "height": 10, "children": [{"attrs": {"x": 1}}]}"#,
    ];
    for json in cases {
        let err = renderer().export_pdf_from_json(json, 10.0, 10.0, 72.0).unwrap_err();
        assert!(matches!(err, RenderError::Parse(_)), "{json}: {err}");
    }
}

#[test]
fn deep_nesting_is_rejected() {
    let mut node = r#"{"className": "Rect"}"#.to_string();
    for _ in 0..40 {
        node = format!(r#"{{"className": "Group", "children": [{node}]}}"#);
    }
    let json = format!(r#"{{"width": 10, "height": 10, "children": [{node}]}}"#);
    let err = renderer().render_preview_from_json(&json, 10, 10).unwrap_err();
    assert!(err.to_string().contains("nesting"), "{err}");
}

// =====================================================================
// Raster properties
// =====================================================================

#[test]
fn empty_scene_is_pure_background() {
    let json = r##"{"width": 50, "height": 20, "background": "#123456"}"##;
    let out = renderer().export_png_from_json(json, 77, 31, 72.0).unwrap();
    let img = decode(&out.bytes);
    assert_eq!(img.dimensions(), (77, 31));
    assert!(img.pixels().all(|p| p.0 == [0x12, 0x34, 0x56, 255]));
}

#[test]
fn scenario_single_rect() {
    let canvas = Canvas::from_json(templates::minimal_template()).unwrap();
    let img = rasterizer().rasterize(&canvas, 1.0).unwrap();
    assert_eq!(img.pixel(25, 20), Some([255, 0, 0, 255]));
    assert_eq!(img.pixel(5, 5), Some([255, 255, 255, 255]));
}

#[test]
fn scenario_business_card_pixel_size() {
    let canvas = Canvas::from_json(templates::business_card_template()).unwrap();
    let out = renderer().export_png_mm(&canvas, 89.0, 54.0, 300.0).unwrap();
    let expected = (units::mm_to_px(89.0, 300.0), units::mm_to_px(54.0, 300.0));
    assert_eq!(expected, (1051, 638));
    assert_eq!((out.width_px, out.height_px), expected);
    assert_eq!(decode(&out.bytes).dimensions(), expected);
}

#[test]
fn scenario_overlap_in_group() {
    let json = r##"{"width": 100, "height": 100, "children": [
        {"className": "Group", "children": [
            {"className": "Rect", "attrs": {"x": 0, "y": 0, "width": 60, "height": 60, "fill": "#00ff00"}},
            {"className": "Rect", "attrs": {"x": 40, "y": 40, "width": 60, "height": 60, "fill": "#0000ff"}}
        ]}
    ]}"##;
    let out = renderer().export_png_from_json(json, 100, 100, 72.0).unwrap();
    let img = decode(&out.bytes);
    assert_eq!(img.get_pixel(50, 50).0, [0, 0, 255, 255]);
    assert_eq!(img.get_pixel(20, 20).0, [0, 255, 0, 255]);
}

#[test]
fn scenario_unknown_kind_between_rects() {
    let json = r##"{"width": 100, "height": 100, "children": [
        {"className": "Rect", "attrs": {"x": 0, "y": 0, "width": 30, "height": 30, "fill": "red"}},
        {"className": "Arrow", "attrs": {"points": [0, 0, 50, 50]}},
        {"className": "Rect", "attrs": {"x": 60, "y": 60, "width": 30, "height": 30, "fill": "blue"}}
    ]}"##;
    let out = renderer().export_png_from_json(json, 100, 100, 72.0).unwrap();
    let img = decode(&out.bytes);
    assert_eq!(img.get_pixel(15, 15).0, [255, 0, 0, 255]);
    assert_eq!(img.get_pixel(75, 75).0, [0, 0, 255, 255]);
}

#[test]
fn unresolvable_font_still_draws_text() {
    let canvas = Canvas::new(200.0, 50.0).with_node(Node::Text(TextNode {
        text: "Fallback".to_string(),
        x: 10.0,
        y: 10.0,
        font_family: "Nonexistent Display Face".to_string(),
        font_size: 20.0,
        ..TextNode::default()
    }));
    let img = rasterizer().rasterize(&canvas, 1.0).unwrap().to_rgba_image();
    let inked = img.pixels().filter(|p| p.0[0] < 128).count();
    assert!(inked > 0, "text should leave ink");
}

#[test]
fn broken_image_becomes_placeholder_and_siblings_render() {
    let canvas = Canvas::new(120.0, 100.0)
        .with_node(Node::Image(ImageNode {
            x: 10.0,
            y: 10.0,
            width: 50.0,
            height: 30.0,
            src: "http://127.0.0.1:9/unreachable.png".to_string(),
        }))
        .with_node(rect(80.0, 60.0, 20.0, 20.0, "#ff0000"));
    let img = renderer().rasterize(&canvas, 120, 100, 72.0).unwrap();

    // Light fill inside, background right outside the declared box.
    assert_eq!(img.pixel(55, 35), Some([0xee, 0xee, 0xee, 255]));
    assert_eq!(img.pixel(9, 20), Some([255, 255, 255, 255]));
    assert_eq!(img.pixel(60, 20), Some([255, 255, 255, 255]));
    assert_eq!(img.pixel(30, 40), Some([255, 255, 255, 255]));
    assert_eq!(img.pixel(90, 70), Some([255, 0, 0, 255]));
}

#[test]
fn oversized_image_does_not_abort_the_render() {
    let json = r##"{"width": 100, "height": 100, "children": [
        {"className": "Image", "attrs": {"x": 0, "y": 0, "width": 1e7, "height": 1e7,
          "src": "data:image/png;base64,iVBORw0KGgoAAAANSUhEUgAAAAEAAAABCAYAAAAfFcSJAAAADUlEQVR42mNk+M9QDwADhgGAWjR9awAAAABJRU5ErkJggg=="}},
        {"className": "Rect", "attrs": {"x": 40, "y": 40, "width": 20, "height": 20, "fill": "#ff0000"}}
    ]}"##;
    let out = renderer().export_png_from_json(json, 100, 100, 72.0).unwrap();
    let img = decode(&out.bytes);
    assert_eq!(img.get_pixel(50, 50).0, [255, 0, 0, 255]);
}

#[test]
fn path_traversal_is_not_followed() {
    let dir = tempfile::tempdir().unwrap();
    let media = dir.path().join("media");
    std::fs::create_dir(&media).unwrap();
    let secret = image::RgbaImage::from_pixel(2, 2, image::Rgba([0, 0, 0, 255]));
    secret.save(dir.path().join("secret.png")).unwrap();

    let r = DesignRenderer::new(
        RenderConfig::default()
            .with_font_dirs(Vec::new())
            .with_media_root(&media),
    );
    let canvas = Canvas::new(40.0, 40.0).with_node(Node::Image(ImageNode {
        x: 0.0,
        y: 0.0,
        width: 40.0,
        height: 40.0,
        src: "../secret.png".to_string(),
    }));
    let img = r.rasterize(&canvas, 40, 40, 72.0).unwrap();
    // Placeholder, not the black secret.
    assert_eq!(img.pixel(20, 30), Some([0xee, 0xee, 0xee, 255]));
}

#[test]
fn local_media_image_is_drawn() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir(dir.path().join("uploads")).unwrap();
    let photo = image::RgbaImage::from_pixel(8, 8, image::Rgba([10, 200, 30, 255]));
    photo.save(dir.path().join("uploads/photo.png")).unwrap();

    let r = DesignRenderer::new(
        RenderConfig::default()
            .with_font_dirs(Vec::new())
            .with_media_root(dir.path()),
    );
    let json = r#"{"width": 40, "height": 40, "children": [
        {"className": "Image", "attrs": {"x": 10, "y": 10, "width": 20, "height": 20, "src": "uploads/photo.png"}}
    ]}"#;
    let out = r.export_png_from_json(json, 80, 80, 144.0).unwrap();
    let img = decode(&out.bytes);
    let px = img.get_pixel(40, 40).0;
    assert!(px[0].abs_diff(10) <= 1 && px[1].abs_diff(200) <= 1 && px[2].abs_diff(30) <= 1, "{px:?}");
    assert_eq!(img.get_pixel(5, 5).0, [255, 255, 255, 255]);
}

// =====================================================================
// Exporters
// =====================================================================

#[test]
fn png_output_is_deterministic() {
    let digest = || {
        let out = renderer()
            .export_png_from_json(templates::all_elements_template(), 600, 400, 144.0)
            .unwrap();
        Sha256::digest(&out.bytes)
    };
    assert_eq!(digest(), digest());
}

#[test]
fn preview_defaults_and_format() {
    let out = renderer()
        .render_preview_from_json(templates::flyer_template(), 400, 300)
        .unwrap();
    assert_eq!(out.content_type(), "image/jpeg");
    assert_eq!(&out.bytes[..2], &[0xFF, 0xD8]);
    assert_eq!(image::load_from_memory(&out.bytes).unwrap().width(), 400);
}

#[test]
fn pdf_page_size_matches_trim() {
    let dir = tempfile::tempdir().unwrap();
    let r = DesignRenderer::new(
        RenderConfig::default()
            .with_font_dirs(Vec::new())
            .with_temp_dir(dir.path())
            .with_title("Business card"),
    );
    let out = r
        .export_pdf_from_json(templates::business_card_template(), 89.0, 54.0, 150.0)
        .unwrap();
    assert_valid_pdf(&out.bytes);
    let (w, h) = out.page_size_pt.unwrap();
    assert!((w - 89.0 * 2.834645669).abs() < 1e-3, "{w}");
    assert!((h - 54.0 * 2.834645669).abs() < 1e-3, "{h}");
    assert_eq!((out.width_px, out.height_px), (526, 319));
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0, "temp raster leaked");

    // The document itself carries the exact trim box, not a rounded one.
    let doc = lopdf::Document::load_mem(&out.bytes).unwrap();
    let page_id = *doc.get_pages().values().next().unwrap();
    let page = doc.get_dictionary(page_id).unwrap();
    let keys: [&[u8]; 3] = [b"MediaBox", b"TrimBox", b"CropBox"];
    for key in keys {
        let bbox: Vec<f32> = page
            .get(key)
            .and_then(lopdf::Object::as_array)
            .unwrap()
            .iter()
            .map(|v| v.as_float().unwrap())
            .collect();
        assert!((bbox[2] - w).abs() < 1e-3, "{bbox:?}");
        assert!((bbox[3] - h).abs() < 1e-3, "{bbox:?}");
    }
}

#[test]
fn pdf_staging_failure_propagates() {
    let dir = tempfile::tempdir().unwrap();
    let r = DesignRenderer::new(
        RenderConfig::default()
            .with_font_dirs(Vec::new())
            .with_temp_dir(dir.path().join("missing")),
    );
    let err = r
        .export_pdf_from_json(templates::minimal_template(), 20.0, 20.0, 72.0)
        .unwrap_err();
    assert!(matches!(err, RenderError::Export(_)), "{err}");
}

#[test]
fn mm_px_round_trip_within_a_pixel() {
    for dpi in [72.0f32, 150.0, 300.0, 600.0] {
        for mm in [1.0f32, 25.4, 54.0, 89.0, 210.0, 297.0, 1000.0] {
            let px = units::mm_to_px(mm, dpi);
            let back = units::px_to_mm(px as f32, dpi);
            assert!((units::mm_to_px(back, dpi) as i64 - px as i64).abs() <= 1);
            assert!((back - mm).abs() <= 25.4 / dpi, "{mm} mm at {dpi} dpi");
        }
    }
}

// =====================================================================
// All templates render without error
// =====================================================================

#[test]
fn all_templates_render_successfully() {
    let r = renderer();
    for name in templates::TEMPLATE_NAMES {
        let json = templates::by_name(name).unwrap();
        let result = r.export_pdf_from_json(json, 50.0, 30.0, 100.0);
        assert!(result.is_ok(), "Template '{}' failed: {:?}", name, result.err());
        assert_valid_pdf(&result.unwrap().bytes);
    }
}

#[test]
fn renderer_shared_across_threads() {
    let r = Arc::new(renderer());
    let handles: Vec<_> = (0..4)
        .map(|_| {
            let r = Arc::clone(&r);
            std::thread::spawn(move || {
                r.export_png_from_json(templates::business_card_template(), 252, 153, 72.0)
                    .map(|out| Sha256::digest(&out.bytes))
            })
        })
        .collect();
    let digests: Vec<_> = handles.into_iter().map(|h| h.join().unwrap().unwrap()).collect();
    assert!(digests.windows(2).all(|w| w[0] == w[1]));
}
