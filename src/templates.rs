//! Sample scene documents for testing and demonstration.
//!
//! Each template exercises different node kinds and attribute forms. Sizes
//! are in design units at 72 DPI, so a business card is 252×153 (89×54 mm).

/// Names accepted by [`by_name`].
pub const TEMPLATE_NAMES: &[&str] = &["business_card", "flyer", "minimal", "all_elements"];

/// Look up a template by name.
pub fn by_name(name: &str) -> Option<&'static str> {
    match name {
        "business_card" | "card" => Some(business_card_template()),
        "flyer" => Some(flyer_template()),
        "minimal" => Some(minimal_template()),
        "all_elements" => Some(all_elements_template()),
        _ => None,
    }
}

/// Business card as the editor saves it: a Konva stage with one layer.
pub fn business_card_template() -> &'static str {
    r##"{
  "className": "Stage",
  "attrs": {"width": 252, "height": 153},
  "children": [
    {"className": "Layer", "children": [
      {"className": "Rect", "attrs": {"x": 0, "y": 0, "width": 252, "height": 153, "fill": "#ffffff"}},
      {"className": "Rect", "attrs": {"x": 0, "y": 0, "width": 12, "height": 153, "fill": "#1a365d"}},
      {"className": "Text", "attrs": {"x": 28, "y": 30, "text": "Jordan Avery", "fontSize": 20, "fontFamily": "Georgia", "fill": "#1a365d"}},
      {"className": "Text", "attrs": {"x": 28, "y": 56, "text": "Print Production Lead", "fontSize": 11, "fontFamily": "Arial", "fill": "#4a5568"}},
      {"className": "Line", "attrs": {"points": [28, 78, 224, 78], "stroke": "#cbd5e0", "strokeWidth": 1}},
      {"className": "Text", "attrs": {"x": 28, "y": 92, "text": "+1 555 0134", "fontSize": 10, "fill": "#2d3748"}},
      {"className": "Text", "attrs": {"x": 28, "y": 108, "text": "jordan@example.com", "fontSize": 10, "fill": "#2d3748"}},
      {"className": "Circle", "attrs": {"x": 210, "y": 116, "radius": 18, "fill": "#ed8936"}},
      {"className": "Text", "attrs": {"x": 210, "y": 110, "text": "JA", "fontSize": 12, "fill": "white", "align": "center"}}
    ]}
  ]
}"##
}

/// A5 flyer in the plain canvas form with a background colour.
pub fn flyer_template() -> &'static str {
    r##"{
  "width": 420,
  "height": 595,
  "background": "#fefcbf",
  "children": [
    {"className": "Rect", "attrs": {"x": 20, "y": 20, "width": 380, "height": 120, "fill": "#2b6cb0", "stroke": "#1a365d", "strokeWidth": 3}},
    {"className": "Text", "attrs": {"x": 210, "y": 55, "text": "SUMMER MARKET", "fontSize": 36, "fontFamily": "Impact", "fill": "#ffffff", "align": "center"}},
    {"className": "Text", "attrs": {"x": 210, "y": 100, "text": "Saturday 10am - 4pm", "fontSize": 16, "fill": "#bee3f8", "align": "center"}},
    {"className": "Group", "children": [
      {"className": "Ellipse", "attrs": {"x": 110, "y": 260, "radiusX": 80, "radiusY": 50, "fill": "rgba(237, 137, 54, 0.8)"}},
      {"className": "Ellipse", "attrs": {"x": 310, "y": 260, "radiusX": 80, "radiusY": 50, "fill": "rgba(56, 161, 105, 0.8)"}},
      {"className": "Circle", "attrs": {"x": 210, "y": 300, "radius": 60, "fill": "rgba(229, 62, 62, 0.8)", "stroke": "#742a2a", "strokeWidth": 2}}
    ]},
    {"className": "Line", "attrs": {"points": [40, 400, 140, 380, 240, 410, 380, 390], "stroke": "#2d3748", "strokeWidth": 4}},
    {"className": "Image", "attrs": {"x": 40, "y": 430, "width": 160, "height": 120, "src": "uploads/market-stall.jpg"}},
    {"className": "Text", "attrs": {"x": 380, "y": 540, "text": "Town Square", "fontSize": 18, "fontFamily": "Times New Roman", "fill": "#1a202c", "align": "right"}}
  ]
}"##
}

/// Minimal template for unit testing.
pub fn minimal_template() -> &'static str {
    r##"{"width": 100, "height": 100, "background": "#ffffff", "children": [
  {"className": "Rect", "attrs": {"x": 10, "y": 10, "width": 30, "height": 20, "fill": "#ff0000"}}
]}"##
}

/// Template exercising every node kind, including one the renderer skips.
pub fn all_elements_template() -> &'static str {
    r##"{
  "width": 300,
  "height": 200,
  "children": [
    {"className": "Rect", "attrs": {"x": 10, "y": 10, "width": 80, "height": 50, "fill": "#e53e3e", "stroke": "black", "strokeWidth": 2}},
    {"className": "Circle", "attrs": {"x": 140, "y": 35, "radius": 25, "fill": "blue"}},
    {"className": "Ellipse", "attrs": {"x": 230, "y": 35, "radiusX": 50, "radiusY": 20, "stroke": "green", "strokeWidth": 3}},
    {"className": "Line", "attrs": {"points": [10, 80, 290, 80], "stroke": "gray", "strokeWidth": 2}},
    {"className": "Text", "attrs": {"x": 10, "y": 95, "text": "Left", "fontSize": 14}},
    {"className": "Text", "attrs": {"x": 150, "y": 95, "text": "Center", "fontSize": 14, "align": "center"}},
    {"className": "Text", "attrs": {"x": 290, "y": 95, "text": "Right", "fontSize": 14, "align": "right"}},
    {"className": "Star", "attrs": {"x": 50, "y": 150, "numPoints": 5, "innerRadius": 10, "outerRadius": 20}},
    {"className": "Group", "children": [
      {"className": "Group", "children": [
        {"className": "Rect", "attrs": {"x": 100, "y": 130, "width": 40, "height": 40, "fill": "#38a169"}}
      ]}
    ]},
    {"className": "Image", "attrs": {"x": 160, "y": 130, "width": 60, "height": 40, "src": "data:image/png;base64,iVBORw0KGgoAAAANSUhEUgAAAAEAAAABCAYAAAAfFcSJAAAADUlEQVR42mNk+M9QDwADhgGAWjR9awAAAABJRU5ErkJggg=="}},
    {"className": "Image", "attrs": {"x": 230, "y": 130, "width": 60, "height": 40, "src": "uploads/missing.png"}}
  ]
}"##
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::{Canvas, Node};

    #[test]
    fn templates_are_valid_scenes() {
        for name in TEMPLATE_NAMES {
            let json = by_name(name).unwrap();
            let canvas = Canvas::from_json(json)
                .unwrap_or_else(|e| panic!("template '{name}' should parse: {e}"));
            assert!(!canvas.children.is_empty(), "template '{name}' is empty");
        }
        assert!(by_name("nope").is_none());
    }

    #[test]
    fn business_card_is_trim_size() {
        let canvas = Canvas::from_json(business_card_template()).unwrap();
        assert_eq!((canvas.width, canvas.height), (252.0, 153.0));
    }

    #[test]
    fn all_elements_keeps_unknown_kind() {
        let canvas = Canvas::from_json(all_elements_template()).unwrap();
        assert!(canvas
            .children
            .iter()
            .any(|n| matches!(n, Node::Unsupported { kind } if kind == "Star")));
        assert_eq!(canvas.depth(), 2);
    }
}
