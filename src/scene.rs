//! Scene model – the typed design tree deserialised from the editor's JSON.
//!
//! The editor stores Konva-style documents: every node is
//! `{"className": "...", "attrs": {...}, "children": [...]}`. A canvas is
//! either a plain `{"width", "height", "background", "children"}` object or
//! a Konva `Stage` whose children are `Layer`s.
//!
//! Node kinds are a closed enum. Anything the renderer does not know is kept
//! as [`Node::Unsupported`] so the rasterizer can report it and carry on.

use serde::{Deserialize, Deserializer};
use serde_json::Value;

use crate::color::{self, deserialize_opt_color, Color};
use crate::error::ParseError;

/// Default bound on Group/Layer nesting.
pub const MAX_GROUP_DEPTH: usize = 32;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// The root of a design: page size in design units, background and the
/// top-level nodes in paint order.
#[derive(Debug, Clone, PartialEq)]
pub struct Canvas {
    pub width: f32,
    pub height: f32,
    pub background: Color,
    pub children: Vec<Node>,
}

/// One element of the design tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Text(TextNode),
    Rect(RectNode),
    Circle(CircleNode),
    Ellipse(EllipseNode),
    Line(LineNode),
    Image(ImageNode),
    Group(Vec<Node>),
    /// A `className` the renderer does not draw.
    Unsupported { kind: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TextAlign {
    #[default]
    Left,
    Center,
    Right,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TextNode {
    pub text: String,
    pub x: f32,
    pub y: f32,
    pub font_family: String,
    pub font_size: f32,
    #[serde(deserialize_with = "deserialize_opt_color")]
    pub fill: Option<Color>,
    pub align: TextAlign,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RectNode {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    #[serde(deserialize_with = "deserialize_opt_color")]
    pub fill: Option<Color>,
    #[serde(deserialize_with = "deserialize_opt_color")]
    pub stroke: Option<Color>,
    pub stroke_width: f32,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CircleNode {
    /// Centre.
    pub x: f32,
    pub y: f32,
    pub radius: f32,
    #[serde(deserialize_with = "deserialize_opt_color")]
    pub fill: Option<Color>,
    #[serde(deserialize_with = "deserialize_opt_color")]
    pub stroke: Option<Color>,
    pub stroke_width: f32,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EllipseNode {
    /// Centre.
    pub x: f32,
    pub y: f32,
    #[serde(rename = "radiusX")]
    pub radius_x: f32,
    #[serde(rename = "radiusY")]
    pub radius_y: f32,
    #[serde(deserialize_with = "deserialize_opt_color")]
    pub fill: Option<Color>,
    #[serde(deserialize_with = "deserialize_opt_color")]
    pub stroke: Option<Color>,
    pub stroke_width: f32,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct LineNode {
    /// Vertices in order. The wire format is a flat `[x1, y1, x2, y2, ...]`
    /// list; a dangling odd coordinate is dropped.
    #[serde(deserialize_with = "deserialize_points")]
    pub points: Vec<(f32, f32)>,
    #[serde(deserialize_with = "deserialize_opt_color")]
    pub stroke: Option<Color>,
    pub stroke_width: f32,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ImageNode {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub src: String,
}

// Defaults mirror what the editor assumes when an attribute is omitted.

impl Default for TextNode {
    fn default() -> Self {
        Self {
            text: String::new(),
            x: 0.0,
            y: 0.0,
            font_family: "Arial".to_string(),
            font_size: 16.0,
            fill: Some(Color::BLACK),
            align: TextAlign::Left,
        }
    }
}

impl Default for RectNode {
    fn default() -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            width: 100.0,
            height: 100.0,
            fill: None,
            stroke: None,
            stroke_width: 1.0,
        }
    }
}

impl Default for CircleNode {
    fn default() -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            radius: 50.0,
            fill: None,
            stroke: None,
            stroke_width: 1.0,
        }
    }
}

impl Default for EllipseNode {
    fn default() -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            radius_x: 50.0,
            radius_y: 30.0,
            fill: None,
            stroke: None,
            stroke_width: 1.0,
        }
    }
}

impl Default for LineNode {
    fn default() -> Self {
        Self {
            points: Vec::new(),
            stroke: Some(Color::BLACK),
            stroke_width: 1.0,
        }
    }
}

impl Default for ImageNode {
    fn default() -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            width: 100.0,
            height: 100.0,
            src: String::new(),
        }
    }
}

impl<'de> Deserialize<'de> for TextAlign {
    fn deserialize<D: Deserializer<'de>>(de: D) -> Result<Self, D::Error> {
        let raw: Option<String> = Option::deserialize(de)?;
        Ok(match raw.as_deref().map(str::trim) {
            Some("center") => TextAlign::Center,
            Some("right") => TextAlign::Right,
            _ => TextAlign::Left,
        })
    }
}

fn deserialize_points<'de, D: Deserializer<'de>>(de: D) -> Result<Vec<(f32, f32)>, D::Error> {
    let flat: Vec<f32> = Vec::deserialize(de)?;
    Ok(flat.chunks_exact(2).map(|p| (p[0], p[1])).collect())
}

impl Node {
    /// Editor class name of this node.
    pub fn kind(&self) -> &str {
        match self {
            Node::Text(_) => "Text",
            Node::Rect(_) => "Rect",
            Node::Circle(_) => "Circle",
            Node::Ellipse(_) => "Ellipse",
            Node::Line(_) => "Line",
            Node::Image(_) => "Image",
            Node::Group(_) => "Group",
            Node::Unsupported { kind } => kind,
        }
    }

    /// Approximate anchor of the node in design units, for diagnostics.
    pub fn position(&self) -> Option<(f32, f32)> {
        match self {
            Node::Text(n) => Some((n.x, n.y)),
            Node::Rect(n) => Some((n.x, n.y)),
            Node::Circle(n) => Some((n.x, n.y)),
            Node::Ellipse(n) => Some((n.x, n.y)),
            Node::Line(n) => n.points.first().copied(),
            Node::Image(n) => Some((n.x, n.y)),
            Node::Group(_) | Node::Unsupported { .. } => None,
        }
    }
}

impl Canvas {
    /// An empty white canvas.
    pub fn new(width: f32, height: f32) -> Self {
        Self {
            width,
            height,
            background: Color::WHITE,
            children: Vec::new(),
        }
    }

    pub fn with_background(mut self, background: Color) -> Self {
        self.background = background;
        self
    }

    pub fn with_node(mut self, node: Node) -> Self {
        self.children.push(node);
        self
    }

    /// Deepest Group/Layer nesting level (0 for a flat scene).
    pub fn depth(&self) -> usize {
        fn depth_of(nodes: &[Node]) -> usize {
            nodes
                .iter()
                .map(|n| match n {
                    Node::Group(children) => 1 + depth_of(children),
                    _ => 0,
                })
                .max()
                .unwrap_or(0)
        }
        depth_of(&self.children)
    }

    /// Parse a scene document with the default nesting bound.
    pub fn from_json(json: &str) -> Result<Self, ParseError> {
        Self::from_json_with_limit(json, MAX_GROUP_DEPTH)
    }

    /// Parse a scene document, rejecting Group nesting deeper than
    /// `max_depth`.
    pub fn from_json_with_limit(json: &str, max_depth: usize) -> Result<Self, ParseError> {
        let mut value: Value = serde_json::from_str(json)?;
        // Some callers store the design as a JSON string inside JSON.
        if let Value::String(inner) = value {
            value = serde_json::from_str(&inner)?;
        }
        Self::from_value(value, max_depth)
    }

    /// Build a canvas from an already-parsed JSON value.
    pub fn from_value(value: Value, max_depth: usize) -> Result<Self, ParseError> {
        let doc: RawDocument = serde_json::from_value(value)?;

        let stage = doc.attrs.unwrap_or_default();
        let width = doc.width.or(stage.width).unwrap_or(0.0);
        let height = doc.height.or(stage.height).unwrap_or(0.0);
        if !(width.is_finite() && height.is_finite() && width > 0.0 && height > 0.0) {
            return Err(ParseError::InvalidCanvas { width, height });
        }

        let background = doc
            .background
            .or(stage.background)
            .filter(|s| !s.trim().is_empty())
            .map(|s| color::resolve(&s))
            .unwrap_or(Color::WHITE);

        let children = doc
            .children
            .into_iter()
            .map(|raw| convert_node(raw, 0, max_depth))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            width,
            height,
            background,
            children,
        })
    }
}

// ---------------------------------------------------------------------------
// Wire format
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct RawDocument {
    #[serde(default)]
    width: Option<f32>,
    #[serde(default)]
    height: Option<f32>,
    #[serde(default, alias = "backgroundColor")]
    background: Option<String>,
    /// Present on Konva stage documents.
    #[serde(default)]
    attrs: Option<RawStageAttrs>,
    #[serde(default)]
    children: Vec<RawNode>,
}

#[derive(Deserialize, Default)]
struct RawStageAttrs {
    #[serde(default)]
    width: Option<f32>,
    #[serde(default)]
    height: Option<f32>,
    #[serde(default, alias = "backgroundColor")]
    background: Option<String>,
}

#[derive(Deserialize)]
struct RawNode {
    #[serde(rename = "className")]
    class_name: String,
    #[serde(default)]
    attrs: Value,
    #[serde(default)]
    children: Vec<RawNode>,
}

/// `depth` is the number of Group/Layer ancestors of `raw`.
fn convert_node(raw: RawNode, depth: usize, max_depth: usize) -> Result<Node, ParseError> {
    let attrs = if raw.attrs.is_null() {
        Value::Object(Default::default())
    } else {
        raw.attrs
    };

    let kind = raw.class_name;
    let invalid = |source| ParseError::InvalidAttrs {
        kind: kind.clone(),
        source,
    };

    let node = match kind.as_str() {
        "Text" => Node::Text(serde_json::from_value(attrs).map_err(invalid)?),
        "Rect" => Node::Rect(serde_json::from_value(attrs).map_err(invalid)?),
        "Circle" => Node::Circle(serde_json::from_value(attrs).map_err(invalid)?),
        "Ellipse" => Node::Ellipse(serde_json::from_value(attrs).map_err(invalid)?),
        "Line" => Node::Line(serde_json::from_value(attrs).map_err(invalid)?),
        "Image" => Node::Image(serde_json::from_value(attrs).map_err(invalid)?),
        "Group" | "Layer" => {
            if depth >= max_depth {
                return Err(ParseError::TooDeep { limit: max_depth });
            }
            let children = raw
                .children
                .into_iter()
                .map(|c| convert_node(c, depth + 1, max_depth))
                .collect::<Result<Vec<_>, _>>()?;
            Node::Group(children)
        }
        _ => Node::Unsupported { kind: kind.clone() },
    };
    Ok(node)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_flat_canvas() {
        let json = r##"{
            "width": 100, "height": 50, "background": "#000",
            "children": [
                {"className": "Rect", "attrs": {"x": 10, "y": 10, "width": 30, "height": 20, "fill": "#ff0000"}},
                {"className": "Text", "attrs": {"text": "Hi", "align": "center"}}
            ]
        }"##;
        let canvas = Canvas::from_json(json).unwrap();
        assert_eq!(canvas.width, 100.0);
        assert_eq!(canvas.background, Color::BLACK);
        assert_eq!(canvas.children.len(), 2);
        match &canvas.children[0] {
            Node::Rect(r) => {
                assert_eq!((r.x, r.y, r.width, r.height), (10.0, 10.0, 30.0, 20.0));
                assert_eq!(r.fill, Some(Color::rgb8(255, 0, 0)));
                assert_eq!(r.stroke, None);
                assert_eq!(r.stroke_width, 1.0);
            }
            other => panic!("expected rect, got {other:?}"),
        }
        match &canvas.children[1] {
            Node::Text(t) => {
                assert_eq!(t.font_family, "Arial");
                assert_eq!(t.font_size, 16.0);
                assert_eq!(t.align, TextAlign::Center);
            }
            other => panic!("expected text, got {other:?}"),
        }
    }

    #[test]
    fn parse_konva_stage() {
        let json = r#"{
            "className": "Stage",
            "attrs": {"width": 252, "height": 153},
            "children": [
                {"className": "Layer", "children": [
                    {"className": "Line", "attrs": {"points": [0, 0, 10, 10, 20, 0, 5]}},
                    {"className": "Star", "attrs": {"x": 1}}
                ]}
            ]
        }"#;
        let canvas = Canvas::from_json(json).unwrap();
        assert_eq!((canvas.width, canvas.height), (252.0, 153.0));
        assert_eq!(canvas.background, Color::WHITE);
        let Node::Group(layer) = &canvas.children[0] else {
            panic!("layer should parse as a group");
        };
        match &layer[0] {
            Node::Line(l) => assert_eq!(l.points, vec![(0.0, 0.0), (10.0, 10.0), (20.0, 0.0)]),
            other => panic!("expected line, got {other:?}"),
        }
        assert_eq!(layer[1].kind(), "Star");
        assert_eq!(canvas.depth(), 1);
    }

    #[test]
    fn string_wrapped_document() {
        let inner = r#"{"width": 10, "height": 10}"#;
        let outer = serde_json::to_string(inner).unwrap();
        let canvas = Canvas::from_json(&outer).unwrap();
        assert!(canvas.children.is_empty());
    }

    #[test]
    fn wrong_attribute_type_is_rejected() {
        let json = r#"{"width": 10, "height": 10, "children": [
            {"className": "Rect", "attrs": {"width": "wide"}}
        ]}"#;
        let err = Canvas::from_json(json).unwrap_err();
        assert!(matches!(err, ParseError::InvalidAttrs { ref kind, .. } if kind == "Rect"));
    }

    #[test]
    fn missing_class_name_is_rejected() {
        let json = r#"{"width": 10, "height": 10, "children": [{"attrs": {}}]}"#;
        assert!(matches!(Canvas::from_json(json), Err(ParseError::Json(_))));
    }

    #[test]
    fn invalid_canvas_size() {
        for json in [r#"{"height": 10}"#, r#"{"width": 0, "height": 10}"#, r#"{"width": -5, "height": 1}"#] {
            assert!(matches!(
                Canvas::from_json(json),
                Err(ParseError::InvalidCanvas { .. })
            ));
        }
    }

    #[test]
    fn nesting_bound() {
        let mut node = r#"{"className": "Rect"}"#.to_string();
        for _ in 0..5 {
            node = format!(r#"{{"className": "Group", "children": [{node}]}}"#);
        }
        let json = format!(r#"{{"width": 10, "height": 10, "children": [{node}]}}"#);
        assert_eq!(Canvas::from_json_with_limit(&json, 5).unwrap().depth(), 5);
        assert!(matches!(
            Canvas::from_json_with_limit(&json, 4),
            Err(ParseError::TooDeep { limit: 4 })
        ));
    }

    #[test]
    fn empty_color_means_unset() {
        let json = r#"{"width": 10, "height": 10, "children": [
            {"className": "Circle", "attrs": {"fill": "", "stroke": null}}
        ]}"#;
        let canvas = Canvas::from_json(json).unwrap();
        match &canvas.children[0] {
            Node::Circle(c) => {
                assert_eq!(c.fill, None);
                assert_eq!(c.stroke, None);
                assert_eq!(c.radius, 50.0);
            }
            other => panic!("expected circle, got {other:?}"),
        }
    }
}
