//! Rasterizer – paints a [`Canvas`] onto a `tiny_skia` pixmap.
//!
//! Nodes are painted depth-first in document order (painter's algorithm):
//! a later sibling overwrites an earlier one wherever they overlap. A node
//! that cannot be painted is logged and skipped; only allocating the
//! target raster can fail the whole call.

use std::collections::HashMap;
use std::sync::Arc;

use image::imageops::{self, FilterType};
use image::{RgbImage, RgbaImage};
use tiny_skia::{
    FillRule, LineCap, LineJoin, Paint, Path, PathBuilder, Pixmap, PixmapPaint, Rect, Stroke,
    Transform,
};

use crate::assets::AssetLoader;
use crate::color::Color;
use crate::error::{ExportError, NodePaintError, Result};
use crate::fonts::FontCache;
use crate::scene::{
    Canvas, CircleNode, EllipseNode, ImageNode, LineNode, Node, RectNode, TextAlign, TextNode,
    MAX_GROUP_DEPTH,
};

/// Largest raster edge we are willing to allocate, in px.
pub const MAX_RASTER_DIMENSION: u32 = 20_000;

const PLACEHOLDER_FILL: [u8; 3] = [0xee, 0xee, 0xee];
const PLACEHOLDER_OUTLINE: [u8; 3] = [0xcc, 0xcc, 0xcc];
const PLACEHOLDER_LABEL: [u8; 3] = [0x99, 0x99, 0x99];
const PLACEHOLDER_TEXT: &str = "Image";
const PLACEHOLDER_FONT_SIZE: f32 = 12.0;
const PLACEHOLDER_INSET: f32 = 5.0;

/// Bezier handle length for a quarter ellipse.
const KAPPA: f32 = 0.552_284_8;

// ---------------------------------------------------------------------------
// Output
// ---------------------------------------------------------------------------

/// A finished raster. Pixels are stored premultiplied; accessors return
/// straight alpha.
pub struct RasterImage {
    pixmap: Pixmap,
}

impl RasterImage {
    pub fn width(&self) -> u32 {
        self.pixmap.width()
    }

    pub fn height(&self) -> u32 {
        self.pixmap.height()
    }

    /// RGBA at `(x, y)`, or `None` outside the raster.
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        let c = self.pixmap.pixel(x, y)?.demultiply();
        Some([c.red(), c.green(), c.blue(), c.alpha()])
    }

    pub fn to_rgba_image(&self) -> RgbaImage {
        let mut out = RgbaImage::new(self.width(), self.height());
        for (dst, src) in out.pixels_mut().zip(self.pixmap.pixels()) {
            let c = src.demultiply();
            dst.0 = [c.red(), c.green(), c.blue(), c.alpha()];
        }
        out
    }

    /// Flatten onto white, for formats without an alpha channel.
    pub fn to_rgb_image(&self) -> RgbImage {
        let mut out = RgbImage::new(self.width(), self.height());
        for (dst, src) in out.pixels_mut().zip(self.pixmap.pixels()) {
            // Premultiplied: out = c + (255 - a).
            let white = 255 - src.alpha();
            dst.0 = [
                src.red().saturating_add(white),
                src.green().saturating_add(white),
                src.blue().saturating_add(white),
            ];
        }
        out
    }
}

// ---------------------------------------------------------------------------
// Rasterizer
// ---------------------------------------------------------------------------

/// Scene painter. Holds the shared font cache and the asset loader; every
/// call allocates its own raster, so one instance serves many threads.
pub struct Rasterizer {
    fonts: Arc<FontCache>,
    assets: AssetLoader,
    max_depth: usize,
}

/// Per-call painting state.
struct Frame {
    pixmap: Pixmap,
    scale: f32,
    /// Decoded sources by reference; `None` marks a failed load.
    images: HashMap<String, Option<RgbaImage>>,
}

impl Rasterizer {
    pub fn new(fonts: Arc<FontCache>, assets: AssetLoader) -> Self {
        Self {
            fonts,
            assets,
            max_depth: MAX_GROUP_DEPTH,
        }
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn fonts(&self) -> &Arc<FontCache> {
        &self.fonts
    }

    /// Paint `canvas` at `scale` px per design unit onto a raster of
    /// `round(width * scale) × round(height * scale)` px.
    pub fn rasterize(&self, canvas: &Canvas, scale: f32) -> Result<RasterImage> {
        let width = scaled_dimension(canvas.width, scale);
        let height = scaled_dimension(canvas.height, scale);
        self.rasterize_into(canvas, width, height, scale)
    }

    /// Paint `canvas` at `scale` onto a raster of exactly
    /// `width_px × height_px`. Content beyond the raster is clipped.
    pub fn rasterize_into(
        &self,
        canvas: &Canvas,
        width_px: u32,
        height_px: u32,
        scale: f32,
    ) -> Result<RasterImage> {
        let invalid = ExportError::InvalidSize {
            width: width_px,
            height: height_px,
        };
        if width_px > MAX_RASTER_DIMENSION
            || height_px > MAX_RASTER_DIMENSION
            || !scale.is_finite()
            || scale <= 0.0
        {
            return Err(invalid.into());
        }
        let mut pixmap = Pixmap::new(width_px, height_px).ok_or(invalid)?;
        pixmap.fill(canvas.background.to_skia());

        log::debug!(
            "rasterizing {} top-level nodes onto {width_px}x{height_px} px (scale {scale})",
            canvas.children.len()
        );

        let mut frame = Frame {
            pixmap,
            scale,
            images: HashMap::new(),
        };
        self.paint_nodes(&mut frame, &canvas.children, 0);
        Ok(RasterImage {
            pixmap: frame.pixmap,
        })
    }

    /// `depth` is the number of Group ancestors of `nodes`.
    fn paint_nodes(&self, frame: &mut Frame, nodes: &[Node], depth: usize) {
        for node in nodes {
            let painted = match node {
                Node::Group(children) => {
                    if depth >= self.max_depth {
                        log::warn!(
                            "group nesting exceeds {} levels; skipping {} nodes",
                            self.max_depth,
                            children.len()
                        );
                    } else {
                        self.paint_nodes(frame, children, depth + 1);
                    }
                    Ok(())
                }
                Node::Rect(rect) => paint_rect(frame, rect),
                Node::Circle(circle) => paint_circle(frame, circle),
                Node::Ellipse(ellipse) => paint_ellipse(frame, ellipse),
                Node::Line(line) => paint_line(frame, line),
                Node::Text(text) => self.paint_text(frame, text),
                Node::Image(image) => self.paint_image(frame, image),
                Node::Unsupported { kind } => {
                    log::info!("skipping unsupported node kind `{kind}`");
                    Ok(())
                }
            };
            if let Err(e) = painted {
                match node.position() {
                    Some((x, y)) => log::warn!("skipping {} node at ({x}, {y}): {e}", node.kind()),
                    None => log::warn!("skipping {} node: {e}", node.kind()),
                }
            }
        }
    }

    fn paint_text(&self, frame: &mut Frame, node: &TextNode) -> std::result::Result<(), NodePaintError> {
        if node.text.is_empty() {
            return Ok(());
        }
        let s = frame.scale;
        let (x, y) = finite_point(node.x * s, node.y * s)?;
        let size = node.font_size * s;
        if !size.is_finite() || size <= 0.0 {
            return Err(NodePaintError::Geometry);
        }

        let font = self.fonts.get_font(&node.font_family, size);
        let width = font.measure_text_width(&node.text);
        let x = match node.align {
            TextAlign::Left => x,
            TextAlign::Center => x - width / 2.0,
            TextAlign::Right => x - width,
        };
        let color = node.fill.unwrap_or(Color::BLACK);
        if !color.is_transparent() {
            font.draw_text(&mut frame.pixmap, &node.text, x, y, color);
        }
        Ok(())
    }

    fn paint_image(&self, frame: &mut Frame, node: &ImageNode) -> std::result::Result<(), NodePaintError> {
        let s = frame.scale;
        let (x, y) = finite_point(node.x * s, node.y * s)?;
        let (w, h) = finite_point(node.width * s, node.height * s)?;
        if w < 0.0 || h < 0.0 {
            return Err(NodePaintError::Geometry);
        }
        let (target_w, target_h) = (w.round(), h.round());
        if target_w == 0.0 || target_h == 0.0 {
            return Ok(());
        }
        // The resample buffer is target-sized, so bound it like the canvas.
        let limit = MAX_RASTER_DIMENSION as f32;
        if target_w > limit || target_h > limit {
            return Err(NodePaintError::Allocation {
                width: target_w.min(u32::MAX as f32) as u32,
                height: target_h.min(u32::MAX as f32) as u32,
            });
        }
        let (target_w, target_h) = (target_w as u32, target_h as u32);
        let (x, y) = (x.round(), y.round());
        let off_raster = x >= frame.pixmap.width() as f32
            || y >= frame.pixmap.height() as f32
            || x + target_w as f32 <= 0.0
            || y + target_h as f32 <= 0.0;
        if off_raster {
            return Ok(());
        }

        let loaded = frame
            .images
            .entry(node.src.clone())
            .or_insert_with(|| self.assets.load(&node.src));

        let Some(source) = loaded.as_ref() else {
            return self.paint_placeholder(frame, x, y, target_w, target_h);
        };

        let resized = imageops::resize(source, target_w, target_h, FilterType::Lanczos3);
        let sprite = premultiplied_pixmap(&resized).ok_or(NodePaintError::Allocation {
            width: target_w,
            height: target_h,
        })?;
        frame.pixmap.draw_pixmap(
            x as i32,
            y as i32,
            sprite.as_ref(),
            &PixmapPaint::default(),
            Transform::identity(),
            None,
        );
        Ok(())
    }

    /// Light box with a grey 1 px outline and an "Image" label, covering
    /// exactly `w × h` px.
    fn paint_placeholder(
        &self,
        frame: &mut Frame,
        x: f32,
        y: f32,
        w: u32,
        h: u32,
    ) -> std::result::Result<(), NodePaintError> {
        let (wf, hf) = (w as f32, h as f32);
        let area = Rect::from_xywh(x, y, wf, hf).ok_or(NodePaintError::Geometry)?;
        let [r, g, b] = PLACEHOLDER_FILL;
        frame.pixmap.fill_rect(area, &solid(Color::rgb8(r, g, b)), Transform::identity(), None);

        // Centre the outline on the edge pixels so it stays inside the box.
        if w >= 2 && h >= 2 {
            if let Some(edge) = Rect::from_xywh(x + 0.5, y + 0.5, wf - 1.0, hf - 1.0) {
                let [r, g, b] = PLACEHOLDER_OUTLINE;
                let outline = PathBuilder::from_rect(edge);
                frame.pixmap.stroke_path(
                    &outline,
                    &solid(Color::rgb8(r, g, b)),
                    &stroke(1.0),
                    Transform::identity(),
                    None,
                );
            }
        }

        let s = frame.scale;
        let font = self.fonts.get_font("default", PLACEHOLDER_FONT_SIZE * s);
        let inset = PLACEHOLDER_INSET * s;
        let fits = font.measure_text_width(PLACEHOLDER_TEXT) + 2.0 * inset <= wf
            && font.line_height_px() + 2.0 * inset <= hf;
        if fits {
            let [r, g, b] = PLACEHOLDER_LABEL;
            font.draw_text(
                &mut frame.pixmap,
                PLACEHOLDER_TEXT,
                x + inset,
                y + inset,
                Color::rgb8(r, g, b),
            );
        }
        Ok(())
    }
}

impl Default for Rasterizer {
    fn default() -> Self {
        Self::new(Arc::new(FontCache::default()), AssetLoader::default())
    }
}

// ---------------------------------------------------------------------------
// Shapes
// ---------------------------------------------------------------------------

fn paint_rect(frame: &mut Frame, node: &RectNode) -> std::result::Result<(), NodePaintError> {
    let s = frame.scale;
    let (mut x, mut y) = finite_point(node.x * s, node.y * s)?;
    let (mut w, mut h) = finite_point(node.width * s, node.height * s)?;
    // Negative sizes extend up/left of the anchor.
    if w < 0.0 {
        x += w;
        w = -w;
    }
    if h < 0.0 {
        y += h;
        h = -h;
    }
    if w == 0.0 || h == 0.0 {
        return Ok(());
    }
    let rect = Rect::from_xywh(x, y, w, h).ok_or(NodePaintError::Geometry)?;
    let path = PathBuilder::from_rect(rect);
    fill_and_stroke(frame, &path, node.fill, node.stroke, node.stroke_width);
    Ok(())
}

fn paint_circle(frame: &mut Frame, node: &CircleNode) -> std::result::Result<(), NodePaintError> {
    paint_oval(
        frame,
        (node.x, node.y),
        (node.radius, node.radius),
        node.fill,
        node.stroke,
        node.stroke_width,
    )
}

fn paint_ellipse(frame: &mut Frame, node: &EllipseNode) -> std::result::Result<(), NodePaintError> {
    paint_oval(
        frame,
        (node.x, node.y),
        (node.radius_x, node.radius_y),
        node.fill,
        node.stroke,
        node.stroke_width,
    )
}

fn paint_oval(
    frame: &mut Frame,
    center: (f32, f32),
    radii: (f32, f32),
    fill: Option<Color>,
    stroke_color: Option<Color>,
    stroke_width: f32,
) -> std::result::Result<(), NodePaintError> {
    let s = frame.scale;
    let (cx, cy) = finite_point(center.0 * s, center.1 * s)?;
    let (rx, ry) = finite_point(radii.0 * s, radii.1 * s)?;
    if rx < 0.0 || ry < 0.0 {
        return Err(NodePaintError::Geometry);
    }
    if rx == 0.0 || ry == 0.0 {
        return Ok(());
    }
    let path = oval_path(cx, cy, rx, ry).ok_or(NodePaintError::Geometry)?;
    fill_and_stroke(frame, &path, fill, stroke_color, stroke_width);
    Ok(())
}

fn paint_line(frame: &mut Frame, node: &LineNode) -> std::result::Result<(), NodePaintError> {
    let Some(color) = node.stroke else {
        return Ok(());
    };
    if node.points.len() < 2 || node.stroke_width <= 0.0 || color.is_transparent() {
        return Ok(());
    }
    let s = frame.scale;
    let mut pb = PathBuilder::new();
    for (i, &(px, py)) in node.points.iter().enumerate() {
        let (x, y) = finite_point(px * s, py * s)?;
        if i == 0 {
            pb.move_to(x, y);
        } else {
            pb.line_to(x, y);
        }
    }
    let path = pb.finish().ok_or(NodePaintError::Geometry)?;
    frame.pixmap.stroke_path(
        &path,
        &solid(color),
        &stroke(node.stroke_width * s),
        Transform::identity(),
        None,
    );
    Ok(())
}

/// Fill (if any), then stroke (if a colour and a positive width are set).
fn fill_and_stroke(
    frame: &mut Frame,
    path: &Path,
    fill: Option<Color>,
    stroke_color: Option<Color>,
    stroke_width: f32,
) {
    if let Some(color) = fill.filter(|c| !c.is_transparent()) {
        frame
            .pixmap
            .fill_path(path, &solid(color), FillRule::Winding, Transform::identity(), None);
    }
    let width = stroke_width * frame.scale;
    if let Some(color) = stroke_color.filter(|c| !c.is_transparent()) {
        if width.is_finite() && width > 0.0 {
            frame
                .pixmap
                .stroke_path(path, &solid(color), &stroke(width), Transform::identity(), None);
        }
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn solid(color: Color) -> Paint<'static> {
    let mut paint = Paint::default();
    paint.set_color(color.to_skia());
    paint.anti_alias = true;
    paint
}

fn stroke(width: f32) -> Stroke {
    Stroke {
        width,
        line_cap: LineCap::Butt,
        line_join: LineJoin::Miter,
        ..Stroke::default()
    }
}

/// Four-cubic approximation of an axis-aligned ellipse.
fn oval_path(cx: f32, cy: f32, rx: f32, ry: f32) -> Option<Path> {
    let (kx, ky) = (rx * KAPPA, ry * KAPPA);
    let mut pb = PathBuilder::new();
    pb.move_to(cx + rx, cy);
    pb.cubic_to(cx + rx, cy + ky, cx + kx, cy + ry, cx, cy + ry);
    pb.cubic_to(cx - kx, cy + ry, cx - rx, cy + ky, cx - rx, cy);
    pb.cubic_to(cx - rx, cy - ky, cx - kx, cy - ry, cx, cy - ry);
    pb.cubic_to(cx + kx, cy - ry, cx + rx, cy - ky, cx + rx, cy);
    pb.close();
    pb.finish()
}

fn finite_point(x: f32, y: f32) -> std::result::Result<(f32, f32), NodePaintError> {
    if x.is_finite() && y.is_finite() {
        Ok((x, y))
    } else {
        Err(NodePaintError::NonFinite)
    }
}

fn scaled_dimension(units: f32, scale: f32) -> u32 {
    let px = (units * scale).round();
    if px.is_finite() && px > 0.0 {
        px.min(u32::MAX as f32) as u32
    } else {
        0
    }
}

fn premultiplied_pixmap(img: &RgbaImage) -> Option<Pixmap> {
    let mut pixmap = Pixmap::new(img.width(), img.height())?;
    for (src, dst) in img
        .as_raw()
        .chunks_exact(4)
        .zip(pixmap.data_mut().chunks_exact_mut(4))
    {
        let a = src[3];
        dst[0] = premul_u8(src[0], a);
        dst[1] = premul_u8(src[1], a);
        dst[2] = premul_u8(src[2], a);
        dst[3] = a;
    }
    Some(pixmap)
}

fn premul_u8(channel: u8, alpha: u8) -> u8 {
    let prod = (channel as u16) * (alpha as u16) + 127;
    ((prod + (prod >> 8)) >> 8) as u8
}
