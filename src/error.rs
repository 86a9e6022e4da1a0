//! Error taxonomy for scene parsing, rendering, and export.
//!
//! Only [`ParseError`] and [`ExportError`] ever reach the caller. Asset,
//! font, and per-node paint failures are recovered inside the rasterizer
//! and only show up in the log.

use thiserror::Error;

/// Result type alias for render/export operations.
pub type Result<T> = std::result::Result<T, RenderError>;

/// Errors surfaced by the public render API.
#[derive(Error, Debug)]
pub enum RenderError {
    /// The scene document was rejected before any pixel was drawn.
    #[error("Invalid scene: {0}")]
    Parse(#[from] ParseError),

    /// Encoding or assembling the output failed.
    #[error("Export failed: {0}")]
    Export(#[from] ExportError),
}

/// The input document is structurally invalid.
#[derive(Error, Debug)]
pub enum ParseError {
    /// Not valid JSON, or the top-level shape is wrong.
    #[error("malformed scene JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// A node carries an attribute of the wrong type.
    #[error("invalid attributes on {kind} node: {source}")]
    InvalidAttrs {
        kind: String,
        #[source]
        source: serde_json::Error,
    },

    /// Group nesting exceeds the configured bound.
    #[error("scene nesting exceeds the limit of {limit} levels")]
    TooDeep { limit: usize },

    /// Canvas dimensions are missing, zero, negative, or not finite.
    #[error("invalid canvas size {width}x{height}")]
    InvalidCanvas { width: f32, height: f32 },
}

/// Writing the final bytes failed.
#[derive(Error, Debug)]
pub enum ExportError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("PNG encoding failed: {0}")]
    Png(#[from] png::EncodingError),

    #[error("JPEG encoding failed: {0}")]
    Jpeg(#[from] image::ImageError),

    #[error("PDF assembly failed: {0}")]
    Pdf(String),

    /// The requested output cannot be allocated (zero or absurd size).
    #[error("invalid output size {width}x{height} px")]
    InvalidSize { width: u32, height: u32 },
}

/// Why an image reference could not be turned into pixels. Never leaves
/// the crate; the rasterizer draws a placeholder instead.
#[derive(Error, Debug)]
pub(crate) enum AssetError {
    #[error("empty image source")]
    Empty,

    #[error("malformed data URI: {0}")]
    DataUri(String),

    #[error("base64 decode error: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("HTTP client unavailable")]
    ClientUnavailable,

    #[error("HTTP fetch failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("HTTP status {0}")]
    Status(u16),

    #[error("content type `{0}` is not an image")]
    ContentType(String),

    #[error("remote image exceeds {0} bytes")]
    TooLarge(u64),

    #[error("path `{0}` escapes the media root")]
    DisallowedPath(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("decode error: {0}")]
    Decode(#[from] image::ImageError),
}

/// A font file could not be located or parsed.
#[derive(Error, Debug)]
pub enum FontError {
    #[error("no candidate file found for `{0}`")]
    NotFound(String),

    #[error("unparseable font file {path}: {reason}")]
    Parse { path: String, reason: String },
}

/// A single node could not be painted.
#[derive(Error, Debug)]
pub(crate) enum NodePaintError {
    #[error("degenerate geometry")]
    Geometry,

    #[error("non-finite coordinate")]
    NonFinite,

    #[error("raster allocation failed for {width}x{height}")]
    Allocation { width: u32, height: u32 },
}
