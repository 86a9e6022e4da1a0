//! # press-forge – design renderer for print products
//!
//! This crate turns a design made in a browser editor (a Konva-style tree
//! of shapes, text and images) into print-ready output. The pipeline stages
//! are:
//!
//! 1. **Parse** – scene JSON → typed [`scene::Canvas`] ([`scene`])
//! 2. **Rasterize** – paint the tree at the target DPI ([`raster`]), with
//!    fonts from [`fonts`] and images from [`assets`]
//! 3. **Encode** – JPEG preview, PNG with physical DPI, or a single-page
//!    PDF of the exact trim size ([`render`])
//!
//! [`pipeline::DesignRenderer`] wraps all three. A C-compatible FFI surface
//! is exposed via the [`ffi`] module.

pub mod assets;
pub mod bitmap_font;
pub mod color;
pub mod error;
pub mod ffi;
pub mod fonts;
pub mod pipeline;
pub mod raster;
pub mod render;
pub mod scene;
pub mod templates;
pub mod units;

// Re-exports for convenience
pub use error::{ExportError, FontError, ParseError, RenderError, Result};
pub use pipeline::{DesignRenderer, ExportOutput, OutputFormat, RenderConfig};
pub use scene::{Canvas, Node};
