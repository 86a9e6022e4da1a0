//! Pipeline – ties together parsing, rasterization and encoding behind the
//! three exporters (preview JPEG, print PNG, print PDF).

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::assets::{AssetLoader, DEFAULT_FETCH_TIMEOUT, DEFAULT_MAX_REMOTE_BYTES};
use crate::error::Result;
use crate::fonts::{self, FontCache};
use crate::raster::{RasterImage, Rasterizer};
use crate::render::{encode_jpeg, encode_pdf, encode_png};
use crate::scene::{Canvas, MAX_GROUP_DEPTH};
use crate::units;

/// Default preview size in px.
pub const DEFAULT_PREVIEW_WIDTH: u32 = 400;
pub const DEFAULT_PREVIEW_HEIGHT: u32 = 300;

pub const DEFAULT_JPEG_QUALITY: u8 = 85;

pub const MEDIA_ROOT_ENV: &str = "PRESS_FORGE_MEDIA_ROOT";
pub const FETCH_TIMEOUT_ENV: &str = "PRESS_FORGE_FETCH_TIMEOUT_MS";
pub const DESIGN_DPI_ENV: &str = "PRESS_FORGE_DESIGN_DPI";

/// Output encoding of an export.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Jpeg,
    Png,
    Pdf,
}

impl OutputFormat {
    pub fn content_type(self) -> &'static str {
        match self {
            OutputFormat::Jpeg => "image/jpeg",
            OutputFormat::Png => "image/png",
            OutputFormat::Pdf => "application/pdf",
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            OutputFormat::Jpeg => "jpg",
            OutputFormat::Png => "png",
            OutputFormat::Pdf => "pdf",
        }
    }
}

/// Bytes produced by an exporter plus what a caller needs to serve them.
#[derive(Debug, Clone)]
pub struct ExportOutput {
    pub bytes: Vec<u8>,
    pub format: OutputFormat,
    /// Pixel size of the raster that was encoded.
    pub width_px: u32,
    pub height_px: u32,
    /// Page size in points (PDF only).
    pub page_size_pt: Option<(f32, f32)>,
}

impl ExportOutput {
    pub fn content_type(&self) -> &'static str {
        self.format.content_type()
    }
}

/// Configuration for the render pipeline.
#[derive(Debug, Clone)]
pub struct RenderConfig {
    /// Document title embedded in PDF metadata (default: "press-forge output").
    pub title: String,
    /// DPI the design coordinates are authored in (default: 72).
    pub design_dpi: f32,
    /// Directory relative image paths are resolved against (default: `media`).
    pub media_root: PathBuf,
    /// Directories searched for font files.
    pub font_dirs: Vec<PathBuf>,
    /// Timeout for each remote image fetch (default: 10 s).
    pub fetch_timeout: Duration,
    /// Largest remote image body accepted (default: 20 MiB).
    pub max_remote_bytes: u64,
    /// JPEG quality for previews, 1–100 (default: 85).
    pub jpeg_quality: u8,
    /// Group nesting bound for parsing and traversal (default: 32).
    pub max_group_depth: usize,
    /// Where PDF export stages its temporary raster (default: system temp).
    pub temp_dir: Option<PathBuf>,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            title: "press-forge output".to_string(),
            design_dpi: units::DEFAULT_DESIGN_DPI,
            media_root: PathBuf::from("media"),
            font_dirs: fonts::system_font_dirs(),
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
            max_remote_bytes: DEFAULT_MAX_REMOTE_BYTES,
            jpeg_quality: DEFAULT_JPEG_QUALITY,
            max_group_depth: MAX_GROUP_DEPTH,
            temp_dir: None,
        }
    }
}

impl RenderConfig {
    /// Defaults overridden by `PRESS_FORGE_*` environment variables.
    /// Unparseable values are logged and ignored.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(root) = std::env::var(MEDIA_ROOT_ENV) {
            if !root.trim().is_empty() {
                config.media_root = PathBuf::from(root);
            }
        }
        if let Some(ms) = env_number::<u64>(FETCH_TIMEOUT_ENV) {
            config.fetch_timeout = Duration::from_millis(ms);
        }
        if let Some(dpi) = env_number::<f32>(DESIGN_DPI_ENV) {
            if dpi.is_finite() && dpi > 0.0 {
                config.design_dpi = dpi;
            } else {
                log::warn!("ignoring {DESIGN_DPI_ENV}={dpi}: must be positive");
            }
        }
        config
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn with_design_dpi(mut self, dpi: f32) -> Self {
        self.design_dpi = dpi;
        self
    }

    pub fn with_media_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.media_root = root.into();
        self
    }

    pub fn with_font_dirs(mut self, dirs: Vec<PathBuf>) -> Self {
        self.font_dirs = dirs;
        self
    }

    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    pub fn with_jpeg_quality(mut self, quality: u8) -> Self {
        self.jpeg_quality = quality;
        self
    }

    pub fn with_max_group_depth(mut self, depth: usize) -> Self {
        self.max_group_depth = depth;
        self
    }

    pub fn with_temp_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.temp_dir = Some(dir.into());
        self
    }
}

fn env_number<T: std::str::FromStr>(name: &str) -> Option<T> {
    let raw = std::env::var(name).ok()?;
    match raw.trim().parse() {
        Ok(v) => Some(v),
        Err(_) => {
            log::warn!("ignoring {name}={raw:?}: not a number");
            None
        }
    }
}

/// Renders designs to preview and print formats. `Send + Sync`; share one
/// instance across worker threads so the font cache is shared too.
pub struct DesignRenderer {
    config: RenderConfig,
    rasterizer: Rasterizer,
}

impl DesignRenderer {
    pub fn new(config: RenderConfig) -> Self {
        let fonts = Arc::new(FontCache::new(config.font_dirs.clone()));
        Self::with_font_cache(config, fonts)
    }

    /// Use an existing font cache, e.g. one shared with other renderers.
    pub fn with_font_cache(config: RenderConfig, fonts: Arc<FontCache>) -> Self {
        let assets = AssetLoader::new(
            config.media_root.clone(),
            config.fetch_timeout,
            config.max_remote_bytes,
        );
        let rasterizer = Rasterizer::new(fonts, assets).with_max_depth(config.max_group_depth);
        Self { config, rasterizer }
    }

    pub fn config(&self) -> &RenderConfig {
        &self.config
    }

    pub fn fonts(&self) -> &Arc<FontCache> {
        self.rasterizer.fonts()
    }

    /// Parse a scene document with this renderer's nesting bound.
    pub fn parse(&self, json: &str) -> Result<Canvas> {
        Ok(Canvas::from_json_with_limit(json, self.config.max_group_depth)?)
    }

    /// Paint `canvas` for a print run at `dpi` onto an exact pixel size.
    pub fn rasterize(&self, canvas: &Canvas, width_px: u32, height_px: u32, dpi: f32) -> Result<RasterImage> {
        let scale = units::scale_factor(dpi, self.config.design_dpi);
        self.rasterizer.rasterize_into(canvas, width_px, height_px, scale)
    }

    /// Small lossy JPEG at design scale.
    pub fn render_preview(&self, canvas: &Canvas, width_px: u32, height_px: u32) -> Result<ExportOutput> {
        let raster = self.rasterizer.rasterize_into(canvas, width_px, height_px, 1.0)?;
        let bytes = encode_jpeg(&raster, self.config.jpeg_quality)?;
        log::info!("rendered {width_px}x{height_px} preview ({} bytes)", bytes.len());
        Ok(ExportOutput {
            bytes,
            format: OutputFormat::Jpeg,
            width_px,
            height_px,
            page_size_pt: None,
        })
    }

    /// Lossless PNG of exactly `width_px × height_px`, tagged with `dpi`.
    pub fn export_png(&self, canvas: &Canvas, width_px: u32, height_px: u32, dpi: f32) -> Result<ExportOutput> {
        let raster = self.rasterize(canvas, width_px, height_px, dpi)?;
        let bytes = encode_png(&raster, dpi)?;
        log::info!("exported {width_px}x{height_px} PNG at {dpi} dpi ({} bytes)", bytes.len());
        Ok(ExportOutput {
            bytes,
            format: OutputFormat::Png,
            width_px,
            height_px,
            page_size_pt: None,
        })
    }

    /// PNG sized from a physical trim size.
    pub fn export_png_mm(&self, canvas: &Canvas, width_mm: f32, height_mm: f32, dpi: f32) -> Result<ExportOutput> {
        let width_px = units::mm_to_px(width_mm, dpi);
        let height_px = units::mm_to_px(height_mm, dpi);
        self.export_png(canvas, width_px, height_px, dpi)
    }

    /// Single-page PDF of exactly `width_mm × height_mm` with the raster
    /// drawn full-bleed.
    pub fn export_pdf(&self, canvas: &Canvas, width_mm: f32, height_mm: f32, dpi: f32) -> Result<ExportOutput> {
        let width_px = units::mm_to_px(width_mm, dpi);
        let height_px = units::mm_to_px(height_mm, dpi);
        let raster = self.rasterize(canvas, width_px, height_px, dpi)?;
        let bytes = encode_pdf(
            &raster,
            width_mm,
            height_mm,
            dpi,
            &self.config.title,
            self.config.temp_dir.as_deref(),
        )?;
        let page_size_pt = (units::mm_to_pt(width_mm), units::mm_to_pt(height_mm));
        log::info!(
            "exported {width_mm}x{height_mm} mm PDF at {dpi} dpi ({} bytes)",
            bytes.len()
        );
        Ok(ExportOutput {
            bytes,
            format: OutputFormat::Pdf,
            width_px,
            height_px,
            page_size_pt: Some(page_size_pt),
        })
    }

    pub fn render_preview_from_json(&self, json: &str, width_px: u32, height_px: u32) -> Result<ExportOutput> {
        let canvas = self.parse(json)?;
        self.render_preview(&canvas, width_px, height_px)
    }

    pub fn export_png_from_json(&self, json: &str, width_px: u32, height_px: u32, dpi: f32) -> Result<ExportOutput> {
        let canvas = self.parse(json)?;
        self.export_png(&canvas, width_px, height_px, dpi)
    }

    pub fn export_pdf_from_json(&self, json: &str, width_mm: f32, height_mm: f32, dpi: f32) -> Result<ExportOutput> {
        let canvas = self.parse(json)?;
        self.export_pdf(&canvas, width_mm, height_mm, dpi)
    }
}

impl Default for DesignRenderer {
    fn default() -> Self {
        Self::new(RenderConfig::default())
    }
}
