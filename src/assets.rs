//! Asset loader – resolves an image reference into decoded pixels.
//!
//! Three kinds of reference are understood:
//! - `data:<mime>;base64,<payload>` URIs, decoded in memory;
//! - `http://` / `https://` URLs, fetched with a fixed timeout;
//! - paths relative to the media root.
//!
//! Every failure is logged and reported as `None`; drawing a placeholder is
//! the rasterizer's job.

use std::io::Read;
use std::path::{Component, Path, PathBuf};
use std::sync::OnceLock;
use std::time::Duration;

use base64::{engine::general_purpose::STANDARD as BASE64_STD, Engine as _};
use image::RgbaImage;
use reqwest::blocking::Client;
use reqwest::header::CONTENT_TYPE;

use crate::error::AssetError;

/// Default timeout for remote fetches.
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// Default cap on the size of a remote image body.
pub const DEFAULT_MAX_REMOTE_BYTES: u64 = 20 * 1024 * 1024;

/// The shape of an image reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetSource<'a> {
    /// A `data:` URI.
    Inline(&'a str),
    /// An `http(s)://` URL.
    Remote(&'a str),
    /// A path under the media root.
    Local(&'a str),
    /// Some other URL scheme (`file:`, `ftp:`, ...), never loaded.
    Unsupported(&'a str),
}

impl<'a> AssetSource<'a> {
    /// Classify a reference by its prefix. Returns `None` for an empty one.
    pub fn classify(src: &'a str) -> Option<Self> {
        let src = src.trim();
        if src.is_empty() {
            return None;
        }
        let lower = src.get(..8).unwrap_or(src).to_ascii_lowercase();
        let source = if lower.starts_with("data:") {
            AssetSource::Inline(src)
        } else if lower.starts_with("http://") || lower.starts_with("https://") {
            AssetSource::Remote(src)
        } else if src.contains("://") {
            AssetSource::Unsupported(src)
        } else {
            AssetSource::Local(src)
        };
        Some(source)
    }
}

/// Loads images for the rasterizer. Shareable across threads.
pub struct AssetLoader {
    media_root: PathBuf,
    timeout: Duration,
    max_remote_bytes: u64,
    client: OnceLock<Option<Client>>,
}

impl AssetLoader {
    pub fn new(media_root: impl Into<PathBuf>, timeout: Duration, max_remote_bytes: u64) -> Self {
        Self {
            media_root: media_root.into(),
            timeout,
            max_remote_bytes,
            client: OnceLock::new(),
        }
    }

    pub fn media_root(&self) -> &Path {
        &self.media_root
    }

    /// Resolve `src` to pixels, or `None` if it cannot be loaded.
    pub fn load(&self, src: &str) -> Option<RgbaImage> {
        match self.try_load(src) {
            Ok(img) => {
                log::debug!(
                    "loaded image {} ({}x{})",
                    abbreviate(src),
                    img.width(),
                    img.height()
                );
                Some(img)
            }
            Err(e) => {
                log::warn!("image {} unavailable: {e}", abbreviate(src));
                None
            }
        }
    }

    fn try_load(&self, src: &str) -> Result<RgbaImage, AssetError> {
        let bytes = match AssetSource::classify(src).ok_or(AssetError::Empty)? {
            AssetSource::Inline(uri) => parse_data_uri(uri)?,
            AssetSource::Remote(url) => self.fetch_remote(url)?,
            AssetSource::Local(path) => std::fs::read(self.resolve_local(path)?)?,
            AssetSource::Unsupported(url) => {
                return Err(AssetError::DisallowedPath(abbreviate(url)));
            }
        };
        Ok(image::load_from_memory(&bytes)?.to_rgba8())
    }

    fn client(&self) -> Option<&Client> {
        self.client
            .get_or_init(|| {
                Client::builder()
                    .timeout(self.timeout)
                    .build()
                    .map_err(|e| log::error!("cannot build HTTP client: {e}"))
                    .ok()
            })
            .as_ref()
    }

    fn fetch_remote(&self, url: &str) -> Result<Vec<u8>, AssetError> {
        let client = self.client().ok_or(AssetError::ClientUnavailable)?;
        let resp = client.get(url).send()?;

        let status = resp.status();
        if !status.is_success() {
            return Err(AssetError::Status(status.as_u16()));
        }

        let content_type = resp
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .trim()
            .to_ascii_lowercase();
        if !content_type.starts_with("image/") {
            return Err(AssetError::ContentType(content_type));
        }

        let max = self.max_remote_bytes;
        if resp.content_length().is_some_and(|len| len > max) {
            return Err(AssetError::TooLarge(max));
        }
        let mut body = Vec::new();
        resp.take(max + 1).read_to_end(&mut body)?;
        if body.len() as u64 > max {
            return Err(AssetError::TooLarge(max));
        }
        Ok(body)
    }

    /// Map a relative reference into the media root, refusing anything that
    /// could point outside it.
    fn resolve_local(&self, rel: &str) -> Result<PathBuf, AssetError> {
        let path = Path::new(rel);
        let plain = path
            .components()
            .all(|c| matches!(c, Component::Normal(_) | Component::CurDir));
        if path.is_absolute() || !plain {
            return Err(AssetError::DisallowedPath(rel.to_string()));
        }

        let full = self.media_root.join(path).canonicalize()?;
        let root = self.media_root.canonicalize()?;
        // Symlinks inside the root may still point elsewhere.
        if !full.starts_with(&root) {
            return Err(AssetError::DisallowedPath(rel.to_string()));
        }
        Ok(full)
    }
}

impl Default for AssetLoader {
    fn default() -> Self {
        Self::new("media", DEFAULT_FETCH_TIMEOUT, DEFAULT_MAX_REMOTE_BYTES)
    }
}

/// Parse a `data:<mime>;base64,<data>` URI and return the raw decoded bytes.
fn parse_data_uri(src: &str) -> Result<Vec<u8>, AssetError> {
    let rest = src
        .get(5..)
        .ok_or_else(|| AssetError::DataUri("truncated".to_string()))?;
    let (header, payload) = rest.split_once(',').ok_or_else(|| {
        AssetError::DataUri("missing `,` separator between header and data".to_string())
    })?;
    if !header.contains(";base64") {
        return Err(AssetError::DataUri(
            "only base64-encoded data URIs are supported".to_string(),
        ));
    }
    let cleaned: String = payload.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    Ok(BASE64_STD.decode(cleaned)?)
}

/// Keep data URIs out of the log.
fn abbreviate(src: &str) -> String {
    const MAX: usize = 80;
    match src.char_indices().nth(MAX) {
        Some((idx, _)) => format!("{}…", &src[..idx]),
        None => src.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageFormat, Rgba};
    use std::io::Cursor;

    fn png_bytes(w: u32, h: u32) -> Vec<u8> {
        let img = RgbaImage::from_pixel(w, h, Rgba([0, 128, 255, 255]));
        let mut out = Cursor::new(Vec::new());
        img.write_to(&mut out, ImageFormat::Png).unwrap();
        out.into_inner()
    }

    fn loader(root: &Path) -> AssetLoader {
        AssetLoader::new(root, Duration::from_secs(2), DEFAULT_MAX_REMOTE_BYTES)
    }

    #[test]
    fn classify_sources() {
        assert_eq!(AssetSource::classify("  "), None);
        assert!(matches!(AssetSource::classify("data:image/png;base64,AA"), Some(AssetSource::Inline(_))));
        assert!(matches!(AssetSource::classify("HTTPS://cdn.example/a.png"), Some(AssetSource::Remote(_))));
        assert!(matches!(AssetSource::classify("uploads/a.png"), Some(AssetSource::Local(_))));
        assert!(matches!(AssetSource::classify("file:///etc/passwd"), Some(AssetSource::Unsupported(_))));
    }

    #[test]
    fn missing_http_client_is_reported_as_such() {
        let l = loader(Path::new("."));
        assert!(l.client.set(None).is_ok());
        let err = l.try_load("http://127.0.0.1:9/a.png").unwrap_err();
        assert!(matches!(err, AssetError::ClientUnavailable), "{err}");
        assert!(l.load("http://127.0.0.1:9/a.png").is_none());
    }

    #[test]
    fn inline_data_uri() {
        let uri = format!("data:image/png;base64,{}", BASE64_STD.encode(png_bytes(3, 2)));
        let img = AssetLoader::default().load(&uri).unwrap();
        assert_eq!(img.dimensions(), (3, 2));
        assert_eq!(img.get_pixel(0, 0), &Rgba([0, 128, 255, 255]));
    }

    #[test]
    fn malformed_inline_data() {
        let loader = AssetLoader::default();
        assert!(loader.load("data:image/png;base64").is_none());
        assert!(loader.load("data:image/png,rawbytes").is_none());
        assert!(loader.load("data:image/png;base64,!!!notbase64").is_none());
        let not_an_image = format!("data:image/png;base64,{}", BASE64_STD.encode(b"hello"));
        assert!(loader.load(&not_an_image).is_none());
    }

    #[test]
    fn local_paths_stay_inside_media_root() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("uploads")).unwrap();
        std::fs::write(dir.path().join("uploads/logo.png"), png_bytes(4, 4)).unwrap();
        let loader = loader(dir.path());

        assert!(loader.load("uploads/logo.png").is_some());
        assert!(loader.load("./uploads/logo.png").is_some());
        assert!(loader.load("uploads/missing.png").is_none());
        assert!(loader.load("uploads/../uploads/logo.png").is_none());
        assert!(loader.load("../etc/passwd").is_none());
        let absolute = dir.path().join("uploads/logo.png");
        assert!(loader.load(absolute.to_str().unwrap()).is_none());
    }

    #[test]
    fn unreachable_remote_is_none() {
        let loader = AssetLoader::new("media", Duration::from_millis(500), DEFAULT_MAX_REMOTE_BYTES);
        assert!(loader.load("http://127.0.0.1:9/missing.png").is_none());
    }

    fn serve_once(body: Vec<u8>, content_type: &'static str, status: u16) -> String {
        let server = tiny_http::Server::http("127.0.0.1:0").unwrap();
        let addr = server.server_addr().to_string();
        std::thread::spawn(move || {
            if let Ok(request) = server.recv() {
                let header = format!("Content-Type: {content_type}")
                    .parse::<tiny_http::Header>()
                    .unwrap();
                let response = tiny_http::Response::from_data(body)
                    .with_header(header)
                    .with_status_code(status);
                let _ = request.respond(response);
            }
        });
        format!("http://{addr}/asset")
    }

    #[test]
    fn remote_image_is_fetched() {
        let url = serve_once(png_bytes(5, 5), "image/png", 200);
        let img = loader(Path::new("media")).load(&url).unwrap();
        assert_eq!(img.dimensions(), (5, 5));
    }

    #[test]
    fn remote_non_image_is_rejected() {
        let url = serve_once(png_bytes(5, 5), "text/html", 200);
        assert!(loader(Path::new("media")).load(&url).is_none());
    }

    #[test]
    fn remote_error_status_is_rejected() {
        let url = serve_once(png_bytes(5, 5), "image/png", 404);
        assert!(loader(Path::new("media")).load(&url).is_none());
    }

    #[test]
    fn remote_body_size_is_capped() {
        let url = serve_once(png_bytes(64, 64), "image/png", 200);
        let loader = AssetLoader::new("media", Duration::from_secs(2), 16);
        assert!(loader.load(&url).is_none());
    }
}
