//! Font resolution, caching, text measurement and glyph drawing.
//!
//! A requested family goes through a fixed chain:
//!
//! 1. the alias table maps editor families (Arial, Times, ...) to candidate
//!    font files, searched in the configured font directories;
//! 2. failing that, the default system sans-serif chain is tried;
//! 3. failing that, the built-in bitmap font is used (no file I/O).
//!
//! Handles are memoized per `(resolved family, pixel size)` and font files
//! are read at most once per path, so the cache can be shared by every
//! render in the process.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock, RwLock};

use tiny_skia::{FillRule, Paint, PathBuilder, Pixmap, Transform};
use ttf_parser::{GlyphId, OutlineBuilder};

use crate::bitmap_font;
use crate::color::Color;
use crate::error::FontError;

/// Environment variable holding extra font directories (path-list syntax).
pub const FONT_DIR_ENV: &str = "PRESS_FORGE_FONT_DIR";

/// Family key used for the default system font chain.
const DEFAULT_FAMILY: &str = "default";

/// Files tried, in order, when the requested family is unavailable.
const DEFAULT_CANDIDATES: &[&str] = &[
    "LiberationSans-Regular.ttf",
    "DejaVuSans.ttf",
    "arial.ttf",
    "Arial.ttf",
    "Helvetica.ttc",
    "NotoSans-Regular.ttf",
];

/// Editor family (lowercase) → (resolved family, candidate files).
const ALIASES: &[(&str, &str, &[&str])] = &[
    ("arial", "arial", &["arial.ttf", "Arial.ttf", "LiberationSans-Regular.ttf"]),
    ("helvetica", "arial", &["arial.ttf", "Arial.ttf", "LiberationSans-Regular.ttf"]),
    ("times", "times", &["times.ttf", "Times New Roman.ttf", "LiberationSerif-Regular.ttf", "DejaVuSerif.ttf"]),
    ("times new roman", "times", &["times.ttf", "Times New Roman.ttf", "LiberationSerif-Regular.ttf", "DejaVuSerif.ttf"]),
    ("courier", "courier", &["cour.ttf", "Courier New.ttf", "LiberationMono-Regular.ttf", "DejaVuSansMono.ttf"]),
    ("courier new", "courier", &["cour.ttf", "Courier New.ttf", "LiberationMono-Regular.ttf", "DejaVuSansMono.ttf"]),
    ("verdana", "verdana", &["verdana.ttf", "Verdana.ttf", "DejaVuSans.ttf"]),
    ("georgia", "georgia", &["georgia.ttf", "Georgia.ttf", "DejaVuSerif.ttf"]),
    ("comic sans ms", "comic sans ms", &["comic.ttf", "Comic Sans MS.ttf"]),
    ("impact", "impact", &["impact.ttf", "Impact.ttf"]),
];

/// A parsed outline font with the metrics we need for layout.
pub struct FontData {
    /// Raw font bytes (kept alive for ttf-parser's zero-copy API).
    pub bytes: Vec<u8>,
    pub source: String,
    pub units_per_em: f32,
    pub ascender: f32,
    pub descender: f32,
    pub line_gap: f32,
}

impl FontData {
    fn parse(bytes: Vec<u8>, source: String) -> Result<Self, FontError> {
        let face = ttf_parser::Face::parse(&bytes, 0).map_err(|e| FontError::Parse {
            path: source.clone(),
            reason: e.to_string(),
        })?;
        Ok(Self {
            units_per_em: face.units_per_em().max(1) as f32,
            ascender: face.ascender() as f32,
            descender: face.descender() as f32,
            line_gap: face.line_gap() as f32,
            source,
            bytes,
        })
    }
}

#[derive(Clone)]
enum Face {
    Outline(Arc<FontData>),
    Bitmap,
}

/// A font resolved at a particular pixel size. Cheap to clone.
#[derive(Clone)]
pub struct FontHandle {
    family: String,
    size_px: f32,
    face: Face,
}

/// Memoization key.
#[derive(Debug, Clone, Hash, PartialEq, Eq)]
pub struct FontKey {
    pub family: String,
    pub size_px: u32,
}

impl FontHandle {
    fn bitmap(family: &str, size_px: f32) -> Self {
        Self {
            family: family.to_string(),
            size_px,
            face: Face::Bitmap,
        }
    }

    /// Family the request resolved to.
    pub fn family(&self) -> &str {
        &self.family
    }

    pub fn size_px(&self) -> f32 {
        self.size_px
    }

    /// True when this handle draws with the built-in bitmap font.
    pub fn is_builtin(&self) -> bool {
        matches!(self.face, Face::Bitmap)
    }

    /// Where the outline data came from, if any.
    pub fn source(&self) -> Option<&str> {
        match &self.face {
            Face::Outline(data) => Some(&data.source),
            Face::Bitmap => None,
        }
    }

    /// Width of a single line of text in px (sum of glyph advances).
    pub fn measure_text_width(&self, text: &str) -> f32 {
        let data = match &self.face {
            Face::Outline(data) => data,
            Face::Bitmap => return bitmap_font::measure(text, self.size_px),
        };
        let Ok(face) = ttf_parser::Face::parse(&data.bytes, 0) else {
            return bitmap_font::measure(text, self.size_px);
        };
        let scale = self.size_px / data.units_per_em;
        text.chars()
            .map(|ch| match face.glyph_index(ch) {
                Some(gid) => face.glyph_hor_advance(gid).unwrap_or(0) as f32 * scale,
                None => bitmap_font::advance(self.size_px),
            })
            .sum()
    }

    /// Distance from the top of the line box to the baseline, in px.
    pub fn ascender_px(&self) -> f32 {
        match &self.face {
            Face::Outline(data) => data.ascender * self.size_px / data.units_per_em,
            Face::Bitmap => self.size_px * 7.0 / 8.0,
        }
    }

    /// Natural line height in px.
    pub fn line_height_px(&self) -> f32 {
        match &self.face {
            Face::Outline(data) => {
                (data.ascender - data.descender + data.line_gap) * self.size_px / data.units_per_em
            }
            Face::Bitmap => self.size_px,
        }
    }

    /// Draw one line of text whose line box starts at `(x, y)` (top-left).
    ///
    /// Characters the outline font has no glyph for are drawn with the
    /// bitmap font so they never disappear. Returns the number of glyphs
    /// that produced ink.
    pub fn draw_text(&self, pixmap: &mut Pixmap, text: &str, x: f32, y: f32, color: Color) -> usize {
        let data = match &self.face {
            Face::Outline(data) => data,
            Face::Bitmap => return bitmap_font::draw_text(pixmap, text, x, y, self.size_px, color),
        };
        let Ok(face) = ttf_parser::Face::parse(&data.bytes, 0) else {
            return bitmap_font::draw_text(pixmap, text, x, y, self.size_px, color);
        };

        let scale = self.size_px / data.units_per_em;
        let baseline = y + self.ascender_px();
        let mut paint = Paint::default();
        paint.set_color(color.to_skia());
        paint.anti_alias = true;

        let mut pen_x = x;
        let mut inked = 0;
        for ch in text.chars() {
            let Some(gid) = face.glyph_index(ch) else {
                if bitmap_font::draw_char(pixmap, ch, pen_x, y, self.size_px, color) > 0 {
                    inked += 1;
                }
                pen_x += bitmap_font::advance(self.size_px);
                continue;
            };
            let mut builder = GlyphPathBuilder::new(pen_x, baseline, scale);
            if face.outline_glyph(gid, &mut builder).is_some() {
                if let Some(path) = builder.finish() {
                    pixmap.fill_path(&path, &paint, FillRule::Winding, Transform::identity(), None);
                    inked += 1;
                }
            }
            pen_x += glyph_advance(&face, gid) * scale;
        }
        inked
    }
}

fn glyph_advance(face: &ttf_parser::Face<'_>, gid: GlyphId) -> f32 {
    face.glyph_hor_advance(gid).unwrap_or(0) as f32
}

/// Maps glyph outlines (font units, y up) into pixmap space (px, y down).
struct GlyphPathBuilder {
    builder: PathBuilder,
    origin_x: f32,
    baseline: f32,
    scale: f32,
}

impl GlyphPathBuilder {
    fn new(origin_x: f32, baseline: f32, scale: f32) -> Self {
        Self {
            builder: PathBuilder::new(),
            origin_x,
            baseline,
            scale,
        }
    }

    fn map(&self, x: f32, y: f32) -> (f32, f32) {
        (self.origin_x + x * self.scale, self.baseline - y * self.scale)
    }

    fn finish(self) -> Option<tiny_skia::Path> {
        self.builder.finish()
    }
}

impl OutlineBuilder for GlyphPathBuilder {
    fn move_to(&mut self, x: f32, y: f32) {
        let (x, y) = self.map(x, y);
        self.builder.move_to(x, y);
    }

    fn line_to(&mut self, x: f32, y: f32) {
        let (x, y) = self.map(x, y);
        self.builder.line_to(x, y);
    }

    fn quad_to(&mut self, x1: f32, y1: f32, x: f32, y: f32) {
        let (x1, y1) = self.map(x1, y1);
        let (x, y) = self.map(x, y);
        self.builder.quad_to(x1, y1, x, y);
    }

    fn curve_to(&mut self, x1: f32, y1: f32, x2: f32, y2: f32, x: f32, y: f32) {
        let (x1, y1) = self.map(x1, y1);
        let (x2, y2) = self.map(x2, y2);
        let (x, y) = self.map(x, y);
        self.builder.cubic_to(x1, y1, x2, y2, x, y);
    }

    fn close(&mut self) {
        self.builder.close();
    }
}

// ---------------------------------------------------------------------------
// Cache
// ---------------------------------------------------------------------------

/// Thread-safe font resolver. Entries are written once and never evicted.
pub struct FontCache {
    font_dirs: Vec<PathBuf>,
    /// Lowercase file name → first path found under `font_dirs`.
    file_index: OnceLock<HashMap<String, PathBuf>>,
    /// Resolved family → parsed face (`None` = known to be unavailable).
    faces: RwLock<HashMap<String, Option<Arc<FontData>>>>,
    handles: RwLock<HashMap<FontKey, FontHandle>>,
}

impl FontCache {
    pub fn new(font_dirs: Vec<PathBuf>) -> Self {
        Self {
            font_dirs,
            file_index: OnceLock::new(),
            faces: RwLock::new(HashMap::new()),
            handles: RwLock::new(HashMap::new()),
        }
    }

    /// A cache that never touches the filesystem; every request resolves
    /// to the built-in bitmap font unless fonts are registered explicitly.
    pub fn builtin_only() -> Self {
        Self::new(Vec::new())
    }

    /// Register font bytes under an editor family name. Must happen before
    /// the family is first requested.
    pub fn register_font(&self, family: &str, bytes: Vec<u8>) -> Result<(), FontError> {
        let data = FontData::parse(bytes, format!("registered:{family}"))?;
        let (resolved, _) = resolve_alias(family);
        let mut faces = self.faces.write().unwrap_or_else(|p| p.into_inner());
        faces.insert(resolved.to_string(), Some(Arc::new(data)));
        Ok(())
    }

    /// Resolve `(family, size_px)` to a drawable font. Never fails.
    pub fn get_font(&self, family: &str, size_px: f32) -> FontHandle {
        let size_px = if size_px.is_finite() { size_px.round().max(1.0) } else { 1.0 };
        let (resolved, candidates) = resolve_alias(family);
        let key = FontKey {
            family: resolved.to_string(),
            size_px: size_px as u32,
        };

        if let Some(handle) = self.handles.read().unwrap_or_else(|p| p.into_inner()).get(&key) {
            return handle.clone();
        }

        let face = self
            .face_for(resolved, candidates)
            .or_else(|| self.face_for(DEFAULT_FAMILY, DEFAULT_CANDIDATES));
        let handle = match face {
            Some(data) => FontHandle {
                family: resolved.to_string(),
                size_px,
                face: Face::Outline(data),
            },
            None => {
                log::debug!("no font file for `{family}`; using built-in bitmap font");
                FontHandle::bitmap(resolved, size_px)
            }
        };

        let mut handles = self.handles.write().unwrap_or_else(|p| p.into_inner());
        handles.entry(key).or_insert(handle).clone()
    }

    /// Number of memoized handles.
    pub fn len(&self) -> usize {
        self.handles.read().unwrap_or_else(|p| p.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn face_for(&self, family: &str, candidates: &[&str]) -> Option<Arc<FontData>> {
        if let Some(entry) = self.faces.read().unwrap_or_else(|p| p.into_inner()).get(family) {
            return entry.clone();
        }

        let loaded = match self.load_first(family, candidates) {
            Ok(data) => {
                log::debug!("font `{family}` resolved to {}", data.source);
                Some(Arc::new(data))
            }
            Err(e) => {
                log::debug!("font `{family}` unavailable: {e}");
                None
            }
        };
        let mut faces = self.faces.write().unwrap_or_else(|p| p.into_inner());
        faces.entry(family.to_string()).or_insert(loaded).clone()
    }

    fn load_first(&self, family: &str, candidates: &[&str]) -> Result<FontData, FontError> {
        let index = self.file_index.get_or_init(|| index_font_dirs(&self.font_dirs));
        let mut last_err = FontError::NotFound(family.to_string());
        for name in candidates {
            let Some(path) = index.get(&name.to_ascii_lowercase()) else {
                continue;
            };
            let bytes = match std::fs::read(path) {
                Ok(b) => b,
                Err(e) => {
                    last_err = FontError::Parse {
                        path: path.display().to_string(),
                        reason: e.to_string(),
                    };
                    continue;
                }
            };
            match FontData::parse(bytes, path.display().to_string()) {
                Ok(data) => return Ok(data),
                Err(e) => last_err = e,
            }
        }
        Err(last_err)
    }
}

impl Default for FontCache {
    fn default() -> Self {
        Self::new(system_font_dirs())
    }
}

/// Map an editor family to its resolved name and candidate files. Unknown
/// families go straight to the default chain.
fn resolve_alias(family: &str) -> (&'static str, &'static [&'static str]) {
    let normalized = family.trim().to_ascii_lowercase();
    ALIASES
        .iter()
        .find(|(name, _, _)| *name == normalized)
        .map(|(_, resolved, files)| (*resolved, *files))
        .unwrap_or((DEFAULT_FAMILY, DEFAULT_CANDIDATES))
}

/// Platform font directories plus anything listed in [`FONT_DIR_ENV`].
pub fn system_font_dirs() -> Vec<PathBuf> {
    let mut dirs = Vec::new();

    if let Ok(extra) = std::env::var(FONT_DIR_ENV) {
        dirs.extend(std::env::split_paths(&extra).filter(|p| !p.as_os_str().is_empty()));
    }

    #[cfg(target_os = "windows")]
    {
        dirs.push(PathBuf::from(r"C:\Windows\Fonts"));
        if let Ok(windir) = std::env::var("WINDIR") {
            dirs.push(PathBuf::from(windir).join("Fonts"));
        }
    }

    #[cfg(target_os = "linux")]
    {
        dirs.push(PathBuf::from("/usr/share/fonts"));
        dirs.push(PathBuf::from("/usr/local/share/fonts"));
        if let Ok(home) = std::env::var("HOME") {
            dirs.push(PathBuf::from(home).join(".fonts"));
        }
    }

    #[cfg(target_os = "macos")]
    {
        dirs.push(PathBuf::from("/System/Library/Fonts"));
        dirs.push(PathBuf::from("/Library/Fonts"));
        if let Ok(home) = std::env::var("HOME") {
            dirs.push(PathBuf::from(home).join("Library/Fonts"));
        }
    }

    dirs
}

/// Walk `dirs` (a few levels deep) and index font files by lowercase name.
/// Earlier directories win.
fn index_font_dirs(dirs: &[PathBuf]) -> HashMap<String, PathBuf> {
    const MAX_DEPTH: usize = 4;

    fn walk(dir: &Path, depth: usize, out: &mut HashMap<String, PathBuf>) {
        let Ok(entries) = std::fs::read_dir(dir) else {
            return;
        };
        let mut entries: Vec<_> = entries.flatten().map(|e| e.path()).collect();
        entries.sort();
        for path in entries {
            if path.is_dir() {
                if depth < MAX_DEPTH {
                    walk(&path, depth + 1, out);
                }
                continue;
            }
            let is_font = path
                .extension()
                .and_then(|e| e.to_str())
                .map(|e| matches!(e.to_ascii_lowercase().as_str(), "ttf" | "otf" | "ttc"))
                .unwrap_or(false);
            if !is_font {
                continue;
            }
            if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                out.entry(name.to_ascii_lowercase()).or_insert(path);
            }
        }
    }

    let mut index = HashMap::new();
    for dir in dirs {
        walk(dir, 0, &mut index);
    }
    log::debug!("indexed {} font files", index.len());
    index
}
