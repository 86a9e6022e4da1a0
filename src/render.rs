//! Encoders – turn a finished [`RasterImage`] into JPEG, PNG or PDF bytes.
//!
//! PDF pages are produced with `printpdf` (v0.8 ops-based API): the raster
//! is written as a PNG to a scoped temporary file, read back, registered as
//! an XObject and drawn across the whole page. printpdf rounds page boxes
//! to whole points, so the saved document is reopened with `lopdf` and its
//! boxes are rewritten with the exact trim size.

use std::io::Write;
use std::path::Path;

use ::image::codecs::jpeg::JpegEncoder;
use printpdf::*;

use crate::error::ExportError;
use crate::raster::RasterImage;
use crate::units;

/// Encode as baseline JPEG. Transparent areas are flattened onto white.
pub fn encode_jpeg(raster: &RasterImage, quality: u8) -> Result<Vec<u8>, ExportError> {
    let rgb = raster.to_rgb_image();
    let mut out = Vec::new();
    JpegEncoder::new_with_quality(&mut out, quality.clamp(1, 100)).encode_image(&rgb)?;
    Ok(out)
}

/// Encode as 8-bit RGBA PNG with a pHYs chunk recording `dpi`.
pub fn encode_png(raster: &RasterImage, dpi: f32) -> Result<Vec<u8>, ExportError> {
    let rgba = raster.to_rgba_image();
    let mut out = Vec::new();
    {
        let mut encoder = ::png::Encoder::new(&mut out, rgba.width(), rgba.height());
        encoder.set_color(::png::ColorType::Rgba);
        encoder.set_depth(::png::BitDepth::Eight);
        let ppm = units::dpi_to_pixels_per_meter(dpi);
        if ppm > 0 {
            encoder.set_pixel_dims(Some(::png::PixelDimensions {
                xppu: ppm,
                yppu: ppm,
                unit: ::png::Unit::Meter,
            }));
        }
        let mut writer = encoder.write_header()?;
        writer.write_image_data(rgba.as_raw())?;
        writer.finish()?;
    }
    Ok(out)
}

/// Wrap `raster` in a single PDF page of exactly `width_mm × height_mm`.
///
/// The intermediate PNG lives in a temporary file under `temp_dir` (or the
/// system temp directory) that is removed when this function returns,
/// whether or not it succeeds.
pub fn encode_pdf(
    raster: &RasterImage,
    width_mm: f32,
    height_mm: f32,
    dpi: f32,
    title: &str,
    temp_dir: Option<&Path>,
) -> Result<Vec<u8>, ExportError> {
    let png_bytes = encode_png(raster, dpi)?;

    let builder = {
        let mut b = tempfile::Builder::new();
        b.prefix("press-forge-").suffix(".png");
        b
    };
    let mut staged = match temp_dir {
        Some(dir) => builder.tempfile_in(dir)?,
        None => builder.tempfile()?,
    };
    staged.write_all(&png_bytes)?;
    staged.flush()?;
    log::debug!(
        "staged {} byte raster at {}",
        png_bytes.len(),
        staged.path().display()
    );
    let staged_bytes = std::fs::read(staged.path())?;

    build_pdf_page(
        &staged_bytes,
        (raster.width(), raster.height()),
        (width_mm, height_mm),
        title,
    )
}

/// One page, one full-bleed image.
fn build_pdf_page(
    image_bytes: &[u8],
    (px_width, px_height): (u32, u32),
    (width_mm, height_mm): (f32, f32),
    title: &str,
) -> Result<Vec<u8>, ExportError> {
    if px_width == 0 || px_height == 0 {
        return Err(ExportError::InvalidSize {
            width: px_width,
            height: px_height,
        });
    }

    let mut doc = PdfDocument::new(title);
    let mut warnings: Vec<PdfWarnMsg> = Vec::new();
    let raw = RawImage::decode_from_bytes(image_bytes, &mut warnings).map_err(ExportError::Pdf)?;
    if !warnings.is_empty() {
        log::debug!("printpdf reported {} warnings while decoding the raster", warnings.len());
    }
    let xobj_id = doc.add_image(&raw);

    // At dpi=72 printpdf maps 1 px to 1 pt, so scale = page_pt / px.
    let page_w_pt = units::mm_to_pt(width_mm);
    let page_h_pt = units::mm_to_pt(height_mm);
    let ops = vec![Op::UseXobject {
        id: xobj_id,
        transform: XObjectTransform {
            translate_x: Some(Pt(0.0)),
            translate_y: Some(Pt(0.0)),
            dpi: Some(72.0),
            scale_x: Some(page_w_pt / px_width as f32),
            scale_y: Some(page_h_pt / px_height as f32),
            rotate: None,
        },
    }];

    let page = PdfPage::new(Mm(width_mm), Mm(height_mm), ops);
    doc.with_pages(vec![page]);
    let bytes = doc.save(&PdfSaveOptions::default(), &mut Vec::new());
    set_exact_page_boxes(&bytes, page_w_pt, page_h_pt)
}

/// Rewrite MediaBox, TrimBox and CropBox of every page as real numbers.
fn set_exact_page_boxes(pdf: &[u8], width_pt: f32, height_pt: f32) -> Result<Vec<u8>, ExportError> {
    let mut doc = lopdf::Document::load_mem(pdf).map_err(lopdf_err)?;
    let page_box = || {
        lopdf::Object::Array(vec![
            lopdf::Object::Real(0.0),
            lopdf::Object::Real(0.0),
            lopdf::Object::Real(width_pt),
            lopdf::Object::Real(height_pt),
        ])
    };
    for page_id in doc.get_pages().into_values() {
        let page = doc.get_dictionary_mut(page_id).map_err(lopdf_err)?;
        page.set("MediaBox", page_box());
        page.set("TrimBox", page_box());
        page.set("CropBox", page_box());
    }
    let mut out = Vec::new();
    doc.save_to(&mut out).map_err(|e| lopdf_err(e.into()))?;
    Ok(out)
}

fn lopdf_err(err: lopdf::Error) -> ExportError {
    ExportError::Pdf(format!("page box rewrite failed: {err}"))
}
