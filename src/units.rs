//! Unit conversion between millimetres, pixels and PDF points.

/// Millimetres per inch.
pub const MM_PER_INCH: f32 = 25.4;

/// PDF points per millimetre (72 / 25.4).
pub const PT_PER_MM: f32 = 2.834645669;

/// DPI the editor authors its coordinates in.
pub const DEFAULT_DESIGN_DPI: f32 = 72.0;

/// Millimetres → whole pixels at `dpi`, rounded to nearest.
pub fn mm_to_px(mm: f32, dpi: f32) -> u32 {
    (mm as f64 * dpi as f64 / MM_PER_INCH as f64).round().max(0.0) as u32
}

/// Pixels → millimetres at `dpi`.
pub fn px_to_mm(px: f32, dpi: f32) -> f32 {
    px * MM_PER_INCH / dpi
}

/// Millimetres → PDF points.
pub fn mm_to_pt(mm: f32) -> f32 {
    mm * PT_PER_MM
}

/// PDF points → millimetres.
pub fn pt_to_mm(pt: f32) -> f32 {
    pt / PT_PER_MM
}

/// Factor applied to every design-space length when rendering at
/// `target_dpi`.
pub fn scale_factor(target_dpi: f32, design_dpi: f32) -> f32 {
    if design_dpi <= 0.0 {
        return 1.0;
    }
    target_dpi / design_dpi
}

/// DPI expressed as pixels per metre, the unit of the PNG `pHYs` chunk.
pub fn dpi_to_pixels_per_meter(dpi: f32) -> u32 {
    (dpi as f64 / 0.0254).round() as u32
}
