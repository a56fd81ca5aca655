//! Pure calculation functions for image dimensions and offsets.
//!
//! All functions here are pure and testable without any I/O or images.

/// Requested output size for the `size` operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SizeSpec {
    /// Scale so the longer edge equals this many pixels, keeping the aspect ratio.
    LongEdge(u32),
    /// Exact output dimensions, ignoring the aspect ratio.
    Exact(u32, u32),
}

/// Calculate output dimensions for a resize.
///
/// For [`SizeSpec::LongEdge`] the ratio is `target / long_edge` and the short
/// edge is truncated after scaling. Width drives when `width >= height`.
/// Neither output edge is ever below one pixel.
///
/// # Examples
/// ```text
/// (1600, 800), LongEdge(800)  → (800, 400)
/// (800, 1600), LongEdge(400)  → (200, 400)
/// (1000, 1),   LongEdge(10)   → (10, 1)
/// ```
pub fn target_dimensions(source: (u32, u32), spec: SizeSpec) -> (u32, u32) {
    match spec {
        SizeSpec::Exact(w, h) => (w.max(1), h.max(1)),
        SizeSpec::LongEdge(target) => {
            let (src_w, src_h) = source;
            if src_w >= src_h {
                let ratio = target as f64 / src_w.max(1) as f64;
                let h = (src_h as f64 * ratio).trunc() as u32;
                (target.max(1), h.max(1))
            } else {
                let ratio = target as f64 / src_h as f64;
                let w = (src_w as f64 * ratio).trunc() as u32;
                (w.max(1), target.max(1))
            }
        }
    }
}

/// Resolve one offset axis to whole pixels.
///
/// Percent offsets are taken relative to `extent`, the image size along the
/// same axis. Fractions truncate toward zero.
pub fn resolve_offset(value: f64, percent: bool, extent: u32) -> i64 {
    if percent {
        (extent as f64 * value / 100.0).trunc() as i64
    } else {
        value.trunc() as i64
    }
}

/// Saturation multiplier for a percentage argument (`100` = unchanged).
///
/// The delta is clamped to ±100 so the multiplier stays within `0.0..=2.0`.
pub fn saturation_factor(percent: f64) -> f64 {
    1.0 + (percent - 100.0).clamp(-100.0, 100.0) / 100.0
}

/// Additive brightness shift for a percentage argument (`100` = unchanged).
pub fn brightness_shift(percent: f64) -> i32 {
    (255.0 * (percent - 100.0).clamp(-100.0, 100.0) / 100.0).round() as i32
}

/// Build a 256-entry gamma lookup table.
///
/// `gamma > 1` brightens, `gamma < 1` darkens. Non-positive values are
/// floored at a tiny epsilon so the exponent stays finite.
pub fn gamma_table(gamma: f64) -> [u8; 256] {
    let exponent = 1.0 / gamma.max(1e-4);
    let mut table = [0u8; 256];
    for (i, slot) in table.iter_mut().enumerate() {
        let v = 255.0 * (i as f64 / 255.0).powf(exponent);
        *slot = v.round().clamp(0.0, 255.0) as u8;
    }
    table
}
