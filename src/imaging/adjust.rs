//! Geometric and tonal adjustments: `size`, `sat`, `gamma`, `brightness`, `blur`.

use image::DynamicImage;
use image::imageops::FilterType;
use rayon::prelude::*;

use super::calculations::{
    SizeSpec, brightness_shift, gamma_table, saturation_factor, target_dimensions,
};
use super::operation::{ImagingError, Operation};
use super::params::{parse_finite, parse_percent};

/// Resize to a long edge (`800`) or exact dimensions (`400x300`).
#[derive(Debug, Default, Clone, Copy)]
pub struct Size;

/// Scale HSL saturation by a percentage (`150` = +50%).
#[derive(Debug, Default, Clone, Copy)]
pub struct Saturation;

/// Apply a gamma curve (`2.2` brightens, `0.5` darkens).
#[derive(Debug, Default, Clone, Copy)]
pub struct Gamma;

/// Shift every colour channel by a percentage of full scale.
#[derive(Debug, Default, Clone, Copy)]
pub struct Brightness;

/// Gaussian blur with the given sigma.
#[derive(Debug, Default, Clone, Copy)]
pub struct Blur;

/// Largest width or height `size` will produce.
pub const MAX_DIMENSION: u32 = 8192;

/// Largest sigma `blur` accepts.
pub const MAX_BLUR_SIGMA: f64 = 100.0;

fn parse_dimension(s: &str) -> Result<u32, ImagingError> {
    let value: u32 = s
        .parse()
        .map_err(|e| ImagingError::invalid("size", format!("`{s}`: {e}")))?;
    if value == 0 {
        return Err(ImagingError::invalid("size", "dimensions must be positive"));
    }
    Ok(value)
}

pub(crate) fn parse_size(args: &str) -> Result<SizeSpec, ImagingError> {
    match args.split_once('x') {
        None => Ok(SizeSpec::LongEdge(parse_dimension(args)?)),
        Some((w, h)) => Ok(SizeSpec::Exact(parse_dimension(w)?, parse_dimension(h)?)),
    }
}

impl Operation for Size {
    fn name(&self) -> &'static str {
        "size"
    }

    fn apply(&self, args: &str, image: DynamicImage) -> Result<DynamicImage, ImagingError> {
        let spec = parse_size(args)?;
        let (w, h) = target_dimensions((image.width(), image.height()), spec);
        if w > MAX_DIMENSION || h > MAX_DIMENSION {
            return Err(ImagingError::invalid(
                "size",
                format!("{w}x{h} exceeds the {MAX_DIMENSION}x{MAX_DIMENSION} output limit"),
            ));
        }
        if (w, h) == (image.width(), image.height()) {
            return Ok(image);
        }
        Ok(image.resize_exact(w, h, FilterType::CatmullRom))
    }
}

impl Operation for Saturation {
    fn name(&self) -> &'static str {
        "sat"
    }

    fn apply(&self, args: &str, image: DynamicImage) -> Result<DynamicImage, ImagingError> {
        let factor = saturation_factor(parse_percent("sat", args)?);
        let mut rgba = image.to_rgba8();
        rgba.par_chunks_exact_mut(4).for_each(|px| {
            let (h, s, l) = rgb_to_hsl(px[0], px[1], px[2]);
            let [r, g, b] = hsl_to_rgb(h, (s * factor).clamp(0.0, 1.0), l);
            px[0] = r;
            px[1] = g;
            px[2] = b;
        });
        Ok(DynamicImage::ImageRgba8(rgba))
    }
}

impl Operation for Gamma {
    fn name(&self) -> &'static str {
        "gamma"
    }

    fn apply(&self, args: &str, image: DynamicImage) -> Result<DynamicImage, ImagingError> {
        let table = gamma_table(parse_finite("gamma", args)?);
        let mut rgba = image.to_rgba8();
        rgba.par_chunks_exact_mut(4).for_each(|px| {
            for c in &mut px[..3] {
                *c = table[*c as usize];
            }
        });
        Ok(DynamicImage::ImageRgba8(rgba))
    }
}

impl Operation for Brightness {
    fn name(&self) -> &'static str {
        "brightness"
    }

    fn apply(&self, args: &str, image: DynamicImage) -> Result<DynamicImage, ImagingError> {
        let shift = brightness_shift(parse_percent("brightness", args)?);
        if shift == 0 {
            return Ok(image);
        }
        // Shift is in 8-bit units, so deeper sources are brought down first.
        let mut rgba = image.to_rgba8();
        rgba.par_chunks_exact_mut(4).for_each(|px| {
            for c in &mut px[..3] {
                *c = (*c as i32 + shift).clamp(0, 255) as u8;
            }
        });
        Ok(DynamicImage::ImageRgba8(rgba))
    }
}

impl Operation for Blur {
    fn name(&self) -> &'static str {
        "blur"
    }

    fn apply(&self, args: &str, image: DynamicImage) -> Result<DynamicImage, ImagingError> {
        let sigma = parse_finite("blur", args)?;
        if sigma <= 0.0 {
            return Ok(image);
        }
        if sigma > MAX_BLUR_SIGMA {
            return Err(ImagingError::invalid(
                "blur",
                format!("radius {sigma} exceeds {MAX_BLUR_SIGMA}"),
            ));
        }
        Ok(image.blur(sigma as f32))
    }
}

// =========================================================================
// HSL conversion
// =========================================================================

fn rgb_to_hsl(r: u8, g: u8, b: u8) -> (f64, f64, f64) {
    let r = r as f64 / 255.0;
    let g = g as f64 / 255.0;
    let b = b as f64 / 255.0;
    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let l = (max + min) / 2.0;

    if max == min {
        return (0.0, 0.0, l);
    }

    let d = max - min;
    let s = if l > 0.5 {
        d / (2.0 - max - min)
    } else {
        d / (max + min)
    };
    let h = if max == r {
        (g - b) / d + if g < b { 6.0 } else { 0.0 }
    } else if max == g {
        (b - r) / d + 2.0
    } else {
        (r - g) / d + 4.0
    };
    (h / 6.0, s, l)
}

fn hsl_to_rgb(h: f64, s: f64, l: f64) -> [u8; 3] {
    let channel = |v: f64| (v * 255.0).round().clamp(0.0, 255.0) as u8;
    if s == 0.0 {
        let v = channel(l);
        return [v, v, v];
    }
    let q = if l < 0.5 { l * (1.0 + s) } else { l + s - l * s };
    let p = 2.0 * l - q;
    [
        channel(hue_to_rgb(p, q, h + 1.0 / 3.0)),
        channel(hue_to_rgb(p, q, h)),
        channel(hue_to_rgb(p, q, h - 1.0 / 3.0)),
    ]
}

fn hue_to_rgb(p: f64, q: f64, t: f64) -> f64 {
    let t = t.rem_euclid(1.0);
    if t < 1.0 / 6.0 {
        p + (q - p) * 6.0 * t
    } else if t < 0.5 {
        q
    } else if t < 2.0 / 3.0 {
        p + (q - p) * (2.0 / 3.0 - t) * 6.0
    } else {
        p
    }
}
