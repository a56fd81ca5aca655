//! Glitch effects: `chromaticSmear`, `colorCruncher`, `chromaticAberration`.
//!
//! All three work on an RGBA8 copy of the input. The cruncher and the
//! aberration build their output by adding displaced colour channels onto a
//! transparent canvas, so channels that land outside the image are dropped.

use image::{DynamicImage, Rgba, RgbaImage};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;

use super::calculations::resolve_offset;
use super::operation::{ImagingError, Operation};
use super::params::AxisOffset;

/// Directional momentum smear, averaged over four scan directions.
#[derive(Debug, Default, Clone, Copy)]
pub struct ChromaticSmear;

/// Seeded per-scanline channel jitter.
#[derive(Debug, Default, Clone, Copy)]
pub struct ColorCruncher;

/// Per-channel displacement.
#[derive(Debug, Default, Clone, Copy)]
pub struct ChromaticAberration;

// =========================================================================
// chromaticSmear
// =========================================================================

#[derive(Debug, Clone, Copy)]
enum Scan {
    LeftToRight,
    RightToLeft,
    TopToBottom,
    BottomToTop,
}

const SCANS: [Scan; 4] = [
    Scan::LeftToRight,
    Scan::RightToLeft,
    Scan::TopToBottom,
    Scan::BottomToTop,
];

/// Running per-channel state of one smear pass.
struct Smear {
    momentum: f64,
    state: [f64; 4],
}

impl Smear {
    fn new(momentum: u8) -> Self {
        Self {
            momentum: momentum as f64,
            state: [0.0; 4],
        }
    }

    fn reset(&mut self) {
        self.state = [0.0; 4];
    }

    fn step(&mut self, px: [u8; 4]) -> [u8; 4] {
        let m = self.momentum;
        let mut out = [0u8; 4];
        for (c, slot) in out.iter_mut().enumerate() {
            let s = &mut self.state[c];
            let mut n = px[c] as f64;
            if n > *s {
                *s = (*s * (255.0 - m) + n * m) / 255.0;
                n = (n + *s * 2.0) / 3.0;
            } else {
                n = (n + *s * 2.0) / 3.0;
                *s = (*s * m + n * (255.0 - m)) / 255.0;
            }
            *slot = n as u8;
        }
        out
    }
}

/// Run one directional pass. State resets at the start of every line.
fn smear_pass(src: &RgbaImage, momentum: u8, scan: Scan) -> RgbaImage {
    let (w, h) = src.dimensions();
    let mut out = RgbaImage::new(w, h);
    let mut smear = Smear::new(momentum);
    let mut visit = |x: u32, y: u32, smear: &mut Smear| {
        out.put_pixel(x, y, Rgba(smear.step(src.get_pixel(x, y).0)));
    };

    match scan {
        Scan::LeftToRight | Scan::RightToLeft => {
            for y in 0..h {
                smear.reset();
                if matches!(scan, Scan::LeftToRight) {
                    (0..w).for_each(|x| visit(x, y, &mut smear));
                } else {
                    (0..w).rev().for_each(|x| visit(x, y, &mut smear));
                }
            }
        }
        Scan::TopToBottom | Scan::BottomToTop => {
            for x in 0..w {
                smear.reset();
                if matches!(scan, Scan::TopToBottom) {
                    (0..h).for_each(|y| visit(x, y, &mut smear));
                } else {
                    (0..h).rev().for_each(|y| visit(x, y, &mut smear));
                }
            }
        }
    }
    out
}

impl Operation for ChromaticSmear {
    fn name(&self) -> &'static str {
        "chromaticSmear"
    }

    fn apply(&self, args: &str, image: DynamicImage) -> Result<DynamicImage, ImagingError> {
        let raw = args.trim_end_matches('%');
        let momentum: u8 = raw
            .parse()
            .map_err(|e| ImagingError::invalid("chromaticSmear", format!("`{raw}`: {e}")))?;

        let src = image.to_rgba8();
        let passes: Vec<RgbaImage> = SCANS
            .par_iter()
            .map(|scan| smear_pass(&src, momentum, *scan))
            .collect();

        let (w, h) = src.dimensions();
        let out = RgbaImage::from_fn(w, h, |x, y| {
            let mut sum = [0u32; 4];
            for pass in &passes {
                for (acc, v) in sum.iter_mut().zip(pass.get_pixel(x, y).0) {
                    *acc += v as u32;
                }
            }
            Rgba(sum.map(|v| (v / passes.len() as u32) as u8))
        });
        Ok(DynamicImage::ImageRgba8(out))
    }
}

// =========================================================================
// Additive compositing shared by cruncher and aberration
// =========================================================================

/// Add one channel value onto `canvas` at a possibly out-of-bounds position.
fn add_channel(canvas: &mut RgbaImage, x: i64, y: i64, channel: usize, value: u8) {
    let (w, h) = canvas.dimensions();
    if x < 0 || y < 0 || x >= w as i64 || y >= h as i64 {
        return;
    }
    let px = canvas.get_pixel_mut(x as u32, y as u32);
    px.0[channel] = px.0[channel].saturating_add(value);
    px.0[3] = 255;
}

// =========================================================================
// colorCruncher
// =========================================================================

/// Draw one displacement in `-3..=2`.
fn jitter(rng: &mut StdRng) -> i64 {
    rng.gen_range(0..6) - 3
}

impl Operation for ColorCruncher {
    fn name(&self) -> &'static str {
        "colorCruncher"
    }

    fn apply(&self, args: &str, image: DynamicImage) -> Result<DynamicImage, ImagingError> {
        let seed: i64 = args
            .parse()
            .map_err(|e| ImagingError::invalid("colorCruncher", format!("`{args}`: {e}")))?;
        let mut rng = StdRng::seed_from_u64(seed as u64);

        let src = image.to_rgba8();
        let (w, h) = src.dimensions();
        let mut out = RgbaImage::new(w, h);
        for y in 0..h {
            let dx = [jitter(&mut rng), jitter(&mut rng), jitter(&mut rng)];
            for x in 0..w {
                let dy = [jitter(&mut rng), jitter(&mut rng), jitter(&mut rng)];
                let px = src.get_pixel(x, y).0;
                for c in 0..3 {
                    add_channel(&mut out, x as i64 + dx[c], y as i64 + dy[c], c, px[c]);
                }
            }
        }
        Ok(DynamicImage::ImageRgba8(out))
    }
}

// =========================================================================
// chromaticAberration
// =========================================================================

/// Resolved pixel displacement for each colour channel, as `(x, y)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelOffsets {
    pub red: (i64, i64),
    pub green: (i64, i64),
    pub blue: (i64, i64),
}

impl ChannelOffsets {
    /// Offsets applied when the argument is empty: red right, blue down.
    pub const DEFAULT: ChannelOffsets = ChannelOffsets {
        red: (5, 0),
        green: (0, 0),
        blue: (0, 5),
    };

    const NONE: ChannelOffsets = ChannelOffsets {
        red: (0, 0),
        green: (0, 0),
        blue: (0, 0),
    };

    /// Parse an aberration argument against an image of `dims` pixels.
    ///
    /// Accepted forms:
    /// - `r:NxM,g:NxM,b:NxM` in any combination; missing channels stay put
    /// - a single unprefixed `NxM`, which moves red along x by `N` and blue
    ///   along y by `M`
    /// - a bare `N` anywhere an `NxM` is accepted, meaning `NxN`
    ///
    /// Each axis may end in `%`, `p` or `P` to be read as a percentage of the
    /// image extent along that axis. The y axis may carry a trailing `y`.
    /// Entries in none of these forms are skipped, and an argument with no
    /// usable entry yields [`ChannelOffsets::DEFAULT`]. A recognised entry
    /// whose numbers do not parse is an error.
    pub fn parse(args: &str, dims: (u32, u32)) -> Result<Self, ImagingError> {
        let entries: Vec<&str> = args
            .split(',')
            .map(str::trim)
            .filter(|e| !e.is_empty())
            .collect();

        if let [single] = entries.as_slice()
            && !single.contains(':')
        {
            let (x, y) = parse_pair(single, dims)?;
            return Ok(ChannelOffsets {
                red: (x, 0),
                green: (0, 0),
                blue: (0, y),
            });
        }

        let mut offsets = Self::NONE;
        let mut recognised = false;
        for entry in entries {
            let (slot, rest) = if let Some(rest) = entry.strip_prefix("r:") {
                (&mut offsets.red, rest)
            } else if let Some(rest) = entry.strip_prefix("g:") {
                (&mut offsets.green, rest)
            } else if let Some(rest) = entry.strip_prefix("b:") {
                (&mut offsets.blue, rest)
            } else {
                continue;
            };
            *slot = parse_pair(rest, dims)?;
            recognised = true;
        }
        Ok(if recognised { offsets } else { Self::DEFAULT })
    }
}

/// Parse `N`, `NxM` or `NxMy` into resolved pixel offsets.
fn parse_pair(s: &str, (w, h): (u32, u32)) -> Result<(i64, i64), ImagingError> {
    const OP: &str = "chromaticAberration";
    match s.split_once('x') {
        None => {
            let axis = AxisOffset::parse(OP, s)?;
            Ok((
                resolve_offset(axis.value, axis.percent, w),
                resolve_offset(axis.value, axis.percent, h),
            ))
        }
        Some((x, y)) => {
            let x = AxisOffset::parse(OP, x)?;
            let y = AxisOffset::parse(OP, y.strip_suffix('y').unwrap_or(y))?;
            Ok((
                resolve_offset(x.value, x.percent, w),
                resolve_offset(y.value, y.percent, h),
            ))
        }
    }
}

impl Operation for ChromaticAberration {
    fn name(&self) -> &'static str {
        "chromaticAberration"
    }

    fn apply(&self, args: &str, image: DynamicImage) -> Result<DynamicImage, ImagingError> {
        let src = image.to_rgba8();
        let (w, h) = src.dimensions();
        let offsets = ChannelOffsets::parse(args, (w, h))?;
        let shifts = [offsets.red, offsets.green, offsets.blue];

        let mut out = RgbaImage::new(w, h);
        for (x, y, px) in src.enumerate_pixels() {
            for (c, (dx, dy)) in shifts.iter().enumerate() {
                add_channel(&mut out, x as i64 + dx, y as i64 + dy, c, px.0[c]);
            }
        }
        Ok(DynamicImage::ImageRgba8(out))
    }
}
