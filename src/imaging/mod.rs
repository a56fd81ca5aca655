//! Image processing: codecs and the named transformation operations.
//!
//! | Operation | Argument | Implementation |
//! |---|---|---|
//! | `size` | `800` or `400x300` | `DynamicImage::resize_exact` (Catmull-Rom) |
//! | `sat` | percent, `150` = +50% | HSL saturation multiplier |
//! | `brightness` | percent, `80` = -20% | `DynamicImage::brighten` |
//! | `gamma` | gamma value | lookup table |
//! | `blur` | sigma | `DynamicImage::blur` |
//! | `chromaticSmear` | momentum 0–255 | four directional passes, averaged |
//! | `colorCruncher` | seed | seeded per-scanline channel jitter |
//! | `chromaticAberration` | `NxM`, `g:NxM,b:NxM` | per-channel offsets |
//!
//! The module is split into:
//! - **Operation**: the [`Operation`] trait every transform implements, plus [`ImagingError`]
//! - **Calculations**: pure dimension/offset math (unit testable)
//! - **Parameters**: argument parsing shared by several operations
//! - **Adjust / Glitch**: the operation implementations
//! - **Pipeline**: the [`Registry`] that names operations and runs them in order
//! - **Codec**: MIME/extension tables, decode and encode

pub mod adjust;
mod calculations;
pub mod codec;
pub mod glitch;
pub mod operation;
mod params;
pub mod pipeline;

pub use codec::{Encoder, OutputFormat, decode, encode};
pub use operation::{ImagingError, Operation};
pub use params::Quality;
pub use pipeline::{Registry, Step};
