//! Argument parsing shared by several operations and the encoders.
//!
//! ## Types
//!
//! - [`Quality`]: Lossy encoding quality (1–100, default 75). Clamped on construction.
//! - [`parse_percent`]: `"150"` / `"150%"` → `150.0`.
//! - [`AxisOffset`]: one axis of a pixel or percent offset (`"5"`, `"2.5%"`, `"10p"`).

use super::operation::ImagingError;

/// Quality setting for lossy image encoding (1-100).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quality(pub u32);

impl Quality {
    pub fn new(value: u32) -> Self {
        Self(value.clamp(1, 100))
    }

    pub fn value(self) -> u32 {
        self.0
    }

    /// Parse the `:modifier` of a resource name. Absent or empty means default.
    pub fn from_modifier(modifier: Option<&str>) -> Result<Self, ImagingError> {
        match modifier.filter(|m| !m.is_empty()) {
            None => Ok(Self::default()),
            Some(m) => m
                .parse::<i64>()
                .map(|q| Self::new(q.clamp(1, 100) as u32))
                .map_err(|e| ImagingError::invalid("quality", format!("`{m}`: {e}"))),
        }
    }

    pub fn as_u8(self) -> u8 {
        self.0 as u8
    }
}

impl Default for Quality {
    fn default() -> Self {
        Self(75)
    }
}

/// Parse a percentage with an optional trailing `%`.
pub fn parse_percent(op: &'static str, s: &str) -> Result<f64, ImagingError> {
    parse_finite(op, s.trim_end_matches('%'))
}

/// Parse a finite float, rejecting `NaN` and infinities.
pub fn parse_finite(op: &'static str, s: &str) -> Result<f64, ImagingError> {
    let value: f64 = s
        .parse()
        .map_err(|e| ImagingError::invalid(op, format!("`{s}`: {e}")))?;
    if !value.is_finite() {
        return Err(ImagingError::invalid(op, format!("`{s}` is not finite")));
    }
    Ok(value)
}

/// One axis of an offset, either absolute pixels or a percentage of the
/// image extent along that axis.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AxisOffset {
    pub value: f64,
    pub percent: bool,
}

impl AxisOffset {
    /// Parse `"5"`, `"-3"`, `"2.5%"`, `"10p"` or `"10P"`.
    pub fn parse(op: &'static str, s: &str) -> Result<Self, ImagingError> {
        let percent = s.ends_with(['%', 'p', 'P']);
        let value = parse_finite(op, s.trim_end_matches(['%', 'p', 'P']))?;
        Ok(Self { value, percent })
    }
}
