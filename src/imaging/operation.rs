//! The operation trait and the errors image work can raise.
//!
//! Every transformation is a pure function of its textual argument and an
//! input image. Operations parse their own argument, so adding one never
//! touches the query interpreter or the format negotiator: implement
//! [`Operation`] and register it in the [`Registry`](super::Registry).

use image::DynamicImage;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ImagingError {
    #[error("invalid argument for `{op}`: {reason}")]
    InvalidArgument { op: &'static str, reason: String },
    #[error("failed to decode image: {0}")]
    Decode(#[source] image::ImageError),
    #[error("failed to encode image: {0}")]
    Encode(#[source] image::ImageError),
    #[error("{0}")]
    Unsupported(String),
}

impl ImagingError {
    pub fn invalid(op: &'static str, reason: impl ToString) -> Self {
        ImagingError::InvalidArgument {
            op,
            reason: reason.to_string(),
        }
    }
}

/// A named image transformation.
///
/// `Sync` is required because a single registry is shared by every request
/// thread.
pub trait Operation: Send + Sync {
    /// Query parameter name that selects this operation.
    fn name(&self) -> &'static str;

    /// Parse `args` and produce a new image.
    fn apply(&self, args: &str, image: DynamicImage) -> Result<DynamicImage, ImagingError>;
}
