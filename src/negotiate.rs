//! Decide how a stored object is served for a given request.
//!
//! The checks run in a fixed order and the first one that decides wins:
//!
//! 1. GIF sources are never decoded. They are served as-is when nothing
//!    changes, and anything else is unsupported.
//! 2. The requested extension (or, without one, the source's own MIME)
//!    selects the target format. An unknown extension is unsupported.
//! 3. For lossy targets the modifier is parsed as quality.
//! 4. No operations and an unchanged MIME means the stored bytes are served
//!    as-is.
//! 5. Otherwise the target needs an encoder, or the request is unsupported.

use crate::error::{MediaError, Result};
use crate::imaging::codec::{format_for_extension, format_for_mime, mime_essence};
use crate::imaging::{Encoder, Quality};
use crate::query::TransformRequest;

const GIF_MIME: &str = "image/gif";

/// Where a decode→transform→encode result goes and how it is written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub mime: String,
    pub encoder: Encoder,
    pub quality: Quality,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Plan {
    /// Serve stored bytes with the stored MIME.
    Plain,
    /// Decode, run the pipeline, then encode to `Target`.
    Transcode(Target),
}

/// Choose a [`Plan`] for an image stored as `source_mime`.
pub fn plan(source_mime: &str, request: &TransformRequest) -> Result<Plan> {
    let source = mime_essence(source_mime).to_ascii_lowercase();
    let extension = request.extension.as_deref();

    if source == GIF_MIME {
        let same_format = extension.is_none_or(|ext| ext.eq_ignore_ascii_case("gif"));
        return match (same_format, request.has_operations()) {
            (true, false) => Ok(Plan::Plain),
            (true, true) => Err(MediaError::Unsupported(
                "gif images cannot be transformed".into(),
            )),
            (false, _) => Err(MediaError::Unsupported(
                "gif images cannot be converted".into(),
            )),
        };
    }

    let (target_mime, encoder) = match extension {
        Some(ext) => {
            let format = format_for_extension(ext).ok_or_else(|| {
                MediaError::Unsupported(format!("unknown output format `{ext}`"))
            })?;
            (format.mime.to_string(), format.encoder)
        }
        None => match format_for_mime(&source) {
            Some(format) => (format.mime.to_string(), format.encoder),
            None => (source.clone(), None),
        },
    };

    let quality = match encoder {
        Some(enc) if enc.is_lossy() => Quality::from_modifier(request.modifier.as_deref())?,
        _ => Quality::default(),
    };

    if !request.has_operations() && target_mime == source {
        return Ok(Plan::Plain);
    }

    let encoder = encoder.ok_or_else(|| {
        MediaError::Unsupported(format!("encoding to {target_mime} is not supported"))
    })?;

    Ok(Plan::Transcode(Target {
        mime: target_mime,
        encoder,
        quality,
    }))
}

/// Cache key for a transcoded representation.
///
/// `key:mime:modifier:canonical-query`. The modifier is kept even for
/// lossless targets so distinct requests never share an entry by accident.
pub fn derived_key(key: &str, target: &Target, request: &TransformRequest) -> String {
    format!(
        "{key}:{}:{}:{}",
        target.mime,
        request.modifier.as_deref().unwrap_or(""),
        request.canonical_query()
    )
}
