//! Error types shared across the crate.
//!
//! Fatal pipeline failures surface as [`RenderError`]. Per-image problems
//! ([`ImageDecodeError`], image-side [`FetchError`]s) are logged and the
//! image is skipped, so they never abort a render on their own.

use thiserror::Error;

use crate::fonts::FontRole;

/// Failure while resolving an asset location to bytes.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("asset not found: {0}")]
    NotFound(String),

    #[error("unsupported asset location: {0}")]
    UnsupportedScheme(String),

    #[error("invalid data URI: {0}")]
    InvalidDataUri(String),

    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// The image bytes could not be decoded into a bitmap.
#[derive(Debug, Error)]
#[error("image decode failed: {0}")]
pub struct ImageDecodeError(pub String);

/// Fatal failure of the rendering pipeline.
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("template load failed: {0}")]
    TemplateLoad(String),

    #[error("{role} font load failed: {reason}")]
    FontLoad { role: FontRole, reason: String },

    #[error("failed to fetch {what}: {source}")]
    Fetch {
        what: String,
        #[source]
        source: FetchError,
    },

    #[error("failed to serialize PDF: {0}")]
    Serialize(String),

    #[error("certificate {0} not found")]
    RecordNotFound(String),

    #[error("record store is not configured")]
    StoreUnavailable,
}

/// A record failed validation at the boundary.
#[derive(Debug, Error)]
pub enum RecordError {
    #[error("unknown issuing authority: {0:?}")]
    UnknownAuthority(String),

    #[error("logo {found:?} does not match authority (expected {expected:?})")]
    InconsistentLogo { expected: String, found: String },

    #[error("issuing authority is empty")]
    MissingAuthority,

    #[error("certificate id is empty")]
    MissingId,

    #[error("invalid record JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Failure of a record store operation, as seen by callers that need a reason.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("record store is not configured")]
    Unavailable,

    #[error("failed to create certificate {0}")]
    CreateFailed(String),

    #[error("store I/O error at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("corrupt record {path}: {source}")]
    Json {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error(transparent)]
    Record(#[from] RecordError),
}

/// The verification QR code could not be produced.
#[derive(Debug, Error)]
pub enum QrError {
    #[error("QR encode failed: {0}")]
    Encode(String),

    #[error("QR image encode failed: {0}")]
    Image(String),
}
