//! Error types for the capture engine.
//!
//! Ordinary game outcomes (rejected GPS samples, unmet loop closures, leaving the
//! territory) are return values, not errors. Only contract violations and
//! startup/decoding problems end up here.

use thiserror::Error;

/// Why a ring was refused as a region or territory polygon.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum GeometryIssue {
    /// Fewer than 3 distinct vertices after normalization.
    #[error("fewer than 3 distinct vertices")]
    TooFewVertices,
    /// A vertex has a NaN/infinite or out-of-range coordinate.
    #[error("non-finite or out-of-range coordinate")]
    InvalidCoordinate,
    /// Two edges of the ring cross or touch.
    #[error("ring intersects itself")]
    SelfIntersecting,
    /// The ring encloses no area.
    #[error("ring has zero area")]
    ZeroArea,
}

/// Errors returned by fallible engine operations.
#[derive(Debug, Clone, PartialEq, Error)]
#[cfg_attr(feature = "ffi", derive(uniffi::Error), uniffi(flat_error))]
pub enum CaptureError {
    /// A captured polygon was degenerate. The registry was not modified.
    #[error("invalid capture geometry: {0}")]
    InvalidGeometry(GeometryIssue),

    /// The configured territory polygon is unusable.
    #[error("invalid territory: {0}")]
    InvalidTerritory(GeometryIssue),

    /// Engine configuration could not be parsed.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// A map bridge message could not be encoded or decoded.
    #[error("malformed map message: {0}")]
    Message(String),

    /// A region document from the shared store could not be decoded.
    #[error("malformed region document {id}: {reason}")]
    Document { id: String, reason: String },
}

/// Result alias for engine operations.
pub type CaptureResult<T> = Result<T, CaptureError>;
