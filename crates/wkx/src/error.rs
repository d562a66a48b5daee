//! 💀 Errors — the two flavours of "no".
//!
//! [`NormaliseError`] is fatal for the request: the payload was not JSON, or
//! it was JSON shaped like nothing we recognise. It surfaces to the caller.
//!
//! [`MalformedUrlError`] is not fatal. A label that won't parse as a URL gets
//! a warning in the logs and walks through the pipeline unchecked.

use thiserror::Error;

/// 💀 Fatal normalisation failures. No recovery, no guessing.
#[derive(Debug, Error)]
pub enum NormaliseError {
    /// The raw payload is not valid JSON.
    #[error("💀 Analytics payload is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),

    /// Valid JSON, unexpected structure.
    #[error("💀 Analytics payload has an unexpected shape: {0}")]
    Shape(String),
}

/// 🔗 Why a label could not be turned into a URL.
///
/// `Display` is the bare cause text, because it ends up as the `cause` field
/// of the malformed-URL warning and people grep for it.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MalformedUrlError {
    /// Parsed fine, but the scheme is not one a wiki page is served over.
    #[error("unknown protocol: {0}")]
    UnknownProtocol(String),

    #[error("{0}")]
    Parse(#[from] url::ParseError),
}

pub type Result<T> = std::result::Result<T, NormaliseError>;
