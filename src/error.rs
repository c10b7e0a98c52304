// Error type shared by every client operation.

use std::path::PathBuf;

use thiserror::Error;

/// Everything a call against a Pandora instance can fail with.
///
/// A submission the server rejects with a 200 is *not* an error here: the
/// payload carries the verdict and the caller inspects it. Any other
/// status comes back as [`PandoraError::Http`].
#[derive(Error, Debug)]
pub enum PandoraError {
    /// Connection refused, DNS failure, timeout, or any other failure of
    /// the HTTP transport.
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// A retryable status (5xx) was still returned on the last attempt.
    #[error("giving up after {attempts} attempts, last status was HTTP {status}")]
    RetriesExhausted { attempts: u32, status: u16 },

    /// The server answered with a non-2xx status. `body` is the decoded
    /// JSON, or the raw text as a JSON string when it was not JSON.
    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: serde_json::Value },

    #[error("invalid seed expiry: {0}")]
    InvalidExpiry(String),

    #[error("invalid interval '{0}', expected one of year, month, week, day")]
    InvalidInterval(String),

    /// A search query that cannot travel as a single path segment.
    #[error("invalid search query '{0}'")]
    InvalidQuery(String),

    #[error("authentication error: {0}")]
    Auth(String),

    #[error("file {} not found", .0.display())]
    FileNotFound(PathBuf),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The body was not the JSON we expected.
    #[error("invalid response body: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("invalid URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("invalid header value: {0}")]
    InvalidHeader(String),
}

pub type Result<T> = std::result::Result<T, PandoraError>;
