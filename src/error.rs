// =============================================================================
// error.rs — EVERYTHING THAT CAN GO WRONG, SORTED BY WHO SHOULD CARE
// =============================================================================
//
// Three families of failure live here:
//
// - ClientError: anything a remote call can produce. Single-item operations
//   hand these straight back to the caller. Batch operations log them and
//   drop the offending page or item.
// - HtmlTableError: the edit site sent us a page we can't read as a table.
// - ArtifactError: the ndjson.gz output file disagreed with us.
//
// Only one ClientError is ever retried: an HTTP 429 inside a batch.
// Everything else gives up on the first try.
// =============================================================================

use std::path::PathBuf;

use thiserror::Error;

/// HTTP status for "slow down, you're being rude".
pub const TOO_MANY_REQUESTS: u16 = 429;

/// Errors produced by the remote clients and the operation builder.
#[derive(Debug, Error)]
pub enum ClientError {
    /// A malformed Operation or a payload that doesn't fit the record model.
    #[error("validation failed: {0}")]
    Validation(String),

    /// A non-2xx response while status checking was requested.
    #[error("HTTP {status} from {url}")]
    HttpStatus { status: u16, url: String },

    /// Connection refused, timeout, truncated body and friends.
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The scraped page could not be turned into table rows.
    #[error(transparent)]
    Table(#[from] HtmlTableError),
}

impl ClientError {
    /// True when the upstream told us to back off (HTTP 429).
    /// This is the only condition the retry policy acts on.
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, ClientError::HttpStatus { status, .. } if *status == TOO_MANY_REQUESTS)
    }

    /// The HTTP status carried by this error, if it has one.
    pub fn status(&self) -> Option<u16> {
        match self {
            ClientError::HttpStatus { status, .. } => Some(*status),
            ClientError::Transport(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for ClientError {
    fn from(err: serde_json::Error) -> Self {
        ClientError::Validation(err.to_string())
    }
}

impl From<url::ParseError> for ClientError {
    fn from(err: url::ParseError) -> Self {
        ClientError::Validation(format!("invalid url: {err}"))
    }
}

/// Errors from the HTML Table Extractor.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HtmlTableError {
    /// A required element was absent from the markup.
    #[error("<{tag}> not found in document")]
    TagNotFound { tag: String },

    /// A body row whose cell count doesn't match the header count.
    /// Rows are zipped strictly: no truncation, no padding.
    #[error("row {row} has {found} cells but the table has {expected} headers")]
    RowShape {
        row: usize,
        expected: usize,
        found: usize,
    },
}

impl HtmlTableError {
    pub(crate) fn tag_not_found(tag: &str) -> Self {
        HtmlTableError::TagNotFound {
            tag: tag.to_string(),
        }
    }
}

/// Errors from reading or writing the ndjson.gz artifact.
#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("output file must end with .ndjson.gz: {0}")]
    InvalidExtension(PathBuf),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("bad JSON on line {line}: {source}")]
    Json {
        line: usize,
        #[source]
        source: serde_json::Error,
    },
}
