//! Error taxonomy shared by every resolver.

use std::sync::Arc;

use reqwest::StatusCode;
use thiserror::Error;

/// Failure raised while resolving a matched URL.
///
/// Cloneable so that a single in-flight cache computation can hand the same
/// failure to every caller waiting on it.
#[derive(Debug, Clone, Error)]
pub enum ResolveError {
    #[error("the picture you requested is not found")]
    NotFound,
    #[error("your request is not a picture")]
    NotAPicture,
    #[error("your request is not a video")]
    NotAVideo,
    #[error("remote API error {code}: {message}")]
    RemoteApi { code: i64, message: String },
    #[error("HTTP request failed: {0}")]
    Http(#[source] Arc<reqwest::Error>),
    #[error("unexpected HTTP status {0}")]
    UnexpectedStatus(StatusCode),
    #[error("failed to parse response: {0}")]
    Parse(#[source] Arc<serde_json::Error>),
    #[error("invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
    #[error("{0}")]
    Extraction(String),
    #[error("{0}")]
    Unknown(String),
}

/// Coarse classification of a [`ResolveError`], used by the boundary layer to
/// pick a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    NotFound,
    NotAPicture,
    NotAVideo,
    RemoteApi,
    Transport,
    Unknown,
}

impl ResolveError {
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound => ErrorKind::NotFound,
            Self::NotAPicture => ErrorKind::NotAPicture,
            Self::NotAVideo => ErrorKind::NotAVideo,
            Self::RemoteApi { .. } => ErrorKind::RemoteApi,
            Self::Http(_) | Self::UnexpectedStatus(_) => ErrorKind::Transport,
            Self::Parse(_) | Self::InvalidUrl(_) | Self::Extraction(_) | Self::Unknown(_) => {
                ErrorKind::Unknown
            }
        }
    }

    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound)
    }
}

impl From<reqwest::Error> for ResolveError {
    fn from(err: reqwest::Error) -> Self {
        Self::Http(Arc::new(err))
    }
}

impl From<serde_json::Error> for ResolveError {
    fn from(err: serde_json::Error) -> Self {
        Self::Parse(Arc::new(err))
    }
}
