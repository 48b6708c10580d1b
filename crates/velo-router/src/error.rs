//! Routing backend errors.

use thiserror::Error;

/// Body fragments the backend uses for requests that will never succeed.
const NON_RETRYABLE_MARKERS: &[&str] = &[
    "not mapped",
    "target island",
    "no track found",
    "profile not found",
];

#[derive(Debug, Error)]
pub enum RoutingError {
    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),
    #[error("router request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("router returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("router rejected the request: {0}")]
    Rejected(String),
    #[error("malformed router response: {0}")]
    Malformed(String),
    #[error("router returned an empty path")]
    EmptyPath,
}

impl RoutingError {
    /// Build the error for a non-success response.
    pub fn from_response(status: u16, body: String) -> Self {
        let lowered = body.to_ascii_lowercase();
        if NON_RETRYABLE_MARKERS.iter().any(|m| lowered.contains(m)) {
            return RoutingError::Rejected(body.trim().to_string());
        }
        RoutingError::Status { status, body }
    }

    /// Whether another attempt could succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            RoutingError::Transport(_) => true,
            RoutingError::Status { status, .. } => {
                !(400..500).contains(status) || *status == 408 || *status == 429
            }
            RoutingError::Client(_)
            | RoutingError::Rejected(_)
            | RoutingError::Malformed(_)
            | RoutingError::EmptyPath => false,
        }
    }
}
