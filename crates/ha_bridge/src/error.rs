use std::fmt;
use std::time::Duration;

/// REST resource fetched from the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resource {
    States,
    Actions,
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Resource::States => f.write_str("states"),
            Resource::Actions => f.write_str("actions"),
        }
    }
}

/// Errors produced by the live-state bridge.
///
/// `Clone` because a single connection outcome is delivered to every caller
/// waiting on the same in-flight `connect()`.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum BridgeError {
    /// The transport did not open within the connect timeout.
    #[error("Connection timeout after {0:?}")]
    ConnectionTimeout(Duration),

    /// Socket-level failure reported by the transport.
    #[error("Transport error: {0}")]
    Transport(String),

    /// The backend answered with a non-success status.
    #[error("Failed to fetch {resource}{}", status_suffix(.status, .body))]
    FetchFailed {
        resource: Resource,
        status: u16,
        body: String,
    },

    /// The request never produced a usable response.
    #[error("Request for {resource} failed: {message}")]
    Http { resource: Resource, message: String },

    /// The HTTP client could not be set up.
    #[error("Failed to create HTTP client: {0}")]
    Client(String),

    /// A frame from the event stream could not be decoded.
    #[error("Malformed message: {0}")]
    Decode(String),

    /// `disconnect()` was called before the pending connection was ready.
    #[error("Disconnected before the connection was ready")]
    Disconnected,

    #[error("Invalid base URL {url}: {message}")]
    InvalidUrl { url: String, message: String },
}

fn status_suffix(status: &u16, body: &str) -> String {
    if body.is_empty() {
        format!(": {}", status)
    } else {
        format!(": {} {}", status, body)
    }
}
