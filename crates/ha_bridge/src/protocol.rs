//! Frames received on the live event stream.
//!
//! The backend pushes JSON text frames tagged by `type`. Only
//! `state_changed` is acted upon; any other type decodes to
//! [`Frame::Other`].

use serde::Deserialize;

use crate::error::BridgeError;
use crate::state::EntityState;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Frame {
    /// An entity changed state
    StateChanged {
        entity_id: String,
        state: EntityState,
    },

    /// Frame type this client does not handle
    #[serde(other)]
    Other,
}

/// Decode one text frame.
pub fn decode(text: &str) -> Result<Frame, BridgeError> {
    serde_json::from_str(text).map_err(|e| BridgeError::Decode(e.to_string()))
}
