//! Live event transport.
//!
//! A transport is opened synchronously and then reports its lifecycle as
//! [`TransportEvent`]s on a channel, the way a browser socket fires
//! `open`/`message`/`error`/`close` callbacks. The bridge consumes those
//! events in order on a single driver task per transport.

mod websocket;

#[cfg(test)]
pub(crate) mod mock;

use reqwest::Url;
use tokio::sync::mpsc;

pub use websocket::WebSocketConnector;

/// Lifecycle and data events reported by a transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// The connection is established
    Opened,

    /// A text frame arrived
    Message(String),

    /// Socket-level failure
    Error(String),

    /// The connection is gone. May be reported more than once.
    Closed,
}

/// An open (or opening) transport.
pub trait Transport: Send {
    /// Request the connection to close. The transport may still report
    /// `Closed` afterwards.
    fn close(&mut self);
}

/// A freshly created transport and the receiving end of its events.
pub struct TransportHandle {
    pub transport: Box<dyn Transport>,
    pub events: mpsc::UnboundedReceiver<TransportEvent>,
}

/// Creates transports.
///
/// This trait allows for mocking the socket for testing purposes
pub trait Connector: Send + Sync {
    /// Start opening a transport to `url`. Must not block; progress is
    /// reported through the returned event channel.
    fn open(&self, url: &Url) -> TransportHandle;
}
