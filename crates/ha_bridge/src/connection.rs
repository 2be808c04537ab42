//! Connection bookkeeping for the bridge.
//!
//! `ConnectionManager` is plain data guarded by the bridge's mutex. It owns
//! the single transport handle, the callers waiting on the in-flight
//! `connect()`, and the two timers (connect timeout and reconnect backoff).
//! Spawning tasks is left to the bridge; this type only records and cancels
//! them.

use std::fmt;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::error::BridgeError;
use crate::transport::Transport;

pub(crate) type ConnectResult = Result<(), BridgeError>;

/// Observable connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Open,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Disconnected => f.write_str("disconnected"),
            ConnectionState::Connecting => f.write_str("connecting"),
            ConnectionState::Open => f.write_str("open"),
        }
    }
}

pub(crate) struct ConnectionManager {
    state: ConnectionState,

    /// Incremented for every new transport and on `disconnect()`. Events and
    /// timers carry the generation they were created for and are ignored
    /// once it is no longer current.
    generation: u64,

    /// At most one transport exists at a time
    transport: Option<Box<dyn Transport>>,

    /// Callers waiting on the in-flight `connect()`
    waiters: Vec<oneshot::Sender<ConnectResult>>,

    connect_timeout: Option<JoinHandle<()>>,
    pending_reconnect: Option<JoinHandle<()>>,

    /// Cleared by `disconnect()`, set again by the next `connect()`
    auto_reconnect: bool,
}

impl ConnectionManager {
    pub fn new() -> Self {
        Self {
            state: ConnectionState::Disconnected,
            generation: 0,
            transport: None,
            waiters: Vec::new(),
            connect_timeout: None,
            pending_reconnect: None,
            auto_reconnect: false,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_current(&self, generation: u64) -> bool {
        self.generation == generation
    }

    /// True while `generation` is the attempt still waiting to open.
    pub fn is_connecting(&self, generation: u64) -> bool {
        self.is_current(generation) && self.state == ConnectionState::Connecting
    }

    /// Start a new attempt with a freshly created transport.
    ///
    /// Returns the generation assigned to it.
    pub fn begin(&mut self, transport: Box<dyn Transport>) -> u64 {
        debug_assert!(self.transport.is_none(), "previous transport not torn down");
        self.clear_pending_reconnect();
        self.generation += 1;
        self.state = ConnectionState::Connecting;
        self.transport = Some(transport);
        self.auto_reconnect = true;
        self.generation
    }

    /// Register a caller waiting for the current attempt to settle.
    pub fn add_waiter(&mut self) -> oneshot::Receiver<ConnectResult> {
        let (tx, rx) = oneshot::channel();
        self.waiters.push(tx);
        rx
    }

    #[cfg(test)]
    pub fn has_waiters(&self) -> bool {
        !self.waiters.is_empty()
    }

    fn settle(&mut self, result: ConnectResult) {
        for waiter in self.waiters.drain(..) {
            // The caller may have stopped waiting
            let _ = waiter.send(result.clone());
        }
    }

    pub fn set_connect_timeout(&mut self, handle: JoinHandle<()>) {
        self.clear_connect_timeout();
        self.connect_timeout = Some(handle);
    }

    pub fn clear_connect_timeout(&mut self) {
        if let Some(handle) = self.connect_timeout.take() {
            handle.abort();
        }
    }

    /// Called by the timeout task itself. Returns true if the timeout still
    /// applies to the current attempt; the handle is released, not aborted.
    pub fn fire_connect_timeout(&mut self, generation: u64) -> bool {
        if !self.is_connecting(generation) {
            return false;
        }
        self.connect_timeout.take();
        true
    }

    pub fn reconnect_pending(&self) -> bool {
        self.pending_reconnect.is_some()
    }

    /// Whether a close of the current generation should schedule a reconnect.
    pub fn wants_reconnect(&self) -> bool {
        self.auto_reconnect && self.pending_reconnect.is_none()
    }

    pub fn set_pending_reconnect(&mut self, handle: JoinHandle<()>) {
        self.clear_pending_reconnect();
        self.pending_reconnect = Some(handle);
    }

    pub fn clear_pending_reconnect(&mut self) {
        if let Some(handle) = self.pending_reconnect.take() {
            handle.abort();
        }
    }

    /// Called by the reconnect timer itself. Returns true if the timer is
    /// still the one scheduled for the current generation, clearing its slot.
    pub fn fire_reconnect(&mut self, generation: u64) -> bool {
        if !self.is_current(generation)
            || self.state != ConnectionState::Disconnected
            || !self.auto_reconnect
            || self.pending_reconnect.is_none()
        {
            return false;
        }
        self.pending_reconnect.take();
        true
    }

    /// The attempt finished opening and its snapshot is loaded.
    pub fn mark_open(&mut self) {
        self.clear_connect_timeout();
        self.state = ConnectionState::Open;
        self.settle(Ok(()));
    }

    /// Drop the current connection after a failure or close.
    ///
    /// Waiters receive `error`. Returns the transport so the caller decides
    /// whether it still needs an explicit close.
    pub fn teardown(&mut self, error: BridgeError) -> Option<Box<dyn Transport>> {
        self.clear_connect_timeout();
        self.state = ConnectionState::Disconnected;
        self.settle(Err(error));
        self.transport.take()
    }

    /// Explicit disconnect: cancel both timers, invalidate the current
    /// generation, and stop reconnecting.
    pub fn shutdown(&mut self) -> Option<Box<dyn Transport>> {
        self.clear_pending_reconnect();
        self.clear_connect_timeout();
        self.auto_reconnect = false;
        self.generation += 1;
        self.state = ConnectionState::Disconnected;
        self.settle(Err(BridgeError::Disconnected));
        self.transport.take()
    }
}

impl fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("state", &self.state)
            .field("generation", &self.generation)
            .field("has_transport", &self.transport.is_some())
            .field("waiters", &self.waiters.len())
            .field("connect_timeout", &self.connect_timeout.is_some())
            .field("pending_reconnect", &self.pending_reconnect.is_some())
            .field("auto_reconnect", &self.auto_reconnect)
            .finish()
    }
}
