use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::sync::PoisonError;
use std::sync::Weak;
use std::time::Duration;

use reqwest::Url;
use tokio::sync::broadcast;
use tokio::sync::mpsc;
use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::warn;

use crate::api::HttpApi;
use crate::api::StatesApi;
use crate::config::BridgeConfig;
use crate::connection::ConnectionManager;
use crate::connection::ConnectionState;
use crate::dispatch::Dispatcher;
use crate::error::BridgeError;
use crate::observer::Subscription;
use crate::state::ActionCatalog;
use crate::state::EntityState;
use crate::state::EntityStates;
use crate::state::StateChange;
use crate::transport::Connector;
use crate::transport::TransportEvent;
use crate::transport::WebSocketConnector;

/// Connection parameters for a [`Bridge`].
#[derive(Debug, Clone)]
pub struct BridgeOptions {
    /// Live event stream URL (`ws://` or `wss://`)
    pub ws_url: Url,

    /// How long the transport may take to open
    pub connect_timeout: Duration,

    /// Delay before reconnecting after the stream closes
    pub reconnect_backoff: Duration,
}

impl BridgeOptions {
    pub fn from_config(config: &BridgeConfig) -> Result<Self, BridgeError> {
        Ok(Self {
            ws_url: config.ws_url()?,
            connect_timeout: config.connect_timeout(),
            reconnect_backoff: config.reconnect_backoff(),
        })
    }
}

/// Live view of Home Assistant entity states.
///
/// Keeps one event-stream connection to the backend, mirrors every entity
/// in an in-memory store, and tells observers about each change together
/// with the state it replaced. Lost connections are re-established after a
/// fixed backoff until [`Bridge::disconnect`] is called.
///
/// Cloning is cheap; all clones share the same connection and store.
/// Must be used from within a tokio runtime.
#[derive(Clone)]
pub struct Bridge {
    inner: Arc<Inner>,
}

struct Inner {
    options: BridgeOptions,
    connector: Arc<dyn Connector>,
    api: Arc<dyn StatesApi>,
    dispatcher: Dispatcher,
    connection: Mutex<ConnectionManager>,
}

impl Bridge {
    pub fn new(
        options: BridgeOptions,
        connector: Arc<dyn Connector>,
        api: Arc<dyn StatesApi>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                options,
                connector,
                api,
                dispatcher: Dispatcher::new(),
                connection: Mutex::new(ConnectionManager::new()),
            }),
        }
    }

    /// Bridge backed by the real WebSocket transport and HTTP API.
    pub fn from_config(config: &BridgeConfig) -> Result<Self, BridgeError> {
        Ok(Self::new(
            BridgeOptions::from_config(config)?,
            Arc::new(WebSocketConnector::new()),
            Arc::new(HttpApi::new(config)?),
        ))
    }

    /// Open the event stream and load the initial snapshot.
    ///
    /// Resolves once the transport is open and the store is populated. A
    /// call made while an attempt is already in flight joins that attempt
    /// instead of opening a second transport.
    pub async fn connect(&self) -> Result<(), BridgeError> {
        Inner::connect(&self.inner).await
    }

    /// Close the stream and stop reconnecting. Safe to call at any time.
    ///
    /// A `connect()` still pending fails with [`BridgeError::Disconnected`].
    pub fn disconnect(&self) {
        let transport = {
            let mut connection = self.inner.connection();
            connection.shutdown()
        };
        if let Some(mut transport) = transport {
            transport.close();
            info!("Disconnected from {}", self.inner.options.ws_url);
        }
    }

    /// Fetch the full state set, connecting first if needed.
    ///
    /// The result is merged into the store and returned as fetched.
    pub async fn get_all_states(&self) -> Result<EntityStates, BridgeError> {
        if self.connection_state() != ConnectionState::Open {
            self.connect().await?;
        }
        self.inner.load_snapshot().await.inspect_err(|e| {
            warn!("Error fetching states: {}", e);
        })
    }

    /// Last known state of an entity. Never touches the network.
    pub fn get_state(&self, entity_id: &str) -> Option<EntityState> {
        self.inner.dispatcher.store().get(entity_id)
    }

    /// Register a callback for state changes.
    ///
    /// The callback is invoked right away for every entity already in the
    /// store (with no previous state), then for each change as
    /// `(entity_id, new_state, old_state)`.
    pub fn on_state_changed<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&str, &EntityState, Option<&EntityState>) + Send + Sync + 'static,
    {
        self.inner.dispatcher.subscribe(Arc::new(callback))
    }

    /// Stream of changes for async consumers. Does not replay current state.
    pub fn subscribe(&self) -> broadcast::Receiver<StateChange> {
        self.inner.dispatcher.stream()
    }

    /// Fetch the catalog of callable actions.
    pub async fn get_actions(&self) -> Result<ActionCatalog, BridgeError> {
        self.inner.api.fetch_actions().await
    }

    /// Known entity ids, sorted, optionally limited to one domain.
    pub fn entity_ids(&self, domain: Option<&str>) -> Vec<String> {
        self.inner.dispatcher.store().ids(domain)
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.inner.connection().state()
    }

    /// Whether a reconnect is currently scheduled.
    pub fn reconnect_pending(&self) -> bool {
        self.inner.connection().reconnect_pending()
    }
}

impl Inner {
    fn connection(&self) -> MutexGuard<'_, ConnectionManager> {
        self.connection
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    async fn connect(self: &Arc<Self>) -> Result<(), BridgeError> {
        let waiter = {
            let mut connection = self.connection();
            match connection.state() {
                ConnectionState::Open => return Ok(()),
                ConnectionState::Connecting => connection.add_waiter(),
                ConnectionState::Disconnected => {
                    info!("Connecting to {}", self.options.ws_url);
                    let handle = self.connector.open(&self.options.ws_url);
                    let generation = connection.begin(handle.transport);
                    let waiter = connection.add_waiter();
                    connection.set_connect_timeout(self.spawn_connect_timeout(generation));
                    self.spawn_driver(generation, handle.events);
                    waiter
                }
            }
        };

        // Sender only disappears if the bridge itself is torn down
        waiter.await.unwrap_or(Err(BridgeError::Disconnected))
    }

    async fn load_snapshot(&self) -> Result<EntityStates, BridgeError> {
        let states = self.api.fetch_states().await?;
        self.dispatcher.store().merge(&states);
        debug!("Loaded {} entity states", states.len());
        Ok(states)
    }

    /// Process one transport's events in order until the transport is
    /// superseded or its channel ends.
    fn spawn_driver(
        self: &Arc<Self>,
        generation: u64,
        mut events: mpsc::UnboundedReceiver<TransportEvent>,
    ) {
        let weak = Arc::downgrade(self);
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                let Some(inner) = weak.upgrade() else {
                    break;
                };
                inner.handle_event(generation, event).await;
                if !inner.connection().is_current(generation) {
                    break;
                }
            }
            debug!("Event driver for connection {} finished", generation);
        });
    }

    async fn handle_event(self: &Arc<Self>, generation: u64, event: TransportEvent) {
        match event {
            TransportEvent::Opened => self.handle_open(generation).await,
            TransportEvent::Message(text) => {
                if self.connection().is_current(generation) {
                    self.dispatcher.handle_frame(&text);
                }
            }
            TransportEvent::Error(message) => {
                let mut connection = self.connection();
                if !connection.is_current(generation) {
                    return;
                }
                error!("WebSocket error: {}", message);
                if let Some(mut transport) =
                    connection.teardown(BridgeError::Transport(message))
                {
                    transport.close();
                }
                self.schedule_reconnect(&mut connection);
            }
            TransportEvent::Closed => {
                let mut connection = self.connection();
                if !connection.is_current(generation) {
                    return;
                }
                if connection.state() == ConnectionState::Open {
                    warn!("Connection to {} lost", self.options.ws_url);
                }
                // Already closed by the peer, just drop it
                connection.teardown(BridgeError::Transport("connection closed".to_string()));
                self.schedule_reconnect(&mut connection);
            }
        }
    }

    /// The transport opened: load the snapshot before reporting success.
    async fn handle_open(self: &Arc<Self>, generation: u64) {
        if !self.connection().is_connecting(generation) {
            return;
        }

        debug!("Transport open, loading initial states");
        let result = self.api.fetch_states().await;

        let mut connection = self.connection();
        if !connection.is_connecting(generation) {
            // Timed out or disconnected while the snapshot was loading
            debug!("Discarding snapshot for abandoned connection {}", generation);
            return;
        }

        match result {
            Ok(states) => {
                self.dispatcher.store().merge(&states);
                connection.mark_open();
                info!(
                    "Connected to {} ({} entities)",
                    self.options.ws_url,
                    states.len()
                );
            }
            Err(e) => {
                error!("Error fetching initial states: {}", e);
                if let Some(mut transport) = connection.teardown(e) {
                    transport.close();
                }
                self.schedule_reconnect(&mut connection);
            }
        }
    }

    fn spawn_connect_timeout(self: &Arc<Self>, generation: u64) -> tokio::task::JoinHandle<()> {
        let weak = Arc::downgrade(self);
        let timeout = self.options.connect_timeout;
        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            let Some(inner) = weak.upgrade() else {
                return;
            };
            let mut connection = inner.connection();
            if !connection.fire_connect_timeout(generation) {
                return;
            }
            warn!(
                "Connection to {} timed out after {:?}",
                inner.options.ws_url, timeout
            );
            if let Some(mut transport) =
                connection.teardown(BridgeError::ConnectionTimeout(timeout))
            {
                transport.close();
            }
            inner.schedule_reconnect(&mut connection);
        })
    }

    /// Schedule a reconnect unless one is already pending or reconnection
    /// has been turned off by `disconnect()`.
    fn schedule_reconnect(self: &Arc<Self>, connection: &mut ConnectionManager) {
        if !connection.wants_reconnect() {
            return;
        }

        let generation = connection.generation();
        let backoff = self.options.reconnect_backoff;
        let weak: Weak<Inner> = Arc::downgrade(self);
        let handle = tokio::spawn(async move {
            tokio::time::sleep(backoff).await;
            let Some(inner) = weak.upgrade() else {
                return;
            };
            if !inner.connection().fire_reconnect(generation) {
                return;
            }
            info!("Reconnecting to {}", inner.options.ws_url);
            if let Err(e) = Inner::connect(&inner).await {
                warn!("Reconnect to {} failed: {}", inner.options.ws_url, e);
            }
        });

        connection.set_pending_reconnect(handle);
        info!("Reconnecting in {:?}", backoff);
    }
}
