//! Live mirror of Home Assistant entity states.
//!
//! [`Bridge`] keeps a WebSocket event stream open to the backend, loads the
//! full state set over REST whenever the stream opens, and notifies
//! observers of every change with the state it replaced.

pub mod api;
mod bridge;
pub mod config;
mod connection;
mod dispatch;
pub mod error;
mod observer;
pub mod protocol;
pub mod state;
mod store;
pub mod transport;

pub use api::HttpApi;
pub use api::StatesApi;
pub use bridge::Bridge;
pub use bridge::BridgeOptions;
pub use config::BridgeConfig;
pub use config::Config;
pub use config::ConfigError;
pub use config::LogLevel;
pub use config::LoggingConfig;
pub use connection::ConnectionState;
pub use error::BridgeError;
pub use error::Resource;
pub use observer::StateChangedCallback;
pub use observer::Subscription;
pub use protocol::Frame;
pub use state::ActionCatalog;
pub use state::ActionDescriptor;
pub use state::ActionField;
pub use state::EntityState;
pub use state::EntityStates;
pub use state::StateChange;
pub use transport::Connector;
pub use transport::Transport;
pub use transport::TransportEvent;
pub use transport::TransportHandle;
pub use transport::WebSocketConnector;
