//! Real-time delivery: connection channels, the connection registry and
//! the dispatcher that fans stored messages out to live connections.

pub mod connection;
pub mod dispatcher;
pub mod registry;

pub use connection::{ConnectionChannel, ConnectionLifecycle, ConnectionSession};
pub use dispatcher::Dispatcher;
pub use registry::ConnectionRegistry;
