//! Networking: endpoint resolution and the control-channel transport

pub mod connection;
pub mod resolver;

pub use connection::ControlConnection;
pub use resolver::resolve;
