//! IRC protocol layer: network clients, command detection and the session
//! controller that applies protocol events to the model.

pub mod client;
pub mod commands;
pub mod connection;
pub mod controller;

#[cfg(test)]
pub(crate) mod testing;

pub use client::{ClientError, Connector, NetworkClient};
pub use controller::{ControllerOptions, Posted, SessionController, SessionError};
