//! What the session controller needs from a network client.

use futures::future::LocalBoxFuture;
use thiserror::Error;

use crate::model::{AccountId, ConnectionParams};

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("IRC error: {0}")]
    Irc(#[from] irc::error::Error),

    #[error("Client unavailable: {0}")]
    Unavailable(String),

    #[error("Connection closed")]
    Disconnected,
}

/// A live connection to one server. All calls are non-blocking; replies come
/// back as protocol events.
pub trait NetworkClient {
    fn is_connected(&self) -> bool;
    fn close(&self);
    fn join_channel(&self, channel: &str) -> Result<(), ClientError>;
    fn part_channel(&self, channel: &str, message: Option<&str>) -> Result<(), ClientError>;
    fn post_message(&self, target: &str, text: &str) -> Result<(), ClientError>;
    /// Sends one protocol line as typed, without the command marker.
    fn post_raw(&self, line: &str) -> Result<(), ClientError>;
    fn list_channels(&self) -> Result<(), ClientError>;
    fn change_nick(&self, nick: &str) -> Result<(), ClientError>;
    fn quit_and_close(&self, message: Option<&str>) -> Result<(), ClientError>;
}

pub type ConnectFuture = LocalBoxFuture<'static, Result<Box<dyn NetworkClient>, ClientError>>;

/// Creates connected clients. The returned future completes once the
/// connection is established or has failed.
pub trait Connector {
    fn connect(&self, account: AccountId, params: ConnectionParams) -> ConnectFuture;
}
