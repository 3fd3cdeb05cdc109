//! Session layer of an IRC client: accounts, channels and durable
//! per-channel transcripts, driven by a single-writer event loop.

pub mod app;
pub mod config;
pub mod irc;
pub mod logging;
pub mod model;
pub mod notify;
pub mod transcript;
