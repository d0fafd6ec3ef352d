//! # growsock-server
//!
//! Datagram game server for growsock.
//!
//! This crate provides:
//! - A UDP host that tracks peers by address and reports connect, receive
//!   and disconnect events
//! - Net id assignment and a peer registry
//! - An event facade for application code
//! - Variant and raw packet delivery to connected peers
//! - An optional HTTP `server_data` endpoint

pub mod config;
pub mod error;
pub mod events;
pub mod host;
pub mod http;
pub mod peer;
pub mod server;

pub use config::{Config, ConfigError, HttpConfig, NetworkConfig};
pub use error::ServerError;
pub use events::{EventBroadcaster, ServerEvent};
pub use host::{Host, HostEvent};
pub use peer::PeerRegistry;
pub use server::{Server, ServerStats};
