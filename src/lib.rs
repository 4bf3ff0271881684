#![allow(
    clippy::let_unit_value,
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::semicolon_if_nothing_returned,
    clippy::used_underscore_binding
)]
#![deny(
    clippy::all,
    clippy::missing_const_for_fn,
    clippy::pedantic,
    future_incompatible,
    missing_docs,
    nonstandard_style,
    rust_2018_idioms,
    rustdoc::broken_intra_doc_links,
    unsafe_code,
    unused
)]
#![doc = include_str!("../README.md")]

pub mod channel;
pub mod command;
pub mod compression;
pub mod config;
pub mod envelope;
pub mod error;
pub mod message;
pub mod ratelimiter;
pub mod session;
pub mod shard;
pub mod tls;

mod future;
mod heartbeat;
mod latency;

pub use self::{
    config::{Config, ConfigBuilder, ShardId},
    envelope::Envelope,
    latency::Latency,
    session::Session,
    shard::Shard,
};

use tokio::net::TcpStream;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

/// API version of the gateway protocol appended to the connection URI.
pub const API_VERSION: u8 = 10;

/// Websocket stream type underlying a [`Shard`]'s transport connection.
pub(crate) type Connection = WebSocketStream<MaybeTlsStream<TcpStream>>;

#[cfg(not(any(
    feature = "native",
    feature = "rustls-native-roots",
    feature = "rustls-webpki-roots"
)))]
compile_error!(
    "Either the `native`, `rustls-native-roots` or `rustls-webpki-roots` feature must be enabled."
);
