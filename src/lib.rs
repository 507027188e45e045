//! Asynchronous wire-protocol engine for a Redis-style server: RESP framing,
//! pipelining over a single connection, and pub/sub multiplexing.
//!
//! [`parser`] turns bytes into [`reply::Reply`] values, [`command`] turns
//! typed arguments into RESP requests and tracks their completion,
//! [`connection`] owns the socket and the in-flight FIFO, and [`client`] is
//! the façade applications talk to.

mod client;
mod command;
mod config;
mod connection;
mod error;
mod parser;
mod reply;
mod subscription;

pub use client::{Client, InfoMap, MapOutcome, SendOutcome};
pub use command::{Arg, ReturnKind};
pub use config::{Config, DEFAULT_ADDRESS};
pub use error::{ErrorKind, RedisError, RedisResult};
pub use reply::{Encoding, Reply};
pub use subscription::{Notification, NotificationSink};
