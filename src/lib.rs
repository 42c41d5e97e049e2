mod client;
mod config;
mod connection;
mod error;
mod logger;
mod protocol;
mod registry;
mod types;

pub use client::{IntesisBoxClient, IntesisBoxClientBuilder};
pub use config::IntesisBoxConfig;
pub use error::{Error, Result};
pub use logger::MessageLogMode;
pub use protocol::{
    Command, DEFAULT_PORT, Frame, Message, decode, encode_get, encode_keepalive,
    encode_limits_query, encode_set,
};
pub use registry::SetpointRange;
pub use types::*;
