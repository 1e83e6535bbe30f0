use std::io;

use thiserror::Error;

use crate::config::ConfigError;

/// Fatal daemon errors.
///
/// Transient per-packet failures are [`crate::PacketError`]s; they are
/// logged and dropped at the receive site and never abort the loop.
#[derive(Debug, Error)]
pub enum Error {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("cannot bind udp port {port}: {source}")]
    Bind { port: u16, source: io::Error },
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),
}
