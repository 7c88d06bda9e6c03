use std::io;

use thiserror::Error;

/// Everything that can end a chat session early.
///
/// None of these are retried; the session reports the error once and stops.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("failed to connect to {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("failed to read from server: {0}")]
    Read(#[source] io::Error),

    #[error("failed to write to server: {0}")]
    Write(#[source] io::Error),

    #[error("failed to write to console: {0}")]
    Console(#[source] io::Error),
}
