//! Line-oriented TCP chat client.
//!
//! The client keeps one connection open to a chat server and relays typed
//! lines to it. On the wire a message is one word per line followed by a
//! line holding a single `.`; server replies use the same sentinel.
//!
//! - [`cli`] parses the server host and port.
//! - [`message`] holds the framing helpers for the sentinel protocol.
//! - [`protocol`] classifies console lines (ignore, exit or send).
//! - [`session`] races server lines against console lines and tracks the
//!   `skip_wait` flag between replies.
//! - [`console`] reads stdin on a dedicated thread.
//! - [`client`] connects and drives one session end to end.
//! - [`error`] defines the errors that end a session.

pub mod cli;
pub mod client;
pub mod console;
pub mod error;
pub mod message;
pub mod protocol;
pub mod session;
