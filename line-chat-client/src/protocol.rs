//! Classification of console lines typed by the user.
//!
//! The console has no command grammar of its own: apart from the exit
//! keyword, every non-empty line is forwarded to the server as a frame.

use crate::message::{encode_frame, expects_unterminated_reply};

/// Substring that ends the session when it appears anywhere in a typed line.
///
/// Matching is case-sensitive, so `Exit` is sent to the server like any other line.
pub const EXIT_KEYWORD: &str = "exit";

/// What the session loop should do with one line of console input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleInput {
    /// Nothing was typed.
    Ignore,
    /// Leave the session after draining the pending server reply.
    Exit,
    /// Write `frame` to the server.
    Send { frame: String, skip_wait: bool },
}

impl ConsoleInput {
    /// Classifies a line with its terminator already stripped.
    ///
    /// Only a truly empty line is ignored; a line of spaces is still sent.
    pub fn parse(line: &str) -> Self {
        if line.is_empty() {
            return ConsoleInput::Ignore;
        }

        if line.contains(EXIT_KEYWORD) {
            return ConsoleInput::Exit;
        }

        ConsoleInput::Send {
            frame: encode_frame(line),
            skip_wait: expects_unterminated_reply(line),
        }
    }
}
