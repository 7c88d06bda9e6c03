use std::io;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

/// Line that closes a multi-line block on the wire.
pub const SENTINEL: &str = ".";

const LINE_ENDINGS: &[char] = &['\n', '\r'];

/// Stand-in for any byte or character outside ASCII.
const REPLACEMENT: char = '?';

/// Keywords announcing a command after which the server replies without a sentinel.
const UNTERMINATED_REPLY_KEYWORDS: &[&str] = &["BROADCAST", "SEND"];

/// Returns true when an inbound line closes the current block.
///
/// Surrounding whitespace is ignored, so `" . "` also counts.
pub fn is_sentinel(line: &str) -> bool {
    line.trim() == SENTINEL
}

/// Builds the outbound bytes for a typed line: one word per line, then the sentinel line.
///
/// Only the space character is treated as a separator. Runs of spaces produce empty lines.
/// The wire is ASCII, so every other character becomes `?`.
pub fn encode_frame(input: &str) -> String {
    let mut frame: String = input
        .chars()
        .map(|c| match c {
            ' ' => '\n',
            c if c.is_ascii() => c,
            _ => REPLACEMENT,
        })
        .collect();
    frame.push('\n');
    frame.push_str(SENTINEL);
    frame.push('\n');
    frame
}

/// Returns true when the server is not expected to terminate its reply with a sentinel.
pub fn expects_unterminated_reply(input: &str) -> bool {
    let upper = input.to_uppercase();
    UNTERMINATED_REPLY_KEYWORDS
        .iter()
        .any(|keyword| upper.contains(keyword))
}

/// Strips the trailing line terminator left by `read_line`-style readers.
pub fn trim_line_ending(line: &str) -> &str {
    line.trim_end_matches(LINE_ENDINGS)
}

/// Decodes an inbound line as ASCII, replacing each non-ASCII byte with `?`.
pub fn decode_ascii(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|&b| if b.is_ascii() { b as char } else { REPLACEMENT })
        .collect()
}

/// Reads one inbound line, without its terminator. Returns `None` at end of stream.
///
/// Cancel-safe as long as the caller keeps `buf` between calls: bytes read
/// before a cancellation stay in `buf` and the next call completes the line.
pub async fn read_line_lossy<R>(reader: &mut R, buf: &mut Vec<u8>) -> io::Result<Option<String>>
where
    R: AsyncBufRead + Unpin,
{
    reader.read_until(b'\n', buf).await?;
    if buf.is_empty() {
        return Ok(None);
    }

    let line = decode_ascii(buf);
    buf.clear();
    Ok(Some(trim_line_ending(&line).to_string()))
}

pub async fn write_frame<W>(writer: &mut W, frame: &str) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    // Flush every frame so the server sees the sentinel immediately.
    writer.write_all(frame.as_bytes()).await?;
    writer.flush().await
}

pub async fn write_line<W>(writer: &mut W, line: &str) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(line.as_bytes()).await?;
    writer.write_all(b"\n").await?;
    writer.flush().await
}
