//! Console input worker.
//!
//! Reading stdin blocks, so it runs on its own OS thread and hands lines
//! to the async session loop through a channel. A plain thread does not
//! hold up runtime shutdown the way a pending `tokio::io::stdin` read would.

use std::{
    io::{self, BufRead, BufReader},
    thread,
};

use anyhow::{Context, Result};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::message::trim_line_ending;

/// Spawns the stdin reader thread.
///
/// The channel holds a single line, so the thread reads at most one line
/// ahead of the session. The channel closes when stdin reaches end of file.
pub fn spawn_stdin_reader() -> Result<mpsc::Receiver<String>> {
    spawn_line_reader(BufReader::new(io::stdin()))
}

/// Spawns a reader thread for any blocking line source.
pub fn spawn_line_reader<R>(source: R) -> Result<mpsc::Receiver<String>>
where
    R: BufRead + Send + 'static,
{
    let (tx, rx) = mpsc::channel(1);
    thread::Builder::new()
        .name("console-reader".into())
        .spawn(move || forward_lines(source, tx))
        .context("failed to spawn console reader")?;
    Ok(rx)
}

fn forward_lines<R: BufRead>(mut source: R, tx: mpsc::Sender<String>) {
    let mut line = String::new();
    loop {
        line.clear();
        match source.read_line(&mut line) {
            Ok(0) => {
                debug!("console input closed");
                break;
            }
            Ok(_) => {
                if tx.blocking_send(trim_line_ending(&line).to_string()).is_err() {
                    // Session is gone; nobody is waiting for more input.
                    break;
                }
            }
            Err(error) => {
                warn!(?error, "failed to read console input");
                break;
            }
        }
    }
}
