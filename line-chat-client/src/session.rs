//! The chat session loop.
//!
//! Two sources race inside one `select!`: lines arriving from the server
//! and lines typed on the console. Whichever is ready first is handled and
//! the other stays pending for the next iteration. Both sources are
//! cancel-safe (`read_line_lossy` with a kept buffer and
//! `mpsc::Receiver::recv`), so a losing branch never drops data.
//!
//! Outbound frames go through a channel to a writer task, so a server that
//! is slow to read never stops the loop from echoing what it sends.
//!
//! Server output arrives in blocks. A block normally ends with a sentinel
//! line, after which the user is prompted for the next command. After a
//! `SEND`/`BROADCAST` command the server answers without a sentinel, so
//! the first reply line closes the block instead (`skip_wait`).

use std::{future, io};

use tokio::{
    io::{AsyncBufRead, AsyncWrite, AsyncWriteExt},
    select,
    sync::mpsc,
    task::{JoinError, JoinHandle},
};
use tracing::{debug, info, warn};

use crate::{
    error::SessionError,
    message::{is_sentinel, read_line_lossy, write_frame, write_line},
    protocol::ConsoleInput,
};

pub const COMMAND_PROMPT: &str = "Enter command: ";
pub const MESSAGE_PROMPT: &str = "Enter message: ";

/// Per-connection state threaded through every listen step.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionState {
    /// The next server line closes the block even without a sentinel.
    pub skip_wait: bool,
}

/// Outcome of feeding one server line to the listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenStep {
    /// The current block continues.
    Continue,
    /// The block is complete; control returns to the user.
    Suspend,
}

impl SessionState {
    /// Applies one inbound line and returns the state for the next one.
    pub fn observe(self, line: &str) -> (SessionState, ListenStep) {
        if self.skip_wait {
            return (SessionState { skip_wait: false }, ListenStep::Suspend);
        }

        if is_sentinel(line) {
            (self, ListenStep::Suspend)
        } else {
            (self, ListenStep::Continue)
        }
    }
}

pub struct Session<R, O> {
    reader: R,
    pending: Vec<u8>,
    frames: Option<mpsc::UnboundedSender<String>>,
    writer_task: Option<JoinHandle<io::Result<()>>>,
    output: O,
    state: SessionState,
    listening: bool,
}

impl<R, O> Session<R, O>
where
    R: AsyncBufRead + Unpin,
    O: AsyncWrite + Unpin,
{
    /// Creates a session and starts its frame writer. Must be called inside a tokio runtime.
    pub fn new<W>(reader: R, writer: W, output: O) -> Self
    where
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (frames, queue) = mpsc::unbounded_channel();
        Self {
            reader,
            pending: Vec::new(),
            frames: Some(frames),
            writer_task: Some(tokio::spawn(write_frames(writer, queue))),
            output,
            state: SessionState::default(),
            listening: true,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Runs until the user types an exit line or console input ends,
    /// waits for the server block that is still in flight, then flushes
    /// queued frames and shuts the connection down.
    pub async fn run(&mut self, console: &mut mpsc::Receiver<String>) -> Result<(), SessionError> {
        loop {
            select! {
                server_line = read_line_lossy(&mut self.reader, &mut self.pending), if self.listening => {
                    let line = server_line.map_err(SessionError::Read)?;
                    self.handle_server_line(line).await?;
                }
                console_line = console.recv() => {
                    if !self.handle_console_line(console_line).await? {
                        break;
                    }
                }
                stopped = writer_stopped(&mut self.writer_task) => {
                    return Err(writer_failure(stopped));
                }
            }
        }

        self.drain().await?;
        self.finish().await
    }

    async fn handle_server_line(&mut self, line: Option<String>) -> Result<ListenStep, SessionError> {
        match line {
            Some(line) => self.listen_step(&line).await,
            None => {
                // The remote closed; there is nothing left to listen for.
                info!("server closed the connection");
                self.listening = false;
                Ok(ListenStep::Suspend)
            }
        }
    }

    async fn listen_step(&mut self, line: &str) -> Result<ListenStep, SessionError> {
        self.print(line).await?;

        let (state, step) = self.state.observe(line);
        self.state = state;

        if step == ListenStep::Suspend {
            self.print(COMMAND_PROMPT).await?;
        }
        Ok(step)
    }

    async fn handle_console_line(&mut self, line: Option<String>) -> Result<bool, SessionError> {
        let Some(line) = line else {
            debug!("console input closed");
            return Ok(false);
        };

        match ConsoleInput::parse(&line) {
            ConsoleInput::Ignore => Ok(true),
            ConsoleInput::Exit => {
                debug!("exit requested");
                Ok(false)
            }
            ConsoleInput::Send { frame, skip_wait } => {
                self.print(&format!("Sending message: {line}")).await?;
                self.state = SessionState { skip_wait };
                if skip_wait {
                    self.print(MESSAGE_PROMPT).await?;
                }

                let queued = self
                    .frames
                    .as_ref()
                    .is_some_and(|frames| frames.send(frame).is_ok());
                if !queued {
                    // The writer only drops its queue after a failed write.
                    let stopped = writer_stopped(&mut self.writer_task).await;
                    return Err(writer_failure(stopped));
                }
                Ok(true)
            }
        }
    }

    /// Finishes the block the listener was waiting on before the loop ended.
    async fn drain(&mut self) -> Result<(), SessionError> {
        if self.listening {
            debug!("waiting for the pending server reply");
        }

        while self.listening {
            select! {
                server_line = read_line_lossy(&mut self.reader, &mut self.pending) => {
                    let line = server_line.map_err(SessionError::Read)?;
                    if self.handle_server_line(line).await? == ListenStep::Suspend {
                        break;
                    }
                }
                stopped = writer_stopped(&mut self.writer_task) => {
                    return Err(writer_failure(stopped));
                }
            }
        }
        Ok(())
    }

    /// Closes the frame queue and waits for the writer to send what is left.
    async fn finish(&mut self) -> Result<(), SessionError> {
        self.frames = None;
        match self.writer_task.take() {
            Some(task) => join_outcome(task.await).map_err(SessionError::Write),
            None => Ok(()),
        }
    }

    async fn print(&mut self, line: &str) -> Result<(), SessionError> {
        write_line(&mut self.output, line)
            .await
            .map_err(SessionError::Console)
    }
}

/// Writes queued frames in order, then shuts the connection's write half down.
async fn write_frames<W>(mut writer: W, mut frames: mpsc::UnboundedReceiver<String>) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    while let Some(frame) = frames.recv().await {
        write_frame(&mut writer, &frame).await?;
        debug!(bytes = frame.len(), "frame sent");
    }

    if let Err(error) = writer.shutdown().await {
        warn!(?error, "failed to shutdown connection cleanly");
    }
    Ok(())
}

/// Resolves once the writer task has ended; never resolves after that.
async fn writer_stopped(task: &mut Option<JoinHandle<io::Result<()>>>) -> io::Result<()> {
    let Some(handle) = task else {
        return future::pending().await;
    };

    let outcome = join_outcome(handle.await);
    *task = None;
    outcome
}

fn join_outcome(result: Result<io::Result<()>, JoinError>) -> io::Result<()> {
    result.unwrap_or_else(|error| Err(io::Error::other(error)))
}

fn writer_failure(stopped: io::Result<()>) -> SessionError {
    SessionError::Write(
        stopped
            .err()
            .unwrap_or_else(|| io::Error::other("frame writer stopped")),
    )
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::{
        io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader, DuplexStream},
        time::timeout,
    };

    use super::*;

    type TestSession = Session<BufReader<DuplexStream>, Vec<u8>>;

    struct FakeServer {
        from_client: DuplexStream,
        to_client: DuplexStream,
    }

    fn connected_session() -> (TestSession, FakeServer) {
        let (client_read, to_client) = tokio::io::duplex(1024);
        let (client_write, from_client) = tokio::io::duplex(1024);
        let session = Session::new(BufReader::new(client_read), client_write, Vec::new());
        (
            session,
            FakeServer {
                from_client,
                to_client,
            },
        )
    }

    async fn console_with(lines: &[&str]) -> mpsc::Receiver<String> {
        let (tx, rx) = mpsc::channel(lines.len().max(1));
        for line in lines {
            tx.send(line.to_string()).await.expect("queue console line");
        }
        rx
    }

    fn output_of(session: &TestSession) -> String {
        String::from_utf8(session.output.clone()).expect("utf8 output")
    }

    #[test]
    fn sentinel_suspends_without_skip_wait() {
        let state = SessionState::default();

        let (state, step) = state.observe("alice");
        assert_eq!(step, ListenStep::Continue);
        let (state, step) = state.observe(".");
        assert_eq!(step, ListenStep::Suspend);
        assert!(!state.skip_wait);
    }

    #[test]
    fn skip_wait_suspends_on_first_line_and_clears() {
        let state = SessionState { skip_wait: true };

        let (state, step) = state.observe("message delivered");
        assert_eq!(step, ListenStep::Suspend);
        assert_eq!(state, SessionState { skip_wait: false });

        let (_, step) = state.observe("next");
        assert_eq!(step, ListenStep::Continue);
    }

    #[tokio::test]
    async fn send_command_writes_frame_and_sets_skip_wait() {
        let (mut session, mut server) = connected_session();
        drop(server.to_client);
        let mut console = console_with(&["SEND hi there", "exit"]).await;

        session.run(&mut console).await.expect("session runs");

        let expected = b"SEND\nhi\nthere\n.\n";
        let mut written = vec![0u8; expected.len()];
        server
            .from_client
            .read_exact(&mut written)
            .await
            .expect("read frame");
        assert_eq!(written, expected);
        assert!(session.state().skip_wait);
        assert_eq!(
            output_of(&session),
            "Sending message: SEND hi there\nEnter message: \n"
        );
    }

    #[tokio::test]
    async fn other_commands_clear_skip_wait() {
        let (mut session, mut server) = connected_session();
        drop(server.to_client);
        let mut console = console_with(&["BROADCAST hello", "LIST", "exit"]).await;

        session.run(&mut console).await.expect("session runs");

        assert!(!session.state().skip_wait);
        drop(session);
        let mut written = String::new();
        server
            .from_client
            .read_to_string(&mut written)
            .await
            .expect("read frames");
        assert_eq!(written, "BROADCAST\nhello\n.\nLIST\n.\n");
    }

    #[tokio::test]
    async fn empty_input_writes_nothing() {
        let (mut session, mut server) = connected_session();
        drop(server.to_client);
        let mut console = console_with(&["", "", "exit"]).await;

        session.run(&mut console).await.expect("session runs");

        assert_eq!(output_of(&session), "");
        drop(session);
        let mut written = Vec::new();
        server
            .from_client
            .read_to_end(&mut written)
            .await
            .expect("read to end");
        assert!(written.is_empty());
    }

    #[tokio::test]
    async fn block_is_echoed_through_sentinel_before_prompt() {
        let (mut session, mut server) = connected_session();
        server
            .to_client
            .write_all(b"alice\nbob\n.\n")
            .await
            .expect("write block");
        drop(server.to_client);
        let mut console = console_with(&[]).await;

        timeout(Duration::from_secs(1), session.run(&mut console))
            .await
            .expect("session finishes")
            .expect("session runs");

        assert_eq!(output_of(&session), "alice\nbob\n.\nEnter command: \n");
    }

    #[tokio::test]
    async fn non_ascii_bytes_are_echoed_as_question_marks() {
        let (mut session, mut server) = connected_session();
        server
            .to_client
            .write_all(b"caf\xe9\n.\n")
            .await
            .expect("write block");
        drop(server.to_client);
        let mut console = console_with(&[]).await;

        timeout(Duration::from_secs(1), session.run(&mut console))
            .await
            .expect("session finishes")
            .expect("session runs");

        assert_eq!(output_of(&session), "caf?\n.\nEnter command: \n");
    }

    #[tokio::test]
    async fn server_lines_are_echoed_while_a_frame_write_is_blocked() {
        let (client_read, mut to_client) = tokio::io::duplex(1024);
        // Far smaller than the frame, and nobody reads it until the end.
        let (client_write, mut from_client) = tokio::io::duplex(8);
        let (output, display) = tokio::io::duplex(1024);
        let mut display = BufReader::new(display).lines();
        let mut session = Session::new(BufReader::new(client_read), client_write, output);

        let (console_tx, mut console) = mpsc::channel(1);
        let session_task = tokio::spawn(async move { session.run(&mut console).await });

        console_tx
            .send("LIST some long words here".to_string())
            .await
            .expect("queue command");
        let sending = timeout(Duration::from_secs(1), display.next_line())
            .await
            .expect("sending notice shown")
            .expect("read display");
        assert_eq!(
            sending.as_deref(),
            Some("Sending message: LIST some long words here")
        );

        to_client.write_all(b"hello\n.\n").await.expect("write block");
        for expected in ["hello", ".", "Enter command: "] {
            let line = timeout(Duration::from_secs(1), display.next_line())
                .await
                .expect("server line echoed while the write is stuck")
                .expect("read display");
            assert_eq!(line.as_deref(), Some(expected));
        }

        console_tx.send("exit".to_string()).await.expect("queue exit");
        drop(to_client);
        let mut written = String::new();
        timeout(Duration::from_secs(1), from_client.read_to_string(&mut written))
            .await
            .expect("frame flushed after exit")
            .expect("read frame");
        assert_eq!(written, "LIST\nsome\nlong\nwords\nhere\n.\n");

        timeout(Duration::from_secs(1), session_task)
            .await
            .expect("session finishes")
            .expect("session task")
            .expect("session runs");
    }

    #[tokio::test]
    async fn reply_after_send_closes_block_without_sentinel() {
        let (mut session, server) = connected_session();
        let FakeServer {
            mut from_client,
            mut to_client,
        } = server;
        let server_task = tokio::spawn(async move {
            let mut frame = vec![0u8; b"SEND\nbob\nhi\n.\n".len()];
            from_client.read_exact(&mut frame).await.expect("read frame");
            to_client
                .write_all(b"delivered\nmore\n.\n")
                .await
                .expect("write reply");
        });
        let mut console = console_with(&["SEND bob hi", "exit"]).await;

        timeout(Duration::from_secs(1), session.run(&mut console))
            .await
            .expect("session finishes")
            .expect("session runs");
        server_task.await.expect("server task");

        assert!(output_of(&session).starts_with(
            "Sending message: SEND bob hi\nEnter message: \ndelivered\nEnter command: \n"
        ));
        assert!(!session.state().skip_wait);
    }

    #[tokio::test]
    async fn exit_drains_pending_block_and_leaves_later_input_unconsumed() {
        let (mut session, mut server) = connected_session();
        let (console_tx, mut console) = mpsc::channel(1);
        console_tx.send("exit".to_string()).await.expect("queue exit");

        let session_task = tokio::spawn(async move {
            let result = session.run(&mut console).await;
            (session, console, result)
        });

        // Capacity frees up once the session has taken the exit line.
        let permit = console_tx.reserve().await.expect("console open");
        permit.send("LIST".to_string());
        server
            .to_client
            .write_all(b"one\ntwo\n.\nlater\n")
            .await
            .expect("write block");

        let (session, mut console, result) = timeout(Duration::from_secs(1), session_task)
            .await
            .expect("session finishes")
            .expect("session task");
        result.expect("session runs");

        assert_eq!(output_of(&session), "one\ntwo\n.\nEnter command: \n");
        assert_eq!(console.try_recv().expect("input left unread"), "LIST");
    }

    #[tokio::test]
    async fn closed_server_stops_listening_but_keeps_console() {
        let (mut session, server) = connected_session();
        drop(server.to_client);
        let mut console = console_with(&["LIST", "exit"]).await;

        session.run(&mut console).await.expect("session runs");

        assert!(!session.listening);
        assert_eq!(output_of(&session), "Sending message: LIST\n");
    }

    #[tokio::test]
    async fn write_failure_ends_session_with_write_error() {
        let (mut session, server) = connected_session();
        drop(server.from_client);
        let mut console = console_with(&["LIST", "exit"]).await;

        let result = session.run(&mut console).await;

        assert!(matches!(result, Err(SessionError::Write(_))));
    }
}
