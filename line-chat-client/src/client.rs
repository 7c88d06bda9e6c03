use tokio::{
    io::{AsyncWrite, BufReader},
    net::{
        TcpStream,
        tcp::{OwnedReadHalf, OwnedWriteHalf},
    },
    sync::mpsc,
};
use tracing::info;

use crate::{cli::ClientArgs, error::SessionError, message::write_line, session::Session};

pub const CONNECTED_BANNER: &str = "Connected to server.";

/// Prefix of the single line reported when a session ends with an error.
pub const ERROR_PREFIX: &str = "An error occurred: ";

/// Connects to the server and runs one session until exit.
///
/// `console` yields typed lines; `output` receives everything shown to the user.
pub async fn run<O>(
    args: &ClientArgs,
    console: &mut mpsc::Receiver<String>,
    mut output: O,
) -> Result<(), SessionError>
where
    O: AsyncWrite + Unpin,
{
    let (reader, writer) = connect(&args.host, args.port).await?;
    write_line(&mut output, CONNECTED_BANNER)
        .await
        .map_err(SessionError::Console)?;

    let mut session = Session::new(reader, writer, output);
    session.run(console).await?;

    info!("session closed");
    Ok(())
}

pub async fn connect(
    host: &str,
    port: u16,
) -> Result<(BufReader<OwnedReadHalf>, OwnedWriteHalf), SessionError> {
    let stream = TcpStream::connect((host, port))
        .await
        .map_err(|source| SessionError::Connect {
            addr: format!("{host}:{port}"),
            source,
        })?;

    info!("connected to {host}:{port}");

    let (reader, writer) = stream.into_split();
    Ok((BufReader::new(reader), writer))
}

/// Writes the one-line error report shown when a session fails.
pub async fn report_error<O>(output: &mut O, error: &SessionError) -> std::io::Result<()>
where
    O: AsyncWrite + Unpin,
{
    write_line(output, &format!("{ERROR_PREFIX}{error}")).await
}
