use anyhow::Result;
use clap::Parser;
use tracing::error;

use line_chat_client::{cli::ClientArgs, client, console};

fn init_tracing() {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    // Stdout carries the chat itself; diagnostics go to stderr.
    let _ = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let args = ClientArgs::parse();
    let mut console = console::spawn_stdin_reader()?;

    if let Err(err) = client::run(&args, &mut console, tokio::io::stdout()).await {
        error!("session ended with error: {err}");
        client::report_error(&mut tokio::io::stdout(), &err).await?;
    }

    Ok(())
}
