use clap::Parser;

pub const DEFAULT_HOST: &str = "172.30.83.103";
pub const DEFAULT_PORT: u16 = 54321;

/// Line-oriented chat client. Each typed line is sent one word per line,
/// terminated by a line holding a single '.'.
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct ClientArgs {
    /// Host name or IP address of the chat server.
    #[arg(long, default_value = DEFAULT_HOST)]
    pub host: String,

    /// TCP port of the chat server.
    #[arg(long, default_value_t = DEFAULT_PORT)]
    pub port: u16,
}

impl ClientArgs {
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
