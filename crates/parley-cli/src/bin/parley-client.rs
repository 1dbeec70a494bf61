use anyhow::Result;
use clap::Parser;
use parley_client::ClientConfig;
use parley_transport::DEFAULT_MAX_FRAME_LEN;
use tokio::io::BufReader;

/// Interactive Parley chat client.
///
/// Commands: /login <client ID> <password> <server-IP> <server-port>,
/// /logout, /joinsession <session ID>, /leavesession,
/// /createsession <session ID>, /list, /quit. Any other line is sent to the
/// current session.
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Cli {
    /// Longest frame accepted from the server, terminator included.
    #[arg(long, default_value_t = DEFAULT_MAX_FRAME_LEN)]
    max_frame_len: usize,
}

/// Logs go to stderr so they never mix with the chat on stdout.
fn init_tracing() {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let cli = Cli::parse();
    let config = ClientConfig {
        max_frame_len: cli.max_frame_len,
    };
    parley_client::run(BufReader::new(tokio::io::stdin()), tokio::io::stdout(), config).await?;
    Ok(())
}
