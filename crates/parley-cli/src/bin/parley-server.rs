use anyhow::{Context, Result};
use clap::Parser;
use parley::prelude::*;
use parley_transport::DEFAULT_MAX_FRAME_LEN;

/// Runs the Parley chat server.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// TCP port to listen on.
    port: u16,

    /// Address to bind to.
    #[arg(long, default_value = "0.0.0.0")]
    host: String,

    /// Most connections registered at once.
    #[arg(long, default_value_t = RegistryLimits::default().max_clients)]
    max_clients: usize,

    /// Most sessions that may exist at once.
    #[arg(long, default_value_t = RegistryLimits::default().max_sessions)]
    max_sessions: usize,

    /// Longest accepted frame in bytes, terminator included.
    #[arg(long, default_value_t = DEFAULT_MAX_FRAME_LEN)]
    max_frame_len: usize,

    /// Messages that may wait for one slow client before broadcasts to it
    /// are dropped.
    #[arg(long, default_value_t = parley::DEFAULT_OUTBOUND_QUEUE)]
    outbound_queue: usize,
}

fn init_tracing() {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt().with_env_filter(filter).with_target(false).try_init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let cli = Cli::parse();
    let addr = format!("{}:{}", cli.host, cli.port);
    let server = ParleyServer::<StaticAuthenticator, TextCodec>::builder()
        .bind(&addr)
        .max_clients(cli.max_clients)
        .max_sessions(cli.max_sessions)
        .max_frame_len(cli.max_frame_len)
        .outbound_queue(cli.outbound_queue)
        .build(StaticAuthenticator::default())
        .await
        .with_context(|| format!("failed to start server on {addr}"))?;

    server
        .run_until(async {
            if let Err(err) = tokio::signal::ctrl_c().await {
                tracing::warn!("failed to listen for ctrl-c: {err}");
            }
        })
        .await?;

    Ok(())
}
