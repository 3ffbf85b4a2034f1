use anyhow::Result;
use clap::Parser;
use tokio::net::TcpListener;
use tracing::info;

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Recording verification service for rustsiprec",
    long_about = None
)]
struct Args {
    /// Bind address for the HTTP server
    #[arg(short, long, default_value = "0.0.0.0")]
    addr: String,

    /// HTTP port
    #[arg(short, long, default_value_t = 3000)]
    port: u16,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();
    let args = Args::parse();

    let listener = TcpListener::bind((args.addr.as_str(), args.port)).await?;
    info!("verifier listening on {}", listener.local_addr()?);
    axum::serve(listener, rustsiprec::verifier::router()).await?;
    Ok(())
}
