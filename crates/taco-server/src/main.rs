//! taco-rust - Taco server executable for Rust.
//!
//! Speaks the Taco protocol on stdin/stdout: a client that spawned this
//! process sends newline-delimited JSON requests on stdin and reads one
//! response per request from stdout. All logging goes to stderr; stdout
//! belongs to the wire and must stay clean.

mod modules;

use anyhow::Result;
use clap::Parser;
use taco_core::TacoServer;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "taco-rust")]
#[command(about = "Taco server speaking newline-delimited JSON on stdio")]
struct Args {
    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Set up logging on stderr; stdout carries protocol frames.
    let filter = if args.debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .init();

    info!("Starting taco-rust server");

    let mut server = TacoServer::stdio(modules::registry());
    server.run().await?;

    info!("taco-rust server exiting");
    Ok(())
}
