mod catalog;
mod cli;
mod config;
mod crosswalk;
mod limiter;
mod musicbrainz;
mod normalize;
mod resolver;
mod score;
mod search;
mod spotify;
#[cfg(test)]
mod testkit;
mod types;
mod walker;

use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Logs go to stderr; stdout carries only result JSON.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();
    cli::main().await
}
