//! Line-oriented bridge to the SOTA core.
//!
//! Reads one JSON command per stdin line and prints the terminal event as a
//! JSON line. A line starting with `!` is submitted fire-and-forget. EOF shuts
//! the loops down and prints the journal.

use anyhow::Result;
use sota_common::Config;
use sota_server::{serve_lines, Sota};
use tokio::io::BufReader;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env()?;

    let filter = EnvFilter::from_default_env().add_directive("sota=info".parse()?);
    if config.log_json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }

    info!("SOTA core starting...");
    config.log_summary();

    let sota = Sota::start(&config.engine).await?;

    let input = BufReader::new(tokio::io::stdin());
    let stats = serve_lines(&sota, input, tokio::io::stdout()).await?;
    info!(
        interpreted = stats.interpreted,
        sent = stats.sent,
        skipped = stats.skipped,
        "Input closed"
    );

    let journal = sota.journal().clone();
    sota.shutdown().await?;

    for entry in journal.entries() {
        info!(target: "sota::audit", "{}", entry.to_json());
    }
    info!("SOTA core stopped");
    Ok(())
}
