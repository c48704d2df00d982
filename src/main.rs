//! Web3 Gateway
//!
//! Accepts blockchain operations over HTTP, persists them on a topic queue
//! and answers with an operation id. Workers execute them against the chain
//! RPC and publish the outcome for polling or awaiting.
//!
//! # Architecture Overview
//!
//! ```text
//!                      ┌──────────────────────────────────────────────────────┐
//!                      │                    WEB3 GATEWAY                       │
//!                      │                                                       │
//!   Client Request     │  ┌─────────┐   ┌────────────┐   ┌────────────────┐   │
//!   ───────────────────┼─▶│  http   │──▶│ operation  │──▶│ queue          │   │
//!                      │  │ server  │   │ validation │   │ dispatcher     │   │
//!                      │  └────┬────┘   └────────────┘   │ + journal      │   │
//!                      │       │                         └───────┬────────┘   │
//!                      │       │ poll / wait                     │            │
//!                      │       ▼                                 ▼            │
//!   Client Response    │  ┌────────────┐   complete   ┌──────────────────┐    │
//!   ◀──────────────────┼──│ completion │◀─────────────│ worker pool      │    │
//!                      │  │ store      │              │ cache → retry →  │────┼──▶ Chain RPC
//!                      │  └────────────┘              │ chain client     │    │
//!                      │                              └──────────────────┘    │
//!                      │                                                       │
//!                      │  ┌──────────────────────────────────────────────────┐ │
//!                      │  │ config │ health │ observability │ lifecycle       │ │
//!                      │  └──────────────────────────────────────────────────┘ │
//!                      └──────────────────────────────────────────────────────┘
//! ```

use clap::Parser;
use std::path::PathBuf;

use web3_gateway::config::load_or_default;
use web3_gateway::lifecycle;
use web3_gateway::observability::{logging, metrics};

#[derive(Parser, Debug)]
#[command(name = "web3-gateway", version, about = "Asynchronous blockchain operation gateway")]
struct Args {
    /// Path to a TOML configuration file. Defaults apply when omitted.
    #[arg(short, long, env = "WEB3_GATEWAY_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Logging needs the config before anything else can be reported.
    let config = load_or_default(args.config.as_deref())?;
    logging::init_logging(&config.observability);

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "web3-gateway starting");

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => {
                if let Err(e) = metrics::init_metrics(addr) {
                    tracing::error!(error = %e, "Failed to start metrics exporter");
                }
            }
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    lifecycle::run(config).await?;
    Ok(())
}
