//! vsctl
//!
//! Build, apply and inspect VirtualServer records.

use clap::Parser;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};
use vsctl::Cli;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Configure rustls crypto provider (ring) before any kube client is built
    if rustls::crypto::ring::default_provider().install_default().is_err() {
        anyhow::bail!("failed to install the rustls crypto provider");
    }

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with(tracing_subscriber::fmt::layer().with_target(false).with_writer(std::io::stderr))
        .init();

    Cli::parse().run().await
}
