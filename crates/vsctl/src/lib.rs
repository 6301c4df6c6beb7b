//! vsctl library
//!
//! Command definitions and handlers, kept out of `main.rs` so they can be
//! exercised against the in-memory store.

pub mod commands;
pub mod config;

use clap::{Parser, Subcommand};
use kube::CustomResourceExt;
use tracing::debug;
use virtual_server_client::KubeVirtualServerStore;
use virtual_server_crds::VirtualServer;

pub use config::Config;

/// VirtualServer command-line tool
#[derive(Parser, Debug)]
#[command(name = "vsctl", version, about)]
pub struct Cli {
    #[command(flatten)]
    pub config: Config,

    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Build a VirtualServer from flags and create it
    Create(commands::CreateArgs),
    /// Create or update a VirtualServer from a manifest
    Apply(commands::ApplyArgs),
    /// Print a VirtualServer
    Get(commands::GetArgs),
    /// Show the conditions and addresses of a VirtualServer
    Status(commands::NameArgs),
    /// Expose additional ports on a VirtualServer
    Expose(commands::ExposeArgs),
    /// Print the CustomResourceDefinition
    Crd,
}

impl Cli {
    /// Run the selected command
    pub async fn run(self) -> anyhow::Result<()> {
        debug!(namespace = %self.config.namespace, "Running vsctl");

        let config = &self.config;
        let output = match self.command {
            Commands::Crd => serde_yaml::to_string(&VirtualServer::crd())?,
            Commands::Create(args) => commands::create(&store().await?, config, &args).await?,
            Commands::Apply(args) => commands::apply(&store().await?, config, &args).await?,
            Commands::Get(args) => commands::get(&store().await?, config, &args).await?,
            Commands::Status(args) => commands::status(&store().await?, config, &args).await?,
            Commands::Expose(args) => commands::expose(&store().await?, config, &args).await?,
        };
        println!("{}", output.trim_end());
        Ok(())
    }
}

/// Store backed by the cluster from KUBECONFIG or the in-cluster config
async fn store() -> anyhow::Result<KubeVirtualServerStore> {
    Ok(KubeVirtualServerStore::new(kube::Client::try_default().await?))
}
