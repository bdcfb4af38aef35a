//! # dockrs Main Entry Point
//!
//! File: cli/src/main.rs
//!
//! ## Overview
//!
//! Command-line host for the reconcilers:
//! - parses arguments with Clap
//! - sets up logging from the `-v` count (`RUST_LOG` wins)
//! - loads the provider configuration (`--config` plus the discovered layers)
//! - routes to the command group of the requested resource kind
//!
//! ```bash
//! dockrs -v container create --spec web.toml
//! dockrs --config ./remote.toml network read --spec backend.toml --id 4f1c...
//! ```
//!
use clap::Parser;
use dockrs::commands;
use dockrs::core::config::load_config;
use dockrs::resources::Provider;
use std::path::PathBuf;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser, Debug)]
#[command(
    name = "dockrs",
    about = "Declarative Docker resources: images, containers, networks and volumes",
    propagate_version = true,
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
    /// Provider configuration file, applied on top of the discovered ones.
    #[arg(long, global = true, value_name = "FILE", env = "DOCKRS_CONFIG")]
    config: Option<PathBuf>,
}

#[derive(Parser, Debug)]
enum Commands {
    #[command(alias = "i")]
    Image(commands::image::ImageArgs),
    #[command(alias = "c")]
    Container(commands::container::ContainerArgs),
    #[command(alias = "n")]
    Network(commands::network::NetworkArgs),
    #[command(alias = "v")]
    Volume(commands::volume::VolumeArgs),
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = load_config(cli.config.as_deref())?;
    let provider = Provider::from_config(&config);
    match cli.command {
        Commands::Image(args) => commands::image::handle_image(args, &provider).await,
        Commands::Container(args) => {
            commands::container::handle_container(args, &provider).await
        }
        Commands::Network(args) => commands::network::handle_network(args, &provider).await,
        Commands::Volume(args) => commands::volume::handle_volume(args, &provider).await,
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let log_level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));
    fmt::Subscriber::builder()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .init();

    tracing::debug!("Parsed CLI arguments: {:?}", cli);

    if let Err(e) = run(cli).await {
        tracing::error!("Command execution failed: {:?}", e);
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }

    Ok(())
}
