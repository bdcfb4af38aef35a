//! # dockrs Network Command Group
//!
//! File: cli/src/commands/network.rs
//!
//! `dockrs network <verb>`: drives `resources::network`. The identity is the
//! network ID printed by `create`.
//!
use super::{
    load_spec, print_exists, print_read, print_state, replacement_only, ResourceCommand,
};
use crate::core::error::Result;
use crate::resources::network::{self, NetworkSpec};
use crate::resources::Provider;
use clap::Parser;

#[derive(Parser, Debug)]
pub struct NetworkArgs {
    #[command(subcommand)]
    command: ResourceCommand,
}

/// Routes one `dockrs network` verb to the network reconciler.
///
/// ## Returns
///
/// * `Ok(())` once the state (or `exists` answer) has been printed on stdout.
/// * `Err` when the manifest cannot be loaded or the reconciler fails.
///   `update` is always an error: the resource must be replaced.
pub async fn handle_network(args: NetworkArgs, provider: &Provider) -> Result<()> {
    match args.command {
        ResourceCommand::Create(args) => {
            let spec: NetworkSpec = load_spec(&args.spec)?;
            let state = network::create(provider, &spec).await?;
            print_state(&state)
        }
        ResourceCommand::Read(args) => {
            let spec: NetworkSpec = load_spec(&args.spec.spec)?;
            let state = network::read(provider, &spec, &args.id).await?;
            print_read("Network", &args.id, state)
        }
        ResourceCommand::Update(_) => Err(replacement_only("Network")),
        ResourceCommand::Delete(args) => {
            let spec: NetworkSpec = load_spec(&args.spec.spec)?;
            network::delete(provider, &spec, &args.id).await
        }
        ResourceCommand::Exists(args) => {
            let spec: NetworkSpec = load_spec(&args.spec.spec)?;
            print_exists(network::exists(provider, &spec, &args.id).await?);
            Ok(())
        }
    }
}
