//! # dockrs Volume Command Group
//!
//! File: cli/src/commands/volume.rs
//!
//! `dockrs volume <verb>`: drives `resources::volume`. The identity is the
//! volume name printed by `create`.
//!
use super::{
    load_spec, print_exists, print_read, print_state, replacement_only, ResourceCommand,
};
use crate::core::error::Result;
use crate::resources::volume::{self, VolumeSpec};
use crate::resources::Provider;
use clap::Parser;

#[derive(Parser, Debug)]
pub struct VolumeArgs {
    #[command(subcommand)]
    command: ResourceCommand,
}

/// Routes one `dockrs volume` verb to the volume reconciler.
///
/// ## Returns
///
/// * `Ok(())` once the state (or `exists` answer) has been printed on stdout.
/// * `Err` when the manifest cannot be loaded or the reconciler fails.
///   `update` is always an error: the resource must be replaced.
pub async fn handle_volume(args: VolumeArgs, provider: &Provider) -> Result<()> {
    match args.command {
        ResourceCommand::Create(args) => {
            let spec: VolumeSpec = load_spec(&args.spec)?;
            let state = volume::create(provider, &spec).await?;
            print_state(&state)
        }
        ResourceCommand::Read(args) => {
            let spec: VolumeSpec = load_spec(&args.spec.spec)?;
            let state = volume::read(provider, &spec, &args.id).await?;
            print_read("Volume", &args.id, state)
        }
        ResourceCommand::Update(_) => Err(replacement_only("Volume")),
        ResourceCommand::Delete(args) => {
            let spec: VolumeSpec = load_spec(&args.spec.spec)?;
            volume::delete(provider, &spec, &args.id).await
        }
        ResourceCommand::Exists(args) => {
            let spec: VolumeSpec = load_spec(&args.spec.spec)?;
            print_exists(volume::exists(provider, &spec, &args.id).await?);
            Ok(())
        }
    }
}
