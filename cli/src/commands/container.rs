//! # dockrs Container Command Group
//!
//! File: cli/src/commands/container.rs
//!
//! `dockrs container <verb>`: drives `resources::container`. The identity is
//! the container ID printed by `create`.
//!
//! When `create` fails after the container already exists on the daemon, the
//! ID is still printed (as `id = "..."`) before the error, so the caller can
//! track the leftover container and delete it.
//!
use super::{load_spec, print_exists, print_read, print_state, ResourceCommand};
use crate::core::error::{DockrsError, Result};
use crate::resources::container::{self, ContainerSpec};
use crate::resources::Provider;
use clap::Parser;
use serde::Serialize;

#[derive(Parser, Debug)]
pub struct ContainerArgs {
    #[command(subcommand)]
    command: ResourceCommand,
}

#[derive(Serialize)]
struct PartialState<'a> {
    id: &'a str,
}

/// Routes one `dockrs container` verb to the container reconciler.
///
/// ## Returns
///
/// * `Ok(())` once the state (or `exists` answer) has been printed on stdout.
/// * `Err` when the manifest cannot be loaded or the reconciler fails. A
///   partially created container has its `id` printed before the error.
pub async fn handle_container(args: ContainerArgs, provider: &Provider) -> Result<()> {
    match args.command {
        ResourceCommand::Create(args) => {
            let spec: ContainerSpec = load_spec(&args.spec)?;
            match container::create(provider, &spec).await {
                Ok(state) => print_state(&state),
                Err(e) => {
                    if let Some(id) = e
                        .downcast_ref::<DockrsError>()
                        .and_then(DockrsError::partially_created_id)
                    {
                        print_state(&PartialState { id })?;
                    }
                    Err(e)
                }
            }
        }
        ResourceCommand::Read(args) => {
            let spec: ContainerSpec = load_spec(&args.spec.spec)?;
            let state = container::read(provider, &spec, &args.id).await?;
            print_read("Container", &args.id, state)
        }
        ResourceCommand::Update(args) => {
            let spec: ContainerSpec = load_spec(&args.target.spec.spec)?;
            let previous: ContainerSpec = load_spec(&args.previous)?;
            container::update(provider, &previous, &spec, &args.target.id).await
        }
        ResourceCommand::Delete(args) => {
            let spec: ContainerSpec = load_spec(&args.spec.spec)?;
            container::delete(provider, &spec, &args.id).await
        }
        ResourceCommand::Exists(args) => {
            let spec: ContainerSpec = load_spec(&args.spec.spec)?;
            print_exists(container::exists(provider, &spec, &args.id).await?);
            Ok(())
        }
    }
}
