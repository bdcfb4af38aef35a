//! # dockrs Image Command Group
//!
//! File: cli/src/commands/image.rs
//!
//! `dockrs image <verb>`: drives `resources::image`. The identity is the
//! composed `[registry/]name[:tag]` reference printed by `create`.
//!
use super::{load_spec, print_exists, print_read, print_state, ResourceCommand};
use crate::core::error::Result;
use crate::resources::image::{self, ImageSpec};
use crate::resources::Provider;
use clap::Parser;

#[derive(Parser, Debug)]
pub struct ImageArgs {
    #[command(subcommand)]
    command: ResourceCommand,
}

/// Routes one `dockrs image` verb to the image reconciler.
///
/// ## Returns
///
/// * `Ok(())` once the state (or `exists` answer) has been printed on stdout.
/// * `Err` when the manifest cannot be loaded or the reconciler fails.
pub async fn handle_image(args: ImageArgs, provider: &Provider) -> Result<()> {
    match args.command {
        ResourceCommand::Create(args) => {
            let spec: ImageSpec = load_spec(&args.spec)?;
            let state = image::create(provider, &spec).await?;
            print_state(&state)
        }
        ResourceCommand::Read(args) => {
            let spec: ImageSpec = load_spec(&args.spec.spec)?;
            let state = image::read(provider, &spec, &args.id).await?;
            print_read("Image", &args.id, state)
        }
        ResourceCommand::Update(args) => {
            let spec: ImageSpec = load_spec(&args.target.spec.spec)?;
            let previous: ImageSpec = load_spec(&args.previous)?;
            let id = &args.target.id;
            let state = image::update(provider, &previous, &spec, id).await?;
            print_read("Image", id, state)
        }
        ResourceCommand::Delete(args) => {
            let spec: ImageSpec = load_spec(&args.spec.spec)?;
            image::delete(provider, &spec, &args.id).await
        }
        ResourceCommand::Exists(args) => {
            let spec: ImageSpec = load_spec(&args.spec.spec)?;
            print_exists(image::exists(provider, &spec, &args.id).await?);
            Ok(())
        }
    }
}
