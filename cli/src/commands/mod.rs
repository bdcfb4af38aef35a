//! # dockrs Command Modules
//!
//! File: cli/src/commands/mod.rs
//!
//! ## Overview
//!
//! One command group per resource kind. Every group accepts the same verbs,
//! each driven by a TOML manifest holding the resource spec:
//!
//! ```bash
//! dockrs container create --spec web.toml
//! dockrs container read   --spec web.toml --id <ID>
//! dockrs image     update --spec app.toml --id app:v1 --previous app.old.toml
//! dockrs volume    exists --spec data.toml --id pgdata
//! ```
//!
//! States are printed as TOML on stdout; `exists` prints `true` or `false`.
//! A `read` of a resource that is gone prints nothing and exits successfully.
//!
use crate::core::error::{DockrsError, Result};
use anyhow::{anyhow, Context};
use clap::{Args, Subcommand};
use serde::{de::DeserializeOwned, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

pub mod container;
pub mod image;
pub mod network;
pub mod volume;

/// Manifest of the desired resource.
#[derive(Args, Debug)]
pub struct SpecArgs {
    /// TOML manifest describing the resource.
    #[arg(short, long, value_name = "FILE")]
    pub spec: PathBuf,
}

/// Manifest plus the identity returned by a previous `create`.
#[derive(Args, Debug)]
pub struct IdentifiedArgs {
    #[command(flatten)]
    pub spec: SpecArgs,
    /// Resource identity (container/network ID, image reference, volume name).
    #[arg(long)]
    pub id: String,
}

#[derive(Args, Debug)]
pub struct UpdateArgs {
    #[command(flatten)]
    pub target: IdentifiedArgs,
    /// Manifest the resource was last applied with.
    #[arg(long, value_name = "FILE")]
    pub previous: PathBuf,
}

/// Reconciler verbs shared by all resource kinds.
#[derive(Subcommand, Debug)]
pub enum ResourceCommand {
    /// Realize the resource and print its state.
    Create(SpecArgs),
    /// Print the current state, or nothing if the resource is gone.
    Read(IdentifiedArgs),
    /// Apply in-place changes between two manifests.
    Update(UpdateArgs),
    /// Remove the resource; succeeds if it is already gone.
    Delete(IdentifiedArgs),
    /// Print whether the resource exists.
    Exists(IdentifiedArgs),
}

/// Reads and parses a resource manifest.
pub fn load_spec<T: DeserializeOwned>(path: &Path) -> Result<T> {
    debug!("Loading resource manifest {}", path.display());
    let content = std::fs::read_to_string(path).map_err(|e| {
        anyhow!(DockrsError::FileSystem(format!(
            "Failed to read manifest '{}': {}",
            path.display(),
            e
        )))
    })?;
    toml::from_str(&content).map_err(|e| {
        anyhow!(DockrsError::Validation(format!(
            "Invalid manifest '{}': {}",
            path.display(),
            e.message()
        )))
    })
}

/// Prints a state as TOML on stdout.
pub fn print_state<T: Serialize>(state: &T) -> Result<()> {
    let rendered = toml::to_string(state).context("Failed to render state as TOML")?;
    print!("{}", rendered);
    Ok(())
}

/// Prints a state, or warns that the resource has vanished.
pub fn print_read<T: Serialize>(kind: &str, id: &str, state: Option<T>) -> Result<()> {
    match state {
        Some(state) => print_state(&state),
        None => {
            warn!("{} {} no longer exists", kind, id);
            Ok(())
        }
    }
}

/// Prints `true` or `false`.
pub fn print_exists(exists: bool) {
    println!("{}", exists);
}

/// Error for verbs a resource kind does not support in place.
pub fn replacement_only(kind: &str) -> anyhow::Error {
    anyhow!(DockrsError::Validation(format!(
        "{} resources cannot be updated in place; delete and create instead",
        kind
    )))
}
