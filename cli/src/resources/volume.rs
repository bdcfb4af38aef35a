//! # dockrs Volume Reconciler (`resources::volume`)
//!
//! File: cli/src/resources/volume.rs
//!
//! Named volumes. When no name is given the daemon picks one; the identity is
//! always the name the daemon returns.
//!
use crate::common::convert;
use crate::common::docker::client::{self, DockerClient};
use crate::common::docker::connect::ConnectionOverrides;
use crate::core::error::Result;
use crate::resources::{docker_err, Provider};
use anyhow::Context;
use bollard::models::Volume;
use bollard::volume::CreateVolumeOptions;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{info, instrument, warn};

/// Declarative volume resource.
#[derive(Deserialize, Serialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct VolumeSpec {
    #[serde(default)]
    pub connection: ConnectionOverrides,
    pub name: Option<String>,
    pub driver: Option<String>,
    #[serde(default)]
    pub driver_opts: BTreeMap<String, String>,
}

/// Observed volume.
#[derive(Serialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct VolumeState {
    pub name: String,
    pub driver: String,
    pub mountpoint: String,
}

impl From<Volume> for VolumeState {
    fn from(volume: Volume) -> Self {
        VolumeState {
            name: volume.name,
            driver: volume.driver,
            mountpoint: volume.mountpoint,
        }
    }
}

/// Creates a volume, letting the daemon pick a name when `spec.name` is unset.
///
/// ## Returns
///
/// The observed state. Its `name` is the identity to use for every later call.
///
/// ## Errors
///
/// - `Deferred` when the connection cannot be resolved yet.
/// - The daemon error, with context, when creation fails.
#[instrument(skip_all, fields(volume = spec.name.as_deref().unwrap_or("<generated>")))]
pub async fn create(provider: &Provider, spec: &VolumeSpec) -> Result<VolumeState> {
    let client = provider.client(&spec.connection).await?;
    let options = CreateVolumeOptions {
        name: spec.name.clone().unwrap_or_default(),
        driver: spec.driver.clone().unwrap_or_default(),
        driver_opts: convert::to_hash_map(&spec.driver_opts),
        ..Default::default()
    };
    let volume = client
        .create_volume(options)
        .await
        .map_err(docker_err)
        .context("Unable to create volume")?;
    info!("Created volume {}", volume.name);
    Ok(volume.into())
}

async fn inspect(client: &dyn DockerClient, name: &str) -> Result<Option<VolumeState>> {
    match client.inspect_volume(name).await {
        Ok(volume) => Ok(Some(volume.into())),
        Err(e) if client::is_not_found(&e) => Ok(None),
        Err(e) => Err(docker_err(e)).context("Unable to inspect volume"),
    }
}

/// Looks up volume `name`; `None` once it is gone.
#[instrument(skip_all, fields(volume = %name))]
pub async fn read(provider: &Provider, spec: &VolumeSpec, name: &str) -> Result<Option<VolumeState>> {
    let client = provider.client(&spec.connection).await?;
    inspect(client.as_ref(), name).await
}

/// Removes volume `name`.
///
/// ## Errors
///
/// Any daemon failure other than 404, e.g. 409 while the volume is in use.
#[instrument(skip_all, fields(volume = %name))]
pub async fn delete(provider: &Provider, spec: &VolumeSpec, name: &str) -> Result<()> {
    let client = provider.client(&spec.connection).await?;
    match client.remove_volume(name).await {
        Ok(()) => {
            info!("Removed volume {}", name);
            Ok(())
        }
        Err(e) if client::is_not_found(&e) => {
            warn!("Volume {} was already gone", name);
            Ok(())
        }
        Err(e) => Err(docker_err(e)).with_context(|| format!("Error deleting volume {}", name)),
    }
}

/// Reports whether volume `name` exists; `false` while the connection is deferred.
#[instrument(skip_all, fields(volume = %name))]
pub async fn exists(provider: &Provider, spec: &VolumeSpec, name: &str) -> Result<bool> {
    match provider.client_if_ready(&spec.connection).await? {
        Some(client) => Ok(inspect(client.as_ref(), name).await?.is_some()),
        None => Ok(false),
    }
}
