//! # dockrs Network Reconciler (`resources::network`)
//!
//! File: cli/src/resources/network.rs
//!
//! User-defined networks. The identity is the daemon-assigned network ID.
//! Create responses do not echo `internal` and `options`, so the state
//! returned by `create` carries the requested values forward; `read` reports
//! what the daemon says.
//!
use crate::common::convert;
use crate::common::docker::client::{self, DockerClient};
use crate::common::docker::connect::ConnectionOverrides;
pub use crate::common::elements::IpamBlock;
use crate::common::hash::StableSet;
use crate::core::error::{DockrsError, Result};
use crate::resources::{docker_err, Provider};
use anyhow::{anyhow, Context};
use bollard::models::{Ipam, Network};
use bollard::network::CreateNetworkOptions;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{info, instrument, warn};

/// Declarative network resource.
#[derive(Deserialize, Serialize, Debug, Clone, Default, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct NetworkSpec {
    #[serde(default)]
    pub connection: ConnectionOverrides,
    pub name: String,
    #[serde(default)]
    pub check_duplicate: bool,
    pub driver: Option<String>,
    #[serde(default)]
    pub options: BTreeMap<String, String>,
    #[serde(default)]
    pub internal: bool,
    pub ipam_driver: Option<String>,
    #[serde(default)]
    pub ipam_config: StableSet<IpamBlock>,
}

/// Observed network.
#[derive(Serialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct NetworkState {
    pub id: String,
    pub name: String,
    pub scope: Option<String>,
    pub driver: Option<String>,
    pub options: BTreeMap<String, String>,
    pub internal: bool,
}

impl NetworkSpec {
    pub fn new(name: &str) -> Self {
        NetworkSpec {
            name: name.to_string(),
            ..Default::default()
        }
    }

    /// ## Errors
    ///
    /// `Validation` when the name is blank.
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(anyhow!(DockrsError::Validation(
                "network name must not be empty".to_string()
            )));
        }
        Ok(())
    }

    fn create_options(&self) -> CreateNetworkOptions<String> {
        let ipam = if self.ipam_driver.is_some() || !self.ipam_config.is_empty() {
            Ipam {
                driver: self.ipam_driver.clone(),
                config: Some(convert::ipam_configs(&self.ipam_config)),
                options: None,
            }
        } else {
            Ipam::default()
        };
        CreateNetworkOptions {
            name: self.name.clone(),
            check_duplicate: self.check_duplicate,
            driver: self.driver.clone().unwrap_or_default(),
            internal: self.internal,
            options: convert::to_hash_map(&self.options),
            ipam,
            ..Default::default()
        }
    }
}

fn state_of(network: Network) -> NetworkState {
    NetworkState {
        id: network.id.unwrap_or_default(),
        name: network.name.unwrap_or_default(),
        scope: network.scope,
        driver: network.driver,
        options: network.options.unwrap_or_default().into_iter().collect(),
        internal: network.internal.unwrap_or(false),
    }
}

/// Creates a network from `spec`.
///
/// ## Returns
///
/// The observed state, with `internal` and `options` taken from the request
/// because the create response does not echo them.
///
/// ## Errors
///
/// - `Validation` for an empty name.
/// - `Deferred` when the connection cannot be resolved yet.
/// - The daemon error, with context, when creation fails.
#[instrument(skip_all, fields(network = %spec.name))]
pub async fn create(provider: &Provider, spec: &NetworkSpec) -> Result<NetworkState> {
    spec.validate()?;
    let client = provider.client(&spec.connection).await?;
    let network = client
        .create_network(spec.create_options())
        .await
        .map_err(docker_err)
        .context("Unable to create network")?;

    let mut state = state_of(network);
    if state.id.is_empty() {
        return Err(anyhow!(DockrsError::DockerOperation(
            "the daemon returned a network without an ID".to_string()
        )));
    }
    state.internal = spec.internal;
    if state.options.is_empty() {
        state.options = spec.options.clone();
    }
    info!("Created network {} ({})", state.name, state.id);
    Ok(state)
}

async fn inspect(client: &dyn DockerClient, id: &str) -> Result<Option<NetworkState>> {
    match client.inspect_network(id).await {
        Ok(network) => Ok(Some(state_of(network))),
        Err(e) if client::is_not_found(&e) => Ok(None),
        Err(e) => Err(docker_err(e)).context("Unable to inspect network"),
    }
}

/// Looks up network `id`.
///
/// ## Returns
///
/// `None` when the daemon no longer knows the network.
#[instrument(skip_all, fields(network = %id))]
pub async fn read(provider: &Provider, spec: &NetworkSpec, id: &str) -> Result<Option<NetworkState>> {
    let client = provider.client(&spec.connection).await?;
    inspect(client.as_ref(), id).await
}

/// Removes network `id`. A network that is already gone counts as removed.
#[instrument(skip_all, fields(network = %id))]
pub async fn delete(provider: &Provider, spec: &NetworkSpec, id: &str) -> Result<()> {
    let client = provider.client(&spec.connection).await?;
    match client.remove_network(id).await {
        Ok(()) => {
            info!("Removed network {}", id);
            Ok(())
        }
        Err(e) if client::is_not_found(&e) => {
            warn!("Network {} was already gone", id);
            Ok(())
        }
        Err(e) => Err(docker_err(e)).with_context(|| format!("Error deleting network {}", id)),
    }
}

/// Reports whether network `id` exists.
///
/// ## Returns
///
/// `false` without contacting any daemon when the connection is deferred.
#[instrument(skip_all, fields(network = %id))]
pub async fn exists(provider: &Provider, spec: &NetworkSpec, id: &str) -> Result<bool> {
    match provider.client_if_ready(&spec.connection).await? {
        Some(client) => Ok(inspect(client.as_ref(), id).await?.is_some()),
        None => Ok(false),
    }
}
