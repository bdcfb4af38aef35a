//! # dockrs Reconcilers (`resources`)
//!
//! File: cli/src/resources/mod.rs
//!
//! ## Overview
//!
//! One module per managed resource kind, each exposing the same verbs as free
//! async functions taking a `&Provider`:
//!
//! - **`image`**: pull / load / build, optional push, pinned retention.
//! - **`container`**: create + start, convergence wait, scan-based read.
//! - **`network`**: user-defined networks with IPAM configuration.
//! - **`volume`**: named or daemon-named volumes.
//!
//! `read` returns `Ok(None)` when the resource is gone: the caller should
//! forget its identity. `exists` reports `false` instead of an error when the
//! provider is not configured enough to connect yet.
//!
//! ## Provider
//!
//! `Provider` is the long-lived, read-only context shared by all operations:
//! the base connection configuration, the `Connector` used to open clients and
//! the convergence policy. It holds no per-resource state, so one provider can
//! serve concurrent operations on different resources.
//!
use crate::common::docker::client::{BollardConnector, Connector, DockerClient};
use crate::common::docker::connect::{self, ConnectionOverrides, Resolution};
use crate::core::config::{Config, ConnectionConfig, ConvergenceConfig};
use crate::core::error::{DockrsError, Result};
use anyhow::anyhow;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

pub mod container;
pub mod image;
pub mod network;
pub mod volume;

/// Bounded polling applied to freshly created containers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConvergencePolicy {
    pub attempts: u32,
    pub interval: Duration,
}

impl Default for ConvergencePolicy {
    fn default() -> Self {
        ConvergencePolicy {
            attempts: 30,
            interval: Duration::from_millis(500),
        }
    }
}

impl From<&ConvergenceConfig> for ConvergencePolicy {
    fn from(config: &ConvergenceConfig) -> Self {
        ConvergencePolicy {
            attempts: config.attempts.max(1),
            interval: Duration::from_millis(config.interval_ms),
        }
    }
}

/// Shared, read-only context of every reconciler operation.
#[derive(Clone)]
pub struct Provider {
    base: ConnectionConfig,
    connector: Arc<dyn Connector>,
    convergence: ConvergencePolicy,
}

impl std::fmt::Debug for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Provider")
            .field("base", &self.base)
            .field("convergence", &self.convergence)
            .finish_non_exhaustive()
    }
}

impl Provider {
    /// Provider with the default convergence policy.
    pub fn new(base: ConnectionConfig, connector: Arc<dyn Connector>) -> Self {
        Provider {
            base,
            connector,
            convergence: ConvergencePolicy::default(),
        }
    }

    /// Provider talking to real daemons through `bollard`.
    pub fn from_config(config: &Config) -> Self {
        Provider::new(config.provider.clone(), Arc::new(BollardConnector))
            .with_convergence((&config.convergence).into())
    }

    pub fn with_convergence(mut self, convergence: ConvergencePolicy) -> Self {
        self.convergence = convergence;
        self
    }

    pub fn convergence(&self) -> ConvergencePolicy {
        self.convergence
    }

    pub fn base(&self) -> &ConnectionConfig {
        &self.base
    }

    /// Opens a client for a resource; a deferred resolution is an error here.
    pub async fn client(&self, overrides: &ConnectionOverrides) -> Result<Arc<dyn DockerClient>> {
        match self.client_if_ready(overrides).await? {
            Some(client) => Ok(client),
            None => Err(anyhow!(DockrsError::Deferred(
                "the Docker connection cannot be resolved yet".to_string()
            ))),
        }
    }

    /// Opens a client for a resource, or `None` when resolution is deferred.
    pub async fn client_if_ready(
        &self,
        overrides: &ConnectionOverrides,
    ) -> Result<Option<Arc<dyn DockerClient>>> {
        match connect::resolve(&self.base, overrides)? {
            Resolution::Ready(connection) => Ok(Some(self.connector.connect(&connection).await?)),
            Resolution::Deferred { reason } => {
                debug!("Connection deferred: {}", reason);
                Ok(None)
            }
        }
    }
}

/// Wraps a raw daemon error into the crate error type.
pub(crate) fn docker_err(source: bollard::errors::Error) -> anyhow::Error {
    anyhow!(DockrsError::DockerApi { source })
}
