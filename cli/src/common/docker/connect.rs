//! # dockrs Connection Resolver
//!
//! File: cli/src/common/docker/connect.rs
//!
//! ## Overview
//!
//! Turns the layered connection settings into one **resolved connection**: the
//! daemon endpoint, the logical host identity and (optionally) a complete set of
//! TLS material, all as plain immutable values.
//!
//! Every reconciler operation calls `resolve` with the provider-wide base
//! configuration and the resource's own `[connection]` overrides. The base is
//! never mutated; a fresh `ResolvedConnection` is produced per call, so
//! concurrent operations can share the base without synchronization.
//!
//! ## Architecture
//!
//! - **Merge**: resource override > base provider field > missing.
//! - **Deferred vs fatal**: a missing endpoint or host identity means the provider
//!   is not configured yet (`Resolution::Deferred`) unless the resource supplied
//!   overrides, in which case the configuration is simply wrong (hard error).
//! - **TLS material**, per credential (CA, cert, key): inline PEM > explicit file >
//!   `{cert_path}/{machine_name}/{ca,cert,key}.pem`. The conventional directory must
//!   be stat-able once it is needed; a missing file inside it is skipped.
//! - **All-or-none**: one or two resolved credentials is an
//!   `IncompleteTls` error.
//!
//! Only local file reads happen here. Opening the daemon connection is the job of
//! `client::Connector`.
//!
use crate::core::config::{self, ConnectionConfig};
use crate::core::error::{DockrsError, Result};
use anyhow::{anyhow, Context};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, instrument};

/// Per-resource connection overrides (the `[connection]` table of a manifest).
#[derive(Deserialize, Serialize, Default, Clone, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ConnectionOverrides {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub machine_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cert_path: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ca_material: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cert_material: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_material: Option<String>,
}

impl ConnectionOverrides {
    /// True when the resource did not override anything.
    pub fn is_empty(&self) -> bool {
        self.host.is_none()
            && self.machine_name.is_none()
            && self.cert_path.is_none()
            && self.ca_material.is_none()
            && self.cert_material.is_none()
            && self.key_material.is_none()
    }
}

impl fmt::Debug for ConnectionOverrides {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionOverrides")
            .field("host", &self.host)
            .field("machine_name", &self.machine_name)
            .field("cert_path", &self.cert_path)
            .field("ca_material", &self.ca_material.as_ref().map(|_| "<set>"))
            .field("cert_material", &self.cert_material.as_ref().map(|_| "<set>"))
            .field("key_material", &self.key_material.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Complete mutual-TLS material, PEM bytes.
#[derive(Clone, PartialEq, Eq)]
pub struct TlsMaterial {
    pub ca: Vec<u8>,
    pub cert: Vec<u8>,
    pub key: Vec<u8>,
}

impl fmt::Debug for TlsMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TlsMaterial")
            .field("ca", &format_args!("<{} bytes>", self.ca.len()))
            .field("cert", &format_args!("<{} bytes>", self.cert.len()))
            .field("key", &"<redacted>")
            .finish()
    }
}

/// A merged, ready-to-use endpoint plus credentials.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedConnection {
    pub host: String,
    pub machine_name: String,
    pub tls: Option<TlsMaterial>,
    pub ping: bool,
}

/// Outcome of a successful resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Ready(ResolvedConnection),
    /// Not enough configuration yet; the caller should not act.
    Deferred { reason: String },
}

#[derive(Debug, Clone, Copy)]
enum Credential {
    Ca,
    Cert,
    Key,
}

impl Credential {
    fn file_name(self) -> &'static str {
        match self {
            Credential::Ca => "ca.pem",
            Credential::Cert => "cert.pem",
            Credential::Key => "key.pem",
        }
    }

    fn describe(self) -> &'static str {
        match self {
            Credential::Ca => "CA certificate",
            Credential::Cert => "client certificate",
            Credential::Key => "client key",
        }
    }
}

/// Merges `overrides` over `base` and loads TLS material.
///
/// # Errors
///
/// - `DockrsError::Config` when overrides are present but the merged endpoint or
///   host identity is still missing, when the endpoint is malformed, or when a
///   certificate directory / explicit file cannot be read.
/// - `DockrsError::IncompleteTls` when only some of CA, cert and key resolve.
#[instrument(skip_all)]
pub fn resolve(base: &ConnectionConfig, overrides: &ConnectionOverrides) -> Result<Resolution> {
    let host = non_empty(overrides.host.as_deref()).or(non_empty(base.host.as_deref()));
    let machine_name =
        non_empty(overrides.machine_name.as_deref()).or(non_empty(base.machine_name.as_deref()));

    let (host, machine_name) = match (host, machine_name) {
        (Some(host), Some(machine)) => (host.to_string(), machine.to_string()),
        (host, _) => {
            let missing = if host.is_none() {
                "daemon host"
            } else {
                "host identity (machine_name)"
            };
            if overrides.is_empty() {
                debug!("Connection resolution deferred: {} not configured", missing);
                return Ok(Resolution::Deferred {
                    reason: format!("{} is not configured", missing),
                });
            }
            return Err(anyhow!(DockrsError::Config(format!(
                "resource connection overrides leave the {} unset",
                missing
            ))));
        }
    };
    config::validate_host(&host)?;

    let cert_dir = overrides
        .cert_path
        .as_ref()
        .or(base.cert_path.as_ref())
        .map(|root| config::expand_path(root).join(&machine_name));

    let mut loader = MaterialLoader {
        cert_dir: cert_dir.as_deref(),
        cert_dir_checked: false,
    };
    let ca = loader.load(
        Credential::Ca,
        overrides.ca_material.as_ref().or(base.ca_material.as_ref()),
        base.ca_file.as_deref(),
    )?;
    let cert = loader.load(
        Credential::Cert,
        overrides
            .cert_material
            .as_ref()
            .or(base.cert_material.as_ref()),
        base.cert_file.as_deref(),
    )?;
    let key = loader.load(
        Credential::Key,
        overrides.key_material.as_ref().or(base.key_material.as_ref()),
        base.key_file.as_deref(),
    )?;

    let tls = match (ca, cert, key) {
        (None, None, None) => None,
        (Some(ca), Some(cert), Some(key)) => Some(TlsMaterial { ca, cert, key }),
        (ca, cert, key) => {
            let missing: Vec<&str> = [
                (ca.is_none(), Credential::Ca),
                (cert.is_none(), Credential::Cert),
                (key.is_none(), Credential::Key),
            ]
            .iter()
            .filter(|(absent, _)| *absent)
            .map(|(_, credential)| credential.describe())
            .collect();
            return Err(anyhow!(DockrsError::IncompleteTls {
                missing: missing.join(", "),
            }));
        }
    };

    debug!(
        "Resolved connection to '{}' (machine '{}', tls: {})",
        host,
        machine_name,
        tls.is_some()
    );
    Ok(Resolution::Ready(ResolvedConnection {
        host,
        machine_name,
        tls,
        ping: base.ping.unwrap_or(false),
    }))
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.trim().is_empty())
}

struct MaterialLoader<'a> {
    cert_dir: Option<&'a Path>,
    cert_dir_checked: bool,
}

impl MaterialLoader<'_> {
    fn load(
        &mut self,
        credential: Credential,
        inline: Option<&String>,
        file: Option<&Path>,
    ) -> Result<Option<Vec<u8>>> {
        if let Some(material) = inline.filter(|m| !m.is_empty()) {
            return Ok(Some(material.as_bytes().to_vec()));
        }
        if let Some(file) = file {
            let file = config::expand_path(file);
            let bytes = fs::read(&file).map_err(|e| {
                anyhow!(DockrsError::Config(format!(
                    "cannot read {} file '{}': {}",
                    credential.describe(),
                    file.display(),
                    e
                )))
            })?;
            return Ok(Some(bytes).filter(|b| !b.is_empty()));
        }
        let Some(dir) = self.cert_dir else {
            return Ok(None);
        };
        if !self.cert_dir_checked {
            fs::metadata(dir)
                .map_err(|e| {
                    anyhow!(DockrsError::Config(format!(
                        "cannot stat certificate directory '{}': {}",
                        dir.display(),
                        e
                    )))
                })
                .context("Failed to resolve TLS material")?;
            self.cert_dir_checked = true;
        }
        let path = dir.join(credential.file_name());
        match fs::read(&path) {
            Ok(bytes) => Ok(Some(bytes).filter(|b| !b.is_empty())),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("No {} at '{}'", credential.describe(), path.display());
                Ok(None)
            }
            Err(e) => Err(anyhow!(DockrsError::FileSystem(format!(
                "cannot read '{}': {}",
                path.display(),
                e
            )))),
        }
    }
}
