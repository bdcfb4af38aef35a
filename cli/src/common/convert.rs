//! # dockrs Config Translation Helpers (`common::convert`)
//!
//! File: cli/src/common/convert.rs
//!
//! ## Overview
//!
//! Pure conversions from the flat declarative fields of a resource spec to the
//! structured request shapes `bollard` expects. Nothing here talks to the daemon,
//! so every function is unit-tested directly.
//!
//! - ports → exposed-port set + host port bindings
//! - volume entries → anonymous volumes, `source:target:mode` binds, `volumes_from`
//! - extra hosts → `host:ip` entries
//! - soft/hard ulimit maps → one merged ulimit list
//! - registry auth entries → registry → credentials map
//! - IPAM blocks → `IpamConfig` list
//! - megabytes → bytes for memory limits
//!
use crate::common::elements::{HostEntry, IpamBlock, PortMapping, RegistryAuth, VolumeMount};
use crate::common::hash::StableSet;
use crate::core::error::{DockrsError, Result};
use anyhow::anyhow;
use bollard::auth::DockerCredentials;
use bollard::models::{
    HostConfigLogConfig, IpamConfig, PortBinding, RestartPolicy, RestartPolicyNameEnum,
};
use std::collections::{BTreeMap, HashMap};

/// Exposed ports keyed `port/protocol`, as in the container config.
pub type ExposedPorts = HashMap<String, HashMap<(), ()>>;
/// Host bindings keyed `port/protocol`, as in the host config.
pub type PortBindings = HashMap<String, Option<Vec<PortBinding>>>;

/// Splits port mappings into exposed ports and host bindings.
///
/// Every mapping exposes `internal/protocol`; only mappings with an `external`
/// port also get a binding (on `ip` when set, all interfaces otherwise).
pub fn port_bindings(ports: &StableSet<PortMapping>) -> (ExposedPorts, PortBindings) {
    let mut exposed = ExposedPorts::new();
    let mut bindings = PortBindings::new();
    for port in ports {
        let key = format!("{}/{}", port.internal, port.protocol);
        exposed.insert(key.clone(), HashMap::new());
        if let Some(external) = port.external {
            bindings
                .entry(key)
                .or_default()
                .get_or_insert_with(Vec::new)
                .push(PortBinding {
                    host_ip: port.ip.clone(),
                    host_port: Some(external.to_string()),
                });
        }
    }
    (exposed, bindings)
}

/// Mount request derived from the volume entries of a container spec.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct MountPlan {
    /// Anonymous volumes keyed by container path.
    pub volumes: HashMap<String, HashMap<(), ()>>,
    /// `source:container_path:rw|ro` binds.
    pub binds: Vec<String>,
    pub volumes_from: Vec<String>,
}

/// Classifies volume entries into anonymous volumes, binds and `volumes_from`.
///
/// A named volume takes precedence over a host path as bind source. An entry
/// must name exactly one of a container path and a source container.
pub fn volume_mounts(volumes: &StableSet<VolumeMount>) -> Result<MountPlan> {
    let mut plan = MountPlan::default();
    for volume in volumes {
        let container_path = volume.container_path.as_deref().filter(|p| !p.is_empty());
        let source = volume
            .volume_name
            .as_deref()
            .filter(|s| !s.is_empty())
            .or(volume.host_path.as_deref().filter(|s| !s.is_empty()));
        match (volume.from_container.as_deref().filter(|c| !c.is_empty()), container_path) {
            (Some(_), Some(_)) => {
                return Err(anyhow!(DockrsError::Validation(
                    "Both a container and a path specified in a volume entry".to_string()
                )));
            }
            (Some(from), None) => plan.volumes_from.push(from.to_string()),
            (None, None) => {
                return Err(anyhow!(DockrsError::Validation(
                    "Volume entry without container path or source container".to_string()
                )));
            }
            (None, Some(path)) => match source {
                Some(source) => {
                    let mode = if volume.read_only { "ro" } else { "rw" };
                    plan.binds.push(format!("{}:{}:{}", source, path, mode));
                }
                None => {
                    plan.volumes.insert(path.to_string(), HashMap::new());
                }
            },
        }
    }
    Ok(plan)
}

/// `host:ip` entries for `/etc/hosts`.
pub fn extra_hosts(hosts: &StableSet<HostEntry>) -> Vec<String> {
    hosts
        .iter()
        .map(|entry| format!("{}:{}", entry.host, entry.ip))
        .collect()
}

/// One ulimit record of a build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ulimit {
    pub name: String,
    pub soft: i64,
    pub hard: i64,
}

/// Merges independently declared soft and hard limits by name.
///
/// A name present on only one side gets `0` on the other.
pub fn merge_ulimits(soft: &BTreeMap<String, i64>, hard: &BTreeMap<String, i64>) -> Vec<Ulimit> {
    let mut merged: BTreeMap<&str, Ulimit> = BTreeMap::new();
    for (name, value) in soft {
        merged
            .entry(name)
            .or_insert_with(|| Ulimit {
                name: name.clone(),
                soft: 0,
                hard: 0,
            })
            .soft = *value;
    }
    for (name, value) in hard {
        merged
            .entry(name)
            .or_insert_with(|| Ulimit {
                name: name.clone(),
                soft: 0,
                hard: 0,
            })
            .hard = *value;
    }
    merged.into_values().collect()
}

/// Copies an ordered map into the `HashMap` shape bollard requests use.
pub fn to_hash_map(map: &BTreeMap<String, String>) -> HashMap<String, String> {
    map.iter().map(|(k, v)| (k.clone(), v.clone())).collect()
}

/// Registry → credentials map. Later entries for the same registry win.
pub fn auth_map(entries: &[RegistryAuth]) -> HashMap<String, DockerCredentials> {
    entries
        .iter()
        .map(|entry| {
            (
                entry.registry.clone(),
                DockerCredentials {
                    username: Some(entry.username.clone()),
                    password: entry.password.clone(),
                    serveraddress: Some(entry.registry.clone()),
                    ..Default::default()
                },
            )
        })
        .collect()
}

/// Maps IPAM blocks to the daemon's request shape, in canonical set order.
///
/// ## Returns
///
/// One `IpamConfig` per block. Unset fields stay `None`, and an empty
/// auxiliary-address map is sent as `None` rather than `{}`.
pub fn ipam_configs(blocks: &StableSet<IpamBlock>) -> Vec<IpamConfig> {
    blocks
        .iter()
        .map(|block| IpamConfig {
            subnet: block.subnet.clone(),
            ip_range: block.ip_range.clone(),
            gateway: block.gateway.clone(),
            auxiliary_addresses: if block.aux_address.is_empty() {
                None
            } else {
                Some(to_hash_map(&block.aux_address))
            },
        })
        .collect()
}

const MIB: i64 = 1024 * 1024;

/// Megabytes to bytes.
pub fn mebibytes(megabytes: i64) -> i64 {
    megabytes.saturating_mul(MIB)
}

/// Swap limit in bytes; `-1` (unlimited) and `0` (unset) pass through.
pub fn memory_swap_bytes(megabytes: i64) -> i64 {
    if megabytes > 0 {
        mebibytes(megabytes)
    } else {
        megabytes
    }
}

/// Restart policy from its mode name (`no`, `on-failure`, `always`, `unless-stopped`).
pub fn restart_policy(mode: &str, max_retry_count: i64) -> RestartPolicy {
    let name = match mode {
        "always" => RestartPolicyNameEnum::ALWAYS,
        "unless-stopped" => RestartPolicyNameEnum::UNLESS_STOPPED,
        "on-failure" => RestartPolicyNameEnum::ON_FAILURE,
        _ => RestartPolicyNameEnum::NO,
    };
    RestartPolicy {
        name: Some(name),
        maximum_retry_count: (mode == "on-failure").then_some(max_retry_count),
    }
}

/// Log driver plus its options; no options means `config` is left unset.
pub fn log_config(driver: &str, options: &BTreeMap<String, String>) -> HostConfigLogConfig {
    HostConfigLogConfig {
        typ: Some(driver.to_string()),
        config: if options.is_empty() {
            None
        } else {
            Some(to_hash_map(options))
        },
    }
}
