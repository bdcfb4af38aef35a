//! # dockrs Container Reconciler (`resources::container`)
//!
//! File: cli/src/resources/container.rs
//!
//! ## Overview
//!
//! Realizes a container from a local image plus its configuration surface
//! (ports, volumes, networks, capabilities, env, logging, restart policy),
//! starts it and waits until the daemon reports a steady state.
//!
//! ## Create
//!
//! 1. Pre-flight validation (`ContainerSpec::validate`).
//! 2. Resolve the image reference against a freshly listed `ImageIndex`; a bare
//!    name is retried once as `name:latest`.
//! 3. Create the container. From here on the container has an ID: later failures
//!    (network attach, upload, start) are reported as
//!    `DockrsError::PartiallyCreated` and the container is left in place.
//! 4. Connect every declared network, upload declared files, record the creation
//!    instant and start.
//! 5. Converge (see below) with the full attempt budget.
//!
//! ## Convergence
//!
//! The container is inspected up to `attempts` times, `interval` apart. The
//! loop ends early when the container runs, or when it is stopped and not
//! required to run. With a creation instant (a fresh create):
//! - finished after the creation instant: it died right away; remove it and fail
//!   with the daemon's error text;
//! - still not running after the last attempt while `must_run`: remove it and fail.
//!
//! Without a creation instant (a plain read) there is one attempt, and a
//! required-but-stopped container is removed and reported as gone.
//!
//! The creation instant is a value passed from `create` into the convergence
//! call; nothing is shared between operations.
//!
use crate::common::archive::tar::single_file_tar;
use crate::common::convert;
use crate::common::docker::client::{self, DockerClient};
use crate::common::docker::connect::ConnectionOverrides;
pub use crate::common::elements::{
    Capabilities, FileUpload, HostEntry, NetworkAttachment, PortMapping, VolumeMount,
};
use crate::common::hash::StableSet;
use crate::core::error::{DockrsError, Result};
use crate::resources::{docker_err, ConvergencePolicy, Provider};
use anyhow::{anyhow, Context};
use bollard::container::Config as ContainerConfig;
use bollard::models::{ContainerInspectResponse, HostConfig, ImageSummary};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tracing::{debug, error, info, instrument, warn};

const RESTART_POLICIES: [&str; 4] = ["no", "on-failure", "always", "unless-stopped"];
const LOG_DRIVERS: [&str; 5] = ["json-file", "syslog", "journald", "gelf", "fluentd"];
const PROTOCOLS: [&str; 3] = ["tcp", "udp", "sctp"];

// --- Spec and state ---

/// Declarative container resource.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ContainerSpec {
    #[serde(default)]
    pub connection: ConnectionOverrides,
    pub name: String,
    pub image: String,
    pub hostname: Option<String>,
    pub domainname: Option<String>,
    #[serde(default)]
    pub command: Vec<String>,
    #[serde(default)]
    pub entrypoint: Vec<String>,
    pub user: Option<String>,
    #[serde(default)]
    pub env: BTreeSet<String>,
    #[serde(default)]
    pub links: BTreeSet<String>,
    #[serde(default)]
    pub dns: BTreeSet<String>,
    #[serde(default)]
    pub dns_opts: BTreeSet<String>,
    #[serde(default)]
    pub dns_search: BTreeSet<String>,
    #[serde(default)]
    pub ports: StableSet<PortMapping>,
    #[serde(default)]
    pub volumes: StableSet<VolumeMount>,
    #[serde(default)]
    pub extra_hosts: StableSet<HostEntry>,
    pub capabilities: Option<Capabilities>,
    #[serde(default)]
    pub networks: StableSet<NetworkAttachment>,
    #[serde(default)]
    pub network_alias: BTreeSet<String>,
    pub network_mode: Option<String>,
    #[serde(default)]
    pub uploads: StableSet<FileUpload>,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    #[serde(default)]
    pub privileged: bool,
    #[serde(default)]
    pub publish_all_ports: bool,
    #[serde(default = "default_restart")]
    pub restart: String,
    #[serde(default)]
    pub max_retry_count: i64,
    /// MiB.
    #[serde(default)]
    pub memory: i64,
    /// MiB; `-1` for unlimited swap.
    #[serde(default)]
    pub memory_swap: i64,
    #[serde(default)]
    pub cpu_shares: i64,
    #[serde(default = "default_log_driver")]
    pub log_driver: String,
    #[serde(default)]
    pub log_opts: BTreeMap<String, String>,
    /// Stop with this timeout before removal when positive.
    #[serde(default)]
    pub destroy_grace_seconds: i64,
    #[serde(default = "default_must_run")]
    pub must_run: bool,
}

fn default_restart() -> String {
    "no".to_string()
}
fn default_log_driver() -> String {
    "json-file".to_string()
}
fn default_must_run() -> bool {
    true
}

/// Observed container.
#[derive(Serialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct ContainerState {
    pub id: String,
    pub name: String,
    pub ip_address: Option<String>,
    pub ip_prefix_length: Option<i64>,
    pub gateway: Option<String>,
    pub bridge: Option<String>,
}

impl ContainerSpec {
    /// Spec with defaults for everything but name and image.
    pub fn new(name: &str, image: &str) -> Self {
        ContainerSpec {
            connection: ConnectionOverrides::default(),
            name: name.to_string(),
            image: image.to_string(),
            hostname: None,
            domainname: None,
            command: Vec::new(),
            entrypoint: Vec::new(),
            user: None,
            env: BTreeSet::new(),
            links: BTreeSet::new(),
            dns: BTreeSet::new(),
            dns_opts: BTreeSet::new(),
            dns_search: BTreeSet::new(),
            ports: StableSet::new(),
            volumes: StableSet::new(),
            extra_hosts: StableSet::new(),
            capabilities: None,
            networks: StableSet::new(),
            network_alias: BTreeSet::new(),
            network_mode: None,
            uploads: StableSet::new(),
            labels: BTreeMap::new(),
            privileged: false,
            publish_all_ports: false,
            restart: default_restart(),
            max_retry_count: 0,
            memory: 0,
            memory_swap: 0,
            cpu_shares: 0,
            log_driver: default_log_driver(),
            log_opts: BTreeMap::new(),
            destroy_grace_seconds: 0,
            must_run: default_must_run(),
        }
    }

    /// Pre-flight checks, before any daemon call.
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(invalid("container name must not be empty".into()));
        }
        if self.image.trim().is_empty() {
            return Err(invalid("image must not be empty".into()));
        }
        if self.command.iter().any(|c| c.is_empty()) {
            return Err(invalid("values for command may not be empty".into()));
        }
        if !RESTART_POLICIES.contains(&self.restart.as_str()) {
            return Err(invalid(format!(
                "restart must be one of {}, got '{}'",
                RESTART_POLICIES.join(", "),
                self.restart
            )));
        }
        if !LOG_DRIVERS.contains(&self.log_driver.as_str()) {
            return Err(invalid(format!(
                "log_driver must be one of {}, got '{}'",
                LOG_DRIVERS.join(", "),
                self.log_driver
            )));
        }
        for (field, value, minimum) in [
            ("memory", self.memory, 0),
            ("memory_swap", self.memory_swap, -1),
            ("cpu_shares", self.cpu_shares, 0),
            ("max_retry_count", self.max_retry_count, 0),
            ("destroy_grace_seconds", self.destroy_grace_seconds, 0),
        ] {
            if value < minimum {
                return Err(invalid(format!(
                    "{} must be at least {}, got {}",
                    field, minimum, value
                )));
            }
        }
        for port in &self.ports {
            if port.internal == 0 {
                return Err(invalid("internal port must not be 0".into()));
            }
            if !PROTOCOLS.contains(&port.protocol.as_str()) {
                return Err(invalid(format!("unknown port protocol '{}'", port.protocol)));
            }
        }
        for volume in &self.volumes {
            for (field, path) in [
                ("container_path", &volume.container_path),
                ("host_path", &volume.host_path),
            ] {
                if let Some(path) = path {
                    if !is_absolute_path(path) {
                        return Err(invalid(format!(
                            "{} must be an absolute path, got '{}'",
                            field, path
                        )));
                    }
                }
            }
        }
        convert::volume_mounts(&self.volumes)?;
        for upload in &self.uploads {
            if !upload.file.starts_with('/') {
                return Err(invalid(format!(
                    "upload destination must be an absolute path, got '{}'",
                    upload.file
                )));
            }
        }
        Ok(())
    }

    /// Aliases for a network attachment.
    fn aliases_for(&self, attachment: &NetworkAttachment) -> Vec<String> {
        let aliases = if attachment.aliases.is_empty() {
            &self.network_alias
        } else {
            &attachment.aliases
        };
        aliases.iter().cloned().collect()
    }
}

fn invalid(message: String) -> anyhow::Error {
    anyhow!(DockrsError::Validation(message))
}

/// `/unix/path` or `C:\windows\path`.
fn is_absolute_path(path: &str) -> bool {
    let bytes = path.as_bytes();
    path.starts_with('/')
        || (bytes.len() >= 3
            && bytes[0].is_ascii_alphabetic()
            && bytes[1] == b':'
            && bytes[2] == b'\\')
}

// --- Image lookup ---

/// Local images addressable by full ID (primary) or by an alias: the bare
/// hex digest, its 12-character short form and every repo tag.
#[derive(Debug, Default)]
pub struct ImageIndex {
    primary: BTreeSet<String>,
    aliases: HashMap<String, String>,
}

impl ImageIndex {
    /// Indexes every local image by full ID, bare hex, short ID and repo tag.
    pub fn from_summaries(images: &[ImageSummary]) -> Self {
        let mut index = ImageIndex::default();
        for image in images {
            let id = image.id.clone();
            let hex = id.strip_prefix("sha256:").unwrap_or(&id).to_string();
            if let Some(short) = hex.get(..12) {
                index.aliases.insert(short.to_string(), id.clone());
            }
            index.aliases.insert(hex, id.clone());
            for tag in &image.repo_tags {
                index.aliases.insert(tag.clone(), id.clone());
            }
            index.primary.insert(id);
        }
        index
    }

    /// Full ID for a reference, if known.
    pub fn lookup(&self, reference: &str) -> Option<&str> {
        if let Some(id) = self.primary.get(reference) {
            return Some(id);
        }
        self.aliases.get(reference).map(String::as_str)
    }

    /// The reference to hand to the daemon: `reference` itself, or
    /// `reference:latest` when only that form is known.
    pub fn resolve(&self, reference: &str) -> Option<String> {
        if self.lookup(reference).is_some() {
            return Some(reference.to_string());
        }
        let with_latest = format!("{}:latest", reference);
        if !has_tag(reference) && self.lookup(&with_latest).is_some() {
            return Some(with_latest);
        }
        None
    }
}

fn has_tag(reference: &str) -> bool {
    let last_segment = reference.rsplit('/').next().unwrap_or(reference);
    last_segment.contains(':') || reference.contains('@')
}

// --- Request translation ---

fn container_config(spec: &ContainerSpec, image: &str) -> Result<ContainerConfig<String>> {
    let (exposed_ports, port_bindings) = convert::port_bindings(&spec.ports);
    let mounts = convert::volume_mounts(&spec.volumes)?;
    let extra_hosts = convert::extra_hosts(&spec.extra_hosts);
    let non_empty = |v: Vec<String>| if v.is_empty() { None } else { Some(v) };
    let set = |s: &BTreeSet<String>| non_empty(s.iter().cloned().collect());

    let host_config = HostConfig {
        privileged: Some(spec.privileged),
        publish_all_ports: Some(spec.publish_all_ports),
        restart_policy: Some(convert::restart_policy(&spec.restart, spec.max_retry_count)),
        log_config: Some(convert::log_config(&spec.log_driver, &spec.log_opts)),
        port_bindings: (!port_bindings.is_empty()).then_some(port_bindings),
        extra_hosts: non_empty(extra_hosts),
        binds: non_empty(mounts.binds),
        volumes_from: non_empty(mounts.volumes_from),
        cap_add: spec.capabilities.as_ref().and_then(|c| set(&c.add)),
        cap_drop: spec.capabilities.as_ref().and_then(|c| set(&c.drop)),
        dns: set(&spec.dns),
        dns_options: set(&spec.dns_opts),
        dns_search: set(&spec.dns_search),
        links: set(&spec.links),
        memory: (spec.memory > 0).then(|| convert::mebibytes(spec.memory)),
        memory_swap: (spec.memory_swap != 0).then(|| convert::memory_swap_bytes(spec.memory_swap)),
        cpu_shares: (spec.cpu_shares > 0).then_some(spec.cpu_shares),
        network_mode: spec.network_mode.clone(),
        ..Default::default()
    };

    Ok(ContainerConfig {
        image: Some(image.to_string()),
        hostname: spec.hostname.clone(),
        domainname: spec.domainname.clone(),
        user: spec.user.clone(),
        env: set(&spec.env),
        cmd: non_empty(spec.command.clone()),
        entrypoint: non_empty(spec.entrypoint.clone()),
        exposed_ports: (!exposed_ports.is_empty()).then_some(exposed_ports),
        volumes: (!mounts.volumes.is_empty()).then_some(mounts.volumes),
        labels: (!spec.labels.is_empty()).then(|| convert::to_hash_map(&spec.labels)),
        host_config: Some(host_config),
        ..Default::default()
    })
}

// --- Operations ---

/// Creates, starts and converges the container.
#[instrument(skip_all, fields(container = %spec.name))]
pub async fn create(provider: &Provider, spec: &ContainerSpec) -> Result<ContainerState> {
    spec.validate()?;
    let client = provider.client(&spec.connection).await?;

    let images = client
        .list_images()
        .await
        .map_err(docker_err)
        .context("Failed to list local images")?;
    let index = ImageIndex::from_summaries(&images);
    let image = index.resolve(&spec.image).ok_or_else(|| {
        anyhow!(DockrsError::ImageNotFound {
            name: spec.image.clone()
        })
    })?;
    debug!("Image '{}' resolved to '{}'", spec.image, image);

    let config = container_config(spec, &image)?;
    let created = client
        .create_container(&spec.name, config)
        .await
        .map_err(docker_err)
        .with_context(|| format!("Unable to create container '{}'", spec.name))?;
    let id = created.id;
    for warning in &created.warnings {
        warn!("Daemon warning for container {}: {}", spec.name, warning);
    }
    info!("Created container {} ({})", spec.name, id);

    let created_at = set_up_and_start(client.as_ref(), spec, &id)
        .await
        .map_err(|e| {
            error!("Container {} was created but setup failed: {:#}", id, e);
            anyhow!(DockrsError::PartiallyCreated {
                id: id.clone(),
                reason: format!("{:#}", e),
            })
        })?;

    converge(
        client.as_ref(),
        spec,
        &id,
        Some(created_at),
        provider.convergence(),
    )
    .await?
    .ok_or_else(|| anyhow!(DockrsError::FailedToRun { id }))
}

/// Network attach, uploads and start. Returns the creation instant.
async fn set_up_and_start(
    client: &dyn DockerClient,
    spec: &ContainerSpec,
    id: &str,
) -> Result<DateTime<Utc>> {
    for attachment in &spec.networks {
        let aliases = spec.aliases_for(attachment);
        debug!("Connecting {} to network {} as {:?}", id, attachment.name, aliases);
        client
            .connect_network(&attachment.name, id, aliases)
            .await
            .map_err(docker_err)
            .with_context(|| format!("Unable to connect to network '{}'", attachment.name))?;
    }

    for upload in &spec.uploads {
        let archive = single_file_tar(&upload.file, upload.content.as_bytes())?;
        client
            .upload_archive(id, "/", archive)
            .await
            .map_err(docker_err)
            .with_context(|| format!("Unable to upload '{}'", upload.file))?;
    }

    let created_at = Utc::now();
    client
        .start_container(id)
        .await
        .map_err(docker_err)
        .context("Unable to start container")?;
    info!("Started container {}", id);
    Ok(created_at)
}

fn is_running(inspect: &ContainerInspectResponse) -> bool {
    inspect
        .state
        .as_ref()
        .and_then(|s| s.running)
        .unwrap_or(false)
}

fn finished_after(inspect: &ContainerInspectResponse, instant: DateTime<Utc>) -> bool {
    inspect
        .state
        .as_ref()
        .and_then(|s| s.finished_at.as_deref())
        .and_then(|t| DateTime::parse_from_rfc3339(t).ok())
        .map(|t| t.with_timezone(&Utc) > instant)
        .unwrap_or(false)
}

/// Polls until the container is in an acceptable state.
///
/// `created_at` is `Some` only right after this process started the container.
async fn converge(
    client: &dyn DockerClient,
    spec: &ContainerSpec,
    id: &str,
    created_at: Option<DateTime<Utc>>,
    policy: ConvergencePolicy,
) -> Result<Option<ContainerState>> {
    let attempts = match created_at {
        Some(_) => policy.attempts.max(1),
        None => 1,
    };
    let mut observed = None;
    for attempt in 1..=attempts {
        let inspect = client
            .inspect_container(id)
            .await
            .map_err(docker_err)
            .with_context(|| format!("Error inspecting container {}", id))?;
        let running = is_running(&inspect);
        if running || !spec.must_run {
            observed = Some(inspect);
            break;
        }

        let Some(created_at) = created_at else {
            info!("Container {} is not running and must run; removing it", id);
            remove(client, spec, id).await?;
            return Ok(None);
        };

        if finished_after(&inspect, created_at) {
            let error = inspect
                .state
                .as_ref()
                .and_then(|s| s.error.clone())
                .unwrap_or_default();
            cleanup(client, spec, id).await;
            return Err(anyhow!(DockrsError::ExitedAfterCreate {
                id: id.to_string(),
                error,
            }));
        }

        debug!("Container {} not running yet (attempt {}/{})", id, attempt, attempts);
        observed = Some(inspect);
        if attempt < attempts {
            tokio::time::sleep(policy.interval).await;
        }
    }

    let inspect = observed.unwrap_or_default();
    if !is_running(&inspect) && spec.must_run {
        cleanup(client, spec, id).await;
        return Err(anyhow!(DockrsError::FailedToRun { id: id.to_string() }));
    }

    let mut state = ContainerState {
        id: id.to_string(),
        name: spec.name.clone(),
        ..Default::default()
    };
    if let Some(net) = inspect.network_settings {
        state.ip_address = net.ip_address.filter(|v| !v.is_empty());
        state.ip_prefix_length = net.ip_prefix_len;
        state.gateway = net.gateway.filter(|v| !v.is_empty());
        state.bridge = net.bridge.filter(|v| !v.is_empty());
    }
    Ok(Some(state))
}

/// Best-effort removal of a container that failed to converge.
async fn cleanup(client: &dyn DockerClient, spec: &ContainerSpec, id: &str) {
    if let Err(e) = remove(client, spec, id).await {
        warn!("Failed to remove unhealthy container {}: {:#}", id, e);
    }
}

/// Optional timed stop, then forced removal with anonymous volumes.
async fn remove(client: &dyn DockerClient, spec: &ContainerSpec, id: &str) -> Result<()> {
    if spec.destroy_grace_seconds > 0 {
        match client.stop_container(id, spec.destroy_grace_seconds).await {
            Ok(()) => debug!("Stopped container {}", id),
            Err(e) if client::is_not_found(&e) || client::is_not_modified(&e) => {
                debug!("Container {} was not running", id)
            }
            Err(e) => {
                return Err(docker_err(e))
                    .with_context(|| format!("Error stopping container {}", id));
            }
        }
    }
    match client.remove_container(id).await {
        Ok(()) => {
            info!("Removed container {}", id);
            Ok(())
        }
        Err(e) if client::is_not_found(&e) => {
            warn!("Container {} was already gone", id);
            Ok(())
        }
        Err(e) => Err(docker_err(e)).with_context(|| format!("Error deleting container {}", id)),
    }
}

async fn find(client: &dyn DockerClient, id: &str) -> Result<bool> {
    let containers = client
        .list_containers()
        .await
        .map_err(docker_err)
        .context("Failed to list containers")?;
    Ok(containers.iter().any(|c| c.id.as_deref() == Some(id)))
}

/// Re-reads the container; `Ok(None)` means it is gone (or was removed for
/// not running while required to).
#[instrument(skip_all, fields(container = %id))]
pub async fn read(provider: &Provider, spec: &ContainerSpec, id: &str) -> Result<Option<ContainerState>> {
    let client = provider.client(&spec.connection).await?;
    if !find(client.as_ref(), id).await? {
        debug!("Container {} no longer exists", id);
        return Ok(None);
    }
    converge(client.as_ref(), spec, id, None, provider.convergence()).await
}

/// Containers are never changed in place; differences need a replacement.
#[instrument(skip_all, fields(container = %id))]
pub async fn update(
    _provider: &Provider,
    previous: &ContainerSpec,
    spec: &ContainerSpec,
    id: &str,
) -> Result<()> {
    if previous != spec {
        warn!("Container {} changed; the change takes effect only after replacement", id);
    }
    Ok(())
}

/// Stops the container (when `destroy_grace_seconds` is set) and removes it
/// together with its anonymous volumes.
///
/// ## Errors
///
/// A failed stop aborts the delete. A container that is already gone is not
/// an error.
#[instrument(skip_all, fields(container = %id))]
pub async fn delete(provider: &Provider, spec: &ContainerSpec, id: &str) -> Result<()> {
    let client = provider.client(&spec.connection).await?;
    remove(client.as_ref(), spec, id).await
}

/// Scans the container list for `id`; `false` while the connection is deferred.
#[instrument(skip_all, fields(container = %id))]
pub async fn exists(provider: &Provider, spec: &ContainerSpec, id: &str) -> Result<bool> {
    let Some(client) = provider.client_if_ready(&spec.connection).await? else {
        return Ok(false);
    };
    find(client.as_ref(), id).await
}

// --- Unit Tests ---
#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::docker::fake::{exited, not_running, running, FakeDocker};
    use crate::common::hash::SetElement;
    use crate::resources::testing::{provider, unconfigured_provider};
    use std::sync::Arc;
    use std::time::Duration;

    const NGINX_ID: &str =
        "sha256:605c77e624ddb75e6110f997c58876baa13f8754486b461117934b24a9dc3a85";

    fn kind(err: &anyhow::Error) -> Option<&DockrsError> {
        err.downcast_ref::<DockrsError>()
    }

    fn with_nginx() -> Arc<FakeDocker> {
        FakeDocker::new().with_image(NGINX_ID, &["nginx:latest"])
    }

    fn web() -> ContainerSpec {
        let mut spec = ContainerSpec::new("web", "nginx");
        spec.ports.insert(PortMapping {
            internal: 80,
            external: Some(8080),
            ip: None,
            protocol: "tcp".into(),
        });
        spec
    }

    #[test]
    fn test_set_fields_ignore_order() {
        let a = PortMapping { internal: 80, external: Some(8080), ip: None, protocol: "tcp".into() };
        let b = PortMapping { internal: 443, external: None, ip: Some("0.0.0.0".into()), protocol: "tcp".into() };
        let c = PortMapping { internal: 53, external: Some(53), ip: None, protocol: "udp".into() };
        let one: StableSet<PortMapping> = vec![a.clone(), b.clone(), c.clone()].into_iter().collect();
        let two: StableSet<PortMapping> = vec![c, a, b].into_iter().collect();
        assert_eq!(one.hashes(), two.hashes());

        let caps_one = Capabilities {
            add: ["NET_ADMIN", "SYS_TIME"].iter().map(|s| s.to_string()).collect(),
            drop: ["MKNOD"].iter().map(|s| s.to_string()).collect(),
        };
        let caps_two = Capabilities {
            add: ["SYS_TIME", "NET_ADMIN"].iter().map(|s| s.to_string()).collect(),
            drop: ["MKNOD"].iter().map(|s| s.to_string()).collect(),
        };
        assert_eq!(caps_one.set_hash(), caps_two.set_hash());

        let mut spec_one = web();
        let mut spec_two = web();
        spec_one.volumes = vec![
            VolumeMount { container_path: Some("/a".into()), ..Default::default() },
            VolumeMount { container_path: Some("/b".into()), host_path: Some("/srv/b".into()), ..Default::default() },
        ]
        .into_iter()
        .collect();
        let mut reversed: Vec<VolumeMount> = spec_one.volumes.iter().cloned().collect();
        reversed.reverse();
        spec_two.volumes = reversed.into_iter().collect();
        assert_eq!(spec_one, spec_two);
    }

    #[test]
    fn test_image_index_aliases() {
        let index = ImageIndex::from_summaries(&[ImageSummary {
            id: NGINX_ID.into(),
            repo_tags: vec!["nginx:latest".into(), "nginx:1.25".into()],
            ..Default::default()
        }]);
        assert_eq!(index.lookup("605c77e624dd"), Some(NGINX_ID));
        assert_eq!(index.lookup(NGINX_ID), Some(NGINX_ID));
        assert_eq!(index.lookup("nginx:1.25"), Some(NGINX_ID));
        assert_eq!(index.resolve("nginx").as_deref(), Some("nginx:latest"));
        assert_eq!(index.resolve("nginx:1.25").as_deref(), Some("nginx:1.25"));
        assert_eq!(index.resolve("nginx:1.24"), None);
        assert_eq!(index.resolve("redis"), None);
    }

    #[test]
    fn test_validation() {
        let mut spec = web();
        spec.command = vec!["nginx".into(), "".into()];
        assert!(spec.validate().is_err());

        let mut spec = web();
        spec.restart = "sometimes".into();
        assert!(spec.validate().is_err());

        let mut spec = web();
        spec.memory_swap = -1;
        assert!(spec.validate().is_ok());
        spec.memory_swap = -2;
        assert!(spec.validate().is_err());

        let mut spec = web();
        spec.volumes.insert(VolumeMount {
            container_path: Some("/data".into()),
            host_path: Some("relative/dir".into()),
            ..Default::default()
        });
        assert!(spec.validate().is_err());

        let mut spec = web();
        spec.volumes.insert(VolumeMount {
            container_path: Some("/data".into()),
            host_path: Some("C:\\data".into()),
            ..Default::default()
        });
        assert!(spec.validate().is_ok());

        let mut spec = web();
        spec.log_driver = "splunk".into();
        assert!(spec.validate().is_err());
    }

    #[test]
    fn test_manifest_defaults() {
        let spec: ContainerSpec = toml::from_str(
            r#"
            name = "web"
            image = "nginx"
            ports = [{ internal = 80, external = 8080 }]
            "#,
        )
        .unwrap();
        assert!(spec.must_run);
        assert_eq!(spec.restart, "no");
        assert_eq!(spec.log_driver, "json-file");
        assert_eq!(spec.ports.iter().next().unwrap().protocol, "tcp");
    }

    #[tokio::test]
    async fn test_create_web_end_to_end() {
        let fake = with_nginx();
        let state = create(&provider(&fake), &web()).await.unwrap();

        assert!(fake.has_container(&state.id));
        assert_eq!(state.name, "web");
        assert_eq!(state.ip_address.as_deref(), Some("172.17.0.2"));
        assert_eq!(state.ip_prefix_length, Some(16));
        assert_eq!(state.gateway.as_deref(), Some("172.17.0.1"));
        assert_eq!(state.bridge.as_deref(), Some("docker0"));

        let config = fake.container_config(&state.id).unwrap();
        assert_eq!(config.image.as_deref(), Some("nginx:latest"));
        assert!(config.exposed_ports.unwrap().contains_key("80/tcp"));
        let bindings = config.host_config.unwrap().port_bindings.unwrap();
        let binding = bindings["80/tcp"].as_ref().unwrap();
        assert_eq!(binding[0].host_port.as_deref(), Some("8080"));
        assert_eq!(fake.count("inspect_container"), 1);
    }

    #[tokio::test]
    async fn test_unknown_image_fails_before_create() {
        let fake = with_nginx();
        let spec = ContainerSpec::new("cache", "redis");
        let err = create(&provider(&fake), &spec).await.unwrap_err();
        assert!(matches!(kind(&err), Some(DockrsError::ImageNotFound { .. })));
        assert_eq!(fake.count("create_container"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_waits_until_running() {
        let fake = with_nginx();
        fake.script_inspections(vec![not_running(), not_running(), not_running(), running()]);
        let interval = Duration::from_millis(500);
        let started = tokio::time::Instant::now();

        let state = create(&provider(&fake), &web()).await.unwrap();

        assert!(state.ip_address.is_some());
        assert_eq!(fake.count("inspect_container"), 4);
        assert!(started.elapsed() <= interval * 3);
        assert_eq!(fake.count("remove_container"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_never_running_fails_and_removes_once() {
        let fake = with_nginx();
        fake.script_inspections(vec![not_running()]);

        let err = create(&provider(&fake), &web()).await.unwrap_err();

        assert!(matches!(kind(&err), Some(DockrsError::FailedToRun { .. })));
        assert!(err.to_string().contains("failed to be in running state"));
        assert_eq!(fake.count("inspect_container"), 30);
        assert_eq!(fake.count("remove_container"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_immediate_exit_surfaces_daemon_error() {
        let fake = with_nginx();
        let later = (Utc::now() + chrono::Duration::minutes(5)).to_rfc3339();
        fake.script_inspections(vec![exited(&later, "exec: \"nginx\": not found")]);

        let err = create(&provider(&fake), &web()).await.unwrap_err();

        match kind(&err) {
            Some(DockrsError::ExitedAfterCreate { error, .. }) => {
                assert!(error.contains("not found"))
            }
            other => panic!("unexpected error: {:?}", other),
        }
        assert_eq!(fake.count("inspect_container"), 1);
        let verbs = fake.verbs();
        assert_eq!(verbs.last(), Some(&"remove_container"));
    }

    #[tokio::test]
    async fn test_stopped_container_is_fine_when_not_required() {
        let fake = with_nginx();
        fake.script_inspections(vec![not_running()]);
        let mut spec = web();
        spec.must_run = false;
        let state = create(&provider(&fake), &spec).await.unwrap();
        assert!(state.ip_address.is_none());
        assert_eq!(fake.count("inspect_container"), 1);
    }

    #[tokio::test]
    async fn test_networks_and_uploads_before_start() {
        let fake = with_nginx();
        let mut spec = web();
        spec.network_alias.insert("frontend".into());
        spec.networks.insert(NetworkAttachment {
            name: "backend".into(),
            aliases: BTreeSet::new(),
        });
        spec.networks.insert(NetworkAttachment {
            name: "admin".into(),
            aliases: ["panel".to_string()].into_iter().collect(),
        });
        spec.uploads.insert(FileUpload {
            content: "hello".into(),
            file: "/usr/share/nginx/html/index.html".into(),
        });

        let state = create(&provider(&fake), &spec).await.unwrap();

        let verbs = fake.verbs();
        let start = verbs.iter().position(|v| *v == "start_container").unwrap();
        let upload = verbs.iter().position(|v| *v == "upload_archive").unwrap();
        assert!(upload < start);
        let connects: Vec<String> = fake
            .calls()
            .into_iter()
            .filter(|c| c.verb == "connect_network")
            .map(|c| c.target)
            .collect();
        assert_eq!(
            connects,
            vec![
                format!("admin<-{} [panel]", state.id),
                format!("backend<-{} [frontend]", state.id),
            ]
        );
        let uploads = fake.uploads();
        assert_eq!(uploads[0].1, "/");
    }

    #[tokio::test]
    async fn test_network_failure_leaves_container_in_place() {
        let fake = with_nginx();
        fake.fail("connect_network", 500);
        let mut spec = web();
        spec.networks.insert(NetworkAttachment {
            name: "backend".into(),
            aliases: BTreeSet::new(),
        });

        let err = create(&provider(&fake), &spec).await.unwrap_err();

        let id = kind(&err)
            .and_then(|e| e.partially_created_id())
            .expect("partial failure carries the container id")
            .to_string();
        assert!(fake.has_container(&id));
        assert_eq!(fake.count("start_container"), 0);
        assert_eq!(fake.count("remove_container"), 0);
    }

    #[tokio::test]
    async fn test_upload_failure_leaves_container_unstarted() {
        let fake = with_nginx();
        fake.fail("upload_archive", 500);
        let mut spec = web();
        spec.uploads.insert(FileUpload {
            content: "server_tokens off;".into(),
            file: "/etc/nginx/conf.d/tokens.conf".into(),
        });

        let err = create(&provider(&fake), &spec).await.unwrap_err();

        let id = kind(&err)
            .and_then(|e| e.partially_created_id())
            .expect("partial failure carries the container id")
            .to_string();
        assert!(fake.has_container(&id));
        assert!(format!("{:#}", err).contains("/etc/nginx/conf.d/tokens.conf"));
        assert_eq!(fake.count("start_container"), 0);
        assert_eq!(fake.count("remove_container"), 0);
    }

    #[tokio::test]
    async fn test_start_failure_is_partial() {
        let fake = with_nginx();
        fake.fail("start_container", 500);

        let err = create(&provider(&fake), &web()).await.unwrap_err();

        match kind(&err) {
            Some(DockrsError::PartiallyCreated { id, reason }) => {
                assert!(fake.has_container(id));
                assert!(reason.contains("Unable to start container"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
        assert_eq!(fake.count("inspect_container"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_cleanup_keeps_convergence_error() {
        let fake = with_nginx();
        fake.script_inspections(vec![not_running()]);
        fake.fail("remove_container", 500);

        let err = create(&provider(&fake), &web()).await.unwrap_err();

        let id = match kind(&err) {
            Some(DockrsError::FailedToRun { id }) => id.clone(),
            other => panic!("unexpected error: {:?}", other),
        };
        assert_eq!(fake.count("remove_container"), 1);
        assert!(fake.has_container(&id));
    }

    #[tokio::test]
    async fn test_read_does_not_wait() {
        let fake = with_nginx().with_container("abc");
        fake.script_inspections(vec![running()]);
        let state = read(&provider(&fake), &web(), "abc").await.unwrap().unwrap();
        assert_eq!(state.id, "abc");
        assert_eq!(fake.count("inspect_container"), 1);
    }

    #[tokio::test]
    async fn test_read_removes_stopped_required_container() {
        let fake = with_nginx().with_container("abc");
        fake.script_inspections(vec![not_running()]);
        let state = read(&provider(&fake), &web(), "abc").await.unwrap();
        assert!(state.is_none());
        assert_eq!(fake.count("inspect_container"), 1);
        assert_eq!(fake.count("remove_container"), 1);
    }

    #[tokio::test]
    async fn test_read_of_vanished_container() {
        let fake = with_nginx();
        assert!(read(&provider(&fake), &web(), "gone").await.unwrap().is_none());
        assert_eq!(fake.count("inspect_container"), 0);
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let fake = with_nginx().with_container("abc");
        let mut spec = web();
        spec.destroy_grace_seconds = 10;
        delete(&provider(&fake), &spec, "abc").await.unwrap();
        delete(&provider(&fake), &spec, "abc").await.unwrap();
        assert_eq!(fake.count("stop_container"), 2);
        assert_eq!(fake.count("remove_container"), 2);
        assert_eq!(fake.calls()[0].target, "abc t=10");
    }

    #[tokio::test]
    async fn test_stop_failure_is_fatal() {
        let fake = with_nginx().with_container("abc");
        fake.fail("stop_container", 500);
        let mut spec = web();
        spec.destroy_grace_seconds = 5;
        assert!(delete(&provider(&fake), &spec, "abc").await.is_err());
        assert!(fake.has_container("abc"));
    }

    #[tokio::test]
    async fn test_exists() {
        let fake = with_nginx().with_container("abc");
        let spec = web();
        assert!(exists(&provider(&fake), &spec, "abc").await.unwrap());
        assert!(!exists(&provider(&fake), &spec, "xyz").await.unwrap());
        assert!(!exists(&unconfigured_provider(&fake), &spec, "abc").await.unwrap());
    }
}
