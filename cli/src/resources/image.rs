//! # dockrs Image Reconciler (`resources::image`)
//!
//! File: cli/src/resources/image.rs
//!
//! ## Overview
//!
//! Realizes a named, tagged image on the daemon and optionally pushes it.
//!
//! State machine per resource: `absent -> realized -> (pushed)? -> absent`.
//!
//! ## Operations
//!
//! - **create**: acquire the image by exactly one of pull, load-from-archive,
//!   build from a local context or build from a remote context (or none, when
//!   the image already exists and only a push is wanted), push when requested,
//!   then read back. The identity is `[registry/]name[:tag]`.
//! - **read**: inspect by identity; a 404 means the image is gone (`Ok(None)`).
//! - **update**: only `push` is actionable; flipping it on triggers a push.
//! - **delete**: force-remove unless `keep` is set. Already gone is success.
//! - **exists**: inspect by identity; 404 or a deferred connection is `false`.
//!
use crate::common::archive::tar::create_context_tar;
use crate::common::convert;
use crate::common::docker::client::{self, BuildRequest, DockerClient};
use crate::common::docker::connect::ConnectionOverrides;
pub use crate::common::elements::RegistryAuth;
use crate::core::config::expand_path;
use crate::core::error::{DockrsError, Result};
use crate::resources::{docker_err, Provider};
use anyhow::{anyhow, Context};
use bollard::errors::Error as DockerError;
use bollard::models::ImageInspect;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::future::Future;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

/// Declarative image resource.
#[derive(Deserialize, Serialize, Debug, Clone, Default, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ImageSpec {
    #[serde(default)]
    pub connection: ConnectionOverrides,
    pub registry: Option<String>,
    pub name: String,
    /// Empty means "no tag" in the identity.
    #[serde(default = "default_tag")]
    pub tag: String,

    // --- Acquisition (at most one) ---
    #[serde(default)]
    pub pull: bool,
    pub load_path: Option<PathBuf>,
    pub build_local_path: Option<PathBuf>,
    pub build_remote_path: Option<String>,

    // --- Build knobs ---
    #[serde(default = "default_dockerfile")]
    pub dockerfile: String,
    #[serde(default)]
    pub nocache: bool,
    pub memory: Option<u64>,
    pub memswap: Option<i64>,
    pub cpu_shares: Option<u64>,
    pub cpu_quota: Option<u64>,
    pub cpu_period: Option<u64>,
    pub cpu_set_cpus: Option<String>,
    pub network_mode: Option<String>,
    /// Accepted but not sent: the build options in bollard 0.18 have no
    /// cgroup parent field. A build that sets it logs a warning.
    pub cgroup_parent: Option<String>,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    #[serde(default)]
    pub build_args: BTreeMap<String, String>,
    /// Build ulimits by name. Like `cgroup_parent`, they are merged with
    /// `ulimit_hard` but not sent to the daemon; the build logs a warning.
    #[serde(default)]
    pub ulimit_soft: BTreeMap<String, i64>,
    #[serde(default)]
    pub ulimit_hard: BTreeMap<String, i64>,

    /// Per-call limit in seconds for pull, load, build and push; `0` means none.
    #[serde(default)]
    pub timeout: u64,
    #[serde(default)]
    pub push: bool,
    /// Leave the image on the daemon when the resource is deleted.
    #[serde(default)]
    pub keep: bool,
    #[serde(default)]
    pub auth: Vec<RegistryAuth>,
}

fn default_tag() -> String {
    "latest".to_string()
}

fn default_dockerfile() -> String {
    "Dockerfile".to_string()
}

/// Observed image.
#[derive(Serialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct ImageState {
    pub identity: String,
    pub id: String,
    pub parent: Option<String>,
    pub comment: Option<String>,
    pub docker_version: Option<String>,
    pub author: Option<String>,
    pub os: Option<String>,
    pub architecture: Option<String>,
    pub size: Option<i64>,
    pub virtual_size: Option<i64>,
    /// Unix seconds.
    pub created_at: Option<i64>,
    pub digests: Vec<String>,
    pub all_tags: Vec<String>,
    pub labels: BTreeMap<String, String>,
}

/// How the image is obtained on create.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Acquisition<'a> {
    Pull,
    Load(&'a PathBuf),
    BuildLocal(&'a PathBuf),
    BuildRemote(&'a str),
    /// The image is expected to exist already.
    None,
}

impl ImageSpec {
    /// Spec with defaults for everything but the name.
    pub fn new(name: &str) -> Self {
        ImageSpec {
            name: name.to_string(),
            tag: default_tag(),
            dockerfile: default_dockerfile(),
            ..Default::default()
        }
    }

    fn registry(&self) -> Option<&str> {
        self.registry.as_deref().filter(|r| !r.is_empty())
    }

    /// `registry/name`, or just `name`.
    pub fn repository(&self) -> String {
        match self.registry() {
            Some(registry) => format!("{}/{}", registry, self.name),
            None => self.name.clone(),
        }
    }

    /// `[registry/]name[:tag]`, the identity of the resource.
    pub fn identity(&self) -> String {
        if self.tag.is_empty() {
            self.repository()
        } else {
            format!("{}:{}", self.repository(), self.tag)
        }
    }

    /// The configured acquisition mode. Assumes `validate` passed.
    pub fn acquisition(&self) -> Acquisition<'_> {
        if self.pull {
            Acquisition::Pull
        } else if let Some(path) = &self.load_path {
            Acquisition::Load(path)
        } else if let Some(path) = &self.build_local_path {
            Acquisition::BuildLocal(path)
        } else if let Some(url) = &self.build_remote_path {
            Acquisition::BuildRemote(url)
        } else {
            Acquisition::None
        }
    }

    /// Pre-flight checks, before any daemon call.
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(invalid("image name must not be empty"));
        }
        let modes: Vec<&str> = [
            (self.pull, "pull"),
            (self.load_path.is_some(), "load_path"),
            (self.build_local_path.is_some(), "build_local_path"),
            (self.build_remote_path.is_some(), "build_remote_path"),
        ]
        .iter()
        .filter(|(set, _)| *set)
        .map(|(_, name)| *name)
        .collect();
        if modes.len() > 1 {
            return Err(invalid(&format!(
                "only one of pull, load_path, build_local_path and build_remote_path may be set, got {}",
                modes.join(" and ")
            )));
        }
        for entry in &self.auth {
            if entry.registry.trim().is_empty() || entry.username.trim().is_empty() {
                return Err(invalid("auth entries need a registry and a username"));
            }
        }
        if self.dockerfile.trim().is_empty() {
            return Err(invalid("dockerfile must not be empty"));
        }
        Ok(())
    }
}

fn invalid(message: &str) -> anyhow::Error {
    anyhow!(DockrsError::Validation(message.to_string()))
}

/// Runs a daemon call under the image's `timeout` (seconds, 0 = none).
async fn within<T, F>(timeout_secs: u64, what: &str, call: F) -> Result<T>
where
    F: Future<Output = std::result::Result<T, DockerError>>,
{
    let outcome = if timeout_secs == 0 {
        call.await
    } else {
        tokio::time::timeout(Duration::from_secs(timeout_secs), call)
            .await
            .map_err(|_| {
                anyhow!(DockrsError::DockerOperation(format!(
                    "{} timed out after {}s",
                    what, timeout_secs
                )))
            })?
    };
    outcome
        .map_err(docker_err)
        .with_context(|| format!("Failed to {}", what))
}

/// Realizes the image and returns its observed state.
#[instrument(skip_all, fields(image = %spec.identity()))]
pub async fn create(provider: &Provider, spec: &ImageSpec) -> Result<ImageState> {
    spec.validate()?;
    let client = provider.client(&spec.connection).await?;
    let identity = spec.identity();
    let auth = convert::auth_map(&spec.auth);
    let registry_auth = auth.get(spec.registry().unwrap_or_default()).cloned();

    match spec.acquisition() {
        Acquisition::Pull => {
            // An empty tag would pull every tag of the repository.
            let tag = if spec.tag.is_empty() { "latest" } else { spec.tag.as_str() };
            info!("Pulling image {}:{}", spec.repository(), tag);
            within(
                spec.timeout,
                &format!("pull image '{}'", identity),
                client.pull_image(&spec.repository(), tag, registry_auth.clone()),
            )
            .await?;
        }
        Acquisition::Load(path) => {
            let path = expand_path(path);
            info!("Loading image archive {}", path.display());
            let archive = tokio::fs::read(&path).await.map_err(|e| {
                anyhow!(DockrsError::FileSystem(format!(
                    "cannot read image archive '{}': {}",
                    path.display(),
                    e
                )))
            })?;
            within(
                spec.timeout,
                &format!("load image archive '{}'", path.display()),
                client.load_image(archive),
            )
            .await?;
        }
        Acquisition::BuildLocal(path) => {
            let path = expand_path(path);
            info!("Creating build context tarball for '{}'...", path.display());
            let context = create_context_tar(&path).context("Failed to create build context tarball")?;
            let request = build_request(spec, &identity, Some(context), None, auth.clone());
            within(
                spec.timeout,
                &format!("build image '{}'", identity),
                client.build_image(request),
            )
            .await?;
        }
        Acquisition::BuildRemote(url) => {
            info!("Building image {} from remote context {}", identity, url);
            let request = build_request(spec, &identity, None, Some(url.to_string()), auth.clone());
            within(
                spec.timeout,
                &format!("build image '{}'", identity),
                client.build_image(request),
            )
            .await?;
        }
        Acquisition::None => debug!("No acquisition configured for {}", identity),
    }

    if spec.push {
        push(client.as_ref(), spec, registry_auth).await?;
    }

    inspect(client.as_ref(), &identity)
        .await?
        .ok_or_else(|| anyhow!(DockrsError::ImageNotFound { name: identity }))
}

fn build_request(
    spec: &ImageSpec,
    identity: &str,
    context: Option<Vec<u8>>,
    remote: Option<String>,
    auth: std::collections::HashMap<String, bollard::auth::DockerCredentials>,
) -> BuildRequest {
    BuildRequest {
        tag: identity.to_string(),
        dockerfile: spec.dockerfile.clone(),
        context,
        remote,
        nocache: spec.nocache,
        memory: spec.memory,
        memswap: spec.memswap,
        cpu_shares: spec.cpu_shares,
        cpu_quota: spec.cpu_quota,
        cpu_period: spec.cpu_period,
        cpu_set_cpus: spec.cpu_set_cpus.clone(),
        network_mode: spec.network_mode.clone(),
        cgroup_parent: spec.cgroup_parent.clone(),
        labels: convert::to_hash_map(&spec.labels),
        build_args: convert::to_hash_map(&spec.build_args),
        ulimits: convert::merge_ulimits(&spec.ulimit_soft, &spec.ulimit_hard),
        auth,
    }
}

async fn push(
    client: &dyn DockerClient,
    spec: &ImageSpec,
    auth: Option<bollard::auth::DockerCredentials>,
) -> Result<()> {
    if auth.is_none() {
        debug!("No credentials for registry of {}, pushing anonymously", spec.identity());
    }
    info!("Pushing image {}", spec.identity());
    within(
        spec.timeout,
        &format!("push image '{}'", spec.identity()),
        client.push_image(&spec.repository(), &spec.tag, auth),
    )
    .await
}

async fn inspect(client: &dyn DockerClient, identity: &str) -> Result<Option<ImageState>> {
    match client.inspect_image(identity).await {
        Ok(image) => Ok(Some(image_state(identity, image))),
        Err(e) if client::is_not_found(&e) => {
            debug!("Image {} not found", identity);
            Ok(None)
        }
        Err(e) => Err(docker_err(e)).with_context(|| format!("Failed to inspect image '{}'", identity)),
    }
}

fn image_state(identity: &str, image: ImageInspect) -> ImageState {
    let created_at = image
        .created
        .as_deref()
        .and_then(|c| chrono::DateTime::parse_from_rfc3339(c).ok())
        .map(|c| c.timestamp());
    let labels = image
        .config
        .and_then(|c| c.labels)
        .map(|l| l.into_iter().collect())
        .unwrap_or_default();
    ImageState {
        identity: identity.to_string(),
        id: image.id.unwrap_or_default(),
        parent: image.parent.filter(|p| !p.is_empty()),
        comment: image.comment.filter(|c| !c.is_empty()),
        docker_version: image.docker_version.filter(|v| !v.is_empty()),
        author: image.author.filter(|a| !a.is_empty()),
        os: image.os,
        architecture: image.architecture,
        size: image.size,
        virtual_size: image.virtual_size,
        created_at,
        digests: image.repo_digests.unwrap_or_default(),
        all_tags: image.repo_tags.unwrap_or_default(),
        labels,
    }
}

/// Re-reads the image; `Ok(None)` means it is gone.
#[instrument(skip_all, fields(image = %identity))]
pub async fn read(provider: &Provider, spec: &ImageSpec, identity: &str) -> Result<Option<ImageState>> {
    let client = provider.client(&spec.connection).await?;
    inspect(client.as_ref(), identity).await
}

/// Applies the changes that do not need a replacement: pushing.
#[instrument(skip_all, fields(image = %identity))]
pub async fn update(
    provider: &Provider,
    previous: &ImageSpec,
    spec: &ImageSpec,
    identity: &str,
) -> Result<Option<ImageState>> {
    spec.validate()?;
    let client = provider.client(&spec.connection).await?;
    if spec.push && !previous.push {
        let auth = convert::auth_map(&spec.auth)
            .get(spec.registry().unwrap_or_default())
            .cloned();
        push(client.as_ref(), spec, auth).await?;
    } else {
        debug!("Nothing to update for {}", identity);
    }
    inspect(client.as_ref(), identity).await
}

/// Force-removes the image unless `keep` is set.
#[instrument(skip_all, fields(image = %identity))]
pub async fn delete(provider: &Provider, spec: &ImageSpec, identity: &str) -> Result<()> {
    if spec.keep {
        info!("Keeping image {} on the daemon", identity);
        return Ok(());
    }
    let client = provider.client(&spec.connection).await?;
    match client.remove_image(identity).await {
        Ok(()) => {
            info!("Removed image {}", identity);
            Ok(())
        }
        Err(e) if client::is_not_found(&e) => {
            warn!("Image {} was already gone", identity);
            Ok(())
        }
        Err(e) => Err(docker_err(e)).with_context(|| format!("Failed to remove image '{}'", identity)),
    }
}

/// Reports whether `identity` is present locally.
///
/// ## Returns
///
/// `false` when the daemon answers 404 or the connection is deferred.
#[instrument(skip_all, fields(image = %identity))]
pub async fn exists(provider: &Provider, spec: &ImageSpec, identity: &str) -> Result<bool> {
    let Some(client) = provider.client_if_ready(&spec.connection).await? else {
        return Ok(false);
    };
    Ok(inspect(client.as_ref(), identity).await?.is_some())
}
