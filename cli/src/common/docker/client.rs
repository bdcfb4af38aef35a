//! # dockrs Runtime Client Facade
//!
//! File: cli/src/common/docker/client.rs
//!
//! ## Overview
//!
//! The reconcilers never talk to `bollard::Docker` directly. They go through the
//! `DockerClient` trait, which exposes the primitive verbs per object kind
//! (image, container, network, volume) and hides progress streams: pull, load,
//! build and push return once their stream is drained and fail if the daemon
//! reported an error inside it.
//!
//! A `Connector` turns a `ResolvedConnection` into a client. `BollardConnector`
//! supports local sockets, plain TCP/HTTP and mutual TLS. Tests substitute the
//! in-memory fake from `common::docker::fake`.
//!
//! ## "Not found"
//!
//! Every verb returns `bollard::errors::Error`. A daemon 404 is reported as
//! `DockerResponseServerError { status_code: 404, .. }`; `is_not_found` classifies
//! it before the error is wrapped into `DockrsError::DockerApi`.
//!
use super::connect::{ResolvedConnection, TlsMaterial};
use crate::core::error::{DockrsError, Result};
use anyhow::{anyhow, Context};
use async_trait::async_trait;
use bollard::auth::DockerCredentials;
use bollard::container::{
    Config as ContainerConfig, CreateContainerOptions, InspectContainerOptions,
    ListContainersOptions, RemoveContainerOptions, StartContainerOptions, StopContainerOptions,
    UploadToContainerOptions,
};
use bollard::errors::Error as DockerError;
use bollard::image::{
    BuildImageOptions, CreateImageOptions, ImportImageOptions, ListImagesOptions,
    PushImageOptions, RemoveImageOptions,
};
use bollard::models::{
    ContainerCreateResponse, ContainerInspectResponse, ContainerSummary, EndpointSettings,
    ImageInspect, ImageSummary, Network, Volume,
};
use bollard::network::{ConnectNetworkOptions, CreateNetworkOptions, InspectNetworkOptions};
use bollard::volume::{CreateVolumeOptions, RemoveVolumeOptions};
use bollard::{Docker, API_DEFAULT_VERSION};
use futures_util::stream::StreamExt;
use std::collections::HashMap;
use std::fs;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Seconds bollard waits for a single request.
const CLIENT_TIMEOUT_SECS: u64 = 120;

/// Parameters of an image build.
///
/// Exactly one of `context` (a gzipped tarball) and `remote` is expected.
#[derive(Debug, Clone, Default)]
pub struct BuildRequest {
    pub tag: String,
    pub dockerfile: String,
    pub context: Option<Vec<u8>>,
    pub remote: Option<String>,
    pub nocache: bool,
    pub memory: Option<u64>,
    pub memswap: Option<i64>,
    pub cpu_shares: Option<u64>,
    pub cpu_quota: Option<u64>,
    pub cpu_period: Option<u64>,
    pub cpu_set_cpus: Option<String>,
    pub network_mode: Option<String>,
    pub cgroup_parent: Option<String>,
    pub labels: HashMap<String, String>,
    pub build_args: HashMap<String, String>,
    pub ulimits: Vec<crate::common::convert::Ulimit>,
    pub auth: HashMap<String, DockerCredentials>,
}

/// Primitive daemon verbs used by the reconcilers.
#[async_trait]
pub trait DockerClient: Send + Sync {
    async fn ping(&self) -> std::result::Result<(), DockerError>;

    // --- Images ---
    async fn list_images(&self) -> std::result::Result<Vec<ImageSummary>, DockerError>;
    async fn inspect_image(&self, name: &str) -> std::result::Result<ImageInspect, DockerError>;
    async fn pull_image(
        &self,
        repository: &str,
        tag: &str,
        auth: Option<DockerCredentials>,
    ) -> std::result::Result<(), DockerError>;
    /// Loads an image archive as produced by `docker save`.
    async fn load_image(&self, archive: Vec<u8>) -> std::result::Result<(), DockerError>;
    async fn build_image(&self, request: BuildRequest) -> std::result::Result<(), DockerError>;
    async fn push_image(
        &self,
        name: &str,
        tag: &str,
        auth: Option<DockerCredentials>,
    ) -> std::result::Result<(), DockerError>;
    /// Force-removes an image.
    async fn remove_image(&self, name: &str) -> std::result::Result<(), DockerError>;

    // --- Containers ---
    async fn create_container(
        &self,
        name: &str,
        config: ContainerConfig<String>,
    ) -> std::result::Result<ContainerCreateResponse, DockerError>;
    async fn connect_network(
        &self,
        network: &str,
        container: &str,
        aliases: Vec<String>,
    ) -> std::result::Result<(), DockerError>;
    /// Extracts a tar archive at `path` inside the container.
    async fn upload_archive(
        &self,
        container: &str,
        path: &str,
        archive: Vec<u8>,
    ) -> std::result::Result<(), DockerError>;
    async fn start_container(&self, id: &str) -> std::result::Result<(), DockerError>;
    async fn stop_container(
        &self,
        id: &str,
        timeout_secs: i64,
    ) -> std::result::Result<(), DockerError>;
    /// Force-removes a container and its anonymous volumes.
    async fn remove_container(&self, id: &str) -> std::result::Result<(), DockerError>;
    async fn inspect_container(
        &self,
        id: &str,
    ) -> std::result::Result<ContainerInspectResponse, DockerError>;
    /// Lists all containers, stopped ones included.
    async fn list_containers(&self) -> std::result::Result<Vec<ContainerSummary>, DockerError>;

    // --- Networks ---
    /// Creates a network and returns its inspected description.
    async fn create_network(
        &self,
        options: CreateNetworkOptions<String>,
    ) -> std::result::Result<Network, DockerError>;
    async fn inspect_network(&self, name: &str) -> std::result::Result<Network, DockerError>;
    async fn remove_network(&self, name: &str) -> std::result::Result<(), DockerError>;

    // --- Volumes ---
    async fn create_volume(
        &self,
        options: CreateVolumeOptions<String>,
    ) -> std::result::Result<Volume, DockerError>;
    async fn inspect_volume(&self, name: &str) -> std::result::Result<Volume, DockerError>;
    async fn remove_volume(&self, name: &str) -> std::result::Result<(), DockerError>;
}

/// Opens a client for a resolved connection.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, connection: &ResolvedConnection) -> Result<Arc<dyn DockerClient>>;
}

/// True when the daemon answered 404.
pub fn is_not_found(err: &DockerError) -> bool {
    matches!(
        err,
        DockerError::DockerResponseServerError {
            status_code: 404,
            ..
        }
    )
}

/// True when the daemon answered 304 (e.g. stopping a stopped container).
pub fn is_not_modified(err: &DockerError) -> bool {
    matches!(
        err,
        DockerError::DockerResponseServerError {
            status_code: 304,
            ..
        }
    )
}

/// Converts a message reported inside a progress stream into an error.
fn stream_error(message: String) -> DockerError {
    DockerError::DockerStreamError { error: message }
}

/// `DockerClient` backed by a live `bollard::Docker`.
#[derive(Clone)]
pub struct BollardClient {
    docker: Docker,
}

impl BollardClient {
    /// Wraps an already configured bollard handle.
    pub fn new(docker: Docker) -> Self {
        Self { docker }
    }
}

#[async_trait]
impl DockerClient for BollardClient {
    async fn ping(&self) -> std::result::Result<(), DockerError> {
        self.docker.ping().await.map(|_| ())
    }

    async fn list_images(&self) -> std::result::Result<Vec<ImageSummary>, DockerError> {
        self.docker
            .list_images(Some(ListImagesOptions::<String> {
                all: false,
                ..Default::default()
            }))
            .await
    }

    async fn inspect_image(&self, name: &str) -> std::result::Result<ImageInspect, DockerError> {
        self.docker.inspect_image(name).await
    }

    async fn pull_image(
        &self,
        repository: &str,
        tag: &str,
        auth: Option<DockerCredentials>,
    ) -> std::result::Result<(), DockerError> {
        let options = CreateImageOptions {
            from_image: repository.to_string(),
            tag: tag.to_string(),
            ..Default::default()
        };
        let mut stream = self.docker.create_image(Some(options), None, auth);
        while let Some(item) = stream.next().await {
            let info = item?;
            if let Some(error) = info.error {
                return Err(stream_error(error));
            }
            if let Some(status) = info.status {
                debug!("Pull {}:{}: {}", repository, tag, status);
            }
        }
        Ok(())
    }

    async fn load_image(&self, archive: Vec<u8>) -> std::result::Result<(), DockerError> {
        let options = ImportImageOptions { quiet: true };
        let mut stream = self.docker.import_image(options, archive.into(), None);
        while let Some(item) = stream.next().await {
            let info = item?;
            if let Some(error) = info.error {
                return Err(stream_error(error));
            }
            if let Some(line) = info.stream {
                debug!("Load: {}", line.trim_end());
            }
        }
        Ok(())
    }

    async fn build_image(&self, request: BuildRequest) -> std::result::Result<(), DockerError> {
        if !request.ulimits.is_empty() || request.cgroup_parent.is_some() {
            // The build endpoint options exposed by bollard carry neither setting.
            warn!(
                "Build of '{}': ulimits and cgroup_parent are not forwarded to the daemon",
                request.tag
            );
        }
        let options = BuildImageOptions {
            dockerfile: request.dockerfile.clone(),
            t: request.tag.clone(),
            remote: request.remote.clone().unwrap_or_default(),
            nocache: request.nocache,
            rm: true,
            memory: request.memory,
            memswap: request.memswap,
            cpushares: request.cpu_shares,
            cpuquota: request.cpu_quota,
            cpuperiod: request.cpu_period,
            cpusetcpus: request.cpu_set_cpus.clone().unwrap_or_default(),
            networkmode: request.network_mode.clone().unwrap_or_default(),
            labels: request.labels.clone(),
            buildargs: request.build_args.clone(),
            ..Default::default()
        };
        let credentials = if request.auth.is_empty() {
            None
        } else {
            Some(request.auth)
        };
        let mut stream = self.docker.build_image(
            options,
            credentials,
            request.context.map(|bytes| bytes.into()),
        );
        while let Some(item) = stream.next().await {
            let info = item?;
            if let Some(error) = info.error {
                let detail = info
                    .error_detail
                    .and_then(|d| d.message)
                    .unwrap_or_default();
                return Err(stream_error(format!("{} {}", error, detail).trim().to_string()));
            }
            if let Some(line) = info.stream {
                debug!("Build {}: {}", request.tag, line.trim_end());
            }
        }
        Ok(())
    }

    async fn push_image(
        &self,
        name: &str,
        tag: &str,
        auth: Option<DockerCredentials>,
    ) -> std::result::Result<(), DockerError> {
        let options = PushImageOptions {
            tag: tag.to_string(),
        };
        let mut stream = self.docker.push_image(name, Some(options), auth);
        while let Some(item) = stream.next().await {
            let info = item?;
            if let Some(error) = info.error {
                return Err(stream_error(error));
            }
            if let Some(status) = info.status {
                debug!("Push {}:{}: {}", name, tag, status);
            }
        }
        Ok(())
    }

    async fn remove_image(&self, name: &str) -> std::result::Result<(), DockerError> {
        let options = RemoveImageOptions {
            force: true,
            ..Default::default()
        };
        self.docker
            .remove_image(name, Some(options), None)
            .await
            .map(|_| ())
    }

    async fn create_container(
        &self,
        name: &str,
        config: ContainerConfig<String>,
    ) -> std::result::Result<ContainerCreateResponse, DockerError> {
        let options = CreateContainerOptions {
            name: name.to_string(),
            platform: None,
        };
        self.docker.create_container(Some(options), config).await
    }

    async fn connect_network(
        &self,
        network: &str,
        container: &str,
        aliases: Vec<String>,
    ) -> std::result::Result<(), DockerError> {
        let options = ConnectNetworkOptions {
            container: container.to_string(),
            endpoint_config: EndpointSettings {
                aliases: if aliases.is_empty() {
                    None
                } else {
                    Some(aliases)
                },
                ..Default::default()
            },
        };
        self.docker.connect_network(network, options).await
    }

    async fn upload_archive(
        &self,
        container: &str,
        path: &str,
        archive: Vec<u8>,
    ) -> std::result::Result<(), DockerError> {
        let options = UploadToContainerOptions {
            path: path.to_string(),
            ..Default::default()
        };
        self.docker
            .upload_to_container(container, Some(options), archive.into())
            .await
    }

    async fn start_container(&self, id: &str) -> std::result::Result<(), DockerError> {
        self.docker
            .start_container(id, None::<StartContainerOptions<String>>)
            .await
    }

    async fn stop_container(
        &self,
        id: &str,
        timeout_secs: i64,
    ) -> std::result::Result<(), DockerError> {
        self.docker
            .stop_container(id, Some(StopContainerOptions { t: timeout_secs }))
            .await
    }

    async fn remove_container(&self, id: &str) -> std::result::Result<(), DockerError> {
        let options = RemoveContainerOptions {
            v: true,
            force: true,
            ..Default::default()
        };
        self.docker.remove_container(id, Some(options)).await
    }

    async fn inspect_container(
        &self,
        id: &str,
    ) -> std::result::Result<ContainerInspectResponse, DockerError> {
        self.docker
            .inspect_container(id, None::<InspectContainerOptions>)
            .await
    }

    async fn list_containers(&self) -> std::result::Result<Vec<ContainerSummary>, DockerError> {
        self.docker
            .list_containers(Some(ListContainersOptions::<String> {
                all: true,
                ..Default::default()
            }))
            .await
    }

    async fn create_network(
        &self,
        options: CreateNetworkOptions<String>,
    ) -> std::result::Result<Network, DockerError> {
        let name = options.name.clone();
        self.docker.create_network(options).await?;
        self.inspect_network(&name).await
    }

    async fn inspect_network(&self, name: &str) -> std::result::Result<Network, DockerError> {
        self.docker
            .inspect_network(name, None::<InspectNetworkOptions<String>>)
            .await
    }

    async fn remove_network(&self, name: &str) -> std::result::Result<(), DockerError> {
        self.docker.remove_network(name).await
    }

    async fn create_volume(
        &self,
        options: CreateVolumeOptions<String>,
    ) -> std::result::Result<Volume, DockerError> {
        self.docker.create_volume(options).await
    }

    async fn inspect_volume(&self, name: &str) -> std::result::Result<Volume, DockerError> {
        self.docker.inspect_volume(name).await
    }

    async fn remove_volume(&self, name: &str) -> std::result::Result<(), DockerError> {
        self.docker
            .remove_volume(name, None::<RemoveVolumeOptions>)
            .await
    }
}

/// Opens `bollard` connections.
#[derive(Debug, Clone, Default)]
pub struct BollardConnector;

#[async_trait]
impl Connector for BollardConnector {
    #[instrument(skip_all, fields(host = %connection.host))]
    async fn connect(&self, connection: &ResolvedConnection) -> Result<Arc<dyn DockerClient>> {
        let docker = open(connection)?;
        let client = BollardClient::new(docker);
        if connection.ping {
            client
                .ping()
                .await
                .map_err(|e| anyhow!(DockrsError::DockerApi { source: e }))
                .with_context(|| {
                    format!(
                        "Failed to ping Docker daemon at '{}'. Is it running and accessible?",
                        connection.host
                    )
                })?;
            info!("Docker daemon at '{}' answered ping", connection.host);
        }
        Ok(Arc::new(client))
    }
}

fn open(connection: &ResolvedConnection) -> Result<Docker> {
    let host = connection.host.as_str();
    let docker = match (&connection.tls, host) {
        (Some(_), h) if h.starts_with("unix://") => {
            return Err(anyhow!(DockrsError::Config(format!(
                "TLS material was supplied but '{}' is a local socket",
                host
            ))));
        }
        (Some(tls), _) => connect_tls(host, tls)?,
        (None, h) if h.starts_with("unix://") => {
            Docker::connect_with_unix(h, CLIENT_TIMEOUT_SECS, API_DEFAULT_VERSION)
                .map_err(|e| anyhow!(DockrsError::DockerApi { source: e }))?
        }
        (None, h) => Docker::connect_with_http(h, CLIENT_TIMEOUT_SECS, API_DEFAULT_VERSION)
            .map_err(|e| anyhow!(DockrsError::DockerApi { source: e }))?,
    };
    debug!("Opened Docker client for '{}'", host);
    Ok(docker)
}

/// bollard loads PEM files by path, so the material is staged in a private
/// directory that lives only until the client is built.
fn connect_tls(host: &str, tls: &TlsMaterial) -> Result<Docker> {
    let staging = tempfile::tempdir().map_err(|e| {
        anyhow!(DockrsError::FileSystem(format!(
            "cannot create TLS staging directory: {}",
            e
        )))
    })?;
    let ca = staging.path().join("ca.pem");
    let cert = staging.path().join("cert.pem");
    let key = staging.path().join("key.pem");
    for (path, bytes) in [(&ca, &tls.ca), (&cert, &tls.cert), (&key, &tls.key)] {
        fs::write(path, bytes).map_err(|e| {
            anyhow!(DockrsError::FileSystem(format!(
                "cannot stage TLS material: {}",
                e
            )))
        })?;
    }
    let docker = Docker::connect_with_ssl(
        host,
        &key,
        &cert,
        &ca,
        CLIENT_TIMEOUT_SECS,
        API_DEFAULT_VERSION,
    )
    .map_err(|e| anyhow!(DockrsError::DockerApi { source: e }))
    .with_context(|| format!("Failed to open TLS connection to '{}'", host))?;
    // Dropping `staging` removes the PEM copies.
    Ok(docker)
}
