//! # dockrs In-Memory Docker Fake (test only)
//!
//! File: cli/src/common/docker/fake.rs
//!
//! A recording `DockerClient` for reconciler tests. It keeps just enough daemon
//! state (images, containers, networks, volumes) to answer follow-up calls,
//! records every verb with its target, and lets a test script the sequence of
//! container inspections and inject daemon errors per verb.
//!
use super::client::{BuildRequest, Connector, DockerClient};
use super::connect::ResolvedConnection;
use crate::core::error::Result;
use async_trait::async_trait;
use bollard::auth::DockerCredentials;
use bollard::container::Config as ContainerConfig;
use bollard::errors::Error as DockerError;
use bollard::models::{
    ContainerCreateResponse, ContainerInspectResponse, ContainerState, ContainerSummary,
    ImageInspect, ImageSummary, Network, NetworkSettings, Volume,
};
use bollard::network::CreateNetworkOptions;
use bollard::volume::CreateVolumeOptions;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// One recorded verb.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    pub verb: &'static str,
    pub target: String,
}

#[derive(Default)]
struct FakeState {
    images: Vec<ImageSummary>,
    image_inspects: HashMap<String, ImageInspect>,
    containers: Vec<ContainerSummary>,
    container_configs: HashMap<String, ContainerConfig<String>>,
    inspect_script: VecDeque<ContainerInspectResponse>,
    networks: HashMap<String, Network>,
    volumes: HashMap<String, Volume>,
    uploads: Vec<(String, String, Vec<u8>)>,
    push_auth: Vec<Option<String>>,
    failures: HashMap<&'static str, u16>,
    calls: Vec<Call>,
    next_id: usize,
}

/// Recording fake daemon.
#[derive(Default)]
pub struct FakeDocker {
    state: Mutex<FakeState>,
}

fn server_error(status_code: u16, verb: &str) -> DockerError {
    DockerError::DockerResponseServerError {
        status_code,
        message: format!("fake daemon refused {}", verb),
    }
}

fn not_found(what: &str) -> DockerError {
    DockerError::DockerResponseServerError {
        status_code: 404,
        message: format!("No such object: {}", what),
    }
}

/// Inspection of a running container with bridge network settings.
pub fn running() -> ContainerInspectResponse {
    ContainerInspectResponse {
        state: Some(ContainerState {
            running: Some(true),
            finished_at: Some("0001-01-01T00:00:00Z".to_string()),
            ..Default::default()
        }),
        network_settings: Some(NetworkSettings {
            ip_address: Some("172.17.0.2".to_string()),
            ip_prefix_len: Some(16),
            gateway: Some("172.17.0.1".to_string()),
            bridge: Some("docker0".to_string()),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Inspection of a container that is created but not (yet) running.
pub fn not_running() -> ContainerInspectResponse {
    ContainerInspectResponse {
        state: Some(ContainerState {
            running: Some(false),
            finished_at: Some("0001-01-01T00:00:00Z".to_string()),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Inspection of a container that exited at `finished_at` with `error`.
pub fn exited(finished_at: &str, error: &str) -> ContainerInspectResponse {
    ContainerInspectResponse {
        state: Some(ContainerState {
            running: Some(false),
            finished_at: Some(finished_at.to_string()),
            error: Some(error.to_string()),
            ..Default::default()
        }),
        ..Default::default()
    }
}

impl FakeDocker {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Adds a local image with `id` and `tags`.
    pub fn with_image(self: &Arc<Self>, id: &str, tags: &[&str]) -> Arc<Self> {
        {
            let mut state = self.state.lock().unwrap();
            state.images.push(ImageSummary {
                id: id.to_string(),
                repo_tags: tags.iter().map(|t| t.to_string()).collect(),
                ..Default::default()
            });
            let inspect = ImageInspect {
                id: Some(id.to_string()),
                repo_tags: Some(tags.iter().map(|t| t.to_string()).collect()),
                ..Default::default()
            };
            state.image_inspects.insert(id.to_string(), inspect.clone());
            for tag in tags {
                state.image_inspects.insert(tag.to_string(), inspect.clone());
            }
        }
        Arc::clone(self)
    }

    /// Adds a container to the listing without creating it.
    pub fn with_container(self: &Arc<Self>, id: &str) -> Arc<Self> {
        self.state.lock().unwrap().containers.push(ContainerSummary {
            id: Some(id.to_string()),
            ..Default::default()
        });
        Arc::clone(self)
    }

    /// Queues container inspections; the last one repeats once the queue drains.
    pub fn script_inspections(&self, responses: Vec<ContainerInspectResponse>) {
        self.state.lock().unwrap().inspect_script.extend(responses);
    }

    /// Makes every call to `verb` fail with HTTP `status_code`.
    pub fn fail(&self, verb: &'static str, status_code: u16) {
        self.state.lock().unwrap().failures.insert(verb, status_code);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn count(&self, verb: &str) -> usize {
        self.calls().iter().filter(|c| c.verb == verb).count()
    }

    pub fn verbs(&self) -> Vec<&'static str> {
        self.calls().iter().map(|c| c.verb).collect()
    }

    pub fn container_config(&self, id: &str) -> Option<ContainerConfig<String>> {
        self.state.lock().unwrap().container_configs.get(id).cloned()
    }

    pub fn uploads(&self) -> Vec<(String, String, Vec<u8>)> {
        self.state.lock().unwrap().uploads.clone()
    }

    /// Usernames used for each push (`None` for anonymous pushes).
    pub fn push_auth(&self) -> Vec<Option<String>> {
        self.state.lock().unwrap().push_auth.clone()
    }

    pub fn has_container(&self, id: &str) -> bool {
        self.state
            .lock()
            .unwrap()
            .containers
            .iter()
            .any(|c| c.id.as_deref() == Some(id))
    }

    fn record(&self, verb: &'static str, target: &str) -> std::result::Result<(), DockerError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call {
            verb,
            target: target.to_string(),
        });
        match state.failures.get(verb) {
            Some(code) => Err(server_error(*code, verb)),
            None => Ok(()),
        }
    }

    fn next_id(&self, prefix: &str) -> String {
        let mut state = self.state.lock().unwrap();
        state.next_id += 1;
        format!("{}{:0>63}", prefix, state.next_id)
    }

    fn add_image_tag(&self, tag: &str) {
        let id = self.next_id("sha256:");
        let mut state = self.state.lock().unwrap();
        let inspect = ImageInspect {
            id: Some(id.clone()),
            repo_tags: Some(vec![tag.to_string()]),
            os: Some("linux".to_string()),
            architecture: Some("amd64".to_string()),
            ..Default::default()
        };
        state.images.push(ImageSummary {
            id,
            repo_tags: vec![tag.to_string()],
            ..Default::default()
        });
        state.image_inspects.insert(tag.to_string(), inspect);
    }
}

#[async_trait]
impl DockerClient for FakeDocker {
    async fn ping(&self) -> std::result::Result<(), DockerError> {
        self.record("ping", "")
    }

    async fn list_images(&self) -> std::result::Result<Vec<ImageSummary>, DockerError> {
        self.record("list_images", "")?;
        Ok(self.state.lock().unwrap().images.clone())
    }

    async fn inspect_image(&self, name: &str) -> std::result::Result<ImageInspect, DockerError> {
        self.record("inspect_image", name)?;
        self.state
            .lock()
            .unwrap()
            .image_inspects
            .get(name)
            .cloned()
            .ok_or_else(|| not_found(name))
    }

    async fn pull_image(
        &self,
        repository: &str,
        tag: &str,
        _auth: Option<DockerCredentials>,
    ) -> std::result::Result<(), DockerError> {
        let reference = format!("{}:{}", repository, tag);
        self.record("pull_image", &reference)?;
        self.add_image_tag(&reference);
        Ok(())
    }

    async fn load_image(&self, archive: Vec<u8>) -> std::result::Result<(), DockerError> {
        self.record("load_image", &archive.len().to_string())
    }

    async fn build_image(&self, request: BuildRequest) -> std::result::Result<(), DockerError> {
        self.record("build_image", &request.tag)?;
        self.add_image_tag(&request.tag);
        Ok(())
    }

    async fn push_image(
        &self,
        name: &str,
        tag: &str,
        auth: Option<DockerCredentials>,
    ) -> std::result::Result<(), DockerError> {
        self.record("push_image", &format!("{}:{}", name, tag))?;
        self.state
            .lock()
            .unwrap()
            .push_auth
            .push(auth.and_then(|a| a.username));
        Ok(())
    }

    async fn remove_image(&self, name: &str) -> std::result::Result<(), DockerError> {
        self.record("remove_image", name)?;
        let mut state = self.state.lock().unwrap();
        match state.image_inspects.remove(name) {
            Some(_) => Ok(()),
            None => Err(not_found(name)),
        }
    }

    async fn create_container(
        &self,
        name: &str,
        config: ContainerConfig<String>,
    ) -> std::result::Result<ContainerCreateResponse, DockerError> {
        self.record("create_container", name)?;
        let id = self.next_id("c");
        let mut state = self.state.lock().unwrap();
        state.containers.push(ContainerSummary {
            id: Some(id.clone()),
            names: Some(vec![format!("/{}", name)]),
            ..Default::default()
        });
        state.container_configs.insert(id.clone(), config);
        Ok(ContainerCreateResponse {
            id,
            warnings: Vec::new(),
        })
    }

    async fn connect_network(
        &self,
        network: &str,
        container: &str,
        aliases: Vec<String>,
    ) -> std::result::Result<(), DockerError> {
        self.record(
            "connect_network",
            &format!("{}<-{} [{}]", network, container, aliases.join(",")),
        )
    }

    async fn upload_archive(
        &self,
        container: &str,
        path: &str,
        archive: Vec<u8>,
    ) -> std::result::Result<(), DockerError> {
        self.record("upload_archive", container)?;
        self.state
            .lock()
            .unwrap()
            .uploads
            .push((container.to_string(), path.to_string(), archive));
        Ok(())
    }

    async fn start_container(&self, id: &str) -> std::result::Result<(), DockerError> {
        self.record("start_container", id)
    }

    async fn stop_container(
        &self,
        id: &str,
        timeout_secs: i64,
    ) -> std::result::Result<(), DockerError> {
        self.record("stop_container", &format!("{} t={}", id, timeout_secs))?;
        if self.has_container(id) {
            Ok(())
        } else {
            Err(not_found(id))
        }
    }

    async fn remove_container(&self, id: &str) -> std::result::Result<(), DockerError> {
        self.record("remove_container", id)?;
        let mut state = self.state.lock().unwrap();
        let before = state.containers.len();
        state.containers.retain(|c| c.id.as_deref() != Some(id));
        if state.containers.len() < before {
            Ok(())
        } else {
            Err(not_found(id))
        }
    }

    async fn inspect_container(
        &self,
        id: &str,
    ) -> std::result::Result<ContainerInspectResponse, DockerError> {
        self.record("inspect_container", id)?;
        if !self.has_container(id) {
            return Err(not_found(id));
        }
        let mut state = self.state.lock().unwrap();
        let next = if state.inspect_script.len() > 1 {
            state.inspect_script.pop_front()
        } else {
            state.inspect_script.front().cloned()
        };
        let mut response = next.unwrap_or_else(running);
        response.id = Some(id.to_string());
        Ok(response)
    }

    async fn list_containers(&self) -> std::result::Result<Vec<ContainerSummary>, DockerError> {
        self.record("list_containers", "")?;
        Ok(self.state.lock().unwrap().containers.clone())
    }

    async fn create_network(
        &self,
        options: CreateNetworkOptions<String>,
    ) -> std::result::Result<Network, DockerError> {
        self.record("create_network", &options.name)?;
        let id = self.next_id("n");
        // Like the daemon, `internal` and `options` are not echoed back here.
        let network = Network {
            id: Some(id),
            name: Some(options.name.clone()),
            driver: Some(if options.driver.is_empty() {
                "bridge".to_string()
            } else {
                options.driver.clone()
            }),
            scope: Some("local".to_string()),
            ..Default::default()
        };
        self.state
            .lock()
            .unwrap()
            .networks
            .insert(options.name, network.clone());
        Ok(network)
    }

    async fn inspect_network(&self, name: &str) -> std::result::Result<Network, DockerError> {
        self.record("inspect_network", name)?;
        let state = self.state.lock().unwrap();
        state
            .networks
            .values()
            .find(|n| n.name.as_deref() == Some(name) || n.id.as_deref() == Some(name))
            .cloned()
            .ok_or_else(|| not_found(name))
    }

    async fn remove_network(&self, name: &str) -> std::result::Result<(), DockerError> {
        self.record("remove_network", name)?;
        let mut state = self.state.lock().unwrap();
        let before = state.networks.len();
        state
            .networks
            .retain(|_, n| n.name.as_deref() != Some(name) && n.id.as_deref() != Some(name));
        if state.networks.len() < before {
            Ok(())
        } else {
            Err(not_found(name))
        }
    }

    async fn create_volume(
        &self,
        options: CreateVolumeOptions<String>,
    ) -> std::result::Result<Volume, DockerError> {
        self.record("create_volume", &options.name)?;
        let name = if options.name.is_empty() {
            let generated = self.next_id("");
            generated[generated.len() - 32..].to_string()
        } else {
            options.name.clone()
        };
        let volume = Volume {
            name: name.clone(),
            driver: if options.driver.is_empty() {
                "local".to_string()
            } else {
                options.driver.clone()
            },
            mountpoint: format!("/var/lib/docker/volumes/{}/_data", name),
            ..Default::default()
        };
        self.state
            .lock()
            .unwrap()
            .volumes
            .insert(name, volume.clone());
        Ok(volume)
    }

    async fn inspect_volume(&self, name: &str) -> std::result::Result<Volume, DockerError> {
        self.record("inspect_volume", name)?;
        self.state
            .lock()
            .unwrap()
            .volumes
            .get(name)
            .cloned()
            .ok_or_else(|| not_found(name))
    }

    async fn remove_volume(&self, name: &str) -> std::result::Result<(), DockerError> {
        self.record("remove_volume", name)?;
        match self.state.lock().unwrap().volumes.remove(name) {
            Some(_) => Ok(()),
            None => Err(not_found(name)),
        }
    }
}

/// Connector that always hands out the same fake.
pub struct FakeConnector {
    client: Arc<FakeDocker>,
    connects: AtomicUsize,
}

impl FakeConnector {
    pub fn new(client: Arc<FakeDocker>) -> Arc<Self> {
        Arc::new(Self {
            client,
            connects: AtomicUsize::new(0),
        })
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Connector for FakeConnector {
    async fn connect(&self, _connection: &ResolvedConnection) -> Result<Arc<dyn DockerClient>> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        Ok(self.client.clone())
    }
}
