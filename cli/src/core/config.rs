//! # dockrs Configuration System
//!
//! File: cli/src/core/config.rs
//!
//! ## Overview
//!
//! This module builds the provider-wide **base connection configuration**: the
//! daemon endpoint, the logical host identity, TLS material (inline PEM, explicit
//! files or a certificate directory) and the "ping on connect" flag. It also
//! carries the convergence-wait settings used by the container reconciler.
//!
//! The base configuration is constructed once per process and is read-only
//! afterwards. Per-resource overrides are merged on top of it by
//! `common::docker::connect::resolve`, which never mutates it.
//!
//! ## Architecture
//!
//! Sources, lowest to highest precedence:
//! 1. Built-in defaults (`unix:///var/run/docker.sock`, machine name `default`)
//! 2. Environment (`DOCKER_HOST`, `DOCKER_MACHINE_NAME`, `DOCKER_CERT_PATH`,
//!    `DOCKER_CA_MATERIAL`, `DOCKER_CERT_MATERIAL`, `DOCKER_KEY_MATERIAL`)
//! 3. User file `<config dir>/dockrs/config.toml`
//! 4. Project file `.dockrs.toml` in the current directory or an ancestor
//!    (the search stops at a `.git` directory)
//! 5. An explicit `--config FILE`
//!
//! Each layer only overrides the fields it actually sets. Paths go through
//! `~` expansion before validation.
//!
//! ## Examples
//!
//! ```toml
//! [provider]
//! host = "tcp://10.0.0.5:2376"
//! machine_name = "build-box"
//! cert_path = "~/.docker/machine/certs"
//! ping = true
//!
//! [convergence]
//! attempts = 30
//! interval_ms = 500
//! ```
//!
use crate::core::error::{DockrsError, Result};
use anyhow::{anyhow, Context};
use directories::ProjectDirs;
use serde::Deserialize;
use std::fmt;
use std::{
    fs,
    path::{Path, PathBuf},
};
use tracing::{debug, info, warn};

/// Default daemon endpoint when nothing else is configured.
pub const DEFAULT_DOCKER_HOST: &str = "unix:///var/run/docker.sock";
/// Default host identity, matching docker-machine's default machine.
pub const DEFAULT_MACHINE_NAME: &str = "default";

const PROJECT_CONFIG_FILENAME: &str = ".dockrs.toml";

/// Top-level configuration file structure.
#[derive(Deserialize, Debug, Default, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub provider: ConnectionConfig,
    #[serde(default)]
    pub convergence: ConvergenceConfig,
}

/// Provider-wide connection settings.
///
/// Every field is optional so that layers can be overlaid; resolution into a
/// usable endpoint happens in `common::docker::connect`.
#[derive(Deserialize, Default, Clone, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ConnectionConfig {
    /// Docker daemon address (`unix://`, `tcp://`, `http://` or `https://`).
    pub host: Option<String>,
    /// Logical host identity, used for the `{cert_path}/{machine_name}` convention.
    pub machine_name: Option<String>,
    /// Root of the certificate directory convention.
    pub cert_path: Option<PathBuf>,
    /// PEM-encoded CA certificate.
    pub ca_material: Option<String>,
    /// PEM-encoded client certificate.
    pub cert_material: Option<String>,
    /// PEM-encoded client private key.
    pub key_material: Option<String>,
    pub ca_file: Option<PathBuf>,
    pub cert_file: Option<PathBuf>,
    pub key_file: Option<PathBuf>,
    /// Ping the daemon right after connecting. Unset layers inherit the value
    /// below them; unset everywhere means no ping.
    pub ping: Option<bool>,
}

// Material is secret: only report whether it is set.
impl fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionConfig")
            .field("host", &self.host)
            .field("machine_name", &self.machine_name)
            .field("cert_path", &self.cert_path)
            .field("ca_material", &self.ca_material.as_ref().map(|_| "<set>"))
            .field("cert_material", &self.cert_material.as_ref().map(|_| "<set>"))
            .field("key_material", &self.key_material.as_ref().map(|_| "<redacted>"))
            .field("ca_file", &self.ca_file)
            .field("cert_file", &self.cert_file)
            .field("key_file", &self.key_file)
            .field("ping", &self.ping)
            .finish()
    }
}

impl ConnectionConfig {
    /// Built-in defaults: local socket and the `default` machine.
    pub fn with_defaults() -> Self {
        ConnectionConfig {
            host: Some(DEFAULT_DOCKER_HOST.to_string()),
            machine_name: Some(DEFAULT_MACHINE_NAME.to_string()),
            ..Default::default()
        }
    }

    /// Returns `self` with every field that `layer` sets replaced.
    pub fn overlay(self, layer: ConnectionConfig) -> Self {
        ConnectionConfig {
            host: layer.host.or(self.host),
            machine_name: layer.machine_name.or(self.machine_name),
            cert_path: layer.cert_path.or(self.cert_path),
            ca_material: layer.ca_material.or(self.ca_material),
            cert_material: layer.cert_material.or(self.cert_material),
            key_material: layer.key_material.or(self.key_material),
            ca_file: layer.ca_file.or(self.ca_file),
            cert_file: layer.cert_file.or(self.cert_file),
            key_file: layer.key_file.or(self.key_file),
            ping: layer.ping.or(self.ping),
        }
    }

    /// Reads the Docker environment variables through `lookup`.
    ///
    /// Empty values are treated as unset.
    pub fn from_env_with<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.is_empty());
        ConnectionConfig {
            host: get("DOCKER_HOST"),
            machine_name: get("DOCKER_MACHINE_NAME"),
            cert_path: get("DOCKER_CERT_PATH").map(PathBuf::from),
            ca_material: get("DOCKER_CA_MATERIAL"),
            cert_material: get("DOCKER_CERT_MATERIAL"),
            key_material: get("DOCKER_KEY_MATERIAL"),
            ..Default::default()
        }
    }
}

/// Convergence-wait settings for freshly created containers.
#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ConvergenceConfig {
    #[serde(default = "default_attempts")]
    pub attempts: u32,
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
}

impl Default for ConvergenceConfig {
    fn default() -> Self {
        ConvergenceConfig {
            attempts: default_attempts(),
            interval_ms: default_interval_ms(),
        }
    }
}

fn default_attempts() -> u32 {
    30
}
fn default_interval_ms() -> u64 {
    500
}

/// Partially-specified file layer; only the fields present in the file apply.
#[derive(Deserialize, Debug, Default)]
#[serde(deny_unknown_fields)]
struct ConfigFile {
    #[serde(default)]
    provider: ConnectionConfig,
    convergence: Option<ConvergenceConfig>,
}

/// Loads the effective configuration from defaults, environment and files.
///
/// `explicit` is the `--config` path; unlike the discovered files it must exist.
pub fn load_config(explicit: Option<&Path>) -> Result<Config> {
    let mut files = Vec::new();
    if let Some(user) = user_config_path() {
        if user.is_file() {
            files.push(user);
        } else {
            debug!("User configuration file not found at {}", user.display());
        }
    }
    if let Some(project) = find_project_config_path()? {
        files.push(project);
    }
    if let Some(path) = explicit {
        if !path.is_file() {
            return Err(anyhow!(DockrsError::Config(format!(
                "Configuration file '{}' does not exist.",
                path.display()
            ))));
        }
        files.push(path.to_path_buf());
    }
    load_config_with(|key| std::env::var(key).ok(), &files)
}

/// Builds the configuration from an environment lookup and an ordered list of
/// files (later files win).
pub fn load_config_with<F>(lookup: F, files: &[PathBuf]) -> Result<Config>
where
    F: Fn(&str) -> Option<String>,
{
    let mut config = Config {
        provider: ConnectionConfig::with_defaults().overlay(ConnectionConfig::from_env_with(lookup)),
        convergence: ConvergenceConfig::default(),
    };
    for path in files {
        info!("Loading configuration from: {}", path.display());
        let layer = load_config_file(path)?;
        config.provider = config.provider.overlay(layer.provider);
        if let Some(convergence) = layer.convergence {
            config.convergence = convergence;
        }
    }
    expand_config_paths(&mut config);
    validate_config(&config).context("Configuration validation failed")?;
    debug!("Final loaded configuration: {:?}", config);
    Ok(config)
}

fn user_config_path() -> Option<PathBuf> {
    match ProjectDirs::from("io", "dockrs", "dockrs") {
        Some(dirs) => Some(dirs.config_dir().join("config.toml")),
        None => {
            warn!("Could not determine user config directory.");
            None
        }
    }
}

fn find_project_config_path() -> Result<Option<PathBuf>> {
    let current_dir = std::env::current_dir().context("Failed to get current directory")?;
    let mut path: &Path = &current_dir;
    loop {
        let project_config = path.join(PROJECT_CONFIG_FILENAME);
        if project_config.is_file() {
            return Ok(Some(project_config));
        }
        if path.join(".git").is_dir() {
            debug!(
                "Found .git directory at {}, stopping project config search.",
                path.display()
            );
            return Ok(None);
        }
        match path.parent() {
            Some(parent) => path = parent,
            None => return Ok(None),
        }
    }
}

fn load_config_file(path: &Path) -> Result<ConfigFile> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read configuration file: {}", path.display()))?;
    toml::from_str(&content)
        .with_context(|| format!("Failed to parse TOML from file: {}", path.display()))
}

/// Expands `~` in a configured path.
pub fn expand_path(path: &Path) -> PathBuf {
    PathBuf::from(shellexpand::tilde(&path.to_string_lossy()).into_owned())
}

fn expand_config_paths(config: &mut Config) {
    let provider = &mut config.provider;
    for slot in [
        &mut provider.cert_path,
        &mut provider.ca_file,
        &mut provider.cert_file,
        &mut provider.key_file,
    ] {
        if let Some(path) = slot.as_mut() {
            *path = expand_path(path);
        }
    }
}

/// Checks the endpoint scheme and the convergence settings.
pub fn validate_config(config: &Config) -> Result<()> {
    if let Some(host) = &config.provider.host {
        validate_host(host)?;
    }
    if config.convergence.attempts == 0 {
        return Err(anyhow!(DockrsError::Config(
            "convergence.attempts must be at least 1".to_string()
        )));
    }
    Ok(())
}

/// Accepts the endpoint schemes the connector knows how to open.
pub fn validate_host(host: &str) -> Result<()> {
    const SCHEMES: [&str; 4] = ["unix://", "tcp://", "http://", "https://"];
    if SCHEMES.iter().any(|scheme| host.starts_with(scheme)) {
        Ok(())
    } else {
        Err(anyhow!(DockrsError::Config(format!(
            "Unsupported Docker host '{}'. Expected one of unix://, tcp://, http://, https://.",
            host
        ))))
    }
}
