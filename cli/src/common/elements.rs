//! # dockrs Set-Element Records (`common::elements`)
//!
//! File: cli/src/common/elements.rs
//!
//! ## Overview
//!
//! The structured records that resource specs collect in unordered sets, plus
//! registry credentials. They are plain data: each one knows its canonical
//! form (`SetElement`) and nothing about the daemon. `common::convert` maps
//! them to request shapes; the reconcilers in `resources` re-export them next
//! to the specs that use them.
//!
use crate::common::hash::{push_field, push_optional, push_sorted_map, push_sorted_set, SetElement};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// A published or exposed port.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct PortMapping {
    pub internal: u16,
    pub external: Option<u16>,
    /// Host interface to bind; all interfaces when absent.
    pub ip: Option<String>,
    #[serde(default = "default_protocol")]
    pub protocol: String,
}

fn default_protocol() -> String {
    "tcp".to_string()
}

impl SetElement for PortMapping {
    fn write_canonical(&self, buf: &mut String) {
        push_field(buf, self.internal);
        push_optional(buf, self.external);
        push_optional(buf, self.ip.as_deref());
        push_field(buf, &self.protocol);
    }
}

/// One volume entry: a bind (named volume or host path), an anonymous volume,
/// or all volumes of another container.
#[derive(Deserialize, Serialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct VolumeMount {
    pub from_container: Option<String>,
    pub container_path: Option<String>,
    pub host_path: Option<String>,
    pub volume_name: Option<String>,
    #[serde(default)]
    pub read_only: bool,
}

impl SetElement for VolumeMount {
    fn write_canonical(&self, buf: &mut String) {
        push_optional(buf, self.from_container.as_deref());
        push_optional(buf, self.container_path.as_deref());
        push_optional(buf, self.host_path.as_deref());
        push_optional(buf, self.volume_name.as_deref());
        push_field(buf, self.read_only);
    }
}

/// An `/etc/hosts` entry.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct HostEntry {
    pub host: String,
    pub ip: String,
}

impl SetElement for HostEntry {
    fn write_canonical(&self, buf: &mut String) {
        push_field(buf, &self.ip);
        push_field(buf, &self.host);
    }
}

/// Kernel capabilities to add and drop.
#[derive(Deserialize, Serialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct Capabilities {
    #[serde(default)]
    pub add: BTreeSet<String>,
    #[serde(default)]
    pub drop: BTreeSet<String>,
}

impl SetElement for Capabilities {
    fn write_canonical(&self, buf: &mut String) {
        push_sorted_set(buf, &self.add);
        push_sorted_set(buf, &self.drop);
    }
}

/// Attachment to a user-defined network.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct NetworkAttachment {
    pub name: String,
    /// Falls back to the container-wide `network_alias` set when empty.
    #[serde(default)]
    pub aliases: BTreeSet<String>,
}

impl SetElement for NetworkAttachment {
    fn write_canonical(&self, buf: &mut String) {
        push_field(buf, &self.name);
        push_sorted_set(buf, &self.aliases);
    }
}

/// A file written into the container before it starts.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct FileUpload {
    pub content: String,
    /// Absolute destination path inside the container.
    pub file: String,
}

impl SetElement for FileUpload {
    fn write_canonical(&self, buf: &mut String) {
        push_field(buf, &self.content);
        push_field(buf, &self.file);
    }
}

/// One IPAM address block.
#[derive(Deserialize, Serialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct IpamBlock {
    pub subnet: Option<String>,
    pub ip_range: Option<String>,
    pub gateway: Option<String>,
    #[serde(default)]
    pub aux_address: BTreeMap<String, String>,
}

impl SetElement for IpamBlock {
    fn write_canonical(&self, buf: &mut String) {
        push_optional(buf, self.subnet.as_deref());
        push_optional(buf, self.ip_range.as_deref());
        push_optional(buf, self.gateway.as_deref());
        push_sorted_map(buf, &self.aux_address);
    }
}

/// Credentials for one registry.
#[derive(Deserialize, Serialize, Clone, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct RegistryAuth {
    pub registry: String,
    pub username: String,
    #[serde(default)]
    pub password: Option<String>,
}

impl fmt::Debug for RegistryAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegistryAuth")
            .field("registry", &self.registry)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}
