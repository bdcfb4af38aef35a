//! # dockrs Docker Module Interface
//!
//! File: cli/src/common/docker/mod.rs
//!
//! ## Overview
//!
//! Everything that sits between a reconciler and the Docker daemon:
//!
//! - **`connect`**: the Connection Resolver. Merges provider-wide settings with
//!   per-resource overrides and loads TLS material into a `ResolvedConnection`.
//! - **`client`**: the `DockerClient` trait (primitive verbs per object kind), its
//!   `bollard` implementation and the `Connector` that opens it.
//! - **`fake`** (tests only): an in-memory recording implementation of
//!   `DockerClient`.
//!
pub mod client;
pub mod connect;
#[cfg(test)]
pub mod fake;

pub use client::{is_not_found, BollardConnector, Connector, DockerClient};
pub use connect::{resolve, ConnectionOverrides, Resolution, ResolvedConnection};
