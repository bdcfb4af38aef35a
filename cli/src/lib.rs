//! # dockrs Library Root
//!
//! File: cli/src/lib.rs
//!
//! ## Overview
//!
//! Declarative reconcilers for Docker images, containers, networks and volumes.
//! A host hands each operation a resource spec (plus the identity of a
//! previously created resource) and gets back an observed state:
//!
//! ```no_run
//! use dockrs::core::config::load_config;
//! use dockrs::resources::{volume, Provider};
//!
//! # async fn run() -> dockrs::core::error::Result<()> {
//! let provider = Provider::from_config(&load_config(None)?);
//! let spec = volume::VolumeSpec {
//!     name: Some("pgdata".to_string()),
//!     ..Default::default()
//! };
//! let state = volume::create(&provider, &spec).await?;
//! assert!(volume::exists(&provider, &spec, &state.name).await?);
//! # Ok(())
//! # }
//! ```
//!
//! Modules:
//! - `core`: configuration and the error taxonomy
//! - `common`: connection resolution, the Docker client facade, request
//!   translation, set hashing and archives
//! - `resources`: the reconcilers and their shared `Provider`
//! - `commands`: the `dockrs` command groups
//!
pub mod commands;
pub mod common;
pub mod core;
pub mod resources;
