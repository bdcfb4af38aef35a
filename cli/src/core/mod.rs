//! # dockrs Core Infrastructure
//!
//! File: cli/src/core/mod.rs
//!
//! ## Overview
//!
//! Foundational pieces shared by every reconciler and by the CLI host:
//! - `config`: provider configuration loading, layering and validation
//! - `error`: the `DockrsError` taxonomy and the crate-wide `Result` alias
//!
//! ```rust
//! use dockrs::core::config; // For loading configuration
//! use dockrs::core::error::{DockrsError, Result}; // For error handling
//! ```
//!
pub mod config;
pub mod error;
