//! # dockrs Common Utilities (`common`)
//!
//! File: cli/src/common/mod.rs
//!
//! ## Overview
//!
//! Shared building blocks used by every reconciler:
//!
//! - **`archive`**: in-memory TAR archives (build contexts, file uploads).
//! - **`convert`**: pure translations from declarative fields to `bollard` request shapes.
//! - **`docker`**: connection resolution and the runtime client facade.
//! - **`elements`**: the set-element records collected by resource specs.
//! - **`hash`**: canonical serialization and set-hashing for unordered records.
//!
pub mod archive;
pub mod convert;
pub mod docker;
pub mod elements;
pub mod hash;
