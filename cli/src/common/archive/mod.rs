//! # dockrs Archive Utilities (`common::archive`)
//!
//! File: cli/src/common/archive/mod.rs
//!
//! ## Overview
//!
//! In-memory archives sent to the daemon:
//!
//! - **`tar`**: gzipped build contexts for image builds and single-file
//!   archives for container file uploads.
//!
pub mod tar;
