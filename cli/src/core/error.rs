//! # dockrs Error Types
//!
//! File: cli/src/core/error.rs
//!
//! ## Overview
//!
//! This module defines the error taxonomy shared by every reconciler. The
//! split mirrors how the host is expected to react:
//!
//! - **Configuration errors** (`Config`, `Validation`, `IncompleteTls`) are fatal
//!   and never retried.
//! - **Deferred** means the provider is not configured enough to act yet. Callers
//!   such as `exists` turn it into a clean negative.
//! - **Not-found** variants are normally absorbed by the reconcilers (a vanished
//!   resource is "absent", not an error) and only escape where absence is itself
//!   a failure, e.g. a container whose source image is missing.
//! - **Runtime errors** (`DockerApi`, `DockerOperation`) wrap failures reported by
//!   the daemon or its progress streams.
//! - **Convergence errors** (`ExitedAfterCreate`, `FailedToRun`) are raised after the
//!   half-realized container has been cleaned up.
//! - **`PartiallyCreated`** carries the ID of a container that exists on the daemon
//!   even though its create operation failed later on, so the host can still
//!   record the identity.
//!
//! ## Usage
//!
//! ```rust
//! use dockrs::core::error::{DockrsError, Result};
//! use anyhow::anyhow;
//!
//! fn check(name: &str) -> Result<()> {
//!     if name.is_empty() {
//!         return Err(anyhow!(DockrsError::Validation("name must not be empty".into())));
//!     }
//!     Ok(())
//! }
//!
//! let err = check("").unwrap_err();
//! assert!(matches!(
//!     err.downcast_ref::<DockrsError>(),
//!     Some(DockrsError::Validation(_))
//! ));
//! ```
//!
use thiserror::Error;

/// Custom error type for dockrs.
#[derive(Error, Debug)]
pub enum DockrsError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid resource specification: {0}")]
    Validation(String),

    #[error("Incomplete TLS configuration: missing {missing}")]
    IncompleteTls { missing: String },

    #[error("Provider configuration is not complete yet: {0}")]
    Deferred(String),

    #[error("Filesystem error: {0}")]
    FileSystem(String),

    #[error("Docker API interaction failed: {source}")]
    DockerApi {
        #[from]
        source: bollard::errors::Error,
    },

    #[error("Docker operation failed: {0}")]
    DockerOperation(String),

    #[error("Image '{name}' not found.")]
    ImageNotFound { name: String },

    #[error("Container {id} exited after creation, error was: {error}")]
    ExitedAfterCreate { id: String, error: String },

    #[error("Container {id} failed to be in running state")]
    FailedToRun { id: String },

    #[error("Container {id} was created but could not be set up: {reason}")]
    PartiallyCreated { id: String, reason: String },
}

impl DockrsError {
    /// The ID of a container left on the daemon by a failed create, if any.
    pub fn partially_created_id(&self) -> Option<&str> {
        match self {
            DockrsError::PartiallyCreated { id, .. } => Some(id),
            _ => None,
        }
    }
}

/// Type alias for Result using anyhow::Error for broad compatibility.
pub type Result<T> = anyhow::Result<T>;
