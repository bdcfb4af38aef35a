//! # dockrs TAR Archive Operations (`common::archive::tar`)
//!
//! File: cli/src/common/archive/tar.rs
//!
//! ## Overview
//!
//! In-memory TAR archives for the two places the daemon wants one:
//!
//! - **Build contexts** (`create_context_tar`): the contents of a local directory,
//!   gzipped, sent as the body of an image build.
//! - **File uploads** (`single_file_tar`): one regular file with fixed permission
//!   bits and an exact size header, extracted at the container root before the
//!   container is started.
//!
//! ## Architecture
//!
//! Both use the `tar` crate's `Builder`; contexts are wrapped in a `flate2`
//! gzip encoder. Paths inside the archive are relative: the `tar` crate refuses
//! absolute entry names, so an upload destination `/etc/app.conf` is stored as
//! `etc/app.conf` and the archive is extracted at `/`.
//!
//! ```rust
//! use dockrs::common::archive::tar;
//!
//! let bytes = tar::single_file_tar("/etc/motd", b"hello\n").unwrap();
//! assert!(!bytes.is_empty());
//! ```
//!
use crate::core::error::{DockrsError, Result};
use anyhow::{anyhow, Context};
use std::path::Path;

/// Permission bits of uploaded files.
pub const UPLOAD_FILE_MODE: u32 = 0o644;

/// Creates a gzipped TAR archive of everything under `context_path`.
///
/// Entries are relative to `context_path`, so `context_path/src/main.rs`
/// appears as `src/main.rs`.
///
/// # Errors
///
/// Fails if the directory cannot be walked or the archive cannot be finalized.
pub fn create_context_tar(context_path: &Path) -> Result<Vec<u8>> {
    let mut tar_gz_bytes = Vec::new();
    let enc = flate2::write::GzEncoder::new(&mut tar_gz_bytes, flate2::Compression::default());
    let mut tar_builder = tar::Builder::new(enc);

    tar_builder
        .append_dir_all(".", context_path)
        .with_context(|| {
            format!(
                "Failed to add directory '{}' contents to the tar archive",
                context_path.display()
            )
        })?;

    let encoder = tar_builder
        .into_inner()
        .context("Failed to finalize tar archive structure")?;
    encoder
        .finish()
        .context("Failed to finish gzip compression stream")?;

    Ok(tar_gz_bytes)
}

/// Builds an uncompressed archive holding one file at `destination`.
///
/// `destination` is an absolute path inside the container. The entry is
/// written relative to `/` with mode `0644` and a size header equal to
/// `content.len()`.
pub fn single_file_tar(destination: &str, content: &[u8]) -> Result<Vec<u8>> {
    let relative = destination.trim_start_matches('/');
    if relative.is_empty() || relative.ends_with('/') {
        return Err(anyhow!(DockrsError::Validation(format!(
            "upload destination '{}' is not a file path",
            destination
        ))));
    }

    let mut header = tar::Header::new_gnu();
    header.set_size(content.len() as u64);
    header.set_mode(UPLOAD_FILE_MODE);
    header.set_entry_type(tar::EntryType::Regular);

    let mut builder = tar::Builder::new(Vec::new());
    builder
        .append_data(&mut header, relative, content)
        .with_context(|| format!("Failed to archive upload for '{}'", destination))?;
    builder
        .into_inner()
        .with_context(|| format!("Failed to finalize upload archive for '{}'", destination))
}
