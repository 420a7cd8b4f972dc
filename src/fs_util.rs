//! Filesystem helpers for managing mount point directories.
//!
//! This module contains functions for:
//! - Checking whether a mount point path is taken without traversing symlinks
//! - Creating and removing the mount point directory of a single candidate

use std::io;
use std::path::Path;

use tokio::fs;
use tracing::debug;

/// Checks if a path exists without traversing symlinks
///
/// A dangling symlink or a stale mount still occupies its name under the
/// mount root, so it counts as existing.
///
/// # Arguments
///
/// * `path` - The path to check
///
/// # Returns
///
/// `true` if the path exists (as a file, directory, or symlink), `false` otherwise
pub fn exists_no_traverse(path: &Path) -> bool {
    path.symlink_metadata().is_ok()
}

/// Creates a single mount point directory
///
/// The parent is expected to exist already. Fails with
/// [`io::ErrorKind::AlreadyExists`] if something appeared at `path` since it
/// was allocated.
pub async fn create_mount_point(path: &Path) -> io::Result<()> {
    debug!("Creating mount point {}", path.display());
    fs::create_dir(path).await
}

/// Removes an empty mount point directory left behind by a failed mount
pub async fn remove_mount_point(path: &Path) -> io::Result<()> {
    debug!("Removing mount point {}", path.display());
    fs::remove_dir(path).await
}
