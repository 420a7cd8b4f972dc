//! Mount point allocation under a fixed root directory.
//!
//! The allocator names a mount point after the last segment of the export
//! path. If that name is taken, it appends `" (1)"`, `" (2)"`, ... until a
//! free name turns up or the attempt ceiling is reached.

use std::path::PathBuf;

use tracing::debug;

use crate::error::{MountError, MountResult};
use crate::fs_util::exists_no_traverse;
use crate::mount::Mount;

/// Default directory under which discovered exports are mounted
pub const DEFAULT_MOUNT_ROOT: &str = "/Volumes";

/// Number of names probed before giving up
pub const MAX_ALLOCATION_ATTEMPTS: usize = 10;

/// Derives non-colliding local directories for remote exports
#[derive(Clone, Debug)]
pub struct MountPointAllocator {
    root: PathBuf,
}

impl MountPointAllocator {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        MountPointAllocator { root: root.into() }
    }

    /// Returns the mount point for `mount`, allocating it on first use
    ///
    /// The first successful result is stored on the mount and returned again
    /// on every later call without touching the filesystem. Callers creating
    /// the directory later must still expect it to have appeared meanwhile.
    ///
    /// # Arguments
    ///
    /// * `mount` - The mount to allocate a directory for
    ///
    /// # Returns
    ///
    /// The allocated path, or [`MountError::AllocationExhausted`] when every
    /// probed name was taken. Nothing is cached on failure.
    pub fn allocate(&self, mount: &mut Mount) -> MountResult<PathBuf> {
        if let Some(mount_point) = mount.mount_point() {
            return Ok(mount_point.to_path_buf());
        }

        let base = self.root.join(Self::leaf_name(mount));
        let base_name = base.as_os_str().to_string_lossy().into_owned();
        for attempt in 0..MAX_ALLOCATION_ATTEMPTS {
            let probe = match attempt {
                0 => base.clone(),
                n => PathBuf::from(format!("{base_name} ({n})")),
            };
            if !exists_no_traverse(&probe) {
                debug!("Allocated mount point {} for {}", probe.display(), mount.source_spec());
                mount.set_mount_point(probe.clone());
                return Ok(probe);
            }
            debug!("Mount point {} is taken", probe.display());
        }

        debug!("Every mount point name for {} is taken", mount.source_spec());
        Err(MountError::AllocationExhausted { base, attempts: MAX_ALLOCATION_ATTEMPTS })
    }

    /// Last non-empty segment of the export path, or the server for `/`
    fn leaf_name(mount: &Mount) -> &str {
        mount.path().rsplit('/').find(|segment| !segment.is_empty()).unwrap_or(mount.server())
    }
}
