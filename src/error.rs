//! Error taxonomy shared by the mount table reader, the allocator, the
//! discovery adapter and the reconciler.
//!
//! Only [`MountError::MountTableQuery`] is allowed to escape the reconciliation
//! loop. Every other variant is contained to the candidate that caused it and
//! reported through the log.

use std::io;
use std::path::PathBuf;
use std::process::ExitStatus;

use thiserror::Error;

/// Result alias used throughout the crate
pub type MountResult<T> = Result<T, MountError>;

/// Errors raised while discovering, allocating and mounting NFS exports
#[derive(Debug, Error)]
pub enum MountError {
    /// The OS mount table could not be listed. Fatal to the control loop.
    #[error("in list_active_mounts: {0}")]
    MountTableQuery(String),

    /// No free mount point was found under the root after the attempt ceiling
    #[error("no free mount point for {} after {} attempts", .base.display(), .attempts)]
    AllocationExhausted { base: PathBuf, attempts: usize },

    /// The mount point directory could not be created
    #[error("failed to create mount point {}: {}", .path.display(), .source)]
    DirectoryCreate {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The mount command ran and reported failure
    #[error("mount of {} at {} failed with {}", .source_spec, .mount_point.display(), .status)]
    OsMount { source_spec: String, mount_point: PathBuf, status: ExitStatus },

    /// Browse or resolve failed, or a resolved service was unusable
    #[error("discovery error: {0}")]
    Discovery(String),

    #[error(transparent)]
    Io(#[from] io::Error),
}
