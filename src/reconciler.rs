//! The reconciliation loop.
//!
//! [`MountReconciler`] owns the active mount set and is the single consumer of
//! the candidate channel fed by discovery. Ticks and candidates are
//! multiplexed on one task, so refreshing the set from the mount table,
//! checking a candidate against it, allocating a mount point, creating its
//! directory and mounting all happen strictly one after another.
//!
//! A candidate goes through
//! `Discovered -> Allocating -> DirectoryCreated -> Mounted`, or is rolled
//! back and dropped. Dropped candidates are only reconsidered when discovery
//! delivers them again.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::allocator::MountPointAllocator;
use crate::error::{MountError, MountResult};
use crate::fs_util;
use crate::mount::{ActiveMounts, Mount};
use crate::operator::{mount_option_string, MountOperator, DEFAULT_MOUNT_OPTIONS};

/// Default delay between two mount table refreshes
pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_secs(15);

/// What happened to one discovery candidate
#[derive(Debug)]
pub enum CandidateOutcome {
    /// An equal mount is already active; nothing was touched
    AlreadyActive,
    /// Mounted at the given path and added to the active set
    Mounted(PathBuf),
    /// Dropped before a directory was created
    Skipped(MountError),
    /// Directory created, mount failed, directory removed again
    RolledBack(MountError),
}

/// Keeps discovered NFS exports mounted
pub struct MountReconciler<O: MountOperator> {
    operator: Arc<O>,
    allocator: MountPointAllocator,
    active: ActiveMounts,
    mount_options: String,
    interval: Duration,
}

impl<O: MountOperator> MountReconciler<O> {
    pub fn new(operator: Arc<O>, allocator: MountPointAllocator) -> Self {
        MountReconciler {
            operator,
            allocator,
            active: ActiveMounts::new(),
            mount_options: DEFAULT_MOUNT_OPTIONS.to_string(),
            interval: DEFAULT_TICK_INTERVAL,
        }
    }

    /// Sets the option string passed to every mount, without `port=`
    pub fn with_mount_options<S: AsRef<str>>(mut self, options: S) -> Self {
        self.mount_options = options.as_ref().to_string();
        self
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn active_mounts(&self) -> &ActiveMounts {
        &self.active
    }

    /// Replaces the active set with the current OS mount table
    ///
    /// Mounts that disappeared from the table stop being tracked; mounts made
    /// by someone else start being tracked.
    pub async fn refresh(&mut self) -> MountResult<()> {
        let mounts = self.operator.list_active_mounts().await?;
        debug!("Mount table lists {} NFS mounts", mounts.len());
        self.active.replace(mounts);
        Ok(())
    }

    /// Mounts one candidate unless an equal mount is already active
    ///
    /// Errors are contained: they are logged and reported in the outcome.
    pub async fn reconcile(&mut self, mut candidate: Mount) -> CandidateOutcome {
        if self.active.contains(&candidate) {
            debug!("{} is already mounted", candidate);
            return CandidateOutcome::AlreadyActive;
        }

        let mount_point = match self.allocator.allocate(&mut candidate) {
            Ok(mount_point) => mount_point,
            Err(e) => {
                error!("Skipping discovered NFS service {}: {}", candidate, e);
                return CandidateOutcome::Skipped(e);
            }
        };

        if let Err(source) = fs_util::create_mount_point(&mount_point).await {
            let e = MountError::DirectoryCreate { path: mount_point, source };
            error!("Skipping discovered NFS service {}: {}", candidate, e);
            return CandidateOutcome::Skipped(e);
        }

        let source_spec = candidate.source_spec();
        let options = mount_option_string(&self.mount_options, candidate.port());
        let failure = match self.operator.mount(&source_spec, &mount_point, &options).await {
            Ok(status) if status.success() => {
                info!("Successfully mounted discovered NFS service {}", candidate);
                self.active.insert(candidate);
                return CandidateOutcome::Mounted(mount_point);
            }
            Ok(status) => {
                MountError::OsMount { source_spec, mount_point: mount_point.clone(), status }
            }
            Err(e) => MountError::Io(e),
        };

        error!("Failed to mount discovered NFS service {}: {}", candidate, failure);
        if let Err(e) = fs_util::remove_mount_point(&mount_point).await {
            warn!("Could not remove mount point {}: {}", mount_point.display(), e);
        }
        CandidateOutcome::RolledBack(failure)
    }

    /// Runs the loop until the mount table cannot be read
    ///
    /// The first tick fires immediately so the active set is populated before
    /// any candidate is looked at. When all candidate senders are gone the
    /// loop keeps refreshing.
    ///
    /// # Returns
    ///
    /// Only ever returns the fatal [`MountError::MountTableQuery`].
    pub async fn run(mut self, mut candidates: mpsc::UnboundedReceiver<Mount>) -> MountResult<()> {
        let mut ticker = time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut discovering = true;

        loop {
            tokio::select! {
                biased;
                _ = ticker.tick() => {
                    self.refresh().await?;
                }
                candidate = candidates.recv(), if discovering => match candidate {
                    Some(candidate) => {
                        self.reconcile(candidate).await;
                    }
                    None => {
                        warn!("Discovery stopped delivering candidates");
                        discovering = false;
                    }
                },
            }
        }
    }
}
