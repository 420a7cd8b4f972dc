//! Runtime settings of the daemon.

use std::path::PathBuf;
use std::time::Duration;

use crate::allocator::DEFAULT_MOUNT_ROOT;
use crate::discovery::NFS_SERVICE_TYPE;
use crate::operator::DEFAULT_MOUNT_OPTIONS;
use crate::reconciler::DEFAULT_TICK_INTERVAL;

/// Log file used when the daemon is not running in debug mode
pub const DEFAULT_LOG_FILE: &str = "/Library/Logs/bonjour-nfs.log";

/// Settings for [`crate::daemon::Daemon`]
#[derive(Clone, Debug)]
pub struct Config {
    /// Directory under which mount points are created
    pub mount_root: PathBuf,
    /// Delay between mount table refreshes
    pub interval: Duration,
    /// DNS-SD service type to browse
    pub service_type: String,
    /// Options passed to `mount -o`, without the port
    pub mount_options: String,
    /// Where logs go when not in debug mode
    pub log_file: PathBuf,
    /// Log at debug level to stdout
    pub debug: bool,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            mount_root: PathBuf::from(DEFAULT_MOUNT_ROOT),
            interval: DEFAULT_TICK_INTERVAL,
            service_type: NFS_SERVICE_TYPE.to_string(),
            mount_options: DEFAULT_MOUNT_OPTIONS.to_string(),
            log_file: PathBuf::from(DEFAULT_LOG_FILE),
            debug: false,
        }
    }
}

impl Config {
    pub fn with_mount_root(mut self, mount_root: impl Into<PathBuf>) -> Self {
        self.mount_root = mount_root.into();
        self
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_log_file(mut self, log_file: impl Into<PathBuf>) -> Self {
        self.log_file = log_file.into();
        self
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }
}
