//! Access to the OS mount table and the `mount` command.
//!
//! [`MountOperator`] is the seam between the reconciler and the operating
//! system. [`SystemMountOperator`] shells out to `mount`; tests substitute a
//! fake that records calls instead of mounting anything.

use std::ffi::OsString;
use std::io;
use std::path::Path;
use std::process::{ExitStatus, Output, Stdio};

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, trace};

use crate::error::{MountError, MountResult};
use crate::mount::Mount;

/// Filesystem type passed to `mount -t`
pub const NFS_FS_TYPE: &str = "nfs";

/// Fixed options used for every NFS mount: reserved source port, UDP
/// transport, 16 KiB read/write buffers and client-local locking
pub const DEFAULT_MOUNT_OPTIONS: &str = "resvport,udp,rwsize=16384,locallock";

/// Parses the output of `mount -t nfs` into observed mounts
///
/// The first whitespace-delimited field of each line is `server:path`, split
/// at the first `:`. Lines whose first field has no `:` are skipped.
pub fn parse_mount_table(output: &str) -> Vec<Mount> {
    output.lines().filter_map(parse_mount_line).collect()
}

fn parse_mount_line(line: &str) -> Option<Mount> {
    let server_path = line.split_whitespace().next()?;
    match server_path.split_once(':') {
        Some((server, path)) => {
            let mount = Mount::observed(server, path);
            trace!("Active mount {}", mount);
            Some(mount)
        }
        None => {
            debug!("Ignoring mount table line without server:path: {:?}", line);
            None
        }
    }
}

/// Builds the `-o` argument of the mount command
pub fn mount_option_string(options: &str, port: i32) -> String {
    if options.is_empty() {
        format!("port={port}")
    } else {
        format!("{options},port={port}")
    }
}

/// Operations the reconciler needs from the operating system
#[async_trait]
pub trait MountOperator: Send + Sync {
    /// Lists the NFS mounts currently active on this host
    ///
    /// Fails with [`MountError::MountTableQuery`] when the table cannot be
    /// read. That failure is fatal to the reconciliation loop.
    async fn list_active_mounts(&self) -> MountResult<Vec<Mount>>;

    /// Mounts `source` (`server:path`) at `mount_point`
    ///
    /// # Arguments
    ///
    /// * `source` - Remote export as `server:path`
    /// * `mount_point` - Existing local directory
    /// * `options` - Complete option string, including `port=`
    ///
    /// # Returns
    ///
    /// The exit status of the mount invocation. Only a failure to run the
    /// command at all is reported as an error.
    async fn mount(
        &self,
        source: &str,
        mount_point: &Path,
        options: &str,
    ) -> io::Result<ExitStatus>;
}

/// [`MountOperator`] backed by the system `mount` binary
#[derive(Clone, Debug, Default)]
pub struct SystemMountOperator;

impl SystemMountOperator {
    pub fn new() -> Self {
        SystemMountOperator
    }
}

fn first_line(bytes: &[u8]) -> Option<String> {
    let text = String::from_utf8_lossy(bytes);
    text.lines().map(str::trim).find(|line| !line.is_empty()).map(str::to_string)
}

/// Explains a failed `mount -t nfs` listing: first stderr line, else first
/// stdout line, else the exit status
fn listing_diagnostic(output: &Output) -> String {
    first_line(&output.stderr)
        .or_else(|| first_line(&output.stdout))
        .unwrap_or_else(|| format!("mount exited with {}", output.status))
}

/// Arguments of the mount invocation
///
/// `source` comes straight from the network, so option parsing is ended
/// before it.
fn mount_args(source: &str, mount_point: &Path, options: &str) -> Vec<OsString> {
    vec![
        "-t".into(),
        NFS_FS_TYPE.into(),
        "-o".into(),
        options.into(),
        "--".into(),
        source.into(),
        mount_point.as_os_str().to_os_string(),
    ]
}

#[async_trait]
impl MountOperator for SystemMountOperator {
    async fn list_active_mounts(&self) -> MountResult<Vec<Mount>> {
        let output = Command::new("mount")
            .arg("-t")
            .arg(NFS_FS_TYPE)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| MountError::MountTableQuery(format!("cannot run mount: {e}")))?;

        if !output.status.success() {
            return Err(MountError::MountTableQuery(listing_diagnostic(&output)));
        }

        Ok(parse_mount_table(&String::from_utf8_lossy(&output.stdout)))
    }

    async fn mount(
        &self,
        source: &str,
        mount_point: &Path,
        options: &str,
    ) -> io::Result<ExitStatus> {
        debug!(
            "mount -t {} -o {} -- '{}' '{}'",
            NFS_FS_TYPE,
            options,
            source,
            mount_point.display()
        );
        Command::new("mount")
            .args(mount_args(source, mount_point, options))
            .stdin(Stdio::null())
            .status()
            .await
    }
}
