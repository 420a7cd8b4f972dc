//! Mount records and the reconciler's active mount set.
//!
//! A [`Mount`] describes one remote NFS export. It is either observed in the
//! OS mount table or produced as a candidate by service discovery. Two mounts
//! refer to the same export when their normalized server names and export
//! paths match case-insensitively. The port never takes part in the
//! comparison: the mount table does not report it, so observed mounts carry
//! [`UNKNOWN_PORT`].

use std::fmt;
use std::path::{Path, PathBuf};

/// Port recorded for mounts parsed from the mount table
pub const UNKNOWN_PORT: i32 = -1;

const LOCAL_DOMAIN_SUFFIX: &str = ".local";

/// Where a [`Mount`] record came from
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MountOrigin {
    /// Parsed from the OS mount table
    Observed,
    /// Built from a discovery resolve event
    Candidate,
}

/// One remote NFS export
#[derive(Clone, Debug)]
pub struct Mount {
    server: String,
    port: i32,
    path: String,
    origin: MountOrigin,
    /// Set once by the allocator and never recomputed
    mount_point: Option<PathBuf>,
}

/// Strips one trailing `.` and then a `.local` suffix from a host name
///
/// `"nfs1.local."` becomes `"nfs1"`. The suffix match ignores ASCII case so
/// that `"NAS.LOCAL."` normalizes to `"NAS"`.
pub fn normalize_server(host: &str) -> String {
    let host = host.strip_suffix('.').unwrap_or(host);
    let cut = host.len().saturating_sub(LOCAL_DOMAIN_SUFFIX.len());
    match host.get(cut..) {
        Some(tail) if cut > 0 && tail.eq_ignore_ascii_case(LOCAL_DOMAIN_SUFFIX) => {
            host[..cut].to_string()
        }
        _ => host.to_string(),
    }
}

impl Mount {
    /// Creates a mount record, normalizing the server name
    pub fn new(server: &str, port: i32, path: &str, origin: MountOrigin) -> Self {
        Mount {
            server: normalize_server(server),
            port,
            path: path.to_string(),
            origin,
            mount_point: None,
        }
    }

    /// A mount seen in the OS mount table; its port is unknown
    pub fn observed(server: &str, path: &str) -> Self {
        Mount::new(server, UNKNOWN_PORT, path, MountOrigin::Observed)
    }

    /// A mount offered by service discovery
    pub fn candidate(server: &str, port: u16, path: &str) -> Self {
        Mount::new(server, i32::from(port), path, MountOrigin::Candidate)
    }

    pub fn server(&self) -> &str {
        &self.server
    }

    pub fn port(&self) -> i32 {
        self.port
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn origin(&self) -> MountOrigin {
        self.origin
    }

    /// The memoized mount point, if one has been allocated
    pub fn mount_point(&self) -> Option<&Path> {
        self.mount_point.as_deref()
    }

    /// Records the allocated mount point. Only the first call has an effect.
    pub(crate) fn set_mount_point(&mut self, mount_point: PathBuf) {
        self.mount_point.get_or_insert(mount_point);
    }

    /// `server:path`, the source argument of the mount command
    pub fn source_spec(&self) -> String {
        format!("{}:{}", self.server, self.path)
    }
}

impl PartialEq for Mount {
    fn eq(&self, other: &Self) -> bool {
        self.server.to_lowercase() == other.server.to_lowercase()
            && self.path.to_lowercase() == other.path.to_lowercase()
    }
}

impl Eq for Mount {}

impl fmt::Display for Mount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "nfs://{}:{}{}", self.server, self.port, self.path)?;
        match &self.mount_point {
            Some(mount_point) => write!(f, " at {}", mount_point.display()),
            None => Ok(()),
        }
    }
}

/// The set of mounts the reconciler currently considers active
///
/// Membership uses [`Mount`]'s case-insensitive equality, so this is kept as
/// an ordered vector with a linear scan instead of a hashed set.
#[derive(Clone, Debug, Default)]
pub struct ActiveMounts {
    mounts: Vec<Mount>,
}

impl ActiveMounts {
    pub fn new() -> Self {
        ActiveMounts::default()
    }

    /// Replaces the whole set with a fresh mount table snapshot
    pub fn replace(&mut self, mounts: Vec<Mount>) {
        self.mounts = mounts;
    }

    pub fn contains(&self, mount: &Mount) -> bool {
        self.mounts.iter().any(|active| active == mount)
    }

    /// Adds a mount unless an equal one is already tracked
    ///
    /// # Returns
    ///
    /// `true` if the mount was added
    pub fn insert(&mut self, mount: Mount) -> bool {
        if self.contains(&mount) {
            return false;
        }
        self.mounts.push(mount);
        true
    }

    pub fn len(&self) -> usize {
        self.mounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mounts.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Mount> {
        self.mounts.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_trailing_dot_and_local_domain() {
        assert_eq!(normalize_server("nfs1.local."), "nfs1");
        assert_eq!(normalize_server("nfs1.local"), "nfs1");
        assert_eq!(normalize_server("NAS.LOCAL."), "NAS");
        assert_eq!(normalize_server("host1"), "host1");
        assert_eq!(normalize_server("files.example.com."), "files.example.com");
        assert_eq!(normalize_server(".local"), ".local");
    }

    #[test]
    fn equality_ignores_case_and_port() {
        let observed = Mount::observed("NFS1", "/Export/Data");
        let candidate = Mount::candidate("nfs1.local.", 2049, "/export/data");
        assert_eq!(observed, candidate);
        assert_ne!(observed.port(), candidate.port());

        let other_path = Mount::candidate("nfs1.local.", 2049, "/export/other");
        assert_ne!(observed, other_path);
        let other_server = Mount::candidate("nfs2.local.", 2049, "/export/data");
        assert_ne!(observed, other_server);
    }

    #[test]
    fn active_set_skips_equal_entries() {
        let mut active = ActiveMounts::new();
        assert!(active.insert(Mount::observed("host1", "/export/foo")));
        assert!(!active.insert(Mount::candidate("HOST1.local.", 2049, "/EXPORT/FOO")));
        assert_eq!(active.len(), 1);

        active.replace(Vec::new());
        assert!(active.is_empty());
    }

    #[test]
    fn mount_point_is_set_once() {
        let mut mount = Mount::candidate("nfs1.local.", 2049, "/export/data");
        assert!(mount.mount_point().is_none());
        mount.set_mount_point(PathBuf::from("/Volumes/data"));
        mount.set_mount_point(PathBuf::from("/Volumes/other"));
        assert_eq!(mount.mount_point(), Some(Path::new("/Volumes/data")));
        assert_eq!(mount.to_string(), "nfs://nfs1:2049/export/data at /Volumes/data");
    }
}
