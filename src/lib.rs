//! bonjour-nfs - automatic mounting of NFS exports advertised over DNS-SD
//!
//! NFS servers announce their exports as `_nfs._tcp` services with the export
//! path in a `path` TXT record. This library browses for those services and
//! mounts every export that is not mounted yet, under a fresh directory of
//! the mount root (`/Volumes` by default).
//!
//! ## Main Components
//!
//! - `mount`: The `Mount` record and the active mount set. Mounts compare equal
//!   by server and export path, ignoring case and port.
//!
//! - `allocator`: Picks a free mount point directory, appending ` (n)` on
//!   collisions.
//!
//! - `operator`: The `MountOperator` trait that reads the OS mount table and
//!   runs `mount`, with a system implementation that shells out.
//!
//! - `discovery`: The `ServiceBrowser` trait, its multicast DNS backend, and
//!   the `ServiceDiscoverer` turning resolved services into candidates.
//!
//! - `reconciler`: The control loop. It refreshes the active set from the
//!   mount table on every tick and mounts new candidates in between, rolling
//!   back the mount point directory on failure.
//!
//! - `daemon`: Wires configuration, logging, discovery and the reconciler.
//!
//! ## Usage
//!
//! Build a `Config`, call `daemon::init_tracing`, then run
//! `Daemon::system(config)?.run().await`. The future only resolves when the
//! mount table can no longer be read.

pub mod allocator;
pub mod config;
pub mod daemon;
pub mod discovery;
pub mod error;
pub mod fs_util;
pub mod mount;
pub mod operator;
pub mod reconciler;

pub use error::{MountError, MountResult};
