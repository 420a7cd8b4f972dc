//! DNS-SD discovery of NFS exports.
//!
//! Discovery is a two-stage subscription. Browsing a service type yields one
//! [`BrowseEvent`] per advertised instance; resolving an instance yields
//! [`ResolveEvent`]s carrying the target host, port and TXT metadata. The
//! [`ServiceBrowser`] trait captures that capability so the production mDNS
//! backend and test fakes are interchangeable.
//!
//! [`ServiceDiscoverer`] subscribes exactly once and turns every resolved
//! instance into a candidate [`Mount`] sent to the reconciler.

mod mdns;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::{MountError, MountResult};
use crate::mount::Mount;

pub use mdns::MdnsBrowser;

/// DNS-SD service type advertised by NFS servers
pub const NFS_SERVICE_TYPE: &str = "_nfs._tcp";

/// TXT record key holding the export path
pub const PATH_KEY: &str = "path";

/// An advertised service instance found while browsing
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BrowseEvent {
    /// Instance name, e.g. `"Media Server"`
    pub name: String,
    /// Service type, e.g. `"_nfs._tcp"`
    pub service_type: String,
    /// Domain, e.g. `"local."`
    pub domain: String,
    /// Interface index the instance was seen on, 0 for any
    pub interface: u32,
}

/// Connection details of a resolved service instance
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResolveEvent {
    /// Host name serving the instance, e.g. `"nfs1.local."`
    pub target: String,
    pub port: u16,
    /// TXT record key-value pairs
    pub metadata: HashMap<String, String>,
}

/// Browse and resolve capability of a DNS-SD implementation
#[async_trait]
pub trait ServiceBrowser: Send + Sync {
    /// Starts browsing for instances of `service_type`
    ///
    /// The returned stream lives as long as the subscription; there is no
    /// way to cancel it.
    async fn browse(
        &self,
        service_type: &str,
    ) -> MountResult<mpsc::UnboundedReceiver<BrowseEvent>>;

    /// Resolves one browsed instance into its host, port and metadata
    async fn resolve(
        &self,
        service: &BrowseEvent,
    ) -> MountResult<mpsc::UnboundedReceiver<ResolveEvent>>;
}

/// Maps a resolved NFS service to a candidate mount
///
/// Fails with [`MountError::Discovery`] when the TXT record has no `path`.
pub fn candidate_from(event: &ResolveEvent) -> MountResult<Mount> {
    let path = event.metadata.get(PATH_KEY).ok_or_else(|| {
        MountError::Discovery(format!("{}:{} advertises no {PATH_KEY}", event.target, event.port))
    })?;
    Ok(Mount::candidate(&event.target, event.port, path))
}

/// Feeds candidate mounts from one long-lived discovery subscription
pub struct ServiceDiscoverer<B: ServiceBrowser + 'static> {
    browser: Arc<B>,
    service_type: String,
}

impl<B: ServiceBrowser + 'static> ServiceDiscoverer<B> {
    pub fn new(browser: Arc<B>) -> Self {
        ServiceDiscoverer { browser, service_type: NFS_SERVICE_TYPE.to_string() }
    }

    /// Browses a service type other than `_nfs._tcp`
    pub fn with_service_type<S: AsRef<str>>(mut self, service_type: S) -> Self {
        self.service_type = service_type.as_ref().to_string();
        self
    }

    /// Subscribes and forwards every resolved instance as a candidate
    ///
    /// Consumes the discoverer, so one discoverer yields exactly one browse
    /// subscription. Each browsed instance is resolved once on its own task.
    /// Discovery errors are logged and never stop the subscription.
    ///
    /// # Arguments
    ///
    /// * `candidates` - Channel drained by the reconciler
    pub fn spawn(self, candidates: mpsc::UnboundedSender<Mount>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut services = match self.browser.browse(&self.service_type).await {
                Ok(services) => services,
                Err(e) => {
                    warn!("Cannot browse for {} services: {}", self.service_type, e);
                    return;
                }
            };
            info!("Browsing for {} services", self.service_type);

            while let Some(service) = services.recv().await {
                debug!("Found {} {:?} in {}", service.service_type, service.name, service.domain);
                let browser = self.browser.clone();
                let candidates = candidates.clone();
                tokio::spawn(async move {
                    resolve_service(browser.as_ref(), service, candidates).await;
                });
            }
            warn!("Browse subscription for {} ended", self.service_type);
        })
    }
}

async fn resolve_service<B: ServiceBrowser>(
    browser: &B,
    service: BrowseEvent,
    candidates: mpsc::UnboundedSender<Mount>,
) {
    let mut resolved = match browser.resolve(&service).await {
        Ok(resolved) => resolved,
        Err(e) => {
            warn!("Cannot resolve {:?}: {}", service.name, e);
            return;
        }
    };

    while let Some(event) = resolved.recv().await {
        match candidate_from(&event) {
            Ok(mount) => {
                debug!("Resolved {:?} to {}", service.name, mount);
                if candidates.send(mount).is_err() {
                    debug!("Reconciler is gone, dropping resolve of {:?}", service.name);
                    return;
                }
            }
            Err(e) => warn!("Ignoring {:?}: {}", service.name, e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mount::MountOrigin;

    #[test]
    fn resolve_event_becomes_candidate() {
        let event = ResolveEvent {
            target: "nfs1.local.".to_string(),
            port: 2049,
            metadata: HashMap::from([(PATH_KEY.to_string(), "/export/data".to_string())]),
        };
        let mount = candidate_from(&event).unwrap();
        assert_eq!(mount.server(), "nfs1");
        assert_eq!(mount.port(), 2049);
        assert_eq!(mount.path(), "/export/data");
        assert_eq!(mount.origin(), MountOrigin::Candidate);
    }

    #[test]
    fn missing_path_is_a_discovery_error() {
        let event = ResolveEvent {
            target: "nfs1.local.".to_string(),
            port: 2049,
            metadata: HashMap::new(),
        };
        assert!(matches!(candidate_from(&event), Err(MountError::Discovery(_))));
    }
}
