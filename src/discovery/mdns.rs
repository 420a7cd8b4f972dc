//! [`ServiceBrowser`] backed by the `mdns-sd` multicast DNS daemon.
//!
//! `mdns-sd` browses and resolves in one go: a single event stream carries
//! `ServiceFound` for new instances and `ServiceResolved` once their SRV, TXT
//! and address records are in. A reader task forwards found instances as
//! [`BrowseEvent`]s and files resolved instances by full name, where
//! [`MdnsBrowser::resolve`] picks them up. A resolution that arrives before
//! anyone asked for it is cached and replayed. `ServiceRemoved` forgets the
//! instance and closes its resolve stream.
//!
//! The mDNS daemon thread is shut down when the browser is dropped.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use mdns_sd::{ServiceDaemon, ServiceEvent, ServiceInfo};
use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

use super::{BrowseEvent, ResolveEvent, ServiceBrowser};
use crate::error::{MountError, MountResult};

const DEFAULT_DOMAIN: &str = "local.";

/// Resolved instances and the resolve subscription of each, keyed by full name
///
/// An instance has at most one subscriber. Subscribing again replaces the
/// previous subscription, whose stream then ends.
#[derive(Default)]
struct ResolveTable {
    resolved: HashMap<String, ResolveEvent>,
    waiting: HashMap<String, mpsc::UnboundedSender<ResolveEvent>>,
}

impl ResolveTable {
    fn publish(&mut self, fullname: &str, event: ResolveEvent) {
        if let Some(sender) = self.waiting.get(fullname) {
            if sender.send(event.clone()).is_err() {
                self.waiting.remove(fullname);
            }
        }
        self.resolved.insert(fullname.to_string(), event);
    }

    fn subscribe(&mut self, fullname: &str) -> mpsc::UnboundedReceiver<ResolveEvent> {
        let (sender, receiver) = mpsc::unbounded_channel();
        if let Some(event) = self.resolved.get(fullname) {
            let _ = sender.send(event.clone());
        }
        self.waiting.insert(fullname.to_string(), sender);
        receiver
    }

    fn remove(&mut self, fullname: &str) {
        self.resolved.remove(fullname);
        self.waiting.remove(fullname);
    }
}

/// Multicast DNS service browser
pub struct MdnsBrowser {
    daemon: ServiceDaemon,
    table: Arc<Mutex<ResolveTable>>,
}

impl MdnsBrowser {
    /// Starts the mDNS daemon thread
    pub fn new() -> MountResult<Self> {
        let daemon = ServiceDaemon::new()
            .map_err(|e| MountError::Discovery(format!("cannot start mDNS daemon: {e}")))?;
        Ok(MdnsBrowser { daemon, table: Arc::new(Mutex::new(ResolveTable::default())) })
    }
}

impl Drop for MdnsBrowser {
    fn drop(&mut self) {
        if let Err(e) = self.daemon.shutdown() {
            debug!("mDNS daemon already stopped: {}", e);
        }
    }
}

/// `"_nfs._tcp.local."` into `("_nfs._tcp", "local.")`
fn split_type_domain(ty_domain: &str) -> (String, String) {
    let mut labels = ty_domain.splitn(3, '.');
    match (labels.next(), labels.next(), labels.next()) {
        (Some(service), Some(proto), Some(domain)) if !domain.is_empty() => {
            (format!("{service}.{proto}"), domain.to_string())
        }
        _ => (ty_domain.trim_end_matches('.').to_string(), DEFAULT_DOMAIN.to_string()),
    }
}

fn browse_event(ty_domain: &str, fullname: &str) -> BrowseEvent {
    let (service_type, domain) = split_type_domain(ty_domain);
    let name = fullname
        .strip_suffix(ty_domain)
        .map(|name| name.trim_end_matches('.'))
        .unwrap_or(fullname)
        .to_string();
    BrowseEvent { name, service_type, domain, interface: 0 }
}

fn resolve_event(info: &ServiceInfo) -> ResolveEvent {
    let metadata = info
        .get_properties()
        .iter()
        .map(|property| (property.key().to_string(), property.val_str().to_string()))
        .collect();
    ResolveEvent { target: info.get_hostname().to_string(), port: info.get_port(), metadata }
}

fn fullname(service: &BrowseEvent) -> String {
    format!("{}.{}.{}", service.name, service.service_type, service.domain)
}

#[async_trait]
impl ServiceBrowser for MdnsBrowser {
    async fn browse(
        &self,
        service_type: &str,
    ) -> MountResult<mpsc::UnboundedReceiver<BrowseEvent>> {
        let ty_domain = format!("{}.{}", service_type.trim_end_matches('.'), DEFAULT_DOMAIN);
        let events = self
            .daemon
            .browse(&ty_domain)
            .map_err(|e| MountError::Discovery(format!("cannot browse {ty_domain}: {e}")))?;

        let (sender, receiver) = mpsc::unbounded_channel();
        let table = self.table.clone();
        tokio::spawn(async move {
            while let Ok(event) = events.recv_async().await {
                match event {
                    ServiceEvent::ServiceFound(ty_domain, fullname) => {
                        if sender.send(browse_event(&ty_domain, &fullname)).is_err() {
                            debug!("Browse receiver dropped, stopping mDNS reader");
                            break;
                        }
                    }
                    ServiceEvent::ServiceResolved(info) => {
                        let event = resolve_event(&info);
                        match table.lock() {
                            Ok(mut table) => table.publish(info.get_fullname(), event),
                            Err(_) => {
                                warn!("Resolve table poisoned, stopping mDNS reader");
                                break;
                            }
                        }
                    }
                    ServiceEvent::ServiceRemoved(_, fullname) => {
                        debug!("{} is gone", fullname);
                        match table.lock() {
                            Ok(mut table) => table.remove(&fullname),
                            Err(_) => {
                                warn!("Resolve table poisoned, stopping mDNS reader");
                                break;
                            }
                        }
                    }
                    other => trace!("Ignoring mDNS event {:?}", other),
                }
            }
            debug!("mDNS browse stream closed");
        });
        Ok(receiver)
    }

    async fn resolve(
        &self,
        service: &BrowseEvent,
    ) -> MountResult<mpsc::UnboundedReceiver<ResolveEvent>> {
        let mut table = self
            .table
            .lock()
            .map_err(|_| MountError::Discovery("resolve table poisoned".to_string()))?;
        Ok(table.subscribe(&fullname(service)))
    }
}
