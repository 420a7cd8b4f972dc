#![allow(dead_code)]
use std::collections::HashMap;
use std::io::{self, Write};
use std::os::unix::process::ExitStatusExt;
use std::path::{Path, PathBuf};
use std::process::ExitStatus;
use std::sync::atomic::{AtomicI32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::subscriber::DefaultGuard;

use bonjour_nfs::discovery::{BrowseEvent, ResolveEvent, ServiceBrowser, PATH_KEY};
use bonjour_nfs::mount::Mount;
use bonjour_nfs::operator::{parse_mount_table, MountOperator};
use bonjour_nfs::{MountError, MountResult};

/// One recorded invocation of [`MountOperator::mount`]
#[derive(Clone, Debug)]
pub struct MountCall {
    pub source: String,
    pub mount_point: PathBuf,
    pub options: String,
    /// Whether the mount point directory existed when mount was called
    pub dir_existed: bool,
}

/// In-memory mount table; successful mounts show up in later listings
#[derive(Default)]
pub struct FakeOperator {
    table: Mutex<Vec<Mount>>,
    mount_calls: Mutex<Vec<MountCall>>,
    list_calls: AtomicUsize,
    /// Listing fails once this many listings have succeeded
    fail_listing_after: Mutex<Option<usize>>,
    exit_code: AtomicI32,
}

impl FakeOperator {
    pub fn new() -> Self {
        FakeOperator::default()
    }

    /// Seeds the table from `mount -t nfs` style text
    pub fn with_table(self, table: &str) -> Self {
        *self.table.lock().unwrap() = parse_mount_table(table);
        self
    }

    pub fn failing_mounts_with(self, exit_code: i32) -> Self {
        self.exit_code.store(exit_code, Ordering::SeqCst);
        self
    }

    pub fn failing_listing_after(self, successful_listings: usize) -> Self {
        *self.fail_listing_after.lock().unwrap() = Some(successful_listings);
        self
    }

    pub fn set_table(&self, table: &str) {
        *self.table.lock().unwrap() = parse_mount_table(table);
    }

    pub fn mount_calls(&self) -> Vec<MountCall> {
        self.mount_calls.lock().unwrap().clone()
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MountOperator for FakeOperator {
    async fn list_active_mounts(&self) -> MountResult<Vec<Mount>> {
        let done = self.list_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(limit) = *self.fail_listing_after.lock().unwrap() {
            if done >= limit {
                return Err(MountError::MountTableQuery("mount: permission denied".to_string()));
            }
        }
        Ok(self.table.lock().unwrap().clone())
    }

    async fn mount(
        &self,
        source: &str,
        mount_point: &Path,
        options: &str,
    ) -> io::Result<ExitStatus> {
        self.mount_calls.lock().unwrap().push(MountCall {
            source: source.to_string(),
            mount_point: mount_point.to_path_buf(),
            options: options.to_string(),
            dir_existed: mount_point.is_dir(),
        });
        let code = self.exit_code.load(Ordering::SeqCst);
        if code == 0 {
            if let Some((server, path)) = source.split_once(':') {
                self.table.lock().unwrap().push(Mount::observed(server, path));
            }
        }
        Ok(ExitStatus::from_raw(code << 8))
    }
}

/// Scripted DNS-SD: every browse replays the configured services
#[derive(Default)]
pub struct FakeBrowser {
    services: Mutex<Vec<(BrowseEvent, Vec<ResolveEvent>)>>,
    browse_calls: AtomicUsize,
    /// Keeps the browse stream open like a live subscription
    browse_sender: Mutex<Option<mpsc::UnboundedSender<BrowseEvent>>>,
}

pub fn browse_event(name: &str) -> BrowseEvent {
    BrowseEvent {
        name: name.to_string(),
        service_type: "_nfs._tcp".to_string(),
        domain: "local.".to_string(),
        interface: 0,
    }
}

pub fn nfs_resolve(target: &str, port: u16, path: Option<&str>) -> ResolveEvent {
    let mut metadata = HashMap::new();
    if let Some(path) = path {
        metadata.insert(PATH_KEY.to_string(), path.to_string());
    }
    ResolveEvent { target: target.to_string(), port, metadata }
}

impl FakeBrowser {
    pub fn new() -> Self {
        FakeBrowser::default()
    }

    pub fn with_service(self, name: &str, resolved: Vec<ResolveEvent>) -> Self {
        self.services.lock().unwrap().push((browse_event(name), resolved));
        self
    }

    pub fn browse_calls(&self) -> usize {
        self.browse_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ServiceBrowser for FakeBrowser {
    async fn browse(
        &self,
        _service_type: &str,
    ) -> MountResult<mpsc::UnboundedReceiver<BrowseEvent>> {
        self.browse_calls.fetch_add(1, Ordering::SeqCst);
        let (sender, receiver) = mpsc::unbounded_channel();
        for (event, _) in self.services.lock().unwrap().iter() {
            let _ = sender.send(event.clone());
        }
        *self.browse_sender.lock().unwrap() = Some(sender);
        Ok(receiver)
    }

    async fn resolve(
        &self,
        service: &BrowseEvent,
    ) -> MountResult<mpsc::UnboundedReceiver<ResolveEvent>> {
        let (sender, receiver) = mpsc::unbounded_channel();
        let services = self.services.lock().unwrap();
        let (_, resolved) = services
            .iter()
            .find(|(event, _)| event.name == service.name)
            .ok_or_else(|| MountError::Discovery(format!("unknown service {}", service.name)))?;
        for event in resolved {
            let _ = sender.send(event.clone());
        }
        Ok(receiver)
    }
}

/// Log lines captured from the current thread's tracing dispatcher
#[derive(Clone, Default)]
pub struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

struct CaptureWriter(Arc<Mutex<Vec<u8>>>);

impl Write for CaptureWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl CapturedLogs {
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }

    pub fn lines_at(&self, level: &str) -> Vec<String> {
        self.text().lines().filter(|line| line.contains(level)).map(str::to_string).collect()
    }
}

/// Routes this thread's tracing output into a buffer until the guard drops
pub fn capture_logs() -> (CapturedLogs, DefaultGuard) {
    let logs = CapturedLogs::default();
    let buffer = logs.0.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_ansi(false)
        .with_writer(move || CaptureWriter(buffer.clone()))
        .finish();
    (logs, tracing::subscriber::set_default(subscriber))
}
