//! Daemon wiring: logging, discovery subscription and the reconciliation loop.

use std::io;
use std::path::Path;
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{error, info};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::EnvFilter;

use crate::allocator::MountPointAllocator;
use crate::config::Config;
use crate::discovery::{MdnsBrowser, ServiceBrowser, ServiceDiscoverer};
use crate::error::MountResult;
use crate::operator::{MountOperator, SystemMountOperator};
use crate::reconciler::MountReconciler;

/// Installs the global tracing subscriber
///
/// In debug mode everything down to DEBUG goes to stdout. Otherwise INFO and
/// above are appended to the configured log file through a non-blocking
/// writer. `RUST_LOG` overrides the level in both cases.
///
/// # Returns
///
/// The guard flushing the file writer; it must live until the process exits.
pub fn init_tracing(config: &Config) -> io::Result<Option<WorkerGuard>> {
    let level = if config.debug { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    if config.debug {
        tracing_subscriber::fmt().with_env_filter(filter).with_writer(io::stdout).init();
        return Ok(None);
    }

    let (dir, file_name) = split_log_path(&config.log_file)?;
    std::fs::create_dir_all(dir)?;
    let appender = RollingFileAppender::builder()
        .rotation(Rotation::NEVER)
        .filename_prefix(file_name)
        .build(dir)
        .map_err(io::Error::other)?;
    let (writer, guard) = tracing_appender::non_blocking(appender);
    tracing_subscriber::fmt().with_env_filter(filter).with_ansi(false).with_writer(writer).init();
    Ok(Some(guard))
}

fn split_log_path(path: &Path) -> io::Result<(&Path, &str)> {
    let file_name = path.file_name().and_then(|name| name.to_str()).ok_or_else(|| {
        io::Error::new(io::ErrorKind::InvalidInput, format!("bad log file {}", path.display()))
    })?;
    let dir = path.parent().filter(|dir| !dir.as_os_str().is_empty()).unwrap_or(Path::new("."));
    Ok((dir, file_name))
}

/// Discovery plus reconciliation, run until a fatal error
pub struct Daemon<O: MountOperator + 'static, B: ServiceBrowser + 'static> {
    config: Config,
    operator: Arc<O>,
    browser: Arc<B>,
}

impl Daemon<SystemMountOperator, MdnsBrowser> {
    /// A daemon using the system `mount` binary and multicast DNS
    pub fn system(config: Config) -> MountResult<Self> {
        Ok(Daemon::new(config, Arc::new(SystemMountOperator::new()), Arc::new(MdnsBrowser::new()?)))
    }
}

impl<O: MountOperator + 'static, B: ServiceBrowser + 'static> Daemon<O, B> {
    pub fn new(config: Config, operator: Arc<O>, browser: Arc<B>) -> Self {
        Daemon { config, operator, browser }
    }

    /// Subscribes to discovery once and reconciles forever
    ///
    /// Any error escaping the loop is logged here and returned; nothing is
    /// restarted.
    pub async fn run(self) -> MountResult<()> {
        info!("Started");
        let result = self.run_inner().await;
        if let Err(e) = &result {
            error!("{}", e);
        }
        info!("Stopped");
        result
    }

    async fn run_inner(self) -> MountResult<()> {
        tokio::fs::create_dir_all(&self.config.mount_root).await?;

        let (sender, receiver) = mpsc::unbounded_channel();
        let discovery = ServiceDiscoverer::new(self.browser)
            .with_service_type(&self.config.service_type)
            .spawn(sender);

        let result =
            MountReconciler::new(self.operator, MountPointAllocator::new(&self.config.mount_root))
                .with_mount_options(&self.config.mount_options)
                .with_interval(self.config.interval)
                .run(receiver)
                .await;
        discovery.abort();
        result
    }
}
