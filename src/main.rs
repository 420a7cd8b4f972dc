use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing::warn;

use bonjour_nfs::config::{Config, DEFAULT_LOG_FILE};
use bonjour_nfs::daemon::{init_tracing, Daemon};

const NICE_LEVEL: i32 = 19;

/// Mounts NFS exports advertised over Bonjour / DNS-SD
#[derive(Parser, Debug)]
#[command(author, version, long_about = None)]
struct Args {
    /// Log debug output to stdout (implies --foreground)
    #[arg(short, long)]
    debug: bool,

    /// Stay attached to the terminal; logs still go to the log file
    #[arg(short, long)]
    foreground: bool,

    /// Log file used without --debug
    #[arg(long, default_value = DEFAULT_LOG_FILE)]
    log_file: PathBuf,

    /// Directory under which exports are mounted
    #[arg(long, default_value = bonjour_nfs::allocator::DEFAULT_MOUNT_ROOT)]
    mount_root: PathBuf,

    /// Seconds between mount table refreshes
    #[arg(long, default_value_t = 15, value_parser = clap::value_parser!(u64).range(1..))]
    interval: u64,
}

fn is_root() -> bool {
    // SAFETY: geteuid has no preconditions and cannot fail.
    unsafe { libc::geteuid() == 0 }
}

fn lower_priority() {
    // SAFETY: plain syscall on the calling process.
    let rc = unsafe { libc::setpriority(libc::PRIO_PROCESS, 0, NICE_LEVEL) };
    if rc != 0 {
        warn!("Could not lower process priority: {}", std::io::Error::last_os_error());
    }
}

async fn run(args: Args) -> anyhow::Result<()> {
    let config = Config::default()
        .with_debug(args.debug)
        .with_log_file(args.log_file)
        .with_mount_root(args.mount_root)
        .with_interval(Duration::from_secs(args.interval));

    let _guard = init_tracing(&config)
        .with_context(|| format!("cannot open log file {}", config.log_file.display()))?;
    if !args.debug && !args.foreground {
        warn!("Running in the foreground; use the service manager to run in the background");
    }
    lower_priority();

    Daemon::system(config)?.run().await?;
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    if !is_root() {
        eprintln!("bonjour-nfs needs root privileges");
        return ExitCode::FAILURE;
    }

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("bonjour-nfs: {e:#}");
            ExitCode::FAILURE
        }
    }
}
