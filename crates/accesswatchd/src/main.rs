//! accesswatchd - streaming HTTP access-log monitor.
//!
//! Tails a Common Log Format access log, aggregates periodic traffic
//! metrics, and raises sliding-window high-traffic alerts to the terminal.

use tikv_jemallocator::Jemalloc;
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

mod display;

use std::fs::File;
use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::sync_channel;
use std::time::Duration;

use clap::Parser;
use tracing::{Level, error, info};
use tracing_subscriber::EnvFilter;

use accesswatch_core::monitor::Config;
use accesswatch_core::Monitor;

/// Streaming HTTP access-log monitor.
#[derive(Parser)]
#[command(name = "accesswatchd", about = "Streaming HTTP access-log monitor", version)]
struct Args {
    /// Log file path.
    #[arg(long, default_value = "access.log")]
    path: String,

    /// Frequency at which the file is read, in milliseconds.
    #[arg(long, default_value = "1000")]
    read_frequency: u64,

    /// Frequency at which metrics are displayed, in seconds.
    #[arg(long, default_value = "10")]
    metrics_frequency: u64,

    /// Sliding window for alerting, in seconds.
    #[arg(long, default_value = "120")]
    traffic_window: u64,

    /// Threshold on summed response size over the traffic window, in bytes.
    #[arg(long, default_value = "250")]
    threshold: i64,

    /// Number of buffers kept in the buffer pool.
    #[arg(long, default_value = "20")]
    buffer_pool_size: usize,

    /// Size of each pooled read buffer, in bytes.
    #[arg(long, default_value_t = 1024 * 1024)]
    buffer_size: usize,

    /// Number of entries kept in the entry pool.
    #[arg(long, default_value = "12000000")]
    entry_pool_size: usize,

    /// Delay before each tick's read, to let late-arriving bytes land, in
    /// milliseconds.
    #[arg(long, default_value = "0")]
    delay: u64,

    /// Increase logging verbosity (-v for debug, -vv for trace).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Quiet mode - only show errors.
    #[arg(short, long)]
    quiet: bool,
}

fn init_logging(verbose: u8, quiet: bool) {
    let level = if quiet {
        Level::ERROR
    } else {
        match verbose {
            0 => Level::INFO,
            1 => Level::DEBUG,
            _ => Level::TRACE,
        }
    };

    let filter = EnvFilter::from_default_env()
        .add_directive(format!("accesswatchd={level}").parse().unwrap())
        .add_directive(format!("accesswatch_core={level}").parse().unwrap());

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

impl Args {
    fn into_config(self) -> Config {
        Config {
            read_frequency: Duration::from_millis(self.read_frequency),
            metrics_frequency: Duration::from_secs(self.metrics_frequency),
            traffic_window: Duration::from_secs(self.traffic_window),
            threshold: self.threshold,
            buffer_pool_size: self.buffer_pool_size,
            buffer_size: self.buffer_size,
            entry_pool_size: self.entry_pool_size,
            delay: Duration::from_millis(self.delay),
        }
    }
}

fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(args.verbose, args.quiet);

    let path = args.path.clone();
    let config = args.into_config();

    let monitor = match Monitor::new(config) {
        Ok(monitor) => monitor,
        Err(err) => {
            error!("invalid configuration: {err}");
            return ExitCode::FAILURE;
        }
    };

    let file = match File::open(&path) {
        Ok(file) => file,
        Err(err) => {
            error!("failed to open {path}: {err}");
            return ExitCode::FAILURE;
        }
    };

    let (alerts_tx, alerts_rx) = sync_channel(0);
    let (metrics_tx, metrics_rx) = sync_channel(0);

    let display_handle =
        std::thread::spawn(move || display::run(std::io::stdout(), alerts_rx, metrics_rx));

    let running = Arc::new(AtomicBool::new(true));
    let shutdown_flag = running.clone();
    if let Err(err) = ctrlc::set_handler(move || {
        info!("received shutdown signal");
        shutdown_flag.store(false, Ordering::SeqCst);
    }) {
        tracing::warn!("failed to install Ctrl-C handler: {err}");
    }

    info!("accesswatchd starting, tailing {path}");
    let result = monitor.run(file, alerts_tx, metrics_tx, running);
    let _ = display_handle.join();

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("pipeline read error: {err}");
            ExitCode::FAILURE
        }
    }
}
