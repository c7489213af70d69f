//! Wall-clock-aligned tick loop tying the pipeline, queue, alerter, and
//! metrics aggregator together (C6).

use std::io::Read;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::SyncSender;
use std::time::{Duration as StdDuration, SystemTime, UNIX_EPOCH};

use chrono::{DateTime, Duration as ChronoDuration, FixedOffset, Utc};

use crate::error::{ConfigError, TailError};
use crate::metrics::Metrics;
use crate::pipeline;
use crate::pool::{BufferPool, EntryPool};
use crate::queue::EntryQueue;
use crate::window::{Alert, Window};

/// Runtime settings for one monitor instance. Validated once via
/// [`Config::validate`] before the tick loop starts.
#[derive(Debug, Clone)]
pub struct Config {
    pub read_frequency: StdDuration,
    pub metrics_frequency: StdDuration,
    pub traffic_window: StdDuration,
    pub threshold: i64,
    pub buffer_pool_size: usize,
    pub buffer_size: usize,
    pub entry_pool_size: usize,
    pub delay: StdDuration,
}

impl Config {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.read_frequency.is_zero()
            || self.metrics_frequency.as_nanos() % self.read_frequency.as_nanos() != 0
        {
            return Err(ConfigError::MetricsFrequencyNotMultiple);
        }
        if self.delay >= self.read_frequency {
            return Err(ConfigError::DelayNotSmallerThanReadFrequency);
        }
        Ok(())
    }
}

fn to_chrono(d: StdDuration) -> ChronoDuration {
    ChronoDuration::from_std(d).expect("duration too large to represent")
}

/// Owns every piece of per-run state: the pools, the entry queue, and the
/// sliding-window alerter. `process_tick` runs one round of C6's five-step
/// sequence; `run` wraps it in the wall-clock-aligned scheduling loop.
pub struct Monitor {
    config: Config,
    entry_pool: Arc<EntryPool>,
    buffer_pool: BufferPool,
    queue: EntryQueue,
    window: Window,
    metrics_frequency: ChronoDuration,
    traffic_window: ChronoDuration,
}

impl Monitor {
    pub fn new(config: Config) -> Result<Self, ConfigError> {
        config.validate()?;

        let entry_pool = Arc::new(EntryPool::new(config.entry_pool_size));
        let buffer_pool = BufferPool::new(config.buffer_pool_size, config.buffer_size);
        let queue = EntryQueue::new(entry_pool.clone());
        let traffic_window = to_chrono(config.traffic_window);
        let window = Window::new(traffic_window, config.threshold);
        let metrics_frequency = to_chrono(config.metrics_frequency);

        Ok(Self {
            config,
            entry_pool,
            buffer_pool,
            queue,
            window,
            metrics_frequency,
            traffic_window,
        })
    }

    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    pub fn window_status(&self) -> crate::window::AlertStatus {
        self.window.status()
    }

    /// Runs one tick: read+parse (C4), prune (C3), optionally compute
    /// metrics (C7) on a detached task, then run the alerter step (C5).
    /// `now` is the tick's nominal virtual-time instant.
    pub fn process_tick<R: Read>(
        &mut self,
        reader: &mut R,
        now: DateTime<FixedOffset>,
        leftover: Vec<u8>,
        metrics_tx: &SyncSender<Metrics>,
    ) -> Result<(Vec<u8>, Vec<Alert>), TailError> {
        let leftover = pipeline::run_round(
            reader,
            &self.buffer_pool,
            &self.entry_pool,
            &self.queue,
            leftover,
        )?;

        let start_metrics = now - self.metrics_frequency;
        let start_traffic_window = now - self.traffic_window;
        let end = now;

        let deleted =
            self.queue
                .remove_outdated_entries(self.window.edge_pos(), start_metrics, start_traffic_window);
        self.window.on_pruned(deleted);

        if is_aligned(now, self.metrics_frequency) {
            let snapshot = self.queue.entries_in_window(start_metrics, end);
            let metrics_tx = metrics_tx.clone();
            std::thread::spawn(move || {
                let metrics = Metrics::from_entries(&snapshot, start_metrics, end);
                let _ = metrics_tx.send(metrics);
            });
        }

        let alerts = self.window.ingest(&self.queue, end);

        Ok((leftover, alerts))
    }

    /// Runs the tick loop forever, until `running` is cleared. Sleeps until
    /// the next wall-clock multiple of `ReadFrequency`, then an additional
    /// `Delay`, before running the tick.
    pub fn run<R: Read>(
        mut self,
        mut reader: R,
        alerts_tx: SyncSender<Vec<Alert>>,
        metrics_tx: SyncSender<Metrics>,
        running: Arc<AtomicBool>,
    ) -> Result<(), TailError> {
        let mut leftover = Vec::new();
        let mut previous_boundary: Option<SystemTime> = None;

        while running.load(Ordering::SeqCst) {
            let wall_now = SystemTime::now();
            let boundary = align_to_next(wall_now, self.config.read_frequency);
            sleep_interruptible(boundary.duration_since(wall_now).unwrap_or(StdDuration::ZERO), &running);

            if !running.load(Ordering::SeqCst) {
                break;
            }

            if !self.config.delay.is_zero() {
                sleep_interruptible(self.config.delay, &running);
            }

            if let Some(previous) = previous_boundary {
                if wall_now
                    .duration_since(previous)
                    .unwrap_or(StdDuration::ZERO)
                    >= self.config.read_frequency
                {
                    tracing::warn!("potentially missing logs! please adjust parameters");
                }
            }
            previous_boundary = Some(boundary);

            let now = DateTime::<Utc>::from(boundary).fixed_offset();
            let (new_leftover, alerts) =
                self.process_tick(&mut reader, now, leftover, &metrics_tx)?;
            leftover = new_leftover;

            if !alerts.is_empty() {
                let _ = alerts_tx.send(alerts);
            }
        }

        Ok(())
    }
}

/// Returns the next instant after `now` that is an exact multiple of
/// `period` since the Unix epoch. Never returns `now` itself.
fn align_to_next(now: SystemTime, period: StdDuration) -> SystemTime {
    let since_epoch = now.duration_since(UNIX_EPOCH).unwrap_or(StdDuration::ZERO);
    let now_nanos = since_epoch.as_nanos();
    let period_nanos = period.as_nanos().max(1);
    let next_nanos = now_nanos - (now_nanos % period_nanos) + period_nanos;
    UNIX_EPOCH
        + StdDuration::new(
            (next_nanos / 1_000_000_000) as u64,
            (next_nanos % 1_000_000_000) as u32,
        )
}

/// Sleeps for `duration`, checking `running` every 100ms so a shutdown
/// signal fired mid-sleep is noticed promptly rather than after the full
/// tick interval elapses.
fn sleep_interruptible(duration: StdDuration, running: &AtomicBool) {
    const SLEEP_INTERVAL: StdDuration = StdDuration::from_millis(100);
    let mut remaining = duration;
    while remaining > StdDuration::ZERO && running.load(Ordering::SeqCst) {
        let sleep_time = remaining.min(SLEEP_INTERVAL);
        std::thread::sleep(sleep_time);
        remaining = remaining.saturating_sub(sleep_time);
    }
}

/// True when `now` is an exact multiple of `period` since the Unix epoch,
/// at millisecond resolution.
fn is_aligned(now: DateTime<FixedOffset>, period: ChronoDuration) -> bool {
    let period_ms = period.num_milliseconds();
    period_ms > 0 && now.timestamp_millis() % period_ms == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> Config {
        Config {
            read_frequency: StdDuration::from_millis(100),
            metrics_frequency: StdDuration::from_millis(300),
            traffic_window: StdDuration::from_secs(60),
            threshold: 400,
            buffer_pool_size: 4,
            buffer_size: 4096,
            entry_pool_size: 64,
            delay: StdDuration::from_millis(0),
        }
    }

    #[test]
    fn validate_rejects_non_multiple_metrics_frequency() {
        let mut c = cfg();
        c.metrics_frequency = StdDuration::from_millis(250);
        assert_eq!(
            c.validate(),
            Err(ConfigError::MetricsFrequencyNotMultiple)
        );
    }

    #[test]
    fn validate_rejects_delay_not_smaller_than_read_frequency() {
        let mut c = cfg();
        c.delay = StdDuration::from_millis(100);
        assert_eq!(
            c.validate(),
            Err(ConfigError::DelayNotSmallerThanReadFrequency)
        );
    }

    #[test]
    fn validate_accepts_well_formed_config() {
        assert!(cfg().validate().is_ok());
    }

    #[test]
    fn align_to_next_lands_on_a_future_period_boundary() {
        let now = UNIX_EPOCH + StdDuration::from_millis(1_234);
        let boundary = align_to_next(now, StdDuration::from_millis(1_000));
        assert_eq!(boundary, UNIX_EPOCH + StdDuration::from_millis(2_000));
    }

    #[test]
    fn align_to_next_never_returns_the_same_instant() {
        let now = UNIX_EPOCH + StdDuration::from_millis(2_000);
        let boundary = align_to_next(now, StdDuration::from_millis(1_000));
        assert_eq!(boundary, UNIX_EPOCH + StdDuration::from_millis(3_000));
    }

    #[test]
    fn process_tick_parses_input_and_advances_queue() {
        let mut monitor = Monitor::new(cfg()).unwrap();
        let line = b"1.1.1.1 - - [10/Oct/2000:13:55:36 -0700] \"GET /a HTTP/1.0\" 200 1\n";
        let mut reader = std::io::Cursor::new(line.to_vec());
        let (tx, _rx) = std::sync::mpsc::sync_channel(1);

        let now = DateTime::parse_from_rfc3339("2000-10-10T13:56:00+00:00").unwrap();
        let (leftover, _alerts) = monitor
            .process_tick(&mut reader, now, Vec::new(), &tx)
            .unwrap();

        assert!(leftover.is_empty());
        assert_eq!(monitor.queue_len(), 1);
    }

    #[test]
    fn process_tick_tails_a_real_file_appended_between_ticks() {
        use std::io::{Seek, SeekFrom, Write};

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("access.log");
        let mut writer = std::fs::File::create(&path).unwrap();
        writeln!(
            writer,
            r#"1.1.1.1 - - [10/Oct/2000:13:55:36 -0700] "GET /a HTTP/1.0" 200 1"#
        )
        .unwrap();
        writer.flush().unwrap();

        let mut monitor = Monitor::new(cfg()).unwrap();
        let mut reader = std::fs::File::open(&path).unwrap();
        let (tx, _rx) = std::sync::mpsc::sync_channel(1);
        let now = DateTime::parse_from_rfc3339("2000-10-10T13:56:00+00:00").unwrap();

        let (leftover, _alerts) = monitor
            .process_tick(&mut reader, now, Vec::new(), &tx)
            .unwrap();
        assert_eq!(monitor.queue_len(), 1);

        // Reading again with no new bytes is a normal end-of-stream, not an error.
        let (leftover, _alerts) = monitor
            .process_tick(&mut reader, now, leftover, &tx)
            .unwrap();
        assert_eq!(monitor.queue_len(), 1);

        writeln!(
            writer,
            r#"2.2.2.2 - - [10/Oct/2000:13:55:37 -0700] "GET /b HTTP/1.0" 200 1"#
        )
        .unwrap();
        writer.flush().unwrap();
        reader.seek(SeekFrom::Current(0)).unwrap();

        let (_leftover, _alerts) = monitor
            .process_tick(&mut reader, now, leftover, &tx)
            .unwrap();
        assert_eq!(monitor.queue_len(), 2);
    }
}
