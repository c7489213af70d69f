//! Terminal display consumer: prints alerts as they arrive and replays the
//! alert history alongside each metrics snapshot.

use std::io::Write;
use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::time::Duration;

use accesswatch_core::{Alert, Metrics};

const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Drains `alerts_rx`/`metrics_rx` until both senders are dropped, writing
/// each alert as it arrives and, on every metrics snapshot, the snapshot
/// followed by the alert history seen so far.
pub fn run<W: Write>(
    mut out: W,
    alerts_rx: Receiver<Vec<Alert>>,
    metrics_rx: Receiver<Metrics>,
) {
    let mut alert_history: Vec<Alert> = Vec::new();
    let mut alerts_open = true;
    let mut metrics_open = true;

    while alerts_open || metrics_open {
        if alerts_open {
            match alerts_rx.recv_timeout(POLL_INTERVAL) {
                Ok(alerts) => {
                    for alert in &alerts {
                        let _ = writeln!(out, "{alert}");
                    }
                    alert_history.extend(alerts);
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => alerts_open = false,
            }
        }

        if metrics_open {
            match metrics_rx.recv_timeout(POLL_INTERVAL) {
                Ok(metrics) => {
                    let _ = writeln!(out, "{metrics}");
                    for alert in &alert_history {
                        let _ = writeln!(out, "{alert}");
                    }
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => metrics_open = false,
            }
        }
    }
}
