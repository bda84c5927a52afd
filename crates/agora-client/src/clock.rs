//! Live clock for relative timestamps.
//!
//! UI showing "5 minutes ago" has nothing to re-render on: the data did
//! not change, the clock did. [`LiveClock`] publishes a ticking "now" on a
//! watch channel; consumers recompute their labels on each tick. Dropping
//! the clock aborts the tick task, so the interval dies with the UI that
//! owns it.

use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Default tick period: once a minute is enough for minute-granularity
/// labels.
pub const DEFAULT_TICK: Duration = Duration::from_secs(60);

pub struct LiveClock {
    task: JoinHandle<()>,
    rx: watch::Receiver<DateTime<Utc>>,
}

impl LiveClock {
    pub fn start() -> Self {
        Self::with_period(DEFAULT_TICK)
    }

    pub fn with_period(period: Duration) -> Self {
        let (tx, rx) = watch::channel(Utc::now());
        let task = tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.tick().await; // the initial watch value covers tick zero
            loop {
                interval.tick().await;
                if tx.send(Utc::now()).is_err() {
                    break;
                }
            }
        });
        Self { task, rx }
    }

    /// Latest published "now".
    pub fn now(&self) -> DateTime<Utc> {
        *self.rx.borrow()
    }

    /// Receiver for awaiting ticks (`changed().await`).
    pub fn subscribe(&self) -> watch::Receiver<DateTime<Utc>> {
        self.rx.clone()
    }
}

impl Drop for LiveClock {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Human-readable relative time between a stored timestamp and "now".
pub fn format_relative(then: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let elapsed = now.signed_duration_since(then);

    let minutes = elapsed.num_minutes();
    if minutes < 1 {
        return "just now".to_string();
    }
    if minutes < 60 {
        return plural(minutes, "minute");
    }
    let hours = elapsed.num_hours();
    if hours < 24 {
        return plural(hours, "hour");
    }
    plural(elapsed.num_days(), "day")
}

fn plural(count: i64, unit: &str) -> String {
    if count == 1 {
        format!("1 {unit} ago")
    } else {
        format!("{count} {unit}s ago")
    }
}
