//! Human-visible progress dots while a job is being polled.

use std::io::Write;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;

const MIN_TICK: Duration = Duration::from_millis(10);

#[cfg(test)]
thread_local! {
    /// Ticks of every ticker run by the current thread's runtime.
    pub(crate) static THREAD_TICKS: std::cell::Cell<u64> = const { std::cell::Cell::new(0) };
}

/// Background task printing a dot to stderr on every tick.
///
/// The task lives exactly as long as this guard: dropping it aborts the
/// task, so every exit path of the poll loop stops the output.
pub(crate) struct ProgressTicker {
    handle: Option<JoinHandle<()>>,
    ticks: Arc<AtomicU64>,
}

impl ProgressTicker {
    /// Start ticking every `interval`. A disabled ticker spawns nothing.
    pub(crate) fn start(enabled: bool, interval: Duration) -> Self {
        let ticks = Arc::new(AtomicU64::new(0));
        if !enabled {
            return Self {
                handle: None,
                ticks,
            };
        }

        let counter = ticks.clone();
        let period = interval.max(MIN_TICK);
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            // The first tick completes immediately.
            interval.tick().await;
            loop {
                interval.tick().await;
                counter.fetch_add(1, Ordering::Relaxed);
                #[cfg(test)]
                THREAD_TICKS.with(|t| t.set(t.get() + 1));
                let mut stderr = std::io::stderr();
                let _ = write!(stderr, ".");
                let _ = stderr.flush();
            }
        });

        Self {
            handle: Some(handle),
            ticks,
        }
    }

    #[cfg(test)]
    fn counter(&self) -> Arc<AtomicU64> {
        self.ticks.clone()
    }
}

impl Drop for ProgressTicker {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
            if self.ticks.load(Ordering::Relaxed) > 0 {
                eprintln!();
            }
        }
    }
}
