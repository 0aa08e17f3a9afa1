//! Fixed-rate repeating task on a dedicated thread.

use anyhow::{anyhow, Result};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

/// Handle to a running ticker. Dropping it cancels the ticker.
///
/// Deadlines are fixed-rate: a tick that overruns the period does not cause
/// a burst of catch-up ticks. Deadlines that passed during the overrun are
/// dropped and reported through `on_missed`.
pub(crate) struct Ticker {
    period: Duration,
    cancelled: Arc<AtomicBool>,
    wake: Option<mpsc::Sender<()>>,
    join: Option<JoinHandle<()>>,
}

impl Ticker {
    pub(crate) fn spawn<T, M>(period: Duration, mut on_tick: T, mut on_missed: M) -> Result<Self>
    where
        T: FnMut() + Send + 'static,
        M: FnMut(u64) + Send + 'static,
    {
        if period.is_zero() {
            return Err(anyhow!("ticker period must be positive"));
        }
        let cancelled = Arc::new(AtomicBool::new(false));
        let cancelled_thread = cancelled.clone();
        let (wake, wait) = mpsc::channel::<()>();

        let join = std::thread::Builder::new()
            .name("capture-ticker".to_string())
            .spawn(move || {
                let mut next = Instant::now() + period;
                loop {
                    let mut now = Instant::now();
                    while now < next {
                        match wait.recv_timeout(next - now) {
                            Err(RecvTimeoutError::Timeout) => now = Instant::now(),
                            Ok(()) | Err(RecvTimeoutError::Disconnected) => return,
                        }
                    }
                    if cancelled_thread.load(Ordering::SeqCst) {
                        return;
                    }
                    if catch_unwind(AssertUnwindSafe(|| on_tick())).is_err() {
                        log::error!("capture tick panicked; ticker keeps running");
                    }

                    next += period;
                    let now = Instant::now();
                    let mut missed = 0u64;
                    while next <= now {
                        next += period;
                        missed += 1;
                    }
                    if missed > 0 {
                        on_missed(missed);
                    }
                }
            })
            .map_err(|e| anyhow!("spawn ticker thread: {}", e))?;

        Ok(Self {
            period,
            cancelled,
            wake: Some(wake),
            join: Some(join),
        })
    }

    pub(crate) fn period(&self) -> Duration {
        self.period
    }

    /// Stop scheduling ticks. A tick already running finishes on its own;
    /// no new tick starts after this returns.
    pub(crate) fn cancel(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.cancelled.store(true, Ordering::SeqCst);
        if let Some(wake) = self.wake.take() {
            let _ = wake.send(());
        }
        // Not joined: a tick in progress may still be waiting on the recognizer.
        self.join.take();
    }
}

impl Drop for Ticker {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU64;

    #[test]
    fn ticks_repeatedly_until_cancelled() {
        let count = Arc::new(AtomicU64::new(0));
        let seen = count.clone();
        let ticker = Ticker::spawn(
            Duration::from_millis(10),
            move || {
                seen.fetch_add(1, Ordering::SeqCst);
            },
            |_| {},
        )
        .unwrap();
        std::thread::sleep(Duration::from_millis(100));
        ticker.cancel();
        let at_cancel = count.load(Ordering::SeqCst);
        assert!(at_cancel >= 3, "only {} ticks", at_cancel);

        std::thread::sleep(Duration::from_millis(60));
        assert!(count.load(Ordering::SeqCst) <= at_cancel + 1);
    }

    #[test]
    fn overrun_drops_missed_deadlines() {
        let missed = Arc::new(AtomicU64::new(0));
        let missed_seen = missed.clone();
        let ticker = Ticker::spawn(
            Duration::from_millis(10),
            || std::thread::sleep(Duration::from_millis(35)),
            move |n| {
                missed_seen.fetch_add(n, Ordering::SeqCst);
            },
        )
        .unwrap();
        std::thread::sleep(Duration::from_millis(120));
        drop(ticker);
        assert!(missed.load(Ordering::SeqCst) >= 2);
    }

    #[test]
    fn zero_period_is_rejected() {
        assert!(Ticker::spawn(Duration::ZERO, || {}, |_| {}).is_err());
    }
}
