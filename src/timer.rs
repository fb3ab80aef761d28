// src/timer.rs
//! Periodic timer on a dedicated thread.
//!
//! Deadlines are computed on the monotonic clock. When the callback runs late, the
//! missed periods are coalesced into a single call carrying the expiration count,
//! the way a timerfd read reports overruns.

use anyhow::{Context, Result};
use log::*;
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

pub struct PeriodicTimer {
    name: String,
    stop_tx: Option<Sender<()>>,
    thread_handle: Option<JoinHandle<()>>,
}

impl PeriodicTimer {
    /// Spawns a timer thread that first fires after `initial_delay`, then every `interval`.
    ///
    /// A zero `interval` makes the timer one-shot.
    pub fn spawn<F>(
        name: &str,
        initial_delay: Duration,
        interval: Duration,
        mut callback: F,
    ) -> Result<Self>
    where
        F: FnMut(u64) + Send + 'static,
    {
        let (stop_tx, stop_rx) = mpsc::channel::<()>();
        let thread_name = name.to_string();

        let thread_handle = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                debug!(
                    "PeriodicTimer '{}': Started (delay {:?}, interval {:?})",
                    thread_name, initial_delay, interval
                );
                let mut deadline = Instant::now() + initial_delay;
                loop {
                    let now = Instant::now();
                    if now < deadline {
                        match stop_rx.recv_timeout(deadline - now) {
                            Err(RecvTimeoutError::Timeout) => continue,
                            Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                        }
                    }

                    let expirations = expirations_since(deadline, now, interval);
                    if expirations > 1 {
                        trace!(
                            "PeriodicTimer '{}': {} expirations coalesced",
                            thread_name,
                            expirations
                        );
                    }
                    callback(expirations);

                    if interval.is_zero() {
                        break;
                    }
                    deadline += interval_times(interval, expirations);
                }
                debug!("PeriodicTimer '{}': Thread exiting", thread_name);
            })
            .with_context(|| format!("Failed to spawn timer thread '{}'", name))?;

        Ok(Self {
            name: name.to_string(),
            stop_tx: Some(stop_tx),
            thread_handle: Some(thread_handle),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Cancels the timer and waits for its thread. A callback already running completes first.
    pub fn stop(&mut self) {
        self.stop_tx.take();
        if let Some(handle) = self.thread_handle.take() {
            // Stopping from inside the callback must not join the current thread.
            if handle.thread().id() == thread::current().id() {
                return;
            }
            if let Err(e) = handle.join() {
                error!("PeriodicTimer '{}': thread panicked: {:?}", self.name, e);
            }
        }
    }
}

impl Drop for PeriodicTimer {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Periods elapsed since `deadline`, counting the deadline itself.
fn expirations_since(deadline: Instant, now: Instant, interval: Duration) -> u64 {
    if interval.is_zero() {
        return 1;
    }
    let late = now.saturating_duration_since(deadline);
    1 + (late.as_nanos() / interval.as_nanos()) as u64
}

fn interval_times(interval: Duration, count: u64) -> Duration {
    let nanos = interval.as_nanos().saturating_mul(u128::from(count));
    Duration::from_nanos(u64::try_from(nanos).unwrap_or(u64::MAX))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::{Arc, Mutex};

    #[test_log::test]
    fn fires_periodically_until_stopped() {
        let ticks = Arc::new(AtomicU64::new(0));
        let counter = ticks.clone();
        let mut timer = PeriodicTimer::spawn(
            "test-periodic",
            Duration::ZERO,
            Duration::from_millis(5),
            move |n| {
                counter.fetch_add(n, Ordering::SeqCst);
            },
        )
        .unwrap();

        thread::sleep(Duration::from_millis(100));
        timer.stop();
        let after_stop = ticks.load(Ordering::SeqCst);
        assert!(after_stop >= 3, "only {} ticks", after_stop);

        thread::sleep(Duration::from_millis(30));
        assert_eq!(ticks.load(Ordering::SeqCst), after_stop);
    }

    #[test_log::test]
    fn initial_delay_is_respected() {
        let ticks = Arc::new(AtomicU64::new(0));
        let counter = ticks.clone();
        let _timer = PeriodicTimer::spawn(
            "test-delay",
            Duration::from_secs(5),
            Duration::from_millis(1),
            move |n| {
                counter.fetch_add(n, Ordering::SeqCst);
            },
        )
        .unwrap();

        thread::sleep(Duration::from_millis(50));
        assert_eq!(ticks.load(Ordering::SeqCst), 0);
    }

    #[test_log::test]
    fn drop_cancels_a_pending_timer_promptly() {
        let timer = PeriodicTimer::spawn(
            "test-drop",
            Duration::from_secs(60),
            Duration::from_secs(60),
            |_| {},
        )
        .unwrap();
        let start = Instant::now();
        drop(timer);
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[test_log::test]
    fn late_callback_coalesces_expirations() {
        let counts = Arc::new(Mutex::new(Vec::new()));
        let seen = counts.clone();
        let mut timer = PeriodicTimer::spawn(
            "test-coalesce",
            Duration::ZERO,
            Duration::from_millis(5),
            move |n| {
                let mut seen = seen.lock().unwrap();
                seen.push(n);
                if seen.len() == 1 {
                    thread::sleep(Duration::from_millis(30));
                }
            },
        )
        .unwrap();

        thread::sleep(Duration::from_millis(80));
        timer.stop();
        let counts = counts.lock().unwrap();
        assert!(counts.len() >= 2);
        assert!(counts[1] > 1, "expected coalesced ticks, got {:?}", *counts);
    }

    #[test_log::test]
    fn zero_interval_is_one_shot() {
        let ticks = Arc::new(AtomicU64::new(0));
        let counter = ticks.clone();
        let _timer = PeriodicTimer::spawn("test-oneshot", Duration::ZERO, Duration::ZERO, move |n| {
            counter.fetch_add(n, Ordering::SeqCst);
        })
        .unwrap();

        thread::sleep(Duration::from_millis(30));
        assert_eq!(ticks.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn expiration_arithmetic() {
        let base = Instant::now();
        let interval = Duration::from_millis(10);
        assert_eq!(expirations_since(base, base, interval), 1);
        assert_eq!(expirations_since(base, base + Duration::from_millis(9), interval), 1);
        assert_eq!(expirations_since(base, base + Duration::from_millis(25), interval), 3);
        assert_eq!(interval_times(interval, 3), Duration::from_millis(30));
    }
}
