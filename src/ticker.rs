//! Fixed-period driver for the live simulation

use std::sync::mpsc::{channel, RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use log::{debug, info};

/// Runs a callback on its own thread every `period`, starting immediately.
/// Ticks are sequential; once [`Ticker::stop`] returns no further tick runs.
pub struct Ticker {
    stop_tx: Sender<()>,
    handle: Option<JoinHandle<u64>>,
}

impl Ticker {
    pub fn start<F>(period: Duration, mut on_tick: F) -> Self
    where
        F: FnMut(u64) + Send + 'static,
    {
        let (stop_tx, stop_rx) = channel::<()>();

        let handle = thread::spawn(move || {
            let started = Instant::now();
            let mut ticks: u64 = 0;

            loop {
                on_tick(ticks);
                ticks += 1;

                // schedule against the start time so slow ticks do not drift the cadence
                let deadline = started + period * ticks as u32;
                let wait = deadline.saturating_duration_since(Instant::now());
                match stop_rx.recv_timeout(wait) {
                    Err(RecvTimeoutError::Timeout) => continue,
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                }
            }

            debug!("Ticker thread exiting after {} ticks", ticks);
            ticks
        });

        info!("Ticker started, period {:?}", period);
        Self { stop_tx, handle: Some(handle) }
    }

    /// Cancel the timer and wait for the thread. Returns the number of ticks run.
    pub fn stop(mut self) -> u64 {
        self.shutdown()
    }

    fn shutdown(&mut self) -> u64 {
        let _ = self.stop_tx.send(());
        self.handle
            .take()
            .map(|handle| handle.join().unwrap_or(0))
            .unwrap_or(0)
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
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_first_tick_is_immediate() {
        let count = Arc::new(AtomicU64::new(0));
        let seen = Arc::clone(&count);
        let ticker = Ticker::start(Duration::from_secs(3600), move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
        });
        thread::sleep(Duration::from_millis(50));
        assert_eq!(ticker.stop(), 1);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_no_ticks_after_stop() {
        let count = Arc::new(AtomicU64::new(0));
        let seen = Arc::clone(&count);
        let ticker = Ticker::start(Duration::from_millis(5), move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
        });
        thread::sleep(Duration::from_millis(60));
        let ran = ticker.stop();
        assert!(ran >= 2);
        assert_eq!(count.load(Ordering::SeqCst), ran);

        thread::sleep(Duration::from_millis(30));
        assert_eq!(count.load(Ordering::SeqCst), ran);
    }

    #[test]
    fn test_tick_numbers_are_sequential() {
        let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let ticker = Ticker::start(Duration::from_millis(2), move |n| {
            sink.lock().unwrap().push(n);
        });
        thread::sleep(Duration::from_millis(30));
        ticker.stop();

        let seen = seen.lock().unwrap();
        assert!(seen.iter().enumerate().all(|(i, &n)| i as u64 == n));
    }
}
