//! Wait windows.
//!
//! The scanner has no "transfer complete" signal, so the session waits a fixed
//! amount of wall-clock time before draining the link. Waiting is kept behind
//! `Clock` so tests can run the session without real delays.

use anyhow::{anyhow, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

const SLICE: Duration = Duration::from_millis(100);

pub trait Clock {
    /// Block for `duration`. Returns an error if the wait was cancelled.
    fn wait(&mut self, duration: Duration) -> Result<()>;
}

/// Shared flag raised when the operator asks the process to stop.
#[derive(Clone, Debug, Default)]
pub struct Shutdown(Arc<AtomicBool>);

impl Shutdown {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trigger(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_triggered(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Real clock. Sleeps in short slices so a shutdown request ends the wait early.
pub struct SystemClock {
    shutdown: Shutdown,
}

impl SystemClock {
    pub fn new(shutdown: Shutdown) -> Self {
        Self { shutdown }
    }
}

impl Clock for SystemClock {
    fn wait(&mut self, duration: Duration) -> Result<()> {
        let deadline = Instant::now() + duration;
        loop {
            if self.shutdown.is_triggered() {
                return Err(anyhow!("wait cancelled by shutdown request"));
            }
            let now = Instant::now();
            if now >= deadline {
                return Ok(());
            }
            std::thread::sleep(SLICE.min(deadline - now));
        }
    }
}

/// Clock that returns immediately and remembers what it was asked to wait.
#[derive(Debug, Default)]
pub struct ManualClock {
    waits: Vec<Duration>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn waits(&self) -> &[Duration] {
        &self.waits
    }

    pub fn total(&self) -> Duration {
        self.waits.iter().sum()
    }
}

impl Clock for ManualClock {
    fn wait(&mut self, duration: Duration) -> Result<()> {
        self.waits.push(duration);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_clock_waits_at_least_requested_duration() {
        let mut clock = SystemClock::new(Shutdown::new());
        let started = Instant::now();
        clock.wait(Duration::from_millis(30)).unwrap();
        assert!(started.elapsed() >= Duration::from_millis(30));
    }

    #[test]
    fn system_clock_is_cancelled_by_shutdown() {
        let shutdown = Shutdown::new();
        let mut clock = SystemClock::new(shutdown.clone());
        shutdown.trigger();
        let started = Instant::now();
        assert!(clock.wait(Duration::from_secs(10)).is_err());
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn manual_clock_records_waits() {
        let mut clock = ManualClock::new();
        clock.wait(Duration::from_secs(1)).unwrap();
        clock.wait(Duration::from_secs(10)).unwrap();
        assert_eq!(
            clock.waits(),
            &[Duration::from_secs(1), Duration::from_secs(10)]
        );
        assert_eq!(clock.total(), Duration::from_secs(11));
    }
}
