use async_trait::async_trait;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Time source for the relay loop. Backoff and scheduling go through this
/// so tests can run without real delays.
#[async_trait]
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
    async fn sleep(&self, duration: Duration);
}

pub struct TokioClock;

#[async_trait]
impl Clock for TokioClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Virtual clock: `sleep` returns immediately, advances `now` and records
/// the requested delay.
pub struct RecordingClock {
    start: Instant,
    state: Mutex<RecordingState>,
}

#[derive(Default)]
struct RecordingState {
    elapsed: Duration,
    sleeps: Vec<Duration>,
}

impl Default for RecordingClock {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordingClock {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
            state: Mutex::new(RecordingState::default()),
        }
    }

    /// Every delay passed to `sleep`, in order.
    pub fn sleeps(&self) -> Vec<Duration> {
        self.state.lock().map(|s| s.sleeps.clone()).unwrap_or_default()
    }

    pub fn advance(&self, by: Duration) {
        if let Ok(mut s) = self.state.lock() {
            s.elapsed += by;
        }
    }
}

#[async_trait]
impl Clock for RecordingClock {
    fn now(&self) -> Instant {
        let elapsed = self.state.lock().map(|s| s.elapsed).unwrap_or_default();
        self.start + elapsed
    }

    async fn sleep(&self, duration: Duration) {
        if let Ok(mut s) = self.state.lock() {
            s.elapsed += duration;
            s.sleeps.push(duration);
        }
        tokio::task::yield_now().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_recording_clock_advances_without_waiting() {
        let clock = RecordingClock::new();
        let t0 = clock.now();
        clock.sleep(Duration::from_secs(3600)).await;
        clock.sleep(Duration::from_secs(1)).await;
        assert_eq!(clock.now() - t0, Duration::from_secs(3601));
        assert_eq!(
            clock.sleeps(),
            vec![Duration::from_secs(3600), Duration::from_secs(1)]
        );
    }
}
