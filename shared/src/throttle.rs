/// Throttled status publishing for one download.
///
/// Every chunk goes through the transcript so it is always current; a
/// rendered snapshot is only handed out when the throttle interval has passed
/// since the previous one (or since the "started" acknowledgement).
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

use crate::console::Transcript;

/// Default spacing between two status edits of the same request.
pub const DEFAULT_STATUS_INTERVAL: Duration = Duration::from_secs(2);

pub struct StatusPublisher {
    transcript: Transcript,
    interval: Duration,
    last_emit: Instant,
    last_snapshot: Option<String>,
    emitted: usize,
}

impl StatusPublisher {
    /// Create a publisher whose throttle window opens at `started_at`.
    pub fn new(interval: Duration, started_at: Instant) -> Self {
        Self {
            transcript: Transcript::new(),
            interval,
            last_emit: started_at,
            last_snapshot: None,
            emitted: 0,
        }
    }

    /// Feed one chunk observed at `now`. Returns the snapshot to publish, if due.
    pub fn push(&mut self, chunk: &str, now: Instant) -> Option<String> {
        self.transcript.push(chunk);

        if now.saturating_duration_since(self.last_emit) < self.interval {
            return None;
        }
        if self.transcript.is_empty() {
            return None;
        }

        let snapshot = self.transcript.render();
        // Re-sending identical text is rejected by Telegram, so skip it.
        if self.last_snapshot.as_deref() == Some(snapshot.as_str()) {
            return None;
        }

        self.last_emit = now;
        self.last_snapshot = Some(snapshot.clone());
        self.emitted += 1;
        debug!(emitted = self.emitted, len = snapshot.len(), "status snapshot due");
        Some(snapshot)
    }

    #[cfg(test)]
    fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    /// Number of snapshots handed out so far.
    #[cfg(test)]
    fn emitted(&self) -> usize {
        self.emitted
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(base: Instant, millis: u64) -> Instant {
        base + Duration::from_millis(millis)
    }

    #[test]
    fn test_nothing_before_interval() {
        let t0 = Instant::now();
        let mut publisher = StatusPublisher::new(DEFAULT_STATUS_INTERVAL, t0);
        assert_eq!(publisher.push("line one\n", at(t0, 10)), None);
        assert_eq!(publisher.push("line two\n", at(t0, 1999)), None);
        assert_eq!(publisher.transcript().lines().len(), 2);
        assert_eq!(publisher.emitted(), 0);
    }

    #[test]
    fn test_emits_full_snapshot_when_due() {
        let t0 = Instant::now();
        let mut publisher = StatusPublisher::new(DEFAULT_STATUS_INTERVAL, t0);
        publisher.push("line one\n", at(t0, 100));
        let snapshot = publisher.push("\r[download] 42%", at(t0, 2000));
        assert_eq!(snapshot.as_deref(), Some("line one\n[download] 42%"));
    }

    #[test]
    fn test_emissions_are_spaced() {
        let t0 = Instant::now();
        let interval = Duration::from_secs(2);
        let mut publisher = StatusPublisher::new(interval, t0);

        let mut emitted_at = Vec::new();
        for step in 0..200u64 {
            let now = at(t0, step * 137);
            if publisher.push(&format!("\rprogress {}", step), now).is_some() {
                emitted_at.push(now);
            }
        }

        assert!(emitted_at.len() > 5);
        assert_eq!(emitted_at.len(), publisher.emitted());
        assert!(emitted_at[0].duration_since(t0) >= interval);
        for pair in emitted_at.windows(2) {
            assert!(pair[1].duration_since(pair[0]) >= interval);
        }
    }

    #[test]
    fn test_unchanged_snapshot_is_not_repeated() {
        let t0 = Instant::now();
        let mut publisher = StatusPublisher::new(Duration::from_secs(1), t0);
        assert!(publisher.push("same\n", at(t0, 1000)).is_some());
        assert_eq!(publisher.push("", at(t0, 5000)), None);
        assert!(publisher.push("more", at(t0, 5001)).is_some());
    }

    #[test]
    fn test_empty_transcript_is_not_published() {
        let t0 = Instant::now();
        let mut publisher = StatusPublisher::new(Duration::from_secs(1), t0);
        assert_eq!(publisher.push("", at(t0, 3000)), None);
        assert_eq!(publisher.push("\r\r", at(t0, 4000)), None);
    }
}
