use std::time::{Duration, Instant};

/// Bookkeeping for periodic controller rescans, owned by one `HapticMapper`.
#[derive(Debug, Clone, Default)]
pub struct DiscoverySession {
    initial_scan_done: bool,
    last_scan: Option<Instant>,
    scans: u64,
}

impl DiscoverySession {
    /// A rescan is due if none has run yet or `interval` has elapsed.
    pub fn is_due(&self, now: Instant, interval: Duration) -> bool {
        match self.last_scan {
            None => true,
            Some(last) => now.saturating_duration_since(last) >= interval,
        }
    }

    /// Record a completed scan. Returns true for the first one.
    pub fn record_scan(&mut self, now: Instant) -> bool {
        let first = !self.initial_scan_done;
        self.initial_scan_done = true;
        self.last_scan = Some(now);
        self.scans += 1;
        first
    }

    pub fn initial_scan_done(&self) -> bool {
        self.initial_scan_done
    }

    pub fn last_scan(&self) -> Option<Instant> {
        self.last_scan
    }

    pub fn scans(&self) -> u64 {
        self.scans
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_scan_is_always_due() {
        let session = DiscoverySession::default();
        assert!(session.is_due(Instant::now(), Duration::from_secs(5)));
        assert!(!session.initial_scan_done());
    }

    #[test]
    fn rescan_waits_for_interval() {
        let mut session = DiscoverySession::default();
        let t0 = Instant::now();
        assert!(session.record_scan(t0));
        assert!(!session.record_scan(t0));

        let interval = Duration::from_secs(5);
        assert!(!session.is_due(t0 + Duration::from_secs(4), interval));
        assert!(session.is_due(t0 + interval, interval));
        assert_eq!(session.scans(), 2);
    }
}
