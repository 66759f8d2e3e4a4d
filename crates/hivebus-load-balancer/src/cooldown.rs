/// Recently-unloaded bundle tracking
/// A bundle marked here is exempt from shedding until the grace period has
/// elapsed. Owned by the shedding scheduler and purged at the top of each tick.

use dashmap::DashMap;
use std::time::{Duration, Instant};

pub struct CooldownTracker {
    entries: DashMap<String, Instant>,
}

impl CooldownTracker {
    pub fn new() -> Self {
        CooldownTracker {
            entries: DashMap::new(),
        }
    }

    /// Record an unload of the bundle at the current instant
    pub fn mark(&self, bundle: impl Into<String>) {
        self.entries.insert(bundle.into(), Instant::now());
    }

    /// Whether the bundle is still within its grace period
    pub fn is_cooling(&self, bundle: &str) -> bool {
        self.entries.contains_key(bundle)
    }

    /// Drop entries older than the grace period
    pub fn purge_expired(&self, grace: Duration) {
        self.entries.retain(|_, marked_at| marked_at.elapsed() <= grace);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for CooldownTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_marked_bundle_is_cooling() {
        let tracker = CooldownTracker::new();
        tracker.mark("ns/0x00_0x80");
        assert!(tracker.is_cooling("ns/0x00_0x80"));
        assert!(!tracker.is_cooling("ns/0x80_0xff"));
        assert_eq!(tracker.len(), 1);
    }

    #[test]
    fn test_purge_keeps_entries_within_grace() {
        let tracker = CooldownTracker::new();
        tracker.mark("ns/0x00_0x80");
        tracker.purge_expired(Duration::from_secs(3600));
        assert!(tracker.is_cooling("ns/0x00_0x80"));
    }

    #[test]
    fn test_purge_drops_expired_entries() {
        let tracker = CooldownTracker::new();
        tracker.mark("ns/0x00_0x80");
        std::thread::sleep(Duration::from_millis(2));
        // A zero grace period expires everything already marked
        tracker.purge_expired(Duration::ZERO);
        assert!(tracker.is_empty());
    }
}
