use std::collections::HashMap;
use std::net::IpAddr;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

/// Per (username, IP) failed-login bookkeeping. An entry only exists
/// while some counter or block deadline is non-zero;
/// [`AbuseCache::reset`] deletes it outright on success.
#[derive(Debug, Clone, Default)]
struct AbuseEntry {
    failed_ip: u32,
    failed_user: u32,
    last_attempt: Option<DateTime<Utc>>,
    blocked_until_ip: Option<DateTime<Utc>>,
    blocked_until_user: Option<DateTime<Utc>>,
}

impl AbuseEntry {
    fn is_idle(&self) -> bool {
        self.failed_ip == 0
            && self.failed_user == 0
            && self.blocked_until_ip.is_none()
            && self.blocked_until_user.is_none()
    }
}

/// Two-dimensional rate limiter keyed by `(username, ip)`.
///
/// Gating is pure deadline comparison: [`record_failure`] only ever
/// stamps a `blocked_until_*` field, it never sleeps the calling task —
/// a blocking sleep here would stall the whole dispatcher thread.
pub struct AbuseCache {
    entries: RwLock<HashMap<(String, IpAddr), AbuseEntry>>,
    max_ip_fails: u32,
    max_user_fails: u32,
    block_duration: chrono::Duration,
}

impl AbuseCache {
    pub fn new(max_ip_fails: u32, max_user_fails: u32, block_duration_secs: u64) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            max_ip_fails,
            max_user_fails,
            block_duration: chrono::Duration::seconds(block_duration_secs as i64),
        }
    }

    /// True iff either the IP-scoped or username-scoped block deadline
    /// for this pair is still in the future. An absent entry is never
    /// blocked.
    pub async fn is_blocked(&self, username: &str, ip: IpAddr) -> bool {
        let entries = self.entries.read().await;
        let Some(entry) = entries.get(&(username.to_owned(), ip)) else {
            return false;
        };
        let now = Utc::now();
        entry.blocked_until_ip.is_some_and(|t| now < t)
            || entry.blocked_until_user.is_some_and(|t| now < t)
    }

    /// Records a failed attempt, incrementing both counters and tripping
    /// whichever block deadline (or both) crosses its threshold.
    pub async fn record_failure(&self, username: &str, ip: IpAddr) {
        let mut entries = self.entries.write().await;
        let entry = entries.entry((username.to_owned(), ip)).or_default();
        let now = Utc::now();

        entry.failed_ip += 1;
        entry.failed_user += 1;
        entry.last_attempt = Some(now);

        if entry.failed_ip >= self.max_ip_fails {
            entry.blocked_until_ip = Some(now + self.block_duration);
        }
        if entry.failed_user >= self.max_user_fails {
            entry.blocked_until_user = Some(now + self.block_duration);
        }
    }

    /// Deletes the entry outright on successful authentication.
    pub async fn reset(&self, username: &str, ip: IpAddr) {
        self.entries.write().await.remove(&(username.to_owned(), ip));
    }

    /// Drops entries that are both counter-free and past any block
    /// deadline, keeping the table from growing without bound. Run on
    /// a periodic sweep, not on every request.
    pub async fn clear_expired(&self) {
        let now = Utc::now();
        let mut entries = self.entries.write().await;
        entries.retain(|_, entry| {
            let ip_live = entry.blocked_until_ip.is_some_and(|t| now < t);
            let user_live = entry.blocked_until_user.is_some_and(|t| now < t);
            ip_live || user_live || !entry.is_idle_after_sweep(now)
        });
    }
}

impl AbuseEntry {
    /// After a sweep, an entry with expired block deadlines and failure
    /// counters that predate the block window is considered stale.
    fn is_idle_after_sweep(&self, now: DateTime<Utc>) -> bool {
        if self.is_idle() {
            return true;
        }
        match self.last_attempt {
            Some(t) => now - t > chrono::Duration::hours(24),
            None => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    fn ip() -> IpAddr {
        IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1))
    }

    #[tokio::test]
    async fn not_blocked_before_threshold() {
        let cache = AbuseCache::new(10, 5, 300);
        for _ in 0..4 {
            cache.record_failure("alice", ip()).await;
        }
        assert!(!cache.is_blocked("alice", ip()).await);
    }

    #[tokio::test]
    async fn blocks_after_user_threshold() {
        let cache = AbuseCache::new(10, 5, 300);
        for _ in 0..5 {
            cache.record_failure("alice", ip()).await;
        }
        assert!(cache.is_blocked("alice", ip()).await);
    }

    #[tokio::test]
    async fn reset_clears_the_entry() {
        let cache = AbuseCache::new(10, 5, 300);
        for _ in 0..5 {
            cache.record_failure("alice", ip()).await;
        }
        assert!(cache.is_blocked("alice", ip()).await);
        cache.reset("alice", ip()).await;
        assert!(!cache.is_blocked("alice", ip()).await);
    }

    #[tokio::test]
    async fn counts_restart_from_one_after_reset() {
        let cache = AbuseCache::new(10, 5, 300);
        cache.record_failure("alice", ip()).await;
        cache.reset("alice", ip()).await;
        cache.record_failure("alice", ip()).await;
        // A second independent failure alone must not trip the block.
        assert!(!cache.is_blocked("alice", ip()).await);
    }

    #[tokio::test]
    async fn ip_and_user_dimensions_are_independent() {
        let cache = AbuseCache::new(3, 100, 300);
        let other_ip = IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1));
        for _ in 0..3 {
            cache.record_failure("alice", ip()).await;
        }
        // Tripped for this (user, ip) pair...
        assert!(cache.is_blocked("alice", ip()).await);
        // ...but a different IP with no recorded failures is untouched.
        assert!(!cache.is_blocked("alice", other_ip).await);
    }
}
