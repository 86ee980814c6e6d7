use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

/// Active username → session binding.
///
/// At most one entry exists per username, and at most one per
/// `(assigned_port, session_key)` pair — both invariants are maintained
/// by [`SessionCache::insert`], which is the only way to create an entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionEntry {
    pub username: String,
    pub assigned_port: u16,
    pub session_key: u32,
    pub last_active: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Ok,
    AlreadyPresent,
}

/// Concurrent username → [`SessionEntry`] table. A single `RwLock` over
/// a `HashMap` is sufficient at this scale.
pub struct SessionCache {
    sessions: RwLock<HashMap<String, SessionEntry>>,
}

impl SessionCache {
    pub fn new() -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Inserts a fresh session, unless one already exists for `username`.
    /// Concurrent inserts of the same username race on the write lock;
    /// exactly one observes an empty slot and returns `Ok`.
    pub async fn insert(&self, username: &str, port: u16, key: u32) -> InsertOutcome {
        let mut sessions = self.sessions.write().await;
        if sessions.contains_key(username) {
            return InsertOutcome::AlreadyPresent;
        }
        sessions.insert(
            username.to_owned(),
            SessionEntry {
                username: username.to_owned(),
                assigned_port: port,
                session_key: key,
                last_active: Utc::now(),
            },
        );
        InsertOutcome::Ok
    }

    pub async fn lookup(&self, username: &str) -> Option<SessionEntry> {
        self.sessions.read().await.get(username).cloned()
    }

    pub async fn port_of(&self, username: &str) -> Option<u16> {
        self.sessions.read().await.get(username).map(|e| e.assigned_port)
    }

    pub async fn key_of(&self, username: &str) -> Option<u32> {
        self.sessions.read().await.get(username).map(|e| e.session_key)
    }

    pub async fn has(&self, username: &str) -> bool {
        self.sessions.read().await.contains_key(username)
    }

    pub async fn touch(&self, username: &str) {
        if let Some(entry) = self.sessions.write().await.get_mut(username) {
            entry.last_active = Utc::now();
        }
    }

    pub async fn remove(&self, username: &str) -> bool {
        self.sessions.write().await.remove(username).is_some()
    }

    pub async fn any_using_port(&self, port: u16) -> bool {
        self.sessions
            .read()
            .await
            .values()
            .any(|e| e.assigned_port == port)
    }

    /// Removes every entry whose `last_active` is older than
    /// `threshold_seconds`, returning the count removed. Iteration here
    /// takes the write lock for the whole sweep, so concurrent
    /// point-lookups simply wait rather than observing a torn state.
    pub async fn evict_inactive(&self, threshold_seconds: i64) -> usize {
        let cutoff = Utc::now() - chrono::Duration::seconds(threshold_seconds);
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, entry| entry.last_active > cutoff);
        before - sessions.len()
    }
}

impl Default for SessionCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn insert_is_exclusive_per_username() {
        let cache = SessionCache::new();
        assert_eq!(cache.insert("alice", 8081, 42).await, InsertOutcome::Ok);
        assert_eq!(
            cache.insert("alice", 8082, 99).await,
            InsertOutcome::AlreadyPresent
        );
        assert_eq!(cache.port_of("alice").await, Some(8081));
        assert_eq!(cache.key_of("alice").await, Some(42));
    }

    #[tokio::test]
    async fn remove_then_reinsert_succeeds() {
        let cache = SessionCache::new();
        cache.insert("alice", 8081, 1).await;
        assert!(cache.remove("alice").await);
        assert!(!cache.has("alice").await);
        assert_eq!(cache.insert("alice", 8082, 2).await, InsertOutcome::Ok);
    }

    #[tokio::test]
    async fn any_using_port_reflects_membership() {
        let cache = SessionCache::new();
        cache.insert("alice", 8081, 1).await;
        assert!(cache.any_using_port(8081).await);
        assert!(!cache.any_using_port(9000).await);
    }

    #[tokio::test]
    async fn evict_inactive_removes_only_stale_entries() {
        let cache = SessionCache::new();
        cache.insert("alice", 8081, 1).await;
        cache.insert("bob", 8082, 2).await;

        // Rewind bob's activity so he looks idle beyond the threshold.
        {
            let mut sessions = cache.sessions.write().await;
            sessions.get_mut("bob").unwrap().last_active =
                Utc::now() - chrono::Duration::seconds(1000);
        }

        let removed = cache.evict_inactive(600).await;
        assert_eq!(removed, 1);
        assert!(cache.has("alice").await);
        assert!(!cache.has("bob").await);
    }

    #[tokio::test]
    async fn concurrent_inserts_produce_exactly_one_ok() {
        use std::sync::Arc;

        let cache = Arc::new(SessionCache::new());
        let mut handles = Vec::new();
        for i in 0..16 {
            let cache = cache.clone();
            handles.push(tokio::spawn(async move {
                cache.insert("alice", 8081 + i, i as u32).await
            }));
        }

        let mut ok_count = 0;
        for handle in handles {
            if handle.await.unwrap() == InsertOutcome::Ok {
                ok_count += 1;
            }
        }
        assert_eq!(ok_count, 1);
    }
}
