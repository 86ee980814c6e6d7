use std::sync::Arc;

use turnstile_common::{TurnstileConfig, UserStore};

use crate::abuse_cache::AbuseCache;
use crate::session_cache::SessionCache;

/// Dependency container assembled once at startup and cloned cheaply
/// (everything behind an `Arc`) into every task that needs it — the
/// router's accept loop, each worker socket's accept loop, and the
/// eviction sweeper.
#[derive(Clone)]
pub struct Services {
    pub config: Arc<TurnstileConfig>,
    pub sessions: Arc<SessionCache>,
    pub abuse: Arc<AbuseCache>,
    pub user_store: Arc<dyn UserStore>,
}

impl Services {
    pub fn new(config: TurnstileConfig, user_store: Arc<dyn UserStore>) -> Self {
        let abuse = Arc::new(AbuseCache::new(
            config.max_ip_fails,
            config.max_user_fails,
            config.block_duration_secs,
        ));
        Self {
            config: Arc::new(config),
            sessions: Arc::new(SessionCache::new()),
            abuse,
            user_store,
        }
    }
}
