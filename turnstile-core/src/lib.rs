pub mod abuse_cache;
pub mod services;
pub mod session_cache;

pub use abuse_cache::AbuseCache;
pub use services::Services;
pub use session_cache::{InsertOutcome, SessionCache, SessionEntry};
