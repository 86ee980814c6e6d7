pub mod config;
mod error;
pub mod hash;
pub mod session_key;
pub mod user_store;

pub use config::{validate_credential_lengths, TurnstileConfig};
pub use error::TurnstileError;
pub use session_key::generate_session_key;
pub use user_store::{AuthenticateOutcome, FileUserStore, RegisterOutcome, UserStore};
