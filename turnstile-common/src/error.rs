use std::net::AddrParseError;

/// Taxonomy of errors surfaced by the core. Startup errors (`ConfigInvalid`,
/// `IoSetupFailed`) abort the affected component; per-request errors
/// (`ProtocolMalformed`, `CredentialFailed`, `RateLimited`,
/// `CapacityExhausted`) are handled inline and never kill the owning task.
#[derive(thiserror::Error, Debug)]
pub enum TurnstileError {
    #[error("invalid configuration: {0}")]
    ConfigInvalid(String),

    #[error("I/O setup failed: {0}")]
    IoSetupFailed(#[from] std::io::Error),

    #[error("malformed request: {0}")]
    ProtocolMalformed(String),

    #[error("invalid username or password")]
    CredentialFailed,

    #[error("too many failed attempts")]
    RateLimited,

    #[error("no worker socket capacity available")]
    CapacityExhausted,

    #[error("session key source failed: {0}")]
    KeySourceFailed(String),

    #[error("user {0} already exists")]
    UserAlreadyExists(String),

    #[error("user {0} not found")]
    UserNotFound(String),

    #[error("failed to parse address: {0}")]
    AddrParse(#[from] AddrParseError),

    #[error("user store error: {0}")]
    UserStore(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
