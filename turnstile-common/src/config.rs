use serde::{Deserialize, Serialize};

use crate::TurnstileError;

fn _default_main_port() -> u16 {
    8080
}

fn _default_user_port_start() -> u16 {
    8081
}

fn _default_number_of_users() -> u32 {
    1000
}

fn _default_sockets_per_bucket() -> u32 {
    10
}

fn _default_users_per_socket() -> u32 {
    10
}

fn _default_max_ip_fails() -> u32 {
    10
}

fn _default_max_user_fails() -> u32 {
    5
}

fn _default_block_duration_secs() -> u64 {
    300
}

fn _default_backoff_multiplier() -> u32 {
    2
}

fn _default_connection_timeout_secs() -> u64 {
    600
}

fn _default_eviction_sweep_secs() -> u64 {
    30
}

fn _default_epoll_timeout_ms() -> u64 {
    100
}

fn _default_max_message_size() -> usize {
    4096
}

fn _default_backlog() -> u32 {
    1024
}

fn _default_data_dir() -> String {
    "./data".to_owned()
}

/// Startup configuration for the router and its worker-socket pool.
///
/// Loaded from `config.yaml` plus `TURNSTILE_*` environment overrides
/// (see [`crate::config::load`] in the `turnstile` binary crate).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TurnstileConfig {
    #[serde(default = "_default_main_port")]
    pub main_port: u16,

    #[serde(default = "_default_user_port_start")]
    pub user_port_start: u16,

    #[serde(default = "_default_number_of_users")]
    pub number_of_users: u32,

    #[serde(default = "_default_sockets_per_bucket")]
    pub sockets_per_bucket: u32,

    #[serde(default = "_default_users_per_socket")]
    pub users_per_socket: u32,

    #[serde(default = "_default_max_ip_fails")]
    pub max_ip_fails: u32,

    #[serde(default = "_default_max_user_fails")]
    pub max_user_fails: u32,

    #[serde(default = "_default_block_duration_secs")]
    pub block_duration_secs: u64,

    #[serde(default = "_default_backoff_multiplier")]
    pub backoff_multiplier: u32,

    #[serde(default = "_default_connection_timeout_secs")]
    pub connection_timeout_secs: u64,

    #[serde(default = "_default_eviction_sweep_secs")]
    pub eviction_sweep_secs: u64,

    #[serde(default = "_default_epoll_timeout_ms")]
    pub epoll_timeout_ms: u64,

    #[serde(default = "_default_max_message_size")]
    pub max_message_size: usize,

    #[serde(default = "_default_backlog")]
    pub backlog: u32,

    #[serde(default = "_default_data_dir")]
    pub data_dir: String,
}

impl Default for TurnstileConfig {
    fn default() -> Self {
        Self {
            main_port: _default_main_port(),
            user_port_start: _default_user_port_start(),
            number_of_users: _default_number_of_users(),
            sockets_per_bucket: _default_sockets_per_bucket(),
            users_per_socket: _default_users_per_socket(),
            max_ip_fails: _default_max_ip_fails(),
            max_user_fails: _default_max_user_fails(),
            block_duration_secs: _default_block_duration_secs(),
            backoff_multiplier: _default_backoff_multiplier(),
            connection_timeout_secs: _default_connection_timeout_secs(),
            eviction_sweep_secs: _default_eviction_sweep_secs(),
            epoll_timeout_ms: _default_epoll_timeout_ms(),
            max_message_size: _default_max_message_size(),
            backlog: _default_backlog(),
            data_dir: _default_data_dir(),
        }
    }
}

impl TurnstileConfig {
    /// Number of buckets needed to cover `number_of_users`, per spec
    /// §4.5.1: `ceil(number_of_users / (users_per_socket * sockets_per_bucket))`.
    pub fn bucket_count(&self) -> u32 {
        let per_bucket = self.users_per_socket * self.sockets_per_bucket;
        self.number_of_users.div_ceil(per_bucket)
    }

    /// Validates the ranges and invariants this configuration requires at
    /// startup. Invalid configuration must abort the process before any
    /// socket is bound.
    pub fn validate(&self) -> Result<(), TurnstileError> {
        let in_port_range = |p: u16| (1024..=65535).contains(&p);

        if !in_port_range(self.main_port) {
            return Err(TurnstileError::ConfigInvalid(format!(
                "main_port {} is outside [1024, 65535]",
                self.main_port
            )));
        }
        if !in_port_range(self.user_port_start) {
            return Err(TurnstileError::ConfigInvalid(format!(
                "user_port_start {} is outside [1024, 65535]",
                self.user_port_start
            )));
        }
        if self.user_port_start <= self.main_port {
            return Err(TurnstileError::ConfigInvalid(
                "user_port_start must be greater than main_port".into(),
            ));
        }
        if self.sockets_per_bucket == 0 || self.users_per_socket == 0 {
            return Err(TurnstileError::ConfigInvalid(
                "sockets_per_bucket and users_per_socket must be nonzero".into(),
            ));
        }
        if self.number_of_users == 0 {
            return Err(TurnstileError::ConfigInvalid(
                "number_of_users must be nonzero".into(),
            ));
        }
        if self.backoff_multiplier <= 1 {
            return Err(TurnstileError::ConfigInvalid(
                "backoff_multiplier must be greater than 1".into(),
            ));
        }

        let total_sockets = self.bucket_count() * self.sockets_per_bucket;
        let highest_port = self.user_port_start as u32 + total_sockets.saturating_sub(1);
        if highest_port > 65535 {
            return Err(TurnstileError::ConfigInvalid(format!(
                "worker port range [{}, {highest_port}] overflows past 65535 for {total_sockets} sockets",
                self.user_port_start,
            )));
        }

        Ok(())
    }
}

/// Username/password bounds referenced by the wire protocol and
/// enforced before a credential ever reaches the user store.
pub const MAX_USERNAME_LEN: usize = 31;
pub const MAX_PASSWORD_LEN: usize = 63;
pub const MIN_CREDENTIAL_LEN: usize = 1;
pub const MAX_CREDENTIAL_LEN: usize = 255;

pub fn validate_credential_lengths(username: &str, password: &str) -> Result<(), TurnstileError> {
    if username.is_empty() || username.len() > MAX_USERNAME_LEN {
        return Err(TurnstileError::ProtocolMalformed(format!(
            "username length must be 1..={MAX_USERNAME_LEN} bytes"
        )));
    }
    if password.is_empty() || password.len() > MAX_PASSWORD_LEN {
        return Err(TurnstileError::ProtocolMalformed(format!(
            "password length must be 1..={MAX_PASSWORD_LEN} bytes"
        )));
    }
    if username.len() < MIN_CREDENTIAL_LEN
        || username.len() > MAX_CREDENTIAL_LEN
        || password.len() < MIN_CREDENTIAL_LEN
        || password.len() > MAX_CREDENTIAL_LEN
    {
        return Err(TurnstileError::ProtocolMalformed(
            "credential length out of bounds".into(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        TurnstileConfig::default().validate().unwrap();
    }

    #[test]
    fn rejects_overlapping_ports() {
        let mut cfg = TurnstileConfig::default();
        cfg.user_port_start = cfg.main_port;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rejects_weak_backoff_multiplier() {
        let mut cfg = TurnstileConfig::default();
        cfg.backoff_multiplier = 1;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn bucket_count_matches_spec_example() {
        let cfg = TurnstileConfig {
            number_of_users: 10,
            sockets_per_bucket: 2,
            users_per_socket: 5,
            ..Default::default()
        };
        assert_eq!(cfg.bucket_count(), 1);
    }
}
