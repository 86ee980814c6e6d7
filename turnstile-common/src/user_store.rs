use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::hash::{hash_password, verify_password};
use crate::TurnstileError;

/// Outcome of a registration attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegisterOutcome {
    Ok,
    AlreadyExists,
}

/// Outcome of a credential check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthenticateOutcome {
    Ok,
    Failed,
}

/// Persistent credential CRUD and login bookkeeping, consumed by the
/// router through exactly this contract. Password storage and hashing
/// live behind it.
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn register(&self, username: &str, password: &str) -> Result<RegisterOutcome, TurnstileError>;
    async fn authenticate(&self, username: &str, password: &str) -> Result<AuthenticateOutcome, TurnstileError>;
    async fn touch_last_login(&self, username: &str) -> Result<(), TurnstileError>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct UserRecord {
    username: String,
    password_hash: String,
    #[serde(default)]
    last_login: Option<DateTime<Utc>>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct UserFile {
    #[serde(default)]
    users: Vec<UserRecord>,
}

/// File-backed [`UserStore`], persisting argon2id-hashed passwords to a
/// YAML file under the configured data directory.
pub struct FileUserStore {
    path: PathBuf,
    users: RwLock<HashMap<String, UserRecord>>,
}

impl FileUserStore {
    pub async fn open(data_dir: &Path) -> Result<Self, TurnstileError> {
        tokio::fs::create_dir_all(data_dir).await?;
        let path = data_dir.join("users.yaml");

        let users = if path.exists() {
            let contents = tokio::fs::read_to_string(&path).await?;
            let file: UserFile = serde_yaml::from_str(&contents)
                .map_err(|e| TurnstileError::UserStore(e.to_string()))?;
            file.users
                .into_iter()
                .map(|u| (u.username.clone(), u))
                .collect()
        } else {
            HashMap::new()
        };

        let store = Self {
            path,
            users: RwLock::new(users),
        };
        store.flush().await?;
        Ok(store)
    }

    async fn flush(&self) -> Result<(), TurnstileError> {
        let users = self.users.read().await;
        let file = UserFile {
            users: users.values().cloned().collect(),
        };
        let serialized =
            serde_yaml::to_string(&file).map_err(|e| TurnstileError::UserStore(e.to_string()))?;
        tokio::fs::write(&self.path, serialized).await?;
        Ok(())
    }
}

#[async_trait]
impl UserStore for FileUserStore {
    async fn register(&self, username: &str, password: &str) -> Result<RegisterOutcome, TurnstileError> {
        {
            let users = self.users.read().await;
            if users.contains_key(username) {
                return Ok(RegisterOutcome::AlreadyExists);
            }
        }

        let password_hash = hash_password(password)?;
        {
            let mut users = self.users.write().await;
            if users.contains_key(username) {
                return Ok(RegisterOutcome::AlreadyExists);
            }
            users.insert(
                username.to_owned(),
                UserRecord {
                    username: username.to_owned(),
                    password_hash,
                    last_login: None,
                },
            );
        }
        self.flush().await?;
        Ok(RegisterOutcome::Ok)
    }

    async fn authenticate(&self, username: &str, password: &str) -> Result<AuthenticateOutcome, TurnstileError> {
        let hash = {
            let users = self.users.read().await;
            match users.get(username) {
                Some(record) => record.password_hash.clone(),
                None => return Ok(AuthenticateOutcome::Failed),
            }
        };

        if verify_password(password, &hash)? {
            Ok(AuthenticateOutcome::Ok)
        } else {
            Ok(AuthenticateOutcome::Failed)
        }
    }

    async fn touch_last_login(&self, username: &str) -> Result<(), TurnstileError> {
        {
            let mut users = self.users.write().await;
            match users.get_mut(username) {
                Some(record) => record.last_login = Some(Utc::now()),
                None => return Err(TurnstileError::UserNotFound(username.to_owned())),
            }
        }
        self.flush().await
    }
}
