//! Credential store
//!
//! Maps a login and password to a display nickname, and records nickname
//! changes. [`CredentialStore`] is the seam the session talks to;
//! [`UserStore`] is the JSON-file backed implementation the binary uses.

use std::future::Future;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::error::StoreError;

/// Looks up users and persists their nickname.
///
/// `Send + Sync + 'static` because one store is shared by every session task.
pub trait CredentialStore: Send + Sync + 'static {
    /// Returns the nickname for a matching login/password, or `None`.
    fn lookup(
        &self,
        login: &str,
        password: &str,
    ) -> impl Future<Output = Result<Option<String>, StoreError>> + Send;

    /// Records a new nickname for `login`.
    fn update_nickname(
        &self,
        login: &str,
        nick: &str,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;
}

/// One row of the user file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    pub login: String,
    pub password: String,
    pub nick: String,
}

impl UserRecord {
    pub fn new(login: &str, password: &str, nick: &str) -> Self {
        Self {
            login: login.to_string(),
            password: password.to_string(),
            nick: nick.to_string(),
        }
    }
}

/// User table kept in memory, optionally mirrored to a JSON file
#[derive(Debug)]
pub struct UserStore {
    users: RwLock<Vec<UserRecord>>,
    path: Option<PathBuf>,
}

impl UserStore {
    /// A store with no backing file
    pub fn in_memory(users: Vec<UserRecord>) -> Self {
        Self {
            users: RwLock::new(users),
            path: None,
        }
    }

    /// Load users from a JSON array of `{login, password, nick}`
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let raw = tokio::fs::read_to_string(&path).await?;
        let users: Vec<UserRecord> = serde_json::from_str(&raw)?;
        info!("Loaded {} users from {}", users.len(), path.display());
        Ok(Self {
            users: RwLock::new(users),
            path: Some(path),
        })
    }

    /// Current nickname on record for `login`
    pub async fn nick_of(&self, login: &str) -> Option<String> {
        self.users
            .read()
            .await
            .iter()
            .find(|u| u.login == login)
            .map(|u| u.nick.clone())
    }

    async fn save(&self, users: &[UserRecord]) -> Result<(), StoreError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let json = serde_json::to_string_pretty(users)?;
        tokio::fs::write(path, json).await?;
        debug!("Saved {} users to {}", users.len(), path.display());
        Ok(())
    }
}

impl CredentialStore for UserStore {
    async fn lookup(&self, login: &str, password: &str) -> Result<Option<String>, StoreError> {
        let users = self.users.read().await;
        Ok(users
            .iter()
            .find(|u| u.login == login && u.password == password)
            .map(|u| u.nick.clone()))
    }

    async fn update_nickname(&self, login: &str, nick: &str) -> Result<(), StoreError> {
        let mut users = self.users.write().await;
        let user = users
            .iter_mut()
            .find(|u| u.login == login)
            .ok_or_else(|| StoreError::UnknownLogin(login.to_string()))?;
        user.nick = nick.to_string();
        self.save(&users).await
    }
}
