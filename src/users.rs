//! User Management
//!
//! Add/remove VPN users: read the credentials file, mutate, write it back,
//! then tell the VPN service to reload.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use parking_lot::Mutex;
use rand::RngCore;
use std::path::PathBuf;
use tracing::info;

use crate::config::BotConfig;
use crate::credentials::{self, Credential};
use crate::error::{BotError, BotResult};
use crate::reload::ReloadNotifier;

/// Random bytes behind a generated password (16 URL-safe characters)
const PASSWORD_BYTES: usize = 12;

/// Outcome of a credential mutation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserChangeResult {
    pub updated_path: PathBuf,
    pub used_hot_reload: bool,
}

/// Serializes credential mutations within this process
pub struct UserManager {
    credentials_file: PathBuf,
    notifier: ReloadNotifier,
    write_lock: Mutex<()>,
}

impl UserManager {
    pub fn new(credentials_file: PathBuf, notifier: ReloadNotifier) -> Self {
        Self {
            credentials_file,
            notifier,
            write_lock: Mutex::new(()),
        }
    }

    pub fn from_config(config: &BotConfig) -> Self {
        Self::new(config.credentials_file.clone(), ReloadNotifier::from_config(config))
    }

    /// Usernames in file order
    pub fn list_users(&self) -> BotResult<Vec<String>> {
        Ok(credentials::load(&self.credentials_file)?
            .into_iter()
            .map(|c| c.username)
            .collect())
    }

    pub async fn add_user(&self, username: &str, password: &str) -> BotResult<UserChangeResult> {
        {
            let _guard = self.write_lock.lock();
            let mut creds = credentials::load(&self.credentials_file)?;
            if creds.iter().any(|c| c.username == username) {
                return Err(BotError::DuplicateUser(username.to_string()));
            }
            creds.push(Credential::new(username, password));
            credentials::save(&self.credentials_file, &creds)?;
        }
        info!("Added VPN user {}", username);
        Ok(self.apply().await)
    }

    pub async fn delete_user(&self, username: &str) -> BotResult<UserChangeResult> {
        {
            let _guard = self.write_lock.lock();
            let creds = credentials::load(&self.credentials_file)?;
            let before = creds.len();
            let remaining: Vec<Credential> =
                creds.into_iter().filter(|c| c.username != username).collect();
            if remaining.len() == before {
                return Err(BotError::UserNotFound(username.to_string()));
            }
            credentials::save(&self.credentials_file, &remaining)?;
        }
        info!("Deleted VPN user {}", username);
        Ok(self.apply().await)
    }

    async fn apply(&self) -> UserChangeResult {
        let reload = self.notifier.notify().await;
        UserChangeResult {
            updated_path: self.credentials_file.clone(),
            used_hot_reload: reload.used_hot_reload,
        }
    }
}

/// Fresh URL-safe password
pub fn generate_password() -> String {
    let mut bytes = [0u8; PASSWORD_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn manager(dir: &TempDir) -> UserManager {
        UserManager::new(
            dir.path().join("credentials.toml"),
            ReloadNotifier::new(None, vec!["true".into()]),
        )
    }

    #[tokio::test]
    async fn test_add_then_list() {
        let dir = TempDir::new().unwrap();
        let users = manager(&dir);

        let result = users.add_user("alice", "pw").await.unwrap();
        assert!(!result.used_hot_reload);
        assert_eq!(result.updated_path, dir.path().join("credentials.toml"));
        assert_eq!(users.list_users().unwrap(), vec!["alice"]);
    }

    #[tokio::test]
    async fn test_duplicate_leaves_store_unchanged() {
        let dir = TempDir::new().unwrap();
        let users = manager(&dir);
        users.add_user("alice", "first").await.unwrap();
        let before = std::fs::read_to_string(dir.path().join("credentials.toml")).unwrap();

        let err = users.add_user("alice", "second").await.unwrap_err();
        assert!(matches!(err, BotError::DuplicateUser(ref u) if u == "alice"));
        let after = std::fs::read_to_string(dir.path().join("credentials.toml")).unwrap();
        assert_eq!(before, after);
    }

    #[tokio::test]
    async fn test_delete_preserves_order() {
        let dir = TempDir::new().unwrap();
        let users = manager(&dir);
        for name in ["a", "b", "c", "d"] {
            users.add_user(name, "pw").await.unwrap();
        }

        users.delete_user("b").await.unwrap();
        assert_eq!(users.list_users().unwrap(), vec!["a", "c", "d"]);
    }

    #[tokio::test]
    async fn test_delete_missing_user() {
        let dir = TempDir::new().unwrap();
        let users = manager(&dir);
        users.add_user("alice", "pw").await.unwrap();

        let err = users.delete_user("mallory").await.unwrap_err();
        assert!(matches!(err, BotError::UserNotFound(_)));
        assert_eq!(users.list_users().unwrap(), vec!["alice"]);
    }

    #[test]
    fn test_generated_password() {
        let a = generate_password();
        let b = generate_password();
        assert_eq!(a.len(), 16);
        assert_ne!(a, b);
        assert!(a.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }
}
