//! Credential Store
//!
//! Flat TOML file of `[[client]]` tables, each with a `username` and a
//! `password`. The file is the single source of truth: every operation
//! re-reads it.

use serde::Deserialize;
use std::path::Path;
use tracing::debug;

use crate::error::{BotError, BotResult};
use crate::toml_text;

/// VPN client credential
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credential {
    pub username: String,
    pub password: String,
}

impl Credential {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct CredentialsFile {
    #[serde(default)]
    client: Vec<ClientEntry>,
}

#[derive(Debug, Deserialize)]
struct ClientEntry {
    username: Option<String>,
    password: Option<String>,
}

/// Load credentials; an absent file is an empty store
pub fn load(path: &Path) -> BotResult<Vec<Credential>> {
    if !path.exists() {
        debug!("Credentials file {:?} absent, treating as empty", path);
        return Ok(Vec::new());
    }

    let content = std::fs::read_to_string(path)?;
    let file: CredentialsFile =
        toml::from_str(&content).map_err(|e| BotError::parse(path, e))?;

    file.client
        .into_iter()
        .map(|entry| match (entry.username, entry.password) {
            (Some(username), Some(password)) if !username.is_empty() && !password.is_empty() => {
                Ok(Credential { username, password })
            }
            _ => Err(BotError::parse(path, "each client must have username and password")),
        })
        .collect()
}

/// Render credentials in canonical form
pub fn render(credentials: &[Credential]) -> String {
    let mut lines = Vec::with_capacity(credentials.len() * 4);
    for credential in credentials {
        lines.push("[[client]]".to_string());
        lines.push(format!("username = {}", toml_text::string(&credential.username)));
        lines.push(format!("password = {}", toml_text::string(&credential.password)));
        lines.push(String::new());
    }
    toml_text::finish(&lines)
}

/// Replace the file contents atomically (temp file in the same directory, then rename)
pub fn save(path: &Path, credentials: &[Credential]) -> BotResult<()> {
    write_atomic(path, &render(credentials))?;
    debug!("Saved {} credentials to {:?}", credentials.len(), path);
    Ok(())
}

pub(crate) fn write_atomic(path: &Path, content: &str) -> BotResult<()> {
    use std::io::Write;

    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(content.as_bytes())?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| BotError::Io(e.error))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_is_empty() {
        let dir = TempDir::new().unwrap();
        let creds = load(&dir.path().join("nope.toml")).unwrap();
        assert!(creds.is_empty());
    }

    #[test]
    fn test_save_and_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("credentials.toml");
        let creds = vec![
            Credential::new("alice", "s3cret"),
            Credential::new("bob", "pa\"ss\\word"),
        ];

        save(&path, &creds).unwrap();
        assert_eq!(load(&path).unwrap(), creds);
    }

    #[test]
    fn test_canonical_layout() {
        let rendered = render(&[Credential::new("alice", "pw1"), Credential::new("bob", "pw2")]);
        assert_eq!(
            rendered,
            "[[client]]\nusername = \"alice\"\npassword = \"pw1\"\n\n[[client]]\nusername = \"bob\"\npassword = \"pw2\"\n"
        );
        assert_eq!(render(&[]), "");
    }

    #[test]
    fn test_resave_is_noop() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("credentials.toml");
        std::fs::write(
            &path,
            "[[client]]\nusername = \"alice\"\npassword = \"x\"\n\n[[client]]\nusername = \"bob\"\npassword = \"y\"\n",
        )
        .unwrap();

        let before = std::fs::read_to_string(&path).unwrap();
        save(&path, &load(&path).unwrap()).unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), before);
    }

    #[test]
    fn test_record_without_password_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("credentials.toml");
        std::fs::write(&path, "[[client]]\nusername = \"alice\"\n").unwrap();

        let err = load(&path).unwrap_err();
        assert!(matches!(err, BotError::Parse { .. }));
    }

    #[test]
    fn test_malformed_file_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("credentials.toml");
        std::fs::write(&path, "[[client]\nusername = ").unwrap();

        assert!(matches!(load(&path).unwrap_err(), BotError::Parse { .. }));
    }
}
