//! Configuration management
//!
//! The bot reads a single TOML file at startup (`bot.toml` by default).
//! A few secrets may also come from the environment so they can live in
//! a `.env` file next to the binary.

use serde::Deserialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{BotError, BotResult};

/// Default timeout for external commands
pub const DEFAULT_COMMAND_TIMEOUT_SECS: u64 = 10;

/// On-disk shape of `bot.toml`
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ConfigFile {
    credentials_file: Option<PathBuf>,
    telegram_token: Option<String>,
    admin_ids: Vec<u64>,
    reload_endpoint: Option<String>,
    vpn_config: Option<PathBuf>,
    hosts_config: Option<PathBuf>,
    endpoint_public_address: Option<String>,
    dns_upstreams: Option<Vec<String>>,
    rules_file: Option<PathBuf>,
    endpoint_command_timeout_s: Option<u64>,
    restart_command: Option<Vec<String>>,
    endpoint_binary: Option<String>,
    client_binary: Option<String>,
    output_dir: Option<PathBuf>,
    session_ttl_secs: Option<u64>,
    max_sessions: Option<u64>,
}

/// Bot configuration, immutable for the process lifetime
#[derive(Debug, Clone)]
pub struct BotConfig {
    /// Credentials file (`[[client]]` tables)
    pub credentials_file: PathBuf,

    /// Telegram bot token
    pub telegram_token: Option<String>,

    /// Telegram user ids allowed to manage users
    pub admin_ids: HashSet<u64>,

    /// Hot reload URL (POST)
    pub reload_endpoint: Option<String>,

    /// Restart command used when hot reload is unavailable
    pub restart_command: Vec<String>,

    /// VPN server config passed to the endpoint tool
    pub vpn_config: Option<PathBuf>,

    /// Hosts config passed to the endpoint tool
    pub hosts_config: Option<PathBuf>,

    /// Public address clients connect to
    pub endpoint_public_address: Option<String>,

    /// DNS upstreams forced into every generated client config
    pub dns_upstreams: Option<Vec<String>>,

    /// Rules file (`[[rule]]` tables)
    pub rules_file: Option<PathBuf>,

    /// Timeout for external commands
    pub command_timeout: Duration,

    pub endpoint_binary: String,
    pub client_binary: String,

    /// Where generated descriptors and client configs are written
    pub output_dir: PathBuf,

    /// Idle time after which a chat session is forgotten
    pub session_ttl: Duration,

    /// Upper bound on tracked chat sessions
    pub max_sessions: u64,
}

impl BotConfig {
    /// Minimal configuration around a credentials file, everything else defaulted
    pub fn new(credentials_file: impl Into<PathBuf>) -> Self {
        Self {
            credentials_file: credentials_file.into(),
            telegram_token: None,
            admin_ids: HashSet::new(),
            reload_endpoint: None,
            restart_command: default_restart_command(),
            vpn_config: None,
            hosts_config: None,
            endpoint_public_address: None,
            dns_upstreams: None,
            rules_file: None,
            command_timeout: Duration::from_secs(DEFAULT_COMMAND_TIMEOUT_SECS),
            endpoint_binary: "trusttunnel_endpoint".to_string(),
            client_binary: "trusttunnel_client".to_string(),
            output_dir: std::env::temp_dir(),
            session_ttl: Duration::from_secs(3600),
            max_sessions: 10_000,
        }
    }

    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> BotResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            BotError::Config(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_toml(&content)
    }

    /// Parse configuration from TOML text
    pub fn from_toml(content: &str) -> BotResult<Self> {
        let file: ConfigFile =
            toml::from_str(content).map_err(|e| BotError::Config(e.to_string()))?;

        let credentials_file = file
            .credentials_file
            .ok_or_else(|| BotError::Config("credentials_file is required in bot config".into()))?;

        let mut config = Self::new(credentials_file);
        config.telegram_token = file.telegram_token.filter(|t| !t.trim().is_empty());
        config.admin_ids = file.admin_ids.into_iter().collect();
        config.reload_endpoint = file.reload_endpoint.filter(|u| !u.trim().is_empty());
        config.vpn_config = file.vpn_config;
        config.hosts_config = file.hosts_config;
        config.endpoint_public_address = file.endpoint_public_address.filter(|a| !a.is_empty());
        config.dns_upstreams = file.dns_upstreams.filter(|d| !d.is_empty());
        config.rules_file = file.rules_file;

        if let Some(secs) = file.endpoint_command_timeout_s {
            if secs == 0 {
                return Err(BotError::Config(
                    "endpoint_command_timeout_s must be positive".into(),
                ));
            }
            config.command_timeout = Duration::from_secs(secs);
        }
        if let Some(cmd) = file.restart_command {
            if cmd.is_empty() {
                return Err(BotError::Config("restart_command must not be empty".into()));
            }
            config.restart_command = cmd;
        }
        if let Some(bin) = file.endpoint_binary {
            config.endpoint_binary = bin;
        }
        if let Some(bin) = file.client_binary {
            config.client_binary = bin;
        }
        if let Some(dir) = file.output_dir {
            config.output_dir = dir;
        }
        if let Some(secs) = file.session_ttl_secs {
            config.session_ttl = Duration::from_secs(secs);
        }
        if let Some(max) = file.max_sessions {
            config.max_sessions = max;
        }

        Ok(config)
    }

    /// Apply `TELEGRAM_BOT_TOKEN` / `TELOXIDE_TOKEN` and `TRUSTTUNNEL_ADMIN_IDS`
    pub fn with_env_overrides(mut self) -> Self {
        let token = std::env::var("TELEGRAM_BOT_TOKEN")
            .or_else(|_| std::env::var("TELOXIDE_TOKEN"))
            .ok()
            .filter(|t| !t.trim().is_empty());
        if token.is_some() {
            self.telegram_token = token;
        }

        if let Ok(ids) = std::env::var("TRUSTTUNNEL_ADMIN_IDS") {
            let parsed = parse_admin_ids(&ids);
            if !parsed.is_empty() {
                self.admin_ids = parsed;
            }
        }

        self
    }

    /// Settings the Telegram front-end cannot run without
    pub fn validate_for_bot(&self) -> BotResult<()> {
        if self.telegram_token.is_none() {
            return Err(BotError::Config("telegram_token must be set in bot.toml".into()));
        }
        if self.admin_ids.is_empty() {
            return Err(BotError::Config("admin_ids must be set in bot.toml".into()));
        }
        Ok(())
    }

    pub fn is_admin(&self, user_id: u64) -> bool {
        self.admin_ids.contains(&user_id)
    }
}

fn default_restart_command() -> Vec<String> {
    vec!["systemctl".into(), "restart".into(), "trusttunnel".into()]
}

fn parse_admin_ids(raw: &str) -> HashSet<u64> {
    raw.split(',')
        .filter_map(|s| s.trim().parse().ok())
        .collect()
}
