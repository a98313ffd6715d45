//! Endpoint descriptors
//!
//! `trusttunnel_endpoint` prints a per-user TOML descriptor with everything
//! a client needs to connect. This module produces that file and projects
//! it into a [`ConnectionProfile`] for display.

use std::path::{Path, PathBuf};
use tracing::info;

use crate::command;
use crate::config::BotConfig;
use crate::error::{BotError, BotResult};

/// Tables that may hold descriptor fields besides the top level
const SECTIONS: [&str; 3] = ["endpoint", "client", "connection"];

/// Accepted spellings of the self-signed indicator
const SELF_SIGNED_KEYS: [&str; 4] = [
    "self_signed",
    "is_self_signed",
    "self_signed_certificate",
    "certificate_self_signed",
];

/// DNS shown when the descriptor pins no upstreams
pub const DEFAULT_DNS: &str = "default";

/// Generated endpoint descriptor on disk
#[derive(Debug, Clone)]
pub struct EndpointConfig {
    pub output_path: PathBuf,
    pub content: String,
}

/// Run the endpoint tool for `username` and store its output
pub async fn generate_endpoint_config(config: &BotConfig, username: &str) -> BotResult<EndpointConfig> {
    let (vpn_config, hosts_config, address) = match (
        &config.vpn_config,
        &config.hosts_config,
        &config.endpoint_public_address,
    ) {
        (Some(v), Some(h), Some(a)) => (v, h, a),
        _ => {
            return Err(BotError::Config(
                "vpn_config, hosts_config, and endpoint_public_address must be set".into(),
            ))
        }
    };

    let args = vec![
        vpn_config.display().to_string(),
        hosts_config.display().to_string(),
        "-c".to_string(),
        username.to_string(),
        "-a".to_string(),
        address.clone(),
    ];
    let output = command::run(&config.endpoint_binary, &args, config.command_timeout).await?;

    let output_path = config
        .output_dir
        .join(format!("{}.endpoint.toml", file_stem(username)));
    tokio::fs::write(&output_path, &output.stdout).await?;
    info!("Endpoint config for {} written to {:?}", username, output_path);

    Ok(EndpointConfig {
        output_path,
        content: output.stdout,
    })
}

/// Username reduced to characters safe in a file name
pub(crate) fn file_stem(username: &str) -> String {
    username
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.' { c } else { '_' })
        .collect()
}

/// Parsed descriptor with section-tolerant field lookup
#[derive(Debug, Clone)]
pub struct Descriptor {
    table: toml::Table,
}

impl Descriptor {
    pub fn load(path: &Path) -> BotResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content).map_err(|e| BotError::parse(path, e))
    }

    pub fn parse(content: &str) -> Result<Self, toml::de::Error> {
        Ok(Self {
            table: toml::from_str(content)?,
        })
    }

    /// First present key, top level first, then the known sections
    pub fn get(&self, keys: &[&str]) -> Option<&toml::Value> {
        keys.iter()
            .find_map(|k| self.table.get(*k))
            .or_else(|| {
                SECTIONS.iter().find_map(|section| {
                    let table = self.table.get(*section)?.as_table()?;
                    keys.iter().find_map(|k| table.get(*k))
                })
            })
            .filter(|v| !is_empty(v))
    }

    pub fn string(&self, keys: &[&str]) -> Option<String> {
        self.get(keys).map(scalar_string)
    }

    /// Strings, accepting a single scalar as a one-element list
    pub fn strings(&self, keys: &[&str]) -> Option<Vec<String>> {
        match self.get(keys)? {
            toml::Value::Array(items) => Some(items.iter().map(scalar_string).collect()),
            other => Some(vec![scalar_string(other)]),
        }
    }

    pub fn flag(&self, keys: &[&str]) -> Option<bool> {
        match self.get(keys)? {
            toml::Value::Boolean(b) => Some(*b),
            toml::Value::Integer(i) => Some(*i != 0),
            toml::Value::String(s) => Some(matches!(s.to_ascii_lowercase().as_str(), "true" | "yes" | "1")),
            _ => None,
        }
    }

    /// Required connection fields; fails naming every missing one
    pub fn required(&self) -> BotResult<RequiredFields> {
        let hostname = self.string(&["hostname"]);
        let addresses = self.strings(&["addresses"]);
        let username = self.string(&["username"]);
        let password = self.string(&["password"]);
        let protocol = self.string(&["upstream_protocol", "protocol"]);

        let mut missing: Vec<String> = [
            ("hostname", hostname.is_none()),
            ("addresses", addresses.is_none()),
            ("username", username.is_none()),
            ("password", password.is_none()),
            ("protocol", protocol.is_none()),
        ]
        .iter()
        .filter(|(_, absent)| *absent)
        .map(|(name, _)| name.to_string())
        .collect();

        match (hostname, addresses, username, password, protocol) {
            (Some(hostname), Some(addresses), Some(username), Some(password), Some(protocol)) => {
                Ok(RequiredFields {
                    hostname,
                    addresses,
                    username,
                    password,
                    protocol,
                })
            }
            _ => {
                missing.sort();
                Err(BotError::Validation { missing })
            }
        }
    }
}

/// Fields every descriptor must carry
#[derive(Debug, Clone)]
pub struct RequiredFields {
    pub hostname: String,
    pub addresses: Vec<String>,
    pub username: String,
    pub password: String,
    pub protocol: String,
}

fn is_empty(value: &toml::Value) -> bool {
    match value {
        toml::Value::String(s) => s.is_empty(),
        toml::Value::Array(a) => a.is_empty(),
        _ => false,
    }
}

fn scalar_string(value: &toml::Value) -> String {
    match value {
        toml::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Display projection of a descriptor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionProfile {
    pub hostname: String,
    pub address: String,
    pub username: String,
    pub password: String,
    pub protocol: String,
    pub dns: String,
    pub self_signed: bool,
}

pub fn build_connection_profile(endpoint_path: &Path) -> BotResult<ConnectionProfile> {
    profile_from_descriptor(&Descriptor::load(endpoint_path)?)
}

pub fn profile_from_descriptor(descriptor: &Descriptor) -> BotResult<ConnectionProfile> {
    let fields = descriptor.required()?;
    let dns = descriptor
        .strings(&["dns_upstreams", "dns"])
        .map(|d| d.join(", "))
        .unwrap_or_else(|| DEFAULT_DNS.to_string());

    Ok(ConnectionProfile {
        hostname: fields.hostname,
        address: fields.addresses.into_iter().next().unwrap_or_default(),
        username: fields.username,
        password: fields.password,
        protocol: fields.protocol,
        dns,
        self_signed: descriptor.flag(&SELF_SIGNED_KEYS).unwrap_or(false),
    })
}

/// Chat-ready summary of a profile
pub fn format_connection_profile(profile: &ConnectionProfile) -> String {
    let mut lines = vec![
        "Connection details:".to_string(),
        format!("Host: {}", profile.hostname),
        format!("Address: {}", profile.address),
        format!("Username: {}", profile.username),
        format!("Password: {}", profile.password),
        format!("Protocol: {}", profile.protocol),
        format!("DNS: {}", profile.dns),
    ];
    if profile.self_signed {
        lines.push(String::new());
        lines.push("Warning: the endpoint uses a self-signed certificate.".to_string());
    }
    lines.join("\n")
}
