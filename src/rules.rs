//! Rule Store
//!
//! Access rules live in a `[[rule]]` array next to the VPN config. The bot
//! only displays them.

use serde::Deserialize;
use std::path::Path;

use crate::credentials::write_atomic;
use crate::error::{BotError, BotResult};
use crate::toml_text;

/// Shown when the file holds no rules
pub const NO_RULES: &str = "Rules: (no rules)";

/// Access rule
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rule {
    pub cidr: Option<String>,
    pub client_random_prefix: Option<String>,
    pub action: String,
}

#[derive(Debug, Default, Deserialize)]
struct RulesFile {
    #[serde(default)]
    rule: Vec<toml::Table>,
}

/// Load rules; an absent file has no rules
pub fn load(path: &Path) -> BotResult<Vec<Rule>> {
    if !path.exists() {
        return Ok(Vec::new());
    }

    let content = std::fs::read_to_string(path)?;
    let file: RulesFile = toml::from_str(&content).map_err(|e| BotError::parse(path, e))?;

    file.rule
        .iter()
        .map(|entry| {
            let action = scalar(entry, "action")
                .ok_or_else(|| BotError::parse(path, "each rule must have an action"))?;
            Ok(Rule {
                cidr: scalar(entry, "cidr"),
                client_random_prefix: scalar(entry, "client_random_prefix"),
                action,
            })
        })
        .collect()
}

/// Write rules in canonical form, omitting unset match criteria
pub fn save(path: &Path, rules: &[Rule]) -> BotResult<()> {
    let mut lines = Vec::new();
    for rule in rules {
        lines.push("[[rule]]".to_string());
        if let Some(cidr) = &rule.cidr {
            lines.push(format!("cidr = {}", toml_text::string(cidr)));
        }
        if let Some(prefix) = &rule.client_random_prefix {
            lines.push(format!("client_random_prefix = {}", toml_text::string(prefix)));
        }
        lines.push(format!("action = {}", toml_text::string(&rule.action)));
        lines.push(String::new());
    }
    write_atomic(path, &toml_text::finish(&lines))
}

/// Bullet list for chat display
pub fn format_summary(rules: &[Rule]) -> String {
    if rules.is_empty() {
        return NO_RULES.to_string();
    }

    let mut lines = vec!["Rules:".to_string()];
    for rule in rules {
        let mut parts = Vec::with_capacity(3);
        if let Some(cidr) = &rule.cidr {
            parts.push(format!("cidr={}", cidr));
        }
        if let Some(prefix) = &rule.client_random_prefix {
            parts.push(format!("client_random_prefix={}", prefix));
        }
        parts.push(format!("action={}", rule.action));
        lines.push(format!("- {}", parts.join(", ")));
    }
    lines.join("\n")
}

/// Non-empty scalar rendered as a string (`action = "deny"` or `cidr = 10`)
fn scalar(table: &toml::Table, key: &str) -> Option<String> {
    match table.get(key)? {
        toml::Value::String(s) if s.is_empty() => None,
        toml::Value::String(s) => Some(s.clone()),
        toml::Value::Boolean(false) => None,
        toml::Value::Array(_) | toml::Value::Table(_) => None,
        other => Some(other.to_string()),
    }
}
