//! Client config generation
//!
//! Preferred path: `trusttunnel_client setup_wizard` in non-interactive mode.
//! When the tool is missing or fails, the client config is rendered from the
//! endpoint descriptor directly. A configured DNS override is applied to the
//! result either way.

use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::command;
use crate::config::BotConfig;
use crate::endpoint::Descriptor;
use crate::error::BotResult;
use crate::toml_text;

/// Generated client config on disk
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub output_path: PathBuf,
    pub content: String,
    pub used_external_tool: bool,
    /// The client will not verify the endpoint certificate
    pub skip_verification: bool,
}

/// Produces client configs from endpoint descriptors
#[derive(Debug, Clone)]
pub struct ClientConfigGenerator {
    client_binary: String,
    timeout: Duration,
}

impl ClientConfigGenerator {
    pub fn new(client_binary: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client_binary: client_binary.into(),
            timeout,
        }
    }

    pub fn from_config(config: &BotConfig) -> Self {
        Self::new(config.client_binary.clone(), config.command_timeout)
    }

    pub async fn generate(
        &self,
        endpoint_path: &Path,
        prefer_external_tool: bool,
        dns_override: Option<&[String]>,
    ) -> BotResult<ClientConfig> {
        let output_path = client_config_path(endpoint_path);
        let dns_override = dns_override.filter(|d| !d.is_empty());

        if prefer_external_tool {
            if let Some(mut result) = self.try_setup_wizard(endpoint_path, &output_path).await {
                if let Some(dns) = dns_override {
                    result.content = merge_dns_upstreams(&result.content, dns);
                    tokio::fs::write(&output_path, &result.content).await?;
                }
                return Ok(result);
            }
        }

        let descriptor = Descriptor::load(endpoint_path)?;
        let (content, skip_verification) = render_from_descriptor(&descriptor, dns_override)?;
        tokio::fs::write(&output_path, &content).await?;
        info!("Client config rendered from descriptor into {:?}", output_path);

        Ok(ClientConfig {
            output_path,
            content,
            used_external_tool: false,
            skip_verification,
        })
    }

    async fn try_setup_wizard(&self, endpoint_path: &Path, output_path: &Path) -> Option<ClientConfig> {
        // A leftover file from an earlier run must not pass for fresh output
        if let Err(e) = tokio::fs::remove_file(output_path).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!("Cannot remove stale {:?}: {}", output_path, e);
            }
        }

        let args = vec![
            "setup_wizard".to_string(),
            "--mode".to_string(),
            "non-interactive".to_string(),
            "--endpoint_config".to_string(),
            endpoint_path.display().to_string(),
            "--settings".to_string(),
            output_path.display().to_string(),
        ];
        if let Err(e) = command::run(&self.client_binary, &args, self.timeout).await {
            debug!("Setup wizard unavailable, rendering manually: {}", e);
            return None;
        }

        let content = match tokio::fs::read_to_string(output_path).await {
            Ok(content) => content,
            Err(e) => {
                debug!("Setup wizard produced no settings file: {}", e);
                return None;
            }
        };
        let skip_verification = Descriptor::parse(&content)
            .ok()
            .and_then(|d| d.flag(&["skip_verification"]))
            .unwrap_or(false);

        info!("Client config generated by setup wizard into {:?}", output_path);
        Some(ClientConfig {
            output_path: output_path.to_path_buf(),
            content,
            used_external_tool: true,
            skip_verification,
        })
    }
}

/// `<user>.endpoint.toml` -> `<user>.client.toml` in the same directory
pub fn client_config_path(endpoint_path: &Path) -> PathBuf {
    let name = endpoint_path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("trusttunnel");
    let base = name
        .strip_suffix(".endpoint.toml")
        .or_else(|| name.strip_suffix(".toml"))
        .unwrap_or(name);
    endpoint_path.with_file_name(format!("{}.client.toml", base))
}

/// Fixed-schema client config; returns the content and the skip-verification flag
pub fn render_from_descriptor(
    descriptor: &Descriptor,
    dns_upstreams: Option<&[String]>,
) -> BotResult<(String, bool)> {
    let fields = descriptor.required()?;
    let fallback_protocol = descriptor.string(&["upstream_fallback_protocol"]);
    let has_ipv6 = descriptor.flag(&["has_ipv6"]);
    let anti_dpi = descriptor.flag(&["anti_dpi"]);
    let certificate = descriptor.string(&["certificate"]);

    let mut lines = vec![
        "vpn_mode = \"general\"".to_string(),
        "killswitch_enabled = true".to_string(),
    ];
    if let Some(dns) = dns_upstreams.filter(|d| !d.is_empty()) {
        lines.push(format!("dns_upstreams = {}", toml_text::string_list(dns)));
    }

    lines.push("[endpoint]".to_string());
    lines.push(format!("hostname = {}", toml_text::string(&fields.hostname)));
    lines.push(format!("addresses = {}", toml_text::string_list(&fields.addresses)));
    if let Some(v) = has_ipv6 {
        lines.push(format!("has_ipv6 = {}", v));
    }
    lines.push(format!("username = {}", toml_text::string(&fields.username)));
    lines.push(format!("password = {}", toml_text::string(&fields.password)));
    lines.push(format!("upstream_protocol = {}", toml_text::string(&fields.protocol)));
    if let Some(fallback) = fallback_protocol {
        lines.push(format!("upstream_fallback_protocol = {}", toml_text::string(&fallback)));
    }
    if let Some(v) = anti_dpi {
        lines.push(format!("anti_dpi = {}", v));
    }

    let skip_verification = match certificate {
        Some(cert) => {
            lines.push(format!("certificate = {}", toml_text::multiline(&cert)));
            false
        }
        None => {
            lines.push("skip_verification = true".to_string());
            true
        }
    };

    lines.extend(
        [
            "[listener]",
            "[listener.tun]",
            "bound_if = \"\"",
            "included_routes = [\"0.0.0.0/0\", \"2000::/3\", \"10.3.2.1/32\"]",
            "excluded_routes = [\"0.0.0.0/8\", \"169.254.0.0/16\", \"172.16.0.0/12\", \"192.168.0.0/16\", \"224.0.0.0/3\"]",
            "mtu_size = 1500",
            "change_system_dns = true",
        ]
        .map(String::from),
    );

    Ok((toml_text::finish(&lines), skip_verification))
}

/// Replace the top-level `dns_upstreams` line, or insert one ahead of the
/// first table header
pub fn merge_dns_upstreams(content: &str, dns_upstreams: &[String]) -> String {
    let rendered = format!("dns_upstreams = {}", toml_text::string_list(dns_upstreams));
    let mut lines: Vec<String> = content.lines().map(String::from).collect();

    let first_table = lines
        .iter()
        .position(|l| l.trim_start().starts_with('['))
        .unwrap_or(lines.len());
    let existing = lines[..first_table]
        .iter()
        .position(|l| l.trim_start().starts_with("dns_upstreams"));

    match existing {
        Some(index) => lines[index] = rendered,
        None => lines.insert(first_table, rendered),
    }
    toml_text::finish(&lines)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BotError;
    use tempfile::TempDir;

    const DESCRIPTOR: &str = r#"
hostname = "vpn.example.com"
addresses = ["203.0.113.5:443"]
username = "alice"
password = "pw"
upstream_protocol = "http2"
upstream_fallback_protocol = "http3"
has_ipv6 = false
anti_dpi = true
"#;

    fn with_cert() -> String {
        format!("{}certificate = \"\"\"\n-----BEGIN CERTIFICATE-----\nMIIB\n-----END CERTIFICATE-----\n\"\"\"\n", DESCRIPTOR)
    }

    #[test]
    fn test_render_without_certificate_skips_verification() {
        let (content, skip) = render_from_descriptor(&Descriptor::parse(DESCRIPTOR).unwrap(), None).unwrap();
        assert!(skip);
        assert!(content.contains("skip_verification = true"));
        assert!(!content.contains("certificate"));
        assert!(!content.contains("dns_upstreams"));

        let parsed: toml::Table = toml::from_str(&content).unwrap();
        assert_eq!(parsed["endpoint"]["upstream_fallback_protocol"].as_str(), Some("http3"));
        assert_eq!(parsed["endpoint"]["anti_dpi"].as_bool(), Some(true));
        assert_eq!(parsed["listener"]["tun"]["mtu_size"].as_integer(), Some(1500));
    }

    #[test]
    fn test_render_with_certificate() {
        let (content, skip) = render_from_descriptor(&Descriptor::parse(&with_cert()).unwrap(), None).unwrap();
        assert!(!skip);
        assert!(!content.contains("skip_verification"));

        let parsed: toml::Table = toml::from_str(&content).unwrap();
        let cert = parsed["endpoint"]["certificate"].as_str().unwrap();
        assert!(cert.starts_with("-----BEGIN CERTIFICATE-----"));
    }

    #[test]
    fn test_render_reports_missing_password() {
        let text = DESCRIPTOR.replace("password = \"pw\"\n", "");
        let err = render_from_descriptor(&Descriptor::parse(&text).unwrap(), None).unwrap_err();
        match err {
            BotError::Validation { missing } => assert_eq!(missing, vec!["password"]),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_render_with_dns() {
        let dns = vec!["1.1.1.1".to_string()];
        let (content, _) = render_from_descriptor(&Descriptor::parse(DESCRIPTOR).unwrap(), Some(&dns)).unwrap();
        assert!(content.contains("dns_upstreams = [\"1.1.1.1\"]\n[endpoint]"));
    }

    #[test]
    fn test_merge_dns_replaces_existing() {
        let content = "vpn_mode = \"general\"\ndns_upstreams = [\"9.9.9.9\"]\n[endpoint]\n";
        let merged = merge_dns_upstreams(content, &["1.1.1.1".into(), "8.8.8.8".into()]);
        assert_eq!(
            merged,
            "vpn_mode = \"general\"\ndns_upstreams = [\"1.1.1.1\", \"8.8.8.8\"]\n[endpoint]\n"
        );
    }

    #[test]
    fn test_merge_dns_appends() {
        let merged = merge_dns_upstreams("vpn_mode = \"general\"\n", &["1.1.1.1".into()]);
        assert_eq!(merged, "vpn_mode = \"general\"\ndns_upstreams = [\"1.1.1.1\"]\n");
    }

    #[test]
    fn test_merge_dns_stays_top_level() {
        let content = "vpn_mode = \"general\"\n\n[endpoint]\nhostname = \"vpn.example.com\"\n\n[listener.tun]\nmtu_size = 1500\n";
        let merged = merge_dns_upstreams(content, &["1.1.1.1".into()]);

        let table: toml::Table = merged.parse().unwrap();
        let dns = table["dns_upstreams"].as_array().unwrap();
        assert_eq!(dns[0].as_str(), Some("1.1.1.1"));
        assert!(table["listener"]["tun"].get("dns_upstreams").is_none());
        assert!(merged.starts_with("vpn_mode = \"general\"\n\ndns_upstreams = [\"1.1.1.1\"]\n[endpoint]"));
    }

    #[test]
    fn test_merge_dns_ignores_nested_key() {
        let content = "vpn_mode = \"general\"\n[listener.tun]\ndns_upstreams = [\"9.9.9.9\"]\n";
        let merged = merge_dns_upstreams(content, &["1.1.1.1".into()]);

        let table: toml::Table = merged.parse().unwrap();
        assert_eq!(table["dns_upstreams"].as_array().unwrap()[0].as_str(), Some("1.1.1.1"));
        assert_eq!(
            table["listener"]["tun"]["dns_upstreams"].as_array().unwrap()[0].as_str(),
            Some("9.9.9.9")
        );
    }

    #[test]
    fn test_client_config_path() {
        assert_eq!(
            client_config_path(Path::new("/tmp/alice.endpoint.toml")),
            PathBuf::from("/tmp/alice.client.toml")
        );
        assert_eq!(
            client_config_path(Path::new("/tmp/bob.toml")),
            PathBuf::from("/tmp/bob.client.toml")
        );
    }

    #[tokio::test]
    async fn test_falls_back_when_tool_missing() {
        let dir = TempDir::new().unwrap();
        let endpoint = dir.path().join("alice.endpoint.toml");
        std::fs::write(&endpoint, DESCRIPTOR).unwrap();

        let generator = ClientConfigGenerator::new("/nonexistent/trusttunnel_client", Duration::from_secs(2));
        let dns = vec!["8.8.8.8".to_string()];
        let result = generator.generate(&endpoint, true, Some(&dns)).await.unwrap();

        assert!(!result.used_external_tool);
        assert!(result.skip_verification);
        assert_eq!(result.output_path, dir.path().join("alice.client.toml"));
        assert!(result.content.contains("dns_upstreams = [\"8.8.8.8\"]"));
        assert_eq!(std::fs::read_to_string(&result.output_path).unwrap(), result.content);
    }

    #[tokio::test]
    async fn test_wizard_output_gets_dns_merged() {
        let dir = TempDir::new().unwrap();
        let endpoint = dir.path().join("alice.endpoint.toml");
        std::fs::write(&endpoint, DESCRIPTOR).unwrap();

        // Fake wizard: writes a settings file to the path after --settings
        let wizard = dir.path().join("wizard.sh");
        std::fs::write(
            &wizard,
            "#!/bin/sh\nwhile [ \"$1\" != \"--settings\" ]; do shift; done\nprintf 'vpn_mode = \"general\"\\ndns_upstreams = [\"9.9.9.9\"]\\n' > \"$2\"\n",
        )
        .unwrap();
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&wizard, std::fs::Permissions::from_mode(0o755)).unwrap();
        }

        let generator = ClientConfigGenerator::new(wizard.display().to_string(), Duration::from_secs(5));
        let dns = vec!["1.1.1.1".to_string()];
        let result = generator.generate(&endpoint, true, Some(&dns)).await.unwrap();

        assert!(result.used_external_tool);
        assert_eq!(result.content, "vpn_mode = \"general\"\ndns_upstreams = [\"1.1.1.1\"]\n");
        assert_eq!(std::fs::read_to_string(&result.output_path).unwrap(), result.content);
    }

    #[tokio::test]
    async fn test_manual_only() {
        let dir = TempDir::new().unwrap();
        let endpoint = dir.path().join("bob.endpoint.toml");
        std::fs::write(&endpoint, with_cert()).unwrap();

        let generator = ClientConfigGenerator::new("true", Duration::from_secs(2));
        let result = generator.generate(&endpoint, false, None).await.unwrap();
        assert!(!result.used_external_tool);
        assert!(!result.skip_verification);
    }
}
