mod defaults;

use std::time::Duration;

use defaults::*;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::auth::AllowedAuthMethods;
use crate::{ListenEndpoint, Secret};

#[derive(Debug, Deserialize, Serialize, Clone, Default, JsonSchema)]
pub struct SshAlgorithms {
    #[serde(default)]
    pub kex: Vec<String>,

    #[serde(default)]
    pub cipher: Vec<String>,

    #[serde(default)]
    pub server_host_key: Vec<String>,
}

#[derive(Debug, Deserialize, Serialize, Clone, JsonSchema)]
pub struct SshConfig {
    /// When set, the landing page may omit the host and every session
    /// connects here.
    #[serde(default)]
    pub host: Option<String>,

    #[serde(default = "_default_ssh_port")]
    pub port: u16,

    #[serde(default = "_default_term")]
    pub term: String,

    #[serde(default)]
    pub algorithms: SshAlgorithms,

    #[serde(default = "_default_ready_timeout", with = "humantime_serde")]
    #[schemars(with = "String")]
    pub ready_timeout: Duration,

    #[serde(default = "_default_keepalive_interval", with = "humantime_serde")]
    #[schemars(with = "String")]
    pub keepalive_interval: Duration,

    #[serde(default = "_default_keepalive_count_max")]
    pub keepalive_count_max: usize,

    #[serde(default = "_default_false")]
    pub always_send_keyboard_interactive_prompts: bool,

    /// Refuse sockets that arrive without inherited credentials instead of
    /// prompting the browser.
    #[serde(default = "_default_false")]
    pub disable_interactive_auth: bool,

    #[serde(default)]
    pub allowed_auth_methods: AllowedAuthMethods,
}

impl Default for SshConfig {
    fn default() -> Self {
        #[allow(clippy::unwrap_used)]
        serde_json::from_value(serde_json::json!({})).unwrap()
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, JsonSchema)]
pub struct UiOptions {
    #[serde(default = "_default_false")]
    pub allow_replay: bool,

    #[serde(default = "_default_false")]
    pub allow_reauth: bool,

    #[serde(default = "_default_false")]
    pub allow_reconnect: bool,

    #[serde(default = "_default_false")]
    pub auto_log: bool,

    #[serde(default = "_default_true")]
    pub challenge_button: bool,
}

impl Default for UiOptions {
    fn default() -> Self {
        #[allow(clippy::unwrap_used)]
        serde_json::from_value(serde_json::json!({})).unwrap()
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, JsonSchema)]
pub struct SessionConfig {
    #[serde(default = "_default_session_name")]
    pub name: String,

    #[serde(default = "_default_session_secret")]
    #[schemars(with = "String")]
    pub secret: Secret<String>,

    #[serde(default = "_default_session_timeout", with = "humantime_serde")]
    #[schemars(with = "String")]
    pub timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        #[allow(clippy::unwrap_used)]
        serde_json::from_value(serde_json::json!({})).unwrap()
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, JsonSchema)]
pub struct HttpConfig {
    #[serde(default = "_default_http_listen")]
    #[schemars(with = "String")]
    pub listen: ListenEndpoint,

    /// Allowed WebSocket origins, `host:port` with `*` wildcards.
    #[serde(default = "_default_origins")]
    pub origins: Vec<String>,
}

impl Default for HttpConfig {
    fn default() -> Self {
        #[allow(clippy::unwrap_used)]
        serde_json::from_value(serde_json::json!({})).unwrap()
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, JsonSchema)]
pub struct HeaderConfig {
    #[serde(default)]
    pub text: Option<String>,

    #[serde(default = "_default_header_background")]
    pub background: String,
}

impl Default for HeaderConfig {
    fn default() -> Self {
        #[allow(clippy::unwrap_used)]
        serde_json::from_value(serde_json::json!({})).unwrap()
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, JsonSchema)]
pub struct TerminalConfig {
    #[serde(default = "_default_rows")]
    pub rows: u16,

    #[serde(default = "_default_cols")]
    pub cols: u16,
}

impl Default for TerminalConfig {
    fn default() -> Self {
        #[allow(clippy::unwrap_used)]
        serde_json::from_value(serde_json::json!({})).unwrap()
    }
}

/// Validated process-wide configuration. Effectively immutable for the
/// process lifetime; shared by reference.
#[derive(Debug, Deserialize, Serialize, Clone, Default, JsonSchema)]
pub struct GangwayConfig {
    #[serde(default)]
    pub ssh: SshConfig,

    #[serde(default)]
    pub options: UiOptions,

    #[serde(default)]
    pub session: SessionConfig,

    #[serde(default)]
    pub http: HttpConfig,

    #[serde(default)]
    pub header: HeaderConfig,

    #[serde(default)]
    pub terminal: TerminalConfig,
}

impl GangwayConfig {
    pub fn validate(&self) -> Result<(), crate::GangwayError> {
        if self.ssh.allowed_auth_methods.is_empty() {
            return Err(anyhow::anyhow!("ssh.allowed_auth_methods must not be empty").into());
        }
        if self.session.name.is_empty() {
            return Err(anyhow::anyhow!("session.name must not be empty").into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = GangwayConfig::default();
        assert_eq!(config.ssh.port, 22);
        assert_eq!(config.ssh.term, "xterm-color");
        assert_eq!(config.ssh.ready_timeout, Duration::from_secs(20));
        assert_eq!(config.ssh.keepalive_interval, Duration::from_secs(120));
        assert_eq!(config.ssh.keepalive_count_max, 10);
        assert_eq!(config.session.name, "gangway.sid");
        assert_eq!(config.http.origins, vec!["*:*".to_owned()]);
        assert_eq!(config.terminal.rows, 24);
        assert_eq!(config.terminal.cols, 80);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_yaml_roundtrip_of_durations() {
        let config: GangwayConfig = serde_json::from_value(serde_json::json!({
            "ssh": {"ready_timeout": "5s", "keepalive_interval": "1m"}
        }))
        .unwrap();
        assert_eq!(config.ssh.ready_timeout, Duration::from_secs(5));
        assert_eq!(config.ssh.keepalive_interval, Duration::from_secs(60));
    }

    #[test]
    fn test_empty_auth_methods_rejected() {
        let config: GangwayConfig = serde_json::from_value(serde_json::json!({
            "ssh": {"allowed_auth_methods": []}
        }))
        .unwrap();
        assert!(config.validate().is_err());
    }
}
