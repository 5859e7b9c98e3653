//! Bot configuration.
//!
//! A flat JSON record read once at startup, `config.json` unless `-c` says
//! otherwise:
//!
//! ```json
//! {
//!   "host": "irc.libera.chat",
//!   "port": 6667,
//!   "password": "",
//!   "nickname": "ircbot",
//!   "realname": "ircbot",
//!   "channels": ["#ircbot", { "name": "#private", "password": "key" }]
//! }
//! ```

use std::path::{Path, PathBuf};

use ircbot_sdk::client::{Channel, ConnectConfig, ReconnectConfig};
use serde::Deserialize;

/// Default file name when no `-c` flag is given.
pub const DEFAULT_CONFIG_PATH: &str = "config.json";

fn default_prefix() -> String {
    "!".to_string()
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("can't read config file {}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("bad config file {}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid config file {}: {reason}", .path.display())]
    Invalid { path: PathBuf, reason: String },
}

/// A channel entry: either a bare name or a name with its key.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum ChannelEntry {
    Name(String),
    WithKey {
        name: String,
        #[serde(default, alias = "key")]
        password: Option<String>,
    },
}

impl ChannelEntry {
    pub fn name(&self) -> &str {
        match self {
            Self::Name(name) | Self::WithKey { name, .. } => name,
        }
    }

    pub fn to_channel(&self) -> Channel {
        match self {
            Self::Name(name) => Channel::new(name),
            Self::WithKey { name, password: Some(key) } => Channel::with_key(name, key),
            Self::WithKey { name, password: None } => Channel::new(name),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub host: String,
    pub port: u16,
    /// Server password; empty means none.
    #[serde(default)]
    pub password: Option<String>,
    pub nickname: String,
    pub realname: String,
    /// Ident; defaults to the nickname.
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub channels: Vec<ChannelEntry>,
    /// Connect over TLS (also implied by port 6697).
    #[serde(default)]
    pub ssl: bool,
    /// Skip certificate verification, for self-signed servers.
    #[serde(default)]
    pub tls_insecure: bool,
    #[serde(default = "default_prefix")]
    pub command_prefix: String,
}

impl Config {
    /// Read, parse and validate a config file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&text, path)
    }

    /// Parse and validate JSON text; `path` is only used in error messages.
    pub fn from_json(json: &str, path: &Path) -> Result<Self, ConfigError> {
        // Tolerate a UTF-8 byte order mark left by some editors.
        let json = json.strip_prefix('\u{feff}').unwrap_or(json);
        let config: Self = serde_json::from_str(json).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate().map_err(|reason| ConfigError::Invalid {
            path: path.to_path_buf(),
            reason,
        })?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), String> {
        if self.host.trim().is_empty() {
            return Err("host is empty".to_string());
        }
        if self.port == 0 {
            return Err("port must be between 1 and 65535".to_string());
        }
        if self.nickname.is_empty() || self.nickname.contains(char::is_whitespace) {
            return Err(format!("invalid nickname {:?}", self.nickname));
        }
        if self.command_prefix.is_empty() {
            return Err("command_prefix is empty".to_string());
        }
        for entry in &self.channels {
            let name = entry.name();
            if name.is_empty() || name.contains([' ', ',', '\x07']) {
                return Err(format!("invalid channel name {name:?}"));
            }
        }
        Ok(())
    }

    /// `host:port`, with brackets around IPv6 literals.
    pub fn server_addr(&self) -> String {
        if self.host.contains(':') && !self.host.starts_with('[') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }

    pub fn channels(&self) -> Vec<Channel> {
        self.channels.iter().map(ChannelEntry::to_channel).collect()
    }

    pub fn connect_config(&self) -> ConnectConfig {
        ConnectConfig {
            server_addr: self.server_addr(),
            nick: self.nickname.clone(),
            user: self
                .username
                .clone()
                .filter(|u| !u.is_empty())
                .unwrap_or_else(|| self.nickname.clone()),
            realname: self.realname.clone(),
            password: self.password.clone().filter(|p| !p.is_empty()),
            tls: self.ssl,
            tls_insecure: self.tls_insecure,
        }
    }

    pub fn reconnect_config(&self) -> ReconnectConfig {
        ReconnectConfig {
            channels: self.channels(),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r##"{
        "host": "irc.example.net",
        "port": 6667,
        "password": "",
        "nickname": "ircbot",
        "realname": "Friendly Bot",
        "channels": ["#one", "#two"]
    }"##;

    fn parse(json: &str) -> Result<Config, ConfigError> {
        Config::from_json(json, Path::new("test.json"))
    }

    #[test]
    fn minimal_config_maps_to_client_settings() {
        let config = parse(MINIMAL).unwrap();
        let connect = config.connect_config();
        assert_eq!(connect.server_addr, "irc.example.net:6667");
        assert_eq!(connect.nick, "ircbot");
        assert_eq!(connect.user, "ircbot");
        assert_eq!(connect.realname, "Friendly Bot");
        assert_eq!(connect.password, None);
        assert!(!connect.tls);
        assert_eq!(config.command_prefix, "!");
        assert_eq!(
            config.reconnect_config().channels,
            vec![Channel::new("#one"), Channel::new("#two")]
        );
    }

    #[test]
    fn optional_fields_and_keyed_channels() {
        let config = parse(
            r##"{
                "host": "irc.example.net",
                "port": 6697,
                "password": "server-pass",
                "nickname": "ircbot",
                "realname": "Friendly Bot",
                "username": "bot",
                "ssl": true,
                "command_prefix": ".",
                "channels": [
                    "#open",
                    { "name": "#locked", "password": "k3y" },
                    { "name": "#alias", "key": "other" },
                    { "name": "#nokey" }
                ]
            }"##,
        )
        .unwrap();
        let connect = config.connect_config();
        assert_eq!(connect.user, "bot");
        assert_eq!(connect.password.as_deref(), Some("server-pass"));
        assert!(connect.tls);
        assert_eq!(config.command_prefix, ".");
        assert_eq!(
            config.channels(),
            vec![
                Channel::new("#open"),
                Channel::with_key("#locked", "k3y"),
                Channel::with_key("#alias", "other"),
                Channel::new("#nokey"),
            ]
        );
    }

    #[test]
    fn missing_password_and_channels_are_allowed() {
        let config = parse(
            r#"{"host": "h", "port": 1, "nickname": "n", "realname": "r"}"#,
        )
        .unwrap();
        assert!(config.channels.is_empty());
        assert_eq!(config.connect_config().password, None);
    }

    #[test]
    fn ipv6_host_is_bracketed() {
        let config = parse(
            r#"{"host": "::1", "port": 6667, "nickname": "n", "realname": "r"}"#,
        )
        .unwrap();
        assert_eq!(config.server_addr(), "[::1]:6667");
    }

    #[test]
    fn byte_order_mark_is_ignored() {
        let with_bom = format!("\u{feff}{MINIMAL}");
        assert!(parse(&with_bom).is_ok());
    }

    #[test]
    fn malformed_json_is_a_parse_error() {
        let err = parse("{ not json").unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
        assert!(err.to_string().contains("test.json"));
    }

    #[test]
    fn missing_required_field_is_a_parse_error() {
        let err = parse(r#"{"host": "h", "port": 6667, "realname": "r"}"#).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn invalid_values_are_rejected() {
        let cases = [
            (r#"{"host": "", "port": 6667, "nickname": "n", "realname": "r"}"#, "host"),
            (r#"{"host": "h", "port": 0, "nickname": "n", "realname": "r"}"#, "port"),
            (r#"{"host": "h", "port": 6667, "nickname": "two words", "realname": "r"}"#, "nickname"),
            (r#"{"host": "h", "port": 6667, "nickname": "", "realname": "r"}"#, "nickname"),
            (
                r##"{"host": "h", "port": 6667, "nickname": "n", "realname": "r", "channels": ["#a,#b"]}"##,
                "channel",
            ),
            (
                r##"{"host": "h", "port": 6667, "nickname": "n", "realname": "r", "channels": ["#a b"]}"##,
                "channel",
            ),
            (
                r##"{"host": "h", "port": 6667, "nickname": "n", "realname": "r", "channels": ["#bell\u0007"]}"##,
                "channel",
            ),
            (
                r##"{"host": "h", "port": 6667, "nickname": "n", "realname": "r", "channels": [{"name": ""}]}"##,
                "channel",
            ),
            (
                r#"{"host": "h", "port": 6667, "nickname": "n", "realname": "r", "command_prefix": ""}"#,
                "command_prefix",
            ),
        ];
        for (json, needle) in cases {
            match parse(json) {
                Err(ConfigError::Invalid { reason, .. }) => {
                    assert!(reason.contains(needle), "{reason} should mention {needle}")
                }
                other => panic!("expected Invalid for {json}, got {other:?}"),
            }
        }
    }

    #[test]
    fn missing_file_is_a_read_error() {
        let err = Config::load(Path::new("/nonexistent/ircbot/config.json")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
        assert!(err.to_string().contains("/nonexistent/ircbot/config.json"));
    }
}
