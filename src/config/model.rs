//! Configuration data model.
//!
//! All structs derive `Serialize`/`Deserialize` for TOML persistence.
//! Every field has a sensible default so the session runs out of the box.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use super::nickname::generate_nickname;
use crate::irc::ControllerOptions;
use crate::model::ConnectionParams;

/// Root session configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub behavior: BehaviorConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub account_defaults: AccountDefaults,
}

/// Where accounts and transcripts are kept.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
    /// Keep transcripts in memory only when `false`.
    #[serde(default = "default_true")]
    pub persist_logs: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            persist_logs: true,
        }
    }
}

impl StorageConfig {
    pub fn data_dir(&self) -> PathBuf {
        expand_home(&self.data_dir)
    }

    pub fn accounts_dir(&self) -> PathBuf {
        self.data_dir().join("accounts")
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.data_dir().join("logs")
    }
}

/// How user input and leaving are handled.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BehaviorConfig {
    #[serde(default = "default_command_marker")]
    pub command_marker: char,
    #[serde(default = "default_quit_message")]
    pub quit_message: String,
    #[serde(default = "default_part_message")]
    pub part_message: String,
}

impl Default for BehaviorConfig {
    fn default() -> Self {
        Self {
            command_marker: default_command_marker(),
            quit_message: default_quit_message(),
            part_message: default_part_message(),
        }
    }
}

impl BehaviorConfig {
    pub fn controller_options(&self) -> ControllerOptions {
        ControllerOptions {
            command_marker: self.command_marker,
            part_message: Some(self.part_message.clone()).filter(|m| !m.is_empty()),
            quit_message: Some(self.quit_message.clone()).filter(|m| !m.is_empty()),
        }
    }
}

/// Diagnostic logging. `RUST_LOG` overrides `level` when set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Log to this file instead of stderr.
    #[serde(default)]
    pub file: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
        }
    }
}

/// Settings the first proposed account starts from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountDefaults {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_true")]
    pub tls: bool,
    #[serde(default = "default_nickname")]
    pub nickname: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub realname: Option<String>,
}

impl Default for AccountDefaults {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            tls: true,
            nickname: default_nickname(),
            username: None,
            realname: None,
        }
    }
}

impl AccountDefaults {
    pub fn connection_params(&self) -> ConnectionParams {
        let mut params = ConnectionParams::new(self.host.clone(), self.port, self.nickname.clone());
        params.tls = self.tls;
        params.username = self.username.clone();
        params.realname = self.realname.clone();
        params
    }
}

/// Expands a leading `~` to the home directory.
pub fn expand_home(path: &str) -> PathBuf {
    match path.strip_prefix('~') {
        Some(rest) => match dirs::home_dir() {
            Some(home) => home.join(rest.trim_start_matches(['/', '\\'])),
            None => PathBuf::from(path),
        },
        None => Path::new(path).to_path_buf(),
    }
}

fn default_nickname() -> String {
    generate_nickname()
}
fn default_host() -> String {
    "irc.libera.chat".to_string()
}
fn default_port() -> u16 {
    6697
}
fn default_true() -> bool {
    true
}
fn default_data_dir() -> String {
    "~/.local/share/crabchat".to_string()
}
fn default_command_marker() -> char {
    '/'
}
fn default_quit_message() -> String {
    "CrabChat".to_string()
}
fn default_part_message() -> String {
    "Leaving".to_string()
}
fn default_log_level() -> String {
    "info".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_file_gives_defaults() {
        let config: AppConfig = toml::from_str("").unwrap();
        assert!(config.storage.persist_logs);
        assert_eq!(config.behavior.command_marker, '/');
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.account_defaults.port, 6697);
        assert!(!config.account_defaults.nickname.is_empty());
    }

    #[test]
    fn test_partial_sections() {
        let config: AppConfig = toml::from_str(
            "[storage]\ndata_dir = \"/var/lib/crab\"\n\n[behavior]\ncommand_marker = \"!\"\npart_message = \"\"\n",
        )
        .unwrap();
        assert_eq!(config.storage.accounts_dir(), PathBuf::from("/var/lib/crab/accounts"));
        let options = config.behavior.controller_options();
        assert_eq!(options.command_marker, '!');
        assert_eq!(options.part_message, None);
        assert_eq!(options.quit_message.as_deref(), Some("CrabChat"));
    }

    #[test]
    fn test_account_defaults_to_params() {
        let defaults = AccountDefaults {
            host: "irc.example.net".into(),
            port: 6667,
            tls: false,
            nickname: "crab".into(),
            username: Some("crab".into()),
            realname: None,
        };
        let params = defaults.connection_params();
        assert_eq!(params.host, "irc.example.net");
        assert!(!params.tls);
        assert_eq!(params.preferred_nick, "crab");
        assert_eq!(params.username.as_deref(), Some("crab"));
    }

    #[test]
    fn test_expand_home() {
        assert_eq!(expand_home("/tmp/x"), PathBuf::from("/tmp/x"));
        if let Some(home) = dirs::home_dir() {
            assert_eq!(expand_home("~/data"), home.join("data"));
        }
    }
}
