//! Account files.
//!
//! Each account is stored as `{uuid}-{label}.toml` in the accounts directory.
//! The id and label come from the file name; the file body holds the
//! connection settings and the channels to restore.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

use super::account::{Account, AccountId, ConnectionParams};
use super::channel::ChannelKey;
use super::{Model, ModelError};

pub const ACCOUNT_FILE_EXTENSION: &str = "toml";

/// Hyphenated uuid length.
const UUID_LEN: usize = 36;

#[derive(Debug, Serialize, Deserialize)]
struct AccountFile {
    created_on: DateTime<Utc>,
    #[serde(default)]
    auto_connect: bool,
    connection: ConnectionParams,
    #[serde(default)]
    channels: Vec<ChannelEntry>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChannelEntry {
    /// Channel name, or the peer nick of a direct conversation.
    name: String,
    #[serde(default)]
    direct: bool,
    #[serde(default)]
    auto_join: bool,
    #[serde(default = "default_true")]
    kept: bool,
    /// Transcript name, when it differs from `name` after a nick change.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    log: Option<String>,
}

fn default_true() -> bool {
    true
}

pub fn account_file_name(id: AccountId, label: &str) -> String {
    format!("{}-{}.{}", id, label, ACCOUNT_FILE_EXTENSION)
}

/// Splits `{uuid}-{label}` back into its parts.
pub fn parse_account_file_stem(stem: &str) -> Option<(AccountId, &str)> {
    let id = Uuid::parse_str(stem.get(..UUID_LEN)?).ok()?;
    let label = stem.get(UUID_LEN..)?.strip_prefix('-')?;
    if label.is_empty() {
        return None;
    }
    Some((id, label))
}

fn io_error(path: &Path, source: std::io::Error) -> ModelError {
    ModelError::Io {
        path: path.display().to_string(),
        source,
    }
}

impl Model {
    /// Adds every account stored in `dir`. Unreadable files are logged and
    /// skipped. No events are fired. Returns the number of accounts loaded.
    pub fn load(&mut self, dir: &Path) -> Result<usize, ModelError> {
        if !dir.exists() {
            return Ok(0);
        }
        let mut paths: Vec<PathBuf> = fs::read_dir(dir)
            .map_err(|e| io_error(dir, e))?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.extension().and_then(|e| e.to_str()) == Some(ACCOUNT_FILE_EXTENSION))
            .collect();
        paths.sort();

        let mut loaded = 0;
        for path in paths {
            match self.load_account(&path) {
                Ok(account) => {
                    let label = account.label().to_string();
                    match self.insert(account) {
                        Ok(_) => loaded += 1,
                        Err(e) => warn!(path = %path.display(), account = %label, "Skipping account file: {}", e),
                    }
                }
                Err(e) => warn!(path = %path.display(), "Skipping account file: {}", e),
            }
        }
        debug!(dir = %dir.display(), loaded, "Accounts loaded");
        Ok(loaded)
    }

    fn load_account(&self, path: &Path) -> Result<Account, ModelError> {
        let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or_default();
        let Some((id, label)) = parse_account_file_stem(stem) else {
            return Err(ModelError::InvalidLabel(stem.to_string()));
        };
        let contents = fs::read_to_string(path).map_err(|e| io_error(path, e))?;
        let file: AccountFile = toml::from_str(&contents).map_err(|source| ModelError::Parse {
            path: path.display().to_string(),
            source,
        })?;

        let mut account = self.create_account_with_id(id, label, file.connection)?;
        account.set_created_on(file.created_on);
        account.auto_connect = file.auto_connect;
        for entry in file.channels {
            let key = if entry.direct {
                let user = account.server_mut().find_or_create_user(&entry.name, None);
                account.restore_p2p_channel(user, entry.log.as_deref())?
            } else {
                account.find_or_create_channel(&entry.name)?
            };
            if let Some(channel) = account.channel_mut(&key) {
                channel.auto_join = entry.auto_join;
                channel.kept = entry.kept;
            }
            account.ensure_listed(&key);
        }
        Ok(account)
    }

    /// Writes every account to `dir` and removes files of accounts that no
    /// longer exist or were renamed.
    pub fn save(&self, dir: &Path) -> Result<(), ModelError> {
        fs::create_dir_all(dir).map_err(|e| io_error(dir, e))?;
        let mut written = Vec::new();
        for account in self.accounts() {
            written.push(save_account(dir, account)?);
        }

        for entry in fs::read_dir(dir).map_err(|e| io_error(dir, e))?.flatten() {
            let path = entry.path();
            let stale = path.extension().and_then(|e| e.to_str()) == Some(ACCOUNT_FILE_EXTENSION)
                && path
                    .file_stem()
                    .and_then(|s| s.to_str())
                    .and_then(parse_account_file_stem)
                    .is_some()
                && !written.contains(&path);
            if stale {
                debug!(path = %path.display(), "Removing stale account file");
                fs::remove_file(&path).map_err(|e| io_error(&path, e))?;
            }
        }
        Ok(())
    }
}

fn save_account(dir: &Path, account: &Account) -> Result<PathBuf, ModelError> {
    let channels = account
        .channels()
        .filter(|c| c.kept || c.auto_join)
        .map(|c| ChannelEntry {
            name: c.name().to_string(),
            direct: matches!(c.key(), ChannelKey::Direct(_)),
            auto_join: c.auto_join,
            kept: c.kept,
            log: (c.log_name() != c.name()).then(|| c.log_name().to_string()),
        })
        .collect();
    let file = AccountFile {
        created_on: account.created_on(),
        auto_connect: account.auto_connect,
        connection: account.params.clone(),
        channels,
    };
    let contents = toml::to_string_pretty(&file).map_err(|source| ModelError::Serialize {
        label: account.label().to_string(),
        source,
    })?;

    let file_name = account_file_name(account.id(), account.label());
    let path = dir.join(&file_name);
    let temp_path = dir.join(format!("{}.tmp", file_name));
    fs::write(&temp_path, contents).map_err(|e| io_error(&temp_path, e))?;
    fs::rename(&temp_path, &path).map_err(|e| io_error(&path, e))?;
    Ok(path)
}
