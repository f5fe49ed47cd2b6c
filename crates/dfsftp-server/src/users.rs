//! User definition file.
//!
//! Properties format, one `key=value` per line, `#` or `!` starting a
//! comment:
//!
//! ```text
//! ftpserver.user.alice.homedirectory=/user/alice
//! ftpserver.user.alice.enableflag=true
//! ftpserver.user.alice.groups=staff,analytics
//! ```
//!
//! Passwords and the other per-user attributes of the format belong to the
//! authentication layer and are ignored here.

use dfsftp_kernel::{Identity, ViewError};
use std::collections::BTreeMap;
use std::path::Path;
use thiserror::Error;

use crate::constants::USER_KEY_PREFIX;

#[derive(Debug, Error)]
pub enum UserFileError {
    #[error("failed to read user file: {0}")]
    Io(#[from] std::io::Error),

    #[error("line {line}: expected key=value, got {text:?}")]
    Malformed { line: usize, text: String },

    #[error("line {line}: bad enableflag {value:?} for user {user}")]
    BadFlag {
        line: usize,
        user: String,
        value: String,
    },

    #[error("user {0} has no homedirectory")]
    MissingHome(String),

    #[error(transparent)]
    InvalidUser(#[from] ViewError),

    #[error("unknown user {0}")]
    UnknownUser(String),

    #[error("user {0} is disabled")]
    Disabled(String),
}

/// One user's entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserRecord {
    pub name: String,
    pub home: String,
    pub enabled: bool,
    pub groups: Vec<String>,
}

impl UserRecord {
    pub fn identity(&self) -> Result<Identity, UserFileError> {
        let identity = Identity::parse(&self.name, &self.home)?;
        Ok(identity.with_groups(self.groups.iter().cloned()))
    }
}

#[derive(Default)]
struct Partial {
    home: Option<String>,
    enabled: Option<bool>,
    groups: Vec<String>,
}

/// All users of a definition file, by name.
#[derive(Debug, Clone, Default)]
pub struct UserFile {
    users: BTreeMap<String, UserRecord>,
}

impl UserFile {
    pub fn load(path: &Path) -> Result<Self, UserFileError> {
        let text = std::fs::read_to_string(path)?;
        Self::parse(&text)
    }

    pub fn parse(text: &str) -> Result<Self, UserFileError> {
        let mut partial: BTreeMap<String, Partial> = BTreeMap::new();

        for (index, raw) in text.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') || line.starts_with('!') {
                continue;
            }
            let Some((key, value)) = line.split_once(['=', ':']) else {
                return Err(UserFileError::Malformed {
                    line: index + 1,
                    text: raw.to_string(),
                });
            };
            let (key, value) = (key.trim(), value.trim());

            let Some(rest) = key.strip_prefix(USER_KEY_PREFIX) else {
                tracing::trace!(key, "ignoring non-user key");
                continue;
            };
            let Some((name, attr)) = rest.rsplit_once('.') else {
                return Err(UserFileError::Malformed {
                    line: index + 1,
                    text: raw.to_string(),
                });
            };

            let entry = partial.entry(name.to_string()).or_default();
            match attr {
                "homedirectory" => entry.home = Some(value.to_string()),
                "enableflag" => {
                    let enabled = value.parse::<bool>().map_err(|_| UserFileError::BadFlag {
                        line: index + 1,
                        user: name.to_string(),
                        value: value.to_string(),
                    })?;
                    entry.enabled = Some(enabled);
                }
                "groups" => {
                    entry.groups = value
                        .split(',')
                        .map(str::trim)
                        .filter(|g| !g.is_empty())
                        .map(String::from)
                        .collect();
                }
                _ => tracing::trace!(user = name, attr, "ignoring user attribute"),
            }
        }

        let mut users = BTreeMap::new();
        for (name, entry) in partial {
            let home = entry
                .home
                .ok_or_else(|| UserFileError::MissingHome(name.clone()))?;
            let record = UserRecord {
                name: name.clone(),
                home,
                enabled: entry.enabled.unwrap_or(true),
                groups: entry.groups,
            };
            // reject bad names and relative homes up front
            record.identity()?;
            users.insert(name, record);
        }
        Ok(Self { users })
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&UserRecord> {
        self.users.get(name)
    }

    /// Enabled users in name order.
    pub fn enabled(&self) -> impl Iterator<Item = &UserRecord> {
        self.users.values().filter(|u| u.enabled)
    }

    /// Identity for a login name, refusing unknown and disabled users.
    pub fn identity(&self, name: &str) -> Result<Identity, UserFileError> {
        let record = self
            .get(name)
            .ok_or_else(|| UserFileError::UnknownUser(name.to_string()))?;
        if !record.enabled {
            return Err(UserFileError::Disabled(name.to_string()));
        }
        record.identity()
    }
}
