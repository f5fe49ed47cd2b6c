//! Server configuration.
//!
//! Values come from an optional TOML file, then command-line overrides.
//! Everything not set falls back to [`crate::constants`].

use anyhow::{Context, Result, bail};
use dfsftp_kernel::{MemoryBackend, StoreConnector, ViewConfig};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::constants::*;

/// Which backing store sessions run against.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum StoreKind {
    /// Ephemeral in-process store.
    #[default]
    Memory,
    /// A local directory tree.
    Local,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub kind: StoreKind,
    /// Directory served by the local store.
    pub root: Option<PathBuf>,
}

/// Connection limits handed to the protocol engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionLimits {
    pub max_threads: u32,
    pub max_logins: u32,
    pub max_login_failures: u32,
    pub login_failure_delay_ms: u64,
    pub anonymous_login_enabled: bool,
    pub max_anonymous_logins: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Control port; 0 means unset.
    pub port: u16,
    /// User definition file.
    pub user_conf: Option<PathBuf>,
    pub max_threads: u32,
    pub max_logins: u32,
    pub max_login_failures: u32,
    pub login_failure_delay_ms: u64,
    pub anonymous_login_enabled: bool,
    pub max_anonymous_logins: u32,
    pub store: StoreConfig,
    pub view: ViewConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            user_conf: None,
            max_threads: DEFAULT_MAX_THREADS,
            max_logins: DEFAULT_MAX_LOGINS,
            max_login_failures: DEFAULT_MAX_LOGIN_FAILURES,
            login_failure_delay_ms: DEFAULT_LOGIN_FAILURE_DELAY_MS,
            anonymous_login_enabled: false,
            max_anonymous_logins: DEFAULT_MAX_ANONYMOUS_LOGINS,
            store: StoreConfig::default(),
            view: ViewConfig::default(),
        }
    }
}

/// Command-line values that replace file values when present.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    /// Wider than a port so out-of-range values reach validation.
    pub port: Option<u32>,
    pub user_conf: Option<PathBuf>,
    pub max_threads: Option<u32>,
    pub max_logins: Option<u32>,
    pub store: Option<StoreKind>,
    pub root: Option<PathBuf>,
}

impl ServerConfig {
    /// Read `path`, or start from defaults when no file is given.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {}", path.display()))?;
        Self::from_toml(&content)
            .with_context(|| format!("Failed to parse config {}", path.display()))
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let mut config: Self = toml::from_str(content)?;
        if config.port == 0 {
            config.port = DEFAULT_PORT;
        }
        Ok(config)
    }

    pub fn apply(&mut self, overrides: Overrides) -> Result<()> {
        if let Some(port) = overrides.port {
            self.port = match u16::try_from(port) {
                Ok(port) if port > 0 => port,
                _ => bail!("port must be between 1 and 65535, got {port}"),
            };
            tracing::info!(port = self.port, "port set from command line");
        }
        if let Some(user_conf) = overrides.user_conf {
            tracing::info!(path = %user_conf.display(), "user file set from command line");
            self.user_conf = Some(user_conf);
        }
        if let Some(max_threads) = overrides.max_threads {
            tracing::info!(max_threads, "thread limit set from command line");
            self.max_threads = max_threads;
        }
        if let Some(max_logins) = overrides.max_logins {
            tracing::info!(max_logins, "login limit set from command line");
            self.max_logins = max_logins;
        }
        if let Some(kind) = overrides.store {
            self.store.kind = kind;
        }
        if let Some(root) = overrides.root {
            self.store.root = Some(root);
        }
        Ok(())
    }

    /// Check the settings startup depends on.
    pub fn validate(&self) -> Result<()> {
        if self.port == 0 {
            bail!("port must be between 1 and 65535");
        }
        match &self.user_conf {
            None => bail!("no user definition file given (use -u/--userconf)"),
            Some(path) if !path.is_file() => {
                bail!("user definition file {} does not exist", path.display())
            }
            Some(_) => {}
        }
        if self.store.kind == StoreKind::Local {
            match &self.store.root {
                None => bail!("local store needs a root directory (use --root)"),
                Some(root) if !root.is_dir() => {
                    bail!("store root {} is not a directory", root.display())
                }
                Some(_) => {}
            }
        }
        Ok(())
    }

    /// User definition file; call after [`validate`](Self::validate).
    pub fn user_conf(&self) -> Result<&Path> {
        self.user_conf
            .as_deref()
            .context("no user definition file given")
    }

    pub fn limits(&self) -> ConnectionLimits {
        ConnectionLimits {
            max_threads: self.max_threads,
            max_logins: self.max_logins,
            max_login_failures: self.max_login_failures,
            login_failure_delay_ms: self.login_failure_delay_ms,
            anonymous_login_enabled: self.anonymous_login_enabled,
            max_anonymous_logins: self.max_anonymous_logins,
        }
    }

    /// Build the connector sessions will use.
    pub fn connector(&self) -> Result<Arc<dyn StoreConnector>> {
        match self.store.kind {
            StoreKind::Memory => Ok(Arc::new(MemoryBackend::new())),
            #[cfg(unix)]
            StoreKind::Local => {
                let root = self
                    .store
                    .root
                    .as_ref()
                    .context("local store needs a root directory")?;
                Ok(Arc::new(dfsftp_kernel::LocalBackend::new(root)))
            }
            #[cfg(not(unix))]
            StoreKind::Local => bail!("the local store is only available on unix"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.port, 2121);
        let limits = config.limits();
        assert_eq!(limits.max_threads, 200);
        assert_eq!(limits.max_logins, 50);
        assert_eq!(limits.max_login_failures, 3);
        assert_eq!(limits.login_failure_delay_ms, 500);
        assert!(!limits.anonymous_login_enabled);
        assert_eq!(limits.max_anonymous_logins, 0);
        assert_eq!(config.store.kind, StoreKind::Memory);
        assert_eq!(config.view, ViewConfig::default());
    }

    #[test]
    fn test_parse_file() {
        let config = ServerConfig::from_toml(
            r#"
            port = 2200
            user_conf = "users.properties"
            max_logins = 10

            [store]
            kind = "local"
            root = "/srv/dfs"

            [view]
            home_mode = 0o700
            use_store_principal = true
            "#,
        )
        .unwrap();

        assert_eq!(config.port, 2200);
        assert_eq!(config.user_conf, Some(PathBuf::from("users.properties")));
        assert_eq!(config.max_logins, 10);
        assert_eq!(config.max_threads, 200);
        assert_eq!(config.store.kind, StoreKind::Local);
        assert_eq!(config.store.root, Some(PathBuf::from("/srv/dfs")));
        assert_eq!(config.view.home_mode, 0o700);
        assert!(config.view.create_home);
        assert!(config.view.use_store_principal);
    }

    #[test]
    fn test_zero_port_in_file_is_unset() {
        let config = ServerConfig::from_toml("port = 0").unwrap();
        assert_eq!(config.port, DEFAULT_PORT);
    }

    #[test]
    fn test_unknown_store_kind_rejected() {
        assert!(ServerConfig::from_toml("[store]\nkind = \"s3\"").is_err());
    }

    #[test]
    fn test_overrides_win() {
        let mut config = ServerConfig::from_toml("port = 2200\nmax_threads = 8").unwrap();
        config
            .apply(Overrides {
                port: Some(2300),
                max_threads: Some(16),
                store: Some(StoreKind::Local),
                root: Some(PathBuf::from("/data")),
                ..Overrides::default()
            })
            .unwrap();
        assert_eq!(config.port, 2300);
        assert_eq!(config.max_threads, 16);
        assert_eq!(config.store.kind, StoreKind::Local);
        assert_eq!(config.store.root, Some(PathBuf::from("/data")));
    }

    #[test]
    fn test_port_out_of_range() {
        let mut config = ServerConfig::default();
        for port in [0, 65536, 100_000] {
            let result = config.apply(Overrides {
                port: Some(port),
                ..Overrides::default()
            });
            assert!(result.is_err(), "port {port} accepted");
        }
        assert!(config.apply(Overrides {
            port: Some(65535),
            ..Overrides::default()
        })
        .is_ok());
    }

    #[test]
    fn test_validate_requires_user_file() {
        let dir = TempDir::new().unwrap();
        let mut config = ServerConfig::default();
        assert!(config.validate().is_err());

        config.user_conf = Some(dir.path().join("missing.properties"));
        assert!(config.validate().is_err());

        let users = dir.path().join("users.properties");
        fs::write(&users, "").unwrap();
        config.user_conf = Some(users);
        config.validate().unwrap();
    }

    #[test]
    fn test_validate_local_root() {
        let dir = TempDir::new().unwrap();
        let users = dir.path().join("users.properties");
        fs::write(&users, "").unwrap();

        let mut config = ServerConfig {
            user_conf: Some(users),
            ..ServerConfig::default()
        };
        config.store.kind = StoreKind::Local;
        assert!(config.validate().is_err());

        config.store.root = Some(dir.path().to_path_buf());
        config.validate().unwrap();
        assert!(config.connector().is_ok());
    }

    #[test]
    fn test_load_from_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("dfsftp.toml");
        fs::write(&path, "max_logins = 7\n").unwrap();
        assert_eq!(ServerConfig::load(Some(&path)).unwrap().max_logins, 7);
        assert_eq!(ServerConfig::load(None).unwrap(), ServerConfig::default());
        assert!(ServerConfig::load(Some(&dir.path().join("nope.toml"))).is_err());
    }
}
