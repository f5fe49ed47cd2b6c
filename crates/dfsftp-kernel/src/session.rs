//! Per-connection views and the factory that opens them.
//!
//! A [`ViewFactory`] turns an authenticated [`Identity`] into a
//! [`SessionView`], making sure the user's home directory exists first.
//! The view owns the session's current directory; nothing else in the
//! crate holds mutable state.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::entry::VirtualEntry;
use crate::error::{ViewError, ViewResult};
use crate::identity::Identity;
use crate::path::{self, CanonicalPath};
use crate::store::{StoreClient, StoreConnector, StoreError};

/// Options for opening views.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewConfig {
    /// Create a missing home directory instead of refusing the session.
    pub create_home: bool,
    /// Mode for home directories created on login.
    pub home_mode: u32,
    /// Act under the name the store authenticated as, not the login name.
    pub use_store_principal: bool,
}

impl Default for ViewConfig {
    fn default() -> Self {
        Self {
            create_home: true,
            home_mode: 0o755,
            use_store_principal: false,
        }
    }
}

/// Opens [`SessionView`]s over a store.
#[derive(Clone)]
pub struct ViewFactory {
    connector: Arc<dyn StoreConnector>,
    config: ViewConfig,
}

impl std::fmt::Debug for ViewFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ViewFactory")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl ViewFactory {
    pub fn new(connector: Arc<dyn StoreConnector>) -> Self {
        Self::with_config(connector, ViewConfig::default())
    }

    pub fn with_config(connector: Arc<dyn StoreConnector>, config: ViewConfig) -> Self {
        Self { connector, config }
    }

    pub fn config(&self) -> &ViewConfig {
        &self.config
    }

    /// Open a view for `identity`, starting at its home directory.
    ///
    /// Concurrent calls for the same identity are safe as long as the
    /// store's `mkdirs` treats an existing directory as success.
    pub async fn create(&self, identity: Identity) -> ViewResult<SessionView> {
        if identity.name().trim().is_empty() {
            return Err(ViewError::InvalidIdentity("user name can not be empty".into()));
        }

        let store = self.connector.connect(&identity).await?;

        let identity = match store.principal() {
            Some(principal) if self.config.use_store_principal && principal != identity.name() => {
                tracing::debug!(user = %identity.name(), %principal, "acting as store principal");
                identity.renamed(principal)
            }
            _ => identity,
        };

        self.ensure_home(store.as_ref(), identity.home()).await?;

        tracing::info!(user = %identity.name(), home = %identity.home(), "session opened");
        let cwd = identity.home().clone();
        Ok(SessionView {
            identity: Arc::new(identity),
            store,
            cwd,
        })
    }

    async fn ensure_home(&self, store: &dyn StoreClient, home: &CanonicalPath) -> ViewResult<()> {
        let unavailable = |source: StoreError| ViewError::HomeUnavailable {
            home: home.clone(),
            source,
        };

        match store.metadata(home).await {
            Ok(meta) if meta.is_dir() => Ok(()),
            Ok(_) => Err(unavailable(StoreError::not_a_directory(home.as_str()))),
            Err(e) if e.is_not_found() && self.config.create_home => {
                store
                    .mkdirs(home, self.config.home_mode)
                    .await
                    .map_err(unavailable)?;
                tracing::info!(
                    %home,
                    mode = %format!("{:o}", self.config.home_mode),
                    "created home directory"
                );
                Ok(())
            }
            Err(e) => Err(unavailable(e)),
        }
    }
}

/// What a directory change did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Navigation {
    /// The target became the current directory.
    Moved,
    /// The target was refused and lies above home, so the session went home.
    ResetToHome,
    /// The target was refused; the current directory is as before.
    Unchanged,
}

/// One session's view of the store.
pub struct SessionView {
    identity: Arc<Identity>,
    store: Arc<dyn StoreClient>,
    cwd: CanonicalPath,
}

impl std::fmt::Debug for SessionView {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionView")
            .field("identity", &self.identity)
            .field("cwd", &self.cwd)
            .finish_non_exhaustive()
    }
}

impl SessionView {
    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn store(&self) -> &Arc<dyn StoreClient> {
        &self.store
    }

    /// Current directory as a path.
    pub fn current_dir(&self) -> &CanonicalPath {
        &self.cwd
    }

    /// Canonical path an expression refers to from the current directory.
    pub fn resolve(&self, requested: &str) -> CanonicalPath {
        path::resolve(&self.cwd, self.identity.home(), requested)
    }

    async fn entry_at(&self, path: CanonicalPath) -> ViewResult<VirtualEntry> {
        VirtualEntry::load(path, Arc::clone(&self.identity), Arc::clone(&self.store)).await
    }

    pub async fn home(&self) -> ViewResult<VirtualEntry> {
        self.entry_at(self.identity.home().clone()).await
    }

    pub async fn working_directory(&self) -> ViewResult<VirtualEntry> {
        self.entry_at(self.cwd.clone()).await
    }

    /// Entry for a path expression. The entry may be absent.
    pub async fn lookup(&self, requested: &str) -> ViewResult<VirtualEntry> {
        self.entry_at(self.resolve(requested)).await
    }

    /// Change the current directory and report what happened.
    ///
    /// The target must be an existing, readable directory inside home.
    /// A refused target whose subtree contains home sends the session home.
    pub async fn navigate(&mut self, requested: &str) -> Navigation {
        let target = self.resolve(requested);
        let home = self.identity.home();

        let accepted = match self.entry_at(target.clone()).await {
            Ok(entry) => {
                entry.is_directory() && target.is_within(home) && entry.is_readable().await
            }
            Err(e) => {
                tracing::warn!(path = %target, error = %e, "cd: lookup failed");
                false
            }
        };

        if accepted {
            tracing::debug!(user = %self.identity.name(), from = %self.cwd, to = %target, "cd");
            self.cwd = target;
            Navigation::Moved
        } else if home.is_within(&target) {
            tracing::debug!(user = %self.identity.name(), path = %target, "cd refused, back to home");
            self.cwd = home.clone();
            Navigation::ResetToHome
        } else {
            tracing::debug!(user = %self.identity.name(), path = %target, "cd refused");
            Navigation::Unchanged
        }
    }

    /// Protocol-facing directory change; always succeeds.
    ///
    /// The outcome is only visible through [`current_dir`](Self::current_dir).
    pub async fn change_directory(&mut self, requested: &str) -> bool {
        self.navigate(requested).await;
        true
    }

    pub fn is_random_accessible(&self) -> bool {
        true
    }

    /// End the session. Holds nothing that needs releasing.
    pub fn dispose(self) {
        tracing::debug!(user = %self.identity.name(), "session closed");
    }
}
