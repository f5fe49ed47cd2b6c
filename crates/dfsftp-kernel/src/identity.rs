//! Authenticated session identity.

use serde::{Deserialize, Serialize};

use crate::error::{ViewError, ViewResult};
use crate::path::CanonicalPath;

/// Who a session acts as, and where it is jailed.
///
/// Supplied by the authentication layer; immutable for a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    name: String,
    home: CanonicalPath,
    #[serde(default)]
    groups: Vec<String>,
}

impl Identity {
    /// Build an identity from unchecked parts.
    ///
    /// Fails if the name is blank or the home directory is not absolute.
    pub fn parse(name: &str, home: &str) -> ViewResult<Self> {
        if name.trim().is_empty() {
            return Err(ViewError::InvalidIdentity("user name can not be empty".into()));
        }
        let home = CanonicalPath::parse(home).map_err(|e| {
            ViewError::InvalidIdentity(format!("home directory of {name}: {e}"))
        })?;
        Ok(Self::new(name, home))
    }

    pub fn new(name: impl Into<String>, home: CanonicalPath) -> Self {
        Self {
            name: name.into(),
            home,
            groups: Vec::new(),
        }
    }

    /// Set the groups this user belongs to.
    pub fn with_groups<I, S>(mut self, groups: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.groups = groups.into_iter().map(Into::into).collect();
        self
    }

    /// Same home and groups under another name.
    pub fn renamed(&self, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..self.clone()
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn home(&self) -> &CanonicalPath {
        &self.home
    }

    pub fn groups(&self) -> &[String] {
        &self.groups
    }

    pub fn in_group(&self, group: &str) -> bool {
        self.groups.iter().any(|g| g == group)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_validates() {
        let alice = Identity::parse("alice", "/user/alice/").unwrap();
        assert_eq!(alice.name(), "alice");
        assert_eq!(alice.home().as_str(), "/user/alice");

        assert!(matches!(
            Identity::parse("", "/user/x"),
            Err(ViewError::InvalidIdentity(_))
        ));
        assert!(matches!(
            Identity::parse("bob", "user/bob"),
            Err(ViewError::InvalidIdentity(_))
        ));
    }

    #[test]
    fn test_groups() {
        let alice = Identity::parse("alice", "/user/alice")
            .unwrap()
            .with_groups(["staff", "analytics"]);
        assert!(alice.in_group("staff"));
        assert!(!alice.in_group("wheel"));

        let renamed = alice.renamed("alice@EXAMPLE.COM");
        assert_eq!(renamed.name(), "alice@EXAMPLE.COM");
        assert_eq!(renamed.groups(), alice.groups());
        assert_eq!(renamed.home(), alice.home());
    }
}
