//! Canonical store paths and session path resolution.
//!
//! Every path the view hands to a [`StoreClient`](crate::store::StoreClient)
//! is a [`CanonicalPath`]: absolute, `/`-separated, with no `.`, `..` or
//! empty segments. [`resolve`] turns the path expressions a client sends
//! (relative, absolute, `..`, `~`) into canonical paths confined to the
//! session's home directory.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

const SLASH: &str = "/";

/// A path string that does not start with `/`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("not an absolute path: {0:?}")]
pub struct NotAbsolute(pub String);

/// Absolute, normalized store path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CanonicalPath(String);

impl CanonicalPath {
    /// The store root, `/`.
    pub fn root() -> Self {
        Self(SLASH.to_string())
    }

    /// Parse and normalize an absolute path.
    ///
    /// `..` at the root stays at the root.
    pub fn parse(raw: &str) -> Result<Self, NotAbsolute> {
        if !raw.starts_with('/') {
            return Err(NotAbsolute(raw.to_string()));
        }
        Ok(Self::from_segments(normalize_segments(raw, &mut Vec::new())))
    }

    fn from_segments<'a>(segments: impl IntoIterator<Item = &'a str>) -> Self {
        let mut out = String::new();
        for segment in segments {
            out.push('/');
            out.push_str(segment);
        }
        if out.is_empty() {
            out.push('/');
        }
        Self(out)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_root(&self) -> bool {
        self.0 == SLASH
    }

    /// Path segments, root has none.
    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split('/').filter(|s| !s.is_empty())
    }

    /// Last path segment, or `/` for the root.
    pub fn name(&self) -> &str {
        if self.is_root() {
            return SLASH;
        }
        match self.0.rfind('/') {
            Some(pos) => &self.0[pos + 1..],
            None => &self.0,
        }
    }

    /// Parent directory, `None` for the root.
    pub fn parent(&self) -> Option<CanonicalPath> {
        if self.is_root() {
            return None;
        }
        match self.0.rfind('/') {
            Some(0) | None => Some(Self::root()),
            Some(pos) => Some(Self(self.0[..pos].to_string())),
        }
    }

    /// Append a relative path and normalize. `..` never climbs above `/`.
    pub fn join(&self, relative: &str) -> CanonicalPath {
        let mut stack: Vec<&str> = self.segments().collect();
        let segments = normalize_segments(relative, &mut stack);
        Self::from_segments(segments)
    }

    /// True if `self` equals `base` or lies beneath it.
    ///
    /// Compared by segment: `/user/alicebob` is not within `/user/alice`.
    pub fn is_within(&self, base: &CanonicalPath) -> bool {
        if base.is_root() {
            return true;
        }
        match self.0.strip_prefix(base.as_str()) {
            Some(rest) => rest.is_empty() || rest.starts_with('/'),
            None => false,
        }
    }
}

/// Normalize `raw` on top of `stack`; `..` pops whatever is there.
fn normalize_segments<'a>(raw: &'a str, stack: &mut Vec<&'a str>) -> Vec<&'a str> {
    for segment in raw.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                stack.pop();
            }
            s => stack.push(s),
        }
    }
    std::mem::take(stack)
}

impl fmt::Display for CanonicalPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CanonicalPath {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl FromStr for CanonicalPath {
    type Err = NotAbsolute;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for CanonicalPath {
    type Error = NotAbsolute;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<CanonicalPath> for String {
    fn from(path: CanonicalPath) -> Self {
        path.0
    }
}

/// Resolve a client path expression against a session.
///
/// Raw path construction, in order:
///
/// 1. `/abs`: kept when it already starts with `home`, otherwise re-rooted
///    as `home + /abs`.
/// 2. `..`: `current/..`, or `/` when `current` is the root.
/// 3. `~rest`: `home + rest`.
/// 4. anything else: appended to `current`.
///
/// The raw path is then confined to `home`. A raw path inside the home tree
/// is normalized with `..` clamped at `home`; anything else is normalized
/// and re-rooted under `home`. The literal root produced by rule 2 is
/// returned as-is. Blank requests resolve to `current`.
pub fn resolve(current: &CanonicalPath, home: &CanonicalPath, requested: &str) -> CanonicalPath {
    if requested.trim().is_empty() {
        return current.clone();
    }
    let raw = raw_path(current, home, requested);
    confine(&raw, home)
}

fn raw_path(current: &CanonicalPath, home: &CanonicalPath, requested: &str) -> String {
    let home_str = home.as_str();
    if requested.starts_with('/') {
        if requested.starts_with(home_str) {
            requested.to_string()
        } else {
            format!("{home_str}{requested}")
        }
    } else if requested == ".." {
        if current.is_root() {
            SLASH.to_string()
        } else {
            format!("{current}/..")
        }
    } else if let Some(rest) = requested.strip_prefix('~') {
        format!("{home_str}{rest}")
    } else if current.as_str().len() > 1 {
        format!("{current}/{requested}")
    } else {
        format!("/{requested}")
    }
}

fn confine(raw: &str, home: &CanonicalPath) -> CanonicalPath {
    if raw == SLASH {
        return CanonicalPath::root();
    }

    let under_home = home.is_root()
        || raw
            .strip_prefix(home.as_str())
            .is_some_and(|rest| rest.is_empty() || rest.starts_with('/'));

    if under_home {
        let rest = &raw[home.as_str().len()..];
        let mut stack: Vec<&str> = Vec::new();
        for segment in rest.split('/') {
            match segment {
                "" | "." => {}
                ".." => {
                    stack.pop();
                }
                s => stack.push(s),
            }
        }
        return home.join(&stack.join(SLASH));
    }

    // Normalized paths carry no `..`, so the join cannot leave home.
    let normalized = CanonicalPath::from_segments(normalize_segments(raw, &mut Vec::new()));
    home.join(normalized.as_str())
}
