//! Local directory backend.
//!
//! Presents a directory tree as the store. Ownership comes from the real
//! uid/gid of each file, mapped to names through the system user database.

use async_trait::async_trait;
use nix::unistd::{Gid, Group, Uid, User};
use std::ffi::OsStr;
use std::io;
use std::os::unix::fs::{MetadataExt, PermissionsExt};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;

use crate::identity::Identity;
use crate::path::CanonicalPath;
use crate::store::error::{StoreError, StoreResult};
use crate::store::ops::{ReadStream, StoreClient, StoreConnector, WriteStream};
use crate::store::types::{FileType, Metadata, Permissions};

/// Local directory store.
///
/// Store path `/a/b` maps to `<root>/a/b`. Symlinks that lead outside the
/// root are refused.
#[derive(Debug, Clone)]
pub struct LocalBackend {
    root: PathBuf,
}

impl LocalBackend {
    /// Create a store rooted at `root`.
    ///
    /// The root is canonicalized at construction time to handle symlinks
    /// (e.g. macOS `/tmp` → `/private/tmp`).
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root: PathBuf = root.into();
        let root = root.canonicalize().unwrap_or(root);
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Map a store path onto the local filesystem.
    ///
    /// The nearest existing ancestor is canonicalized and the missing tail
    /// re-appended, so a symlink anywhere along the way must resolve under
    /// the root. Dangling symlinks are refused.
    async fn local_path(&self, path: &CanonicalPath) -> StoreResult<PathBuf> {
        let full = self.root.join(path.as_str().trim_start_matches('/'));

        let mut existing = full.as_path();
        let mut missing: Vec<&OsStr> = Vec::new();
        let resolved = loop {
            match fs::canonicalize(existing).await {
                Ok(resolved) => break resolved,
                Err(e) if e.kind() == io::ErrorKind::NotFound => {
                    if fs::symlink_metadata(existing).await.is_ok_and(|m| m.is_symlink()) {
                        return Err(StoreError::permission_denied(format!(
                            "{} is a dangling symlink",
                            existing.display()
                        )));
                    }
                    match (existing.parent(), existing.file_name()) {
                        (Some(parent), Some(name)) => {
                            missing.push(name);
                            existing = parent;
                        }
                        _ => return Err(e.into()),
                    }
                }
                Err(e) => return Err(e.into()),
            }
        };

        if !resolved.starts_with(&self.root) {
            return Err(StoreError::permission_denied(format!(
                "{} is not under {}",
                resolved.display(),
                self.root.display()
            )));
        }
        Ok(missing.iter().rev().fold(resolved, |acc, name| acc.join(name)))
    }

    /// Local path of the entry itself; a final symlink is not followed.
    async fn entry_path(&self, path: &CanonicalPath) -> StoreResult<PathBuf> {
        match path.parent() {
            Some(parent) => Ok(self.local_path(&parent).await?.join(path.name())),
            None => Ok(self.root.clone()),
        }
    }

    fn to_metadata(meta: &std::fs::Metadata) -> Metadata {
        let kind = if meta.is_dir() {
            FileType::Directory
        } else {
            FileType::File
        };
        Metadata {
            owner: user_name(meta.uid()),
            group: group_name(meta.gid()),
            permissions: Permissions::from_mode(meta.permissions().mode()),
            kind,
            size: if meta.is_dir() { 0 } else { meta.len() },
            mtime: meta.modified().unwrap_or(std::time::SystemTime::UNIX_EPOCH),
        }
    }

    async fn ensure_parent(local: &Path) -> StoreResult<()> {
        if let Some(parent) = local.parent() {
            fs::create_dir_all(parent).await?;
        }
        Ok(())
    }
}

fn user_name(uid: u32) -> String {
    User::from_uid(Uid::from_raw(uid))
        .ok()
        .flatten()
        .map(|u| u.name)
        .unwrap_or_else(|| uid.to_string())
}

fn group_name(gid: u32) -> String {
    Group::from_gid(Gid::from_raw(gid))
        .ok()
        .flatten()
        .map(|g| g.name)
        .unwrap_or_else(|| gid.to_string())
}

#[async_trait]
impl StoreClient for LocalBackend {
    async fn metadata(&self, path: &CanonicalPath) -> StoreResult<Metadata> {
        let local = self.local_path(path).await?;
        let meta = fs::metadata(&local).await.map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => StoreError::not_found(path.as_str()),
            _ => StoreError::from(e),
        })?;
        Ok(Self::to_metadata(&meta))
    }

    async fn list(&self, path: &CanonicalPath) -> StoreResult<Vec<CanonicalPath>> {
        let local = self.local_path(path).await?;
        let mut dir = fs::read_dir(&local).await?;
        let mut children = Vec::new();
        while let Some(entry) = dir.next_entry().await? {
            let file_name = entry.file_name();
            match file_name.to_str() {
                Some(name) => children.push(path.join(name)),
                None => tracing::warn!(
                    dir = %path,
                    name = %file_name.to_string_lossy(),
                    "skipping child with non-UTF-8 name"
                ),
            }
        }
        children.sort();
        Ok(children)
    }

    async fn open(&self, path: &CanonicalPath) -> StoreResult<ReadStream> {
        let local = self.local_path(path).await?;
        if fs::metadata(&local).await?.is_dir() {
            return Err(StoreError::is_a_directory(path.as_str()));
        }
        let file = fs::File::open(&local).await?;
        Ok(Box::new(file))
    }

    async fn create(&self, path: &CanonicalPath) -> StoreResult<WriteStream> {
        let local = self.local_path(path).await?;
        Self::ensure_parent(&local).await?;
        let file = fs::File::create(&local).await?;
        Ok(Box::new(file))
    }

    async fn append(&self, path: &CanonicalPath) -> StoreResult<WriteStream> {
        let local = self.local_path(path).await?;
        let file = fs::OpenOptions::new().append(true).open(&local).await?;
        Ok(Box::new(file))
    }

    async fn mkdirs(&self, path: &CanonicalPath, mode: u32) -> StoreResult<()> {
        let local = self.local_path(path).await?;
        if let Ok(meta) = fs::metadata(&local).await {
            return if meta.is_dir() {
                Ok(())
            } else {
                Err(StoreError::not_a_directory(path.as_str()))
            };
        }
        fs::DirBuilder::new()
            .recursive(true)
            .mode(mode)
            .create(&local)
            .await?;
        Ok(())
    }

    async fn delete(&self, path: &CanonicalPath, recursive: bool) -> StoreResult<()> {
        if path.is_root() {
            return Err(StoreError::permission_denied("cannot remove root"));
        }
        let local = self.entry_path(path).await?;
        let meta = fs::symlink_metadata(&local).await?;
        if meta.is_dir() {
            if recursive {
                fs::remove_dir_all(&local).await?;
            } else {
                fs::remove_dir(&local).await?;
            }
        } else {
            fs::remove_file(&local).await?;
        }
        Ok(())
    }

    async fn rename(&self, from: &CanonicalPath, to: &CanonicalPath) -> StoreResult<()> {
        let source = self.entry_path(from).await?;
        let target = match fs::metadata(self.local_path(to).await?).await {
            Ok(meta) if meta.is_dir() => to.join(from.name()),
            Ok(_) => return Err(StoreError::already_exists(to.as_str())),
            Err(_) => to.clone(),
        };
        let target_local = self.local_path(&target).await?;
        if fs::try_exists(&target_local).await? {
            return Err(StoreError::already_exists(target.as_str()));
        }
        fs::rename(&source, &target_local).await?;
        Ok(())
    }

    fn principal(&self) -> Option<String> {
        Some(user_name(Uid::effective().as_raw()))
    }
}

#[async_trait]
impl StoreConnector for LocalBackend {
    /// The process acts as one OS user for every session.
    async fn connect(&self, _identity: &Identity) -> StoreResult<Arc<dyn StoreClient>> {
        Ok(Arc::new(self.clone()))
    }
}
