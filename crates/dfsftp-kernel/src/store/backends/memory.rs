//! In-memory store backend.
//!
//! Used for testing and the `memory` store kind. All data is ephemeral.
//! Clones made with [`MemoryBackend::as_user`] share one tree and stamp new
//! objects with their own user; groups are inherited from the parent
//! directory. The backend stores permission bits but never enforces them.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::io::{self, Cursor};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::SystemTime;
use tokio::io::AsyncWrite;

use crate::identity::Identity;
use crate::path::CanonicalPath;
use crate::store::error::{StoreError, StoreResult};
use crate::store::ops::{ReadStream, StoreClient, StoreConnector, WriteStream};
use crate::store::types::{Metadata, Permissions};

/// Superuser that owns the root of a fresh store.
pub const DEFAULT_USER: &str = "hdfs";
/// Group of the root of a fresh store.
pub const DEFAULT_GROUP: &str = "supergroup";

const FILE_MODE: u32 = 0o644;
const DIR_MODE: u32 = 0o755;

#[derive(Debug, Clone)]
struct Node {
    meta: Metadata,
    data: Vec<u8>,
}

type Tree = BTreeMap<CanonicalPath, Node>;

/// In-memory store.
#[derive(Debug, Clone)]
pub struct MemoryBackend {
    tree: Arc<RwLock<Tree>>,
    user: String,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBackend {
    /// Create an empty store whose root is owned by [`DEFAULT_USER`].
    pub fn new() -> Self {
        let mut tree = BTreeMap::new();
        tree.insert(
            CanonicalPath::root(),
            Node {
                meta: Metadata::directory(DEFAULT_USER, DEFAULT_GROUP, DIR_MODE),
                data: Vec::new(),
            },
        );
        Self {
            tree: Arc::new(RwLock::new(tree)),
            user: DEFAULT_USER.to_string(),
        }
    }

    /// A client over the same tree acting as `user`.
    pub fn as_user(&self, user: impl Into<String>) -> Self {
        Self {
            tree: Arc::clone(&self.tree),
            user: user.into(),
        }
    }

    /// Store a file with explicit ownership, creating parents as needed.
    pub fn put_file(
        &self,
        path: &CanonicalPath,
        data: &[u8],
        owner: &str,
        group: &str,
        mode: u32,
    ) -> StoreResult<()> {
        let mut tree = self.tree.write();
        self.ensure_parents(&mut tree, path)?;
        tree.insert(
            path.clone(),
            Node {
                meta: Metadata::file(owner, group, mode, data.len() as u64),
                data: data.to_vec(),
            },
        );
        Ok(())
    }

    /// Store a directory with explicit ownership, creating parents as needed.
    pub fn put_dir(
        &self,
        path: &CanonicalPath,
        owner: &str,
        group: &str,
        mode: u32,
    ) -> StoreResult<()> {
        let mut tree = self.tree.write();
        self.ensure_parents(&mut tree, path)?;
        tree.insert(
            path.clone(),
            Node {
                meta: Metadata::directory(owner, group, mode),
                data: Vec::new(),
            },
        );
        Ok(())
    }

    /// Change permission bits.
    pub fn chmod(&self, path: &CanonicalPath, mode: u32) -> StoreResult<()> {
        let mut tree = self.tree.write();
        let node = tree
            .get_mut(path)
            .ok_or_else(|| StoreError::not_found(path.as_str()))?;
        node.meta.permissions = Permissions::from_mode(mode);
        Ok(())
    }

    /// Change owner and group.
    pub fn chown(&self, path: &CanonicalPath, owner: &str, group: &str) -> StoreResult<()> {
        let mut tree = self.tree.write();
        let node = tree
            .get_mut(path)
            .ok_or_else(|| StoreError::not_found(path.as_str()))?;
        node.meta.owner = owner.to_string();
        node.meta.group = group.to_string();
        Ok(())
    }

    /// Create missing ancestors of `path` as directories owned by this user.
    fn ensure_parents(&self, tree: &mut Tree, path: &CanonicalPath) -> StoreResult<()> {
        let mut ancestors = Vec::new();
        let mut current = path.parent();
        while let Some(dir) = current {
            current = dir.parent();
            ancestors.push(dir);
        }
        // root first
        for dir in ancestors.into_iter().rev() {
            self.ensure_dir(tree, &dir, DIR_MODE)?;
        }
        Ok(())
    }

    fn ensure_dir(&self, tree: &mut Tree, dir: &CanonicalPath, mode: u32) -> StoreResult<()> {
        match tree.get(dir) {
            Some(node) if node.meta.is_dir() => Ok(()),
            Some(_) => Err(StoreError::not_a_directory(dir.as_str())),
            None => {
                let group = Self::inherited_group(tree, dir);
                tree.insert(
                    dir.clone(),
                    Node {
                        meta: Metadata::directory(self.user.as_str(), group, mode),
                        data: Vec::new(),
                    },
                );
                Ok(())
            }
        }
    }

    fn inherited_group(tree: &Tree, path: &CanonicalPath) -> String {
        path.parent()
            .and_then(|parent| tree.get(&parent))
            .map(|node| node.meta.group.clone())
            .unwrap_or_else(|| DEFAULT_GROUP.to_string())
    }

    fn descendants(tree: &Tree, path: &CanonicalPath) -> Vec<CanonicalPath> {
        tree.keys()
            .filter(|k| *k != path && k.is_within(path))
            .cloned()
            .collect()
    }
}

#[async_trait]
impl StoreClient for MemoryBackend {
    async fn metadata(&self, path: &CanonicalPath) -> StoreResult<Metadata> {
        let tree = self.tree.read();
        tree.get(path)
            .map(|node| node.meta.clone())
            .ok_or_else(|| StoreError::not_found(path.as_str()))
    }

    async fn list(&self, path: &CanonicalPath) -> StoreResult<Vec<CanonicalPath>> {
        let tree = self.tree.read();
        match tree.get(path) {
            Some(node) if node.meta.is_dir() => {}
            Some(_) => return Err(StoreError::not_a_directory(path.as_str())),
            None => return Err(StoreError::not_found(path.as_str())),
        }

        // BTreeMap order keeps listings sorted
        Ok(tree
            .keys()
            .filter(|k| k.parent().as_ref() == Some(path))
            .cloned()
            .collect())
    }

    async fn open(&self, path: &CanonicalPath) -> StoreResult<ReadStream> {
        let tree = self.tree.read();
        match tree.get(path) {
            Some(node) if node.meta.is_file() => Ok(Box::new(Cursor::new(node.data.clone()))),
            Some(_) => Err(StoreError::is_a_directory(path.as_str())),
            None => Err(StoreError::not_found(path.as_str())),
        }
    }

    async fn create(&self, path: &CanonicalPath) -> StoreResult<WriteStream> {
        {
            let mut tree = self.tree.write();
            if tree.get(path).is_some_and(|node| node.meta.is_dir()) {
                return Err(StoreError::is_a_directory(path.as_str()));
            }
            self.ensure_parents(&mut tree, path)?;
            let group = Self::inherited_group(&tree, path);
            tree.insert(
                path.clone(),
                Node {
                    meta: Metadata::file(self.user.as_str(), group, FILE_MODE, 0),
                    data: Vec::new(),
                },
            );
        }
        Ok(Box::new(MemoryWriter::new(Arc::clone(&self.tree), path.clone())))
    }

    async fn append(&self, path: &CanonicalPath) -> StoreResult<WriteStream> {
        {
            let tree = self.tree.read();
            match tree.get(path) {
                Some(node) if node.meta.is_file() => {}
                Some(_) => return Err(StoreError::is_a_directory(path.as_str())),
                None => return Err(StoreError::not_found(path.as_str())),
            }
        }
        Ok(Box::new(MemoryWriter::new(Arc::clone(&self.tree), path.clone())))
    }

    async fn mkdirs(&self, path: &CanonicalPath, mode: u32) -> StoreResult<()> {
        let mut tree = self.tree.write();
        self.ensure_parents(&mut tree, path)?;
        self.ensure_dir(&mut tree, path, mode)
    }

    async fn delete(&self, path: &CanonicalPath, recursive: bool) -> StoreResult<()> {
        if path.is_root() {
            return Err(StoreError::permission_denied("cannot remove root"));
        }

        let mut tree = self.tree.write();
        if !tree.contains_key(path) {
            return Err(StoreError::not_found(path.as_str()));
        }

        let children = Self::descendants(&tree, path);
        if !children.is_empty() && !recursive {
            return Err(StoreError::directory_not_empty(path.as_str()));
        }
        for child in children {
            tree.remove(&child);
        }
        tree.remove(path);
        Ok(())
    }

    async fn rename(&self, from: &CanonicalPath, to: &CanonicalPath) -> StoreResult<()> {
        if from.is_root() {
            return Err(StoreError::permission_denied("cannot rename root"));
        }

        let mut tree = self.tree.write();
        if !tree.contains_key(from) {
            return Err(StoreError::not_found(from.as_str()));
        }

        // Renaming onto an existing directory moves the source into it
        let target = match tree.get(to) {
            Some(node) if node.meta.is_dir() => to.join(from.name()),
            Some(_) => return Err(StoreError::already_exists(to.as_str())),
            None => to.clone(),
        };
        if tree.contains_key(&target) {
            return Err(StoreError::already_exists(target.as_str()));
        }
        if target.is_within(from) {
            return Err(StoreError::invalid_path(format!(
                "cannot move {from} beneath itself"
            )));
        }
        match target.parent().and_then(|parent| tree.get(&parent).map(|n| n.meta.is_dir())) {
            Some(true) => {}
            Some(false) => return Err(StoreError::not_a_directory(target.as_str())),
            None => return Err(StoreError::not_found(target.as_str())),
        }

        let mut moved = Self::descendants(&tree, from);
        moved.push(from.clone());
        for old in moved {
            if let Some(node) = tree.remove(&old) {
                let relative = &old.as_str()[from.as_str().len()..];
                tree.insert(target.join(relative), node);
            }
        }
        Ok(())
    }

    fn principal(&self) -> Option<String> {
        Some(self.user.clone())
    }
}

#[async_trait]
impl StoreConnector for MemoryBackend {
    async fn connect(&self, identity: &Identity) -> StoreResult<Arc<dyn StoreClient>> {
        Ok(Arc::new(self.as_user(identity.name())))
    }
}

/// Appends every write to the node's data as it arrives.
struct MemoryWriter {
    tree: Arc<RwLock<Tree>>,
    path: CanonicalPath,
}

impl MemoryWriter {
    fn new(tree: Arc<RwLock<Tree>>, path: CanonicalPath) -> Self {
        Self { tree, path }
    }
}

impl AsyncWrite for MemoryWriter {
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let mut tree = self.tree.write();
        match tree.get_mut(&self.path) {
            Some(node) if node.meta.is_file() => {
                node.data.extend_from_slice(buf);
                node.meta.size = node.data.len() as u64;
                node.meta.mtime = SystemTime::now();
                Poll::Ready(Ok(buf.len()))
            }
            _ => Poll::Ready(Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("{} removed while open", self.path),
            ))),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    fn p(s: &str) -> CanonicalPath {
        CanonicalPath::parse(s).unwrap()
    }

    async fn read_all(store: &MemoryBackend, path: &str) -> Vec<u8> {
        let mut stream = store.open(&p(path)).await.unwrap();
        let mut buf = Vec::new();
        stream.read_to_end(&mut buf).await.unwrap();
        buf
    }

    #[tokio::test]
    async fn test_create_and_read() {
        let store = MemoryBackend::new();
        let mut out = store.create(&p("/test.txt")).await.unwrap();
        out.write_all(b"hello world").await.unwrap();
        out.shutdown().await.unwrap();

        assert_eq!(read_all(&store, "/test.txt").await, b"hello world");
        assert_eq!(store.metadata(&p("/test.txt")).await.unwrap().size, 11);
    }

    #[tokio::test]
    async fn test_create_truncates_and_append_extends() {
        let store = MemoryBackend::new();
        store
            .put_file(&p("/f"), b"0123456789", "alice", "staff", 0o644)
            .unwrap();

        let mut out = store.append(&p("/f")).await.unwrap();
        out.write_all(b"ab").await.unwrap();
        assert_eq!(read_all(&store, "/f").await, b"0123456789ab");

        let mut out = store.create(&p("/f")).await.unwrap();
        out.write_all(b"xy").await.unwrap();
        assert_eq!(read_all(&store, "/f").await, b"xy");
    }

    #[tokio::test]
    async fn test_append_missing_fails() {
        let store = MemoryBackend::new();
        let result = store.append(&p("/nope")).await;
        assert!(matches!(result, Err(StoreError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_ownership_stamping() {
        let admin = MemoryBackend::new();
        admin.put_dir(&p("/user"), "hdfs", "users", 0o755).unwrap();

        let alice = admin.as_user("alice");
        alice.mkdirs(&p("/user/alice/docs"), 0o700).await.unwrap();

        let home = admin.metadata(&p("/user/alice")).await.unwrap();
        assert_eq!(home.owner, "alice");
        assert_eq!(home.group, "users");
        assert_eq!(home.permissions.mode(), 0o755);

        let docs = admin.metadata(&p("/user/alice/docs")).await.unwrap();
        assert_eq!(docs.permissions.mode(), 0o700);
        assert_eq!(alice.principal().as_deref(), Some("alice"));
    }

    #[tokio::test]
    async fn test_mkdirs_is_idempotent() {
        let store = MemoryBackend::new();
        store.mkdirs(&p("/a/b"), 0o755).await.unwrap();
        store.mkdirs(&p("/a/b"), 0o755).await.unwrap();
        assert!(store.metadata(&p("/a/b")).await.unwrap().is_dir());

        store.put_file(&p("/a/f"), b"", "hdfs", "supergroup", 0o644).unwrap();
        let result = store.mkdirs(&p("/a/f/g"), 0o755).await;
        assert!(matches!(result, Err(StoreError::NotADirectory(_))));
    }

    #[tokio::test]
    async fn test_list_children() {
        let store = MemoryBackend::new();
        store.mkdirs(&p("/d/sub"), 0o755).await.unwrap();
        store.put_file(&p("/d/b.txt"), b"", "hdfs", "g", 0o644).unwrap();
        store.put_file(&p("/d/sub/deep.txt"), b"", "hdfs", "g", 0o644).unwrap();

        let children = store.list(&p("/d")).await.unwrap();
        let names: Vec<_> = children.iter().map(|c| c.name()).collect();
        assert_eq!(names, vec!["b.txt", "sub"]);

        assert!(matches!(
            store.list(&p("/d/b.txt")).await,
            Err(StoreError::NotADirectory(_))
        ));
    }

    #[tokio::test]
    async fn test_delete_recursive() {
        let store = MemoryBackend::new();
        store.put_file(&p("/d/x/y.txt"), b"y", "hdfs", "g", 0o644).unwrap();

        assert!(matches!(
            store.delete(&p("/d"), false).await,
            Err(StoreError::DirectoryNotEmpty(_))
        ));
        store.delete(&p("/d"), true).await.unwrap();
        assert!(!store.exists(&p("/d")).await.unwrap());
        assert!(!store.exists(&p("/d/x/y.txt")).await.unwrap());
        assert!(store.delete(&p("/"), true).await.is_err());
    }

    #[tokio::test]
    async fn test_rename_tree() {
        let store = MemoryBackend::new();
        store.put_file(&p("/a/inner/f.txt"), b"f", "hdfs", "g", 0o644).unwrap();
        store.mkdirs(&p("/b"), 0o755).await.unwrap();

        store.rename(&p("/a/inner"), &p("/b/moved")).await.unwrap();
        assert!(!store.exists(&p("/a/inner")).await.unwrap());
        assert_eq!(read_all(&store, "/b/moved/f.txt").await, b"f");

        // onto an existing directory: move inside it
        store.rename(&p("/b/moved"), &p("/a")).await.unwrap();
        assert!(store.exists(&p("/a/moved/f.txt")).await.unwrap());
    }

    #[tokio::test]
    async fn test_rename_errors() {
        let store = MemoryBackend::new();
        store.put_file(&p("/a.txt"), b"a", "hdfs", "g", 0o644).unwrap();
        store.put_file(&p("/b.txt"), b"b", "hdfs", "g", 0o644).unwrap();
        store.mkdirs(&p("/dir"), 0o755).await.unwrap();

        assert!(matches!(
            store.rename(&p("/a.txt"), &p("/b.txt")).await,
            Err(StoreError::AlreadyExists(_))
        ));
        assert!(matches!(
            store.rename(&p("/missing"), &p("/c")).await,
            Err(StoreError::NotFound(_))
        ));
        assert!(matches!(
            store.rename(&p("/a.txt"), &p("/nowhere/c")).await,
            Err(StoreError::NotFound(_))
        ));
        assert!(matches!(
            store.rename(&p("/dir"), &p("/dir/sub")).await,
            Err(StoreError::InvalidPath(_))
        ));
    }

    #[tokio::test]
    async fn test_writer_fails_after_delete() {
        let store = MemoryBackend::new();
        let mut out = store.create(&p("/gone")).await.unwrap();
        store.delete(&p("/gone"), false).await.unwrap();
        assert!(out.write_all(b"data").await.is_err());
    }
}
