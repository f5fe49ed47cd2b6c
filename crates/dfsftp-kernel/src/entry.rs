//! One node of a session's virtual tree.
//!
//! A [`VirtualEntry`] pairs a canonical path with the metadata snapshot
//! taken when it was looked up. Entries are cheap and short-lived: build a
//! fresh one per lookup. Mutating operations do not refresh the snapshot,
//! so re-resolve the path to observe their effect.
//!
//! Permission checks always fetch current metadata from the store. A
//! permission denial or store failure on a mutating operation is reported
//! as `false` and logged; stream opens report both as errors.

use std::io::SeekFrom;
use std::sync::Arc;
use std::time::SystemTime;
use tokio::io::AsyncSeekExt;

use crate::error::{Access, ViewError, ViewResult};
use crate::identity::Identity;
use crate::path::CanonicalPath;
use crate::permission;
use crate::store::{Metadata, Permissions, ReadStream, StoreClient, StoreError, WriteStream};

/// Mode for directories created through an entry.
pub const DIR_MODE: u32 = 0o755;

/// What an entry refers to at snapshot time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    /// Nothing is stored at the path.
    Absent,
    File,
    Directory,
}

/// A resolved path plus its metadata snapshot.
pub struct VirtualEntry {
    path: CanonicalPath,
    identity: Arc<Identity>,
    store: Arc<dyn StoreClient>,
    meta: Option<Metadata>,
}

impl std::fmt::Debug for VirtualEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VirtualEntry")
            .field("path", &self.path)
            .field("user", &self.identity.name())
            .field("meta", &self.meta)
            .finish_non_exhaustive()
    }
}

impl VirtualEntry {
    /// Look up `path` and snapshot its metadata.
    ///
    /// A missing object yields an [`EntryKind::Absent`] entry; other store
    /// failures are errors.
    pub async fn load(
        path: CanonicalPath,
        identity: Arc<Identity>,
        store: Arc<dyn StoreClient>,
    ) -> ViewResult<Self> {
        let meta = match store.metadata(&path).await {
            Ok(meta) => Some(meta),
            Err(e) if e.is_not_found() => None,
            Err(e) => return Err(e.into()),
        };
        Ok(Self {
            path,
            identity,
            store,
            meta,
        })
    }

    pub fn path(&self) -> &CanonicalPath {
        &self.path
    }

    /// Last path segment, `/` for the root.
    pub fn name(&self) -> &str {
        self.path.name()
    }

    /// True if a snapshot was obtained at lookup time.
    pub fn exists(&self) -> bool {
        self.meta.is_some()
    }

    pub fn kind(&self) -> EntryKind {
        match &self.meta {
            None => EntryKind::Absent,
            Some(meta) if meta.is_dir() => EntryKind::Directory,
            Some(_) => EntryKind::File,
        }
    }

    pub fn is_directory(&self) -> bool {
        self.kind() == EntryKind::Directory
    }

    pub fn is_file(&self) -> bool {
        self.kind() == EntryKind::File
    }

    pub fn is_hidden(&self) -> bool {
        false
    }

    pub fn metadata(&self) -> Option<&Metadata> {
        self.meta.as_ref()
    }

    pub fn size(&self) -> Option<u64> {
        self.meta.as_ref().map(|m| m.size)
    }

    pub fn modified(&self) -> Option<SystemTime> {
        self.meta.as_ref().map(|m| m.mtime)
    }

    pub fn permissions(&self) -> Option<Permissions> {
        self.meta.as_ref().map(|m| m.permissions)
    }

    pub fn link_count(&self) -> u32 {
        if self.is_directory() { 3 } else { 1 }
    }

    /// Owner from the snapshot, or fetched now if the entry had none.
    pub async fn owner(&self) -> Option<String> {
        if let Some(meta) = &self.meta {
            return Some(meta.owner.clone());
        }
        self.fetch().await.map(|m| m.owner)
    }

    /// Group from the snapshot, or fetched now if the entry had none.
    pub async fn group(&self) -> Option<String> {
        if let Some(meta) = &self.meta {
            return Some(meta.group.clone());
        }
        self.fetch().await.map(|m| m.group)
    }

    async fn fetch(&self) -> Option<Metadata> {
        match self.store.metadata(&self.path).await {
            Ok(meta) => Some(meta),
            Err(e) => {
                tracing::warn!(path = %self.path, error = %e, "metadata unavailable");
                None
            }
        }
    }

    /// Read permission against current metadata; false if it cannot be fetched.
    pub async fn is_readable(&self) -> bool {
        match self.store.metadata(&self.path).await {
            Ok(meta) => {
                let allowed = permission::can_read(&self.identity, &meta);
                tracing::debug!(path = %self.path, user = %self.identity.name(), allowed, "read permission");
                allowed
            }
            Err(e) => {
                tracing::warn!(path = %self.path, error = %e, "read permission: metadata unavailable");
                false
            }
        }
    }

    /// Write permission against current metadata.
    ///
    /// Where metadata cannot be fetched (typically the path does not exist
    /// yet) the nearest ancestor with metadata decides. False if not even
    /// the root resolves.
    pub async fn is_writable(&self) -> bool {
        let mut current = self.path.clone();
        loop {
            match self.store.metadata(&current).await {
                Ok(meta) => {
                    let allowed = permission::can_write(&self.identity, &meta);
                    tracing::debug!(
                        path = %self.path,
                        decided_by = %current,
                        user = %self.identity.name(),
                        allowed,
                        "write permission"
                    );
                    return allowed;
                }
                Err(e) => match current.parent() {
                    Some(parent) => {
                        tracing::trace!(path = %current, error = %e, "write permission: trying parent");
                        current = parent;
                    }
                    None => {
                        tracing::warn!(path = %self.path, error = %e, "write permission: root unavailable");
                        return false;
                    }
                },
            }
        }
    }

    pub async fn is_removable(&self) -> bool {
        self.is_writable().await
    }

    /// Create this directory and any missing parents.
    pub async fn make_directory(&self) -> bool {
        if !self.is_writable().await {
            tracing::debug!(path = %self.path, "mkdir: no write permission");
            return false;
        }
        match self.store.mkdirs(&self.path, DIR_MODE).await {
            Ok(()) => true,
            Err(e) => {
                tracing::error!(path = %self.path, error = %e, "mkdir failed");
                false
            }
        }
    }

    /// Delete this entry, recursively for directories.
    pub async fn delete(&self) -> bool {
        if !self.is_writable().await {
            tracing::debug!(path = %self.path, "delete: no write permission");
            return false;
        }
        match self.store.delete(&self.path, true).await {
            Ok(()) => true,
            Err(e) => {
                tracing::error!(path = %self.path, error = %e, "delete failed");
                false
            }
        }
    }

    /// Rename this entry to `target`'s path.
    ///
    /// Both the source and the target must be writable.
    pub async fn move_to(&self, target: &VirtualEntry) -> bool {
        if !self.is_writable().await {
            tracing::debug!(path = %self.path, "move: source not writable");
            return false;
        }
        if !target.is_writable().await {
            tracing::debug!(path = %target.path, "move: target not writable");
            return false;
        }
        match self.store.rename(&self.path, &target.path).await {
            Ok(()) => true,
            Err(e) => {
                tracing::error!(from = %self.path, to = %target.path, error = %e, "move failed");
                false
            }
        }
    }

    /// One entry per child, each with its own snapshot.
    ///
    /// Unreadable directories are a permission error. Store failures are
    /// logged and produce an empty listing.
    pub async fn list_children(&self) -> ViewResult<Vec<VirtualEntry>> {
        if !self.is_readable().await {
            tracing::debug!(path = %self.path, "list: no read permission");
            return Err(ViewError::permission_denied(&self.path, Access::Read));
        }

        let paths = match self.store.list(&self.path).await {
            Ok(paths) => paths,
            Err(e) => {
                tracing::debug!(path = %self.path, error = %e, "list failed");
                return Ok(Vec::new());
            }
        };

        let mut children = Vec::with_capacity(paths.len());
        for path in paths {
            match Self::load(path, Arc::clone(&self.identity), Arc::clone(&self.store)).await {
                // removed between listing and lookup
                Ok(child) if !child.exists() => {}
                Ok(child) => children.push(child),
                Err(e) => {
                    tracing::debug!(path = %self.path, error = %e, "list failed");
                    return Ok(Vec::new());
                }
            }
        }
        Ok(children)
    }

    /// Open for reading at `offset`.
    ///
    /// The stream is positioned at `offset` only when it lies inside the
    /// file; otherwise it starts at 0. Refreshes this entry's snapshot.
    pub async fn open_read(&mut self, offset: u64) -> ViewResult<ReadStream> {
        if !self.is_readable().await {
            return Err(ViewError::permission_denied(&self.path, Access::Read));
        }

        let opened = async {
            let mut stream = self.store.open(&self.path).await?;
            let meta = self.store.metadata(&self.path).await?;
            if offset < meta.size {
                stream
                    .seek(SeekFrom::Start(offset))
                    .await
                    .map_err(StoreError::from)?;
            }
            Ok::<_, ViewError>((stream, meta))
        }
        .await;

        match opened {
            Ok((stream, meta)) => {
                self.meta = Some(meta);
                Ok(stream)
            }
            Err(e) => {
                tracing::error!(path = %self.path, error = %e, "open for read failed");
                Err(e)
            }
        }
    }

    /// Open for writing at `offset`.
    ///
    /// Appends when the object exists and `offset > 0`; otherwise creates
    /// or truncates. An offset of 0 always truncates.
    pub async fn open_write(&self, offset: u64) -> ViewResult<WriteStream> {
        if !self.is_writable().await {
            return Err(ViewError::permission_denied(&self.path, Access::Write));
        }

        let opened = async {
            if offset > 0 && self.store.exists(&self.path).await? {
                self.store.append(&self.path).await
            } else {
                self.store.create(&self.path).await
            }
        }
        .await;

        opened.map_err(|e| {
            tracing::error!(path = %self.path, offset, error = %e, "open for write failed");
            ViewError::from(e)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryBackend, StoreResult};
    use async_trait::async_trait;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    fn p(s: &str) -> CanonicalPath {
        CanonicalPath::parse(s).unwrap()
    }

    fn alice() -> Arc<Identity> {
        Arc::new(Identity::new("alice", p("/user/alice")))
    }

    fn bob() -> Arc<Identity> {
        Arc::new(Identity::new("bob", p("/user/bob")))
    }

    /// Store with `/user/alice` (alice, 0755) holding `notes.txt` (0644).
    fn store() -> MemoryBackend {
        let store = MemoryBackend::new();
        store.put_dir(&p("/user"), "hdfs", "supergroup", 0o755).unwrap();
        store.put_dir(&p("/user/alice"), "alice", "staff", 0o755).unwrap();
        store
            .put_file(&p("/user/alice/notes.txt"), b"0123456789", "alice", "staff", 0o644)
            .unwrap();
        store
    }

    async fn entry(store: &MemoryBackend, path: &str, who: Arc<Identity>) -> VirtualEntry {
        VirtualEntry::load(p(path), who, Arc::new(store.clone())).await.unwrap()
    }

    #[tokio::test]
    async fn test_kind_and_snapshot() {
        let store = store();
        let file = entry(&store, "/user/alice/notes.txt", alice()).await;
        assert!(file.exists());
        assert_eq!(file.kind(), EntryKind::File);
        assert!(file.is_file() && !file.is_directory());
        assert_eq!(file.size(), Some(10));
        assert_eq!(file.name(), "notes.txt");
        assert_eq!(file.link_count(), 1);
        assert_eq!(file.permissions().map(|p| p.to_string()).as_deref(), Some("rw-r--r--"));

        let dir = entry(&store, "/user/alice", alice()).await;
        assert_eq!(dir.kind(), EntryKind::Directory);
        assert_eq!(dir.link_count(), 3);

        let root = entry(&store, "/", alice()).await;
        assert_eq!(root.name(), "/");
    }

    #[tokio::test]
    async fn test_absent_entry() {
        let store = store();
        let missing = entry(&store, "/user/alice/missing", alice()).await;
        assert!(!missing.exists());
        assert_eq!(missing.kind(), EntryKind::Absent);
        assert!(!missing.is_file() && !missing.is_directory());
        assert_eq!(missing.size(), None);
        assert_eq!(missing.owner().await, None);
        assert!(!missing.is_readable().await);
    }

    #[tokio::test]
    async fn test_owner_refetched_after_creation() {
        let store = store();
        let later = entry(&store, "/user/alice/later.txt", alice()).await;
        assert_eq!(later.owner().await, None);

        store
            .put_file(&p("/user/alice/later.txt"), b"x", "alice", "staff", 0o600)
            .unwrap();
        assert!(!later.exists());
        assert_eq!(later.owner().await.as_deref(), Some("alice"));
        assert_eq!(later.group().await.as_deref(), Some("staff"));
    }

    #[tokio::test]
    async fn test_permissions_per_identity() {
        let store = store();
        let as_alice = entry(&store, "/user/alice/notes.txt", alice()).await;
        let as_bob = entry(&store, "/user/alice/notes.txt", bob()).await;

        assert!(as_alice.is_writable().await);
        assert!(as_alice.is_removable().await);
        assert!(!as_bob.is_writable().await);
        assert!(as_bob.is_readable().await);
    }

    #[tokio::test]
    async fn test_group_member_writes_after_chown() {
        let store = store();
        store.put_dir(&p("/user/alice/team"), "alice", "alice", 0o770).unwrap();
        let carol = Arc::new(Identity::new("carol", p("/user/carol")).with_groups(["analytics"]));

        let report = entry(&store, "/user/alice/team/report.txt", Arc::clone(&carol)).await;
        assert!(!report.is_writable().await);

        store.chown(&p("/user/alice/team"), "alice", "analytics").unwrap();
        assert!(report.is_writable().await);
        assert!(entry(&store, "/user/alice/team", carol).await.list_children().await.is_ok());
    }

    #[tokio::test]
    async fn test_writable_falls_back_to_parent() {
        let store = store();
        let new_file = entry(&store, "/user/alice/a/b/new.txt", alice()).await;
        assert!(new_file.is_writable().await);

        let intruder = entry(&store, "/user/alice/a/b/new.txt", bob()).await;
        assert!(!intruder.is_writable().await);
    }

    #[tokio::test]
    async fn test_make_directory() {
        let store = store();
        let docs = entry(&store, "/user/alice/docs", alice()).await;
        assert!(docs.make_directory().await);
        assert!(!docs.exists(), "snapshot is not refreshed");
        assert!(entry(&store, "/user/alice/docs", alice()).await.is_directory());

        let denied = entry(&store, "/user/alice/bobs", bob()).await;
        assert!(!denied.make_directory().await);
        assert!(!entry(&store, "/user/alice/bobs", alice()).await.exists());
    }

    #[tokio::test]
    async fn test_delete() {
        let store = store();
        let by_bob = entry(&store, "/user/alice/notes.txt", bob()).await;
        assert!(!by_bob.delete().await);

        let by_alice = entry(&store, "/user/alice/notes.txt", alice()).await;
        assert!(by_alice.delete().await);
        assert!(!entry(&store, "/user/alice/notes.txt", alice()).await.exists());

        // store failure is reported as false
        assert!(!by_alice.delete().await);
    }

    #[tokio::test]
    async fn test_move_requires_both_writable() {
        let store = store();
        store.put_dir(&p("/user/bob"), "bob", "staff", 0o755).unwrap();

        let src = entry(&store, "/user/alice/notes.txt", alice()).await;
        let into_bob = entry(&store, "/user/bob/notes.txt", alice()).await;
        assert!(!src.move_to(&into_bob).await);

        let bobs_view = entry(&store, "/user/alice/notes.txt", bob()).await;
        let bob_target = entry(&store, "/user/bob/stolen.txt", bob()).await;
        assert!(!bobs_view.move_to(&bob_target).await);

        let target = entry(&store, "/user/alice/renamed.txt", alice()).await;
        assert!(src.move_to(&target).await);
        assert!(entry(&store, "/user/alice/renamed.txt", alice()).await.exists());
        assert!(!entry(&store, "/user/alice/notes.txt", alice()).await.exists());
    }

    #[tokio::test]
    async fn test_list_children() {
        let store = store();
        store.put_dir(&p("/user/alice/sub"), "alice", "staff", 0o755).unwrap();

        let home = entry(&store, "/user/alice", alice()).await;
        let children = home.list_children().await.unwrap();
        let names: Vec<_> = children.iter().map(|c| c.name()).collect();
        assert_eq!(names, vec!["notes.txt", "sub"]);
        assert!(children[1].is_directory());
    }

    #[tokio::test]
    async fn test_list_unreadable() {
        let store = store();
        store.chmod(&p("/user/alice"), 0o700).unwrap();

        let home = entry(&store, "/user/alice", bob()).await;
        let result = home.list_children().await;
        assert!(matches!(
            result,
            Err(ViewError::PermissionDenied { access: Access::Read, .. })
        ));
    }

    #[tokio::test]
    async fn test_list_of_file_is_empty() {
        let store = store();
        let file = entry(&store, "/user/alice/notes.txt", alice()).await;
        assert!(file.list_children().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_open_read_offsets() {
        let store = store();
        let mut file = entry(&store, "/user/alice/notes.txt", alice()).await;

        let mut buf = String::new();
        file.open_read(4).await.unwrap().read_to_string(&mut buf).await.unwrap();
        assert_eq!(buf, "456789");

        // past the end: stream starts at 0
        let mut buf = String::new();
        file.open_read(50).await.unwrap().read_to_string(&mut buf).await.unwrap();
        assert_eq!(buf, "0123456789");
    }

    #[tokio::test]
    async fn test_open_read_refreshes_snapshot() {
        let store = store();
        let mut file = entry(&store, "/user/alice/notes.txt", alice()).await;
        store
            .put_file(&p("/user/alice/notes.txt"), b"abc", "alice", "staff", 0o644)
            .unwrap();
        assert_eq!(file.size(), Some(10));
        file.open_read(0).await.unwrap();
        assert_eq!(file.size(), Some(3));
    }

    #[tokio::test]
    async fn test_open_read_denied() {
        let store = store();
        store.chmod(&p("/user/alice/notes.txt"), 0o600).unwrap();
        let mut file = entry(&store, "/user/alice/notes.txt", bob()).await;
        assert!(matches!(
            file.open_read(0).await,
            Err(ViewError::PermissionDenied { access: Access::Read, .. })
        ));
    }

    async fn write_at(file: &VirtualEntry, offset: u64, data: &[u8]) {
        let mut out = file.open_write(offset).await.unwrap();
        out.write_all(data).await.unwrap();
        out.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_open_write_truncates_at_zero_and_appends_otherwise() {
        let store = store();
        let path = p("/user/alice/data.bin");
        store.put_file(&path, &[7u8; 100], "alice", "staff", 0o644).unwrap();
        let file = entry(&store, "/user/alice/data.bin", alice()).await;

        write_at(&file, 50, b"tail").await;
        assert_eq!(store.metadata(&path).await.unwrap().size, 104);

        write_at(&file, 0, b"fresh").await;
        assert_eq!(store.metadata(&path).await.unwrap().size, 5);
    }

    #[tokio::test]
    async fn test_open_write_new_file_with_offset_creates() {
        let store = store();
        let file = entry(&store, "/user/alice/new.txt", alice()).await;
        write_at(&file, 10, b"hi").await;
        assert_eq!(store.metadata(&p("/user/alice/new.txt")).await.unwrap().size, 2);
    }

    #[tokio::test]
    async fn test_open_write_denied() {
        let store = store();
        let file = entry(&store, "/user/alice/new.txt", bob()).await;
        assert!(matches!(
            file.open_write(0).await,
            Err(ViewError::PermissionDenied { access: Access::Write, .. })
        ));
    }

    /// Refuses every metadata lookup.
    struct BrokenStore;

    #[async_trait]
    impl StoreClient for BrokenStore {
        async fn metadata(&self, path: &CanonicalPath) -> StoreResult<Metadata> {
            Err(StoreError::other(format!("unreachable: {path}")))
        }
        async fn list(&self, _: &CanonicalPath) -> StoreResult<Vec<CanonicalPath>> {
            Err(StoreError::other("unreachable"))
        }
        async fn open(&self, _: &CanonicalPath) -> StoreResult<ReadStream> {
            Err(StoreError::other("unreachable"))
        }
        async fn create(&self, _: &CanonicalPath) -> StoreResult<WriteStream> {
            Err(StoreError::other("unreachable"))
        }
        async fn append(&self, _: &CanonicalPath) -> StoreResult<WriteStream> {
            Err(StoreError::other("unreachable"))
        }
        async fn mkdirs(&self, _: &CanonicalPath, _: u32) -> StoreResult<()> {
            Err(StoreError::other("unreachable"))
        }
        async fn delete(&self, _: &CanonicalPath, _: bool) -> StoreResult<()> {
            Err(StoreError::other("unreachable"))
        }
        async fn rename(&self, _: &CanonicalPath, _: &CanonicalPath) -> StoreResult<()> {
            Err(StoreError::other("unreachable"))
        }
    }

    #[tokio::test]
    async fn test_unreachable_store() {
        let store: Arc<dyn StoreClient> = Arc::new(BrokenStore);
        assert!(matches!(
            VirtualEntry::load(p("/user/alice"), alice(), Arc::clone(&store)).await,
            Err(ViewError::Store(_))
        ));

        let entry = VirtualEntry {
            path: p("/user/alice/x"),
            identity: alice(),
            store,
            meta: None,
        };
        assert!(!entry.is_readable().await);
        assert!(!entry.is_writable().await);
        assert!(!entry.make_directory().await);
    }
}
