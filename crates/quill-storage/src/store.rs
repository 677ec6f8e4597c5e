//! On-disk file, metadata and backup I/O.
//!
//! Each file `F` in the storage directory is three flat entries: `F`
//! (payload bytes), `F.meta` (the authoritative metadata/ACL descriptor)
//! and, when an undo point exists, `F.bak` (the pre-commit snapshot).

use std::path::{Path, PathBuf};

use quill_core::{Acl, FileMeta, epoch_now, validate_filename};
use tokio::fs;

use crate::{Result, StorageError};

const META_SUFFIX: &str = ".meta";
const BAK_SUFFIX: &str = ".bak";

/// The storage node's view of its directory.
#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    /// Opens (creating if needed) the storage directory.
    pub async fn open(root: &Path) -> Result<Self> {
        fs::create_dir_all(root).await?;
        Ok(FileStore {
            root: root.to_path_buf(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn payload_path(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    fn meta_path(&self, name: &str) -> PathBuf {
        self.root.join(format!("{name}{META_SUFFIX}"))
    }

    fn bak_path(&self, name: &str) -> PathBuf {
        self.root.join(format!("{name}{BAK_SUFFIX}"))
    }

    /// Lists payload files that carry a `.meta` sidecar, for the SS_INIT
    /// inventory announcement.
    pub async fn scan_inventory(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        let mut entries = fs::read_dir(&self.root).await?;
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            if name.ends_with(META_SUFFIX) || name.ends_with(BAK_SUFFIX) {
                continue;
            }
            if fs::try_exists(self.meta_path(name)).await? {
                names.push(name.to_string());
            }
        }
        names.sort();
        Ok(names)
    }

    /// Creates an empty file with fresh metadata owned by `owner`. The
    /// payload is unlinked again if the metadata write fails, so the two
    /// come into existence together.
    pub async fn create(&self, name: &str, owner: &str) -> Result<()> {
        validate_filename(name)?;
        let payload = self.payload_path(name);
        if fs::try_exists(&payload).await? {
            return Err(StorageError::FileExists(name.to_string()));
        }
        fs::write(&payload, b"").await?;
        let meta = FileMeta::new(owner, epoch_now());
        if let Err(e) = self.write_meta(name, &meta).await {
            let _ = fs::remove_file(&payload).await;
            return Err(e);
        }
        log::info!("created '{name}' for {owner}");
        Ok(())
    }

    /// Deletes the payload plus, best-effort, its `.meta` and `.bak`.
    /// Only the metadata owner may delete.
    pub async fn delete(&self, name: &str, requester: &str) -> Result<()> {
        validate_filename(name)?;
        if !fs::try_exists(self.payload_path(name)).await? {
            return Err(StorageError::NotFound(name.to_string()));
        }
        let meta = self.read_meta(name).await?;
        if meta.owner != requester {
            return Err(StorageError::OwnerRequired {
                file: name.to_string(),
            });
        }
        fs::remove_file(self.payload_path(name)).await?;
        let _ = fs::remove_file(self.meta_path(name)).await;
        let _ = fs::remove_file(self.bak_path(name)).await;
        log::info!("deleted '{name}' for {requester}");
        Ok(())
    }

    pub async fn read_meta(&self, name: &str) -> Result<FileMeta> {
        validate_filename(name)?;
        let text = fs::read_to_string(self.meta_path(name))
            .await
            .map_err(|e| self.map_not_found(e, name))?;
        Ok(FileMeta::parse(&text)?)
    }

    /// Rewrites the whole `.meta` descriptor in one pass.
    pub async fn write_meta(&self, name: &str, meta: &FileMeta) -> Result<()> {
        validate_filename(name)?;
        fs::write(self.meta_path(name), meta.to_text()).await?;
        Ok(())
    }

    pub async fn read_payload(&self, name: &str) -> Result<String> {
        validate_filename(name)?;
        fs::read_to_string(self.payload_path(name))
            .await
            .map_err(|e| self.map_not_found(e, name))
    }

    /// Commits a write session's buffer: the current payload becomes the
    /// `.bak` undo point, the buffer becomes the payload, and the `.meta`
    /// counters are refreshed. A failed payload write restores the
    /// original from the backup.
    pub async fn commit(&self, name: &str, content: &str, user: &str) -> Result<()> {
        validate_filename(name)?;
        let payload = self.payload_path(name);
        let bak = self.bak_path(name);
        fs::rename(&payload, &bak)
            .await
            .map_err(|e| self.map_not_found(e, name))?;
        if let Err(e) = fs::write(&payload, content).await {
            let _ = fs::rename(&bak, &payload).await;
            return Err(StorageError::Io(e));
        }
        let mut meta = self.read_meta(name).await?;
        meta.record_modification(content, user, epoch_now());
        self.write_meta(name, &meta).await?;
        log::info!("committed {} bytes to '{name}' for {user}", content.len());
        Ok(())
    }

    /// Restores the `.bak` snapshot over the payload, consuming it.
    pub async fn undo(&self, name: &str) -> Result<()> {
        validate_filename(name)?;
        let bak = self.bak_path(name);
        if !fs::try_exists(&bak).await? {
            return Err(StorageError::NotFound(format!("{name} (no undo point)")));
        }
        fs::rename(&bak, self.payload_path(name)).await?;
        log::info!("restored '{name}' from its undo point");
        Ok(())
    }

    /// Replaces the ACL in `.meta`, preserving every non-ACL field.
    pub async fn update_acl(&self, name: &str, serialized: &str) -> Result<()> {
        validate_filename(name)?;
        let mut meta = self.read_meta(name).await?;
        meta.acl = Acl::parse(serialized)?;
        self.write_meta(name, &meta).await?;
        log::info!("rewrote ACL of '{name}': {serialized}");
        Ok(())
    }

    /// Stamps a read access in `.meta`.
    pub async fn touch_access(&self, name: &str, user: &str) -> Result<()> {
        let mut meta = self.read_meta(name).await?;
        meta.record_access(user, epoch_now());
        self.write_meta(name, &meta).await
    }

    fn map_not_found(&self, e: std::io::Error, name: &str) -> StorageError {
        if e.kind() == std::io::ErrorKind::NotFound {
            StorageError::NotFound(name.to_string())
        } else {
            StorageError::Io(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quill_core::Permission;

    async fn fresh_store() -> (tempfile::TempDir, FileStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path()).await.unwrap();
        (dir, store)
    }

    #[test_log::test(tokio::test)]
    async fn create_writes_payload_and_meta_together() {
        let (_dir, store) = fresh_store().await;
        store.create("a.txt", "alice").await.unwrap();
        assert_eq!(store.read_payload("a.txt").await.unwrap(), "");
        let meta = store.read_meta("a.txt").await.unwrap();
        assert_eq!(meta.owner, "alice");
        assert_eq!(meta.acl.serialize(), "alice:RW");

        let err = store.create("a.txt", "alice").await.unwrap_err();
        assert!(matches!(err, StorageError::FileExists(_)));
    }

    #[test_log::test(tokio::test)]
    async fn delete_requires_owner() {
        let (dir, store) = fresh_store().await;
        store.create("b.txt", "alice").await.unwrap();
        let err = store.delete("b.txt", "bob").await.unwrap_err();
        assert!(matches!(err, StorageError::OwnerRequired { .. }));
        assert!(dir.path().join("b.txt").exists());

        store.delete("b.txt", "alice").await.unwrap();
        assert!(!dir.path().join("b.txt").exists());
        assert!(!dir.path().join("b.txt.meta").exists());
    }

    #[test_log::test(tokio::test)]
    async fn commit_leaves_backup_and_undo_restores_it() {
        let (dir, store) = fresh_store().await;
        store.create("d.txt", "alice").await.unwrap();
        store.commit("d.txt", "one. two. three.", "alice").await.unwrap();
        store.commit("d.txt", "ONE. two. three.", "alice").await.unwrap();

        assert_eq!(store.read_payload("d.txt").await.unwrap(), "ONE. two. three.");
        assert_eq!(
            std::fs::read_to_string(dir.path().join("d.txt.bak")).unwrap(),
            "one. two. three."
        );
        let meta = store.read_meta("d.txt").await.unwrap();
        assert_eq!(meta.size, 16);
        assert_eq!(meta.word_count, 3);

        store.undo("d.txt").await.unwrap();
        assert_eq!(store.read_payload("d.txt").await.unwrap(), "one. two. three.");
        assert!(!dir.path().join("d.txt.bak").exists());

        let err = store.undo("d.txt").await.unwrap_err();
        assert!(matches!(err, StorageError::NotFound(_)));
    }

    #[test_log::test(tokio::test)]
    async fn update_acl_preserves_other_fields() {
        let (_dir, store) = fresh_store().await;
        store.create("c.txt", "alice").await.unwrap();
        let before = store.read_meta("c.txt").await.unwrap();

        store.update_acl("c.txt", "alice:RW,bob:R").await.unwrap();
        let after = store.read_meta("c.txt").await.unwrap();
        assert_eq!(after.owner, before.owner);
        assert_eq!(after.created, before.created);
        assert!(after.acl.allows("bob", Permission::READ));
        assert!(!after.acl.allows("bob", Permission::WRITE));
    }

    #[test_log::test(tokio::test)]
    async fn inventory_lists_only_real_files() {
        let (dir, store) = fresh_store().await;
        store.create("x.txt", "alice").await.unwrap();
        store.create("y.txt", "alice").await.unwrap();
        // stray payload without a sidecar is ignored
        std::fs::write(dir.path().join("stray"), b"junk").unwrap();
        assert_eq!(
            store.scan_inventory().await.unwrap(),
            vec!["x.txt".to_string(), "y.txt".to_string()]
        );
    }

    #[test_log::test(tokio::test)]
    async fn filenames_are_policed() {
        let (_dir, store) = fresh_store().await;
        let err = store.create("../escape", "alice").await.unwrap_err();
        assert!(matches!(err, StorageError::Filename(_)));
    }
}
