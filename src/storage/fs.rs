//! Filesystem blob store backed by tokio::fs
//!
//! Blobs live as flat files directly under the base directory. Nothing
//! here knows about the engine's file formats.

use async_trait::async_trait;
use std::io;
use std::path::{Path, PathBuf};

use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};

use super::{BlobStore, OwnedBytes};

/// Blob store over a flat local directory
#[derive(Debug, Clone)]
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    fn resolve(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    async fn ensure_root(&self) -> io::Result<()> {
        tokio::fs::create_dir_all(&self.root).await
    }
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn write(&self, name: &str, bytes: &[u8]) -> io::Result<()> {
        self.ensure_root().await?;
        tokio::fs::write(self.resolve(name), bytes).await
    }

    async fn append(&self, name: &str, bytes: &[u8]) -> io::Result<u64> {
        self.ensure_root().await?;
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.resolve(name))
            .await?;
        file.write_all(bytes).await?;
        file.flush().await?;
        Ok(file.metadata().await?.len())
    }

    async fn read(&self, name: &str) -> io::Result<Option<OwnedBytes>> {
        match tokio::fs::read(self.resolve(name)).await {
            Ok(data) => Ok(Some(OwnedBytes::new(data))),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn read_range(&self, name: &str, start: u64, end: u64) -> io::Result<Option<OwnedBytes>> {
        let mut file = match tokio::fs::File::open(self.resolve(name)).await {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e),
        };

        let len = file.metadata().await?.len();
        let start = start.min(len);
        let end = end.min(len).max(start);

        file.seek(io::SeekFrom::Start(start)).await?;
        let mut buffer = vec![0u8; (end - start) as usize];
        file.read_exact(&mut buffer).await?;
        Ok(Some(OwnedBytes::new(buffer)))
    }

    async fn size(&self, name: &str) -> io::Result<u64> {
        match tokio::fs::metadata(self.resolve(name)).await {
            Ok(meta) => Ok(meta.len()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(0),
            Err(e) => Err(e),
        }
    }

    async fn remove(&self, name: &str) -> io::Result<()> {
        match tokio::fs::remove_file(self.resolve(name)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }

    async fn list(&self) -> io::Result<Vec<String>> {
        let mut entries = match tokio::fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };

        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_file()
                && let Some(name) = entry.file_name().to_str()
            {
                names.push(name.to_string());
            }
        }
        Ok(names)
    }

    async fn clear_all(&self) -> io::Result<()> {
        for name in self.list().await? {
            self.remove(&name).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fs_store_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsBlobStore::new(dir.path());

        store.write("a.bin", b"hello").await.unwrap();
        assert_eq!(store.size("a.bin").await.unwrap(), 5);
        assert_eq!(
            store.read("a.bin").await.unwrap().unwrap().as_slice(),
            b"hello"
        );

        assert_eq!(store.append("a.bin", b" world").await.unwrap(), 11);
        let range = store.read_range("a.bin", 6, 11).await.unwrap().unwrap();
        assert_eq!(range.as_slice(), b"world");

        // Past-end reads clamp to the available prefix
        let tail = store.read_range("a.bin", 6, 100).await.unwrap().unwrap();
        assert_eq!(tail.as_slice(), b"world");
    }

    #[tokio::test]
    async fn test_fs_store_absent_blobs() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsBlobStore::new(dir.path().join("nested"));

        assert!(store.read("nope").await.unwrap().is_none());
        assert!(store.read_range("nope", 0, 4).await.unwrap().is_none());
        assert_eq!(store.size("nope").await.unwrap(), 0);
        store.remove("nope").await.unwrap();
        assert!(store.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_fs_store_clear_all() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsBlobStore::new(dir.path());

        store.write("a", b"1").await.unwrap();
        store.write("b", b"2").await.unwrap();
        assert_eq!(store.list().await.unwrap().len(), 2);

        store.clear_all().await.unwrap();
        assert!(store.list().await.unwrap().is_empty());
    }
}
