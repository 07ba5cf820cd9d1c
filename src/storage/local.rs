//! Local filesystem backend.
//!
//! Maps S3-style keys under a base directory:
//! `landing/date=2026-01-03/input.jsonl` → `{base}/landing/date=2026-01-03/input.jsonl`.
//!
//! Directory walks and atomic writes run on the blocking pool; reads go
//! through `tokio::fs`.

use std::io::{Cursor, Write};
use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;

use super::{join_lines, LineReader, ObjectRef, StorageBackend, StorageError, TextLines};
use crate::config::StorageType;

pub struct LocalStorage {
    base_path: PathBuf,
}

impl LocalStorage {
    /// Open (and create if needed) the storage root.
    pub fn new(base_path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let base_path = base_path.as_ref();
        std::fs::create_dir_all(base_path)?;
        Ok(Self {
            base_path: base_path.canonicalize()?,
        })
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Resolve a key to a path inside the root. Keys that could escape it
    /// (absolute paths, `..`) are rejected.
    fn resolve(&self, key: &str) -> Result<PathBuf, StorageError> {
        let relative = Path::new(key);
        for component in relative.components() {
            match component {
                Component::Normal(_) | Component::CurDir => {}
                _ => return Err(StorageError::InvalidKey(key.to_string())),
            }
        }
        Ok(self.base_path.join(relative))
    }

    /// Write via a temp file in the target directory, then rename over the
    /// destination, so readers never observe a half-written object.
    async fn publish(&self, key: &str, body: Vec<u8>) -> Result<(), StorageError> {
        let path = self.resolve(key)?;
        let parent = path
            .parent()
            .ok_or_else(|| StorageError::InvalidKey(key.to_string()))?
            .to_path_buf();

        blocking(move || {
            std::fs::create_dir_all(&parent)?;
            let mut staged = tempfile::NamedTempFile::new_in(&parent)?;
            staged.write_all(&body)?;
            staged.as_file().sync_all()?;
            staged.persist(&path).map_err(|e| StorageError::Io(e.error))?;
            Ok(())
        })
        .await
    }
}

/// Run filesystem work on tokio's blocking pool.
async fn blocking<T, F>(work: F) -> Result<T, StorageError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, StorageError> + Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| StorageError::Io(std::io::Error::other(e)))?
}

fn key_for(base: &Path, path: &Path) -> Option<String> {
    let rel = path.strip_prefix(base).ok()?;
    let parts: Vec<String> = rel
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    Some(parts.join("/"))
}

fn collect_files(base: &Path, dir: &Path, out: &mut Vec<ObjectRef>) -> Result<(), StorageError> {
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        let file_type = entry.file_type()?;
        if file_type.is_dir() {
            collect_files(base, &path, out)?;
        } else if file_type.is_file() {
            if let Some(key) = key_for(base, &path) {
                out.push(ObjectRef {
                    key,
                    size: entry.metadata()?.len(),
                    last_modified: None,
                });
            }
        }
    }
    Ok(())
}

/// Every file at or below `path`, sorted by key.
fn list_blocking(base: &Path, path: &Path) -> Result<Vec<ObjectRef>, StorageError> {
    let mut objects = Vec::new();

    if path.is_file() {
        if let Some(key) = key_for(base, path) {
            objects.push(ObjectRef {
                key,
                size: path.metadata()?.len(),
                last_modified: None,
            });
        }
    } else if path.is_dir() {
        collect_files(base, path, &mut objects)?;
    }

    objects.sort_by(|a, b| a.key.cmp(&b.key));
    Ok(objects)
}

#[async_trait]
impl StorageBackend for LocalStorage {
    fn storage_type(&self) -> StorageType {
        StorageType::Local
    }

    async fn list(&self, prefix: &str) -> Result<Vec<ObjectRef>, StorageError> {
        let path = self.resolve(prefix)?;
        let base = self.base_path.clone();
        blocking(move || list_blocking(&base, &path)).await
    }

    async fn open_text(&self, key: &str) -> Result<TextLines, StorageError> {
        let path = self.resolve(key)?;
        let bytes = tokio::fs::read(&path).await.map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => StorageError::NotFound(key.to_string()),
            _ => StorageError::Io(e),
        })?;
        Ok(Box::new(LineReader::new(Cursor::new(bytes))))
    }

    async fn write_json(&self, key: &str, data: &serde_json::Value) -> Result<(), StorageError> {
        let body = serde_json::to_vec_pretty(data)?;
        self.publish(key, body).await
    }

    async fn write_text_lines(&self, key: &str, lines: &[String]) -> Result<(), StorageError> {
        self.publish(key, join_lines(lines).into_bytes()).await
    }

    async fn exists(&self, key: &str) -> Result<bool, StorageError> {
        Ok(tokio::fs::try_exists(self.resolve(key)?).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn storage() -> (tempfile::TempDir, LocalStorage) {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalStorage::new(dir.path()).unwrap();
        (dir, storage)
    }

    #[tokio::test]
    async fn list_returns_sorted_keys_recursively() {
        let (_dir, storage) = storage();
        storage
            .write_text_lines("landing/date=2026-01-03/b.jsonl", &["{}".into()])
            .await
            .unwrap();
        storage
            .write_text_lines("landing/date=2026-01-03/a.jsonl", &["{}".into()])
            .await
            .unwrap();
        storage
            .write_text_lines("landing/date=2026-01-03/shard=01/c.jsonl", &["{}".into()])
            .await
            .unwrap();
        storage
            .write_text_lines("landing/date=2026-01-04/other.jsonl", &["{}".into()])
            .await
            .unwrap();

        let keys: Vec<String> = storage
            .list("landing/date=2026-01-03/")
            .await
            .unwrap()
            .into_iter()
            .map(|o| o.key)
            .collect();
        assert_eq!(
            keys,
            vec![
                "landing/date=2026-01-03/a.jsonl",
                "landing/date=2026-01-03/b.jsonl",
                "landing/date=2026-01-03/shard=01/c.jsonl",
            ]
        );
    }

    #[tokio::test]
    async fn list_missing_prefix_is_empty() {
        let (_dir, storage) = storage();
        assert!(storage.list("landing/date=1999-01-01/").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn write_json_overwrites_and_reads_back() {
        let (_dir, storage) = storage();
        let key = "reports/date=2026-01-03/run_latest.json";
        storage.write_json(key, &serde_json::json!({"v": 1})).await.unwrap();
        storage.write_json(key, &serde_json::json!({"v": 2})).await.unwrap();

        assert!(storage.exists(key).await.unwrap());
        let body: String = storage
            .open_text(key)
            .await
            .unwrap()
            .map(|l| l.unwrap())
            .collect::<Vec<_>>()
            .join("\n");
        let parsed: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(parsed["v"], 2);

        // Only the published file remains; no staged temp files leak.
        let listed = storage.list("reports/").await.unwrap();
        assert_eq!(listed.len(), 1);
    }

    #[tokio::test]
    async fn open_missing_key_is_not_found() {
        let (_dir, storage) = storage();
        let err = storage.open_text("nope.jsonl").await.err().unwrap();
        assert!(matches!(err, StorageError::NotFound(_)));
        assert!(!storage.exists("nope.jsonl").await.unwrap());
    }

    #[tokio::test]
    async fn rejects_keys_escaping_root() {
        let (_dir, storage) = storage();
        let err = storage
            .write_json("../escape.json", &serde_json::json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::InvalidKey(_)));
        assert!(matches!(
            storage.exists("/etc/passwd").await,
            Err(StorageError::InvalidKey(_))
        ));
    }

    #[tokio::test(flavor = "current_thread")]
    async fn concurrent_writes_complete_on_single_threaded_runtime() {
        let (_dir, storage) = storage();
        let storage = std::sync::Arc::new(storage);

        let writes = (0..8).map(|i| {
            let storage = std::sync::Arc::clone(&storage);
            tokio::spawn(async move {
                let key = format!("sanitized/date=2026-01-03/part-{i}.jsonl");
                storage.write_text_lines(&key, &[format!("{{\"n\":{i}}}")]).await
            })
        });
        for write in writes.collect::<Vec<_>>() {
            write.await.unwrap().unwrap();
        }

        let listed = storage.list("sanitized/").await.unwrap();
        assert_eq!(listed.len(), 8);
        let lines: Vec<String> = storage
            .open_text(&listed[3].key)
            .await
            .unwrap()
            .map(|l| l.unwrap())
            .collect();
        assert_eq!(lines, vec![r#"{"n":3}"#.to_string()]);
    }

    #[test]
    fn reports_local_storage_type() {
        let (_dir, storage) = storage();
        assert_eq!(storage.storage_type(), StorageType::Local);
    }
}
