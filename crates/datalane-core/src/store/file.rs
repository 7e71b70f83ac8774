// ── File-backed store ──
//
// The whole table lives in one JSON document. It is loaded on first
// use and rewritten on every mutation through a sibling temp file plus
// rename, so a crash never leaves a half-written document behind.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::{KvStore, StoreError};

type Table = BTreeMap<String, Value>;

#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    table: Mutex<Option<Table>>,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            table: Mutex::new(None),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load(&self) -> Result<Table, StoreError> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) if bytes.iter().all(u8::is_ascii_whitespace) => Ok(Table::new()),
            Ok(bytes) => match serde_json::from_slice(&bytes) {
                Ok(table) => Ok(table),
                Err(e) => {
                    // An unreadable cache is worth less than a working one.
                    warn!(path = %self.path.display(), error = %e, "discarding corrupt store file");
                    Ok(Table::new())
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Table::new()),
            Err(e) => Err(e.into()),
        }
    }

    async fn persist(&self, table: &Table) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let bytes = serde_json::to_vec_pretty(table)?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, bytes).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        debug!(path = %self.path.display(), entries = table.len(), "store persisted");
        Ok(())
    }

    /// Run `f` against the loaded table; persist if it reports a change.
    async fn with_table<R>(
        &self,
        f: impl FnOnce(&mut Table) -> (R, bool),
    ) -> Result<R, StoreError> {
        let mut guard = self.table.lock().await;
        if guard.is_none() {
            *guard = Some(self.load().await?);
        }
        let Some(table) = guard.as_mut() else {
            return Err(StoreError::Unavailable("store table not loaded".into()));
        };
        let (result, dirty) = f(table);
        if dirty {
            self.persist(table).await?;
        }
        Ok(result)
    }
}

#[async_trait]
impl KvStore for FileStore {
    async fn get(&self, key: &str) -> Result<Option<Value>, StoreError> {
        self.with_table(|t| (t.get(key).cloned(), false)).await
    }

    async fn put(&self, key: &str, value: Value) -> Result<(), StoreError> {
        self.with_table(|t| {
            t.insert(key.to_owned(), value);
            ((), true)
        })
        .await
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.with_table(|t| ((), t.remove(key).is_some())).await
    }

    async fn clear(&self) -> Result<(), StoreError> {
        self.with_table(|t| {
            t.clear();
            ((), true)
        })
        .await
    }

    async fn keys(&self) -> Result<Vec<String>, StoreError> {
        self.with_table(|t| (t.keys().cloned().collect(), false)).await
    }
}
