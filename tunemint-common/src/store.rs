//! JSON file store
//!
//! Every table is either a single JSON [`Document`] read and rewritten as a
//! whole, or a [`Collection`] directory holding one JSON file per record.
//!
//! Read-modify-write cycles on the same file are serialized through a
//! per-path async mutex, and every write goes to a temporary file that is
//! renamed over the target, so readers never observe a half-written file.
//! Isolation is per file only: an operation that touches two files takes
//! the two locks one after the other, never both at once.

use crate::{Error, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, warn};

type LockMap = HashMap<PathBuf, Arc<AsyncMutex<()>>>;

/// Root of the on-disk JSON store
#[derive(Clone)]
pub struct JsonStore {
    root: PathBuf,
    locks: Arc<Mutex<LockMap>>,
}

impl JsonStore {
    /// Open (and create if missing) a store rooted at `root`
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        tokio::fs::create_dir_all(&root).await?;
        debug!(root = %root.display(), "JSON store opened");

        Ok(Self {
            root,
            locks: Arc::new(Mutex::new(HashMap::new())),
        })
    }

    /// Store root directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Handle to a whole-file table `<root>/<name>.json`
    pub fn document<T>(&self, name: &str) -> Document<T> {
        let path = self.root.join(format!("{}.json", name));
        Document {
            lock: self.lock_for(&path),
            path,
            _marker: PhantomData,
        }
    }

    /// Handle to a one-file-per-record table `<root>/<name>/`
    pub async fn collection<T>(&self, name: &str) -> Result<Collection<T>> {
        let dir = self.root.join(name);
        tokio::fs::create_dir_all(&dir).await?;
        Ok(Collection {
            dir,
            store: self.clone(),
            _marker: PhantomData,
        })
    }

    #[cfg(test)]
    fn lock_count(&self) -> usize {
        self.locks.lock().map(|locks| locks.len()).unwrap_or(0)
    }

    fn lock_for(&self, path: &Path) -> Arc<AsyncMutex<()>> {
        // The map itself is only held for the lookup; poisoning can only come
        // from a panic inside `entry`, in which case the map is still usable.
        let mut locks = match self.locks.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        // Entries nobody else holds are idle and can be recreated on demand
        locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        locks
            .entry(path.to_path_buf())
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone()
    }
}

/// A table stored as one JSON file
pub struct Document<T> {
    path: PathBuf,
    lock: Arc<AsyncMutex<()>>,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Clone for Document<T> {
    fn clone(&self) -> Self {
        Self {
            path: self.path.clone(),
            lock: self.lock.clone(),
            _marker: PhantomData,
        }
    }
}

impl<T> Document<T>
where
    T: Serialize + DeserializeOwned + Default,
{
    /// File backing this document
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the current contents (`T::default()` when the file does not exist)
    pub async fn load(&self) -> Result<T> {
        let _guard = self.lock.lock().await;
        read_json_or_default(&self.path).await
    }

    /// Read, mutate and rewrite the document under its lock
    ///
    /// If `f` returns an error the file is left untouched.
    pub async fn update<R, F>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&mut T) -> Result<R>,
    {
        let _guard = self.lock.lock().await;
        let mut value: T = read_json_or_default(&self.path).await?;
        let result = f(&mut value)?;
        write_json_atomic(&self.path, &value).await?;
        Ok(result)
    }
}

/// A table stored as a directory with one JSON file per record
pub struct Collection<T> {
    dir: PathBuf,
    store: JsonStore,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Clone for Collection<T> {
    fn clone(&self) -> Self {
        Self {
            dir: self.dir.clone(),
            store: self.store.clone(),
            _marker: PhantomData,
        }
    }
}

impl<T> Collection<T>
where
    T: Serialize + DeserializeOwned,
{
    /// Fetch one record
    pub async fn get(&self, key: &str) -> Result<Option<T>> {
        let path = self.record_path(key)?;
        let lock = self.store.lock_for(&path);
        let _guard = lock.lock().await;
        read_json_optional(&path).await
    }

    /// Create or replace one record
    pub async fn put(&self, key: &str, record: &T) -> Result<()> {
        let path = self.record_path(key)?;
        let lock = self.store.lock_for(&path);
        let _guard = lock.lock().await;
        write_json_atomic(&path, record).await
    }

    /// Mutate an existing record; `Error::NotFound` if it does not exist
    pub async fn update<R, F>(&self, key: &str, f: F) -> Result<R>
    where
        F: FnOnce(&mut T) -> Result<R>,
    {
        let path = self.record_path(key)?;
        let lock = self.store.lock_for(&path);
        let _guard = lock.lock().await;

        let mut record: T = read_json_optional(&path)
            .await?
            .ok_or_else(|| Error::NotFound(format!("Record {}", key)))?;
        let result = f(&mut record)?;
        write_json_atomic(&path, &record).await?;
        Ok(result)
    }

    /// Mutate a record, creating it with `init` first if it does not exist
    pub async fn upsert<R, I, F>(&self, key: &str, init: I, f: F) -> Result<R>
    where
        I: FnOnce() -> T,
        F: FnOnce(&mut T) -> Result<R>,
    {
        let path = self.record_path(key)?;
        let lock = self.store.lock_for(&path);
        let _guard = lock.lock().await;

        let mut record = match read_json_optional(&path).await? {
            Some(record) => record,
            None => init(),
        };
        let result = f(&mut record)?;
        write_json_atomic(&path, &record).await?;
        Ok(result)
    }

    /// Remove a record; returns whether it existed
    pub async fn delete(&self, key: &str) -> Result<bool> {
        let path = self.record_path(key)?;
        let lock = self.store.lock_for(&path);
        let _guard = lock.lock().await;

        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Load every record in the collection
    ///
    /// Files that fail to parse are skipped with a warning.
    pub async fn list(&self) -> Result<Vec<T>> {
        let mut records = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.dir).await?;

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            match read_json_optional::<T>(&path).await {
                Ok(Some(record)) => records.push(record),
                Ok(None) => {}
                Err(e) => warn!(path = %path.display(), "Skipping unreadable record: {}", e),
            }
        }

        Ok(records)
    }

    fn record_path(&self, key: &str) -> Result<PathBuf> {
        validate_key(key)?;
        Ok(self.dir.join(format!("{}.json", key)))
    }
}

/// Record keys become file names, so only a conservative alphabet is allowed
pub fn validate_key(key: &str) -> Result<()> {
    let valid = !key.is_empty()
        && key.len() <= 128
        && key != "."
        && !key.contains("..")
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.');

    if valid {
        Ok(())
    } else {
        Err(Error::InvalidInput(format!("Invalid record key: {:?}", key)))
    }
}

async fn read_json_optional<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    match tokio::fs::read(path).await {
        Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

async fn read_json_or_default<T: DeserializeOwned + Default>(path: &Path) -> Result<T> {
    Ok(read_json_optional(path).await?.unwrap_or_default())
}

async fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let bytes = serde_json::to_vec_pretty(value)?;

    let mut tmp_name = path.as_os_str().to_owned();
    tmp_name.push(".tmp");
    let tmp_path = PathBuf::from(tmp_name);

    tokio::fs::write(&tmp_path, &bytes).await?;
    tokio::fs::rename(&tmp_path, path).await?;
    Ok(())
}
