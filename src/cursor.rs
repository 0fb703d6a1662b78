//! Scan progress persistence
//!
//! The cursor maps a chain name to the last block fully processed on it. It is
//! only advanced after a run completes, and never moves backwards.
//!
//! A single relayer process per cursor file is assumed. Writes from the two
//! directions inside one process are serialized; separate processes sharing a
//! file are not coordinated.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::error::RelayError;

/// Last scanned block per chain
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScanCursor(BTreeMap<String, u64>);

impl ScanCursor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Last scanned block, `None` if the chain was never scanned
    pub fn get(&self, chain: &str) -> Option<u64> {
        self.0.get(chain).copied()
    }

    /// Move `chain` forward to `block`. Returns false (and leaves the entry
    /// alone) when that would move it backwards.
    pub fn advance(&mut self, chain: &str, block: u64) -> bool {
        match self.0.get(chain) {
            Some(current) if *current > block => false,
            _ => {
                self.0.insert(chain.to_string(), block);
                true
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<const N: usize> From<[(&str, u64); N]> for ScanCursor {
    fn from(entries: [(&str, u64); N]) -> Self {
        Self(
            entries
                .into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect(),
        )
    }
}

/// Durable home of the [`ScanCursor`]
#[async_trait]
pub trait CursorStore: Send + Sync {
    /// Current cursor; an absent store is an empty cursor
    async fn load(&self) -> Result<ScanCursor, RelayError>;

    /// Replace the stored cursor atomically
    async fn save(&self, cursor: &ScanCursor) -> Result<(), RelayError>;

    /// Read-modify-write of a single chain entry
    async fn advance(&self, chain: &str, block: u64) -> Result<ScanCursor, RelayError>;
}

// ============================================================================
// File store
// ============================================================================

/// Cursor stored as a flat JSON object, e.g. `{"destination":120,"source":98}`
pub struct FileCursorStore {
    path: PathBuf,
    write_lock: tokio::sync::Mutex<()>,
}

impl FileCursorStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "cursor".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    async fn read(&self) -> Result<ScanCursor, RelayError> {
        let raw = match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(ScanCursor::new());
            }
            Err(e) => {
                return Err(RelayError::Cursor(format!(
                    "failed to read {}: {}",
                    self.path.display(),
                    e
                )))
            }
        };

        if raw.trim().is_empty() {
            return Ok(ScanCursor::new());
        }

        serde_json::from_str(&raw).map_err(|e| {
            RelayError::Cursor(format!("malformed cursor file {}: {}", self.path.display(), e))
        })
    }

    /// Write to a sibling temp file, fsync, rename over the target, then
    /// fsync the directory so the rename itself survives a crash
    async fn write(&self, cursor: &ScanCursor) -> Result<(), RelayError> {
        let body = serde_json::to_vec(cursor)?;
        let temp = self.temp_path();

        let mut file = tokio::fs::File::create(&temp).await?;
        file.write_all(&body).await?;
        file.sync_all().await?;
        drop(file);

        tokio::fs::rename(&temp, &self.path).await?;
        self.sync_parent_dir().await?;
        debug!(path = %self.path.display(), "Cursor saved");
        Ok(())
    }

    fn parent_dir(&self) -> &Path {
        match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        }
    }

    #[cfg(unix)]
    async fn sync_parent_dir(&self) -> Result<(), RelayError> {
        let dir = tokio::fs::File::open(self.parent_dir()).await?;
        dir.sync_all().await?;
        Ok(())
    }

    // Directories cannot be opened as files here
    #[cfg(not(unix))]
    async fn sync_parent_dir(&self) -> Result<(), RelayError> {
        Ok(())
    }
}

#[async_trait]
impl CursorStore for FileCursorStore {
    async fn load(&self) -> Result<ScanCursor, RelayError> {
        self.read().await
    }

    async fn save(&self, cursor: &ScanCursor) -> Result<(), RelayError> {
        let _guard = self.write_lock.lock().await;
        self.write(cursor).await
    }

    async fn advance(&self, chain: &str, block: u64) -> Result<ScanCursor, RelayError> {
        let _guard = self.write_lock.lock().await;
        let mut cursor = self.read().await?;
        if cursor.advance(chain, block) {
            self.write(&cursor).await?;
        }
        Ok(cursor)
    }
}

// ============================================================================
// In-memory store
// ============================================================================

/// Cursor kept in memory; used for dry runs and tests
#[derive(Default)]
pub struct MemoryCursorStore {
    cursor: Mutex<ScanCursor>,
}

impl MemoryCursorStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seeded(cursor: ScanCursor) -> Self {
        Self {
            cursor: Mutex::new(cursor),
        }
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, ScanCursor>, RelayError> {
        self.cursor
            .lock()
            .map_err(|_| RelayError::Cursor("cursor mutex poisoned".to_string()))
    }
}

#[async_trait]
impl CursorStore for MemoryCursorStore {
    async fn load(&self) -> Result<ScanCursor, RelayError> {
        Ok(self.lock()?.clone())
    }

    async fn save(&self, cursor: &ScanCursor) -> Result<(), RelayError> {
        *self.lock()? = cursor.clone();
        Ok(())
    }

    async fn advance(&self, chain: &str, block: u64) -> Result<ScanCursor, RelayError> {
        let mut cursor = self.lock()?;
        cursor.advance(chain, block);
        Ok(cursor.clone())
    }
}
