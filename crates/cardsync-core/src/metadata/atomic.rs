//! Atomic file writes for settings documents and derived artifacts.
//!
//! Writes go to a temp sibling with a PID+TID suffix, are synced, and are
//! renamed over the target so readers never observe a partial file.

use crate::{CardSyncError, Result};
use serde::{de::DeserializeOwned, Serialize};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process;
use std::thread;
use tracing::{debug, warn};

/// Read and parse a JSON file.
///
/// Returns `None` if the file doesn't exist, or an error if parsing fails.
pub fn atomic_read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    let contents = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => {
            return Err(CardSyncError::Io {
                message: format!("Failed to read {}", path.display()),
                path: Some(path.to_path_buf()),
                source: Some(e),
            })
        }
    };

    let data: T = serde_json::from_str(&contents).map_err(|e| CardSyncError::Json {
        message: format!("Failed to parse {}: {}", path.display(), e),
        source: Some(e),
    })?;

    Ok(Some(data))
}

/// Write data to a JSON file atomically, optionally keeping a `.bak` copy.
pub fn atomic_write_json<T: Serialize>(path: &Path, data: &T, keep_backup: bool) -> Result<()> {
    let serialized = serde_json::to_string_pretty(data).map_err(|e| CardSyncError::Json {
        message: format!("Failed to serialize data: {}", e),
        source: Some(e),
    })?;

    if keep_backup && path.exists() {
        let backup_path = path.with_extension("json.bak");
        if let Err(e) = fs::copy(path, &backup_path) {
            warn!("Failed to create backup {}: {}", backup_path.display(), e);
        } else {
            debug!("Created backup: {}", backup_path.display());
        }
    }

    atomic_write_bytes(path, serialized.as_bytes())
}

/// Write raw bytes to `path` atomically.
pub fn atomic_write_bytes(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.exists() {
            fs::create_dir_all(parent).map_err(|e| CardSyncError::Io {
                message: format!("Failed to create directory {}", parent.display()),
                path: Some(parent.to_path_buf()),
                source: Some(e),
            })?;
        }
    }

    let temp_path = temp_sibling(path);
    {
        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&temp_path)
            .map_err(|e| CardSyncError::io_with_path(e, &temp_path))?;

        file.write_all(bytes)
            .map_err(|e| CardSyncError::io_with_path(e, &temp_path))?;
        file.sync_all()
            .map_err(|e| CardSyncError::io_with_path(e, &temp_path))?;
    }

    if let Err(e) = fs::rename(&temp_path, path) {
        let _ = fs::remove_file(&temp_path);
        return Err(CardSyncError::Io {
            message: format!(
                "Failed to rename {} to {}",
                temp_path.display(),
                path.display()
            ),
            path: Some(path.to_path_buf()),
            source: Some(e),
        });
    }

    debug!("Atomically wrote {}", path.display());
    Ok(())
}

fn temp_sibling(path: &Path) -> PathBuf {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    path.with_file_name(format!(
        ".{}.{}.{}.tmp",
        file_name,
        process::id(),
        thread_id()
    ))
}

/// Get a unique thread identifier.
fn thread_id() -> u64 {
    use std::collections::hash_map::DefaultHasher;
    use std::hash::{Hash, Hasher};
    let mut hasher = DefaultHasher::new();
    format!("{:?}", thread::current().id()).hash(&mut hasher);
    hasher.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};
    use tempfile::TempDir;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct TestData {
        name: String,
        value: i32,
    }

    #[test]
    fn test_atomic_write_and_read() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("test.json");

        let data = TestData {
            name: "test".to_string(),
            value: 42,
        };

        atomic_write_json(&path, &data, false).unwrap();
        let read_data: Option<TestData> = atomic_read_json(&path).unwrap();
        assert_eq!(read_data, Some(data));
    }

    #[test]
    fn test_atomic_write_creates_backup() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("test.json");

        let first = TestData {
            name: "first".to_string(),
            value: 1,
        };
        let second = TestData {
            name: "second".to_string(),
            value: 2,
        };

        atomic_write_json(&path, &first, true).unwrap();
        atomic_write_json(&path, &second, true).unwrap();

        let backup: Option<TestData> =
            atomic_read_json(&path.with_extension("json.bak")).unwrap();
        assert_eq!(backup, Some(first));
        let current: Option<TestData> = atomic_read_json(&path).unwrap();
        assert_eq!(current, Some(second));
    }

    #[test]
    fn test_atomic_read_nonexistent() {
        let temp_dir = TempDir::new().unwrap();
        let result: Option<TestData> =
            atomic_read_json(&temp_dir.path().join("missing.json")).unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn test_atomic_write_bytes_leaves_no_temp_files() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested").join("thumb.jpg");

        atomic_write_bytes(&path, b"jpeg").unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"jpeg");

        let leftovers: Vec<_> = std::fs::read_dir(path.parent().unwrap())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }
}
