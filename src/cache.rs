use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

use crate::error::{BillingError, Result};
use crate::importer::compute_checksum;
use crate::loader::load_sheet;
use crate::models::SheetData;

#[derive(Debug, Clone)]
pub struct CachedSheet {
    pub sheet: SheetData,
    pub modified: Option<SystemTime>,
    pub checksum: String,
    pub loaded_at: DateTime<Local>,
}

/// JSON form of a cached sheet written by [`SheetCache::save_snapshots`].
#[derive(Debug, Serialize, Deserialize)]
pub struct Snapshot {
    pub path: String,
    pub checksum: String,
    pub loaded_at: String,
    pub sheet: SheetData,
}

/// Loaded sheets keyed by file and sheet hint. An entry is reused until the
/// file's modification time changes. Owned by the caller and passed in
/// explicitly; there is no process-wide instance.
#[derive(Debug, Default)]
pub struct SheetCache {
    entries: HashMap<(PathBuf, String), CachedSheet>,
    loads: usize,
}

fn file_modified(path: &Path) -> Option<SystemTime> {
    std::fs::metadata(path).and_then(|m| m.modified()).ok()
}

impl SheetCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of times a file has been read from disk.
    pub fn loads(&self) -> usize {
        self.loads
    }

    pub fn is_fresh(&self, path: &Path, sheet: &str) -> bool {
        let key = (path.to_path_buf(), sheet.to_string());
        match (self.entries.get(&key), file_modified(path)) {
            (Some(entry), Some(modified)) => entry.modified == Some(modified),
            _ => false,
        }
    }

    pub fn entry(&self, path: &Path, sheet: &str) -> Option<&CachedSheet> {
        self.entries.get(&(path.to_path_buf(), sheet.to_string()))
    }

    pub fn get(&mut self, path: &Path, sheet: &str) -> Result<&SheetData> {
        if !self.is_fresh(path, sheet) {
            return self.refresh(path, sheet);
        }
        let key = (path.to_path_buf(), sheet.to_string());
        self.entries
            .get(&key)
            .map(|e| &e.sheet)
            .ok_or_else(|| BillingError::Other(format!("cache entry vanished: {}", path.display())))
    }

    /// Re-read a sheet from disk. A failed read evicts the entry.
    pub fn refresh(&mut self, path: &Path, sheet: &str) -> Result<&SheetData> {
        let key = (path.to_path_buf(), sheet.to_string());
        self.loads += 1;
        let loaded = load_sheet(path, sheet).and_then(|data| {
            let checksum = compute_checksum(path)?;
            Ok(CachedSheet {
                sheet: data,
                modified: file_modified(path),
                checksum,
                loaded_at: Local::now(),
            })
        });
        match loaded {
            Ok(entry) => {
                tracing::debug!(path = %path.display(), sheet, rows = entry.sheet.rows.len(), "loaded sheet");
                let slot = match self.entries.entry(key) {
                    Entry::Occupied(mut o) => {
                        o.insert(entry);
                        o.into_mut()
                    }
                    Entry::Vacant(v) => v.insert(entry),
                };
                Ok(&slot.sheet)
            }
            Err(e) => {
                self.entries.remove(&key);
                Err(e)
            }
        }
    }

    /// Write one JSON snapshot per cached sheet into `dir`.
    pub fn save_snapshots(&self, dir: &Path) -> Result<Vec<PathBuf>> {
        std::fs::create_dir_all(dir)?;
        let mut keys: Vec<&(PathBuf, String)> = self.entries.keys().collect();
        keys.sort();
        let mut written = Vec::new();
        for key in keys {
            let entry = &self.entries[key];
            let stem = key
                .0
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or("sheet");
            let name = if key.1.is_empty() {
                format!("{stem}.json")
            } else {
                format!("{stem}__{}.json", key.1.replace(|c: char| !c.is_ascii_alphanumeric(), "_"))
            };
            let snapshot = Snapshot {
                path: key.0.display().to_string(),
                checksum: entry.checksum.clone(),
                loaded_at: entry.loaded_at.to_rfc3339(),
                sheet: entry.sheet.clone(),
            };
            let path = dir.join(name);
            std::fs::write(&path, format!("{}\n", serde_json::to_string_pretty(&snapshot)?))?;
            written.push(path);
        }
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn write_csv(path: &Path, body: &str) {
        std::fs::write(path, format!("Equip #,Job,Amount\n{body}")).unwrap();
    }

    fn bump_mtime(path: &Path) {
        let later = SystemTime::now() + Duration::from_secs(60);
        std::fs::File::options()
            .write(true)
            .open(path)
            .unwrap()
            .set_modified(later)
            .unwrap();
    }

    #[test]
    fn test_get_reuses_unchanged_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pm.csv");
        write_csv(&path, "1,2023-045,10\n");
        let mut cache = SheetCache::new();
        assert_eq!(cache.get(&path, "").unwrap().rows.len(), 1);
        assert_eq!(cache.get(&path, "").unwrap().rows.len(), 1);
        assert_eq!(cache.loads(), 1);
        assert!(cache.is_fresh(&path, ""));
    }

    #[test]
    fn test_get_reloads_after_modification() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pm.csv");
        write_csv(&path, "1,2023-045,10\n");
        let mut cache = SheetCache::new();
        cache.get(&path, "").unwrap();
        write_csv(&path, "1,2023-045,10\n2,H22-1,5\n");
        bump_mtime(&path);
        assert!(!cache.is_fresh(&path, ""));
        assert_eq!(cache.get(&path, "").unwrap().rows.len(), 2);
        assert_eq!(cache.loads(), 2);
    }

    #[test]
    fn test_failed_refresh_evicts() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pm.csv");
        write_csv(&path, "1,2023-045,10\n");
        let mut cache = SheetCache::new();
        cache.get(&path, "").unwrap();
        std::fs::remove_file(&path).unwrap();
        assert!(cache.refresh(&path, "").is_err());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_save_snapshots() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pm.csv");
        write_csv(&path, "1,2023-045,10\n");
        let mut cache = SheetCache::new();
        cache.get(&path, "").unwrap();
        let written = cache.save_snapshots(&dir.path().join("snapshots")).unwrap();
        assert_eq!(written.len(), 1);
        let content = std::fs::read_to_string(&written[0]).unwrap();
        let snap: Snapshot = serde_json::from_str(&content).unwrap();
        assert_eq!(snap.sheet.rows.len(), 1);
        assert_eq!(snap.checksum.len(), 64);
    }
}
