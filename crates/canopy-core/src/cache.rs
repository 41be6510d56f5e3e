//! Persisted engine state layout (§6) and the embedding retry log (§5/§7):
//! failed embedding jobs are appended here and retried on the next index pass.

use std::path::{Path, PathBuf};

use crate::model::ComponentId;

/// Engine state directory, relative to the project root.
pub const CACHE_DIR: &str = ".canopy";

/// Unified docs database file, per §6's persisted state layout.
pub const DOCS_DB: &str = "docs.db";

const RETRY_LOG: &str = "embedding_retry.log";

pub fn cache_dir(root: &Path) -> PathBuf {
    root.join(CACHE_DIR)
}

pub fn docs_db_path(root: &Path) -> PathBuf {
    cache_dir(root).join(DOCS_DB)
}

fn retry_log_path(root: &Path) -> PathBuf {
    cache_dir(root).join(RETRY_LOG)
}

pub fn ensure_cache_dir(root: &Path) -> std::io::Result<()> {
    let cache = cache_dir(root);
    if !cache.exists() {
        std::fs::create_dir_all(&cache)?;
    }
    Ok(())
}

/// Appends `(entity_id, entity_type)` to the retry log after an embedding
/// batch fails and is not retried inline.
pub fn record_embedding_failure(root: &Path, entity_id: ComponentId, entity_type: &str) -> std::io::Result<()> {
    use std::io::Write;
    ensure_cache_dir(root)?;
    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(retry_log_path(root))?;
    writeln!(file, "{entity_id}\t{entity_type}")?;
    Ok(())
}

/// Reads back `(entity_id, entity_type)` pairs queued for retry. Callers
/// should clear the log (via [`clear_retry_log`]) once the batch is reattempted.
pub fn read_retry_log(root: &Path) -> std::io::Result<Vec<(ComponentId, String)>> {
    let path = retry_log_path(root);
    if !path.exists() {
        return Ok(Vec::new());
    }
    let contents = std::fs::read_to_string(path)?;
    Ok(contents
        .lines()
        .filter_map(|line| {
            let (id, entity_type) = line.split_once('\t')?;
            let id = u128::from_str_radix(id, 16).ok()?;
            Some((ComponentId(id), entity_type.to_string()))
        })
        .collect())
}

pub fn clear_retry_log(root: &Path) -> std::io::Result<()> {
    let path = retry_log_path(root);
    if path.exists() {
        std::fs::remove_file(path)?;
    }
    Ok(())
}

/// Removes the entire `.canopy/` engine state directory.
pub fn clear_cache(root: &Path) -> std::io::Result<()> {
    let cache = cache_dir(root);
    if cache.exists() {
        std::fs::remove_dir_all(&cache)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_log_roundtrips_entries() {
        let dir = tempfile::tempdir().unwrap();
        record_embedding_failure(dir.path(), ComponentId(0xabc), "component").unwrap();
        record_embedding_failure(dir.path(), ComponentId(0xdef), "task").unwrap();
        let entries = read_retry_log(dir.path()).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].0, ComponentId(0xabc));
        assert_eq!(entries[1].1, "task");
    }

    #[test]
    fn clear_cache_removes_state_dir() {
        let dir = tempfile::tempdir().unwrap();
        ensure_cache_dir(dir.path()).unwrap();
        assert!(cache_dir(dir.path()).exists());
        clear_cache(dir.path()).unwrap();
        assert!(!cache_dir(dir.path()).exists());
    }
}
