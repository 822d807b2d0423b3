use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use anyhow::{Context, Result};

use super::loader::load_file;
use super::model::RecordTable;

/// What a file looked like when it was last read.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Fingerprint {
    len: u64,
    modified: Option<SystemTime>,
}

impl Fingerprint {
    fn of(path: &Path) -> Result<Self> {
        let meta = std::fs::metadata(path)
            .with_context(|| format!("reading metadata of {}", path.display()))?;
        Ok(Fingerprint {
            len: meta.len(),
            modified: meta.modified().ok(),
        })
    }
}

/// Memoises [`load_file`] per path. A file is re-read only when its size or
/// modification time changes. Entries are never evicted.
#[derive(Debug, Default)]
pub struct SourceCache {
    entries: HashMap<PathBuf, (Fingerprint, Arc<RecordTable>)>,
    hits: usize,
}

impl SourceCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load(&mut self, path: &Path) -> Result<Arc<RecordTable>> {
        let fingerprint = Fingerprint::of(path)?;
        if let Some((seen, table)) = self.entries.get(path) {
            if *seen == fingerprint {
                self.hits += 1;
                log::debug!("source cache hit for {}", path.display());
                return Ok(Arc::clone(table));
            }
        }

        let table = Arc::new(load_file(path)?);
        self.entries
            .insert(path.to_path_buf(), (fingerprint, Arc::clone(&table)));
        Ok(table)
    }

    /// Number of loads answered from memory.
    pub fn hits(&self) -> usize {
        self.hits
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
