//! In-memory ledger contents

use std::collections::BTreeMap;

/// Why an output is scheduled for deletion: the source that produced it and
/// the artifact name the compiler reported for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeletionEntry {
    /// URL of the source file that produced the output
    pub source_url: String,
    /// Artifact name (for example a fully qualified class name), if any
    pub artifact_name: Option<String>,
}

impl DeletionEntry {
    /// Create a new entry
    pub fn new(source_url: impl Into<String>, artifact_name: Option<impl Into<String>>) -> Self {
        Self {
            source_url: source_url.into(),
            artifact_name: artifact_name.map(Into::into),
        }
    }
}

/// Map of output path to deletion entry, with a dirty flag
///
/// Output paths are stored with forward slashes only.
#[derive(Debug, Default, Clone)]
pub struct Ledger {
    entries: BTreeMap<String, DeletionEntry>,
    dirty: bool,
}

impl Ledger {
    /// Create a clean ledger from loaded entries
    pub fn from_entries(entries: BTreeMap<String, DeletionEntry>) -> Self {
        Self {
            entries,
            dirty: false,
        }
    }

    /// Insert or replace an entry; `None` removes the path instead
    pub fn put(&mut self, output_path: &str, entry: Option<DeletionEntry>) -> Option<DeletionEntry> {
        match entry {
            Some(entry) => {
                self.dirty = true;
                self.entries.insert(normalize_path(output_path), entry)
            }
            None => self.remove(output_path),
        }
    }

    /// Remove an entry, marking the ledger dirty only if something was removed
    pub fn remove(&mut self, output_path: &str) -> Option<DeletionEntry> {
        let removed = self.entries.remove(&normalize_path(output_path));
        if removed.is_some() {
            self.dirty = true;
        }
        removed
    }

    /// Look up an entry
    pub fn get(&self, output_path: &str) -> Option<&DeletionEntry> {
        self.entries.get(&normalize_path(output_path))
    }

    /// All entries, ordered by output path
    pub fn entries(&self) -> &BTreeMap<String, DeletionEntry> {
        &self.entries
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if there are no entries
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// True if the ledger changed since it was loaded or last flushed
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub(crate) fn mark_clean(&mut self) {
        self.dirty = false;
    }
}

/// Normalize separators so the same output is keyed identically on every platform
pub fn normalize_path(path: &str) -> String {
    path.replace('\\', "/")
}
