use std::collections::HashMap;

use log::*;

use super::structures::ZipFileEntry;

/// Name lookup over the central directory.
///
/// Built once, in directory order. When a name appears more than once the
/// last entry wins the lookup, matching common unzip tools; listings still
/// see every entry.
#[derive(Debug, Clone, Default)]
pub struct EntryIndex {
    by_name: HashMap<String, usize>,
}

impl EntryIndex {
    pub fn new(entries: &[ZipFileEntry]) -> Self {
        let mut by_name = HashMap::with_capacity(entries.len());
        for (position, entry) in entries.iter().enumerate() {
            if let Some(shadowed) = by_name.insert(entry.file_name.clone(), position) {
                debug!(
                    "Duplicate entry {}: #{} shadows #{}",
                    entry.file_name, position, shadowed
                );
            }
        }
        Self { by_name }
    }

    /// Position in the directory of the entry named `name`
    pub fn get(&self, name: &str) -> Option<usize> {
        self.by_name.get(name).copied()
    }

    /// Number of distinct names
    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }
}
