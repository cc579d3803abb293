use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{BlockAddress, FileId};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileMetadata {
    pub size: u64,
    pub owner: String,
    pub permissions: u32,
    pub address: BlockAddress,
    pub checksum: String,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
}

impl FileMetadata {
    pub fn new(content: &[u8], address: BlockAddress, owner: &str, permissions: u32) -> Self {
        let now = Utc::now();
        Self {
            size: content.len() as u64,
            owner: owner.to_string(),
            permissions,
            address,
            checksum: Self::checksum_of(content),
            created_at: now,
            modified_at: now,
        }
    }

    pub fn checksum_of(content: &[u8]) -> String {
        blake3::hash(content).to_hex().to_string()
    }

    pub fn verify(&self, content: &[u8]) -> bool {
        content.len() as u64 == self.size && Self::checksum_of(content) == self.checksum
    }
}

#[derive(Debug, Default)]
pub struct MetadataStore {
    files: HashMap<FileId, FileMetadata>,
}

impl MetadataStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn upsert(&mut self, file_id: &str, mut metadata: FileMetadata) {
        if let Some(existing) = self.files.get(file_id) {
            metadata.created_at = existing.created_at;
        }
        self.files.insert(file_id.to_string(), metadata);
    }

    pub fn get(&self, file_id: &str) -> Option<&FileMetadata> {
        self.files.get(file_id)
    }

    pub fn remove(&mut self, file_id: &str) -> Option<FileMetadata> {
        self.files.remove(file_id)
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn total_size(&self) -> u64 {
        self.files.values().map(|m| m.size).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upsert_keeps_creation_time() {
        let mut store = MetadataStore::new();
        let mut first = FileMetadata::new(b"one", 0, "cmfs", 0o644);
        first.created_at = DateTime::<Utc>::MIN_UTC;
        store.upsert("a", first);

        store.upsert("a", FileMetadata::new(b"three", 0, "cmfs", 0o644));
        let stored = store.get("a").unwrap();
        assert_eq!(stored.created_at, DateTime::<Utc>::MIN_UTC);
        assert_eq!(stored.size, 5);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn verify_detects_changed_content() {
        let meta = FileMetadata::new(b"hello", 3, "cmfs", 0o644);
        assert!(meta.verify(b"hello"));
        assert!(!meta.verify(b"hellp"));
        assert!(!meta.verify(b"hello\0"));
    }

    #[test]
    fn total_size_sums_files() {
        let mut store = MetadataStore::new();
        store.upsert("a", FileMetadata::new(b"12", 0, "cmfs", 0o644));
        store.upsert("b", FileMetadata::new(b"345", 1, "cmfs", 0o644));
        assert_eq!(store.total_size(), 5);
        assert!(store.remove("a").is_some());
        assert_eq!(store.total_size(), 3);
    }
}
