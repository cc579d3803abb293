use std::collections::{BTreeMap, HashMap};
use std::ops::Bound;

use crate::{FileId, Result, StorageError};

pub const DEFAULT_MAX_TAGS_PER_FILE: usize = 5;

pub const SYSTEM_KEYWORDS: [&str; 5] = ["important", "draft", "source", "config", "data"];

#[derive(Debug)]
pub struct TagIndex {
    max_per_file: usize,
    file_tags: HashMap<FileId, Vec<String>>,
    keyword_files: BTreeMap<String, Vec<FileId>>,
}

impl Default for TagIndex {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_TAGS_PER_FILE)
    }
}

impl TagIndex {
    pub fn new(max_per_file: usize) -> Self {
        Self {
            max_per_file,
            file_tags: HashMap::new(),
            keyword_files: BTreeMap::new(),
        }
    }

    pub fn tag(&mut self, file_id: &str, keyword: &str) -> Result<()> {
        if keyword.is_empty() {
            return Err(StorageError::InvalidName(keyword.to_string()));
        }

        let tags = self.file_tags.entry(file_id.to_string()).or_default();
        if tags.iter().any(|t| t == keyword) {
            return Ok(());
        }
        if tags.len() >= self.max_per_file {
            return Err(StorageError::CapacityExceeded {
                target: file_id.to_string(),
                reason: format!("at most {} keywords per file", self.max_per_file),
            });
        }

        tags.push(keyword.to_string());
        self.keyword_files
            .entry(keyword.to_string())
            .or_default()
            .push(file_id.to_string());
        Ok(())
    }

    pub fn files_for(&self, keyword: &str) -> Vec<FileId> {
        self.keyword_files.get(keyword).cloned().unwrap_or_default()
    }

    pub fn tags_of(&self, file_id: &str) -> Vec<String> {
        self.file_tags.get(file_id).cloned().unwrap_or_default()
    }

    pub fn suggest(&self, prefix: &str) -> Vec<String> {
        self.keyword_files
            .range::<str, _>((Bound::Included(prefix), Bound::Unbounded))
            .map(|(keyword, _)| keyword)
            .take_while(|keyword| keyword.starts_with(prefix))
            .cloned()
            .collect()
    }

    pub fn remove_file(&mut self, file_id: &str) {
        let Some(tags) = self.file_tags.remove(file_id) else {
            return;
        };
        for keyword in tags {
            if let Some(files) = self.keyword_files.get_mut(&keyword) {
                files.retain(|f| f != file_id);
                if files.is_empty() {
                    self.keyword_files.remove(&keyword);
                }
            }
        }
    }

    pub fn system_keywords(&self) -> Vec<String> {
        SYSTEM_KEYWORDS.iter().map(|k| k.to_string()).collect()
    }

    pub fn keyword_count(&self) -> usize {
        self.keyword_files.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tags_are_indexed_both_ways() {
        let mut tags = TagIndex::default();
        tags.tag("a.txt", "draft").unwrap();
        tags.tag("b.txt", "draft").unwrap();
        tags.tag("a.txt", "important").unwrap();

        assert_eq!(tags.files_for("draft"), vec!["a.txt", "b.txt"]);
        assert_eq!(tags.tags_of("a.txt"), vec!["draft", "important"]);
        assert!(tags.files_for("missing").is_empty());
    }

    #[test]
    fn limit_per_file_is_enforced() {
        let mut tags = TagIndex::new(2);
        tags.tag("a", "one").unwrap();
        tags.tag("a", "two").unwrap();
        tags.tag("a", "two").unwrap();

        let err = tags.tag("a", "three").unwrap_err();
        assert!(matches!(err, StorageError::CapacityExceeded { ref target, .. } if target == "a"));
        assert_eq!(tags.tags_of("a").len(), 2);
    }

    #[test]
    fn suggest_uses_keyword_prefix() {
        let mut tags = TagIndex::default();
        for keyword in ["config", "code", "data", "cold"] {
            tags.tag("f", keyword).unwrap();
        }
        assert_eq!(tags.suggest("co"), vec!["code", "cold", "config"]);
        assert_eq!(tags.suggest("d"), vec!["data"]);
        assert!(tags.suggest("x").is_empty());
    }

    #[test]
    fn removing_file_drops_unused_keywords() {
        let mut tags = TagIndex::default();
        tags.tag("a", "shared").unwrap();
        tags.tag("b", "shared").unwrap();
        tags.tag("a", "solo").unwrap();

        tags.remove_file("a");
        assert_eq!(tags.files_for("shared"), vec!["b"]);
        assert!(tags.files_for("solo").is_empty());
        assert_eq!(tags.keyword_count(), 1);
        assert!(tags.tags_of("a").is_empty());
    }

    #[test]
    fn empty_keyword_is_rejected() {
        let mut tags = TagIndex::default();
        assert!(matches!(tags.tag("a", ""), Err(StorageError::InvalidName(_))));
    }
}
