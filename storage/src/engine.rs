use std::path::PathBuf;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::block::{BlockAddress, BlockStore, ReclaimPolicy, BLOCK_SIZE};
use crate::cache::BlockCache;
use crate::graph::{AccessGraph, Prediction, DEFAULT_PREDICTION_LIMIT};
use crate::index::{OrderedIndex, DEFAULT_ORDER};
use crate::metadata::{FileMetadata, MetadataStore};
use crate::tags::{TagIndex, DEFAULT_MAX_TAGS_PER_FILE};
use crate::trie::FilenameTrie;
use crate::{FileId, Result, StorageError};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    pub disk_path: PathBuf,
    pub total_blocks: u64,
    pub cache_capacity: usize,
    pub prediction_limit: usize,
    pub index_order: usize,
    pub max_tags_per_file: usize,
    pub reclaim_policy: ReclaimPolicy,
    pub owner: String,
    pub permissions: u32,
}

impl EngineConfig {
    pub fn new(disk_path: impl Into<PathBuf>, total_blocks: u64, cache_capacity: usize) -> Self {
        Self {
            disk_path: disk_path.into(),
            total_blocks,
            cache_capacity,
            prediction_limit: DEFAULT_PREDICTION_LIMIT,
            index_order: DEFAULT_ORDER,
            max_tags_per_file: DEFAULT_MAX_TAGS_PER_FILE,
            reclaim_policy: ReclaimPolicy::default(),
            owner: "cmfs".to_string(),
            permissions: 0o644,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ReadSource {
    Cache,
    Disk,
}

#[derive(Debug, Clone, Serialize)]
pub struct WriteReceipt {
    pub file: FileId,
    pub address: BlockAddress,
    pub size: u64,
}

#[derive(Debug, Clone)]
pub struct ReadOutcome {
    pub file: FileId,
    pub content: Bytes,
    pub source: ReadSource,
    pub predictions: Vec<Prediction>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DeleteReceipt {
    pub file: FileId,
    pub address: BlockAddress,
    pub reclaimed: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct FileEntry {
    pub name: FileId,
    pub address: BlockAddress,
    pub size: u64,
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineStats {
    pub files: usize,
    pub total_blocks: u64,
    pub allocated_blocks: u64,
    pub leaked_blocks: u64,
    pub used_bytes: u64,
    pub cache_lines: usize,
    pub cache_capacity: usize,
    pub index_height: usize,
    pub graph_edges: usize,
    pub keywords: usize,
}

/// Block device, name indexes, cache and access graph behind one set of file operations.
pub struct StorageEngine {
    config: EngineConfig,
    disk: BlockStore,
    index: OrderedIndex,
    trie: FilenameTrie,
    cache: BlockCache,
    graph: AccessGraph,
    metadata: MetadataStore,
    tags: TagIndex,
}

impl StorageEngine {
    pub fn open(config: EngineConfig) -> Result<Self> {
        let disk = BlockStore::open(&config.disk_path, config.total_blocks, config.reclaim_policy)?;

        tracing::info!(
            "Storage engine opened {:?}: {} blocks, cache of {} lines",
            config.disk_path,
            config.total_blocks,
            config.cache_capacity
        );

        Ok(Self {
            index: OrderedIndex::with_order(config.index_order),
            trie: FilenameTrie::new(),
            cache: BlockCache::new(config.cache_capacity),
            graph: AccessGraph::new(),
            metadata: MetadataStore::new(),
            tags: TagIndex::new(config.max_tags_per_file),
            disk,
            config,
        })
    }

    /// Stores `content` under `name`, replacing any previous content.
    pub fn write(&mut self, name: &str, content: Bytes) -> Result<WriteReceipt> {
        Self::check_name(name)?;
        if content.len() > BLOCK_SIZE {
            return Err(StorageError::OversizedWrite {
                name: name.to_string(),
                len: content.len(),
                block_size: BLOCK_SIZE,
            });
        }

        let existing = self.index.get(name);
        let address = match existing {
            Some(address) => address,
            None => self.disk.allocate().map_err(|e| match e {
                StorageError::CapacityExceeded { reason, .. } => StorageError::CapacityExceeded {
                    target: name.to_string(),
                    reason,
                },
                other => other,
            })?,
        };
        // Durable before any index changes.
        self.disk.write(address, &content)?;

        self.index.insert(name, address);
        self.trie.insert(name, name);
        self.metadata.upsert(
            name,
            FileMetadata::new(&content, address, &self.config.owner, self.config.permissions),
        );

        // A line holding the old content must not survive an overwrite.
        self.cache.remove(name);
        let size = content.len() as u64;
        if let Some(evicted) = self.cache.put(name, content) {
            tracing::debug!("Caching {} evicted {}", name, evicted);
        }

        tracing::info!("Wrote {} ({} bytes) to block {}", name, size, address);
        Ok(WriteReceipt {
            file: name.to_string(),
            address,
            size,
        })
    }

    /// Returns the content of `name` along with prefetch candidates.
    pub fn read(&mut self, name: &str) -> Result<ReadOutcome> {
        if self.trie.search(name).is_none() {
            return Err(StorageError::NotFound(name.to_string()));
        }
        let address = self
            .index
            .get(name)
            .ok_or_else(|| StorageError::NotFound(name.to_string()))?;

        let (content, source) = match self.cache.get(name) {
            Some(content) => (content, ReadSource::Cache),
            None => {
                let content = self.load(name, address)?;
                self.cache.put(name, content.clone());
                (content, ReadSource::Disk)
            }
        };

        let predictions = self.graph.predict(name, self.config.prediction_limit);
        tracing::debug!(
            "Read {} from {:?} with {} predictions",
            name,
            source,
            predictions.len()
        );

        Ok(ReadOutcome {
            file: name.to_string(),
            content,
            source,
            predictions,
        })
    }

    pub fn delete(&mut self, name: &str) -> Result<DeleteReceipt> {
        let address = self
            .index
            .remove(name)
            .ok_or_else(|| StorageError::NotFound(name.to_string()))?;

        self.trie.remove(name);
        self.cache.remove(name);
        self.metadata.remove(name);
        self.tags.remove_file(name);
        self.graph.forget(name);
        self.disk.release(address)?;

        tracing::info!("Deleted {} (block {})", name, address);
        Ok(DeleteReceipt {
            file: name.to_string(),
            address,
            reclaimed: self.disk.policy() == ReclaimPolicy::FreeList,
        })
    }

    pub fn record_access_pair(&mut self, source: &str, target: &str) {
        self.graph.record(source, target);
    }

    pub fn decay(&mut self) -> usize {
        self.graph.decay()
    }

    pub fn list(&self, prefix: &str) -> Vec<FileEntry> {
        self.index
            .range(prefix)
            .into_iter()
            .map(|entry| FileEntry {
                size: self.metadata.get(&entry.file_id).map_or(0, |m| m.size),
                tags: self.tags.tags_of(&entry.file_id),
                name: entry.file_id,
                address: entry.address,
            })
            .collect()
    }

    pub fn complete(&self, prefix: &str) -> Vec<FileId> {
        self.trie.prefix(prefix)
    }

    pub fn metadata(&self, name: &str) -> Option<&FileMetadata> {
        self.metadata.get(name)
    }

    pub fn tag(&mut self, name: &str, keyword: &str) -> Result<()> {
        if !self.index.contains(name) {
            return Err(StorageError::NotFound(name.to_string()));
        }
        self.tags.tag(name, keyword)
    }

    pub fn search_keyword(&self, keyword: &str) -> Vec<FileId> {
        self.tags.files_for(keyword)
    }

    pub fn suggest_keywords(&self, prefix: &str) -> Vec<String> {
        self.tags.suggest(prefix)
    }

    pub fn system_keywords(&self) -> Vec<String> {
        self.tags.system_keywords()
    }

    pub fn stats(&self) -> EngineStats {
        EngineStats {
            files: self.index.len(),
            total_blocks: self.disk.total_blocks(),
            allocated_blocks: self.disk.allocated(),
            leaked_blocks: self.disk.leaked(),
            used_bytes: self.metadata.total_size(),
            cache_lines: self.cache.len(),
            cache_capacity: self.cache.capacity(),
            index_height: self.index.height(),
            graph_edges: self.graph.edge_count(),
            keywords: self.tags.keyword_count(),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    fn load(&mut self, name: &str, address: BlockAddress) -> Result<Bytes> {
        let block = self.disk.read(address)?;
        let Some(meta) = self.metadata.get(name) else {
            return Err(StorageError::NotFound(name.to_string()));
        };

        let content = block.slice(..meta.size as usize);
        if !meta.verify(&content) {
            tracing::error!("Block {} no longer holds the content of {}", address, name);
            return Err(StorageError::Corruption(name.to_string()));
        }
        Ok(content)
    }

    fn check_name(name: &str) -> Result<()> {
        if name.is_empty() || name.chars().any(char::is_control) {
            return Err(StorageError::InvalidName(name.to_string()));
        }
        Ok(())
    }
}
