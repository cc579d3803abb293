mod block;
mod cache;
mod engine;
mod graph;
mod index;
mod metadata;
mod tags;
mod trie;

pub use block::{BlockAddress, BlockStore, ReclaimPolicy, BLOCK_SIZE};
pub use cache::BlockCache;
pub use engine::{
    DeleteReceipt, EngineConfig, EngineStats, FileEntry, ReadOutcome, ReadSource, StorageEngine,
    WriteReceipt,
};
pub use graph::{AccessGraph, Prediction, DEFAULT_PREDICTION_LIMIT};
pub use index::{IndexEntry, OrderedIndex, DEFAULT_ORDER};
pub use metadata::{FileMetadata, MetadataStore};
pub use tags::{TagIndex, DEFAULT_MAX_TAGS_PER_FILE, SYSTEM_KEYWORDS};
pub use trie::FilenameTrie;

pub type FileId = String;

pub type Result<T> = std::result::Result<T, StorageError>;

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("File not found: {0}")]
    NotFound(String),

    #[error("Block address {address} out of range (capacity {total_blocks} blocks)")]
    OutOfRange { address: BlockAddress, total_blocks: u64 },

    #[error("Write of {len} bytes to {name} exceeds block size {block_size}")]
    OversizedWrite {
        name: String,
        len: usize,
        block_size: usize,
    },

    #[error("Capacity exceeded for {target}: {reason}")]
    CapacityExceeded { target: String, reason: String },

    #[error("Invalid name: {0:?}")]
    InvalidName(String),

    #[error("Corruption detected: content of {0} does not match its checksum")]
    Corruption(String),
}

impl StorageError {
    pub fn kind(&self) -> &'static str {
        match self {
            StorageError::Io(_) => "Io",
            StorageError::NotFound(_) => "NotFound",
            StorageError::OutOfRange { .. } => "OutOfRange",
            StorageError::OversizedWrite { .. } => "OversizedWrite",
            StorageError::CapacityExceeded { .. } => "CapacityExceeded",
            StorageError::InvalidName(_) => "InvalidName",
            StorageError::Corruption(_) => "Corruption",
        }
    }

    pub fn target(&self) -> Option<String> {
        match self {
            StorageError::Io(_) => None,
            StorageError::NotFound(name)
            | StorageError::InvalidName(name)
            | StorageError::Corruption(name) => Some(name.clone()),
            StorageError::OversizedWrite { name, .. } => Some(name.clone()),
            StorageError::CapacityExceeded { target, .. } => Some(target.clone()),
            StorageError::OutOfRange { address, .. } => Some(address.to_string()),
        }
    }
}
