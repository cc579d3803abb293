use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::{Result, StorageError};

pub const BLOCK_SIZE: usize = 4096;

pub type BlockAddress = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReclaimPolicy {
    #[default]
    Leak,
    FreeList,
}

pub struct BlockStore {
    path: PathBuf,
    file: File,
    total_blocks: u64,
    next_block: BlockAddress,
    policy: ReclaimPolicy,
    free_list: Vec<BlockAddress>,
    leaked: u64,
}

impl BlockStore {
    pub fn open<P: AsRef<Path>>(path: P, total_blocks: u64, policy: ReclaimPolicy) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let Some(wanted) = total_blocks.checked_mul(BLOCK_SIZE as u64) else {
            return Err(StorageError::CapacityExceeded {
                target: path.display().to_string(),
                reason: format!("{} blocks overflow the image length", total_blocks),
            });
        };
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)?;

        let current = file.metadata()?.len();
        if current < wanted {
            tracing::info!("Sizing virtual disk {:?} to {} blocks", path, total_blocks);
            file.set_len(wanted)?;
            file.sync_all()?;
        }

        Ok(Self {
            path,
            file,
            total_blocks,
            next_block: 0,
            policy,
            free_list: Vec::new(),
            leaked: 0,
        })
    }

    pub fn allocate(&mut self) -> Result<BlockAddress> {
        if let Some(address) = self.free_list.pop() {
            tracing::debug!("Reusing reclaimed block {}", address);
            return Ok(address);
        }

        if self.next_block >= self.total_blocks {
            return Err(StorageError::CapacityExceeded {
                target: self.path.display().to_string(),
                reason: format!("all {} blocks allocated", self.total_blocks),
            });
        }

        let address = self.next_block;
        self.next_block += 1;
        Ok(address)
    }

    pub fn release(&mut self, address: BlockAddress) -> Result<()> {
        self.check_range(address)?;
        match self.policy {
            ReclaimPolicy::Leak => {
                self.leaked += 1;
                tracing::warn!(
                    "Block {} leaked on delete ({} leaked so far)",
                    address,
                    self.leaked
                );
            }
            ReclaimPolicy::FreeList => {
                if !self.free_list.contains(&address) {
                    self.free_list.push(address);
                }
            }
        }
        Ok(())
    }

    pub fn write(&mut self, address: BlockAddress, data: &[u8]) -> Result<()> {
        self.check_range(address)?;
        if data.len() > BLOCK_SIZE {
            return Err(StorageError::OversizedWrite {
                name: format!("block {}", address),
                len: data.len(),
                block_size: BLOCK_SIZE,
            });
        }

        let mut block = vec![0u8; BLOCK_SIZE];
        block[..data.len()].copy_from_slice(data);

        self.file.seek(SeekFrom::Start(Self::offset(address)))?;
        self.file.write_all(&block)?;
        self.file.sync_data()?;
        Ok(())
    }

    pub fn read(&mut self, address: BlockAddress) -> Result<Bytes> {
        self.check_range(address)?;

        let mut block = vec![0u8; BLOCK_SIZE];
        self.file.seek(SeekFrom::Start(Self::offset(address)))?;
        self.file.read_exact(&mut block)?;
        Ok(Bytes::from(block))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn total_blocks(&self) -> u64 {
        self.total_blocks
    }

    pub fn capacity_bytes(&self) -> u64 {
        self.total_blocks * BLOCK_SIZE as u64
    }

    pub fn allocated(&self) -> u64 {
        self.next_block - self.free_list.len() as u64
    }

    pub fn leaked(&self) -> u64 {
        self.leaked
    }

    pub fn policy(&self) -> ReclaimPolicy {
        self.policy
    }

    fn check_range(&self, address: BlockAddress) -> Result<()> {
        if address >= self.total_blocks {
            return Err(StorageError::OutOfRange {
                address,
                total_blocks: self.total_blocks,
            });
        }
        Ok(())
    }

    fn offset(address: BlockAddress) -> u64 {
        address * BLOCK_SIZE as u64
    }
}
