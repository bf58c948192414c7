//! Block provider (C4): per-entry view mapping logical offset to physical
//! compression block. Polymorphic over `{Pak, IoStore, Mock}` behind one
//! enum — one level of variant, per the design notes, rather than a deep
//! trait hierarchy.

use std::sync::Arc;

use crate::container::{ContainerError, MountedContainer};
use crate::crypto::align16;
use crate::entry::CompressionBlock;
use crate::iostore::{IoStoreEntry, IoStoreError, IoStoreToc};
use crate::pak::PakEntry;

#[derive(Debug, thiserror::Error)]
pub enum BlockProviderError {
    #[error(transparent)]
    Container(#[from] ContainerError),
    #[error("block index {index} out of range (block_count = {count})")]
    BlockIndexOutOfRange { index: usize, count: usize },
    #[error(transparent)]
    IoStore(#[from] IoStoreError),
}

pub struct PakBlockProvider {
    pub container: Arc<MountedContainer>,
    pub blocks: Vec<CompressionBlock>,
    pub is_encrypted: bool,
    pub block_size: u32,
}

pub struct IoStoreBlockProvider {
    pub toc: Arc<IoStoreToc>,
    /// Partition files, indexed by partition number (`partitions[0]` is the
    /// primary `.ucas`).
    pub partitions: Vec<Arc<MountedContainer>>,
    pub start_block_index: u32,
    pub block_count: u32,
    pub first_block_offset: u32,
    /// The chunk's own declared length. The TOC's compression blocks are
    /// shared physical units that may run past this chunk's last byte (the
    /// tail of the final spanned block can belong to whatever comes next in
    /// the partition), so this is kept verbatim rather than derived by
    /// summing block sizes.
    pub entry_size: u64,
}

/// Test-only fixture: an in-memory list of blocks with plain bytes, used by
/// the stream-level property tests so they don't need real container files.
pub struct MockBlockProvider {
    pub blocks: Vec<CompressionBlock>,
    pub raw: Vec<u8>,
    pub is_encrypted: bool,
    pub block_size: u32,
}

pub enum BlockProvider {
    Pak(PakBlockProvider),
    IoStore(IoStoreBlockProvider),
    Mock(MockBlockProvider),
}

impl BlockProvider {
    pub fn for_pak_entry(container: Arc<MountedContainer>, entry: &PakEntry) -> Self {
        BlockProvider::Pak(PakBlockProvider {
            container,
            blocks: entry.blocks(),
            is_encrypted: entry.is_encrypted,
            block_size: entry.compression_block_size,
        })
    }

    pub fn for_io_store_entry(
        toc: Arc<IoStoreToc>,
        partitions: Vec<Arc<MountedContainer>>,
        entry: &IoStoreEntry,
    ) -> Self {
        BlockProvider::IoStore(IoStoreBlockProvider {
            toc,
            partitions,
            start_block_index: entry.start_block_index,
            block_count: entry.block_count,
            first_block_offset: entry.first_block_offset,
            entry_size: entry.size,
        })
    }

    pub fn uncompressed_size(&self) -> u64 {
        match self {
            BlockProvider::Pak(p) => p.blocks.iter().map(|b| b.uncompressed_size as u64).sum(),
            BlockProvider::IoStore(p) => p.entry_size,
            BlockProvider::Mock(m) => m.blocks.iter().map(|b| b.uncompressed_size as u64).sum(),
        }
    }

    pub fn block_count(&self) -> usize {
        match self {
            BlockProvider::Pak(p) => p.blocks.len(),
            BlockProvider::IoStore(p) => p.block_count as usize,
            BlockProvider::Mock(m) => m.blocks.len(),
        }
    }

    /// Nominal uncompressed block size; 0 if blocks are non-uniform.
    pub fn block_size(&self) -> u32 {
        match self {
            BlockProvider::Pak(p) => p.block_size,
            BlockProvider::IoStore(p) => p.toc.header.compression_block_size,
            BlockProvider::Mock(m) => m.block_size,
        }
    }

    pub fn is_encrypted(&self) -> bool {
        match self {
            BlockProvider::Pak(p) => p.is_encrypted,
            BlockProvider::IoStore(p) => p.toc.header.is_encrypted,
            BlockProvider::Mock(m) => m.is_encrypted,
        }
    }

    /// Byte offset within the first compression block where this entry's
    /// data actually begins; nonzero only for non-block-aligned IO Store
    /// chunks.
    pub fn first_block_offset(&self) -> u32 {
        match self {
            BlockProvider::Pak(_) => 0,
            BlockProvider::IoStore(p) => p.first_block_offset,
            BlockProvider::Mock(_) => 0,
        }
    }

    pub fn get_block(&self, i: usize) -> Result<CompressionBlock, BlockProviderError> {
        match self {
            BlockProvider::Pak(p) => p
                .blocks
                .get(i)
                .cloned()
                .ok_or(BlockProviderError::BlockIndexOutOfRange { index: i, count: p.blocks.len() }),
            BlockProvider::IoStore(p) => {
                let idx = p.start_block_index as usize + i;
                let raw = p.toc.compression_blocks.get(idx).ok_or(
                    BlockProviderError::BlockIndexOutOfRange { index: i, count: p.block_count as usize },
                )?;
                let method = p.toc.method_name(raw.compression_method_index)?;
                let uncompressed_offset = if i == 0 {
                    0
                } else {
                    (i as u64) * p.toc.header.compression_block_size as u64 - p.first_block_offset as u64
                };
                Ok(CompressionBlock {
                    compressed_offset: raw.offset,
                    compressed_size: raw.compressed_size,
                    uncompressed_offset,
                    uncompressed_size: raw.uncompressed_size,
                    method,
                })
            }
            BlockProvider::Mock(m) => m
                .blocks
                .get(i)
                .cloned()
                .ok_or(BlockProviderError::BlockIndexOutOfRange { index: i, count: m.blocks.len() }),
        }
    }

    pub fn get_block_read_size(&self, i: usize) -> Result<u32, BlockProviderError> {
        let block = self.get_block(i)?;
        Ok(if self.is_encrypted() {
            align16(block.compressed_size as u64) as u32
        } else {
            block.compressed_size
        })
    }

    pub fn get_block_compression_method(&self, i: usize) -> Result<String, BlockProviderError> {
        Ok(self.get_block(i)?.method)
    }

    /// Copy exactly `get_block_read_size(i)` bytes from the backing
    /// container into `buffer`.
    pub fn read_block_raw(&self, i: usize, buffer: &mut Vec<u8>) -> Result<(), BlockProviderError> {
        let block = self.get_block(i)?;
        let read_size = self.get_block_read_size(i)? as usize;
        buffer.resize(read_size, 0);

        match self {
            BlockProvider::Pak(p) => {
                p.container.read(block.compressed_offset, buffer)?;
            }
            BlockProvider::IoStore(p) => {
                let partition_size = p.toc.header.partition_size;
                let partition_index = (block.compressed_offset / partition_size) as usize;
                let partition_offset = block.compressed_offset % partition_size;
                let container = p.partitions.get(partition_index).ok_or(
                    BlockProviderError::BlockIndexOutOfRange { index: i, count: p.partitions.len() },
                )?;
                container.read(partition_offset, buffer)?;
            }
            BlockProvider::Mock(m) => {
                let start = block.compressed_offset as usize;
                buffer.copy_from_slice(&m.raw[start..start + read_size]);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mock_provider_reports_sizes() {
        let raw = vec![1u8, 2, 3, 4, 5, 6, 7, 8];
        let provider = BlockProvider::Mock(MockBlockProvider {
            blocks: vec![CompressionBlock {
                compressed_offset: 0,
                compressed_size: 8,
                uncompressed_offset: 0,
                uncompressed_size: 8,
                method: String::new(),
            }],
            raw,
            is_encrypted: false,
            block_size: 8,
        });
        assert_eq!(provider.uncompressed_size(), 8);
        assert_eq!(provider.block_count(), 1);
        let mut buf = Vec::new();
        provider.read_block_raw(0, &mut buf).unwrap();
        assert_eq!(buf, vec![1, 2, 3, 4, 5, 6, 7, 8]);
    }

    #[test]
    fn io_store_block_with_unknown_method_index_is_an_error_not_a_silent_default() {
        use crate::iostore::toc::{TocCompressedBlockEntry, TocHeader, TocVersion};

        let toc = Arc::new(IoStoreToc {
            header: TocHeader {
                version: TocVersion::PerfectHashWithOverflow,
                entry_count: 1,
                compressed_block_entry_count: 1,
                compression_method_name_count: 0,
                compression_method_name_length: 0,
                compression_block_size: 64,
                directory_index_size: 0,
                partition_count: 1,
                encryption_key_guid: [0; 16],
                is_encrypted: false,
                partition_size: u64::MAX,
            },
            chunk_ids: Vec::new(),
            offsets_and_lengths: Vec::new(),
            compression_blocks: vec![TocCompressedBlockEntry {
                offset: 0,
                compressed_size: 10,
                uncompressed_size: 64,
                compression_method_index: 1, // no names registered -> unresolvable
            }],
            compression_method_names: Vec::new(),
        });

        let provider = BlockProvider::IoStore(IoStoreBlockProvider {
            toc,
            partitions: Vec::new(),
            start_block_index: 0,
            block_count: 1,
            first_block_offset: 0,
            entry_size: 64,
        });

        assert!(matches!(provider.get_block(0), Err(BlockProviderError::IoStore(_))));
    }
}
