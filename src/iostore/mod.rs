//! IO Store index decoder (C3b).
//!
//! Parses a `.utoc` file's header and tables into an [`IoStoreToc`] plus a
//! flat list of [`IoStoreEntry`] values produced by walking the directory
//! index. The compression-block table stays on the TOC rather than being
//! copied per-entry — each entry only remembers its starting index and
//! block count into that shared table, per §3's `IoStoreEntry` model.

pub mod toc;

use thiserror::Error;

use crate::crypto::{self, CryptoError};
use crate::cursor::Cursor;

pub use toc::{ChunkId, OffsetAndLength, TocCompressedBlockEntry, TocHeader, TocVersion};

#[derive(Error, Debug)]
pub enum IoStoreError {
    #[error("bad .utoc magic")]
    BadMagic,
    #[error("unsupported TOC version {0}")]
    UnsupportedVersion(u8),
    #[error("TOC data is truncated or malformed")]
    Truncated,
    #[error("TOC is encrypted but no key was supplied")]
    MissingKey,
    #[error("a compression block references method index {0}, which is not in the method table")]
    UnknownCompressionMethodIndex(u8),
    #[error(transparent)]
    Crypto(#[from] CryptoError),
}

#[derive(Debug, Clone)]
pub struct IoStoreToc {
    pub header: TocHeader,
    pub chunk_ids: Vec<ChunkId>,
    pub offsets_and_lengths: Vec<OffsetAndLength>,
    pub compression_blocks: Vec<TocCompressedBlockEntry>,
    pub compression_method_names: Vec<String>,
}

impl IoStoreToc {
    /// Resolve a block's compression method, where index 0 means
    /// uncompressed and index `k` maps to `compression_method_names[k-1]`.
    pub fn method_name(&self, method_index: u8) -> Result<String, IoStoreError> {
        if method_index == 0 {
            return Ok(String::new());
        }
        self.compression_method_names
            .get(method_index as usize - 1)
            .cloned()
            .ok_or(IoStoreError::UnknownCompressionMethodIndex(method_index))
    }
}

#[derive(Debug, Clone)]
pub struct IoStoreEntry {
    pub path: String,
    pub chunk_id: ChunkId,
    /// Logical offset into the partitioned `.ucas` byte space.
    pub offset: u64,
    pub size: u64,
    pub start_block_index: u32,
    pub block_count: u32,
    /// Where within the first block this chunk's data actually begins;
    /// nonzero only when the chunk is not block-aligned.
    pub first_block_offset: u32,
}

/// Decode a `.utoc` file's full index. `aes_key` is required only when the
/// header reports the container as encrypted.
pub fn decode_index(
    utoc_bytes: &[u8],
    aes_key: Option<&[u8; 32]>,
) -> Result<(IoStoreToc, Vec<IoStoreEntry>), IoStoreError> {
    let mut c = Cursor::new(utoc_bytes);
    let header = TocHeader::read(&mut c)?;

    if header.is_encrypted && aes_key.is_none() {
        return Err(IoStoreError::MissingKey);
    }

    let chunk_ids = toc::read_chunk_ids(&mut c, header.entry_count)?;
    let offsets_and_lengths = (0..header.entry_count)
        .map(|_| toc::read_offset_and_length(&mut c))
        .collect::<Result<Vec<_>, _>>()?;

    // Perfect-hash seed table (one i32 per entry) and the overflow table of
    // chunks excluded from it (one u32 per entry), present from
    // `PerfectHash`/`PerfectHashWithOverflow` respectively. Neither is
    // consumed beyond skipping it — the core resolves chunks with a linear
    // scan rather than the perfect-hash lookup.
    if header.version >= TocVersion::PerfectHash {
        c.advance(4 * header.chunk_perfect_hash_seeds_count as usize)
            .map_err(|_| IoStoreError::Truncated)?;
    }
    if header.version >= TocVersion::PerfectHashWithOverflow {
        c.advance(4 * header.chunks_without_perfect_hash_count as usize)
            .map_err(|_| IoStoreError::Truncated)?;
    }

    let compression_blocks =
        toc::read_compression_blocks(&mut c, header.compressed_block_entry_count)?;
    let compression_method_names = toc::read_compression_method_names(
        &mut c,
        header.compression_method_name_count,
        header.compression_method_name_length,
    )?;

    let directory_index_bytes = c
        .try_take(header.directory_index_size as usize)
        .ok_or(IoStoreError::Truncated)?;

    let directory_index_bytes: Vec<u8> = if header.is_encrypted {
        let key = aes_key.expect("checked above");
        let mut owned = directory_index_bytes.to_vec();
        let aligned = crypto::align16(owned.len() as u64) as usize;
        owned.resize(aligned, 0);
        crypto::decrypt_in_place(&mut owned, key)?;
        owned.truncate(header.directory_index_size as usize);
        owned
    } else {
        directory_index_bytes.to_vec()
    };

    let flattened = toc::parse_directory_index(&directory_index_bytes)?;

    // Per-chunk meta table: one 32-byte chunk hash plus a one-byte flags
    // field, one per entry, trailing the directory index rather than
    // sitting beside the offset/length table.
    const TOC_ENTRY_META_SIZE: usize = 32 + 1;
    c.advance(TOC_ENTRY_META_SIZE * header.entry_count as usize)
        .map_err(|_| IoStoreError::Truncated)?;

    let toc = IoStoreToc {
        header: header.clone(),
        chunk_ids,
        offsets_and_lengths,
        compression_blocks,
        compression_method_names,
    };

    let block_size = header.compression_block_size as u64;
    let mut entries = Vec::with_capacity(flattened.len());
    for (path, user_data) in flattened {
        let idx = user_data as usize;
        let (Some(&chunk_id), Some(&offset_len)) =
            (toc.chunk_ids.get(idx), toc.offsets_and_lengths.get(idx))
        else {
            continue; // stale user_data — skip rather than fail the whole mount
        };

        let start_block_index = (offset_len.offset / block_size) as u32;
        let end_block_index = if offset_len.length == 0 {
            start_block_index
        } else {
            (((offset_len.offset + offset_len.length) - 1) / block_size) as u32
        };
        let block_count = end_block_index - start_block_index + 1;
        let first_block_offset = (offset_len.offset % block_size) as u32;

        entries.push(IoStoreEntry {
            path,
            chunk_id,
            offset: offset_len.offset,
            size: offset_len.length,
            start_block_index,
            block_count,
            first_block_offset,
        });
    }

    Ok((toc, entries))
}
