//! PAK entry record decoding — the bit-packed per-file record format
//! introduced to shrink the directory index, and the compression-block
//! list derivation that follows it.

use crate::cursor::{align16, Cursor};
use crate::entry::CompressionBlock;

use super::PakError;

/// Each stored file is preceded by this fixed-size struct inside the data
/// region of the container; block-size tables (when present) follow it.
pub const ENTRY_HEADER_SIZE: u64 = 53;

#[derive(Debug, Clone)]
pub struct PakEntry {
    pub path: String,
    pub offset: u64,
    pub uncompressed_size: u64,
    pub compressed_size: u64,
    pub compression_method: Option<String>,
    pub is_encrypted: bool,
    pub compression_block_size: u32,
    /// `(compressed_offset, compressed_size)` pairs, absolute within the
    /// container file, one per compression block. Empty when uncompressed.
    pub compression_blocks: Vec<(u64, u32)>,
}

impl PakEntry {
    /// Materialize the runtime [`CompressionBlock`] list for this entry.
    pub fn blocks(&self) -> Vec<CompressionBlock> {
        if self.compression_blocks.is_empty() {
            return vec![CompressionBlock {
                compressed_offset: self.offset + ENTRY_HEADER_SIZE,
                compressed_size: self.uncompressed_size as u32,
                uncompressed_offset: 0,
                uncompressed_size: self.uncompressed_size as u32,
                method: self
                    .compression_method
                    .clone()
                    .unwrap_or_default(),
            }];
        }

        let method = self.compression_method.clone().unwrap_or_default();
        let block_size = self.compression_block_size as u64;
        let mut blocks = Vec::with_capacity(self.compression_blocks.len());
        let mut uncompressed_offset = 0u64;
        let total = self.uncompressed_size;
        for (i, &(compressed_offset, compressed_size)) in self.compression_blocks.iter().enumerate() {
            let remaining = total - uncompressed_offset;
            let is_last = i + 1 == self.compression_blocks.len();
            let uncompressed_size = if is_last { remaining } else { block_size.min(remaining) };
            blocks.push(CompressionBlock {
                compressed_offset: self.offset + compressed_offset,
                compressed_size,
                uncompressed_offset,
                uncompressed_size: uncompressed_size as u32,
                method: method.clone(),
            });
            uncompressed_offset += uncompressed_size;
        }
        blocks
    }
}

/// Decode one entry record from the encoded-entries byte block, at `pos`.
/// `compression_methods` is the archive-level name table (index 0 means
/// "no compression", index `k` maps to `compression_methods[k - 1]`).
pub fn decode_entry(
    data: &[u8],
    pos: usize,
    path: String,
    compression_methods: &[String],
) -> Result<PakEntry, PakError> {
    let mut c = Cursor::at(data, pos);

    let bits = c.try_u32().ok_or(PakError::Truncated)?;

    let compression_method_index = (bits >> 23) & 0x3f;
    let compression_method = if compression_method_index == 0 {
        None
    } else {
        let idx = compression_method_index as usize - 1;
        Some(
            compression_methods
                .get(idx)
                .cloned()
                .ok_or(PakError::UnknownCompressionMethodIndex(compression_method_index))?,
        )
    };

    let is_encrypted = (bits & (1 << 22)) != 0;
    let block_count = (bits >> 6) & 0xffff;

    let block_size_field = bits & 0x3f;
    let mut compression_block_size = if block_size_field == 0x3f {
        c.try_u32().ok_or(PakError::Truncated)?
    } else {
        block_size_field << 11
    };

    let offset_is_32 = (bits & (1 << 31)) != 0;
    let uncompressed_is_32 = (bits & (1 << 30)) != 0;
    let compressed_is_32 = (bits & (1 << 29)) != 0;

    let mut read_var = |c: &mut Cursor, is_32: bool| -> Result<u64, PakError> {
        if is_32 {
            Ok(c.try_u32().ok_or(PakError::Truncated)? as u64)
        } else {
            c.try_u64().ok_or(PakError::Truncated)
        }
    };

    let offset = read_var(&mut c, offset_is_32)?;
    let uncompressed_size = read_var(&mut c, uncompressed_is_32)?;
    let compressed_size = if compression_method.is_some() {
        read_var(&mut c, compressed_is_32)?
    } else {
        uncompressed_size
    };

    if block_count == 1 && compression_block_size == 0 {
        compression_block_size = uncompressed_size as u32;
    }

    let compression_blocks = build_block_list(
        &mut c,
        block_count,
        uncompressed_size,
        compressed_size,
        compression_method.is_some(),
        is_encrypted,
    )?;

    Ok(PakEntry {
        path,
        offset,
        uncompressed_size,
        compressed_size,
        compression_method,
        is_encrypted,
        compression_block_size,
        compression_blocks,
    })
}

/// Implements the three cases of §4.3's "Compression-block list
/// construction": uncompressed, single unencrypted compressed block
/// (derived, no per-block table), and the general multi-block case.
fn build_block_list(
    c: &mut Cursor,
    block_count: u32,
    uncompressed_size: u64,
    compressed_size: u64,
    is_compressed: bool,
    is_encrypted: bool,
) -> Result<Vec<(u64, u32)>, PakError> {
    if !is_compressed {
        return Ok(Vec::new());
    }

    if block_count == 1 && !is_encrypted {
        let header_size = ENTRY_HEADER_SIZE;
        return Ok(vec![(header_size, compressed_size as u32)]);
    }

    let mut sizes = Vec::with_capacity(block_count as usize);
    for _ in 0..block_count {
        sizes.push(c.try_u32().ok_or(PakError::Truncated)?);
    }

    let header_size = ENTRY_HEADER_SIZE + 4 + 16 * block_count as u64;
    let mut offset = header_size;
    let mut blocks = Vec::with_capacity(sizes.len());
    for size in sizes {
        blocks.push((offset, size));
        let advance = if is_encrypted { align16(size as u64) } else { size as u64 };
        offset += advance;
    }

    let _ = uncompressed_size;
    Ok(blocks)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode_entry(
        offset: u64,
        uncompressed_size: u64,
        compressed_size: u64,
        method_index: u32,
        is_encrypted: bool,
        block_count: u32,
        block_size: u32,
        block_sizes: &[u32],
    ) -> Vec<u8> {
        let mut bits: u32 = 0;
        bits |= 1 << 31; // offset 32-bit
        bits |= 1 << 30; // uncompressed 32-bit
        bits |= 1 << 29; // compressed 32-bit
        bits |= method_index << 23;
        if is_encrypted {
            bits |= 1 << 22;
        }
        bits |= (block_count & 0xffff) << 6;
        let block_size_field = if block_size % (1 << 11) == 0 && (block_size >> 11) < 0x3f {
            block_size >> 11
        } else {
            0x3f
        };
        bits |= block_size_field;

        let mut buf = Vec::new();
        buf.extend_from_slice(&bits.to_le_bytes());
        if block_size_field == 0x3f {
            buf.extend_from_slice(&block_size.to_le_bytes());
        }
        buf.extend_from_slice(&(offset as u32).to_le_bytes());
        buf.extend_from_slice(&(uncompressed_size as u32).to_le_bytes());
        if method_index != 0 {
            buf.extend_from_slice(&(compressed_size as u32).to_le_bytes());
        }
        for s in block_sizes {
            buf.extend_from_slice(&s.to_le_bytes());
        }
        buf
    }

    #[test]
    fn decodes_uncompressed_entry() {
        let buf = encode_entry(1024, 100, 100, 0, false, 0, 0, &[]);
        let methods = vec![];
        let entry = decode_entry(&buf, 0, "file.bin".into(), &methods).unwrap();
        assert_eq!(entry.offset, 1024);
        assert_eq!(entry.uncompressed_size, 100);
        assert!(entry.compression_method.is_none());
        let blocks = entry.blocks();
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].compressed_offset, 1024 + ENTRY_HEADER_SIZE);
    }

    #[test]
    fn decodes_single_block_compressed_entry() {
        let buf = encode_entry(0, 150_000, 90_000, 1, false, 1, 150_000, &[]);
        let methods = vec!["Zlib".to_string()];
        let entry = decode_entry(&buf, 0, "file.bin".into(), &methods).unwrap();
        assert_eq!(entry.compression_method.as_deref(), Some("Zlib"));
        let blocks = entry.blocks();
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].compressed_offset, ENTRY_HEADER_SIZE);
        assert_eq!(blocks[0].compressed_size, 90_000);
    }

    #[test]
    fn encrypted_single_block_reads_an_explicit_size_instead_of_deriving() {
        // block_count == 1 only derives the block from compressed_size when
        // unencrypted; an encrypted single block still carries a one-entry
        // size table, per repak's `compression_block_count == 1 && !encrypted`
        // condition.
        let sizes = [90_000u32];
        let buf = encode_entry(0, 150_000, 90_000, 1, true, 1, 150_000, &sizes);
        let methods = vec!["Zlib".to_string()];
        let entry = decode_entry(&buf, 0, "file.bin".into(), &methods).unwrap();
        let blocks = entry.blocks();
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].compressed_offset, ENTRY_HEADER_SIZE + 4 + 16);
        assert_eq!(blocks[0].compressed_size, 90_000);
    }

    #[test]
    fn decodes_multi_block_compressed_entry() {
        let sizes = [20_000u32, 20_000, 5_000];
        let buf = encode_entry(0, 150_000, 45_000, 1, true, 3, 65_536, &sizes);
        let methods = vec!["Zlib".to_string()];
        let entry = decode_entry(&buf, 0, "file.bin".into(), &methods).unwrap();
        let blocks = entry.blocks();
        assert_eq!(blocks.len(), 3);
        // first block starts right after header + block table
        assert_eq!(blocks[0].compressed_offset, ENTRY_HEADER_SIZE + 4 + 16 * 3);
        // encrypted: every subsequent offset advances by align16(size)
        assert_eq!(
            blocks[1].compressed_offset,
            blocks[0].compressed_offset + align16(20_000)
        );
        assert_eq!(blocks[2].uncompressed_size, 150_000 - 65_536 * 2);
    }

    #[test]
    fn unknown_method_index_rejected() {
        let buf = encode_entry(0, 10, 10, 3, false, 0, 0, &[]);
        let err = decode_entry(&buf, 0, "x".into(), &[]).unwrap_err();
        assert!(matches!(err, PakError::UnknownCompressionMethodIndex(3)));
    }
}
