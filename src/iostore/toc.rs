//! `.utoc` table-of-contents structures: header, chunk id table, packed
//! offset/length and compression-block tables, compression method names,
//! and the directory index tree.

use crate::cursor::Cursor;

use super::IoStoreError;

pub const TOC_MAGIC: [u8; 16] = *b"-==--==--==--==-";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum TocVersion {
    Invalid = 0,
    Initial = 1,
    DirectoryIndex = 2,
    PartitionSize = 3,
    PerfectHash = 4,
    PerfectHashWithOverflow = 5,
}

impl TocVersion {
    fn from_u8(v: u8) -> Result<Self, IoStoreError> {
        Ok(match v {
            0 => TocVersion::Invalid,
            1 => TocVersion::Initial,
            2 => TocVersion::DirectoryIndex,
            3 => TocVersion::PartitionSize,
            4 => TocVersion::PerfectHash,
            5 => TocVersion::PerfectHashWithOverflow,
            other => return Err(IoStoreError::UnsupportedVersion(other)),
        })
    }
}

#[derive(Debug, Clone)]
pub struct TocHeader {
    pub version: TocVersion,
    pub entry_count: u32,
    pub compressed_block_entry_count: u32,
    pub compression_method_name_count: u32,
    pub compression_method_name_length: u32,
    pub compression_block_size: u32,
    pub directory_index_size: u32,
    pub partition_count: u64,
    pub encryption_key_guid: [u8; 16],
    pub is_encrypted: bool,
    pub partition_size: u64,
    /// Element count of the perfect-hash seed table that follows the
    /// offset/length table, present from [`TocVersion::PerfectHash`] on.
    pub chunk_perfect_hash_seeds_count: u32,
    /// Element count of the chunks-without-perfect-hash overflow table,
    /// present from [`TocVersion::PerfectHashWithOverflow`] on.
    pub chunks_without_perfect_hash_count: u32,
}

impl TocHeader {
    pub fn read(c: &mut Cursor) -> Result<Self, IoStoreError> {
        let magic = c.try_bytes::<16>().ok_or(IoStoreError::Truncated)?;
        if magic != TOC_MAGIC {
            return Err(IoStoreError::BadMagic);
        }

        let version = TocVersion::from_u8(c.try_u8().ok_or(IoStoreError::Truncated)?)?;
        let _reserved = c.try_bytes::<3>().ok_or(IoStoreError::Truncated)?;
        let _header_size = c.try_u32().ok_or(IoStoreError::Truncated)?;
        let entry_count = c.try_u32().ok_or(IoStoreError::Truncated)?;
        let compressed_block_entry_count = c.try_u32().ok_or(IoStoreError::Truncated)?;
        let _compressed_block_entry_size = c.try_u32().ok_or(IoStoreError::Truncated)?;
        let compression_method_name_count = c.try_u32().ok_or(IoStoreError::Truncated)?;
        let compression_method_name_length = c.try_u32().ok_or(IoStoreError::Truncated)?;
        let compression_block_size = c.try_u32().ok_or(IoStoreError::Truncated)?;
        let directory_index_size = c.try_u32().ok_or(IoStoreError::Truncated)?;
        let mut partition_count = c.try_u32().ok_or(IoStoreError::Truncated)? as u64;
        let _container_id = c.try_u64().ok_or(IoStoreError::Truncated)?;
        let encryption_key_guid = c.try_guid().ok_or(IoStoreError::Truncated)?;
        let container_flags = c.try_u8().ok_or(IoStoreError::Truncated)?;
        let _reserved0 = c.try_bytes::<3>().ok_or(IoStoreError::Truncated)?;
        let chunk_perfect_hash_seeds_count = c.try_u32().ok_or(IoStoreError::Truncated)?;
        let mut partition_size = c.try_u64().ok_or(IoStoreError::Truncated)?;
        let chunks_without_perfect_hash_count = c.try_u32().ok_or(IoStoreError::Truncated)?;
        let _reserved1 = c.try_bytes::<44>().ok_or(IoStoreError::Truncated)?;

        if version < TocVersion::PartitionSize {
            partition_count = 1;
            partition_size = u64::MAX;
        }

        const ENCRYPTED_FLAG: u8 = 0x01;
        let is_encrypted = container_flags & ENCRYPTED_FLAG != 0;

        Ok(TocHeader {
            version,
            entry_count,
            compressed_block_entry_count,
            compression_method_name_count,
            compression_method_name_length,
            compression_block_size,
            directory_index_size,
            partition_count,
            encryption_key_guid,
            is_encrypted,
            partition_size,
            chunk_perfect_hash_seeds_count,
            chunks_without_perfect_hash_count,
        })
    }
}

/// `FIoChunkId`: a 64-bit id plus a 16-bit index and an 8-bit type tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChunkId {
    pub id: u64,
    pub index: u16,
    pub chunk_type: u8,
}

pub const CHUNK_ID_SIZE: usize = 12;

pub fn read_chunk_ids(c: &mut Cursor, count: u32) -> Result<Vec<ChunkId>, IoStoreError> {
    let mut out = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let id = c.try_u64().ok_or(IoStoreError::Truncated)?;
        let index = c.try_u16().ok_or(IoStoreError::Truncated)?;
        let _pad = c.try_u8().ok_or(IoStoreError::Truncated)?;
        let chunk_type = c.try_u8().ok_or(IoStoreError::Truncated)?;
        out.push(ChunkId { id, index, chunk_type });
    }
    Ok(out)
}

/// Packed 40-bit offset / 40-bit length pair (`FIoOffsetAndLength`, 10 raw
/// bytes). Both fields are reconstructed from the ten bytes taken together
/// as one little-endian 80-bit integer.
#[derive(Debug, Clone, Copy)]
pub struct OffsetAndLength {
    pub offset: u64,
    pub length: u64,
}

pub fn read_offset_and_length(c: &mut Cursor) -> Result<OffsetAndLength, IoStoreError> {
    let raw = c.try_bytes::<10>().ok_or(IoStoreError::Truncated)?;
    let mut v: u128 = 0;
    for (i, b) in raw.iter().enumerate() {
        v |= (*b as u128) << (8 * i);
    }
    let offset = (v & ((1u128 << 40) - 1)) as u64;
    let length = ((v >> 40) & ((1u128 << 40) - 1)) as u64;
    Ok(OffsetAndLength { offset, length })
}

/// Packed compression-block record: 40-bit offset, 24-bit compressed size,
/// 24-bit uncompressed size, 8-bit method index (12 raw bytes).
#[derive(Debug, Clone, Copy)]
pub struct TocCompressedBlockEntry {
    pub offset: u64,
    pub compressed_size: u32,
    pub uncompressed_size: u32,
    pub compression_method_index: u8,
}

pub fn read_compression_blocks(
    c: &mut Cursor,
    count: u32,
) -> Result<Vec<TocCompressedBlockEntry>, IoStoreError> {
    let mut out = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let raw = c.try_bytes::<12>().ok_or(IoStoreError::Truncated)?;
        let mut v: u128 = 0;
        for (i, b) in raw.iter().enumerate() {
            v |= (*b as u128) << (8 * i);
        }
        let offset = (v & ((1u128 << 40) - 1)) as u64;
        let compressed_size = ((v >> 40) & ((1u128 << 24) - 1)) as u32;
        let uncompressed_size = ((v >> 64) & ((1u128 << 24) - 1)) as u32;
        let compression_method_index = ((v >> 88) & 0xff) as u8;
        out.push(TocCompressedBlockEntry {
            offset,
            compressed_size,
            uncompressed_size,
            compression_method_index,
        });
    }
    Ok(out)
}

pub fn read_compression_method_names(
    c: &mut Cursor,
    count: u32,
    name_length: u32,
) -> Result<Vec<String>, IoStoreError> {
    let mut out = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let raw = c
            .try_take(name_length as usize)
            .ok_or(IoStoreError::Truncated)?;
        let end = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
        out.push(String::from_utf8_lossy(&raw[..end]).into_owned());
    }
    Ok(out)
}

// ── Directory index tree ────────────────────────────────────────────────

const INVALID_INDEX: u32 = u32::MAX;

struct DirEntry {
    name: u32,
    first_child: u32,
    next_sibling: u32,
    first_file: u32,
}

struct FileEntry {
    name: u32,
    next_file: u32,
    user_data: u32,
}

/// Walks the directory index tree and returns `(full_path, user_data)`
/// pairs, where `user_data` indexes in parallel into the chunk id and
/// offset/length tables.
pub fn parse_directory_index(bytes: &[u8]) -> Result<Vec<(String, u32)>, IoStoreError> {
    let mut c = Cursor::new(bytes);

    let mount_point = c
        .try_fstring()
        .ok_or(IoStoreError::Truncated)?
        .map_err(|_| IoStoreError::Truncated)?;

    let dir_count = c.try_u32().ok_or(IoStoreError::Truncated)?;
    let mut dirs = Vec::with_capacity(dir_count as usize);
    for _ in 0..dir_count {
        dirs.push(DirEntry {
            name: c.try_u32().ok_or(IoStoreError::Truncated)?,
            first_child: c.try_u32().ok_or(IoStoreError::Truncated)?,
            next_sibling: c.try_u32().ok_or(IoStoreError::Truncated)?,
            first_file: c.try_u32().ok_or(IoStoreError::Truncated)?,
        });
    }

    let file_count = c.try_u32().ok_or(IoStoreError::Truncated)?;
    let mut files = Vec::with_capacity(file_count as usize);
    for _ in 0..file_count {
        files.push(FileEntry {
            name: c.try_u32().ok_or(IoStoreError::Truncated)?,
            next_file: c.try_u32().ok_or(IoStoreError::Truncated)?,
            user_data: c.try_u32().ok_or(IoStoreError::Truncated)?,
        });
    }

    let string_count = c.try_u32().ok_or(IoStoreError::Truncated)?;
    let mut strings = Vec::with_capacity(string_count as usize);
    for _ in 0..string_count {
        let s = c
            .try_fstring()
            .ok_or(IoStoreError::Truncated)?
            .map_err(|_| IoStoreError::Truncated)?;
        strings.push(s);
    }

    let name_of = |idx: u32| -> &str {
        if idx == INVALID_INDEX {
            ""
        } else {
            strings.get(idx as usize).map(String::as_str).unwrap_or("")
        }
    };

    let mut out = Vec::new();
    if dirs.is_empty() {
        return Ok(out);
    }

    let mut stack = vec![(0u32, mount_point.clone())];
    while let Some((dir_idx, prefix)) = stack.pop() {
        if dir_idx == INVALID_INDEX {
            continue;
        }
        let dir = &dirs[dir_idx as usize];

        let mut file_idx = dir.first_file;
        while file_idx != INVALID_INDEX {
            let f = &files[file_idx as usize];
            let name = name_of(f.name);
            let path = join(&prefix, name);
            out.push((path, f.user_data));
            file_idx = f.next_file;
        }

        let mut child_idx = dir.first_child;
        while child_idx != INVALID_INDEX {
            let child = &dirs[child_idx as usize];
            let child_path = join(&prefix, name_of(child.name));
            stack.push((child_idx, child_path));
            child_idx = child.next_sibling;
        }
    }

    Ok(out)
}

fn join(prefix: &str, name: &str) -> String {
    if prefix.is_empty() || prefix.ends_with('/') {
        format!("{prefix}{name}")
    } else {
        format!("{prefix}/{name}")
    }
}
