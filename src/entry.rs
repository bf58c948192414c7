//! Common entry surface: the tagged-variant `AssetEntry` and the runtime
//! `CompressionBlock` both decoders' entries are eventually projected into
//! for [`crate::block_provider`].

use std::path::{Path, PathBuf};

use crate::iostore::IoStoreEntry;
use crate::pak::PakEntry;

/// A single independently-compressed/encrypted unit of an entry's data.
/// Computed from the entry, never stored verbatim on disk.
#[derive(Debug, Clone)]
pub struct CompressionBlock {
    pub compressed_offset: u64,
    pub compressed_size: u32,
    pub uncompressed_offset: u64,
    pub uncompressed_size: u32,
    /// Empty string means uncompressed.
    pub method: String,
}

/// One level of variant, per the design notes: no deep entry hierarchy.
#[derive(Debug, Clone)]
pub enum AssetEntry {
    Pak {
        entry: PakEntry,
        container_path: PathBuf,
    },
    IoStore {
        entry: IoStoreEntry,
        container_path: PathBuf,
    },
}

impl AssetEntry {
    pub fn path(&self) -> &str {
        match self {
            AssetEntry::Pak { entry, .. } => &entry.path,
            AssetEntry::IoStore { entry, .. } => &entry.path,
        }
    }

    pub fn size(&self) -> u64 {
        match self {
            AssetEntry::Pak { entry, .. } => entry.uncompressed_size,
            AssetEntry::IoStore { entry, .. } => entry.size,
        }
    }

    pub fn container_path(&self) -> &Path {
        match self {
            AssetEntry::Pak { container_path, .. } => container_path,
            AssetEntry::IoStore { container_path, .. } => container_path,
        }
    }

    pub fn offset(&self) -> u64 {
        match self {
            AssetEntry::Pak { entry, .. } => entry.offset,
            AssetEntry::IoStore { entry, .. } => entry.offset,
        }
    }
}
