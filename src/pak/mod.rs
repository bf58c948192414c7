//! PAK index decoder (C3a).
//!
//! Parses the trailer, the (possibly encrypted) index payload, and the
//! directory index into a flat list of [`entry::PakEntry`] values. Every
//! partial-read path here uses the cursor's `try_*` forms: a truncated or
//! malformed container is reported as a typed [`PakError`], never a panic,
//! so [`crate::registry`] can skip it and keep the rest of the mount going.

pub mod entry;
pub mod trailer;

pub use entry::PakEntry;
pub use trailer::PakTrailerCodec;

use thiserror::Error;

use crate::crypto::{self, CryptoError};
use crate::cursor::Cursor;

#[derive(Error, Debug)]
pub enum PakError {
    #[error("no recognised PAK trailer found in this file")]
    NoTrailer,
    #[error("archive index is truncated or malformed")]
    Truncated,
    #[error("archive does not carry a full directory index (has_full_directory_index = false)")]
    UnsupportedLayout,
    #[error("entry references compression method index {0}, which is not in the archive's method table")]
    UnknownCompressionMethodIndex(u32),
    #[error("index is encrypted but no key was supplied")]
    MissingKey,
    #[error(transparent)]
    Crypto(#[from] CryptoError),
}

#[derive(Debug, Clone)]
pub struct PakInfo {
    pub version: u32,
    pub mount_point: String,
    pub index_offset: u64,
    pub index_size: u64,
    pub is_index_encrypted: bool,
    pub compression_methods: Vec<String>,
}

/// Decode a whole PAK file's index given its full byte contents and an
/// optional AES key (required only if the trailer reports an encrypted
/// index). Returns the container metadata and every entry it could parse.
///
/// `custom_trailer`, when supplied, is tried before the standard trailer
/// probe — the profile hook for game-specific footer layouts (§9).
pub fn decode_index(
    file_bytes: &[u8],
    aes_key: Option<&[u8; 32]>,
    custom_trailer: Option<&dyn PakTrailerCodec>,
) -> Result<(PakInfo, Vec<PakEntry>), PakError> {
    let (footer, _matched_size) =
        trailer::probe_with_custom(file_bytes, custom_trailer).ok_or(PakError::NoTrailer)?;

    if footer.is_index_encrypted && aes_key.is_none() {
        return Err(PakError::MissingKey);
    }

    let read_len = if footer.is_index_encrypted {
        crypto::align16(footer.index_size) as usize
    } else {
        footer.index_size as usize
    };
    let start = footer.index_offset as usize;
    let end = start
        .checked_add(read_len)
        .filter(|&e| e <= file_bytes.len())
        .ok_or(PakError::Truncated)?;

    let mut index_bytes = file_bytes[start..end].to_vec();
    if footer.is_index_encrypted {
        crypto::decrypt_in_place(&mut index_bytes, aes_key.expect("checked above"))?;
    }
    index_bytes.truncate(footer.index_size as usize);

    let mut c = Cursor::new(&index_bytes);

    let mount_point = c
        .try_fstring()
        .ok_or(PakError::Truncated)?
        .map_err(|_| PakError::Truncated)?;
    let mount_point = strip_mount_prefix(&mount_point);

    let _entry_count = c.try_i32().ok_or(PakError::Truncated)?;
    c.advance(8).map_err(|_| PakError::Truncated)?; // path-hash seed

    let has_path_hash_index = c.try_i32().ok_or(PakError::Truncated)? != 0;
    if has_path_hash_index {
        c.advance(8 + 8 + 20).map_err(|_| PakError::Truncated)?;
    }

    let has_full_directory_index = c.try_i32().ok_or(PakError::Truncated)? != 0;
    if !has_full_directory_index {
        return Err(PakError::UnsupportedLayout);
    }

    let directory_index_offset = c.try_i64().ok_or(PakError::Truncated)? as u64;
    let directory_index_size = c.try_i64().ok_or(PakError::Truncated)? as u64;
    c.advance(20).map_err(|_| PakError::Truncated)?; // directory index hash

    let encoded_entries_size = c.try_i32().ok_or(PakError::Truncated)? as usize;
    let encoded_entries = c.try_take(encoded_entries_size).ok_or(PakError::Truncated)?;

    let directory_bytes = read_directory_index_region(
        file_bytes,
        directory_index_offset,
        directory_index_size,
        footer.is_index_encrypted,
        aes_key,
    )?;

    let entries_by_path = decode_directory_index(&directory_bytes)?;

    let mut entries = Vec::with_capacity(entries_by_path.len());
    for (path, record_offset) in entries_by_path {
        match entry::decode_entry(
            encoded_entries,
            record_offset as usize,
            path,
            &footer.compression_methods,
        ) {
            Ok(e) => entries.push(e),
            Err(_) => continue, // skip the one bad record, keep the rest
        }
    }

    let info = PakInfo {
        version: footer.version,
        mount_point,
        index_offset: footer.index_offset,
        index_size: footer.index_size,
        is_index_encrypted: footer.is_index_encrypted,
        compression_methods: footer.compression_methods,
    };

    Ok((info, entries))
}

fn strip_mount_prefix(mount_point: &str) -> String {
    mount_point.strip_prefix("../../../").unwrap_or(mount_point).to_owned()
}

fn read_directory_index_region(
    file_bytes: &[u8],
    offset: u64,
    size: u64,
    encrypted: bool,
    aes_key: Option<&[u8; 32]>,
) -> Result<Vec<u8>, PakError> {
    let start = offset as usize;

    // Aligned read first, per §9's resolved open question; fall back to an
    // unaligned read if the aligned attempt doesn't parse.
    let aligned_len = if encrypted { crypto::align16(size) as usize } else { size as usize };
    if let Some(region) = try_read_region(file_bytes, start, aligned_len, encrypted, aes_key, size as usize) {
        return Ok(region);
    }
    if encrypted {
        if let Some(region) = try_read_region(file_bytes, start, size as usize, encrypted, aes_key, size as usize) {
            return Ok(region);
        }
    }
    Err(PakError::Truncated)
}

fn try_read_region(
    file_bytes: &[u8],
    start: usize,
    read_len: usize,
    encrypted: bool,
    aes_key: Option<&[u8; 32]>,
    logical_len: usize,
) -> Option<Vec<u8>> {
    let end = start.checked_add(read_len)?;
    if end > file_bytes.len() {
        return None;
    }
    let mut region = file_bytes[start..end].to_vec();
    if encrypted {
        let key = aes_key?;
        crypto::decrypt_in_place(&mut region, key).ok()?;
    }
    region.truncate(logical_len.min(region.len()));
    Some(region)
}

/// Decode the directory index: a map from directory name to a map from
/// filename to the byte offset of that file's encoded entry record.
/// Flattened here into `(full_path, record_offset)` pairs.
fn decode_directory_index(data: &[u8]) -> Result<Vec<(String, u32)>, PakError> {
    let mut c = Cursor::new(data);
    let dir_count = c.try_i32().ok_or(PakError::Truncated)?;
    if dir_count < 0 {
        return Err(PakError::Truncated);
    }

    let mut out = Vec::new();
    for _ in 0..dir_count {
        let dir_name = c
            .try_fstring()
            .ok_or(PakError::Truncated)?
            .map_err(|_| PakError::Truncated)?;
        let file_count = c.try_i32().ok_or(PakError::Truncated)?;
        if file_count < 0 {
            return Err(PakError::Truncated);
        }
        for _ in 0..file_count {
            let file_name = c
                .try_fstring()
                .ok_or(PakError::Truncated)?
                .map_err(|_| PakError::Truncated)?;
            let record_offset = c.try_u32().ok_or(PakError::Truncated)?;
            let full_path = join_path(&dir_name, &file_name);
            out.push((full_path, record_offset));
        }
    }
    Ok(out)
}

fn join_path(dir: &str, file: &str) -> String {
    if dir.is_empty() || dir == "/" {
        file.trim_start_matches('/').to_owned()
    } else {
        format!("{}/{}", dir.trim_end_matches('/'), file.trim_start_matches('/'))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_fstring(buf: &mut Vec<u8>, s: &str) {
        let mut bytes = s.as_bytes().to_vec();
        bytes.push(0);
        buf.extend_from_slice(&(bytes.len() as i32).to_le_bytes());
        buf.extend_from_slice(&bytes);
    }

    fn build_directory_index(entries: &[(&str, &str, u32)]) -> Vec<u8> {
        use std::collections::BTreeMap;
        let mut by_dir: BTreeMap<&str, Vec<(&str, u32)>> = BTreeMap::new();
        for &(dir, file, off) in entries {
            by_dir.entry(dir).or_default().push((file, off));
        }
        let mut buf = Vec::new();
        buf.extend_from_slice(&(by_dir.len() as i32).to_le_bytes());
        for (dir, files) in by_dir {
            write_fstring(&mut buf, dir);
            buf.extend_from_slice(&(files.len() as i32).to_le_bytes());
            for (file, off) in files {
                write_fstring(&mut buf, file);
                buf.extend_from_slice(&off.to_le_bytes());
            }
        }
        buf
    }

    #[test]
    fn decodes_simple_directory_index() {
        let dir_bytes = build_directory_index(&[("models", "cube.uasset", 0), ("models", "sphere.uasset", 64)]);
        let decoded = decode_directory_index(&dir_bytes).unwrap();
        assert_eq!(decoded.len(), 2);
        assert!(decoded.iter().any(|(p, o)| p == "models/cube.uasset" && *o == 0));
        assert!(decoded.iter().any(|(p, o)| p == "models/sphere.uasset" && *o == 64));
    }

    #[test]
    fn strips_parent_prefix_from_mount_point() {
        assert_eq!(strip_mount_prefix("../../../MyGame/"), "MyGame/");
        assert_eq!(strip_mount_prefix("MyGame/"), "MyGame/");
    }
}
