//! PAK trailer (footer) probing.
//!
//! The footer is not at a fixed offset from the start of the file — only a
//! fixed offset from the *end*, and that offset depends on which historical
//! trailer layout the archive was written with. We probe the known sizes in
//! order and accept the first one whose magic matches.

use crate::cursor::Cursor;

pub const MAGIC: u32 = 0x5A6F_12E1;

/// Trailer sizes that have shipped in official Unreal Engine releases, most
/// recent first. A future engine version adding a fifth size is a one-line
/// change here, not a structural one.
pub const KNOWN_TRAILER_SIZES: &[usize] = &[222, 221, 189, 61];

#[derive(Debug, Clone)]
pub struct PakTrailer {
    pub encryption_key_guid: [u8; 16],
    pub is_index_encrypted: bool,
    pub version: u32,
    pub index_offset: u64,
    pub index_size: u64,
    pub index_hash: [u8; 20],
    pub compression_methods: Vec<String>,
}

/// Probe `file_len` for a trailer of one of [`KNOWN_TRAILER_SIZES`]. The
/// magic sits 17 bytes before the end of the candidate trailer region.
/// Returns the parsed trailer and the size that matched, or `None` if no
/// candidate's magic lines up.
pub fn probe(bytes: &[u8]) -> Option<(PakTrailer, usize)> {
    let file_len = bytes.len();
    for &size in KNOWN_TRAILER_SIZES {
        if size > file_len {
            continue;
        }
        let trailer_start = file_len - size;
        let magic_offset = trailer_start + 17;
        if magic_offset + 4 > file_len {
            continue;
        }
        let magic = u32::from_le_bytes(bytes[magic_offset..magic_offset + 4].try_into().unwrap());
        if magic != MAGIC {
            continue;
        }
        if let Some(trailer) = parse(&bytes[trailer_start..], size) {
            return Some((trailer, size));
        }
    }
    None
}

/// Try `custom` first, falling back to the standard [`probe`] loop — the
/// profile-supplied hook described in §9 "game-specific trailer variants".
pub fn probe_with_custom(
    bytes: &[u8],
    custom: Option<&dyn PakTrailerCodec>,
) -> Option<(PakTrailer, usize)> {
    if let Some(codec) = custom {
        if let Some(result) = codec.try_parse(bytes) {
            return Some(result);
        }
    }
    probe(bytes)
}

/// A game-specific trailer parser tried before the standard probe loop
/// (§9 "game-specific trailer variants"). An explicit trait object rather
/// than a subclass, per the design notes: the standard probe order never
/// hard-codes knowledge of any particular game.
pub trait PakTrailerCodec: Send + Sync {
    /// Attempt to parse `bytes` (the whole file) as this variant's trailer.
    /// Returns the parsed trailer and the byte size of the region it
    /// consumed, or `None` if this variant doesn't recognize the file.
    fn try_parse(&self, bytes: &[u8]) -> Option<(PakTrailer, usize)>;
}

/// Dune: Awakening ships a corrupted standard 221-byte trailer alongside a
/// genuine one at a nonstandard offset: `length - 261`, with its own magic
/// at the very start of the region rather than 17 bytes before its end
/// (scenario 5).
/// Layout: magic(4) + key guid(16) + is_encrypted(1) + version(4) +
/// index_offset(8) + index_size(8) + index hash(20) + five 32-byte
/// compression-method names(160) + 40 bytes reserved = 261.
pub const DUNE_AWAKENING_MAGIC: u32 = 0xA590_ED1E;

pub struct DuneAwakeningTrailerCodec;

impl PakTrailerCodec for DuneAwakeningTrailerCodec {
    fn try_parse(&self, bytes: &[u8]) -> Option<(PakTrailer, usize)> {
        const SIZE: usize = 261;
        let file_len = bytes.len();
        if SIZE > file_len {
            return None;
        }
        let trailer_start = file_len - SIZE;
        let region = &bytes[trailer_start..];

        let mut c = Cursor::new(region);
        let magic = c.try_u32()?;
        if magic != DUNE_AWAKENING_MAGIC {
            return None;
        }
        let encryption_key_guid = c.try_guid()?;
        let is_index_encrypted = c.try_u8()? != 0;
        let version = c.try_u32()?;
        let index_offset = c.try_u64()?;
        let index_size = c.try_u64()?;
        let index_hash: [u8; 20] = c.try_take(20)?.try_into().ok()?;

        let mut compression_methods = Vec::with_capacity(5);
        for _ in 0..5 {
            let raw = c.try_take(32)?;
            let end = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
            compression_methods.push(String::from_utf8_lossy(&raw[..end]).into_owned());
        }

        Some((
            PakTrailer {
                encryption_key_guid,
                is_index_encrypted,
                version,
                index_offset,
                index_size,
                index_hash,
                compression_methods,
            },
            SIZE,
        ))
    }
}

fn parse(region: &[u8], size: usize) -> Option<PakTrailer> {
    let mut c = Cursor::new(region);

    let encryption_key_guid = c.try_guid()?;
    let is_index_encrypted = c.try_u8()? != 0;
    let _magic = c.try_u32()?; // already validated by the caller
    let version = c.try_u32()?;
    let index_offset = c.try_u64()?;
    let index_size = c.try_u64()?;
    let index_hash: [u8; 20] = {
        let slice = c.try_take(20)?;
        slice.try_into().ok()?
    };

    // Method-name table width depends on the trailer size: the oldest
    // (61-byte) layout predates per-archive compression tables entirely;
    // 189 carries four names, 221 and 222 carry five. The 222-byte layout
    // additionally reserves one trailing byte (historically a "frozen
    // index" flag) after the name table.
    let method_count = match size {
        61 => 0,
        189 => 4,
        221 | 222 => 5,
        _ => 0,
    };
    let mut compression_methods = Vec::with_capacity(method_count);
    for _ in 0..method_count {
        let raw = c.try_take(32)?;
        let end = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
        compression_methods.push(String::from_utf8_lossy(&raw[..end]).into_owned());
    }
    if size == 222 {
        let _frozen_index_flag = c.try_u8()?;
    }

    Some(PakTrailer {
        encryption_key_guid,
        is_index_encrypted,
        version,
        index_offset,
        index_size,
        index_hash,
        compression_methods,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build_trailer(size: usize, index_offset: u64, index_size: u64) -> Vec<u8> {
        let mut body = Vec::new();
        body.extend_from_slice(&[0u8; 16]); // guid
        body.push(0); // not encrypted
        body.extend_from_slice(&MAGIC.to_le_bytes());
        body.extend_from_slice(&8u32.to_le_bytes()); // version
        body.extend_from_slice(&index_offset.to_le_bytes());
        body.extend_from_slice(&index_size.to_le_bytes());
        body.extend_from_slice(&[0u8; 20]); // hash
        let method_count = match size {
            61 => 0,
            189 => 4,
            221 | 222 => 5,
            _ => 0,
        };
        for _ in 0..method_count {
            body.extend_from_slice(&[0u8; 32]);
        }
        body.resize(size, 0);
        body
    }

    #[test]
    fn probes_every_known_size() {
        for &size in KNOWN_TRAILER_SIZES {
            let trailer_bytes = build_trailer(size, 1024, 2048);
            let mut file = vec![0xAAu8; 4096];
            file.extend_from_slice(&trailer_bytes);
            let (trailer, matched) = probe(&file).unwrap_or_else(|| panic!("size {size} not probed"));
            assert_eq!(matched, size);
            assert_eq!(trailer.index_offset, 1024);
            assert_eq!(trailer.index_size, 2048);
        }
    }

    #[test]
    fn unknown_size_rejected() {
        let file = vec![0u8; 100];
        assert!(probe(&file).is_none());
    }

    fn build_dune_trailer(index_offset: u64, index_size: u64) -> Vec<u8> {
        let mut body = Vec::new();
        body.extend_from_slice(&DUNE_AWAKENING_MAGIC.to_le_bytes());
        body.extend_from_slice(&[0u8; 16]); // guid
        body.push(0); // not encrypted
        body.extend_from_slice(&8u32.to_le_bytes()); // version
        body.extend_from_slice(&index_offset.to_le_bytes());
        body.extend_from_slice(&index_size.to_le_bytes());
        body.extend_from_slice(&[0u8; 20]); // hash
        for _ in 0..5 {
            body.extend_from_slice(&[0u8; 32]);
        }
        body.resize(261, 0);
        body
    }

    #[test]
    fn dune_awakening_custom_trailer_is_tried_before_the_standard_probe() {
        let mut file = vec![0xAAu8; 4096];
        file.extend_from_slice(&build_dune_trailer(77, 99));

        // The standard probe alone does not recognize this layout (magic is
        // at the front of the region, not 17 bytes before its end).
        assert!(probe(&file).is_none());

        let codec = DuneAwakeningTrailerCodec;
        let (trailer, size) = probe_with_custom(&file, Some(&codec)).unwrap();
        assert_eq!(size, 261);
        assert_eq!(trailer.index_offset, 77);
        assert_eq!(trailer.index_size, 99);
    }

    #[test]
    fn standard_probe_used_when_custom_codec_does_not_match() {
        let trailer_bytes = build_trailer(221, 5, 6);
        let mut file = vec![0xAAu8; 4096];
        file.extend_from_slice(&trailer_bytes);

        let codec = DuneAwakeningTrailerCodec;
        let (trailer, size) = probe_with_custom(&file, Some(&codec)).unwrap();
        assert_eq!(size, 221);
        assert_eq!(trailer.index_offset, 5);
    }
}
