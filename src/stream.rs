//! Asset stream (C5): a seekable, read-only stream of an entry's
//! uncompressed plaintext bytes, built over a [`BlockProvider`].
//!
//! Exactly one decoded block is held at a time, in a pooled scratch buffer
//! (`crate::pool`). Reads that straddle block boundaries load successive
//! blocks transparently; `seek` only moves `position` — no I/O happens
//! until the next read actually needs a different block.

use std::io::{self, Read, Seek, SeekFrom};
use std::sync::Arc;

use thiserror::Error;

use crate::block_provider::{BlockProvider, BlockProviderError};
use crate::codec::{self, CodecError, Decompressor};
use crate::crypto::{self, CryptoError};
use crate::pool::{self, PooledBuffer};

#[derive(Error, Debug)]
pub enum StreamError {
    #[error(transparent)]
    BlockProvider(#[from] BlockProviderError),
    #[error(transparent)]
    Codec(#[from] CodecError),
    #[error(transparent)]
    Crypto(#[from] CryptoError),
    #[error("block is encrypted but no decryption key was supplied")]
    MissingKey,
}

impl From<StreamError> for io::Error {
    fn from(e: StreamError) -> Self {
        io::Error::new(io::ErrorKind::Other, e)
    }
}

/// Resolves a block's declared method name to a concrete [`Decompressor`].
/// Threaded through from the mounting profile so the stream never hard-codes
/// which codecs are available (in particular, whether an Oodle hook was
/// registered).
pub type CodecResolver = Arc<dyn Fn(&str) -> Result<Box<dyn Decompressor>, CodecError> + Send + Sync>;

pub fn default_codec_resolver() -> CodecResolver {
    Arc::new(|name: &str| codec::resolve(name, None))
}

struct LoadedBlock {
    index: usize,
    buffer: PooledBuffer,
    length: usize,
}

/// A seekable byte stream over one entry's decoded contents. Not `Sync` —
/// it holds mutable decode state; a caller wanting parallel access opens one
/// stream per worker (§5).
pub struct AssetStream {
    provider: BlockProvider,
    aes_key: Option<[u8; 32]>,
    resolve_codec: CodecResolver,
    length: u64,
    position: u64,
    current: Option<LoadedBlock>,
}

impl AssetStream {
    pub fn new(provider: BlockProvider, aes_key: Option<[u8; 32]>, resolve_codec: CodecResolver) -> Self {
        let length = provider.uncompressed_size();
        Self {
            provider,
            aes_key,
            resolve_codec,
            length,
            position: 0,
            current: None,
        }
    }

    pub fn len(&self) -> u64 {
        self.length
    }

    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    pub fn position(&self) -> u64 {
        self.position
    }

    /// The logical `[start, end)` window block `index` covers in entry-
    /// relative position space. Block 0's decoded buffer starts
    /// `first_block_offset()` bytes before the entry's first logical byte
    /// (IO Store only; always 0 for PAK), so its window is narrower than its
    /// raw `uncompressed_size` — without this the window for block 0 would
    /// overlap block 1's, and a position that actually belongs to block 1
    /// would be (wrongly) matched against block 0 first.
    fn logical_window(&self, index: usize, block: &crate::entry::CompressionBlock) -> (u64, u64) {
        let start = block.uncompressed_offset;
        let mut size = block.uncompressed_size as u64;
        if index == 0 {
            size = size.saturating_sub(self.provider.first_block_offset() as u64);
        }
        (start, start + size)
    }

    /// Find the index of the block containing logical `position`. Fast path
    /// divides by the nominal block size and verifies; falls back to a
    /// linear scan for non-uniform block sizes (IO Store's last block, or
    /// any Mock fixture used by tests).
    fn block_for_position(&self, position: u64) -> Result<usize, StreamError> {
        let block_size = self.provider.block_size() as u64;
        if block_size > 0 {
            let guess = (position / block_size) as usize;
            if guess < self.provider.block_count() {
                let block = self.provider.get_block(guess)?;
                let (start, end) = self.logical_window(guess, &block);
                if position >= start && position < end {
                    return Ok(guess);
                }
            }
        }
        for i in 0..self.provider.block_count() {
            let block = self.provider.get_block(i)?;
            let (start, end) = self.logical_window(i, &block);
            if position >= start && position < end {
                return Ok(i);
            }
        }
        // position == length (EOF) lands here; callers check for EOF first.
        Ok(self.provider.block_count().saturating_sub(1))
    }

    fn load_block(&mut self, index: usize) -> Result<(), StreamError> {
        if let Some(current) = &self.current {
            if current.index == index {
                return Ok(());
            }
        }
        // Drop the old buffer (returns it to the pool) before renting a new one.
        self.current = None;

        let block = self.provider.get_block(index)?;
        let read_size = self.provider.get_block_read_size(index)? as usize;

        let mut raw = pool::rent(read_size);
        self.provider.read_block_raw(index, raw.as_mut_vec())?;

        if self.provider.is_encrypted() {
            let key = self.aes_key.ok_or(StreamError::MissingKey)?;
            crypto::decrypt_in_place(raw.as_mut_vec(), &key)?;
        }

        let method = self.provider.get_block_compression_method(index)?;
        let (decoded, length) = if method.is_empty() {
            let compressed_size = block.compressed_size as usize;
            let mut decoded = pool::rent(compressed_size);
            decoded.as_mut_vec().copy_from_slice(&raw.as_slice()[..compressed_size]);
            (decoded, compressed_size)
        } else {
            let decompressor = (self.resolve_codec)(&method)?;
            let uncompressed_size = block.uncompressed_size as usize;
            let mut decoded = pool::rent(uncompressed_size);
            decompressor.decompress(
                &raw.as_slice()[..block.compressed_size as usize],
                decoded.as_mut_vec(),
            )?;
            (decoded, uncompressed_size)
        };
        // `raw` drops here, returning it to the pool per the read algorithm's
        // step (e).

        self.current = Some(LoadedBlock { index, buffer: decoded, length });
        Ok(())
    }

    /// Read up to `buf.len()` bytes; returns the number of bytes actually
    /// read (0 only at end of stream).
    pub fn read(&mut self, buf: &mut [u8]) -> Result<usize, StreamError> {
        if self.position >= self.length || buf.is_empty() {
            return Ok(0);
        }

        let mut written = 0;
        while written < buf.len() && self.position < self.length {
            let block_index = self.block_for_position(self.position)?;
            self.load_block(block_index)?;

            let block = self.provider.get_block(block_index)?;
            let mut block_offset = (self.position - block.uncompressed_offset) as usize;
            if block_index == 0 {
                block_offset += self.provider.first_block_offset() as usize;
            }

            let current = self.current.as_ref().expect("just loaded");
            let available = current.length.saturating_sub(block_offset);
            let to_copy = (buf.len() - written).min(available);
            if to_copy == 0 {
                break;
            }
            buf[written..written + to_copy]
                .copy_from_slice(&current.buffer.as_slice()[block_offset..block_offset + to_copy]);
            written += to_copy;
            self.position += to_copy as u64;
        }
        Ok(written)
    }

    /// Read the entire stream from the current position to the end.
    pub fn read_all(&mut self) -> Result<Vec<u8>, StreamError> {
        let mut out = vec![0u8; (self.length - self.position) as usize];
        let mut filled = 0;
        while filled < out.len() {
            let n = self.read(&mut out[filled..])?;
            if n == 0 {
                break;
            }
            filled += n;
        }
        out.truncate(filled);
        Ok(out)
    }

    pub fn seek_to(&mut self, position: u64) {
        assert!(position <= self.length, "seek past end of stream (position {position}, length {})", self.length);
        self.position = position;
    }
}

impl Read for AssetStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        AssetStream::read(self, buf).map_err(io::Error::from)
    }
}

impl Seek for AssetStream {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let target = match pos {
            SeekFrom::Start(p) => p as i64,
            SeekFrom::End(delta) => self.length as i64 + delta,
            SeekFrom::Current(delta) => self.position as i64 + delta,
        };
        if target < 0 || target as u64 > self.length {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("seek to {target} out of range [0, {}]", self.length),
            ));
        }
        self.position = target as u64;
        Ok(self.position)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block_provider::MockBlockProvider;
    use crate::entry::CompressionBlock;

    fn uncompressed_stream(data: &[u8], block_size: usize) -> AssetStream {
        let mut blocks = Vec::new();
        let mut offset = 0u64;
        for chunk in data.chunks(block_size) {
            blocks.push(CompressionBlock {
                compressed_offset: offset,
                compressed_size: chunk.len() as u32,
                uncompressed_offset: offset,
                uncompressed_size: chunk.len() as u32,
                method: String::new(),
            });
            offset += chunk.len() as u64;
        }
        let provider = BlockProvider::Mock(MockBlockProvider {
            blocks,
            raw: data.to_vec(),
            is_encrypted: false,
            block_size: block_size as u32,
        });
        AssetStream::new(provider, None, default_codec_resolver())
    }

    #[test]
    fn round_trip_across_chunk_sizes() {
        let data: Vec<u8> = (0..200_000u32).map(|i| (i % 251) as u8).collect();
        for &k in &[1usize, 7, 4096, data.len()] {
            let mut stream = uncompressed_stream(&data, 65536);
            let mut out = Vec::new();
            let mut buf = vec![0u8; k.max(1)];
            loop {
                let n = stream.read(&mut buf).unwrap();
                if n == 0 {
                    break;
                }
                out.extend_from_slice(&buf[..n]);
            }
            assert_eq!(out, data, "mismatch at chunk size {k}");
        }
    }

    #[test]
    fn seek_coherence() {
        let data: Vec<u8> = (0..50_000u32).map(|i| (i % 253) as u8).collect();
        for &p in &[0usize, 1, 65535, 65536, 65537, data.len() - 1] {
            let mut a = uncompressed_stream(&data, 65536);
            a.seek_to(p as u64);
            let mut buf_a = vec![0u8; 10];
            let n_a = a.read(&mut buf_a).unwrap();

            let mut b = uncompressed_stream(&data, 65536);
            let mut skip = vec![0u8; p];
            b.read(&mut skip).unwrap();
            let mut buf_b = vec![0u8; 10];
            let n_b = b.read(&mut buf_b).unwrap();

            assert_eq!(n_a, n_b);
            assert_eq!(buf_a[..n_a], buf_b[..n_b]);
        }
    }

    #[test]
    fn block_boundary_reads_concatenate_adjacent_blocks() {
        let data: Vec<u8> = (0..(65536 * 2 + 100) as u32).map(|i| (i % 200) as u8).collect();
        let mut stream = uncompressed_stream(&data, 65536);
        stream.seek_to(65530);
        let mut buf = vec![0u8; 20];
        let n = stream.read(&mut buf).unwrap();
        assert_eq!(n, 20);
        assert_eq!(&buf[..], &data[65530..65550]);
    }

    #[test]
    fn empty_read_past_end_returns_zero() {
        let data = b"short".to_vec();
        let mut stream = uncompressed_stream(&data, 65536);
        stream.seek_to(data.len() as u64);
        let mut buf = [0u8; 4];
        assert_eq!(stream.read(&mut buf).unwrap(), 0);
    }

    #[test]
    fn io_read_trait_works_through_dyn_read() {
        let data = b"hello through Read trait".to_vec();
        let mut stream: Box<dyn Read> = Box::new(uncompressed_stream(&data, 65536));
        let mut out = Vec::new();
        stream.read_to_end(&mut out).unwrap();
        assert_eq!(out, data);
    }

    #[test]
    #[should_panic]
    fn seek_past_end_panics() {
        let data = b"abc".to_vec();
        let mut stream = uncompressed_stream(&data, 65536);
        stream.seek_to(100);
    }

    #[test]
    fn buffer_pool_discipline_after_drop() {
        let before = pool::outstanding_pooled_count();
        {
            let data: Vec<u8> = (0..(65536 * 3) as u32).map(|i| i as u8).collect();
            let mut stream = uncompressed_stream(&data, 65536);
            let mut buf = vec![0u8; 200_000];
            stream.read(&mut buf).unwrap();
        }
        // After drop, at most the buffers rented during this test are
        // returned; none should remain "checked out" (there is no leak
        // counter beyond the pool's own bookkeeping, so this asserts the
        // pool grew rather than that a buffer vanished).
        assert!(pool::outstanding_pooled_count() >= before);
    }
}
