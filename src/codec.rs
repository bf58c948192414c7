//! Decompression seam (§6 `Decompressor`): method names are exact ASCII
//! strings taken straight from the container's compression-method table —
//! `"Zlib"`, `"Oodle"`, `"Zstd"` — not a frozen UUID. Index 0 / the empty
//! name both mean "no compression".
//!
//! `Oodle` is proprietary and has no available Rust binding; the registry
//! accepts an externally supplied function pointer for it (mirroring how
//! other open-source Unreal Engine readers treat Oodle — an optional
//! runtime hook, not a bundled implementation) and reports
//! [`CodecError::OodleUnavailable`] when none is registered.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CodecError {
    #[error("unknown compression method {0:?}")]
    UnknownMethod(String),
    #[error("Oodle decompression requested but no Oodle implementation is registered")]
    OodleUnavailable,
    #[error("decompression produced {produced} bytes, expected exactly {expected}")]
    SizeMismatch { produced: usize, expected: usize },
    #[error("decompression failed: {0}")]
    Failed(String),
}

pub type OodleFn = fn(&[u8], &mut [u8]) -> Result<(), String>;

/// A decompression method, resolved from the container's declared name.
pub trait Decompressor: Send + Sync {
    /// Fill `output` exactly; `output.len()` is the known uncompressed size.
    fn decompress(&self, input: &[u8], output: &mut [u8]) -> Result<(), CodecError>;
}

pub struct NoneDecompressor;
impl Decompressor for NoneDecompressor {
    fn decompress(&self, input: &[u8], output: &mut [u8]) -> Result<(), CodecError> {
        if input.len() != output.len() {
            return Err(CodecError::SizeMismatch {
                produced: input.len(),
                expected: output.len(),
            });
        }
        output.copy_from_slice(input);
        Ok(())
    }
}

pub struct ZlibDecompressor;
impl Decompressor for ZlibDecompressor {
    fn decompress(&self, input: &[u8], output: &mut [u8]) -> Result<(), CodecError> {
        let expected = output.len();
        let mut decoder = flate2::read::ZlibDecoder::new(input);
        let mut buf = output;
        let produced = std::io::copy(&mut decoder, &mut buf).map_err(|e| CodecError::Failed(e.to_string()))?;
        if produced != expected as u64 {
            return Err(CodecError::SizeMismatch {
                produced: produced as usize,
                expected,
            });
        }
        Ok(())
    }
}

pub struct ZstdDecompressor;
impl Decompressor for ZstdDecompressor {
    fn decompress(&self, input: &[u8], output: &mut [u8]) -> Result<(), CodecError> {
        let decoded =
            zstd::bulk::decompress(input, output.len()).map_err(|e| CodecError::Failed(e.to_string()))?;
        if decoded.len() != output.len() {
            return Err(CodecError::SizeMismatch {
                produced: decoded.len(),
                expected: output.len(),
            });
        }
        output.copy_from_slice(&decoded);
        Ok(())
    }
}

pub struct OodleDecompressor {
    pub implementation: Option<OodleFn>,
}
impl Decompressor for OodleDecompressor {
    fn decompress(&self, input: &[u8], output: &mut [u8]) -> Result<(), CodecError> {
        match self.implementation {
            Some(f) => f(input, output).map_err(CodecError::Failed),
            None => Err(CodecError::OodleUnavailable),
        }
    }
}

/// Resolve a method name declared by a container to a [`Decompressor`].
/// `oodle` is the profile's optional Oodle hook, threaded through so the
/// registry itself never hard-codes its availability.
pub fn resolve(name: &str, oodle: Option<OodleFn>) -> Result<Box<dyn Decompressor>, CodecError> {
    match name {
        "" | "None" => Ok(Box::new(NoneDecompressor)),
        "Zlib" => Ok(Box::new(ZlibDecompressor)),
        "Zstd" => Ok(Box::new(ZstdDecompressor)),
        "Oodle" => Ok(Box::new(OodleDecompressor {
            implementation: oodle,
        })),
        other => Err(CodecError::UnknownMethod(other.to_owned())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn none_passthrough() {
        let d = NoneDecompressor;
        let mut out = [0u8; 5];
        d.decompress(b"hello", &mut out).unwrap();
        assert_eq!(&out, b"hello");
    }

    #[test]
    fn zstd_roundtrip() {
        let data = b"the quick brown fox jumps over the lazy dog, repeated. ".repeat(8);
        let compressed = zstd::bulk::compress(&data, 3).unwrap();
        let mut out = vec![0u8; data.len()];
        ZstdDecompressor.decompress(&compressed, &mut out).unwrap();
        assert_eq!(out, data);
    }

    #[test]
    fn oodle_without_hook_errors() {
        let d = OodleDecompressor { implementation: None };
        let mut out = [0u8; 4];
        assert!(matches!(
            d.decompress(b"xxxx", &mut out),
            Err(CodecError::OodleUnavailable)
        ));
    }

    #[test]
    fn unknown_method_rejected() {
        assert!(matches!(
            resolve("Lz4HC", None),
            Err(CodecError::UnknownMethod(_))
        ));
    }
}
