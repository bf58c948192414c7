//! Mount configuration and the active profile (§6 "Configuration", §9
//! "Profile"): the external collaborator that supplies the AES key, the
//! decompressor hooks (including the optional Oodle function pointer), and
//! an optional game-specific PAK trailer codec. The core never constructs
//! one of these on its own — callers build a [`ReaderProfile`] and hand it
//! to [`crate::registry::ContainerRegistry::new`].

use std::sync::Arc;

use crate::codec::{CodecError, Decompressor, OodleFn};
use crate::pak::PakTrailerCodec;
use crate::stream::CodecResolver;

/// Root directory to scan recursively on `mount()`, plus the encryption key
/// shared by every container under it. Mirrors the teacher's `PackOptions`:
/// a plain data struct, no environment variables, no hidden state.
#[derive(Debug, Clone, Default)]
pub struct MountConfig {
    pub paks_path: std::path::PathBuf,
    pub aes_key: Option<[u8; 32]>,
}

/// Supplies the decoders' external collaborators: the decompressor
/// resolution function, the optional Oodle hook, and an optional
/// game-specific PAK trailer codec tried before the standard probe.
#[derive(Clone)]
pub struct ReaderProfile {
    oodle: Option<OodleFn>,
    custom_trailer: Option<Arc<dyn PakTrailerCodec>>,
}

impl Default for ReaderProfile {
    fn default() -> Self {
        Self {
            oodle: None,
            custom_trailer: None,
        }
    }
}

impl ReaderProfile {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a function pointer implementing Oodle decompression. Oodle
    /// is proprietary and has no bundled implementation in this crate
    /// (§1, §6) — without this hook, entries compressed with it fail with
    /// [`CodecError::OodleUnavailable`].
    pub fn with_oodle(mut self, oodle: OodleFn) -> Self {
        self.oodle = Some(oodle);
        self
    }

    /// Register a game-specific PAK trailer codec, tried before the
    /// standard trailer probe (§9).
    pub fn with_custom_trailer(mut self, codec: Arc<dyn PakTrailerCodec>) -> Self {
        self.custom_trailer = Some(codec);
        self
    }

    pub fn custom_trailer(&self) -> Option<&dyn PakTrailerCodec> {
        self.custom_trailer.as_deref()
    }

    pub fn resolve_decompressor(&self, method: &str) -> Result<Box<dyn Decompressor>, CodecError> {
        crate::codec::resolve(method, self.oodle)
    }

    /// A [`CodecResolver`] closure capturing this profile's Oodle hook, for
    /// handing to [`crate::stream::AssetStream::new`].
    pub fn codec_resolver(&self) -> CodecResolver {
        let oodle = self.oodle;
        Arc::new(move |name: &str| crate::codec::resolve(name, oodle))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_profile_has_no_oodle_hook() {
        let profile = ReaderProfile::new();
        assert!(matches!(
            profile.resolve_decompressor("Oodle"),
            Err(CodecError::OodleUnavailable)
        ));
    }

    #[test]
    fn registered_oodle_hook_is_used() {
        fn fake_oodle(input: &[u8], output: &mut [u8]) -> Result<(), String> {
            output.copy_from_slice(input);
            Ok(())
        }
        let profile = ReaderProfile::new().with_oodle(fake_oodle);
        let decompressor = profile.resolve_decompressor("Oodle").unwrap();
        let mut out = [0u8; 3];
        decompressor.decompress(b"abc", &mut out).unwrap();
        assert_eq!(&out, b"abc");
    }
}
