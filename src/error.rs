//! Crate-wide error taxonomy.
//!
//! Three classes matter to a caller:
//! - structural rejection of a single container (non-fatal — the registry
//!   logs and skips it, see [`crate::registry`]);
//! - configuration errors (fatal — missing key, unknown compression method);
//! - I/O errors (fatal for the read in progress).
//!
//! Programming errors (disposed-stream reuse, out-of-range seek, double
//! release of a pooled buffer) are not part of this enum — they panic, per
//! the propagation policy for that error class.

use std::io;
use thiserror::Error;

use crate::{codec::CodecError, crypto::CryptoError, iostore::IoStoreError, pak::PakError};

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Pak(#[from] PakError),

    #[error(transparent)]
    IoStore(#[from] IoStoreError),

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error(transparent)]
    Crypto(#[from] CryptoError),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
