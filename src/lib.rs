//! # uasset-vfs — core data-access engine for Unreal Engine containers
//!
//! Mounts legacy PAK archives and modern IO Store (`.utoc`/`.ucas`) pairs,
//! decodes their indices, and exposes every entry as a seekable stream of
//! uncompressed plaintext bytes. This crate does not parse package headers,
//! property trees, or schemas — it is the layer immediately below them.
//!
//! Guarantees:
//! - All on-disk data is little-endian; never negotiated.
//! - Index decoding never panics on malformed input — every partial-read
//!   path is a typed [`error::Error`], so [`registry::ContainerRegistry`]
//!   can skip one bad container and keep the rest of the mount going.
//! - [`container::MountedContainer`] is read-shared and lock-free once
//!   mounted; [`stream::AssetStream`] is not — one stream per worker thread.
//! - The crate never writes, mutates, or repacks a container.

pub mod block_provider;
pub mod codec;
pub mod container;
pub mod crypto;
pub mod cursor;
pub mod entry;
pub mod error;
pub mod iostore;
pub mod pak;
pub mod pool;
pub mod profile;
pub mod registry;
pub mod stream;

pub use block_provider::{BlockProvider, BlockProviderError};
pub use container::{ContainerError, MountedContainer};
pub use cursor::{Cursor, CursorError};
pub use entry::{AssetEntry, CompressionBlock};
pub use error::{Error, Result};
pub use profile::{MountConfig, ReaderProfile};
pub use registry::{ContainerRegistry, RegistryError};
pub use stream::{AssetStream, StreamError};
