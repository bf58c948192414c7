//! Mounted container (C2) — one backing data file opened once and shared
//! read-only across every stream derived from it.
//!
//! Prefers a memory map ([`memmap2::Mmap`]) since a working set of gigabytes
//! easily exceeds process memory and containers are read far more than they
//! are opened. Falls back to positional `pread`-style reads when mapping
//! the file fails (empty files, unusual filesystems) — this is a runtime
//! branch, not a feature flag, so a single build always works.

use std::fs::File;
#[cfg(unix)]
use std::os::unix::fs::FileExt;
use std::path::{Path, PathBuf};

use memmap2::Mmap;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ContainerError {
    #[error("I/O error opening {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("read of {wanted} bytes at offset {offset} exceeds container length {len}")]
    OutOfRange {
        offset: u64,
        wanted: usize,
        len: u64,
    },
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

enum Backing {
    Mapped(Mmap),
    File(File),
}

/// A single mounted data file (`.pak` or `.ucas`), shared by every block
/// provider reading from it.
///
/// `read` is a pure positional read — it never mutates shared state, so it
/// is safe to call from multiple threads concurrently regardless of which
/// backing strategy was selected.
pub struct MountedContainer {
    path: PathBuf,
    len: u64,
    backing: Backing,
}

impl MountedContainer {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, ContainerError> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path).map_err(|source| ContainerError::Open {
            path: path.clone(),
            source,
        })?;
        let len = file
            .metadata()
            .map_err(|source| ContainerError::Open {
                path: path.clone(),
                source,
            })?
            .len();

        // mmap of a zero-length file is an error on every platform; fall
        // back to the file handle directly in that case too.
        let backing = if len == 0 {
            Backing::File(file)
        } else {
            match unsafe { Mmap::map(&file) } {
                Ok(mmap) => Backing::Mapped(mmap),
                Err(_) => Backing::File(file),
            }
        };

        Ok(Self { path, len, backing })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Fill `buf` entirely with the bytes at `offset`. Positional and
    /// side-effect free — safe to call concurrently from many threads.
    pub fn read(&self, offset: u64, buf: &mut [u8]) -> Result<(), ContainerError> {
        let end = offset
            .checked_add(buf.len() as u64)
            .ok_or(ContainerError::OutOfRange {
                offset,
                wanted: buf.len(),
                len: self.len,
            })?;
        if end > self.len {
            return Err(ContainerError::OutOfRange {
                offset,
                wanted: buf.len(),
                len: self.len,
            });
        }

        match &self.backing {
            Backing::Mapped(mmap) => {
                let start = offset as usize;
                buf.copy_from_slice(&mmap[start..start + buf.len()]);
                Ok(())
            }
            Backing::File(file) => {
                #[cfg(unix)]
                {
                    file.read_exact_at(buf, offset)?;
                    Ok(())
                }
                #[cfg(not(unix))]
                {
                    use std::io::{Read, Seek, SeekFrom};
                    let mut f = file.try_clone()?;
                    f.seek(SeekFrom::Start(offset))?;
                    f.read_exact(buf)?;
                    Ok(())
                }
            }
        }
    }

    /// Borrow a slice directly when the container is memory-mapped; returns
    /// `None` for the file-handle fallback, in which case callers must use
    /// [`MountedContainer::read`] into an owned buffer instead.
    pub fn as_slice(&self, offset: u64, len: usize) -> Option<&[u8]> {
        match &self.backing {
            Backing::Mapped(mmap) => {
                let start = offset as usize;
                let end = start.checked_add(len)?;
                if end as u64 > self.len {
                    return None;
                }
                Some(&mmap[start..end])
            }
            Backing::File(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn read_back_written_bytes() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(b"hello, container").unwrap();
        f.flush().unwrap();

        let mc = MountedContainer::open(f.path()).unwrap();
        assert_eq!(mc.len(), 16);
        let mut buf = [0u8; 5];
        mc.read(7, &mut buf).unwrap();
        assert_eq!(&buf, b"conta");
    }

    #[test]
    fn out_of_range_read_fails() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(b"short").unwrap();
        f.flush().unwrap();

        let mc = MountedContainer::open(f.path()).unwrap();
        let mut buf = [0u8; 10];
        assert!(mc.read(0, &mut buf).is_err());
    }

    #[test]
    fn empty_file_uses_fallback_backing() {
        let f = tempfile::NamedTempFile::new().unwrap();
        let mc = MountedContainer::open(f.path()).unwrap();
        assert_eq!(mc.len(), 0);
    }
}
