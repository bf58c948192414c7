//! Container registry (C6): mounts every container under a root directory
//! once, aggregates their entries, and owns the lifetime of every
//! [`MountedContainer`] handed out to streams.
//!
//! `mount()` is idempotent and safe to call from multiple threads — the
//! first caller does the work under [`parking_lot::Mutex`], everyone else
//! observes the same frozen result. Once mounted, all lookups are
//! lock-free: `entries()`/`mounted_container()` read an already-built,
//! immutable [`Mounted`] snapshot.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};

use parking_lot::Mutex;
use thiserror::Error;
use walkdir::WalkDir;

use crate::block_provider::BlockProvider;
use crate::container::MountedContainer;
use crate::entry::AssetEntry;
use crate::iostore::toc::ChunkId;
use crate::iostore::IoStoreToc;
use crate::pak::PakEntry;
use crate::profile::{MountConfig, ReaderProfile};
use crate::stream::AssetStream;

#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("mount root {0} does not exist or is not a directory")]
    RootMissing(PathBuf),
    #[error("I/O error enumerating {0}: {1}")]
    Enumerate(PathBuf, #[source] std::io::Error),
}

/// The IO Store side of a mount: the decoded TOC shared by every entry it
/// produced, and the data-partition files (`.ucas`, plus `_s1.ucas`,
/// `_s2.ucas`, ... for multi-partition containers) backing it.
struct IoStoreMount {
    toc: Arc<IoStoreToc>,
    partitions: Vec<Arc<MountedContainer>>,
}

struct Mounted {
    entries: Vec<AssetEntry>,
    pak_containers: HashMap<PathBuf, Arc<MountedContainer>>,
    iostore_mounts: HashMap<PathBuf, IoStoreMount>,
    script_object_index: HashMap<u64, ChunkId>,
}

pub struct ContainerRegistry {
    config: MountConfig,
    profile: ReaderProfile,
    mount_lock: Mutex<()>,
    mounted: OnceLock<Mounted>,
}

impl ContainerRegistry {
    pub fn new(config: MountConfig, profile: ReaderProfile) -> Self {
        Self {
            config,
            profile,
            mount_lock: Mutex::new(()),
            mounted: OnceLock::new(),
        }
    }

    /// Mount every container under `config.paks_path`. Idempotent: a second
    /// call is a no-op. Fails only if the root directory itself is
    /// missing — per-container decode failures are logged and skipped.
    pub fn mount(&self) -> Result<(), RegistryError> {
        if self.mounted.get().is_some() {
            return Ok(());
        }
        let _guard = self.mount_lock.lock();
        if self.mounted.get().is_some() {
            return Ok(());
        }

        if !self.config.paks_path.is_dir() {
            return Err(RegistryError::RootMissing(self.config.paks_path.clone()));
        }

        let mut entries = Vec::new();
        let mut pak_containers = HashMap::new();
        let mut iostore_mounts = HashMap::new();
        let mut script_object_index = HashMap::new();

        let mut pak_paths = Vec::new();
        let mut utoc_paths = Vec::new();
        let mut global_utoc = None;

        for entry in WalkDir::new(&self.config.paks_path)
            .follow_links(true)
            .into_iter()
            .filter_map(|e| e.ok())
        {
            if !entry.file_type().is_file() {
                continue;
            }
            let path = entry.path();
            match path.extension().and_then(|e| e.to_str()) {
                Some("pak") => pak_paths.push(path.to_path_buf()),
                Some("utoc") => {
                    if path.file_name().and_then(|n| n.to_str()) == Some("global.utoc") {
                        global_utoc = Some(path.to_path_buf());
                    } else {
                        utoc_paths.push(path.to_path_buf());
                    }
                }
                _ => {}
            }
        }

        for pak_path in pak_paths {
            match self.mount_pak(&pak_path) {
                Ok((container, pak_entries)) => {
                    pak_containers.insert(pak_path.clone(), Arc::new(container));
                    let container = pak_containers[&pak_path].clone();
                    entries.extend(pak_entries.into_iter().map(|entry| AssetEntry::Pak {
                        entry,
                        container_path: pak_path.clone(),
                    }));
                    let _ = container; // kept alive via pak_containers map
                }
                Err(e) => {
                    tracing::warn!(container = %pak_path.display(), error = %e, "failed to mount PAK container, skipping");
                }
            }
        }

        for utoc_path in utoc_paths {
            match self.mount_iostore(&utoc_path) {
                Ok((ucas_path, toc, partitions, toc_entries)) => {
                    let toc = Arc::new(toc);
                    for p in &partitions {
                        pak_containers.entry(p.path().to_path_buf()).or_insert_with(|| p.clone());
                    }
                    iostore_mounts.insert(ucas_path.clone(), IoStoreMount { toc, partitions });
                    entries.extend(toc_entries.into_iter().map(|entry| AssetEntry::IoStore {
                        entry,
                        container_path: ucas_path.clone(),
                    }));
                }
                Err(e) => {
                    tracing::warn!(container = %utoc_path.display(), error = %e, "failed to mount IO Store container, skipping");
                }
            }
        }

        if let Some(global_path) = global_utoc {
            match self.mount_iostore(&global_path) {
                Ok((_ucas_path, toc, _partitions, toc_entries)) => {
                    for e in &toc_entries {
                        script_object_index.insert(e.chunk_id.id, e.chunk_id);
                    }
                    tracing::debug!(entries = toc_entries.len(), "loaded global script-object index");
                    let _ = toc;
                }
                Err(e) => {
                    tracing::warn!(error = %e, "failed to load global.utoc script-object index, continuing without it");
                }
            }
        }

        let _ = self.mounted.set(Mounted {
            entries,
            pak_containers,
            iostore_mounts,
            script_object_index,
        });
        Ok(())
    }

    fn mount_pak(&self, path: &Path) -> Result<(MountedContainer, Vec<PakEntry>), Box<dyn std::error::Error>> {
        let container = MountedContainer::open(path)?;
        let file_bytes = read_full(&container)?;
        let (_info, entries) = crate::pak::decode_index(
            &file_bytes,
            self.config.aes_key.as_ref(),
            self.profile.custom_trailer(),
        )?;
        Ok((container, entries))
    }

    #[allow(clippy::type_complexity)]
    fn mount_iostore(
        &self,
        utoc_path: &Path,
    ) -> Result<
        (PathBuf, IoStoreToc, Vec<Arc<MountedContainer>>, Vec<crate::iostore::IoStoreEntry>),
        Box<dyn std::error::Error>,
    > {
        let utoc_bytes = fs::read(utoc_path)?;
        let (toc, toc_entries) = crate::iostore::decode_index(&utoc_bytes, self.config.aes_key.as_ref())?;

        let primary_ucas = utoc_path.with_extension("ucas");
        if !primary_ucas.is_file() {
            return Err(format!("no matching .ucas for {}", utoc_path.display()).into());
        }

        let mut partitions = vec![Arc::new(MountedContainer::open(&primary_ucas)?)];
        let stem = primary_ucas.file_stem().and_then(|s| s.to_str()).unwrap_or_default();
        let parent = primary_ucas.parent().unwrap_or_else(|| Path::new("."));
        for i in 1..toc.header.partition_count {
            let sibling = parent.join(format!("{stem}_s{i}.ucas"));
            if sibling.is_file() {
                partitions.push(Arc::new(MountedContainer::open(&sibling)?));
            }
        }

        Ok((primary_ucas, toc, partitions, toc_entries))
    }

    fn mounted(&self) -> &Mounted {
        self.mounted.get().expect("mount() must be called before reading the registry")
    }

    pub fn entries(&self) -> &[AssetEntry] {
        &self.mounted().entries
    }

    pub fn entries_matching<'a>(
        &'a self,
        predicate: impl Fn(&AssetEntry) -> bool + 'a,
    ) -> impl Iterator<Item = &'a AssetEntry> + 'a {
        self.mounted().entries.iter().filter(move |e| predicate(e))
    }

    pub fn find(&self, path: &str) -> Option<&AssetEntry> {
        self.mounted().entries.iter().find(|e| e.path() == path)
    }

    pub fn mounted_container(&self, data_path: &Path) -> Option<&MountedContainer> {
        self.mounted().pak_containers.get(data_path).map(Arc::as_ref)
    }

    pub fn script_object_index(&self) -> &HashMap<u64, ChunkId> {
        &self.mounted().script_object_index
    }

    /// Build a seekable stream over one entry's decoded contents.
    pub fn open_stream(&self, entry: &AssetEntry) -> Result<AssetStream, RegistryError> {
        let mounted = self.mounted();
        let provider = match entry {
            AssetEntry::Pak { entry: pak_entry, container_path } => {
                let container = mounted
                    .pak_containers
                    .get(container_path)
                    .cloned()
                    .ok_or_else(|| RegistryError::RootMissing(container_path.clone()))?;
                BlockProvider::for_pak_entry(container, pak_entry)
            }
            AssetEntry::IoStore { entry: io_entry, container_path } => {
                let mount = mounted
                    .iostore_mounts
                    .get(container_path)
                    .ok_or_else(|| RegistryError::RootMissing(container_path.clone()))?;
                BlockProvider::for_io_store_entry(mount.toc.clone(), mount.partitions.clone(), io_entry)
            }
        };
        Ok(AssetStream::new(provider, self.config.aes_key, self.profile.codec_resolver()))
    }
}

/// Read a mounted container's entire byte contents. Uses the zero-copy
/// mmap slice when available; falls back to a direct file read for the
/// (rare) file-handle backing case.
fn read_full(container: &MountedContainer) -> std::io::Result<Vec<u8>> {
    if let Some(slice) = container.as_slice(0, container.len() as usize) {
        Ok(slice.to_vec())
    } else {
        fs::read(container.path())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn mount_fails_on_missing_root() {
        let registry = ContainerRegistry::new(
            MountConfig { paks_path: PathBuf::from("/does/not/exist"), aes_key: None },
            ReaderProfile::new(),
        );
        assert!(matches!(registry.mount(), Err(RegistryError::RootMissing(_))));
    }

    #[test]
    fn mount_is_idempotent_and_skips_corrupt_containers() {
        let dir = tempfile::tempdir().unwrap();
        // one truncated, unparsable .pak
        let mut f = fs::File::create(dir.path().join("broken.pak")).unwrap();
        f.write_all(b"not a pak file").unwrap();

        let registry = ContainerRegistry::new(
            MountConfig { paks_path: dir.path().to_path_buf(), aes_key: None },
            ReaderProfile::new(),
        );
        registry.mount().unwrap();
        assert_eq!(registry.entries().len(), 0);

        // second mount is a no-op, same result
        registry.mount().unwrap();
        assert_eq!(registry.entries().len(), 0);
    }
}
