use crate::{
    error::{Error, Result},
    manifest::RawVersionMetadata,
    util::write_atomic,
};
use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
    sync::{Mutex, PoisonError},
};

/// Raw version documents keyed by id. Published ids never change, so an
/// entry is valid for as long as it exists.
pub trait MetadataCache: Send + Sync {
    fn get(&self, id: &str) -> Result<Option<RawVersionMetadata>>;
    fn put(&self, metadata: &RawVersionMetadata) -> Result<()>;
}

#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: Mutex<HashMap<String, RawVersionMetadata>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }
}

impl MetadataCache for MemoryCache {
    fn get(&self, id: &str) -> Result<Option<RawVersionMetadata>> {
        Ok(self
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned())
    }

    fn put(&self, metadata: &RawVersionMetadata) -> Result<()> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(metadata.id.clone(), metadata.clone());

        Ok(())
    }
}

/// `versions/<id>/<id>.json` under a root directory, fronted by memory.
#[derive(Debug)]
pub struct DiskCache {
    root: PathBuf,
    memory: MemoryCache,
}

impl DiskCache {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            memory: MemoryCache::new(),
        }
    }

    pub fn path_for(&self, id: &str) -> PathBuf {
        version_json_path(&self.root, id)
    }
}

pub fn version_json_path(root: &Path, id: &str) -> PathBuf {
    root.join("versions").join(id).join(format!("{id}.json"))
}

impl MetadataCache for DiskCache {
    fn get(&self, id: &str) -> Result<Option<RawVersionMetadata>> {
        if let Some(hit) = self.memory.get(id)? {
            return Ok(Some(hit));
        }

        let path = self.path_for(id);

        if !path.exists() {
            return Ok(None);
        }

        let text = fs::read_to_string(&path).map_err(|e| Error::io(&path, e))?;

        match serde_json::from_str::<RawVersionMetadata>(&text) {
            Ok(metadata) => {
                self.memory.put(&metadata)?;
                Ok(Some(metadata))
            }

            Err(e) => {
                log::warn!("Ignoring unreadable cached metadata at {path:?}: {e}");
                Ok(None)
            }
        }
    }

    fn put(&self, metadata: &RawVersionMetadata) -> Result<()> {
        let path = self.path_for(&metadata.id);

        write_atomic(&path, &serde_json::to_vec_pretty(metadata)?)?;

        log::debug!("Cached metadata for {} at {path:?}", metadata.id);

        self.memory.put(metadata)
    }
}
