use crate::{
    cache::MetadataCache,
    error::{Error, Result},
    libraries::LibrarySpec,
    manifest::{Argument, AssetIndexRef, FileDownload, RawVersionMetadata},
    meta::ReleaseType,
    store::ManifestStore,
};
use std::{
    collections::{BTreeMap, HashMap, HashSet},
    sync::Arc,
};

/// A version with its whole `inheritsFrom` chain folded in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedVersion {
    pub id: String,
    /// Ids from root to leaf.
    pub chain: Vec<String>,
    pub release_type: Option<ReleaseType>,
    pub main_class: Option<String>,
    pub minimum_launcher_version: Option<u32>,
    pub libraries: Vec<LibrarySpec>,
    pub asset_index: Option<AssetIndexRef>,
    pub downloads: BTreeMap<String, FileDownload>,
    pub game_args: Vec<Argument>,
    pub jvm_args: Vec<Argument>,
}

pub struct VersionResolver<S, C> {
    store: Arc<S>,
    cache: C,
}

impl<S: ManifestStore, C: MetadataCache> VersionResolver<S, C> {
    pub fn new(store: Arc<S>, cache: C) -> Self {
        Self { store, cache }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn cache(&self) -> &C {
        &self.cache
    }

    /// Loads from cache first, then the store. The flag is true when the
    /// document came from the store.
    fn load(&self, id: &str) -> Result<(RawVersionMetadata, bool)> {
        if let Some(hit) = self.cache.get(id)? {
            log::debug!("Metadata cache hit for {id}");
            return Ok((hit, false));
        }

        Ok((self.store.fetch_metadata(id)?, true))
    }

    /// Loads every document from `id` up to its root, leaf first.
    pub fn load_chain(&self, id: &str) -> Result<Vec<RawVersionMetadata>> {
        let (leaf, fetched) = self.load(id).map_err(|e| match e {
            Error::NotFound(_) => Error::UnknownVersion(id.into()),
            other => other,
        })?;

        let mut seen = HashSet::from([id.to_string()]);
        let mut fresh = vec![fetched];
        let mut chain = vec![leaf];

        while let Some(parent) = chain.last().and_then(|v| v.inherits_from.clone()) {
            if !seen.insert(parent.clone()) {
                let mut ids: Vec<String> = chain.iter().map(|v| v.id.clone()).collect();

                ids.push(parent);
                return Err(Error::CyclicInheritance { chain: ids });
            }

            let child = chain.last().map(|v| v.id.clone()).unwrap_or_default();
            let (raw, fetched) = self.load(&parent).map_err(|e| {
                log::warn!("Failed to load {parent} (parent of {child}): {e}");

                Error::MissingAncestor {
                    id: child.clone(),
                    parent: parent.clone(),
                }
            })?;

            chain.push(raw);
            fresh.push(fetched);
        }

        for (raw, _) in chain.iter().zip(fresh).filter(|(_, fetched)| *fetched) {
            if let Err(e) = self.cache.put(raw) {
                log::warn!("Failed to cache metadata for {}: {e}", raw.id);
            }
        }

        Ok(chain)
    }

    pub fn resolve(&self, id: &str) -> Result<ResolvedVersion> {
        let mut chain = self.load_chain(id)?;

        chain.reverse();

        let resolved = merge(&chain)?;

        log::info!(
            "Resolved {} ({} in chain, {} libraries)",
            resolved.id,
            resolved.chain.len(),
            resolved.libraries.len()
        );

        Ok(resolved)
    }
}

/// Folds a root-to-leaf chain. Scalars are overridden by descendants that
/// set them. A library replaces the entries with the same identity that an
/// ancestor declared, taking the position of the first of them; entries
/// sharing an identity within one document are platform variants and are
/// all kept.
pub fn merge(chain: &[RawVersionMetadata]) -> Result<ResolvedVersion> {
    let mut resolved = ResolvedVersion {
        id: String::new(),
        chain: Vec::with_capacity(chain.len()),
        release_type: None,
        main_class: None,
        minimum_launcher_version: None,
        libraries: Vec::new(),
        asset_index: None,
        downloads: BTreeMap::new(),
        game_args: Vec::new(),
        jvm_args: Vec::new(),
    };

    let mut slots: Vec<Option<(usize, &LibrarySpec)>> = Vec::new();
    let mut by_identity = HashMap::<String, Vec<usize>>::new();

    for (depth, raw) in chain.iter().enumerate() {
        resolved.id = raw.id.clone();
        resolved.chain.push(raw.id.clone());

        if raw.release_type.is_some() {
            resolved.release_type = raw.release_type.clone();
        }

        if raw.main_class.is_some() {
            resolved.main_class = raw.main_class.clone();
        }

        if raw.minimum_launcher_version.is_some() {
            resolved.minimum_launcher_version = raw.minimum_launcher_version;
        }

        if raw.asset_index.is_some() {
            resolved.asset_index = raw.asset_index.clone();
        }

        if let Some(args) = raw.game_args() {
            resolved.game_args = args;
        }

        if let Some(args) = raw.jvm_args() {
            resolved.jvm_args = args;
        }

        for (kind, download) in &raw.downloads {
            resolved.downloads.insert(kind.clone(), download.clone());
        }

        for lib in &raw.libraries {
            let indices = by_identity.entry(lib.identity()?).or_default();
            let inherited: Vec<usize> = indices
                .iter()
                .copied()
                .filter(|&i| slots[i].is_some_and(|(from, _)| from < depth))
                .collect();

            match inherited.split_first() {
                Some((&first, rest)) => {
                    for &i in rest {
                        slots[i] = None;
                    }

                    indices.retain(|i| !rest.contains(i));
                    slots[first] = Some((depth, lib));
                }

                None => {
                    indices.push(slots.len());
                    slots.push(Some((depth, lib)));
                }
            }
        }
    }

    resolved.libraries = slots
        .into_iter()
        .flatten()
        .map(|(_, lib)| lib.clone())
        .collect();

    Ok(resolved)
}
