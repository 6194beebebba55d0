use crate::{
    assets::AssetIndex,
    config::USER_AGENT,
    error::{Error, Result},
    hash::{HashAlgorithm, hash_bytes},
    manifest::{AssetIndexRef, RawVersionMetadata},
    meta::{MetaIndex, VersionCatalogEntry},
};
use reqwest::{StatusCode, blocking::Client};
use std::{
    sync::{Mutex, PoisonError},
    time::Duration,
};

/// Source of catalog and version documents.
pub trait ManifestStore: Send + Sync {
    /// Fetches the catalog, replacing whatever was known before.
    fn fetch_catalog(&self) -> Result<Vec<VersionCatalogEntry>>;

    /// Fetches one version document. Fails with [`Error::NotFound`] when the
    /// catalog does not list `id`.
    fn fetch_metadata(&self, id: &str) -> Result<RawVersionMetadata>;

    fn fetch_asset_index(&self, index: &AssetIndexRef) -> Result<AssetIndex>;
}

pub struct HttpManifestStore {
    client: Client,
    catalog_url: String,
    index: Mutex<Option<MetaIndex>>,
}

impl HttpManifestStore {
    pub fn new(catalog_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()?;

        Ok(Self {
            client,
            catalog_url: catalog_url.into(),
            index: Mutex::new(None),
        })
    }

    fn get(&self, url: &str) -> Result<Vec<u8>> {
        log::debug!("GET {url}");

        let res = self.client.get(url).send()?;

        match res.status() {
            StatusCode::NOT_FOUND => Err(Error::NotFound(url.into())),
            status if !status.is_success() => Err(Error::Http {
                url: url.into(),
                status: status.as_u16(),
            }),
            _ => Ok(res.bytes()?.to_vec()),
        }
    }

    fn verified_get(&self, url: &str, sha1: Option<&str>) -> Result<Vec<u8>> {
        let bytes = self.get(url)?;

        if let Some(expected) = sha1 {
            let actual = hash_bytes(HashAlgorithm::Sha1, &bytes);

            if !expected.eq_ignore_ascii_case(&actual) {
                return Err(Error::HashMismatch {
                    what: url.into(),
                    expected: expected.into(),
                    actual,
                });
            }
        }

        Ok(bytes)
    }

    fn fetch_index(&self) -> Result<MetaIndex> {
        let index: MetaIndex = serde_json::from_slice(&self.get(&self.catalog_url)?)?;

        log::info!(
            "Fetched version catalog: {} versions (latest release {}, snapshot {})",
            index.versions.len(),
            index.latest.release,
            index.latest.snapshot
        );

        *self.index.lock().unwrap_or_else(PoisonError::into_inner) = Some(index.clone());

        Ok(index)
    }

    fn entry(&self, id: &str) -> Result<VersionCatalogEntry> {
        let cached = self
            .index
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        let index = match cached {
            Some(index) => index,
            None => self.fetch_index()?,
        };

        index
            .versions
            .into_iter()
            .find(|v| v.id == id)
            .ok_or_else(|| Error::NotFound(format!("version {id} in catalog")))
    }
}

impl ManifestStore for HttpManifestStore {
    fn fetch_catalog(&self) -> Result<Vec<VersionCatalogEntry>> {
        Ok(self.fetch_index()?.versions)
    }

    fn fetch_metadata(&self, id: &str) -> Result<RawVersionMetadata> {
        let entry = self.entry(id)?;
        let bytes = self.verified_get(&entry.url, entry.sha1.as_deref())?;

        Ok(serde_json::from_slice(&bytes)?)
    }

    fn fetch_asset_index(&self, index: &AssetIndexRef) -> Result<AssetIndex> {
        let bytes = self.verified_get(&index.url, Some(&index.sha1))?;

        Ok(serde_json::from_slice(&bytes)?)
    }
}
