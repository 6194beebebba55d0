use crate::{
    assets::AssetIndex,
    cache::{DiskCache, MetadataCache},
    config::{EngineConfig, Endpoints},
    download::{DownloadEngine, Session},
    error::{Error, Result},
    meta::{ReleaseType, VersionCatalogEntry},
    planner::{ArtifactPlanner, DownloadPlan},
    platform::PlatformDescriptor,
    progress::ProgressTracker,
    resolver::{ResolvedVersion, VersionResolver},
    store::{HttpManifestStore, ManifestStore},
    transport::{HttpTransport, Transport},
    util::{make_path_and_create, write_atomic},
};
use std::{
    fs,
    path::{Path, PathBuf},
    sync::{Arc, Mutex, PoisonError},
};

/// Ties the resolver, planner and engine to one game directory.
pub struct Launcher<S, T> {
    root: PathBuf,
    store: Arc<S>,
    resolver: VersionResolver<S, DiskCache>,
    planner: ArtifactPlanner,
    engine: DownloadEngine<T>,
    platform: PlatformDescriptor,
    current: Mutex<Option<Arc<ProgressTracker>>>,
}

impl Launcher<HttpManifestStore, HttpTransport> {
    pub fn http(
        root: impl Into<PathBuf>,
        endpoints: &Endpoints,
        platform: PlatformDescriptor,
        config: EngineConfig,
    ) -> Result<Self> {
        let store = HttpManifestStore::new(&endpoints.catalog_url, config.transfer_timeout)?;
        let transport = HttpTransport::new(config.transfer_timeout)?;

        Self::new(
            root,
            Arc::new(store),
            Arc::new(transport),
            endpoints,
            platform,
            config,
        )
    }
}

impl<S: ManifestStore, T: Transport + 'static> Launcher<S, T> {
    pub fn new(
        root: impl Into<PathBuf>,
        store: Arc<S>,
        transport: Arc<T>,
        endpoints: &Endpoints,
        platform: PlatformDescriptor,
        config: EngineConfig,
    ) -> Result<Self> {
        let root = make_path_and_create(root)?;

        Ok(Self {
            resolver: VersionResolver::new(store.clone(), DiskCache::new(&root)),
            planner: ArtifactPlanner::new(endpoints),
            engine: DownloadEngine::new(transport, config),
            store,
            platform,
            root,
            current: Mutex::new(None),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn platform(&self) -> &PlatformDescriptor {
        &self.platform
    }

    pub fn catalog(&self) -> Result<Vec<VersionCatalogEntry>> {
        self.store.fetch_catalog()
    }

    /// Catalog ids, newest first.
    pub fn versions(&self) -> Result<Vec<String>> {
        Ok(self.catalog()?.into_iter().map(|v| v.id).collect())
    }

    pub fn latest_release(&self) -> Result<Option<String>> {
        self.latest(ReleaseType::Release)
    }

    pub fn latest_snapshot(&self) -> Result<Option<String>> {
        self.latest(ReleaseType::Snapshot)
    }

    fn latest(&self, kind: ReleaseType) -> Result<Option<String>> {
        Ok(self
            .catalog()?
            .into_iter()
            .find(|v| v.kind == kind)
            .map(|v| v.id))
    }

    /// Whether `id` is either cached locally or listed in the catalog.
    pub fn exists_version(&self, id: &str) -> Result<bool> {
        if self.resolver.cache().get(id)?.is_some() {
            return Ok(true);
        }

        Ok(self.catalog()?.iter().any(|v| v.id == id))
    }

    pub fn resolve(&self, id: &str) -> Result<ResolvedVersion> {
        self.resolver.resolve(id)
    }

    /// The version's asset index, read from `assets/indexes/<id>.json` when
    /// present and fetched otherwise.
    pub fn asset_index(&self, version: &ResolvedVersion) -> Result<AssetIndex> {
        let Some(index_ref) = &version.asset_index else {
            return Err(Error::IncompleteManifest {
                id: version.id.clone(),
                field: "assetIndex",
            });
        };

        let path = self
            .root
            .join("assets")
            .join("indexes")
            .join(format!("{}.json", index_ref.id));

        if path.exists() {
            let text = fs::read_to_string(&path).map_err(|e| Error::io(&path, e))?;

            match serde_json::from_str(&text) {
                Ok(index) => {
                    log::debug!("Using cached asset index {path:?}");
                    return Ok(index);
                }

                Err(e) => log::warn!("Refetching unreadable asset index {path:?}: {e}"),
            }
        }

        let index = self.store.fetch_asset_index(index_ref)?;

        write_atomic(&path, &serde_json::to_vec(&index)?)?;

        log::info!(
            "Fetched asset index {} ({} objects)",
            index_ref.id,
            index.objects.len()
        );

        Ok(index)
    }

    pub fn plan(&self, id: &str) -> Result<(ResolvedVersion, DownloadPlan)> {
        let version = self.resolve(id)?;
        let assets = self.asset_index(&version)?;
        let plan = self.planner.plan(&version, &self.platform, &assets)?;

        Ok((version, plan))
    }

    /// Resolves, plans and starts downloading `id` into the root.
    pub fn install(&self, id: &str) -> Result<Session> {
        let (_, plan) = self.plan(id)?;
        let session = self.engine.start(plan, &self.root);

        *self.current.lock().unwrap_or_else(PoisonError::into_inner) = Some(session.tracker());

        Ok(session)
    }

    /// Percent done of the current or last session; 0 before any.
    pub fn download_progress(&self) -> u8 {
        self.current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map_or(0, |t| t.snapshot().percent())
    }

    pub fn is_downloading(&self) -> bool {
        self.current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|t| !t.is_finished())
    }
}
