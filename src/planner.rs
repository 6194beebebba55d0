use crate::{
    assets::AssetIndex,
    config::Endpoints,
    error::{Error, Result},
    hash::Checksum,
    libraries::LibraryFile,
    manifest::CLIENT_DOWNLOAD,
    platform::PlatformDescriptor,
    resolver::ResolvedVersion,
};
use std::{
    collections::{BTreeMap, HashSet},
    path::{Component, Path, PathBuf},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ArtifactKind {
    ClientJar,
    Library,
    Native,
    Asset,
}

impl ArtifactKind {
    pub fn get(&self) -> &'static str {
        match *self {
            Self::ClientJar => "client-jar",
            Self::Library => "library",
            Self::Native => "native",
            Self::Asset => "asset",
        }
    }
}

/// One file to put on disk.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PlannedArtifact {
    /// Relative to the session root.
    pub path: PathBuf,
    pub url: String,
    pub hash: Option<Checksum>,
    pub size: Option<u64>,
    pub kind: ArtifactKind,
}

/// Artifacts with unique destination paths, in planning order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DownloadPlan {
    artifacts: Vec<PlannedArtifact>,
    paths: HashSet<PathBuf>,
}

impl DownloadPlan {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an artifact unless its path is already planned. Returns whether it
    /// was added.
    pub fn push(&mut self, artifact: PlannedArtifact) -> bool {
        if !self.paths.insert(artifact.path.clone()) {
            log::debug!("Skipping duplicate destination {:?}", artifact.path);
            return false;
        }

        self.artifacts.push(artifact);
        true
    }

    pub fn artifacts(&self) -> &[PlannedArtifact] {
        &self.artifacts
    }

    pub fn len(&self) -> usize {
        self.artifacts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.artifacts.is_empty()
    }

    pub fn total_bytes(&self) -> u64 {
        self.artifacts.iter().filter_map(|a| a.size).sum()
    }

    /// `(count, bytes)` per kind.
    pub fn summary(&self) -> BTreeMap<ArtifactKind, (usize, u64)> {
        let mut out = BTreeMap::new();

        for artifact in &self.artifacts {
            let entry = out.entry(artifact.kind).or_insert((0, 0));

            entry.0 += 1;
            entry.1 += artifact.size.unwrap_or(0);
        }

        out
    }
}

impl FromIterator<PlannedArtifact> for DownloadPlan {
    fn from_iter<I: IntoIterator<Item = PlannedArtifact>>(iter: I) -> Self {
        let mut plan = Self::new();

        for artifact in iter {
            plan.push(artifact);
        }

        plan
    }
}

pub struct ArtifactPlanner {
    libraries_url: String,
    resources_url: String,
}

impl Default for ArtifactPlanner {
    fn default() -> Self {
        Self::new(&Endpoints::default())
    }
}

impl ArtifactPlanner {
    pub fn new(endpoints: &Endpoints) -> Self {
        Self {
            libraries_url: endpoints.libraries_url.clone(),
            resources_url: endpoints.resources_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn plan(
        &self,
        version: &ResolvedVersion,
        platform: &PlatformDescriptor,
        assets: &AssetIndex,
    ) -> Result<DownloadPlan> {
        let client = version
            .downloads
            .get(CLIENT_DOWNLOAD)
            .ok_or_else(|| Error::IncompleteManifest {
                id: version.id.clone(),
                field: "downloads.client",
            })?;

        let version_dir = Path::new("versions").join(single_component(&version.id)?);
        let mut plan = DownloadPlan::new();

        plan.push(PlannedArtifact {
            path: version_dir.join(format!("{}.jar", version.id)),
            url: client.url.clone(),
            hash: Some(client.checksum()),
            size: Some(client.size),
            kind: ArtifactKind::ClientJar,
        });

        for lib in &version.libraries {
            if !lib.applies_to(platform) {
                log::debug!("Library {} excluded by rules", lib.name);
                continue;
            }

            if let Some(file) = lib.artifact(&self.libraries_url)? {
                plan.push(library_artifact(
                    Path::new("libraries").join(contained(&file.path)?),
                    file,
                    ArtifactKind::Library,
                ));
            }

            if let Some(file) = lib.native(platform, &self.libraries_url)? {
                let name = contained(&file.path)?
                    .file_name()
                    .map(PathBuf::from)
                    .ok_or_else(|| Error::UnsafePath(file.path.clone()))?;

                plan.push(library_artifact(
                    version_dir.join("natives").join(name),
                    file,
                    ArtifactKind::Native,
                ));
            }
        }

        for (name, object) in &assets.objects {
            if !object.has_valid_hash() {
                return Err(Error::InvalidAssetHash {
                    name: name.clone(),
                    hash: object.hash.clone(),
                });
            }

            let object_path = object.object_path();

            plan.push(PlannedArtifact {
                path: Path::new("assets").join("objects").join(&object_path),
                url: format!("{}/{object_path}", self.resources_url),
                hash: Some(object.checksum()),
                size: Some(object.size),
                kind: ArtifactKind::Asset,
            });
        }

        log::info!(
            "Planned {} artifacts ({} bytes) for {}",
            plan.len(),
            plan.total_bytes(),
            version.id
        );

        Ok(plan)
    }
}

/// Rebuilds a slash-separated path from plain components only, so joining
/// it onto a directory cannot climb out of that directory.
fn contained(path: &str) -> Result<PathBuf> {
    let mut out = PathBuf::new();

    for component in Path::new(path).components() {
        match component {
            Component::Normal(part) => out.push(part),
            Component::CurDir => {}
            _ => return Err(Error::UnsafePath(path.into())),
        }
    }

    if out.as_os_str().is_empty() {
        return Err(Error::UnsafePath(path.into()));
    }

    Ok(out)
}

fn single_component(name: &str) -> Result<PathBuf> {
    let path = contained(name)?;

    if path.components().count() != 1 {
        return Err(Error::UnsafePath(name.into()));
    }

    Ok(path)
}

fn library_artifact(path: PathBuf, file: LibraryFile, kind: ArtifactKind) -> PlannedArtifact {
    PlannedArtifact {
        path,
        url: file.url,
        hash: file.hash,
        size: file.size,
        kind,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        manifest::{FileDownload, RawVersionMetadata},
        platform::{Arch, OsFamily},
        resolver::merge,
    };

    fn version_json() -> RawVersionMetadata {
        serde_json::from_value(serde_json::json!({
            "id": "1.12.2",
            "downloads": {
                "client": { "sha1": "c0ffee", "size": 10, "url": "https://example.invalid/client.jar" }
            },
            "libraries": [
                {
                    "name": "com.mojang:patchy:1.1",
                    "downloads": { "artifact": {
                        "path": "com/mojang/patchy/1.1/patchy-1.1.jar",
                        "sha1": "aa", "size": 15817,
                        "url": "https://libraries.minecraft.net/com/mojang/patchy/1.1/patchy-1.1.jar"
                    } }
                },
                {
                    "name": "ca.weblite:java-objc-bridge:1.0.0",
                    "rules": [{ "action": "allow" }, { "action": "disallow", "os": { "name": "linux" } }],
                    "downloads": { "artifact": {
                        "path": "ca/weblite/java-objc-bridge/1.0.0/java-objc-bridge-1.0.0.jar",
                        "sha1": "bb", "size": 40502,
                        "url": "https://libraries.minecraft.net/ca/weblite/java-objc-bridge/1.0.0/java-objc-bridge-1.0.0.jar"
                    } }
                },
                {
                    "name": "org.lwjgl.lwjgl:lwjgl-platform:2.9.4",
                    "natives": { "linux": "natives-linux", "windows": "natives-windows" },
                    "downloads": { "classifiers": {
                        "natives-linux": {
                            "path": "org/lwjgl/lwjgl/lwjgl-platform/2.9.4/lwjgl-platform-2.9.4-natives-linux.jar",
                            "sha1": "cc", "size": 578680,
                            "url": "https://libraries.minecraft.net/org/lwjgl/lwjgl/lwjgl-platform/2.9.4/lwjgl-platform-2.9.4-natives-linux.jar"
                        }
                    } }
                }
            ]
        }))
        .unwrap()
    }

    fn assets() -> AssetIndex {
        serde_json::from_value(serde_json::json!({
            "objects": {
                "minecraft/sounds/a.ogg": { "hash": "00aa000000000000000000000000000000000000", "size": 5 },
                "minecraft/sounds/b.ogg": { "hash": "00aa000000000000000000000000000000000000", "size": 5 },
                "minecraft/lang/en_us.json": { "hash": "ff00000000000000000000000000000000000000", "size": 7 }
            }
        }))
        .unwrap()
    }

    fn linux() -> PlatformDescriptor {
        PlatformDescriptor::new(OsFamily::Linux, Arch::X86_64)
    }

    fn windows() -> PlatformDescriptor {
        PlatformDescriptor::new(OsFamily::Windows, Arch::X86_64)
    }

    fn plan_for(platform: &PlatformDescriptor) -> DownloadPlan {
        let version = merge(&[version_json()]).unwrap();

        ArtifactPlanner::default()
            .plan(&version, platform, &assets())
            .unwrap()
    }

    #[test]
    fn planning_is_idempotent() {
        let mut a = plan_for(&linux()).artifacts().to_vec();
        let mut b = plan_for(&linux()).artifacts().to_vec();

        a.sort();
        b.sort();
        assert_eq!(a, b);
    }

    #[test]
    fn rules_filter_libraries_per_platform() {
        let has_bridge = |plan: &DownloadPlan| {
            plan.artifacts()
                .iter()
                .any(|a| a.url.contains("java-objc-bridge"))
        };

        assert!(!has_bridge(&plan_for(&linux())));
        assert!(has_bridge(&plan_for(&windows())));
    }

    #[test]
    fn natives_land_under_the_version() {
        let plan = plan_for(&linux());
        let native = plan
            .artifacts()
            .iter()
            .find(|a| a.kind == ArtifactKind::Native)
            .unwrap();

        assert_eq!(
            native.path,
            Path::new("versions/1.12.2/natives/lwjgl-platform-2.9.4-natives-linux.jar")
        );
        assert_eq!(native.size, Some(578680));
        assert!(!plan.artifacts().iter().any(|a| {
            a.kind == ArtifactKind::Library && a.url.contains("lwjgl-platform")
        }));
    }

    #[test]
    fn assets_are_content_addressed_and_shared() {
        let plan = plan_for(&linux());
        let assets: Vec<_> = plan
            .artifacts()
            .iter()
            .filter(|a| a.kind == ArtifactKind::Asset)
            .collect();

        assert_eq!(assets.len(), 2);
        assert!(assets.iter().any(|a| a.path
            == Path::new("assets/objects/00/00aa000000000000000000000000000000000000")));
        assert!(assets.iter().any(|a| a.url
            == "https://resources.download.minecraft.net/ff/ff00000000000000000000000000000000000000"));
    }

    #[test]
    fn destinations_are_unique() {
        let plan = plan_for(&windows());
        let unique: HashSet<_> = plan.artifacts().iter().map(|a| &a.path).collect();

        assert_eq!(unique.len(), plan.len());
        assert_eq!(plan.summary()[&ArtifactKind::ClientJar], (1, 10));
    }

    fn lwjgl_1_12_2() -> RawVersionMetadata {
        let mut raw = version_json();

        raw.libraries = serde_json::from_value(serde_json::json!([
            {
                "name": "org.lwjgl.lwjgl:lwjgl:2.9.2-nightly-20140822",
                "rules": [{ "action": "allow", "os": { "name": "osx" } }],
                "downloads": { "artifact": {
                    "path": "org/lwjgl/lwjgl/lwjgl/2.9.2-nightly-20140822/lwjgl-2.9.2-nightly-20140822.jar",
                    "sha1": "7707204c9ffa5d91662de95f0a224e2f721b22af", "size": 1045632,
                    "url": "https://libraries.minecraft.net/org/lwjgl/lwjgl/lwjgl/2.9.2-nightly-20140822/lwjgl-2.9.2-nightly-20140822.jar"
                } }
            },
            {
                "name": "org.lwjgl.lwjgl:lwjgl:2.9.4-nightly-20150209",
                "rules": [{ "action": "allow" }, { "action": "disallow", "os": { "name": "osx" } }],
                "downloads": { "artifact": {
                    "path": "org/lwjgl/lwjgl/lwjgl/2.9.4-nightly-20150209/lwjgl-2.9.4-nightly-20150209.jar",
                    "sha1": "697517568c68e78ae0b4544145af031c81082dfe", "size": 1047168,
                    "url": "https://libraries.minecraft.net/org/lwjgl/lwjgl/lwjgl/2.9.4-nightly-20150209/lwjgl-2.9.4-nightly-20150209.jar"
                } }
            }
        ]))
        .unwrap();

        raw
    }

    #[test]
    fn each_platform_gets_its_own_lwjgl_variant() {
        let version = merge(&[lwjgl_1_12_2()]).unwrap();
        let libs_for = |os| {
            ArtifactPlanner::default()
                .plan(&version, &PlatformDescriptor::new(os, Arch::X86_64), &AssetIndex::default())
                .unwrap()
                .artifacts()
                .iter()
                .filter(|a| a.kind == ArtifactKind::Library)
                .map(|a| a.url.clone())
                .collect::<Vec<_>>()
        };

        let osx = libs_for(OsFamily::Osx);
        assert_eq!(osx.len(), 1);
        assert!(osx[0].contains("2.9.2-nightly"));

        assert!(libs_for(OsFamily::Linux)
            .iter()
            .any(|url| url.contains("2.9.4-nightly")));
    }

    #[test]
    fn library_paths_cannot_leave_the_root() {
        let mut raw = version_json();

        raw.libraries = serde_json::from_value(serde_json::json!([{
            "name": "evil:lib:1",
            "downloads": { "artifact": {
                "path": "../../../../home/user/.bashrc",
                "sha1": "aa", "size": 1, "url": "https://example.invalid/x"
            } }
        }]))
        .unwrap();

        let version = merge(&[raw]).unwrap();

        assert!(matches!(
            ArtifactPlanner::default().plan(&version, &linux(), &AssetIndex::default()),
            Err(Error::UnsafePath(path)) if path == "../../../../home/user/.bashrc"
        ));

        let mut absolute = version.clone();
        if let Some(artifact) = absolute.libraries[0]
            .downloads
            .as_mut()
            .and_then(|d| d.artifact.as_mut())
        {
            artifact.path = Some("/etc/passwd".into());
        }

        assert!(matches!(
            ArtifactPlanner::default().plan(&absolute, &linux(), &AssetIndex::default()),
            Err(Error::UnsafePath(_))
        ));
    }

    #[test]
    fn asset_hashes_must_be_sha1_hex() {
        let version = merge(&[version_json()]).unwrap();

        for hash in ["../../../etc/cron.d/x", "", "abc"] {
            let index: AssetIndex = serde_json::from_value(serde_json::json!({
                "objects": { "evil": { "hash": hash, "size": 1 } }
            }))
            .unwrap();

            assert!(matches!(
                ArtifactPlanner::default().plan(&version, &linux(), &index),
                Err(Error::InvalidAssetHash { .. })
            ));
        }
    }

    #[test]
    fn version_ids_are_single_directories() {
        let mut raw = version_json();
        raw.id = "../outside".into();

        let version = merge(&[raw]).unwrap();

        assert!(matches!(
            ArtifactPlanner::default().plan(&version, &linux(), &AssetIndex::default()),
            Err(Error::UnsafePath(_))
        ));
    }

    #[test]
    fn client_jar_is_required() {
        let mut raw = version_json();
        raw.downloads.clear();
        raw.downloads.insert(
            "server".into(),
            FileDownload {
                sha1: "dd".into(),
                size: 1,
                url: "https://example.invalid/server.jar".into(),
            },
        );

        let version = merge(&[raw]).unwrap();

        assert!(matches!(
            ArtifactPlanner::default().plan(&version, &linux(), &AssetIndex::default()),
            Err(Error::IncompleteManifest { field: "downloads.client", .. })
        ));
    }
}
