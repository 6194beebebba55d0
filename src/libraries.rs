use crate::{
    error::Result,
    hash::Checksum,
    maven::Coordinate,
    platform::{PlatformDescriptor, Rule, is_allowed},
};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// A library entry as it appears in version JSON.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct LibrarySpec {
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub downloads: Option<LibraryDownloads>,

    /// Repository base for libraries that carry no `downloads` block.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rules: Vec<Rule>,

    /// OS key to native classifier, e.g. `"windows": "natives-windows-${arch}"`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub natives: Option<BTreeMap<String, String>>,

    /// Unmodelled fields such as `extract`.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct LibraryDownloads {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact: Option<LibraryDownload>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub classifiers: Option<BTreeMap<String, LibraryDownload>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct LibraryDownload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha1: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,

    pub url: String,
}

/// Where one file of a library comes from and what it must hash to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LibraryFile {
    /// Repository-relative path (`group/artifact/version/file.jar`).
    pub path: String,
    pub url: String,
    pub hash: Option<Checksum>,
    pub size: Option<u64>,
}

impl LibraryDownload {
    fn to_file(&self, coord: &Coordinate) -> LibraryFile {
        LibraryFile {
            path: self.path.clone().unwrap_or_else(|| coord.path()),
            url: self.url.clone(),
            hash: self.sha1.clone().map(Checksum::sha1),
            size: self.size,
        }
    }
}

impl LibrarySpec {
    pub fn coordinate(&self) -> Result<Coordinate> {
        Coordinate::parse(&self.name)
    }

    /// Merge identity: `group:artifact[:classifier]`.
    pub fn identity(&self) -> Result<String> {
        Ok(self.coordinate()?.identity())
    }

    pub fn applies_to(&self, platform: &PlatformDescriptor) -> bool {
        is_allowed(&self.rules, platform)
    }

    /// The main jar, if the library has one. Natives-only entries (old LWJGL
    /// platform jars) have none.
    pub fn artifact(&self, default_repo: &str) -> Result<Option<LibraryFile>> {
        let coord = self.coordinate()?;

        if let Some(artifact) = self.downloads.as_ref().and_then(|d| d.artifact.as_ref()) {
            return Ok(Some(artifact.to_file(&coord)));
        }

        if self.natives.is_some() {
            return Ok(None);
        }

        Ok(Some(from_repository(
            self.url.as_deref().unwrap_or(default_repo),
            coord.path(),
        )))
    }

    /// The classifier this library uses for natives on `platform`, with
    /// `${arch}` filled in.
    pub fn native_classifier(&self, platform: &PlatformDescriptor) -> Option<String> {
        self.natives
            .as_ref()?
            .get(platform.os.get())
            .map(|v| v.replace("${arch}", platform.arch.bits()))
    }

    /// The native archive for `platform`, if this library has one.
    pub fn native(
        &self,
        platform: &PlatformDescriptor,
        default_repo: &str,
    ) -> Result<Option<LibraryFile>> {
        let Some(classifier) = self.native_classifier(platform) else {
            return Ok(None);
        };

        let coord = self.coordinate()?.with_classifier(&classifier);
        let listed = self
            .downloads
            .as_ref()
            .and_then(|d| d.classifiers.as_ref())
            .and_then(|c| c.get(&classifier));

        Ok(Some(match listed {
            Some(download) => download.to_file(&coord),
            None => from_repository(self.url.as_deref().unwrap_or(default_repo), coord.path()),
        }))
    }
}

fn from_repository(base: &str, path: String) -> LibraryFile {
    LibraryFile {
        url: format!("{}/{path}", base.trim_end_matches('/')),
        path,
        hash: None,
        size: None,
    }
}
