use std::fmt;

pub const MOJANG_META_URL: &str =
    "https://piston-meta.mojang.com/mc/game/version_manifest_v2.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetaIndex {
    pub latest: LatestMeta,
    pub versions: Vec<VersionCatalogEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LatestMeta {
    pub release: String,
    pub snapshot: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ReleaseType {
    Release,
    Snapshot,
    Other(String),
}

impl From<String> for ReleaseType {
    fn from(value: String) -> Self {
        match value.as_str() {
            "release" => Self::Release,
            "snapshot" => Self::Snapshot,
            _ => Self::Other(value),
        }
    }
}

impl From<ReleaseType> for String {
    fn from(value: ReleaseType) -> Self {
        value.to_string()
    }
}

impl fmt::Display for ReleaseType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Release => f.write_str("release"),
            Self::Snapshot => f.write_str("snapshot"),
            Self::Other(other) => f.write_str(other),
        }
    }
}

/// One version listed in the remote catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionCatalogEntry {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: ReleaseType,
    pub url: String,
    /// When the metadata document was last modified.
    pub time: String,
    #[serde(default)]
    pub release_time: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha1: Option<String>,
    #[serde(default)]
    pub compliance_level: u8,
}
