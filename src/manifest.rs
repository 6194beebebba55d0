use crate::{hash::Checksum, libraries::LibrarySpec, meta::ReleaseType, platform::Rule};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

pub const CLIENT_DOWNLOAD: &str = "client";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FileDownload {
    pub sha1: String,
    pub size: u64,
    pub url: String,
}

impl FileDownload {
    pub fn checksum(&self) -> Checksum {
        Checksum::sha1(&self.sha1)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AssetIndexRef {
    pub id: String,
    pub sha1: String,
    pub size: u64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_size: Option<u64>,

    pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum ArgumentValue {
    Single(String),
    Multiple(Vec<String>),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum Argument {
    Plain(String),
    Conditional {
        rules: Vec<Rule>,
        value: ArgumentValue,
    },
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Arguments {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub game: Option<Vec<Argument>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jvm: Option<Vec<Argument>>,
}

/// One version JSON document exactly as published. Never modified after it
/// has been fetched; inheritance is applied by the resolver on a copy.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RawVersionMetadata {
    pub id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inherits_from: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub main_class: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minimum_launcher_version: Option<u32>,

    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub release_type: Option<ReleaseType>,

    #[serde(default)]
    pub libraries: Vec<LibrarySpec>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub asset_index: Option<AssetIndexRef>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub downloads: BTreeMap<String, FileDownload>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arguments: Option<Arguments>,

    /// Pre-1.13 space separated game arguments.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minecraft_arguments: Option<String>,

    /// Fields not modelled above (`javaVersion`, `logging`, ...), kept so a
    /// cached copy carries the whole document.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl RawVersionMetadata {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            inherits_from: None,
            main_class: None,
            minimum_launcher_version: None,
            release_type: None,
            libraries: Vec::new(),
            asset_index: None,
            downloads: BTreeMap::new(),
            arguments: None,
            minecraft_arguments: None,
            extra: Map::new(),
        }
    }

    /// Game arguments this document defines, if any. Modern `arguments.game`
    /// takes precedence over the legacy string.
    pub fn game_args(&self) -> Option<Vec<Argument>> {
        if let Some(game) = self.arguments.as_ref().and_then(|a| a.game.clone()) {
            return Some(game);
        }

        self.minecraft_arguments.as_ref().map(|legacy| {
            legacy
                .split_whitespace()
                .map(|v| Argument::Plain(v.to_string()))
                .collect()
        })
    }

    pub fn jvm_args(&self) -> Option<Vec<Argument>> {
        self.arguments.as_ref().and_then(|a| a.jvm.clone())
    }
}
