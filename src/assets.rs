use crate::hash::Checksum;
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Contents of `assets/indexes/<id>.json`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct AssetIndex {
    /// Logical asset path to object. Sorted so planning order is stable.
    #[serde(default)]
    pub objects: BTreeMap<String, AssetObject>,

    /// `virtual`, `map_to_resources` and anything else alongside `objects`.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AssetObject {
    pub hash: String,
    pub size: u64,
}

impl AssetObject {
    /// `<first two hex chars>/<hash>`, shared by the on-disk layout and the
    /// resource server.
    pub fn object_path(&self) -> String {
        let hash = self.hash.to_lowercase();
        let shard = hash.get(..2).unwrap_or(&hash);

        format!("{shard}/{hash}")
    }

    /// Objects are addressed by a 40 character hex SHA-1 and nothing else.
    pub fn has_valid_hash(&self) -> bool {
        self.hash.len() == 40 && self.hash.bytes().all(|b| b.is_ascii_hexdigit())
    }

    pub fn checksum(&self) -> Checksum {
        Checksum::sha1(&self.hash)
    }
}

impl AssetIndex {
    pub fn total_size(&self) -> u64 {
        self.objects.values().map(|v| v.size).sum()
    }
}
