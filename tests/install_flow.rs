use mc_install::{
    Error, Result,
    assets::{AssetIndex, AssetObject},
    config::{EngineConfig, Endpoints},
    download::Outcome,
    hash::{HashAlgorithm, hash_bytes},
    launcher::Launcher,
    manifest::{AssetIndexRef, RawVersionMetadata},
    meta::VersionCatalogEntry,
    platform::{Arch, OsFamily, PlatformDescriptor},
    store::ManifestStore,
    transport::{TransferError, Transport},
};
use std::{
    collections::HashMap,
    io::{Cursor, Read},
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
};

const RESOURCES: &str = "https://resources.example.invalid";
const LIBRARIES: &str = "https://libraries.example.invalid";

fn sha1(data: &[u8]) -> String {
    hash_bytes(HashAlgorithm::Sha1, data)
}

struct FakeStore {
    catalog: Vec<VersionCatalogEntry>,
    docs: HashMap<String, RawVersionMetadata>,
    assets: AssetIndex,
    metadata_fetches: AtomicUsize,
    index_fetches: AtomicUsize,
}

impl ManifestStore for FakeStore {
    fn fetch_catalog(&self) -> Result<Vec<VersionCatalogEntry>> {
        Ok(self.catalog.clone())
    }

    fn fetch_metadata(&self, id: &str) -> Result<RawVersionMetadata> {
        self.metadata_fetches.fetch_add(1, Ordering::SeqCst);
        self.docs
            .get(id)
            .cloned()
            .ok_or_else(|| Error::NotFound(id.into()))
    }

    fn fetch_asset_index(&self, _: &AssetIndexRef) -> Result<AssetIndex> {
        self.index_fetches.fetch_add(1, Ordering::SeqCst);
        Ok(self.assets.clone())
    }
}

#[derive(Default)]
struct MockTransport {
    bodies: Mutex<HashMap<String, Vec<u8>>>,
    opens: AtomicUsize,
}

impl MockTransport {
    fn serve(&self, url: impl Into<String>, body: &[u8]) {
        self.bodies.lock().unwrap().insert(url.into(), body.to_vec());
    }
}

impl Transport for MockTransport {
    fn open(&self, url: &str) -> std::result::Result<Box<dyn Read + Send>, TransferError> {
        self.opens.fetch_add(1, Ordering::SeqCst);

        let body = self
            .bodies
            .lock()
            .unwrap()
            .get(url)
            .cloned()
            .ok_or(TransferError::Http { status: 404 })?;

        Ok(Box::new(Cursor::new(body)))
    }
}

fn entry(id: &str, kind: &str) -> VersionCatalogEntry {
    serde_json::from_value(serde_json::json!({
        "id": id,
        "type": kind,
        "url": format!("https://meta.example.invalid/{id}.json"),
        "time": "2024-01-01T00:00:00+00:00",
        "releaseTime": "2024-01-01T00:00:00+00:00"
    }))
    .unwrap()
}

/// A vanilla `1.0`, a modded `1.0-mod` inheriting from it, and a transport
/// serving every file either of them needs.
fn fixture() -> (Arc<FakeStore>, Arc<MockTransport>) {
    let transport = Arc::new(MockTransport::default());
    let client = b"client jar bytes";
    let lib_a = b"library a";
    let lib_b = b"library b, patched";
    let sound = b"ogg ogg ogg";

    transport.serve("https://example.invalid/client.jar", client);
    transport.serve(format!("{LIBRARIES}/g/a/1/a-1.jar"), lib_a);
    transport.serve(format!("{LIBRARIES}/g/b/2/b-2.jar"), lib_b);

    let sound_hash = sha1(sound);
    transport.serve(format!("{RESOURCES}/{}/{sound_hash}", &sound_hash[..2]), sound);

    let base: RawVersionMetadata = serde_json::from_value(serde_json::json!({
        "id": "1.0",
        "type": "release",
        "mainClass": "net.minecraft.client.main.Main",
        "assetIndex": {
            "id": "1.0", "sha1": "unused", "size": 1, "totalSize": 11,
            "url": "https://meta.example.invalid/assets/1.0.json"
        },
        "downloads": {
            "client": { "sha1": sha1(client), "size": client.len(), "url": "https://example.invalid/client.jar" }
        },
        "libraries": [
            { "name": "g:a:1", "downloads": { "artifact": {
                "path": "g/a/1/a-1.jar", "sha1": sha1(lib_a), "size": lib_a.len(),
                "url": format!("{LIBRARIES}/g/a/1/a-1.jar")
            } } },
            { "name": "g:b:1", "url": LIBRARIES }
        ]
    }))
    .unwrap();

    let modded: RawVersionMetadata = serde_json::from_value(serde_json::json!({
        "id": "1.0-mod",
        "inheritsFrom": "1.0",
        "mainClass": "mod.Main",
        "libraries": [
            { "name": "g:b:2", "downloads": { "artifact": {
                "path": "g/b/2/b-2.jar", "sha1": sha1(lib_b), "size": lib_b.len(),
                "url": format!("{LIBRARIES}/g/b/2/b-2.jar")
            } } },
            { "name": "g:mac-only:1", "rules": [{ "action": "disallow" }, { "action": "allow", "os": { "name": "osx" } }] }
        ]
    }))
    .unwrap();

    let assets = AssetIndex {
        objects: [(
            "minecraft/sounds/step.ogg".to_string(),
            AssetObject {
                hash: sound_hash,
                size: sound.len() as u64,
            },
        )]
        .into_iter()
        .collect(),
        extra: [("map_to_resources".to_string(), serde_json::Value::Bool(true))]
            .into_iter()
            .collect(),
    };

    let store = Arc::new(FakeStore {
        catalog: vec![
            entry("1.1-pre1", "snapshot"),
            entry("1.0-mod", "release"),
            entry("1.0", "release"),
        ],
        docs: [base, modded].into_iter().map(|d| (d.id.clone(), d)).collect(),
        assets,
        metadata_fetches: AtomicUsize::new(0),
        index_fetches: AtomicUsize::new(0),
    });

    (store, transport)
}

fn launcher(
    root: &std::path::Path,
    store: Arc<FakeStore>,
    transport: Arc<MockTransport>,
) -> Launcher<FakeStore, MockTransport> {
    let endpoints = Endpoints {
        catalog_url: "https://meta.example.invalid/catalog.json".into(),
        resources_url: RESOURCES.into(),
        libraries_url: LIBRARIES.into(),
    };

    Launcher::new(
        root,
        store,
        transport,
        &endpoints,
        PlatformDescriptor::new(OsFamily::Linux, Arch::X86_64),
        EngineConfig::default()
            .with_concurrency(4)
            .with_max_attempts(2)
            .with_backoff(Vec::new()),
    )
    .unwrap()
}

#[test]
fn installs_inherited_version_and_resumes_for_free() {
    let dir = tempfile::tempdir().unwrap();
    let (store, transport) = fixture();
    let launcher = launcher(dir.path(), store.clone(), transport.clone());

    assert!(!launcher.is_downloading());
    assert_eq!(launcher.download_progress(), 0);

    let outcome = launcher.install("1.0-mod").unwrap().wait().unwrap();

    assert!(matches!(outcome, Outcome::AllVerified), "{outcome:?}");
    assert!(!launcher.is_downloading());
    assert_eq!(launcher.download_progress(), 100);

    let root = dir.path();
    assert!(root.join("versions/1.0-mod/1.0-mod.jar").exists());
    assert!(root.join("libraries/g/a/1/a-1.jar").exists());
    assert_eq!(
        std::fs::read(root.join("libraries/g/b/2/b-2.jar")).unwrap(),
        b"library b, patched"
    );
    assert!(!root.join("libraries/g/b/1").exists());
    assert!(!root.join("libraries/g/mac-only").exists());
    assert!(root.join("versions/1.0/1.0.json").exists());
    assert!(root.join("versions/1.0-mod/1.0-mod.json").exists());
    let cached_index = std::fs::read_to_string(root.join("assets/indexes/1.0.json")).unwrap();
    assert!(cached_index.contains("\"map_to_resources\":true"));

    let opens = transport.opens.load(Ordering::SeqCst);
    assert_eq!(opens, 4);

    let again = launcher.install("1.0-mod").unwrap().wait().unwrap();

    assert!(matches!(again, Outcome::AllVerified));
    assert_eq!(transport.opens.load(Ordering::SeqCst), opens);
    assert_eq!(store.metadata_fetches.load(Ordering::SeqCst), 2);
    assert_eq!(store.index_fetches.load(Ordering::SeqCst), 1);
}

#[test]
fn resolved_chain_merges_child_over_parent() {
    let dir = tempfile::tempdir().unwrap();
    let (store, transport) = fixture();
    let launcher = launcher(dir.path(), store, transport);
    let version = launcher.resolve("1.0-mod").unwrap();

    assert_eq!(version.chain, ["1.0", "1.0-mod"]);
    assert_eq!(version.main_class.as_deref(), Some("mod.Main"));
    assert!(version.downloads.contains_key("client"));

    let names: Vec<&str> = version.libraries.iter().map(|l| l.name.as_str()).collect();
    assert_eq!(names, ["g:a:1", "g:b:2", "g:mac-only:1"]);
}

#[test]
fn catalog_queries() {
    let dir = tempfile::tempdir().unwrap();
    let (store, transport) = fixture();
    let launcher = launcher(dir.path(), store, transport);

    assert_eq!(launcher.versions().unwrap(), ["1.1-pre1", "1.0-mod", "1.0"]);
    assert_eq!(launcher.latest_release().unwrap().as_deref(), Some("1.0-mod"));
    assert_eq!(launcher.latest_snapshot().unwrap().as_deref(), Some("1.1-pre1"));
    assert!(launcher.exists_version("1.0").unwrap());
    assert!(!launcher.exists_version("0.9").unwrap());
    assert!(matches!(
        launcher.resolve("0.9"),
        Err(Error::UnknownVersion(_))
    ));
}

#[test]
fn missing_asset_still_leaves_a_launchable_install() {
    let dir = tempfile::tempdir().unwrap();
    let (store, transport) = fixture();

    transport.bodies.lock().unwrap().retain(|url, _| !url.starts_with(RESOURCES));

    let launcher = launcher(dir.path(), store, transport.clone());
    let outcome = launcher.install("1.0-mod").unwrap().wait().unwrap();

    assert!(matches!(outcome, Outcome::PartialFailure { .. }));
    assert_eq!(outcome.failed().len(), 1);
    assert!(!outcome.failed()[0].is_fatal());
    assert!(outcome.is_launchable());
    assert_eq!(transport.opens.load(Ordering::SeqCst), 3 + 2);
}
