use std::fs;

use camino::{Utf8Path, Utf8PathBuf};
use directories::BaseDirs;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::domain::Lang;
use crate::error::PreloadError;

/// Schema version baked into the store root. Bumping it starts a fresh
/// database instead of migrating records in place.
const STORE_VERSION: u32 = 1;

pub const META_LAST_UPDATE: &str = "lastUpdate";
pub const META_CACHED_USER: &str = "cachedUser";
pub const META_PRELOAD_COMPLETE: &str = "preloadComplete";

/// The five independent collections. Each lives in its own directory and
/// has its own primary key field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Collection {
    Metadata,
    WorkoutData,
    Images,
    Audio,
    Nutrition,
}

impl Collection {
    pub const ALL: [Collection; 5] = [
        Collection::Metadata,
        Collection::WorkoutData,
        Collection::Images,
        Collection::Audio,
        Collection::Nutrition,
    ];

    fn dir_name(&self) -> &'static str {
        match self {
            Collection::Metadata => "metadata",
            Collection::WorkoutData => "workout_data",
            Collection::Images => "images",
            Collection::Audio => "audio",
            Collection::Nutrition => "nutrition",
        }
    }
}

/// Durable key/collection store on the filesystem. Records are JSON
/// documents named by the SHA-256 digest of their primary key; binary
/// records keep their payload in a sibling `.bin` file. All writes go
/// through a temp file and an atomic rename.
#[derive(Debug, Clone)]
pub struct Store {
    root: Utf8PathBuf,
}

impl Store {
    /// Open (creating on first use) the store under the user cache
    /// directory. Safe to call repeatedly.
    pub fn open() -> Result<Self, PreloadError> {
        let root = BaseDirs::new()
            .and_then(|dirs| {
                Utf8PathBuf::from_path_buf(
                    dirs.home_dir()
                        .join(".cache")
                        .join("viltrum-offline")
                        .join(format!("offline-v{STORE_VERSION}")),
                )
                .ok()
            })
            .ok_or_else(|| {
                PreloadError::Filesystem("unable to resolve cache directory".to_string())
            })?;
        Self::open_at(root)
    }

    /// Open the store at an explicit root. Used by tests and scripting.
    pub fn open_at(root: Utf8PathBuf) -> Result<Self, PreloadError> {
        let store = Self { root };
        store.ensure_layout()?;
        Ok(store)
    }

    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    /// Create the root and every collection directory if absent. Idempotent.
    pub fn ensure_layout(&self) -> Result<(), PreloadError> {
        for collection in Collection::ALL {
            fs::create_dir_all(self.collection_dir(collection).as_std_path())
                .map_err(|err| PreloadError::Storage(err.to_string()))?;
        }
        Ok(())
    }

    fn collection_dir(&self, collection: Collection) -> Utf8PathBuf {
        self.root.join(collection.dir_name())
    }

    fn record_path(&self, collection: Collection, key: &str) -> Utf8PathBuf {
        self.collection_dir(collection)
            .join(format!("{}.json", digest(key)))
    }

    fn blob_path_for(&self, collection: Collection, key: &str) -> Utf8PathBuf {
        self.collection_dir(collection)
            .join(format!("{}.bin", digest(key)))
    }

    /// Fetch one record by primary key, or `None` if absent.
    pub fn get<T: DeserializeOwned>(
        &self,
        collection: Collection,
        key: &str,
    ) -> Result<Option<T>, PreloadError> {
        let path = self.record_path(collection, key);
        if !path.as_std_path().exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(path.as_std_path())
            .map_err(|err| PreloadError::Storage(err.to_string()))?;
        let record =
            serde_json::from_str(&content).map_err(|err| PreloadError::Storage(err.to_string()))?;
        Ok(Some(record))
    }

    /// Insert or overwrite a record by primary key.
    pub fn put<T: Serialize>(
        &self,
        collection: Collection,
        key: &str,
        record: &T,
    ) -> Result<(), PreloadError> {
        let content = serde_json::to_vec_pretty(record)
            .map_err(|err| PreloadError::Storage(err.to_string()))?;
        write_atomic(&self.record_path(collection, key), &content)
    }

    /// Insert or overwrite a binary record: the JSON document plus its blob.
    /// The blob lands first so a record never points at a missing payload.
    pub fn put_with_blob<T: Serialize>(
        &self,
        collection: Collection,
        key: &str,
        record: &T,
        blob: &[u8],
    ) -> Result<(), PreloadError> {
        write_atomic(&self.blob_path_for(collection, key), blob)?;
        self.put(collection, key, record)
    }

    /// Path to a record's blob, if both the record and its payload exist.
    pub fn blob(&self, collection: Collection, key: &str) -> Option<Utf8PathBuf> {
        let record = self.record_path(collection, key);
        let blob = self.blob_path_for(collection, key);
        (record.as_std_path().exists() && blob.as_std_path().exists()).then_some(blob)
    }

    /// Every record in a collection, in no particular order.
    pub fn get_all<T: DeserializeOwned>(
        &self,
        collection: Collection,
    ) -> Result<Vec<T>, PreloadError> {
        let dir = self.collection_dir(collection);
        if !dir.as_std_path().exists() {
            return Ok(Vec::new());
        }
        let entries =
            fs::read_dir(dir.as_std_path()).map_err(|err| PreloadError::Storage(err.to_string()))?;
        let mut records = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|err| PreloadError::Storage(err.to_string()))?;
            let path = entry.path();
            if path.extension().map(|ext| ext == "json").unwrap_or(false) {
                let content = fs::read_to_string(&path)
                    .map_err(|err| PreloadError::Storage(err.to_string()))?;
                let record = serde_json::from_str(&content)
                    .map_err(|err| PreloadError::Storage(err.to_string()))?;
                records.push(record);
            }
        }
        Ok(records)
    }

    /// Remove every record in one collection.
    pub fn clear(&self, collection: Collection) -> Result<(), PreloadError> {
        let dir = self.collection_dir(collection);
        if dir.as_std_path().exists() {
            fs::remove_dir_all(dir.as_std_path())
                .map_err(|err| PreloadError::Storage(err.to_string()))?;
        }
        fs::create_dir_all(dir.as_std_path()).map_err(|err| PreloadError::Storage(err.to_string()))
    }

    /// Empty every collection.
    pub fn clear_all(&self) -> Result<(), PreloadError> {
        for collection in Collection::ALL {
            self.clear(collection)?;
        }
        Ok(())
    }
}

fn digest(key: &str) -> String {
    hex::encode(Sha256::digest(key.as_bytes()))
}

fn write_atomic(path: &Utf8Path, content: &[u8]) -> Result<(), PreloadError> {
    let parent = path
        .parent()
        .ok_or_else(|| PreloadError::Storage("record path has no parent".to_string()))?;
    fs::create_dir_all(parent.as_std_path())
        .map_err(|err| PreloadError::Storage(err.to_string()))?;
    let temp = tempfile::Builder::new()
        .prefix(".write")
        .tempfile_in(parent.as_std_path())
        .map_err(|err| PreloadError::Storage(err.to_string()))?;
    fs::write(temp.path(), content).map_err(|err| PreloadError::Storage(err.to_string()))?;
    temp.persist(path.as_std_path())
        .map_err(|err| PreloadError::Storage(err.to_string()))?;
    Ok(())
}

pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// One metadata entry. Values are heterogeneous (booleans, timestamps,
/// email strings), so they stay as raw JSON.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetadataEntry {
    pub key: String,
    pub value: serde_json::Value,
}

impl MetadataEntry {
    pub fn new(key: &str, value: serde_json::Value) -> Self {
        Self {
            key: key.to_string(),
            value,
        }
    }
}

/// The single workout-data record; each preload overwrites the previous
/// one, no history is kept.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkoutRecord {
    pub id: String,
    pub email: String,
    pub data: serde_json::Value,
    pub timestamp: i64,
}

pub const WORKOUT_RECORD_ID: &str = "current_user";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageRecord {
    pub url: String,
    pub timestamp: i64,
}

/// Audio record shared by both sub-kinds: synthesized speech carries
/// `text`/`lang`, fixed clips carry `name`/`url`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioRecord {
    pub key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lang: Option<Lang>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    pub timestamp: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NutritionRecord {
    pub email: String,
    pub url: String,
    pub timestamp: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_store() -> (tempfile::TempDir, Store) {
        let temp = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::from_path_buf(temp.path().join("offline-v1")).unwrap();
        let store = Store::open_at(root).unwrap();
        (temp, store)
    }

    #[test]
    fn open_is_idempotent() {
        let (_temp, store) = temp_store();
        store.ensure_layout().unwrap();
        let again = Store::open_at(store.root().to_owned()).unwrap();
        assert_eq!(again.root(), store.root());
    }

    #[test]
    fn put_get_roundtrip() {
        let (_temp, store) = temp_store();
        let entry = MetadataEntry::new(META_CACHED_USER, serde_json::json!("a@b.it"));
        store
            .put(Collection::Metadata, META_CACHED_USER, &entry)
            .unwrap();

        let read: MetadataEntry = store
            .get(Collection::Metadata, META_CACHED_USER)
            .unwrap()
            .unwrap();
        assert_eq!(read.value, serde_json::json!("a@b.it"));

        let absent: Option<MetadataEntry> = store.get(Collection::Metadata, "missing").unwrap();
        assert!(absent.is_none());
    }

    #[test]
    fn put_overwrites_by_key() {
        let (_temp, store) = temp_store();
        for value in ["one", "two"] {
            let entry = MetadataEntry::new("k", serde_json::json!(value));
            store.put(Collection::Metadata, "k", &entry).unwrap();
        }
        let all: Vec<MetadataEntry> = store.get_all(Collection::Metadata).unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].value, serde_json::json!("two"));
    }

    #[test]
    fn blob_requires_record_and_payload() {
        let (_temp, store) = temp_store();
        let url = "https://example.com/a.jpg";
        assert!(store.blob(Collection::Images, url).is_none());

        let record = ImageRecord {
            url: url.to_string(),
            timestamp: now_millis(),
        };
        store
            .put_with_blob(Collection::Images, url, &record, b"jpeg bytes")
            .unwrap();

        let path = store.blob(Collection::Images, url).unwrap();
        assert_eq!(fs::read(path.as_std_path()).unwrap(), b"jpeg bytes");
    }

    #[test]
    fn clear_empties_one_collection_only() {
        let (_temp, store) = temp_store();
        let record = ImageRecord {
            url: "u".to_string(),
            timestamp: 0,
        };
        store
            .put_with_blob(Collection::Images, "u", &record, b"x")
            .unwrap();
        let entry = MetadataEntry::new("k", serde_json::json!(1));
        store.put(Collection::Metadata, "k", &entry).unwrap();

        store.clear(Collection::Images).unwrap();
        assert!(store.blob(Collection::Images, "u").is_none());
        let meta: Option<MetadataEntry> = store.get(Collection::Metadata, "k").unwrap();
        assert!(meta.is_some());

        store.clear_all().unwrap();
        let meta: Option<MetadataEntry> = store.get(Collection::Metadata, "k").unwrap();
        assert!(meta.is_none());
    }

    #[test]
    fn keys_with_url_characters_are_safe() {
        let (_temp, store) = temp_store();
        let key = "tts_it-IT_Mancano 60 secondi / àèì?";
        let record = AudioRecord {
            key: key.to_string(),
            text: Some("Mancano 60 secondi".to_string()),
            lang: Some(Lang::Italian),
            name: None,
            url: None,
            timestamp: now_millis(),
        };
        store
            .put_with_blob(Collection::Audio, key, &record, b"mp3")
            .unwrap();
        assert!(store.blob(Collection::Audio, key).is_some());
    }
}
