//! JSON persistence for [`Data`].

use std::fs;
use std::path::Path;

use rustc_hash::FxHashSet;

use crate::error::DataError;

use super::Data;

pub(super) fn write(data: &Data, path: &Path) -> Result<(), DataError> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)?;
    }
    let content = serde_json::to_vec_pretty(data)?;
    atomic_write(path, &content)?;
    tracing::debug!(path = %path.display(), features = data.len(), "saved data");
    Ok(())
}

pub(super) fn read(path: &Path) -> Result<Data, DataError> {
    let content = fs::read(path)?;
    let data: Data = serde_json::from_slice(&content)?;
    let mut seen = FxHashSet::default();
    if let Some(name) = data.feature_names().find(|name| !seen.insert(*name)) {
        return Err(DataError::Corrupt(format!("feature {name:?} is stored twice")));
    }
    tracing::debug!(path = %path.display(), features = data.len(), "loaded data");
    Ok(data)
}

/// Write to a sibling temp file, then rename over the target.
fn atomic_write(path: &Path, content: &[u8]) -> std::io::Result<()> {
    let mut temp_name = path.file_name().unwrap_or_default().to_os_string();
    temp_name.push(".tmp");
    let temp_path = path.with_file_name(temp_name);
    fs::write(&temp_path, content)?;
    fs::rename(&temp_path, path)
}

/// The store writes an unset seed as `""`.
pub(super) mod seed_sentinel {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    #[derive(Serialize, Deserialize)]
    #[serde(untagged)]
    enum StoredSeed {
        Number(u64),
        Text(String),
    }

    pub fn serialize<S: Serializer>(seed: &Option<u64>, serializer: S) -> Result<S::Ok, S::Error> {
        match seed {
            Some(seed) => StoredSeed::Number(*seed),
            None => StoredSeed::Text(String::new()),
        }
        .serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<u64>, D::Error> {
        match Option::<StoredSeed>::deserialize(deserializer)? {
            None => Ok(None),
            Some(StoredSeed::Number(seed)) => Ok(Some(seed)),
            Some(StoredSeed::Text(text)) if text.is_empty() => Ok(None),
            Some(StoredSeed::Text(text)) => text.parse().map(Some).map_err(|_| {
                serde::de::Error::custom(format!("seed {text:?} is neither a number nor \"\""))
            }),
        }
    }
}
