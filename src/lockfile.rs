use crate::error::{Error, Result};
use serde::Deserialize;
use serde_yaml::Value;
use std::{fs, path::Path};

pub const METADATA_KEY: &str = "__metadata";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockfileMetadata {
    pub version: u32,
    pub cache_key: Option<String>,
}

/// One lockfile record: every descriptor that resolved to the same package.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LockRecord {
    pub descriptors: Vec<String>,
    pub resolution: Option<String>,
    pub version: Option<String>,
    pub checksum: Option<String>,
    pub link_type: Option<String>,
}

impl LockRecord {
    /// The exact locator for this record; older hand-edited files only carry the key.
    pub fn locator_str(&self) -> &str {
        self.resolution
            .as_deref()
            .or_else(|| self.descriptors.first().map(String::as_str))
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lockfile {
    pub metadata: LockfileMetadata,
    /// Records in file order.
    pub records: Vec<LockRecord>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct RawRecord {
    #[serde(default)]
    resolution: Option<String>,
    #[serde(default)]
    version: Option<Value>,
    #[serde(default)]
    checksum: Option<Value>,
    #[serde(default)]
    link_type: Option<String>,
}

pub fn load(path: &Path) -> Result<Lockfile> {
    let data = fs::read_to_string(path)
        .map_err(|source| Error::Io { path: path.to_path_buf(), source })?;
    parse(&data)
}

pub fn parse(text: &str) -> Result<Lockfile> {
    let value: Value =
        serde_yaml::from_str(text).map_err(|e| Error::LockfileParse(e.to_string()))?;
    let Value::Mapping(map) = value else {
        return Err(Error::LockfileParse("expected a YAML mapping at the top level".into()));
    };

    let metadata = map
        .get(METADATA_KEY)
        .ok_or_else(|| Error::LockfileParse(format!("missing {METADATA_KEY} block")))
        .and_then(parse_metadata)?;

    let mut records = Vec::with_capacity(map.len().saturating_sub(1));
    for (key, value) in &map {
        let Some(key) = key.as_str() else {
            return Err(Error::LockfileParse(format!("non-string record key {key:?}")));
        };
        if key == METADATA_KEY {
            continue;
        }
        let raw: RawRecord = serde_yaml::from_value(value.clone())
            .map_err(|e| Error::LockfileParse(format!("record '{key}': {e}")))?;
        let descriptors: Vec<String> = key
            .split(',')
            .map(str::trim)
            .filter(|d| !d.is_empty())
            .map(str::to_string)
            .collect();
        if descriptors.is_empty() {
            return Err(Error::LockfileParse("record with an empty key".into()));
        }
        records.push(LockRecord {
            descriptors,
            resolution: raw.resolution,
            version: raw.version.as_ref().and_then(scalar_string),
            checksum: raw.checksum.as_ref().and_then(scalar_string),
            link_type: raw.link_type,
        });
    }
    Ok(Lockfile { metadata, records })
}

fn parse_metadata(value: &Value) -> Result<LockfileMetadata> {
    let version = value
        .get("version")
        .and_then(scalar_string)
        .ok_or_else(|| Error::LockfileParse(format!("{METADATA_KEY}.version is missing")))?;
    let version = version
        .parse::<u32>()
        .map_err(|_| Error::LockfileParse(format!("{METADATA_KEY}.version '{version}' is not a number")))?;
    Ok(LockfileMetadata { version, cache_key: value.get("cacheKey").and_then(scalar_string) })
}

fn scalar_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
