//! On-disk offline cache. Where an artifact lands is decided by a per-ecosystem
//! layout template; the writer itself is ecosystem-agnostic.

use crate::error::WriteError;
use crate::fetch::Artifact;
use crate::fsutil::{atomic_write, is_temp_file};
use crate::integrity::Integrity;
use crate::locator::Locator;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, trace};
use walkdir::WalkDir;

/// Version used in cache keys for locators that carry none (git, tarball URLs).
pub const UNVERSIONED: &str = "0.0.0";

/// yarn reads its offline mirror from `<globalFolder>/cache`.
pub const YARN_TEMPLATE: &str = "cache/{slug}-{protocol}-{version}-{hash:10}.tgz";

/// Path template, relative to the cache root. Placeholders: `{name}` (scoped
/// names keep their `/`), `{slug}`, `{version}`, `{protocol}` (the lockfile
/// tag, so `npm` for registry packages), `{algo}`, `{hash}` and `{hash:N}` for
/// the first N hex digits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheLayout {
    pub name: String,
    pub template: String,
}

impl CacheLayout {
    pub fn new(name: impl Into<String>, template: impl Into<String>) -> Self {
        Self { name: name.into(), template: template.into() }
    }

    pub fn relative_path(&self, locator: &Locator, digest: &Integrity) -> Result<PathBuf, WriteError> {
        let version = locator.version().unwrap_or_else(|| UNVERSIONED.to_string());
        let hex = digest.hex();
        let rendered = render(&self.template, |key| match key {
            "name" => Some(locator.ident.to_string()),
            "slug" => Some(locator.ident.slug()),
            "version" => Some(version.clone()),
            "protocol" => Some(locator.protocol.lockfile_tag().to_string()),
            "algo" => Some(digest.algorithm.as_str().to_string()),
            "hash" => Some(hex.clone()),
            other => {
                let n: usize = other.strip_prefix("hash:")?.parse().ok()?;
                Some(hex.chars().take(n).collect())
            }
        })?;
        let path = PathBuf::from(&rendered);
        let safe = path.components().all(|c| matches!(c, Component::Normal(_)));
        if !safe || rendered.is_empty() {
            return Err(WriteError::UnsafePath { layout: self.name.clone(), path: rendered });
        }
        Ok(path)
    }
}

fn render(template: &str, lookup: impl Fn(&str) -> Option<String>) -> Result<String, WriteError> {
    let bad = |reason: String| WriteError::Template { template: template.to_string(), reason };
    let mut out = String::with_capacity(template.len() + 32);
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let close = after.find('}').ok_or_else(|| bad("unclosed '{'".into()))?;
        let key = &after[..close];
        out.push_str(&lookup(key).ok_or_else(|| bad(format!("unknown placeholder '{{{key}}}'")))?);
        rest = &after[close + 1..];
    }
    out.push_str(rest);
    Ok(out)
}

/// Ecosystem name to layout. Built-ins can be replaced or extended from config.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayoutTable {
    layouts: BTreeMap<String, CacheLayout>,
}

impl Default for LayoutTable {
    fn default() -> Self {
        let builtin = [
            CacheLayout::new("yarn", YARN_TEMPLATE),
            CacheLayout::new("npm", "pkgs/{name}/{version}/{hash:16}/package.tgz"),
            CacheLayout::new("cas", "{algo}/{hash:2}/{hash}.tgz"),
        ];
        Self { layouts: builtin.into_iter().map(|l| (l.name.clone(), l)).collect() }
    }
}

impl LayoutTable {
    pub fn insert(&mut self, layout: CacheLayout) {
        self.layouts.insert(layout.name.clone(), layout);
    }

    pub fn get(&self, name: &str) -> Result<&CacheLayout, WriteError> {
        self.layouts.get(name).ok_or_else(|| WriteError::UnknownLayout(name.to_string()))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.layouts.keys().map(String::as_str)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CacheEntry {
    pub ident: String,
    pub version: String,
    pub path: PathBuf,
    pub digest: Integrity,
}

/// Writes verified artifacts under the cache root. Safe to share between
/// worker threads.
#[derive(Debug)]
pub struct CacheWriter {
    root: PathBuf,
    layout: CacheLayout,
    locks: Mutex<HashMap<PathBuf, Arc<Mutex<()>>>>,
}

impl CacheWriter {
    pub fn new(root: impl Into<PathBuf>, layout: CacheLayout) -> Self {
        Self { root: root.into(), layout, locks: Mutex::new(HashMap::new()) }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn layout(&self) -> &CacheLayout {
        &self.layout
    }

    fn path_lock(&self, path: &Path) -> Arc<Mutex<()>> {
        self.locks.lock().entry(path.to_path_buf()).or_default().clone()
    }

    pub fn store(&self, locator: &Locator, artifact: &Artifact) -> Result<CacheEntry, WriteError> {
        let rel = self.layout.relative_path(locator, &artifact.digest)?;
        let path = self.root.join(rel);
        let entry = CacheEntry {
            ident: locator.ident.to_string(),
            version: locator.version().unwrap_or_else(|| UNVERSIONED.to_string()),
            path: path.clone(),
            digest: artifact.digest.clone(),
        };

        let lock = self.path_lock(&path);
        let _guard = lock.lock();
        if let Ok(existing) = fs::read(&path) {
            if artifact.digest.matches(&existing) {
                trace!(path = %path.display(), "cache hit, already stored");
                return Ok(entry);
            }
            debug!(path = %path.display(), "replacing cache entry with mismatching content");
        }
        atomic_write(&path, &artifact.bytes).map_err(|source| {
            error!(path = %path.display(), error = %source, "cache write failed");
            WriteError::Io { path: path.clone(), source }
        })?;
        debug!(locator = %locator, path = %path.display(), "stored");
        Ok(entry)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CachedFile {
    pub path: PathBuf,
    pub size: u64,
}

/// Every finished entry under `root`, sorted; temp files from interrupted
/// writes are ignored.
pub fn list_entries(root: &Path) -> Vec<CachedFile> {
    let mut out: Vec<CachedFile> = WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_file() && !is_temp_file(e.path()))
        .map(|e| CachedFile {
            size: e.metadata().map(|m| m.len()).unwrap_or(0),
            path: e.path().strip_prefix(root).map(Path::to_path_buf).unwrap_or_else(|_| e.path().to_path_buf()),
        })
        .collect();
    out.sort_by(|a, b| a.path.cmp(&b.path));
    out
}
