//! `lockfetch.yml` and the merge of file settings with command-line overrides.

use crate::cache::{CacheLayout, LayoutTable};
use crate::error::{Error, Result};
use crate::fetch::retry::RetryPolicy;
use crate::fsutil;
use crate::locator::Protocol;
use crate::policy::PolicyConfig;
use crate::prefetch::{default_jobs, PrefetchOptions};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

pub const CONFIG_FILE: &str = "lockfetch.yml";
pub const DEFAULT_LAYOUT: &str = "yarn";

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub allow: Option<Vec<Protocol>>,
    pub hardened: Option<bool>,
    pub strict: Option<bool>,
    pub registry: Option<String>,
    pub jobs: Option<usize>,
    pub retry: Option<RetryPolicy>,
    pub timeout_secs: Option<u64>,
    pub layout: Option<String>,
    /// Extra or replacement layouts: name to path template.
    pub layouts: BTreeMap<String, String>,
}

impl FileConfig {
    pub fn parse(text: &str) -> Result<Self> {
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(text).map_err(|e| Error::Config(e.to_string()))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .map_err(|source| Error::Io { path: path.to_path_buf(), source })?;
        Self::parse(&text).map_err(|e| match e {
            Error::Config(msg) => Error::Config(format!("{}: {msg}", path.display())),
            other => other,
        })
    }

    /// An explicit path must exist; otherwise `lockfetch.yml` in the project
    /// root is used when present.
    pub fn discover(project_root: &Path, explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::load(path);
        }
        let candidate = project_root.join(CONFIG_FILE);
        if candidate.is_file() {
            debug!(path = %candidate.display(), "using config file");
            return Self::load(&candidate);
        }
        Ok(Self::default())
    }
}

/// Command-line values; `None` / `false` defer to the config file.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub allow: Option<Vec<Protocol>>,
    pub hardened: bool,
    pub lenient: bool,
    pub registry: Option<String>,
    pub jobs: Option<usize>,
    pub timeout_secs: Option<u64>,
    pub layout: Option<String>,
    pub output: Option<PathBuf>,
    pub dialect: Option<u32>,
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub policy: PolicyConfig,
    pub options: PrefetchOptions,
    pub timeout: Option<Duration>,
}

impl Settings {
    pub fn resolve(project_root: &Path, file: FileConfig, cli: Overrides) -> Result<Self> {
        let mut policy = PolicyConfig::new(project_root);
        if let Some(allow) = cli.allow.or(file.allow) {
            policy = policy.with_allow(allow);
        }
        policy = policy
            .hardened(cli.hardened || file.hardened.unwrap_or(false))
            .strict(!cli.lenient && file.strict.unwrap_or(true));

        let mut layouts = LayoutTable::default();
        for (name, template) in file.layouts {
            layouts.insert(CacheLayout::new(name, template));
        }
        let layout_name = cli.layout.or(file.layout).unwrap_or_else(|| DEFAULT_LAYOUT.to_string());
        let layout = layouts.get(&layout_name).map_err(|e| Error::Config(e.to_string()))?.clone();

        let jobs = cli.jobs.or(file.jobs).unwrap_or_else(default_jobs);
        if jobs == 0 {
            return Err(Error::Config("jobs must be at least 1".into()));
        }
        let retry = file.retry.unwrap_or_default();
        if retry.max_attempts == 0 {
            return Err(Error::Config("retry.max_attempts must be at least 1".into()));
        }

        let options = PrefetchOptions {
            registry: cli.registry.or(file.registry),
            cache_root: cli.output.unwrap_or_else(fsutil::default_cache_root),
            layout,
            jobs,
            retry,
            dialect: cli.dialect,
        };
        let timeout = cli.timeout_secs.or(file.timeout_secs).map(Duration::from_secs);
        Ok(Self { policy, options, timeout })
    }
}
