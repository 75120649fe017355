use crate::error::{FetchError, WriteError};
use crate::locator::Locator;
use serde::Serialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailureKind {
    MalformedLocator,
    IntegrityError,
    FetchError,
    WriteError,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum ResolutionOutcome {
    Fetched { path: PathBuf, verified_digest: String },
    Skipped { reason: String },
    Denied { reason: String },
    Failed { kind: FailureKind, cause: String },
}

impl ResolutionOutcome {
    pub fn skipped(reason: &str) -> Self {
        ResolutionOutcome::Skipped { reason: reason.to_string() }
    }

    pub fn denied(reason: &str) -> Self {
        ResolutionOutcome::Denied { reason: reason.to_string() }
    }

    pub fn from_fetch_error(err: &FetchError) -> Self {
        let kind = match err {
            FetchError::Integrity { .. } => FailureKind::IntegrityError,
            _ => FailureKind::FetchError,
        };
        ResolutionOutcome::Failed { kind, cause: err.to_string() }
    }

    pub fn from_write_error(err: &WriteError) -> Self {
        ResolutionOutcome::Failed { kind: FailureKind::WriteError, cause: err.to_string() }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, ResolutionOutcome::Failed { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReportEntry {
    /// Resolution string exactly as the lockfile wrote it.
    pub locator: String,
    pub ident: Option<String>,
    pub protocol: Option<String>,
    pub version: Option<String>,
    pub integrity: Option<String>,
    #[serde(flatten)]
    pub outcome: ResolutionOutcome,
}

impl ReportEntry {
    pub fn new(raw: &str, locator: Option<&Locator>, outcome: ResolutionOutcome) -> Self {
        Self {
            locator: raw.to_string(),
            ident: locator.map(|l| l.ident.to_string()),
            protocol: locator.map(|l| l.protocol.as_str().to_string()),
            version: locator.and_then(Locator::version),
            integrity: locator.and_then(|l| l.integrity.as_ref()).map(|i| i.to_sri()),
            outcome,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Summary {
    pub total: usize,
    pub fetched: usize,
    pub skipped: usize,
    pub denied: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EnvironmentVariable {
    pub name: String,
    pub value: String,
}

/// SBOM-facing view of a fetched dependency.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Component {
    pub name: String,
    pub version: Option<String>,
    pub purl: String,
    pub integrity: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Report {
    pub dialect: u32,
    pub entries: Vec<ReportEntry>,
    pub summary: Summary,
    /// Fetched dependencies for SBOM tooling.
    pub components: Vec<Component>,
    pub environment: Vec<EnvironmentVariable>,
}

impl Report {
    pub fn new(dialect: u32, entries: Vec<ReportEntry>, cache_root: &Path) -> Self {
        let mut summary = Summary { total: entries.len(), ..Summary::default() };
        for e in &entries {
            match e.outcome {
                ResolutionOutcome::Fetched { .. } => summary.fetched += 1,
                ResolutionOutcome::Skipped { .. } => summary.skipped += 1,
                ResolutionOutcome::Denied { .. } => summary.denied += 1,
                ResolutionOutcome::Failed { .. } => summary.failed += 1,
            }
        }
        let components = sbom_components(&entries);
        Self { dialect, entries, summary, components, environment: hermetic_environment(cache_root) }
    }

    /// False when anything failed or a required dependency was denied.
    pub fn success(&self) -> bool {
        self.summary.failed == 0 && self.summary.denied == 0
    }

    pub fn failures(&self) -> impl Iterator<Item = &ReportEntry> {
        self.entries.iter().filter(|e| e.outcome.is_failed())
    }

    pub fn components(&self) -> &[Component] {
        &self.components
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

fn sbom_components(entries: &[ReportEntry]) -> Vec<Component> {
    entries
        .iter()
        .filter(|e| matches!(e.outcome, ResolutionOutcome::Fetched { .. }))
        .filter_map(|e| {
            let name = e.ident.clone()?;
            let purl = match &e.version {
                Some(v) => format!("pkg:npm/{}@{v}", purl_name(&name)),
                None => format!("pkg:npm/{}", purl_name(&name)),
            };
            Some(Component { name, version: e.version.clone(), purl, integrity: e.integrity.clone() })
        })
        .collect()
}

/// purl encodes the scope's `@` as `%40`.
fn purl_name(name: &str) -> String {
    match name.strip_prefix('@') {
        Some(rest) => format!("%40{rest}"),
        None => name.to_string(),
    }
}

/// Settings that point `yarn install` at the prefetched cache with the network off.
pub fn hermetic_environment(cache_root: &Path) -> Vec<EnvironmentVariable> {
    let var = |name: &str, value: String| EnvironmentVariable { name: name.to_string(), value };
    vec![
        var("YARN_ENABLE_GLOBAL_CACHE", "false".into()),
        var("YARN_ENABLE_IMMUTABLE_CACHE", "false".into()),
        var("YARN_ENABLE_MIRROR", "true".into()),
        var("YARN_ENABLE_NETWORK", "false".into()),
        var("YARN_GLOBAL_FOLDER", cache_root.display().to_string()),
    ]
}
