//! The prefetch pipeline: lockfile records in, populated cache and an ordered
//! report out.

use crate::cache::{CacheLayout, CacheWriter, LayoutTable, YARN_TEMPLATE};
use crate::cancel::CancelToken;
use crate::error::{Error, FetchError, MalformedLocator, Result};
use crate::fetch::retry::RetryPolicy;
use crate::fetch::Fetcher;
use crate::guard;
use crate::locator::dialect::Dialect;
use crate::locator::Locator;
use crate::lockfile::Lockfile;
use crate::policy::{self, Classification, PolicyConfig};
use crate::report::{FailureKind, Report, ReportEntry, ResolutionOutcome};
use once_cell::sync::OnceCell;
use rayon::prelude::*;
use std::collections::HashMap;
use std::path::PathBuf;
use tracing::{debug, info, warn};

/// Worker count used when none is configured.
pub fn default_jobs() -> usize {
    std::thread::available_parallelism().map(|n| n.get()).unwrap_or(4).min(16)
}

#[derive(Debug, Clone)]
pub struct PrefetchOptions {
    pub registry: Option<String>,
    pub cache_root: PathBuf,
    pub layout: CacheLayout,
    pub jobs: usize,
    pub retry: RetryPolicy,
    /// Declared major version; detected from `__metadata` when absent.
    pub dialect: Option<u32>,
}

impl PrefetchOptions {
    pub fn new(cache_root: impl Into<PathBuf>) -> Self {
        let layout = LayoutTable::default()
            .get("yarn")
            .cloned()
            .unwrap_or_else(|_| CacheLayout::new("yarn", YARN_TEMPLATE));
        Self {
            registry: None,
            cache_root: cache_root.into(),
            layout,
            jobs: default_jobs(),
            retry: RetryPolicy::default(),
            dialect: None,
        }
    }
}

/// What the pipeline decided for one lockfile record before any I/O.
#[derive(Debug, Clone)]
pub struct PlannedEntry {
    pub raw: String,
    pub locator: Option<Locator>,
    pub classification: Option<Classification>,
    /// Set for entries that never reach the fetcher.
    pub outcome: Option<ResolutionOutcome>,
}

impl PlannedEntry {
    pub fn needs_fetch(&self) -> bool {
        self.outcome.is_none()
    }
}

#[derive(Debug, Clone)]
pub struct Plan {
    pub dialect: Dialect,
    pub entries: Vec<PlannedEntry>,
}

pub fn resolve_dialect(lockfile: &Lockfile, declared: Option<u32>) -> Result<Dialect> {
    let Some(major) = declared else {
        return Dialect::from_metadata_version(lockfile.metadata.version);
    };
    let dialect = Dialect::from_major(major)?;
    if !dialect.rules().metadata_versions.contains(&lockfile.metadata.version) {
        warn!(
            declared = major,
            metadata = lockfile.metadata.version,
            "declared dialect does not match lockfile metadata; using the declared one"
        );
    }
    Ok(dialect)
}

/// Parses, classifies and guard-checks every record. Pure apart from
/// resolving symlinks under the project root.
pub fn plan(lockfile: &Lockfile, policy: &PolicyConfig, declared: Option<u32>) -> Result<Plan> {
    let dialect = resolve_dialect(lockfile, declared)?;
    let mut entries = Vec::with_capacity(lockfile.records.len());
    let mut seen: HashMap<_, usize> = HashMap::new();

    for record in &lockfile.records {
        let raw = record.locator_str().to_string();
        let parsed = dialect.parse_locator(&raw).and_then(|locator| {
            let integrity = record
                .checksum
                .as_deref()
                .map(|c| dialect.parse_checksum(c))
                .transpose()
                .map_err(|reason| MalformedLocator::new(&raw, format!("checksum: {reason}")))?;
            Ok(locator.with_integrity(integrity).with_resolved_version(record.version.as_deref()))
        });

        let locator = match parsed {
            Ok(locator) => locator,
            Err(err) if policy.strict => return Err(Error::MalformedLocator(err)),
            Err(err) => {
                warn!(locator = %raw, error = %err, "skipping malformed locator");
                entries.push(PlannedEntry {
                    raw,
                    locator: None,
                    classification: None,
                    outcome: Some(ResolutionOutcome::Failed {
                        kind: FailureKind::MalformedLocator,
                        cause: err.to_string(),
                    }),
                });
                continue;
            }
        };

        match seen.get(&locator.identity()) {
            Some(&idx) => {
                let first = entries[idx].locator.as_ref().and_then(|l: &Locator| l.integrity.as_ref());
                if first != locator.integrity.as_ref() {
                    return Err(Error::LockfileCorrupted(format!(
                        "{locator} appears twice with different checksums"
                    )));
                }
                debug!(locator = %locator, "collapsing duplicate lockfile entry");
                continue;
            }
            None => {
                seen.insert(locator.identity(), entries.len());
            }
        }

        let classification = policy::classify(&locator, policy);
        let classification = guard::apply(classification, &locator, &policy.project_root);
        let outcome = match classification {
            Classification::Fetchable => None,
            Classification::Skip(reason) => Some(ResolutionOutcome::skipped(reason)),
            Classification::Deny(reason) => {
                info!(locator = %locator, reason, "denied");
                Some(ResolutionOutcome::denied(reason))
            }
        };
        entries.push(PlannedEntry { raw, locator: Some(locator), classification: Some(classification), outcome });
    }
    Ok(Plan { dialect, entries })
}

#[derive(Debug)]
pub struct Prefetcher {
    policy: PolicyConfig,
    options: PrefetchOptions,
    fetcher: Fetcher,
    writer: CacheWriter,
}

impl Prefetcher {
    pub fn new(policy: PolicyConfig, options: PrefetchOptions) -> Self {
        let fetcher = Fetcher::new(options.registry.clone(), policy.project_root.clone())
            .with_retry(options.retry);
        Self::with_fetcher(policy, options, fetcher)
    }

    pub fn with_fetcher(policy: PolicyConfig, options: PrefetchOptions, fetcher: Fetcher) -> Self {
        let writer = CacheWriter::new(options.cache_root.clone(), options.layout.clone());
        Self { policy, options, fetcher, writer }
    }

    pub fn policy(&self) -> &PolicyConfig {
        &self.policy
    }

    pub fn run(&self, lockfile: &Lockfile, cancel: &CancelToken) -> Result<Report> {
        let plan = plan(lockfile, &self.policy, self.options.dialect)?;
        let slots: Vec<OnceCell<ResolutionOutcome>> =
            plan.entries.iter().map(|_| OnceCell::new()).collect();
        for (slot, entry) in slots.iter().zip(&plan.entries) {
            if let Some(outcome) = &entry.outcome {
                fill(slot, outcome.clone());
            }
        }

        let pending: Vec<(usize, &Locator)> = plan
            .entries
            .iter()
            .enumerate()
            .filter(|(_, e)| e.needs_fetch())
            .filter_map(|(i, e)| e.locator.as_ref().map(|l| (i, l)))
            .collect();
        info!(
            dialect = plan.dialect.major(),
            entries = plan.entries.len(),
            to_fetch = pending.len(),
            jobs = self.options.jobs,
            "starting prefetch"
        );

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.options.jobs.max(1))
            .thread_name(|i| format!("lockfetch-worker-{i}"))
            .build()
            .map_err(|e| Error::Config(format!("worker pool: {e}")))?;
        pool.install(|| {
            pending.par_iter().for_each(|&(idx, locator)| {
                fill(&slots[idx], self.resolve_one(locator, cancel));
            });
        });

        let entries = plan
            .entries
            .iter()
            .zip(slots)
            .map(|(entry, slot)| {
                let outcome = slot
                    .into_inner()
                    .unwrap_or_else(|| ResolutionOutcome::skipped(policy::SKIP_CANCELLED));
                ReportEntry::new(&entry.raw, entry.locator.as_ref(), outcome)
            })
            .collect();
        let report = Report::new(plan.dialect.major(), entries, &self.options.cache_root);
        info!(
            fetched = report.summary.fetched,
            skipped = report.summary.skipped,
            denied = report.summary.denied,
            failed = report.summary.failed,
            "prefetch finished"
        );
        Ok(report)
    }

    fn resolve_one(&self, locator: &Locator, cancel: &CancelToken) -> ResolutionOutcome {
        if cancel.is_cancelled() {
            return ResolutionOutcome::skipped(policy::SKIP_CANCELLED);
        }
        let artifact = match self.fetcher.fetch(locator, cancel) {
            Ok(artifact) => artifact,
            Err(FetchError::Cancelled) => return ResolutionOutcome::skipped(policy::SKIP_CANCELLED),
            Err(err) => {
                warn!(locator = %locator, error = %err, "fetch failed");
                return ResolutionOutcome::from_fetch_error(&err);
            }
        };
        match self.writer.store(locator, &artifact) {
            Ok(entry) => ResolutionOutcome::Fetched {
                path: entry.path,
                verified_digest: entry.digest.to_sri(),
            },
            Err(err) => ResolutionOutcome::from_write_error(&err),
        }
    }
}

fn fill(slot: &OnceCell<ResolutionOutcome>, outcome: ResolutionOutcome) {
    if slot.set(outcome).is_err() {
        warn!("outcome slot written twice; keeping the first result");
    }
}
