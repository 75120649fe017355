use crate::locator::{Locator, Protocol};
use std::collections::BTreeSet;
use std::path::PathBuf;

pub const DENY_EXEC: &str = "arbitrary code execution";
pub const DENY_PROTOCOL: &str = "protocol not permitted";
pub const DENY_PATH_ESCAPE: &str = "path escapes project root";
pub const DENY_MISSING_INTEGRITY: &str = "integrity required in hardened mode";
pub const DENY_UNPINNED_GIT: &str = "git revision must be a full commit hash in hardened mode";
pub const SKIP_IN_PROJECT: &str = "resolved inside project, not fetched";
pub const SKIP_PATCH: &str = "patch application handled by external build step";
pub const SKIP_CANCELLED: &str = "run cancelled";

/// Read-only policy for one prefetch run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyConfig {
    pub allow: BTreeSet<Protocol>,
    /// Absolute project root the path-escape guard checks against.
    pub project_root: PathBuf,
    pub hardened: bool,
    /// Abort the run on a malformed locator instead of recording a failure.
    pub strict: bool,
}

impl PolicyConfig {
    pub fn new(project_root: impl Into<PathBuf>) -> Self {
        Self {
            allow: default_allow_list(),
            project_root: project_root.into(),
            hardened: false,
            strict: true,
        }
    }

    pub fn with_allow<I: IntoIterator<Item = Protocol>>(mut self, allow: I) -> Self {
        self.allow = allow.into_iter().collect();
        self
    }

    pub fn hardened(mut self, hardened: bool) -> Self {
        self.hardened = hardened;
        self
    }

    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }
}

pub fn default_allow_list() -> BTreeSet<Protocol> {
    [Protocol::Registry, Protocol::Git, Protocol::Http, Protocol::File].into_iter().collect()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    Fetchable,
    Skip(&'static str),
    Deny(&'static str),
}

impl Classification {
    pub fn is_fetchable(&self) -> bool {
        matches!(self, Classification::Fetchable)
    }
}

pub fn classify(locator: &Locator, policy: &PolicyConfig) -> Classification {
    match locator.protocol {
        Protocol::Exec => return Classification::Deny(DENY_EXEC),
        Protocol::Workspace | Protocol::Link => return Classification::Skip(SKIP_IN_PROJECT),
        Protocol::Patch => return Classification::Skip(SKIP_PATCH),
        _ => {}
    }
    if !policy.allow.contains(&locator.protocol) {
        return Classification::Deny(DENY_PROTOCOL);
    }
    if policy.hardened {
        if let Some(reason) = hardened_violation(locator) {
            return Classification::Deny(reason);
        }
    }
    Classification::Fetchable
}

fn hardened_violation(locator: &Locator) -> Option<&'static str> {
    match locator.protocol {
        Protocol::Registry | Protocol::Http | Protocol::File if locator.integrity.is_none() => {
            Some(DENY_MISSING_INTEGRITY)
        }
        Protocol::Git => {
            let pinned = locator
                .git_source()
                .and_then(|(_, rev)| rev)
                .is_some_and(|rev| rev.len() == 40 && rev.chars().all(|c| c.is_ascii_hexdigit()));
            (!pinned).then_some(DENY_UNPINNED_GIT)
        }
        _ => None,
    }
}
