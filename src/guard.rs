//! Keeps path-bearing locators inside the project root.

use crate::fsutil::resolve_existing_prefix;
use crate::locator::{Locator, Protocol};
use crate::policy::{Classification, DENY_PATH_ESCAPE};
use percent_encoding::percent_decode_str;
use std::path::{Path, PathBuf};
use tracing::warn;

/// Directory a relative reference is interpreted from. Yarn binds `file:` and
/// `portal:` references to the workspace that declared them via `::locator=`.
pub fn base_dir(locator: &Locator, root: &Path) -> PathBuf {
    let Some(parent) = locator.param("locator") else {
        return root.to_path_buf();
    };
    let decoded = percent_decode_str(parent).decode_utf8_lossy();
    match Locator::parse(&decoded) {
        Ok(parent) if parent.protocol == Protocol::Workspace => {
            root.join(parent.decoded_reference().as_ref())
        }
        _ => root.to_path_buf(),
    }
}

/// Absolute location a path-bearing locator points at, symlinks resolved.
pub fn target_path(locator: &Locator, root: &Path) -> Option<PathBuf> {
    if !locator.protocol.is_path_bearing() {
        return None;
    }
    let reference = locator.decoded_reference();
    let joined = base_dir(locator, root).join(reference.as_ref());
    Some(resolve_existing_prefix(&joined))
}

/// `Some(path)` when the locator stays inside `root`; `None` when it escapes or
/// carries no path.
pub fn contained_path(locator: &Locator, root: &Path) -> Option<PathBuf> {
    let target = target_path(locator, root)?;
    let root = resolve_existing_prefix(root);
    target.starts_with(&root).then_some(target)
}

pub fn escapes_root(locator: &Locator, root: &Path) -> bool {
    locator.protocol.is_path_bearing() && contained_path(locator, root).is_none()
}

/// Runs after classification. Only ever turns `Fetchable` into `Deny`.
pub fn apply(classification: Classification, locator: &Locator, root: &Path) -> Classification {
    if !escapes_root(locator, root) {
        return classification;
    }
    match classification {
        Classification::Fetchable => Classification::Deny(DENY_PATH_ESCAPE),
        other => {
            warn!(locator = %locator, "in-project reference points outside the project root");
            other
        }
    }
}
