mod cache;
mod check;
mod fetch;

pub(crate) use cache::{cache_root, cmd_cache_clean, cmd_cache_ls, cmd_cache_path};
pub(crate) use check::cmd_check;
pub(crate) use fetch::cmd_fetch;

use super::ProjectArgs;
use crate::config::{FileConfig, Overrides};
use crate::lockfile::{self, Lockfile};
use anyhow::{Context, Result};
use std::path::PathBuf;

pub const LOCKFILE_NAME: &str = "yarn.lock";

/// Everything both `fetch` and `check` need before a plan can be made.
pub(crate) struct Project {
    pub root: PathBuf,
    pub lockfile: Lockfile,
    pub config: FileConfig,
}

pub(crate) fn load_project(args: &ProjectArgs) -> Result<Project> {
    let root = args
        .project
        .canonicalize()
        .with_context(|| format!("project root {}", args.project.display()))?;
    let lock_path = args.lockfile.clone().unwrap_or_else(|| root.join(LOCKFILE_NAME));
    let lockfile =
        lockfile::load(&lock_path).with_context(|| format!("load {}", lock_path.display()))?;
    let config = FileConfig::discover(&root, args.config.as_deref())?;
    Ok(Project { root, lockfile, config })
}

pub(crate) fn overrides(args: &ProjectArgs) -> Overrides {
    Overrides {
        allow: args.allow.clone(),
        hardened: args.hardened,
        lenient: args.lenient,
        dialect: args.dialect,
        ..Overrides::default()
    }
}
