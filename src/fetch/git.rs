use crate::error::FetchError;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;
use walkdir::WalkDir;

static CHECKOUT_COUNTER: AtomicU64 = AtomicU64::new(0);

struct Checkout {
    dir: PathBuf,
}

impl Drop for Checkout {
    fn drop(&mut self) {
        let _ = fs::remove_dir_all(&self.dir);
    }
}

fn git(url: &str, args: &[&str], cwd: Option<&Path>, transient: bool) -> Result<(), FetchError> {
    let mut cmd = Command::new("git");
    cmd.args(args).env("GIT_TERMINAL_PROMPT", "0");
    if let Some(dir) = cwd {
        cmd.current_dir(dir);
    }
    let out = cmd.output().map_err(|e| FetchError::Transport {
        url: url.to_string(),
        message: format!("spawn git: {e}"),
        transient: false,
    })?;
    if out.status.success() {
        return Ok(());
    }
    Err(FetchError::Transport {
        url: url.to_string(),
        message: format!("git {}: {}", args.join(" "), String::from_utf8_lossy(&out.stderr).trim()),
        transient,
    })
}

/// Clones `url`, checks out `rev` and returns the worktree (without `.git`)
/// as a reproducible gzip'd tarball rooted at `package/`.
pub fn export(url: &str, rev: Option<&str>) -> Result<Vec<u8>, FetchError> {
    let dir = std::env::temp_dir().join(format!(
        "lockfetch-git-{}-{}",
        std::process::id(),
        CHECKOUT_COUNTER.fetch_add(1, Ordering::Relaxed)
    ));
    let checkout = Checkout { dir };
    let dir_str = checkout.dir.to_string_lossy().into_owned();
    debug!(url, ?rev, dir = %dir_str, "cloning");
    // clone failures are usually the network; checkout failures are a bad ref
    git(url, &["clone", "--quiet", "--no-checkout", url, &dir_str], None, true)?;
    git(url, &["checkout", "--quiet", "--detach", rev.unwrap_or("HEAD")], Some(&checkout.dir), false)?;
    pack_tree(&checkout.dir).map_err(|e| FetchError::Io { path: checkout.dir.clone(), source: e })
}

fn pack_tree(root: &Path) -> std::io::Result<Vec<u8>> {
    let encoder = GzEncoder::new(Vec::new(), Compression::default());
    let mut builder = tar::Builder::new(encoder);
    builder.mode(tar::HeaderMode::Deterministic);
    let walker = WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| e.file_name() != ".git");
    for entry in walker {
        let entry = entry.map_err(std::io::Error::other)?;
        let rel = match entry.path().strip_prefix(root) {
            Ok(rel) if !rel.as_os_str().is_empty() => rel,
            _ => continue,
        };
        let name = Path::new("package").join(rel);
        if entry.file_type().is_dir() {
            builder.append_dir(&name, entry.path())?;
        } else if entry.file_type().is_file() {
            builder.append_path_with_name(entry.path(), &name)?;
        }
    }
    builder.into_inner()?.finish()
}
