use crate::cache::list_entries;
use crate::colors::*;
use crate::fsutil;
use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

pub fn cache_root(output: Option<&Path>) -> PathBuf {
    output.map(Path::to_path_buf).unwrap_or_else(fsutil::default_cache_root)
}

pub fn cmd_cache_path(root: &Path) -> Result<()> {
    println!("{C_GRAY}[lockfetch]{C_RESET} cache: {}", root.display());
    Ok(())
}

pub fn cmd_cache_ls(root: &Path, json: bool) -> Result<()> {
    let entries = list_entries(root);
    if json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }
    println!(
        "{C_GRAY}[lockfetch]{C_RESET} {} cached artifacts under {}",
        entries.len(),
        root.display()
    );
    for entry in &entries {
        println!(
            "{C_GRAY}[lockfetch]{C_RESET}  {C_DIM}-{C_RESET} {} {C_DIM}({} bytes){C_RESET}",
            entry.path.display(),
            entry.size
        );
    }
    Ok(())
}

pub fn cmd_cache_clean(root: &Path) -> Result<()> {
    if root.exists() {
        fs::remove_dir_all(root).with_context(|| format!("remove {}", root.display()))?;
    }
    fsutil::ensure_dir(root).with_context(|| format!("create {}", root.display()))?;
    println!(
        "{C_GRAY}[lockfetch]{C_RESET} {C_GREEN}cache cleaned{C_RESET} at {}",
        root.display()
    );
    Ok(())
}
