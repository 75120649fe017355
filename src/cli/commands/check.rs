use super::{load_project, overrides};
use crate::cli::ProjectArgs;
use crate::colors::*;
use crate::config::Settings;
use crate::policy::Classification;
use crate::prefetch;
use anyhow::Result;

/// Dry run: parse, classify and guard-check without any network access.
pub fn cmd_check(args: &ProjectArgs) -> Result<i32> {
    let project = load_project(args)?;
    let settings = Settings::resolve(&project.root, project.config, overrides(args))?;
    let plan = prefetch::plan(&project.lockfile, &settings.policy, settings.options.dialect)?;

    println!(
        "{C_GRAY}[lockfetch]{C_RESET} dialect {} ({} entries)",
        plan.dialect.major(),
        plan.entries.len()
    );
    let mut blocked = 0usize;
    for entry in &plan.entries {
        let label = match entry.classification {
            Some(Classification::Fetchable) => format!("{C_GREEN}fetch{C_RESET}"),
            Some(Classification::Skip(reason)) => format!("{C_DIM}skip ({reason}){C_RESET}"),
            Some(Classification::Deny(reason)) => {
                blocked += 1;
                format!("{C_YELLOW}deny ({reason}){C_RESET}")
            }
            None => {
                blocked += 1;
                format!("{C_RED}malformed{C_RESET}")
            }
        };
        println!("{C_GRAY}[lockfetch]{C_RESET}  {C_DIM}-{C_RESET} {} {label}", entry.raw);
    }
    Ok(if blocked == 0 { 0 } else { 1 })
}
