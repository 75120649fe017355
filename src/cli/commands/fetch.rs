use super::{load_project, overrides};
use crate::cancel::CancelToken;
use crate::cli::FetchArgs;
use crate::colors::*;
use crate::config::Settings;
use crate::fsutil::atomic_write;
use crate::prefetch::Prefetcher;
use crate::report::{Report, ResolutionOutcome};
use anyhow::{Context, Result};
use std::path::Path;
use std::time::Instant;

pub fn cmd_fetch(args: &FetchArgs) -> Result<i32> {
    let project = load_project(&args.project)?;
    let mut cli = overrides(&args.project);
    cli.output = args.output.clone();
    cli.registry = args.registry.clone();
    cli.layout = args.layout.clone();
    cli.jobs = args.jobs;
    cli.timeout_secs = args.timeout;
    let settings = Settings::resolve(&project.root, project.config, cli)?;
    let cancel = match settings.timeout {
        Some(timeout) => CancelToken::with_timeout(timeout),
        None => CancelToken::new(),
    };

    let to_stdout = args.report.as_deref() == Some(Path::new("-"));
    let cache_root = settings.options.cache_root.clone();
    if !to_stdout {
        println!(
            "{C_GRAY}[lockfetch]{C_RESET} prefetching {count} lockfile entries into {path}",
            count = project.lockfile.records.len(),
            path = cache_root.display()
        );
    }
    let start = Instant::now();
    let report = Prefetcher::new(settings.policy, settings.options).run(&project.lockfile, &cancel)?;

    if to_stdout {
        println!("{}", report.to_json()?);
    } else {
        print_entries(&report);
        print_summary(&report, start.elapsed().as_secs_f64());
        if let Some(path) = &args.report {
            let json = report.to_json()?;
            atomic_write(path, format!("{json}\n").as_bytes())
                .with_context(|| format!("write report {}", path.display()))?;
            println!("{C_GRAY}[lockfetch]{C_RESET} report written to {}", path.display());
        }
    }
    Ok(if report.success() { 0 } else { 1 })
}

fn print_entries(report: &Report) {
    for entry in &report.entries {
        match &entry.outcome {
            ResolutionOutcome::Fetched { .. } => {}
            ResolutionOutcome::Skipped { reason } => println!(
                "{C_GRAY}[lockfetch]{C_RESET} {C_DIM}skip{C_RESET} {} {C_DIM}({reason}){C_RESET}",
                entry.locator
            ),
            ResolutionOutcome::Denied { reason } => println!(
                "{C_GRAY}[lockfetch]{C_RESET} {C_YELLOW}deny{C_RESET} {} ({reason})",
                entry.locator
            ),
            ResolutionOutcome::Failed { cause, .. } => println!(
                "{C_GRAY}[lockfetch]{C_RESET} {C_RED}fail{C_RESET} {}: {cause}",
                entry.locator
            ),
        }
    }
}

fn print_summary(report: &Report, secs: f64) {
    let s = &report.summary;
    let status = if report.success() {
        format!("{C_GREEN}ok{C_RESET}")
    } else {
        format!("{C_RED}incomplete{C_RESET}")
    };
    println!(
        "{C_GRAY}[lockfetch]{C_RESET} {status}: {C_GREEN}{} fetched{C_RESET}, {} skipped, {C_YELLOW}{} denied{C_RESET}, {C_RED}{} failed{C_RESET} in {secs:.2}s",
        s.fetched, s.skipped, s.denied, s.failed
    );
}
