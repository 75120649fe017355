use crate::locator::Protocol;
use anyhow::Result;
use clap::{Args, CommandFactory, Parser, Subcommand};
use std::path::PathBuf;

pub mod commands;
pub mod logging;

use logging::{LogFormat, LogLevel};

#[derive(Parser, Debug)]
#[command(
    name = "lockfetch",
    version,
    about = "Hermetic prefetch of every artifact a yarn.lock pins",
    long_about = "lockfetch reads a Yarn lockfile, decides which entries may be fetched, downloads and verifies them and lays them out as an offline cache.\n\nExamples:\n  lockfetch check\n  lockfetch fetch --output ./offline-cache --report report.json\n  lockfetch fetch --hardened --allow registry,git\n  lockfetch cache ls"
)]
pub struct LockfetchCli {
    /// Minimum log level written to stderr (LOCKFETCH_LOG overrides)
    #[arg(long, global = true, value_enum, default_value_t = LogLevel::Warn)]
    pub log_level: LogLevel,
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Compact)]
    pub log_format: LogFormat,
    #[command(subcommand)]
    pub(crate) command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Fetch every permitted lockfile entry into the offline cache
    Fetch(FetchArgs),
    /// Parse and classify the lockfile without touching the network
    Check(ProjectArgs),
    /// Inspect the cache directory
    Cache {
        /// Cache root (defaults to the user cache directory)
        #[arg(long, global = true)]
        output: Option<PathBuf>,
        #[command(subcommand)]
        cmd: CacheCmd,
    },
}

#[derive(Args, Debug, Clone)]
pub struct ProjectArgs {
    /// Lockfile to read (defaults to <project>/yarn.lock)
    #[arg(long)]
    pub lockfile: Option<PathBuf>,
    #[arg(long, default_value = ".")]
    pub project: PathBuf,
    /// Config file (defaults to <project>/lockfetch.yml when present)
    #[arg(long)]
    pub config: Option<PathBuf>,
    /// Yarn major version that wrote the lockfile; detected when omitted
    #[arg(long)]
    pub dialect: Option<u32>,
    /// Protocols allowed to be fetched, comma separated
    #[arg(long, value_delimiter = ',')]
    pub allow: Option<Vec<Protocol>>,
    /// Require checksums everywhere and full commit hashes for git
    #[arg(long)]
    pub hardened: bool,
    /// Record malformed locators as failures instead of aborting
    #[arg(long)]
    pub lenient: bool,
}

#[derive(Args, Debug, Clone)]
pub struct FetchArgs {
    #[command(flatten)]
    pub project: ProjectArgs,
    /// Cache root to populate
    #[arg(long)]
    pub output: Option<PathBuf>,
    #[arg(long)]
    pub registry: Option<String>,
    /// Cache layout name (yarn, npm, cas or one from the config file)
    #[arg(long)]
    pub layout: Option<String>,
    #[arg(long, short = 'j')]
    pub jobs: Option<usize>,
    /// Abort outstanding work after this many seconds
    #[arg(long)]
    pub timeout: Option<u64>,
    /// Write the JSON report here ("-" for stdout)
    #[arg(long)]
    pub report: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum CacheCmd {
    /// Show the cache path on this machine
    Path,
    /// List cached artifacts
    Ls {
        #[arg(long)]
        json: bool,
    },
    /// Remove every cached artifact
    Clean,
}

impl LockfetchCli {
    pub fn parse() -> Self {
        <Self as Parser>::parse()
    }

    pub fn init_logging(&self) -> Result<()> {
        logging::init(self.log_level, self.log_format)
    }

    /// Runs the selected command and returns the process exit code.
    pub fn run(&self) -> Result<i32> {
        match &self.command {
            None => {
                Self::command().print_help()?;
                println!();
                Ok(0)
            }
            Some(Commands::Fetch(args)) => commands::cmd_fetch(args),
            Some(Commands::Check(args)) => commands::cmd_check(args),
            Some(Commands::Cache { output, cmd }) => {
                let root = commands::cache_root(output.as_deref());
                match cmd {
                    CacheCmd::Path => commands::cmd_cache_path(&root)?,
                    CacheCmd::Ls { json } => commands::cmd_cache_ls(&root, *json)?,
                    CacheCmd::Clean => commands::cmd_cache_clean(&root)?,
                }
                Ok(0)
            }
        }
    }
}
