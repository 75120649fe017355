use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Run-level errors. Anything that reaches the caller as an `Err` stopped the
/// prefetch before fetching began; per-entry problems end up in the report.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    MalformedLocator(#[from] MalformedLocator),

    #[error("unsupported lockfile dialect {found} (this build understands {min} through {max})")]
    UnsupportedDialect { found: DialectSource, min: u32, max: u32 },

    #[error("failed to parse lockfile: {0}")]
    LockfileParse(String),

    #[error("corrupted lockfile: {0}")]
    LockfileCorrupted(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Write(#[from] WriteError),

    #[error("I/O error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Where an unsupported dialect number came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DialectSource {
    /// Declared yarn major.
    Major(u32),
    /// Detected from `__metadata.version`.
    Metadata(u32),
}

impl fmt::Display for DialectSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DialectSource::Major(major) => write!(f, "{major}"),
            DialectSource::Metadata(version) => write!(f, "for metadata version {version}"),
        }
    }
}

/// A lockfile resolution string the locator grammar rejects.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("malformed locator '{raw}': {reason}")]
pub struct MalformedLocator {
    pub raw: String,
    pub reason: String,
}

impl MalformedLocator {
    pub fn new(raw: impl Into<String>, reason: impl Into<String>) -> Self {
        Self { raw: raw.into(), reason: reason.into() }
    }
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("integrity mismatch for {locator}: expected {expected}, got {actual}")]
    Integrity { locator: String, expected: String, actual: String },

    #[error("{url} returned status {status}")]
    Status { url: String, status: u16 },

    #[error("transport error for {url}: {message}")]
    Transport { url: String, message: String, transient: bool },

    #[error("giving up on {url} after {attempts} attempts: {last}")]
    Exhausted { url: String, attempts: u32, last: Box<FetchError> },

    #[error("cannot fetch {locator}: {reason}")]
    Unsupported { locator: String, reason: String },

    #[error("read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("run cancelled")]
    Cancelled,
}

impl FetchError {
    /// Connection resets, timeouts and 5xx answers are worth another attempt.
    pub fn is_transient(&self) -> bool {
        match self {
            FetchError::Status { status, .. } => *status >= 500,
            FetchError::Transport { transient, .. } => *transient,
            _ => false,
        }
    }
}

#[derive(Debug, Error)]
pub enum WriteError {
    #[error("write cache entry {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("unknown cache layout '{0}'")]
    UnknownLayout(String),

    #[error("cache layout '{layout}' produced an unsafe path '{path}'")]
    UnsafePath { layout: String, path: String },

    #[error("invalid cache layout template '{template}': {reason}")]
    Template { template: String, reason: String },
}
