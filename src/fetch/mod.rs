pub mod git;
pub mod retry;

use crate::cancel::CancelToken;
use crate::error::FetchError;
use crate::guard;
use crate::integrity::{Algorithm, Integrity};
use crate::locator::{range, Locator, Protocol};
use once_cell::sync::Lazy;
use reqwest::blocking::Client;
use retry::{Clock, RetryPolicy, SystemClock};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

pub const DEFAULT_REGISTRY: &str = "https://registry.yarnpkg.com";

static CLIENT: Lazy<Result<Client, String>> = Lazy::new(|| {
    Client::builder()
        .timeout(Duration::from_secs(60))
        .user_agent(concat!("lockfetch/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| e.to_string())
});

/// Byte source for remote artifacts. The fetcher never talks to the network
/// except through this trait.
pub trait Transport: Send + Sync {
    fn get(&self, url: &str) -> Result<Vec<u8>, FetchError>;
    fn git_export(&self, url: &str, rev: Option<&str>) -> Result<Vec<u8>, FetchError>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct HttpTransport;

impl Transport for HttpTransport {
    fn get(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let client = CLIENT.as_ref().map_err(|message| FetchError::Transport {
            url: url.to_string(),
            message: format!("http client: {message}"),
            transient: false,
        })?;
        let transport_err = |e: reqwest::Error| FetchError::Transport {
            url: url.to_string(),
            transient: e.is_timeout() || e.is_connect() || e.is_request() || e.is_body(),
            message: e.to_string(),
        };
        let resp = client.get(url).send().map_err(transport_err)?;
        let status = resp.status();
        if !status.is_success() {
            return Err(FetchError::Status { url: url.to_string(), status: status.as_u16() });
        }
        Ok(resp.bytes().map_err(transport_err)?.to_vec())
    }

    fn git_export(&self, url: &str, rev: Option<&str>) -> Result<Vec<u8>, FetchError> {
        git::export(url, rev)
    }
}

/// Verified artifact bytes, ready for the cache writer.
#[derive(Debug, Clone)]
pub struct Artifact {
    pub bytes: Vec<u8>,
    /// Declared integrity when present (and matched), otherwise a computed sha512.
    pub digest: Integrity,
    pub attempts: u32,
}

#[derive(Clone)]
pub struct Fetcher {
    registry: String,
    project_root: PathBuf,
    transport: Arc<dyn Transport>,
    clock: Arc<dyn Clock>,
    retry: RetryPolicy,
}

impl std::fmt::Debug for Fetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Fetcher")
            .field("registry", &self.registry)
            .field("project_root", &self.project_root)
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

impl Fetcher {
    pub fn new(registry: Option<String>, project_root: impl Into<PathBuf>) -> Self {
        Self::with_transport(registry, project_root, Arc::new(HttpTransport))
    }

    pub fn with_transport(
        registry: Option<String>,
        project_root: impl Into<PathBuf>,
        transport: Arc<dyn Transport>,
    ) -> Self {
        let registry = registry.unwrap_or_else(|| DEFAULT_REGISTRY.into());
        Self {
            registry: registry.trim_end_matches('/').to_string(),
            project_root: project_root.into(),
            transport,
            clock: Arc::new(SystemClock),
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn registry(&self) -> &str {
        &self.registry
    }

    /// `<registry>/<name>/-/<basename>-<version>.tgz`; requires a pinned version.
    pub fn tarball_url(&self, locator: &Locator) -> Result<String, FetchError> {
        if let Some(url) = locator.param("__archiveUrl") {
            return Ok(percent_encoding::percent_decode_str(url).decode_utf8_lossy().into_owned());
        }
        let unsupported = |reason: &str| FetchError::Unsupported {
            locator: locator.to_string(),
            reason: reason.to_string(),
        };
        let (ident, reference) =
            locator.registry_target().ok_or_else(|| unsupported("not a registry locator"))?;
        let version = range::exact_version(&reference)
            .ok_or_else(|| unsupported("registry reference is not pinned to an exact version"))?;
        Ok(format!("{}/{}/-/{}-{}.tgz", self.registry, ident, ident.name, version))
    }

    pub fn fetch(&self, locator: &Locator, cancel: &CancelToken) -> Result<Artifact, FetchError> {
        let (bytes, attempts) = match &locator.protocol {
            Protocol::Registry => {
                let url = self.tarball_url(locator)?;
                self.with_retries(&url, cancel, |t| t.get(&url))?
            }
            Protocol::Http => {
                let url = locator.reference.clone();
                self.with_retries(&url, cancel, |t| t.get(&url))?
            }
            Protocol::Git => {
                let (url, rev) = locator.git_source().ok_or_else(|| FetchError::Unsupported {
                    locator: locator.to_string(),
                    reason: "unreadable git reference".into(),
                })?;
                self.with_retries(&url, cancel, |t| t.git_export(&url, rev.as_deref()))?
            }
            Protocol::File => {
                let path = guard::contained_path(locator, &self.project_root).ok_or_else(|| {
                    FetchError::Unsupported {
                        locator: locator.to_string(),
                        reason: "path escapes project root".into(),
                    }
                })?;
                let bytes = std::fs::read(&path).map_err(|source| FetchError::Io { path, source })?;
                (bytes, 1)
            }
            other => {
                return Err(FetchError::Unsupported {
                    locator: locator.to_string(),
                    reason: format!("{other} locators are never fetched"),
                })
            }
        };
        let digest = verify(locator, &bytes)?;
        debug!(locator = %locator, attempts, size = bytes.len(), "fetched");
        Ok(Artifact { bytes, digest, attempts })
    }

    fn with_retries(
        &self,
        url: &str,
        cancel: &CancelToken,
        op: impl Fn(&dyn Transport) -> Result<Vec<u8>, FetchError>,
    ) -> Result<(Vec<u8>, u32), FetchError> {
        retry::run(&self.retry, self.clock.as_ref(), cancel, url, |_| op(self.transport.as_ref()))
    }
}

/// Recomputes the digest with the declared algorithm. Artifacts without a
/// declared integrity get a sha512 for the report.
///
/// The digest is taken over the fetched bytes as-is. Lockfiles written by
/// `yarn install` checksum yarn's own cache zip rather than the registry
/// tarball, so their checksums only match archives produced the same way.
pub fn verify(locator: &Locator, bytes: &[u8]) -> Result<Integrity, FetchError> {
    match &locator.integrity {
        Some(expected) => {
            let actual = Integrity::compute(expected.algorithm, bytes);
            if actual.digest != expected.digest {
                return Err(FetchError::Integrity {
                    locator: locator.to_string(),
                    expected: expected.to_sri(),
                    actual: actual.to_sri(),
                });
            }
            Ok(actual)
        }
        None => Ok(Integrity::compute(Algorithm::Sha512, bytes)),
    }
}
