use crate::error::FetchError;
use crate::fetch::retry::{FakeClock, RetryPolicy};
use crate::fetch::{Fetcher, Transport};
use crate::integrity::{Algorithm, Integrity};
use crate::locator::dialect::Dialect;
use crate::locator::Locator;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

pub const REGISTRY: &str = "https://registry.test";

/// In-memory network: canned bodies per URL, optional transient failures in
/// front of them, and a call counter.
#[derive(Default)]
pub struct StubTransport {
    bodies: Mutex<HashMap<String, Vec<u8>>>,
    failures: Mutex<HashMap<String, u32>>,
    calls: Mutex<HashMap<String, u32>>,
}

impl StubTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn serve(self, url: &str, body: &[u8]) -> Self {
        self.bodies.lock().insert(url.to_string(), body.to_vec());
        self
    }

    /// The first `n` requests for `url` answer 503.
    pub fn fail_first(self, url: &str, n: u32) -> Self {
        self.failures.lock().insert(url.to_string(), n);
        self
    }

    pub fn calls(&self, url: &str) -> u32 {
        self.calls.lock().get(url).copied().unwrap_or(0)
    }

    pub fn total_calls(&self) -> u32 {
        self.calls.lock().values().sum()
    }

    fn answer(&self, key: &str) -> Result<Vec<u8>, FetchError> {
        *self.calls.lock().entry(key.to_string()).or_default() += 1;
        if let Some(left) = self.failures.lock().get_mut(key) {
            if *left > 0 {
                *left -= 1;
                return Err(FetchError::Status { url: key.to_string(), status: 503 });
            }
        }
        self.bodies
            .lock()
            .get(key)
            .cloned()
            .ok_or_else(|| FetchError::Status { url: key.to_string(), status: 404 })
    }
}

impl Transport for StubTransport {
    fn get(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        self.answer(url)
    }

    fn git_export(&self, url: &str, rev: Option<&str>) -> Result<Vec<u8>, FetchError> {
        self.answer(&format!("{url}#{}", rev.unwrap_or("HEAD")))
    }
}

pub fn fast_retry(max_attempts: u32) -> RetryPolicy {
    RetryPolicy {
        max_attempts,
        base_delay: Duration::from_millis(10),
        max_delay: Duration::from_millis(40),
    }
}

pub fn stub_fetcher(transport: &Arc<StubTransport>, root: &Path, max_attempts: u32) -> Fetcher {
    let transport: Arc<dyn Transport> = transport.clone();
    Fetcher::with_transport(Some(REGISTRY.to_string()), root, transport)
        .with_retry(fast_retry(max_attempts))
        .with_clock(Arc::new(FakeClock::new()))
}

pub fn tarball_url(name: &str, version: &str) -> String {
    let base = name.rsplit('/').next().unwrap_or(name);
    format!("{REGISTRY}/{name}/-/{base}-{version}.tgz")
}

pub fn sha512_hex(bytes: &[u8]) -> String {
    Integrity::compute(Algorithm::Sha512, bytes).hex()
}

pub fn sha512_sri(bytes: &[u8]) -> String {
    Integrity::compute(Algorithm::Sha512, bytes).to_sri()
}

pub fn v4(raw: &str) -> Locator {
    Dialect::from_major(4).and_then(|d| Ok(d.parse_locator(raw)?)).expect("parse v4 locator")
}

pub fn v3(raw: &str) -> Locator {
    Dialect::from_major(3).and_then(|d| Ok(d.parse_locator(raw)?)).expect("parse v3 locator")
}

/// A dialect-4 lockfile. Each record is `(key, resolution, checksum)`.
pub fn lockfile_v4(records: &[(&str, &str, Option<String>)]) -> String {
    let mut out = String::from(
        "# This file is generated by running \"yarn install\" inside your project.\n\n__metadata:\n  version: 8\n  cacheKey: 10c0\n",
    );
    for (key, resolution, checksum) in records {
        out.push_str(&format!("\n\"{key}\":\n  version: 0.0.0-use.local\n  resolution: \"{resolution}\"\n"));
        if let Some(sum) = checksum {
            out.push_str(&format!("  checksum: {sum}\n"));
        }
        out.push_str("  languageName: node\n  linkType: hard\n");
    }
    out
}
