pub mod cache;
pub mod cancel;
pub mod cli;
pub mod colors;
pub mod config;
pub mod error;
pub mod fetch;
pub mod fsutil;
pub mod guard;
pub mod integrity;
pub mod locator;
pub mod lockfile;
pub mod policy;
pub mod prefetch;
pub mod report;
#[cfg(test)]
pub mod tests;

pub use error::{Error, Result};
pub use locator::Locator;
pub use prefetch::{PrefetchOptions, Prefetcher};
pub use report::Report;
