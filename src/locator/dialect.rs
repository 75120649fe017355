//! Lockfile dialects. Every syntax difference between supported major versions
//! lives in the [`DIALECTS`] table; the grammar in the parent module never
//! branches on a version.

use super::{range, split_ident, Locator};
use crate::error::{DialectSource, Error, MalformedLocator, Result};
use crate::integrity::Integrity;
use std::borrow::Cow;
use std::ops::RangeInclusive;
use tracing::debug;

#[derive(Debug, PartialEq, Eq)]
pub struct DialectRules {
    pub major: u32,
    /// `__metadata.version` values written by this major.
    pub metadata_versions: RangeInclusive<u32>,
    /// Registry ranges always carry `npm:`.
    pub qualified_ranges: bool,
    /// `file:` locators may carry `#<subdirectory>` and `::hash=`.
    pub file_extensions: bool,
    /// Prefix marking a builtin patch (`builtin<...>`) as optional in this dialect.
    pub optional_patch_marker: &'static str,
    /// Checksums are written as `<cacheKey>/<hex>`.
    pub checksum_cache_key_prefix: bool,
}

pub static DIALECTS: &[DialectRules] = &[
    DialectRules {
        major: 3,
        metadata_versions: 4..=6,
        qualified_ranges: false,
        file_extensions: false,
        optional_patch_marker: "~",
        checksum_cache_key_prefix: false,
    },
    DialectRules {
        major: 4,
        metadata_versions: 7..=8,
        qualified_ranges: true,
        file_extensions: true,
        optional_patch_marker: super::OPTIONAL_PATCH_MARKER,
        checksum_cache_key_prefix: true,
    },
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dialect {
    rules: &'static DialectRules,
}

impl Dialect {
    pub fn min_major() -> u32 {
        DIALECTS.iter().map(|d| d.major).min().unwrap_or(0)
    }

    pub fn max_major() -> u32 {
        DIALECTS.iter().map(|d| d.major).max().unwrap_or(0)
    }

    pub fn from_major(major: u32) -> Result<Self> {
        DIALECTS
            .iter()
            .find(|d| d.major == major)
            .map(|rules| Self { rules })
            .ok_or_else(|| Self::unsupported(DialectSource::Major(major)))
    }

    /// Maps a lockfile's `__metadata.version` onto the major that writes it.
    pub fn from_metadata_version(version: u32) -> Result<Self> {
        DIALECTS
            .iter()
            .find(|d| d.metadata_versions.contains(&version))
            .map(|rules| Self { rules })
            .ok_or_else(|| Self::unsupported(DialectSource::Metadata(version)))
    }

    fn unsupported(found: DialectSource) -> Error {
        Error::UnsupportedDialect { found, min: Self::min_major(), max: Self::max_major() }
    }

    pub fn major(&self) -> u32 {
        self.rules.major
    }

    pub fn rules(&self) -> &'static DialectRules {
        self.rules
    }

    /// Qualifies bare registry ranges with `npm:` so both spellings reach the
    /// grammar in one shape.
    pub fn normalize<'a>(&self, raw: &'a str) -> Cow<'a, str> {
        let Some((ident, reference)) = split_ident(raw.trim()) else {
            return Cow::Borrowed(raw);
        };
        if reference.contains(':') || reference.starts_with("git@") {
            return Cow::Borrowed(raw);
        }
        if !range::is_semver_range(reference) {
            return Cow::Borrowed(raw);
        }
        if self.rules.qualified_ranges {
            debug!(locator = raw, dialect = self.rules.major, "bare range in a qualified dialect");
        }
        Cow::Owned(format!("{ident}@npm:{reference}"))
    }

    pub fn parse_locator(&self, raw: &str) -> std::result::Result<Locator, MalformedLocator> {
        let normalized = self.normalize(raw);
        let mut locator = Locator::parse(&normalized).map_err(|e| MalformedLocator::new(raw, e.reason))?;
        self.adjust(&mut locator);
        Ok(locator)
    }

    /// Post-parse pass for markers the canonical grammar spells differently.
    fn adjust(&self, locator: &mut Locator) {
        if !self.rules.file_extensions
            && (locator.subdirectory.is_some() || locator.param("hash").is_some())
        {
            debug!(locator = %locator, dialect = self.rules.major, "file locator extension in older dialect");
        }
        let marker = self.rules.optional_patch_marker;
        if let Some(patch) = locator.patch.as_mut() {
            if !patch.optional {
                // `~/` is a project-relative path in every dialect, not a marker
                let builtin = patch.source.strip_prefix(marker).filter(|r| r.starts_with("builtin<"));
                if let Some(rest) = builtin {
                    patch.source = rest.to_string();
                    patch.optional = true;
                }
            }
        }
    }

    /// Reads a lockfile `checksum:` value. Older dialects keep the cache key in
    /// `__metadata`, newer ones prefix it onto every checksum; both yield the same digest.
    pub fn parse_checksum(&self, raw: &str) -> std::result::Result<Integrity, String> {
        if self.rules.checksum_cache_key_prefix && !raw.contains('/') && !raw.contains('-') {
            debug!(checksum = raw, "checksum without cache key prefix");
        }
        Integrity::parse(raw)
    }
}
