//! Lockfile locators: `ident@protocol:reference[#subdirectory][::key=value&...]`.
//!
//! Parsing is pure and version-agnostic; the per-dialect differences are
//! absorbed by [`dialect`] before and after this grammar runs.

pub mod dialect;
pub mod range;

use crate::error::MalformedLocator;
use crate::integrity::Integrity;
use percent_encoding::percent_decode_str;
use serde::{Serialize, Serializer};
use std::borrow::Cow;
use std::fmt;
use std::str::FromStr;

/// Marker a patch source carries when the patch may be missing.
pub const OPTIONAL_PATCH_MARKER: &str = "optional!";

/// Version yarn writes for workspaces and other unpublished packages.
pub const UNRESOLVED_LOCAL_VERSION: &str = "0.0.0-use.local";

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Ident {
    pub scope: Option<String>,
    pub name: String,
}

impl Ident {
    pub fn parse(raw: &str) -> Option<Self> {
        if let Some(rest) = raw.strip_prefix('@') {
            let (scope, name) = rest.split_once('/')?;
            if scope.is_empty() || !valid_name(name) {
                return None;
            }
            return Some(Self { scope: Some(scope.to_string()), name: name.to_string() });
        }
        if !valid_name(raw) {
            return None;
        }
        Some(Self { scope: None, name: raw.to_string() })
    }

    /// Flat form used in single-level cache file names (`@types/node` => `@types-node`).
    pub fn slug(&self) -> String {
        match &self.scope {
            Some(scope) => format!("@{scope}-{}", self.name),
            None => self.name.clone(),
        }
    }
}

fn valid_name(name: &str) -> bool {
    !name.is_empty() && !name.contains(['/', '\\', '@', ':', '#']) && name != "." && name != ".."
}

impl fmt::Display for Ident {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.scope {
            Some(scope) => write!(f, "@{scope}/{}", self.name),
            None => f.write_str(&self.name),
        }
    }
}

impl Serialize for Ident {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Resolution kind of a locator. `Unknown` keeps the unrecognised prefix so the
/// parser can report it; it never survives a successful parse.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Protocol {
    Registry,
    Git,
    Http,
    File,
    Link,
    Workspace,
    Patch,
    Exec,
    Unknown(String),
}

impl Protocol {
    pub fn as_str(&self) -> &str {
        match self {
            Protocol::Registry => "registry",
            Protocol::Git => "git",
            Protocol::Http => "http",
            Protocol::File => "file",
            Protocol::Link => "link",
            Protocol::Workspace => "workspace",
            Protocol::Patch => "patch",
            Protocol::Exec => "exec",
            Protocol::Unknown(prefix) => prefix,
        }
    }

    /// Tag as yarn spells it in locators and cache file names (`npm`, not `registry`).
    pub fn lockfile_tag(&self) -> &str {
        match self {
            Protocol::Registry => "npm",
            other => other.as_str(),
        }
    }

    /// Protocols whose reference is a path relative to the declaring package.
    pub fn is_path_bearing(&self) -> bool {
        matches!(self, Protocol::File | Protocol::Link | Protocol::Workspace)
    }

    fn from_prefix(prefix: &str) -> Protocol {
        match prefix {
            "npm" => Protocol::Registry,
            "file" => Protocol::File,
            "link" | "portal" => Protocol::Link,
            "workspace" => Protocol::Workspace,
            "patch" => Protocol::Patch,
            "exec" => Protocol::Exec,
            "github" | "git" | "git+ssh" | "git+http" | "git+https" | "git+file" => Protocol::Git,
            "http" | "https" => Protocol::Http,
            other => Protocol::Unknown(other.to_string()),
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Protocol {
    type Err = String;

    /// Names accepted in allow-lists. Ecosystem aliases map onto the canonical tags.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "registry" | "npm" => Ok(Protocol::Registry),
            "git" => Ok(Protocol::Git),
            "http" | "https" | "tarball" => Ok(Protocol::Http),
            "file" => Ok(Protocol::File),
            "link" | "portal" => Ok(Protocol::Link),
            "workspace" => Ok(Protocol::Workspace),
            "patch" => Ok(Protocol::Patch),
            "exec" => Ok(Protocol::Exec),
            other => Err(format!("unknown protocol '{other}'")),
        }
    }
}

impl Serialize for Protocol {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> serde::Deserialize<'de> for Protocol {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// The decoded halves of a `patch:` reference.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PatchTarget {
    pub base: Locator,
    /// Patch source without any optional marker, percent-decoded.
    pub source: String,
    pub optional: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Locator {
    pub ident: Ident,
    pub protocol: Protocol,
    /// Protocol payload exactly as written in the lockfile, percent-encoding included.
    pub reference: String,
    pub subdirectory: Option<String>,
    /// `::key=value` binding parameters in lockfile order, verbatim.
    pub params: Vec<(String, String)>,
    pub patch: Option<Box<PatchTarget>>,
    /// Declared checksum; comes from the lockfile record, not the locator string.
    pub integrity: Option<Integrity>,
    /// `version:` of the lockfile record this locator resolved to.
    pub resolved_version: Option<String>,
}

impl Locator {
    pub fn parse(raw: &str) -> Result<Self, MalformedLocator> {
        let trimmed = raw.trim();
        let (ident_raw, reference) = split_ident(trimmed)
            .ok_or_else(|| MalformedLocator::new(raw, "expected '<name>@<reference>'"))?;
        let ident = Ident::parse(ident_raw)
            .ok_or_else(|| MalformedLocator::new(raw, format!("invalid package name '{ident_raw}'")))?;
        if reference.is_empty() {
            return Err(MalformedLocator::new(raw, "empty reference"));
        }
        parse_reference(raw, ident, reference)
    }

    pub fn param(&self, key: &str) -> Option<&str> {
        self.params.iter().find(|(k, _)| k == key).map(|(_, v)| v.as_str())
    }

    pub fn with_integrity(mut self, integrity: Option<Integrity>) -> Self {
        self.integrity = integrity;
        self
    }

    /// Records the lockfile's resolved version. Workspace placeholders such as
    /// `0.0.0-use.local` carry no real version and are dropped.
    pub fn with_resolved_version(mut self, version: Option<&str>) -> Self {
        self.resolved_version = version
            .map(str::trim)
            .filter(|v| !v.is_empty() && *v != UNRESOLVED_LOCAL_VERSION)
            .map(str::to_string);
        self
    }

    /// Reference with percent-escapes decoded; the form used for comparisons and paths.
    pub fn decoded_reference(&self) -> Cow<'_, str> {
        decode(&self.reference)
    }

    /// Identity used to detect duplicate lockfile entries. The subdirectory counts
    /// as part of the reference: two packages may live in one archive.
    pub fn identity(&self) -> (String, Protocol, String, Option<String>) {
        (
            self.ident.to_string(),
            self.protocol.clone(),
            self.decoded_reference().into_owned(),
            self.subdirectory.clone(),
        )
    }

    /// Package actually requested from the registry; differs from `ident` for aliases
    /// such as `string-width-cjs@npm:string-width@4.2.3`.
    pub fn registry_target(&self) -> Option<(Ident, String)> {
        if self.protocol != Protocol::Registry {
            return None;
        }
        let decoded = self.decoded_reference();
        match split_ident(&decoded) {
            Some((name, version)) if !name.is_empty() => {
                Some((Ident::parse(name)?, version.to_string()))
            }
            _ => Some((self.ident.clone(), decoded.into_owned())),
        }
    }

    /// Version string the cache layout and the report are keyed by.
    pub fn version(&self) -> Option<String> {
        let pinned = match self.protocol {
            Protocol::Registry => self
                .registry_target()
                .and_then(|(_, v)| range::exact_version(&v))
                .map(|v| v.to_string()),
            Protocol::Patch => self
                .param("version")
                .map(str::to_string)
                .or_else(|| self.patch.as_ref().and_then(|p| p.base.version())),
            _ => self.param("version").map(str::to_string),
        };
        pinned.or_else(|| self.resolved_version.clone())
    }

    /// Clone URL and requested revision for git locators.
    pub fn git_source(&self) -> Option<(String, Option<String>)> {
        if self.protocol != Protocol::Git {
            return None;
        }
        let (url, fragment) = match self.reference.split_once('#') {
            Some((url, frag)) => (url, Some(frag)),
            None => (self.reference.as_str(), None),
        };
        let url = if let Some(rest) = url.strip_prefix("github:") {
            format!("https://github.com/{}.git", rest.trim_end_matches(".git"))
        } else if let Some(rest) = url.strip_prefix("git+") {
            rest.to_string()
        } else {
            url.to_string()
        };
        Some((url, fragment.and_then(git_revision)))
    }
}

/// Picks the revision out of a git fragment: `abc123`, `commit=abc123`,
/// `tag=v1&commit=abc123`, `head=main`.
fn git_revision(fragment: &str) -> Option<String> {
    if fragment.is_empty() {
        return None;
    }
    if !fragment.contains('=') {
        return Some(decode(fragment).into_owned());
    }
    let pairs: Vec<(&str, &str)> =
        fragment.split('&').filter_map(|pair| pair.split_once('=')).collect();
    ["commit", "tag", "head", "semver"]
        .iter()
        .find_map(|key| pairs.iter().find(|(k, _)| k == key).map(|(_, v)| decode(v).into_owned()))
}

fn decode(raw: &str) -> Cow<'_, str> {
    percent_decode_str(raw).decode_utf8_lossy()
}

/// Splits `name@ref` / `@scope/name@ref`. The scope's leading `@` is not a separator.
pub(crate) fn split_ident(raw: &str) -> Option<(&str, &str)> {
    let search_from = usize::from(raw.starts_with('@'));
    let at = raw[search_from..].find('@')? + search_from;
    Some((&raw[..at], &raw[at + 1..]))
}

fn split_params<'a>(raw: &str, payload: &'a str) -> Result<(&'a str, Vec<(String, String)>), MalformedLocator> {
    let Some((body, params)) = payload.split_once("::") else {
        return Ok((payload, Vec::new()));
    };
    let mut out = Vec::new();
    for pair in params.split('&') {
        let (k, v) = pair
            .split_once('=')
            .ok_or_else(|| MalformedLocator::new(raw, format!("binding parameter '{pair}' is not key=value")))?;
        if k.is_empty() {
            return Err(MalformedLocator::new(raw, "empty binding parameter name"));
        }
        out.push((k.to_string(), v.to_string()));
    }
    Ok((body, out))
}

fn looks_like_git_url(url: &str) -> bool {
    let base = url.split('#').next().unwrap_or(url);
    base.ends_with(".git") || url.contains("#commit=")
}

fn parse_reference(raw: &str, ident: Ident, reference: &str) -> Result<Locator, MalformedLocator> {
    let mut locator = Locator {
        ident,
        protocol: Protocol::Registry,
        reference: String::new(),
        subdirectory: None,
        params: Vec::new(),
        patch: None,
        integrity: None,
        resolved_version: None,
    };

    // scp-style git remotes have no protocol prefix
    if reference.starts_with("git@") {
        locator.protocol = Protocol::Git;
        locator.reference = reference.to_string();
        return Ok(locator);
    }

    let Some((prefix, payload)) = reference.split_once(':') else {
        return bare_range(raw, locator, reference);
    };
    if !prefix.chars().all(|c| c.is_ascii_alphanumeric() || c == '+') {
        return bare_range(raw, locator, reference);
    }

    match Protocol::from_prefix(prefix) {
        Protocol::Patch => {
            let (body, params) = split_params(raw, payload)?;
            let (base_raw, source_raw) = body
                .split_once('#')
                .ok_or_else(|| MalformedLocator::new(raw, "patch locator is missing '#<patch-source>'"))?;
            if source_raw.is_empty() {
                return Err(MalformedLocator::new(raw, "empty patch source"));
            }
            let base = Locator::parse(&decode(base_raw)).map_err(|e| {
                MalformedLocator::new(raw, format!("invalid patch base: {}", e.reason))
            })?;
            let source = decode(source_raw);
            let (optional, source) = match source.strip_prefix(OPTIONAL_PATCH_MARKER) {
                Some(rest) => (true, rest.to_string()),
                None => (false, source.into_owned()),
            };
            locator.protocol = Protocol::Patch;
            locator.reference = body.to_string();
            locator.params = params;
            locator.patch = Some(Box::new(PatchTarget { base, source, optional }));
        }
        Protocol::File => {
            let (body, params) = split_params(raw, payload)?;
            let (path, subdirectory) = match body.split_once('#') {
                Some((_, "")) => {
                    return Err(MalformedLocator::new(raw, "empty subdirectory after '#'"));
                }
                Some((path, sub)) => (path, Some(sub.to_string())),
                None => (body, None),
            };
            if path.is_empty() {
                return Err(MalformedLocator::new(raw, "empty file path"));
            }
            locator.protocol = Protocol::File;
            locator.reference = path.to_string();
            locator.subdirectory = subdirectory;
            locator.params = params;
        }
        protocol @ (Protocol::Link | Protocol::Workspace | Protocol::Exec | Protocol::Registry) => {
            let (body, params) = split_params(raw, payload)?;
            if body.is_empty() {
                return Err(MalformedLocator::new(raw, format!("empty {protocol} reference")));
            }
            if protocol == Protocol::Registry {
                validate_registry_reference(raw, body)?;
            }
            locator.protocol = protocol;
            locator.reference = body.to_string();
            locator.params = params;
        }
        Protocol::Http if looks_like_git_url(reference) => {
            locator.protocol = Protocol::Git;
            locator.reference = reference.to_string();
        }
        protocol @ (Protocol::Http | Protocol::Git) => {
            if payload.trim_start_matches('/').is_empty() {
                return Err(MalformedLocator::new(raw, format!("empty {protocol} URL")));
            }
            locator.protocol = protocol;
            locator.reference = reference.to_string();
        }
        Protocol::Unknown(prefix) => {
            return Err(MalformedLocator::new(raw, format!("unknown protocol '{prefix}:'")));
        }
    }
    Ok(locator)
}

/// `npm:` takes a range or an alias (`npm:other-name@range`).
fn validate_registry_reference(raw: &str, body: &str) -> Result<(), MalformedLocator> {
    let decoded = decode(body);
    let range = match split_ident(&decoded) {
        Some((alias, range)) if !alias.is_empty() => {
            if Ident::parse(alias).is_none() {
                return Err(MalformedLocator::new(raw, format!("invalid alias target '{alias}'")));
            }
            range.to_string()
        }
        _ => decoded.into_owned(),
    };
    if range::is_semver_range(&range) {
        Ok(())
    } else {
        Err(MalformedLocator::new(raw, format!("'{range}' is not a version range")))
    }
}

fn bare_range(raw: &str, mut locator: Locator, reference: &str) -> Result<Locator, MalformedLocator> {
    if !range::is_semver_range(reference) {
        return Err(MalformedLocator::new(
            raw,
            format!("'{reference}' is neither a known protocol nor a version range"),
        ));
    }
    locator.protocol = Protocol::Registry;
    locator.reference = reference.to_string();
    Ok(locator)
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@", self.ident)?;
        match &self.protocol {
            Protocol::Git | Protocol::Http => f.write_str(&self.reference)?,
            Protocol::Registry => write!(f, "npm:{}", self.reference)?,
            Protocol::Unknown(prefix) => write!(f, "{prefix}:{}", self.reference)?,
            other => write!(f, "{}:{}", other.as_str(), self.reference)?,
        }
        if let Some(sub) = &self.subdirectory {
            write!(f, "#{sub}")?;
        }
        if !self.params.is_empty() {
            f.write_str("::")?;
            for (i, (k, v)) in self.params.iter().enumerate() {
                if i > 0 {
                    f.write_str("&")?;
                }
                write!(f, "{k}={v}")?;
            }
        }
        Ok(())
    }
}

impl Serialize for Locator {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}
