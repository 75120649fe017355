use crate::locator::range::{canonicalize_npm_range, exact_version, is_semver_range};
use semver::VersionReq;

#[test]
fn test_basic_wildcards() {
    assert_eq!(canonicalize_npm_range("*"), "*");
    assert_eq!(canonicalize_npm_range("1.x"), ">=1.0.0, <2.0.0");
    assert_eq!(canonicalize_npm_range("1.2.x"), ">=1.2.0, <1.3.0");
}

#[test]
fn test_hyphen() {
    assert_eq!(canonicalize_npm_range("1.2.3 - 2.3.4"), ">=1.2.3, <=2.3.4");
}

#[test]
fn canonicalize_inserts_comma_between_comparators() {
    let out = canonicalize_npm_range("^3.1.0 < 4");
    assert_eq!(out, "^3.1.0, <4");
    assert!(VersionReq::parse(&out).is_ok());
}

#[test]
fn pinned_versions_are_exact() {
    assert_eq!(exact_version("4.17.21").map(|v| v.to_string()).as_deref(), Some("4.17.21"));
    assert_eq!(exact_version("1.0.0-beta.2").map(|v| v.pre.to_string()).as_deref(), Some("beta.2"));
    assert!(exact_version("^4.17.21").is_none());
    assert!(exact_version("4.x").is_none());
}

#[test]
fn recognises_ranges() {
    for r in ["^1.2.3", "~0.4", "1.x", ">=2 <3", "1.2.3 - 2.0.0", "^1 || ^2", "*", "7"] {
        assert!(is_semver_range(r), "{r}");
    }
    for r in ["", "workspace", "./local", "^1 ||", "not a range"] {
        assert!(!is_semver_range(r), "{r}");
    }
}
