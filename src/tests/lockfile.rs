use crate::error::Error;
use crate::lockfile::{self, Lockfile};

const BERRY_V3: &str = r#"# This file is generated by running "yarn install" inside your project.
# Manual changes might be lost - proceed with caution!

__metadata:
  version: 6
  cacheKey: 8

"lodash@npm:^4.17.21":
  version: 4.17.21
  resolution: "lodash@npm:4.17.21"
  checksum: eb835a2e51d381e561e508ce932ea50a8e5a68f4ebdd771ea240d3048244a8d13658acbd502cd4829768c56f2e16bdd4340b9ea141297d472517b83868e677f7
  languageName: node
  linkType: hard

"app@workspace:.":
  version: 0.0.0-use.local
  resolution: "app@workspace:."
  languageName: unknown
  linkType: soft

"ansi-regex@npm:^5.0.1, ansi-regex@npm:^5.0.0":
  version: 5.0.1
  resolution: "ansi-regex@npm:5.0.1"
  checksum: 2aa4bb54caf2d622f1afdad09441695af2a83aa3fe8b8afa581d205e57ed4261c183c4d3877cee25794443fde5876417d859c108078ab788d6af7e4fe52eb66b
  languageName: node
  linkType: hard
"#;

#[test]
fn parses_records_in_file_order() {
    let lf = lockfile::parse(BERRY_V3).unwrap();
    assert_eq!(lf.metadata.version, 6);
    assert_eq!(lf.metadata.cache_key.as_deref(), Some("8"));
    let resolutions: Vec<&str> = lf.records.iter().map(|r| r.locator_str()).collect();
    assert_eq!(resolutions, ["lodash@npm:4.17.21", "app@workspace:.", "ansi-regex@npm:5.0.1"]);
    assert_eq!(lf.records[2].descriptors, ["ansi-regex@npm:^5.0.1", "ansi-regex@npm:^5.0.0"]);
    assert_eq!(lf.records[0].version.as_deref(), Some("4.17.21"));
    assert_eq!(lf.records[1].link_type.as_deref(), Some("soft"));
    assert!(lf.records[1].checksum.is_none());
}

#[test]
fn record_without_resolution_falls_back_to_key() {
    let text = "__metadata:\n  version: 8\n\n\"foo@npm:1.0.0\":\n  version: 1.0.0\n";
    let lf = lockfile::parse(text).unwrap();
    assert_eq!(lf.records[0].locator_str(), "foo@npm:1.0.0");
}

#[test]
fn missing_metadata_is_a_parse_error() {
    let err = lockfile::parse("\"foo@npm:1.0.0\":\n  resolution: \"foo@npm:1.0.0\"\n").unwrap_err();
    assert!(matches!(err, Error::LockfileParse(ref m) if m.contains("__metadata")), "{err}");
}

#[test]
fn invalid_yaml_is_a_parse_error() {
    assert!(matches!(lockfile::parse("__metadata: [unclosed"), Err(Error::LockfileParse(_))));
    assert!(matches!(lockfile::parse("- just\n- a list\n"), Err(Error::LockfileParse(_))));
}

#[test]
fn load_reports_missing_file() {
    let dir = tempfile::tempdir().unwrap();
    let err = lockfile::load(&dir.path().join("yarn.lock")).unwrap_err();
    assert!(matches!(err, Error::Io { .. }));
}

#[test]
fn load_reads_from_disk() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("yarn.lock");
    std::fs::write(&path, BERRY_V3).unwrap();
    let lf: Lockfile = lockfile::load(&path).unwrap();
    assert_eq!(lf.records.len(), 3);
}
