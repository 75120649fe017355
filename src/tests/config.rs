use crate::config::{FileConfig, Overrides, Settings, CONFIG_FILE};
use crate::error::Error;
use crate::locator::Protocol;
use std::path::Path;
use std::time::Duration;

const SAMPLE: &str = r#"
allow: [registry, git]
hardened: true
registry: https://npm.internal.test
jobs: 3
retry:
  max_attempts: 7
  base_delay_ms: 250
timeout_secs: 600
layout: mirror
layouts:
  mirror: "{name}/{version}.tgz"
"#;

#[test]
fn parses_every_key() {
    let cfg = FileConfig::parse(SAMPLE).unwrap();
    assert_eq!(cfg.allow, Some(vec![Protocol::Registry, Protocol::Git]));
    assert_eq!(cfg.hardened, Some(true));
    assert_eq!(cfg.jobs, Some(3));
    let retry = cfg.retry.unwrap();
    assert_eq!(retry.max_attempts, 7);
    assert_eq!(retry.base_delay, Duration::from_millis(250));
    assert_eq!(retry.max_delay, Duration::from_secs(8));
    assert_eq!(cfg.layouts.get("mirror").map(String::as_str), Some("{name}/{version}.tgz"));
}

#[test]
fn empty_file_is_default() {
    assert_eq!(FileConfig::parse("").unwrap(), FileConfig::default());
}

#[test]
fn unknown_keys_and_protocols_are_rejected() {
    assert!(matches!(FileConfig::parse("allowed: [npm]"), Err(Error::Config(_))));
    assert!(matches!(FileConfig::parse("allow: [ftp]"), Err(Error::Config(_))));
}

#[test]
fn file_values_apply_and_cli_overrides_win() {
    let cfg = FileConfig::parse(SAMPLE).unwrap();
    let s = Settings::resolve(Path::new("/work/proj"), cfg.clone(), Overrides::default()).unwrap();
    assert!(s.policy.hardened);
    assert!(s.policy.strict);
    assert_eq!(s.policy.allow.len(), 2);
    assert_eq!(s.options.jobs, 3);
    assert_eq!(s.options.layout.name, "mirror");
    assert_eq!(s.options.registry.as_deref(), Some("https://npm.internal.test"));
    assert_eq!(s.timeout, Some(Duration::from_secs(600)));

    let cli = Overrides {
        allow: Some(vec![Protocol::Registry]),
        lenient: true,
        jobs: Some(9),
        layout: Some("cas".into()),
        output: Some("/tmp/out".into()),
        ..Overrides::default()
    };
    let s = Settings::resolve(Path::new("/work/proj"), cfg, cli).unwrap();
    assert_eq!(s.policy.allow.len(), 1);
    assert!(!s.policy.strict);
    assert_eq!(s.options.jobs, 9);
    assert_eq!(s.options.layout.name, "cas");
    assert_eq!(s.options.cache_root, Path::new("/tmp/out"));
}

#[test]
fn invalid_settings_are_config_errors() {
    let zero_jobs = Overrides { jobs: Some(0), ..Overrides::default() };
    assert!(matches!(
        Settings::resolve(Path::new("/p"), FileConfig::default(), zero_jobs),
        Err(Error::Config(_))
    ));
    let unknown_layout = Overrides { layout: Some("nope".into()), ..Overrides::default() };
    assert!(matches!(
        Settings::resolve(Path::new("/p"), FileConfig::default(), unknown_layout),
        Err(Error::Config(_))
    ));
}

#[test]
fn discovers_config_in_project_root() {
    let dir = tempfile::tempdir().unwrap();
    assert_eq!(FileConfig::discover(dir.path(), None).unwrap(), FileConfig::default());
    std::fs::write(dir.path().join(CONFIG_FILE), "jobs: 2\n").unwrap();
    assert_eq!(FileConfig::discover(dir.path(), None).unwrap().jobs, Some(2));
    assert!(matches!(
        FileConfig::discover(dir.path(), Some(&dir.path().join("missing.yml"))),
        Err(Error::Io { .. })
    ));
}
