use super::common::v4;
use crate::cache::{list_entries, CacheLayout, CacheWriter, LayoutTable, UNVERSIONED};
use crate::error::WriteError;
use crate::fetch::Artifact;
use crate::integrity::{Algorithm, Integrity};
use std::fs;
use std::path::Path;
use std::sync::Arc;

fn artifact(bytes: &[u8]) -> Artifact {
    Artifact { bytes: bytes.to_vec(), digest: Integrity::compute(Algorithm::Sha512, bytes), attempts: 1 }
}

fn layout(name: &str) -> CacheLayout {
    LayoutTable::default().get(name).unwrap().clone()
}

#[test]
fn builtin_layouts() {
    let table = LayoutTable::default();
    let names: Vec<&str> = table.names().collect();
    assert_eq!(names, ["cas", "npm", "yarn"]);
    assert!(matches!(table.get("pnpm"), Err(WriteError::UnknownLayout(_))));
}

#[test]
fn npm_layout_keys_by_name_and_version() {
    let a = artifact(b"lodash");
    let rel = layout("npm").relative_path(&v4("lodash@npm:4.17.21"), &a.digest).unwrap();
    let hex = a.digest.hex();
    assert_eq!(rel, Path::new("pkgs/lodash/4.17.21").join(&hex[..16]).join("package.tgz"));

    let scoped = layout("npm").relative_path(&v4("@types/node@npm:20.11.5"), &a.digest).unwrap();
    assert!(scoped.starts_with("pkgs/@types/node/20.11.5"));
}

#[test]
fn yarn_layout_fills_the_mirror_folder() {
    let a = artifact(b"x");
    let rel = layout("yarn").relative_path(&v4("@types/node@npm:20.11.5"), &a.digest).unwrap();
    assert_eq!(rel.parent(), Some(Path::new("cache")));
    let name = rel.file_name().unwrap().to_str().unwrap();
    assert!(name.starts_with("@types-node-npm-20.11.5-"), "{name}");
}

#[test]
fn lockfile_version_keys_unpinned_locators() {
    let a = artifact(b"x");
    let l = v4("pkg@file:./vendor/pkg.tgz").with_resolved_version(Some("1.2.3"));
    let rel = layout("npm").relative_path(&l, &a.digest).unwrap();
    assert!(rel.starts_with("pkgs/pkg/1.2.3"), "{}", rel.display());

    let local = v4("pkg@file:./vendor/pkg.tgz").with_resolved_version(Some("0.0.0-use.local"));
    let rel = layout("npm").relative_path(&local, &a.digest).unwrap();
    assert!(rel.starts_with(Path::new("pkgs/pkg").join(UNVERSIONED)), "{}", rel.display());
}

#[test]
fn unversioned_locators_use_placeholder_version() {
    let a = artifact(b"x");
    let rel = layout("yarn").relative_path(&v4("foo@https://example.com/foo.tgz"), &a.digest).unwrap();
    assert!(rel.to_str().unwrap().contains(&format!("-{UNVERSIONED}-")));
}

#[test]
fn templates_cannot_escape_the_root() {
    let a = artifact(b"x");
    let bad = CacheLayout::new("evil", "../{name}.tgz");
    assert!(matches!(bad.relative_path(&v4("foo@npm:1.0.0"), &a.digest), Err(WriteError::UnsafePath { .. })));
    let abs = CacheLayout::new("abs", "/tmp/{name}.tgz");
    assert!(matches!(abs.relative_path(&v4("foo@npm:1.0.0"), &a.digest), Err(WriteError::UnsafePath { .. })));
    let unknown = CacheLayout::new("typo", "{nmae}.tgz");
    assert!(matches!(unknown.relative_path(&v4("foo@npm:1.0.0"), &a.digest), Err(WriteError::Template { .. })));
}

#[test]
fn store_writes_and_reuses() {
    let dir = tempfile::tempdir().unwrap();
    let writer = CacheWriter::new(dir.path(), layout("cas"));
    let l = v4("lodash@npm:4.17.21");
    let a = artifact(b"lodash tarball");
    let first = writer.store(&l, &a).unwrap();
    assert_eq!(fs::read(&first.path).unwrap(), b"lodash tarball");
    assert_eq!(first.version, "4.17.21");
    let modified = fs::metadata(&first.path).unwrap().modified().unwrap();

    let second = writer.store(&l, &a).unwrap();
    assert_eq!(first, second);
    assert_eq!(fs::metadata(&second.path).unwrap().modified().unwrap(), modified);
    assert_eq!(list_entries(dir.path()).len(), 1);
}

#[test]
fn corrupt_existing_entry_is_replaced() {
    let dir = tempfile::tempdir().unwrap();
    let writer = CacheWriter::new(dir.path(), layout("cas"));
    let l = v4("lodash@npm:4.17.21");
    let a = artifact(b"good bytes");
    let entry = writer.store(&l, &a).unwrap();
    fs::write(&entry.path, b"bit rot").unwrap();
    writer.store(&l, &a).unwrap();
    assert_eq!(fs::read(&entry.path).unwrap(), b"good bytes");
}

#[test]
fn concurrent_writers_to_one_path() {
    let dir = tempfile::tempdir().unwrap();
    let writer = Arc::new(CacheWriter::new(dir.path(), layout("npm")));
    let l = v4("lodash@npm:4.17.21");
    let a = artifact(b"shared");
    std::thread::scope(|s| {
        for _ in 0..8 {
            s.spawn(|| writer.store(&l, &a).unwrap());
        }
    });
    let entries = list_entries(dir.path());
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].size, 6);
}

#[test]
fn listing_ignores_temp_files() {
    let dir = tempfile::tempdir().unwrap();
    fs::create_dir_all(dir.path().join("sha512/ab")).unwrap();
    fs::write(dir.path().join("sha512/ab/abcd.tgz"), b"1").unwrap();
    fs::write(dir.path().join("sha512/ab/.abcd.tgz.tmp-1-0"), b"partial").unwrap();
    let entries = list_entries(dir.path());
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].path, Path::new("sha512/ab/abcd.tgz"));
}
