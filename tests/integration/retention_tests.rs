//! Integration tests for the startup retention sweep.
//!
//! Validates:
//! - Directories older than the window are deleted
//! - Recent directories and plain files are kept
//! - A zero window or missing root deletes nothing
//! - Live pool entries are untouched by the sweep

use std::fs::{self, File};
use std::path::Path;
use std::time::{Duration, SystemTime};

use agent_switchboard::orchestrator::retention::sweep_stale;

use super::test_helpers::{test_pool, test_settings, FakeAgent};

const DAY: Duration = Duration::from_secs(24 * 60 * 60);

fn make_dir(root: &Path, name: &str, age: Duration) {
    let dir = root.join(name);
    fs::create_dir_all(&dir).unwrap();
    fs::write(dir.join("notes.txt"), "scratch").unwrap();
    File::open(&dir)
        .unwrap()
        .set_modified(SystemTime::now() - age)
        .unwrap();
}

#[test]
fn sweep_removes_only_stale_directories() {
    let root = tempfile::tempdir().unwrap();
    make_dir(root.path(), "old-a", DAY * 45);
    make_dir(root.path(), "old-b", DAY * 31);
    make_dir(root.path(), "fresh", DAY * 2);
    fs::write(root.path().join("README"), "not a channel").unwrap();

    let removed = sweep_stale(root.path(), 30).unwrap();

    assert_eq!(removed, 2);
    assert!(!root.path().join("old-a").exists());
    assert!(!root.path().join("old-b").exists());
    assert!(root.path().join("fresh").is_dir());
    assert!(root.path().join("README").is_file());
}

#[test]
fn zero_window_disables_sweep() {
    let root = tempfile::tempdir().unwrap();
    make_dir(root.path(), "ancient", DAY * 400);

    assert_eq!(sweep_stale(root.path(), 0).unwrap(), 0);
    assert!(root.path().join("ancient").exists());
}

#[test]
fn missing_root_is_not_an_error() {
    let root = tempfile::tempdir().unwrap();
    let missing = root.path().join("does-not-exist");
    assert_eq!(sweep_stale(&missing, 30).unwrap(), 0);
}

#[tokio::test]
async fn sweep_leaves_live_pool_entries_alone() {
    let root = tempfile::tempdir().unwrap();
    let (pool, _launcher, _rx) = test_pool(test_settings(root.path()), FakeAgent::echo());

    let session = pool.get_or_create("A").await.unwrap();
    make_dir(root.path(), "stale-channel", DAY * 90);

    assert_eq!(pool.sweep_stale(30).unwrap(), 1);
    assert!(session.working_dir().is_dir());
    assert_eq!(pool.channel_keys().await, vec!["A".to_owned()]);
    assert_eq!(session.prompt("still here").await.unwrap().text, "echo: still here");
}
