//! End-to-end tests: a watched file on disk driving typed options.

#![cfg(feature = "file-watch")]

use options_monitor::prelude::*;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::{Duration, Instant};
use tempfile::TempDir;

const DEFAULT_CONTENT: &str = r#"{
  "MyOptions": {
    "FirstProperty": "First value"
  }
}"#;

const UPDATE_CONTENT: &str = r#"{
  "MyOptions": {
    "FirstProperty": "First value",
    "SecondProperty": "Second value",
    "ThirdProperty": "Third value"
  }
}"#;

/// Settle time after a count is reached, to catch stray extra notifications.
const SETTLE: Duration = Duration::from_millis(300);

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct MyOptions {
    first_property: String,
    second_property: String,
    third_property: Option<String>,
}

/// How the options type is wired into the manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Correctness {
    /// Bound to its section and refreshed on change.
    Full,
    /// Bound to the document root by mistake.
    Half,
    /// Bound once and never refreshed.
    None,
}

fn register(manager: &OptionsManager, correctness: Correctness) -> OptionsMonitor<MyOptions> {
    let result = match correctness {
        Correctness::Full => manager.configure::<MyOptions>(Binding::section("MyOptions")),
        Correctness::Half => manager.configure::<MyOptions>(Binding::Root),
        Correctness::None => manager.configure_snapshot::<MyOptions>(Binding::section("MyOptions")),
    };
    result.unwrap()
}

fn fixture(content: &str) -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("appsettings.json");
    fs::write(&path, content).unwrap();
    (temp_dir, path)
}

async fn watched_manager(path: &Path) -> OptionsManager {
    OptionsManager::builder()
        .with_file(path)
        .with_debounce(Duration::from_millis(50))
        .build()
        .await
        .unwrap()
}

async fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    condition()
}

fn assert_initial(options: &MyOptions) {
    assert_eq!(options.first_property, "First value");
    assert_eq!(options.second_property, "");
    assert_eq!(options.third_property, None);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_full_binding_tracks_file() {
    let (_dir, path) = fixture(DEFAULT_CONTENT);
    let manager = watched_manager(&path).await;
    let monitor = register(&manager, Correctness::Full);
    let recorder = ChangeRecorder::new(monitor.clone());

    assert_initial(&monitor.current_value());
    assert_eq!(recorder.change_count(), 0);

    fs::write(&path, UPDATE_CONTENT).unwrap();
    assert!(wait_until(|| recorder.change_count() >= 1).await);
    tokio::time::sleep(SETTLE).await;
    assert_eq!(recorder.change_count(), 1);

    let options = monitor.current_value();
    assert_eq!(options.first_property, "First value");
    assert_eq!(options.second_property, "Second value");
    assert_eq!(options.third_property.as_deref(), Some("Third value"));

    fs::write(&path, DEFAULT_CONTENT).unwrap();
    assert!(wait_until(|| recorder.change_count() >= 2).await);
    tokio::time::sleep(SETTLE).await;
    assert_eq!(recorder.change_count(), 2);
    assert_initial(&monitor.current_value());

    let timestamps = recorder.timestamps();
    assert!(timestamps[0] <= timestamps[1]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_root_binding_keeps_defaults_but_notifies() {
    let (_dir, path) = fixture(DEFAULT_CONTENT);
    let manager = watched_manager(&path).await;
    let monitor = register(&manager, Correctness::Half);
    let recorder = ChangeRecorder::new(monitor.clone());

    assert_eq!(*monitor.current_value(), MyOptions::default());

    fs::write(&path, UPDATE_CONTENT).unwrap();
    assert!(wait_until(|| recorder.change_count() >= 1).await);
    tokio::time::sleep(SETTLE).await;
    assert_eq!(recorder.change_count(), 1);
    assert_eq!(*monitor.current_value(), MyOptions::default());

    fs::write(&path, DEFAULT_CONTENT).unwrap();
    assert!(wait_until(|| recorder.change_count() >= 2).await);
    tokio::time::sleep(SETTLE).await;
    assert_eq!(recorder.change_count(), 2);
    assert_eq!(*monitor.current_value(), MyOptions::default());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_snapshot_binding_never_changes() {
    let (_dir, path) = fixture(DEFAULT_CONTENT);
    let manager = watched_manager(&path).await;
    let monitor = register(&manager, Correctness::None);
    let recorder = ChangeRecorder::new(monitor.clone());

    assert_initial(&monitor.current_value());

    fs::write(&path, UPDATE_CONTENT).unwrap();
    assert!(wait_until(|| manager.reload_count() >= 1).await);
    tokio::time::sleep(SETTLE).await;

    assert_eq!(recorder.change_count(), 0);
    assert_initial(&monitor.current_value());
    assert_eq!(manager.publish_count(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_identical_rewrite_notifies_again() {
    let (_dir, path) = fixture(DEFAULT_CONTENT);
    let manager = watched_manager(&path).await;
    let monitor = register(&manager, Correctness::Full);
    let recorder = ChangeRecorder::new(monitor.clone());

    fs::write(&path, DEFAULT_CONTENT).unwrap();
    assert!(wait_until(|| recorder.change_count() >= 1).await);
    tokio::time::sleep(SETTLE).await;

    assert_eq!(recorder.change_count(), 1);
    assert_initial(&monitor.current_value());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_malformed_write_keeps_last_good_value() {
    let (_dir, path) = fixture(DEFAULT_CONTENT);
    let manager = watched_manager(&path).await;
    let monitor = register(&manager, Correctness::Full);
    let recorder = ChangeRecorder::new(monitor.clone());

    fs::write(&path, r#"{"MyOptions": {"FirstProperty": "broken"#).unwrap();
    assert!(wait_until(|| manager.reload_count() >= 1).await);
    tokio::time::sleep(SETTLE).await;

    assert_eq!(recorder.change_count(), 0);
    assert_initial(&monitor.current_value());

    fs::write(&path, UPDATE_CONTENT).unwrap();
    assert!(wait_until(|| recorder.change_count() >= 1).await);
    assert_eq!(monitor.current_value().second_property, "Second value");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_delete_and_recreate_reloads() {
    let (_dir, path) = fixture(DEFAULT_CONTENT);
    let manager = watched_manager(&path).await;
    let monitor = register(&manager, Correctness::Full);
    let recorder = ChangeRecorder::new(monitor.clone());

    fs::remove_file(&path).unwrap();
    fs::write(&path, UPDATE_CONTENT).unwrap();

    assert!(wait_until(|| monitor.current_value().second_property == "Second value").await);
    assert!(recorder.change_count() >= 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_disposed_subscription_receives_nothing() {
    let (_dir, path) = fixture(DEFAULT_CONTENT);
    let manager = watched_manager(&path).await;
    let monitor = register(&manager, Correctness::Full);
    let observer = ChangeRecorder::new(monitor.clone());

    let calls = Arc::new(AtomicUsize::new(0));
    let calls_clone = Arc::clone(&calls);
    let handle = monitor.on_change(move |_, _| {
        calls_clone.fetch_add(1, Ordering::SeqCst);
    });

    fs::write(&path, UPDATE_CONTENT).unwrap();
    assert!(wait_until(|| calls.load(Ordering::SeqCst) >= 1).await);
    assert!(wait_until(|| observer.change_count() >= 1).await);

    handle.dispose();
    assert!(!handle.is_active());

    fs::write(&path, DEFAULT_CONTENT).unwrap();
    assert!(wait_until(|| observer.change_count() >= 2).await);
    tokio::time::sleep(SETTLE).await;
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_readers_see_consistent_values_during_reloads() {
    let (_dir, path) = fixture(r#"{"MyOptions": {"FirstProperty": "0", "SecondProperty": "0"}}"#);
    let manager = watched_manager(&path).await;
    let monitor = register(&manager, Correctness::Full);
    let recorder = ChangeRecorder::new(monitor.clone());

    let stop = Arc::new(AtomicBool::new(false));
    let readers: Vec<_> = (0..4)
        .map(|_| {
            let monitor = monitor.clone();
            let stop = Arc::clone(&stop);
            std::thread::spawn(move || {
                while !stop.load(Ordering::Relaxed) {
                    let options = monitor.current_value();
                    assert_eq!(options.first_property, options.second_property);
                }
            })
        })
        .collect();

    for i in 1..=3 {
        fs::write(
            &path,
            format!(r#"{{"MyOptions": {{"FirstProperty": "{i}", "SecondProperty": "{i}"}}}}"#),
        )
        .unwrap();
        assert!(wait_until(|| recorder.change_count() >= i).await);
    }

    stop.store(true, Ordering::Relaxed);
    for reader in readers {
        reader.join().unwrap();
    }
    assert_eq!(monitor.current_value().first_property, "3");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_dropping_manager_stops_watching() {
    let (_dir, path) = fixture(DEFAULT_CONTENT);
    let manager = watched_manager(&path).await;
    let monitor = register(&manager, Correctness::Full);
    let recorder = ChangeRecorder::new(monitor.clone());

    drop(manager);
    tokio::time::sleep(Duration::from_millis(100)).await;

    fs::write(&path, UPDATE_CONTENT).unwrap();
    tokio::time::sleep(SETTLE * 2).await;

    assert_eq!(recorder.change_count(), 0);
    assert_initial(&monitor.current_value());
}
