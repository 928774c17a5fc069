//! Integration tests for container reads, subtrees and observer rounds.

use std::fs;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::Duration;

use chrono::{TimeZone, Utc};
use serde::Deserialize;
use strata_config::{Container, ErrorSender, Format, Loader, MemFs, Observer, WatchMode};
use tempfile::TempDir;

const FIRST_YAML: &str = r#"yaml:
  key: "value"
  bool: true
  int: 1
  float: 2.4
  time: "2021-09-11 12:34:56"
  duration: 5s"#;

const SECOND_YAML: &str = r#"yaml:
  key: "value2"
  more:
    key2: "secondfile""#;

fn reader_container(sources: &[&str]) -> Container {
    Loader::new()
        .without_automatic_env()
        .load_readers(Format::Yaml, sources.iter().map(|s| s.as_bytes()))
}

struct Recorder {
    seen: mpsc::Sender<String>,
}

impl Observer for Recorder {
    fn run(&self, config: &Container, _errors: &ErrorSender) {
        let _ = self.seen.send(config.get_string("yaml.key"));
    }
}

#[test]
fn test_typed_getters() {
    let config = reader_container(&[FIRST_YAML]);

    assert_eq!(config.get_string("yaml.key"), "value");
    assert!(config.get_bool("yaml.bool"));
    assert_eq!(config.get_int("yaml.int"), 1);
    assert!((config.get_float("yaml.float") - 2.4).abs() < f64::EPSILON);
    assert_eq!(
        config.get_time("yaml.time"),
        Utc.with_ymd_and_hms(2021, 9, 11, 12, 34, 56).unwrap()
    );
    assert_eq!(config.get_duration("yaml.duration"), Duration::from_secs(5));
}

#[test]
fn test_missing_keys_yield_zero_values() {
    let config = reader_container(&[FIRST_YAML]);

    assert_eq!(config.get("yaml.missing"), None);
    assert_eq!(config.get_string("yaml.missing"), "");
    assert!(!config.get_bool("yaml.missing"));
    assert_eq!(config.get_int("yaml.missing"), 0);
    assert_eq!(config.get_duration("yaml.missing"), Duration::ZERO);
    assert_eq!(config.get_time("yaml.missing").timestamp(), 0);
}

#[test]
fn test_reader_merge_order() {
    let config = reader_container(&[FIRST_YAML, SECOND_YAML]);

    assert_eq!(config.id(), "0;1");
    assert_eq!(config.get_string("yaml.key"), "value2");
    assert_eq!(config.get_string("yaml.more.key2"), "secondfile");
    assert_eq!(config.get_int("yaml.int"), 1);
}

#[test]
fn test_sub_is_independent() {
    let config = reader_container(&[SECOND_YAML]);
    let sub = config.sub("yaml.more");

    assert_eq!(sub.get_string("key2"), "secondfile");
    assert_eq!(sub.id(), "0#yaml.more");

    config.add_observer_fn(|_: &Container, _: &ErrorSender| {});
    assert_eq!(config.observers().len(), 1);
    assert!(sub.observers().is_empty());

    assert!(config.sub("yaml.missing").settings().is_empty());
}

#[test]
fn test_clones_share_observers() {
    let config = reader_container(&[FIRST_YAML]);
    let handle = config.clone();
    handle.add_observer_fn(|_: &Container, _: &ErrorSender| {});
    assert_eq!(config.observers().len(), 1);
}

#[test]
fn test_to_json_and_unmarshal() {
    #[derive(Debug, Deserialize)]
    struct More {
        key2: String,
    }

    let config = reader_container(&[SECOND_YAML]);
    let json: serde_json::Value = serde_json::from_str(&config.to_json()).unwrap();
    assert_eq!(json["yaml"]["more"]["key2"], "secondfile");

    let more: More = config.unmarshal_key("yaml.more").unwrap();
    assert_eq!(more.key2, "secondfile");

    let missing: Option<More> = config.unmarshal_key("yaml.absent").unwrap();
    assert!(missing.is_none());

    let wrong: Result<More, _> = config.unmarshal_key("yaml.key");
    assert!(wrong.is_err());
}

#[test]
fn test_reload_then_round_sees_new_values() {
    let fs = Arc::new(MemFs::new());
    fs.write("first.yml", FIRST_YAML);
    fs.write("second.yml", SECOND_YAML);

    let config = Loader::new()
        .with_fs(fs.clone())
        .with_files(["first.yml", "second.yml"])
        .without_automatic_env()
        .load()
        .unwrap();
    assert_eq!(config.get_string("yaml.key"), "value2");

    let (tx, rx) = mpsc::channel();
    config.add_observer(Recorder { seen: tx.clone() });
    config.add_observer(Recorder { seen: tx });

    fs.write("second.yml", "yaml:\n  key: \"value3\"\n");
    assert!(config.reload());
    config.notify_observers();

    let seen: Vec<String> = rx.try_iter().collect();
    assert_eq!(seen, vec!["value3".to_string(), "value3".to_string()]);
    assert_eq!(config.get_string("yaml.more.key2"), "");
}

#[test]
fn test_observer_added_during_round_runs_next_round() {
    let config = reader_container(&[FIRST_YAML]);
    let late_runs = Arc::new(AtomicUsize::new(0));

    let late = Arc::clone(&late_runs);
    config.add_observer_fn(move |config: &Container, _: &ErrorSender| {
        let late = Arc::clone(&late);
        config.add_observer_fn(move |_: &Container, _: &ErrorSender| {
            late.fetch_add(1, Ordering::SeqCst);
        });
    });

    config.notify_observers();
    assert_eq!(late_runs.load(Ordering::SeqCst), 0);
    assert_eq!(config.observers().len(), 2);

    config.notify_observers();
    assert_eq!(late_runs.load(Ordering::SeqCst), 1);
}

#[test]
fn test_observer_errors_do_not_block_round() {
    let config = reader_container(&[FIRST_YAML]);
    for _ in 0..3 {
        config.add_observer_fn(|_: &Container, errors: &ErrorSender| {
            for _ in 0..100 {
                let _ = errors.send("observer failed".into());
            }
        });
    }
    config.notify_observers();
}

#[test]
fn test_watch_multiple_files_notifies_observers() {
    let temp_dir = TempDir::new().unwrap();
    let first = temp_dir.path().join("config.yml");
    let second = temp_dir.path().join("local.yml");
    fs::write(&first, FIRST_YAML).unwrap();
    fs::write(&second, "other: 1\n").unwrap();

    let config = Loader::new()
        .with_file(&first)
        .with_file(&second)
        .without_automatic_env()
        .watch(WatchMode::Auto)
        .load()
        .unwrap();
    assert!(config.is_watching());

    let (tx, rx) = mpsc::channel();
    config.add_observer(Recorder { seen: tx.clone() });
    config.add_observer_fn(move |config: &Container, _: &ErrorSender| {
        let _ = tx.send(config.get_string("yaml.key"));
    });
    assert_eq!(config.observers().len(), 2);

    // Give the watcher time to start
    thread::sleep(Duration::from_millis(100));
    fs::write(&first, SECOND_YAML).unwrap();

    // A write can fire several events; wait until one round has reached
    // both observers with the new contents.
    let mut seen = Vec::new();
    while seen.iter().filter(|v| *v == "value2").count() < 2 {
        match rx.recv_timeout(Duration::from_secs(5)) {
            Ok(value) => seen.push(value),
            Err(_) => panic!("no round with the new contents, rounds seen: {seen:?}"),
        }
    }
    assert_eq!(config.get_string("yaml.key"), "value2");
}

#[test]
fn test_single_file_auto_mode_does_not_watch() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("config.yml");
    fs::write(&path, FIRST_YAML).unwrap();

    let config = Loader::new().with_file(&path).load().unwrap();
    assert!(!config.is_watching());
}

#[test]
fn test_dropping_container_stops_watch() {
    let temp_dir = TempDir::new().unwrap();
    let first = temp_dir.path().join("a.yml");
    let second = temp_dir.path().join("b.yml");
    fs::write(&first, FIRST_YAML).unwrap();
    fs::write(&second, SECOND_YAML).unwrap();

    let runs = Arc::new(AtomicUsize::new(0));
    {
        let config = Loader::new()
            .with_files([&first, &second])
            .watch(WatchMode::Auto)
            .load()
            .unwrap();
        let counter = Arc::clone(&runs);
        config.add_observer_fn(move |_: &Container, _: &ErrorSender| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
    }

    fs::write(&first, "yaml:\n  key: changed\n").unwrap();
    thread::sleep(Duration::from_millis(300));
    assert_eq!(runs.load(Ordering::SeqCst), 0);
}
