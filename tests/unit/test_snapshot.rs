//! Snapshot capture and restore through the engine
//!
//! Tests cover:
//! - Saving and reopening a learner
//! - Legacy (unversioned) blobs
//! - Unknown ids and stale flags in saved data
//! - Version checks

use levelup::engine::{LevelRef, Mode, ProgressionEngine};
use levelup::errors::SnapshotError;
use levelup::snapshot::{Snapshot, SNAPSHOT_VERSION};
use levelup::SubjectId;

fn played_engine() -> ProgressionEngine {
    let mut engine = ProgressionEngine::default();
    engine.set_username("asha");
    engine.set_mode(Mode::Build);
    engine.complete_topic(SubjectId::Dbms, "dbms-er", 100);
    engine.complete_topic(SubjectId::Os, "os-processes", 100);
    engine.unlock_project_level("placement-prep", "warmup");
    engine
}

#[test]
fn test_snapshot_restores_into_fresh_engine() {
    let engine = played_engine();
    let json = engine.snapshot().to_json_pretty().unwrap();

    let snapshot = Snapshot::from_json(&json).unwrap().unwrap();
    let mut restored = ProgressionEngine::default();
    let report = restored.restore(Some(&snapshot)).unwrap();

    assert!(!report.used_defaults);
    assert!(!report.legacy);
    assert_eq!(report.ignored, 0);
    assert_eq!(restored.state().username(), "asha");
    assert_eq!(restored.state().mode(), Mode::Build);
    assert_eq!(restored.xp(), engine.xp());
    assert_eq!(restored.completed_topic_ids(), engine.completed_topic_ids());
    assert_eq!(restored.unlocked_levels(), engine.unlocked_levels());
    assert_eq!(restored.state().manual_unlocks(), engine.state().manual_unlocks());
}

#[test]
fn test_snapshot_json_uses_camel_case() {
    let json = played_engine().snapshot().to_json_pretty().unwrap();
    assert!(json.contains("\"isCompleted\""));
    assert!(json.contains("\"manualUnlocks\""));
    assert!(json.contains(&format!("\"version\": {}", SNAPSHOT_VERSION)));
}

#[test]
fn test_null_snapshot_means_defaults() {
    let mut engine = played_engine();
    let snapshot = Snapshot::from_json("null").unwrap();
    assert!(snapshot.is_none());

    let report = engine.restore(snapshot.as_ref()).unwrap();
    assert!(report.used_defaults);
    assert_eq!(engine.xp(), 0);
    assert!(engine.completed_topic_ids().is_empty());
}

#[test]
fn test_legacy_blob_with_derived_values() {
    // Unversioned client blob: stale progress and level, a completed topic
    // whose successor was never marked unlocked
    let json = r#"{
        "username": "ravi",
        "xp": 250,
        "level": 9,
        "mode": "learn",
        "subjects": [
            { "id": "OS", "progress": 80, "topics": [
                { "id": "os-processes", "isUnlocked": true, "isCompleted": true },
                { "id": "os-scheduling", "isUnlocked": false, "isCompleted": false }
            ]}
        ],
        "projects": [
            { "id": "process-sim", "levels": [
                { "id": "scheduler", "isLocked": false, "isCompleted": false }
            ]}
        ]
    }"#;

    let snapshot = Snapshot::from_json(json).unwrap().unwrap();
    assert!(snapshot.is_legacy());

    let mut engine = ProgressionEngine::default();
    let report = engine.restore(Some(&snapshot)).unwrap();
    assert!(report.legacy);

    assert_eq!(engine.level(), 2);
    let os = engine.subject(SubjectId::Os).unwrap();
    assert_eq!(os.progress, 16);
    assert!(os.topics[1].is_unlocked);

    // isLocked is derived, so the saved `false` does not open the level
    let scheduler = engine.project("process-sim").unwrap().level("scheduler").unwrap();
    assert!(scheduler.is_locked);
}

#[test]
fn test_unknown_ids_are_ignored() {
    let json = r#"{
        "version": 1,
        "subjects": [
            { "id": "PHYSICS", "topics": [] },
            { "id": "DBMS", "topics": [
                { "id": "dbms-er", "isUnlocked": true, "isCompleted": true },
                { "id": "dbms-nosql", "isUnlocked": true, "isCompleted": true }
            ]}
        ],
        "projects": [ { "id": "rocket", "levels": [] } ],
        "manualUnlocks": [ { "projectId": "library-db", "levelId": "vault" } ]
    }"#;

    let snapshot = Snapshot::from_json(json).unwrap().unwrap();
    let mut engine = ProgressionEngine::default();
    let report = engine.restore(Some(&snapshot)).unwrap();

    assert_eq!(report.topics_applied, 1);
    assert_eq!(report.ignored, 4);
    assert!(engine.completed_topic_ids().contains("dbms-er"));
    assert!(engine.state().manual_unlocks().is_empty());
    assert!(engine.unlocked_levels().contains(&LevelRef::new("library-db", "schema")));
}

#[test]
fn test_newer_version_is_rejected() {
    let err = Snapshot::from_json(r#"{ "version": 99 }"#).unwrap_err();
    assert!(matches!(
        err,
        SnapshotError::UnsupportedVersion { found: 99, .. }
    ));
}

#[test]
fn test_malformed_json_is_rejected() {
    let err = Snapshot::from_json("{ not json").unwrap_err();
    assert!(matches!(err, SnapshotError::Malformed(_)));
}

#[test]
fn test_unknown_mode_falls_back() {
    let snapshot = Snapshot::from_json(r#"{ "mode": "daydream", "xp": 5 }"#)
        .unwrap()
        .unwrap();
    assert_eq!(snapshot.mode, None);

    let mut engine = ProgressionEngine::default();
    engine.set_mode(Mode::Build);
    engine.restore(Some(&snapshot)).unwrap();
    assert_eq!(engine.state().mode(), Mode::Build);
    assert_eq!(engine.xp(), 5);
}
