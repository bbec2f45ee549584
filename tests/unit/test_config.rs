//! Unit tests for the config module
//!
//! Tests cover:
//! - Loading from an explicit file
//! - Reward policy derived from config
//! - Custom catalogs referenced by config

use levelup::config::Config;
use levelup::engine::ProgressionEngine;
use levelup::xp::ReplayPolicy;
use levelup::SubjectId;
use std::path::PathBuf;
use tempfile::tempdir;

// ============================================================================
// Loading
// ============================================================================

mod load_tests {
    use super::*;

    #[test]
    fn test_explicit_file_is_used() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("custom.toml");
        std::fs::write(
            &path,
            r#"
                data_dir = "/var/lib/levelup"

                [rewards]
                award_repeat_completions = false
            "#,
        )
        .unwrap();

        let config = Config::from_file(&path).unwrap();
        assert_eq!(config.data_dir, PathBuf::from("/var/lib/levelup"));
        assert_eq!(config.reward_policy().replay, ReplayPolicy::Ignore);
    }

    #[test]
    fn test_invalid_toml_is_an_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("broken.toml");
        std::fs::write(&path, "data_dir = [").unwrap();
        assert!(Config::from_file(&path).is_err());
    }

    #[test]
    fn test_zero_reward_fails_validation() {
        let config: Config = toml::from_str("[rewards]\nxp_per_completion = 0").unwrap();
        assert!(config.validate().is_err());
    }
}

// ============================================================================
// Catalog
// ============================================================================

mod catalog_tests {
    use super::*;

    const TINY_CATALOG: &str = r#"
        [[subjects]]
        id = "OS"
        title = "Operating Systems"

        [[subjects.topics]]
        id = "os-intro"
        title = "Intro"

        [[subjects.topics]]
        id = "os-threads"
        title = "Threads"

        [[projects]]
        id = "shell"
        title = "Write a shell"
        isUnlocked = true

        [[projects.levels]]
        id = "fork"
        title = "Fork and exec"
        requiredTopicIds = ["os-threads"]
    "#;

    #[test]
    fn test_custom_catalog_drives_engine() {
        let dir = tempdir().unwrap();
        let catalog_path = dir.path().join("catalog.toml");
        std::fs::write(&catalog_path, TINY_CATALOG).unwrap();

        let config = Config {
            catalog: Some(catalog_path),
            ..Config::default()
        };
        let catalog = config.load_catalog().unwrap();
        assert_eq!(catalog.topic_count(), 2);

        let mut engine = ProgressionEngine::new(catalog, config.reward_policy());
        assert!(engine.subject(SubjectId::Dbms).is_none());
        engine.complete_topic(SubjectId::Os, "os-intro", 100);
        engine.complete_topic(SubjectId::Os, "os-threads", 100);
        assert!(!engine.project("shell").unwrap().level("fork").unwrap().is_locked);
    }

    #[test]
    fn test_missing_catalog_file_is_an_error() {
        let config = Config {
            catalog: Some(PathBuf::from("/nonexistent/catalog.toml")),
            ..Config::default()
        };
        assert!(config.load_catalog().is_err());
    }
}
