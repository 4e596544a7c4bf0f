//! Integration tests for station config loading and resolution
//!
//! Each test that touches the environment uses its own variable name, so the
//! tests can run in parallel.

use onair_common::config::{resolve_config_path, OverflowPolicy};
use onair_common::{Error, StationConfig};
use std::env;
use std::path::PathBuf;
use std::time::Duration;

const FULL_CONFIG: &str = r#"
port = 8100
bind_address = "127.0.0.1"
station_name = "Night Shift"
station_genre = "Ambient"
filler_path = "/srv/onair/static-noise.mp3"
media_dir = "/srv/onair/songs"
filler_chunk_bytes = 2048
filler_interval_ms = 50
chunk_bytes = 32768
replay_chunks = 20
listener_backlog_chunks = 100
overflow_policy = "drop-oldest"
delete_played_files = false

[pacing]
enabled = true
fallback_bitrate_kbps = 192
lead_ms = 500

[safety]
factor = 2.0
grace_ms = 5000
"#;

fn write_config(text: &str) -> tempfile::NamedTempFile {
    let file = tempfile::NamedTempFile::new().unwrap();
    std::fs::write(file.path(), text).unwrap();
    file
}

#[test]
fn test_full_config_file_loads() {
    let file = write_config(FULL_CONFIG);
    let config = StationConfig::load(file.path()).unwrap();

    assert_eq!(config.port, 8100);
    assert_eq!(config.bind_address, "127.0.0.1");
    assert_eq!(config.station_name, "Night Shift");
    assert_eq!(config.filler_path, PathBuf::from("/srv/onair/static-noise.mp3"));
    assert_eq!(config.media_dir, PathBuf::from("/srv/onair/songs"));
    assert_eq!(config.filler_interval(), Duration::from_millis(50));
    assert_eq!(config.overflow_policy, OverflowPolicy::DropOldest);
    assert!(!config.delete_played_files);
    assert_eq!(config.pacing.fallback_bitrate_kbps, 192);
    assert_eq!(config.pacing_lead(), Duration::from_millis(500));
    assert_eq!(config.safety.factor, 2.0);
    assert_eq!(config.safety_grace(), Duration::from_secs(5));
    assert_eq!(config.listener_capacity(), 120);
}

#[test]
fn test_load_rejects_invalid_values() {
    let file = write_config("filler_interval_ms = 0\n");
    match StationConfig::load(file.path()) {
        Err(Error::Config(msg)) => assert!(msg.contains("filler_interval_ms")),
        other => panic!("Expected Config error, got {:?}", other),
    }
}

#[test]
fn test_unknown_overflow_policy_is_parse_error() {
    let file = write_config("overflow_policy = \"block\"\n");
    assert!(matches!(
        StationConfig::load(file.path()),
        Err(Error::ConfigParse { .. })
    ));
}

#[test]
fn test_missing_explicit_file_is_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("config.toml");
    assert!(matches!(
        StationConfig::resolve(Some(&missing), "ONAIR_TEST_MISSING_EXPLICIT"),
        Err(Error::Io(_))
    ));
}

#[test]
fn test_env_var_used_when_no_cli_arg() {
    let file = write_config("station_name = \"From Env\"\n");
    env::set_var("ONAIR_TEST_ENV_ONLY", file.path());

    let config = StationConfig::resolve(None, "ONAIR_TEST_ENV_ONLY").unwrap();
    assert_eq!(config.station_name, "From Env");

    env::remove_var("ONAIR_TEST_ENV_ONLY");
}

#[test]
fn test_cli_arg_beats_env_var() {
    let from_env = write_config("station_name = \"From Env\"\n");
    let from_cli = write_config("station_name = \"From CLI\"\n");
    env::set_var("ONAIR_TEST_CLI_WINS", from_env.path());

    let path = resolve_config_path(Some(from_cli.path()), "ONAIR_TEST_CLI_WINS").unwrap();
    assert_eq!(path, from_cli.path());

    env::remove_var("ONAIR_TEST_CLI_WINS");
}

#[test]
fn test_empty_env_var_is_ignored() {
    env::set_var("ONAIR_TEST_EMPTY_VAR", "");
    let path = resolve_config_path(None, "ONAIR_TEST_EMPTY_VAR");

    // Falls through to platform files, which never resolve to ""
    assert_ne!(path, Some(PathBuf::new()));

    env::remove_var("ONAIR_TEST_EMPTY_VAR");
}
