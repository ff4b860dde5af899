//! Configuration resolution and graceful degradation tests
//!
//! Tests that manipulate KNOCK_CONFIG or KNOCK_SCRIPT are marked with
//! #[serial] so they never run concurrently.

use knock_common::config::{
    resolve_config_path, resolve_script_path, TomlConfig, CONFIG_ENV_VAR, SCRIPT_ENV_VAR,
};
use knock_common::{Error, Script};
use serial_test::serial;
use std::env;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

fn write_temp(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file
}

#[test]
#[serial]
fn test_cli_path_beats_environment() {
    env::set_var(CONFIG_ENV_VAR, "/tmp/knock-env-config.toml");

    let cli = Path::new("/tmp/knock-cli-config.toml");
    assert_eq!(resolve_config_path(Some(cli)), Some(cli.to_path_buf()));

    env::remove_var(CONFIG_ENV_VAR);
}

#[test]
#[serial]
fn test_environment_used_without_cli() {
    env::set_var(CONFIG_ENV_VAR, "/tmp/knock-env-config.toml");

    assert_eq!(
        resolve_config_path(None),
        Some(PathBuf::from("/tmp/knock-env-config.toml"))
    );

    env::remove_var(CONFIG_ENV_VAR);
}

#[test]
#[serial]
fn test_missing_config_file_falls_back_to_defaults() {
    env::remove_var(CONFIG_ENV_VAR);

    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("nope.toml");

    let config = TomlConfig::load_or_default(Some(&missing)).unwrap();
    assert_eq!(config, TomlConfig::default());
}

#[test]
#[serial]
fn test_config_file_loaded() {
    env::remove_var(CONFIG_ENV_VAR);

    let file = write_temp(
        r#"
        settle_delay_ms = 250
        script = "/srv/scripts/other.toml"

        [audio]
        enabled = false
        device = "pulse"
        "#,
    );

    let config = TomlConfig::load_or_default(Some(file.path())).unwrap();
    assert_eq!(config.settle_delay_ms, 250);
    assert!(!config.audio.enabled);
    assert_eq!(config.audio.device.as_deref(), Some("pulse"));
    assert_eq!(config.script, Some(PathBuf::from("/srv/scripts/other.toml")));
}

#[test]
#[serial]
fn test_malformed_config_file_is_an_error() {
    let file = write_temp("[audio\nenabled = ");
    let result = TomlConfig::load_or_default(Some(file.path()));
    assert!(matches!(result, Err(Error::Config(_))));
}

#[test]
#[serial]
fn test_script_path_priority() {
    env::remove_var(SCRIPT_ENV_VAR);

    let mut config = TomlConfig::default();
    assert_eq!(resolve_script_path(None, &config), None);

    config.script = Some(PathBuf::from("/from/config.toml"));
    assert_eq!(
        resolve_script_path(None, &config),
        Some(PathBuf::from("/from/config.toml"))
    );

    env::set_var(SCRIPT_ENV_VAR, "/from/env.toml");
    assert_eq!(
        resolve_script_path(None, &config),
        Some(PathBuf::from("/from/env.toml"))
    );

    let cli = Path::new("/from/cli.toml");
    assert_eq!(resolve_script_path(Some(cli), &config), Some(cli.to_path_buf()));

    env::remove_var(SCRIPT_ENV_VAR);
}

#[test]
fn test_script_file_round_trip_through_loader() {
    let file = write_temp(
        r#"
        title = "Short"
        final_text = "fin"

        [[segment]]
        id = "a"
        text = "first"
        delay = 100
        kind = "voice"
        speak = true

        [[segment]]
        id = "b"
        text = "(knock)"
        delay = 50
        kind = "sound"
        cue = "knock-hard"
        "#,
    );

    let script = Script::load(file.path()).unwrap();
    assert_eq!(script.title(), "Short");
    assert_eq!(script.final_text(), Some("fin"));
    assert_eq!(script.cumulative_offsets(), vec![100, 150]);
}

#[test]
fn test_missing_script_file_is_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let result = Script::load(&dir.path().join("missing.toml"));
    assert!(matches!(result, Err(Error::NotFound(_))));
}
