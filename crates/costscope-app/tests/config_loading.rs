//! Layered configuration: built-in catalog, user file, environment.

use costscope_app::settings::{load_layers, AppPaths, BUILTIN_CONFIG};
use std::fs;
use tempfile::TempDir;

#[test]
fn user_file_overrides_defaults_and_appends_extras() {
    let dir = TempDir::new().unwrap();
    let file = dir.path().join("config.yaml");
    fs::write(
        &file,
        r#"
web:
  port: 9100
token_tracking:
  capture_response_text: false
extra_ai_domains:
  - domain: chat.internal.example
    name: Internal Chat
    category: chat
    cost_per_hour: 2.0
extra_ai_cli_tools:
  - name: llm
    category: cli
    command_patterns: ["llm"]
"#,
    )
    .unwrap();

    let config = load_layers(BUILTIN_CONFIG, Some(&file), "COSTSCOPE_TEST_USERFILE").unwrap();
    assert_eq!(config.web.port, 9100);
    assert_eq!(config.web.bind, "127.0.0.1");
    assert!(!config.token_tracking.capture_response_text);
    assert!(config.token_tracking.capture_prompt_text);

    let catalog = config.catalog().unwrap();
    assert!(catalog.domain("claude.ai").is_some());
    let internal = catalog.domain("chat.internal.example").unwrap();
    assert_eq!(internal.cost_per_hour, 2.0);
    assert_eq!(catalog.cli_tools.last().unwrap().name, "llm");
}

#[test]
fn missing_user_file_is_skipped() {
    let dir = TempDir::new().unwrap();
    let config = load_layers(
        BUILTIN_CONFIG,
        Some(&dir.path().join("absent.yaml")),
        "COSTSCOPE_TEST_MISSING",
    )
    .unwrap();
    assert_eq!(config.web.port, 8080);
}

#[test]
fn malformed_user_file_is_an_error() {
    let dir = TempDir::new().unwrap();
    let file = dir.path().join("config.yaml");
    fs::write(&file, "web: [unterminated").unwrap();
    assert!(load_layers(BUILTIN_CONFIG, Some(&file), "COSTSCOPE_TEST_MALFORMED").is_err());
}

#[test]
fn environment_overrides_file() {
    let dir = TempDir::new().unwrap();
    let file = dir.path().join("config.yaml");
    fs::write(&file, "web:\n  port: 9100\n").unwrap();

    std::env::set_var("COSTSCOPE_TEST_ENV_WEB__PORT", "9200");
    std::env::set_var("COSTSCOPE_TEST_ENV_SCAN__WSL_ENABLED", "false");
    let config = load_layers(BUILTIN_CONFIG, Some(&file), "COSTSCOPE_TEST_ENV").unwrap();
    std::env::remove_var("COSTSCOPE_TEST_ENV_WEB__PORT");
    std::env::remove_var("COSTSCOPE_TEST_ENV_SCAN__WSL_ENABLED");

    assert_eq!(config.web.port, 9200);
    assert!(!config.scan.wsl_enabled);
}

#[test]
fn storage_path_overrides_prompt_db() {
    let dir = TempDir::new().unwrap();
    let file = dir.path().join("config.yaml");
    let db = dir.path().join("custom").join("prompts.db");
    fs::write(
        &file,
        format!(
            "state_dir: {:?}\ntoken_tracking:\n  storage_path: {:?}\n",
            dir.path().join("state"),
            db
        ),
    )
    .unwrap();

    let config = load_layers(BUILTIN_CONFIG, Some(&file), "COSTSCOPE_TEST_PATHS").unwrap();
    let paths = AppPaths::resolve(&config);
    assert_eq!(paths.prompt_db, db);
    assert_eq!(paths.state_dir, dir.path().join("state"));
}
