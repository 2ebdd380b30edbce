//! CLI command tests
//!
//! This module contains all tests for the CLI commands.

use std::path::{Path, PathBuf};

use clap::{CommandFactory, Parser};
use serde_json::json;
use vaultsort_core::{Cancellation, Provider};

use crate::cli::{ClassifyArgs, Cli, Commands, ProviderArgs};
use crate::commands;

fn write_export(dir: &Path) -> PathBuf {
    let export = json!({
        "encrypted": false,
        "folders": [{"id": "f-1", "name": "Work"}],
        "items": [
            {
                "id": "i-1",
                "name": "GitHub",
                "type": 1,
                "folderId": "f-1",
                "login": {"uris": [{"uri": "https://github.com"}], "username": "dev", "password": "pw1"}
            },
            {
                "id": "i-2",
                "name": "Mail",
                "type": 1,
                "login": {"username": "alice@google.com", "password": "pw2"}
            },
            {
                "id": "i-3",
                "name": "Router",
                "type": 1,
                "login": {"uris": [{"uri": "http://10.0.0.1"}], "password": "pw3"}
            }
        ]
    });
    let path = dir.join("export.json");
    std::fs::write(&path, export.to_string()).unwrap();
    path
}

fn mock_args(input: PathBuf, output: PathBuf) -> ClassifyArgs {
    ClassifyArgs {
        input,
        output,
        provider: ProviderArgs {
            provider: Some("mock".into()),
            ..Default::default()
        },
        batch_size: Some(2),
        concurrency: None,
        max_retries: None,
        timeout_secs: None,
        run_timeout_secs: None,
        domain_folder_map: None,
        category_as_folder: false,
        reuse_domain_results: false,
        detect_homelab: false,
    }
}

// ========== Classify Command Tests ==========

#[tokio::test]
async fn test_classify_file_with_mock_provider() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_export(dir.path());
    let output = dir.path().join("sorted.csv");

    let map = dir.path().join("map.yaml");
    std::fs::write(&map, "- domain: google.com\n  folder: Google\n").unwrap();

    let mut args = mock_args(input, output.clone());
    args.domain_folder_map = Some(map);
    args.detect_homelab = true;

    let result = commands::classify_file(&args, &Cancellation::new())
        .await
        .unwrap();
    assert_eq!(result.report.total, 3);
    assert_eq!(result.report.deterministic, 2);
    assert_eq!(result.report.model, 1);

    let content = std::fs::read_to_string(&output).unwrap();
    let lines: Vec<_> = content.lines().collect();
    assert_eq!(lines.len(), 4);
    assert!(lines[0].starts_with("id,name,category,confidence,reason"));
    assert!(lines[1].starts_with("i-1,GitHub,Tools/Development,80,"));
    assert!(lines[2].starts_with("i-2,Mail,Google,100,Mapped domain,"));
    assert!(lines[3].starts_with("i-3,Router,Personal/Homelab,100,Private IP,"));
}

#[tokio::test]
async fn test_classify_category_as_folder() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_export(dir.path());
    let output = dir.path().join("sorted.csv");

    let mut args = mock_args(input, output);
    args.category_as_folder = true;

    let result = commands::classify_file(&args, &Cancellation::new())
        .await
        .unwrap();
    assert_eq!(result.rows[0].folder, "Tools/Development");
    assert_eq!(result.rows[1].folder, "");
}

#[tokio::test]
async fn test_classify_missing_output_dir_fails_first() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_export(dir.path());
    let output = dir.path().join("missing").join("sorted.csv");

    let err = commands::classify_file(&mock_args(input, output.clone()), &Cancellation::new())
        .await
        .unwrap_err();
    assert!(err.to_string().contains("Output directory does not exist"));
    assert!(!output.exists());
}

#[tokio::test]
async fn test_classify_bad_export_writes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("export.json");
    std::fs::write(&input, r#"{"folders": []}"#).unwrap();
    let output = dir.path().join("sorted.csv");

    let err = commands::classify_file(&mock_args(input, output.clone()), &Cancellation::new())
        .await
        .unwrap_err();
    assert!(format!("{:#}", err).contains("items"));
    assert!(!output.exists());
}

#[tokio::test]
async fn test_classify_rejects_zero_batch_size() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_export(dir.path());
    let mut args = mock_args(input, dir.path().join("sorted.csv"));
    args.batch_size = Some(0);

    let err = commands::classify_file(&args, &Cancellation::new())
        .await
        .unwrap_err();
    assert!(err.to_string().contains("Batch size"));
}

#[tokio::test]
async fn test_classify_interrupted_still_writes_rows() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_export(dir.path());
    let output = dir.path().join("sorted.csv");
    let cancel = Cancellation::new();
    cancel.cancel("interrupted");

    let result = commands::classify_file(&mock_args(input, output.clone()), &cancel)
        .await
        .unwrap();
    assert!(result.report.cancelled);
    assert_eq!(result.rows.len(), 3);
    assert!(std::fs::read_to_string(&output)
        .unwrap()
        .contains("cancelled: interrupted"));
}

// ========== Config Resolution Tests ==========

#[test]
fn test_classify_config_applies_flags() {
    let dir = tempfile::tempdir().unwrap();
    let mut args = mock_args(dir.path().join("in.json"), dir.path().join("out.csv"));
    args.provider.model = Some("bigger-model".into());
    args.concurrency = Some(2);
    args.max_retries = Some(5);
    args.timeout_secs = Some(9);
    args.run_timeout_secs = Some(120);

    let config = commands::classify_config(&args).unwrap();
    assert_eq!(config.provider, Provider::Mock);
    assert_eq!(config.model, "bigger-model");
    assert_eq!(config.batch_size, 2);
    assert_eq!(config.concurrency, 2);
    assert_eq!(config.max_retries, 5);
    assert_eq!(config.timeout.as_secs(), 9);
    assert_eq!(config.run_timeout.map(|d| d.as_secs()), Some(120));
}

#[test]
fn test_config_file_is_applied() {
    let dir = tempfile::tempdir().unwrap();
    let config_path = dir.path().join("classifier.toml");
    std::fs::write(
        &config_path,
        "[provider]\nname = \"openai_compatible\"\nbase_url = \"http://localhost:8000/v1\"\n\n[batching]\nbatch_size = 25\n",
    )
    .unwrap();

    let config = commands::load_config(&ProviderArgs {
        config: Some(config_path),
        ..Default::default()
    })
    .unwrap();
    assert_eq!(config.provider, Provider::OpenAICompatible);
    assert_eq!(config.batch_size, 25);
    assert_eq!(config.endpoint().unwrap(), "http://localhost:8000/v1");
}

#[test]
fn test_unknown_provider_rejected() {
    let err = commands::load_config(&ProviderArgs {
        provider: Some("carrier-pigeon".into()),
        ..Default::default()
    })
    .unwrap_err();
    assert!(err.to_string().contains("Unknown provider"));
}

#[test]
fn test_missing_config_file_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let result = commands::load_config(&ProviderArgs {
        config: Some(dir.path().join("nope.toml")),
        ..Default::default()
    });
    assert!(result.is_err());
}

// ========== Other Command Tests ==========

#[test]
fn test_cmd_categories() {
    assert!(commands::cmd_categories().is_ok());
    let labels = commands::category_labels();
    assert_eq!(labels.len(), 27);
    assert_eq!(labels[0], "Financial/Banking");
    assert!(!labels.contains(&"Uncategorized"));
}

#[test]
fn test_cmd_prompts_show() {
    assert!(commands::cmd_prompts_show().is_ok());
}

#[test]
fn test_cmd_prompts_path() {
    assert!(commands::cmd_prompts_path().is_ok());
}

#[tokio::test]
async fn test_cmd_check_mock_provider() {
    let result = commands::cmd_check(&ProviderArgs {
        provider: Some("mock".into()),
        ..Default::default()
    })
    .await;
    assert!(result.is_ok());
}

// ========== Argument Parsing Tests ==========

#[test]
fn test_cli_definition_is_valid() {
    Cli::command().debug_assert();
}

#[test]
fn test_parse_classify_flags() {
    let cli = Cli::try_parse_from([
        "vaultsort",
        "classify",
        "-i",
        "export.json",
        "-o",
        "out.csv",
        "-m",
        "openai/gpt-4o-mini",
        "-b",
        "5",
        "--provider",
        "requesty",
        "--reuse-domain-results",
        "--verbose",
    ])
    .unwrap();
    assert!(cli.verbose);

    let Commands::Classify(args) = cli.command else {
        panic!("expected classify");
    };
    assert_eq!(args.input, PathBuf::from("export.json"));
    assert_eq!(args.batch_size, Some(5));
    assert_eq!(args.provider.model.as_deref(), Some("openai/gpt-4o-mini"));
    assert_eq!(args.provider.provider.as_deref(), Some("requesty"));
    assert!(args.reuse_domain_results);
    assert!(!args.detect_homelab);
}

#[test]
fn test_parse_classify_requires_paths() {
    assert!(Cli::try_parse_from(["vaultsort", "classify", "-i", "export.json"]).is_err());
}
