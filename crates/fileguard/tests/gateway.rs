//! Tool handlers going through the gateway built from configuration.

use file_access_guard::ResolveOptions;
use fileguard::config::SecurityConfig;
use fileguard::{AccessIntent, AuditOutcome, Config, ToolGateway};
use serde_json::json;
use std::path::Path;
use tokio::io::AsyncReadExt;

type TestResult = Result<(), Box<dyn std::error::Error>>;

fn confined_config(root: &Path) -> Config {
    Config {
        security: SecurityConfig {
            allowed_roots: vec![root.to_path_buf()],
            include_default_directories: false,
            base_directory: Some(root.to_path_buf()),
            ..SecurityConfig::default()
        },
        ..Config::default()
    }
}

#[tokio::test]
async fn test_traversal_is_rejected_without_leaking_paths() -> TestResult {
    let temp_dir = tempfile::tempdir()?;
    let root = temp_dir.path().canonicalize()?;
    let gateway = ToolGateway::from_config(&confined_config(&root))?;

    let err = gateway
        .validate(&json!("../../../etc/passwd"), AccessIntent::Read)
        .await
        .err()
        .ok_or("traversal should be rejected")?;

    assert_eq!(err.code, "ACCESS_DENIED");
    assert!(err.message.contains("../../../etc/passwd"));
    assert!(!err.message.contains(&*root.to_string_lossy()));

    let last = gateway.audit().recent().pop().ok_or("audit record expected")?;
    assert_eq!(last.outcome, AuditOutcome::Rejected);
    assert_eq!(last.detail.as_deref(), Some("ACCESS_DENIED"));
    Ok(())
}

#[tokio::test]
async fn test_non_string_arguments_are_invalid_input() -> TestResult {
    let temp_dir = tempfile::tempdir()?;
    let root = temp_dir.path().canonicalize()?;
    let gateway = ToolGateway::from_config(&confined_config(&root))?;

    for argument in [json!(42), json!(null), json!({"path": "a"}), json!("")] {
        let err = gateway
            .validate(&argument, AccessIntent::Read)
            .await
            .err()
            .ok_or("expected rejection")?;
        assert_eq!(err.code, "INVALID_INPUT");
    }

    let err = gateway
        .open_for_streaming(&json!(["a.txt"]))
        .await
        .err()
        .ok_or("expected rejection")?;
    assert_eq!(err.code, "INVALID_INPUT");
    assert!(
        gateway
            .audit()
            .recent()
            .iter()
            .all(|record| record.path == "<invalid input>")
    );
    Ok(())
}

#[tokio::test]
async fn test_inspect_reports_disguised_executable() -> TestResult {
    let temp_dir = tempfile::tempdir()?;
    let root = temp_dir.path().canonicalize()?;
    let mut payload = b"MZ\x90\x00\x03\x00\x00\x00".to_vec();
    payload.extend_from_slice(&[0u8; 56]);
    std::fs::write(root.join("invoice.pdf"), &payload)?;

    let gateway = ToolGateway::from_config(&confined_config(&root))?;
    let report = gateway.inspect(&json!("invoice.pdf")).await?;

    assert_eq!(report.detected_type, Some("EXE"));
    assert!(report.extension_mismatch);
    assert_eq!(report.expected_types, Some(vec!["PDF"]));
    assert_eq!(report.category.as_deref(), Some("executable"));

    let last = gateway.audit().recent().pop().ok_or("audit record expected")?;
    assert_eq!(last.outcome, AuditOutcome::Mismatch);
    assert_eq!(last.detail.as_deref(), Some("EXE"));
    Ok(())
}

#[tokio::test]
async fn test_inspect_withholds_sensitive_content() -> TestResult {
    let temp_dir = tempfile::tempdir()?;
    let root = temp_dir.path().canonicalize()?;
    std::fs::write(root.join(".env"), "API_TOKEN=abc")?;

    let gateway = ToolGateway::from_config(&confined_config(&root))?;
    let report = gateway.inspect(&json!(".env")).await?;

    assert!(report.sensitivity.is_sensitive);
    assert_eq!(report.bytes_read, 0);
    assert!(report.detected_type.is_none());

    let last = gateway.audit().recent().pop().ok_or("audit record expected")?;
    assert_eq!(last.outcome, AuditOutcome::Withheld);
    assert_eq!(last.path, "[REDACTED]");
    Ok(())
}

#[tokio::test]
async fn test_open_for_streaming_reads_the_validated_file() -> TestResult {
    let temp_dir = tempfile::tempdir()?;
    let root = temp_dir.path().canonicalize()?;
    std::fs::write(root.join("notes.txt"), "hello")?;

    let gateway = ToolGateway::from_config(&confined_config(&root))?;
    let (validated, mut file) = gateway.open_for_streaming(&json!("notes.txt")).await?;
    let mut contents = String::new();
    file.read_to_string(&mut contents).await?;

    assert_eq!(validated.real_path(), root.join("notes.txt"));
    assert_eq!(contents, "hello");
    Ok(())
}

#[tokio::test]
async fn test_create_intent_accepts_missing_file_in_writable_dir() -> TestResult {
    let temp_dir = tempfile::tempdir()?;
    let root = temp_dir.path().canonicalize()?;
    let gateway = ToolGateway::from_config(&confined_config(&root))?;

    let validated = gateway
        .validate(&json!("drafts/new.md"), AccessIntent::Create)
        .await;
    // `drafts` does not exist; its nearest existing ancestor is the writable root
    let validated = validated?;
    assert!(!validated.existed());

    let err = gateway
        .validate(&json!("drafts/new.md"), AccessIntent::Read)
        .await
        .err()
        .ok_or("missing file cannot be read")?;
    assert_eq!(err.code, "ACCESS_DENIED");
    Ok(())
}

#[cfg(unix)]
#[tokio::test]
async fn test_symlink_override_is_honored() -> TestResult {
    let temp_dir = tempfile::tempdir()?;
    let root = temp_dir.path().canonicalize()?;
    std::fs::write(root.join("target.txt"), "x")?;
    std::os::unix::fs::symlink(root.join("target.txt"), root.join("alias.txt"))?;

    let gateway = ToolGateway::from_config(&confined_config(&root))?;
    let followed = gateway
        .validate(&json!("alias.txt"), AccessIntent::Read)
        .await?;
    assert_eq!(followed.real_path(), root.join("target.txt"));

    let err = gateway
        .validate_with(&json!("alias.txt"), ResolveOptions::must_exist().with_symlinks(false))
        .await
        .err()
        .ok_or("symlink should be refused")?;
    assert_eq!(err.code, "VALIDATION_ERROR");

    let err = gateway
        .open_for_streaming(&json!("alias.txt"))
        .await
        .err()
        .ok_or("streaming never follows symlinks")?;
    assert_eq!(err.code, "VALIDATION_ERROR");
    Ok(())
}
