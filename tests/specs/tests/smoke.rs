// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! End-to-end smoke tests that run the real `modelmeter` binary against
//! stubbed provider endpoints.

use std::time::Duration;

use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;

use modelmeter_specs::{serve, stdout_json, Invocation};

const TIMEOUT: Duration = Duration::from_secs(20);

fn claude_usage_stub() -> Router {
    Router::new().route(
        "/usage",
        get(|| async {
            Json(json!({
                "five_hour": {"utilization": 42.0, "resets_at": "2025-08-01T05:00:00Z"},
                "seven_day": {"utilization": 0.5}
            }))
        }),
    )
}

#[tokio::test]
async fn claude_reports_canonical_usage() -> anyhow::Result<()> {
    let base = serve(claude_usage_stub()).await?;
    let inv = Invocation::new()?.env("CLAUDE_USAGE_URL", &format!("{base}/usage"));
    inv.write(
        ".claude/.credentials.json",
        r#"{"claudeAiOauth":{"accessToken":"tok","refreshToken":"rt","expiresAt":9999999999999}}"#,
    )?;

    let output = inv.run(&["claude", "--no-keychain"], TIMEOUT).await?;
    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));

    let usage = stdout_json(&output)?;
    assert_eq!(usage["sessionPercent"], 42.0);
    assert_eq!(usage["weeklyPercent"], 50.0);
    assert_eq!(usage["sessionResetAt"], "2025-08-01T05:00:00Z");
    assert!(usage["weeklyResetAt"].is_null());
    assert!(usage["updatedAt"].is_string());
    assert_eq!(usage.as_object().map(|o| o.len()), Some(5));
    Ok(())
}

#[tokio::test]
async fn missing_credentials_exit_not_found() -> anyhow::Result<()> {
    let inv = Invocation::new()?;

    let output = inv.run(&["claude", "--no-keychain"], TIMEOUT).await?;
    assert_eq!(output.status.code(), Some(3));
    assert!(output.stdout.is_empty());
    Ok(())
}

#[tokio::test]
async fn codex_refreshes_stale_token_and_writes_back() -> anyhow::Result<()> {
    let router = Router::new()
        .route(
            "/token",
            post(|| async {
                Json(json!({"access_token": "cx-new", "refresh_token": "rt-new", "id_token": "id"}))
            }),
        )
        .route(
            "/usage",
            get(|| async {
                Json(json!({"rate_limit": {
                    "primary_window": {"used_percent": 3, "reset_at": 1700000000},
                    "secondary_window": {"used_percent": 61}
                }}))
            }),
        );
    let base = serve(router).await?;
    let inv = Invocation::new()?
        .env("CODEX_TOKEN_URL", &format!("{base}/token"))
        .env("CODEX_USAGE_URL", &format!("{base}/usage"));
    let auth = inv.write(
        ".codex/auth.json",
        r#"{"OPENAI_API_KEY":null,"tokens":{"access_token":"cx-old","refresh_token":"rt"},"last_refresh":"2020-01-01T00:00:00Z"}"#,
    )?;

    let output = inv.run(&["codex"], TIMEOUT).await?;
    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));

    let usage = stdout_json(&output)?;
    assert_eq!(usage["sessionPercent"], 3.0);
    assert_eq!(usage["weeklyPercent"], 61.0);
    assert_eq!(usage["sessionResetAt"], "2023-11-14T22:13:20Z");

    let saved: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(auth)?)?;
    assert_eq!(saved["tokens"]["access_token"], "cx-new");
    assert_eq!(saved["tokens"]["refresh_token"], "rt-new");
    assert!(saved["OPENAI_API_KEY"].is_null());
    assert_ne!(saved["last_refresh"], "2020-01-01T00:00:00Z");
    Ok(())
}

#[tokio::test]
async fn extract_reads_file() -> anyhow::Result<()> {
    let inv = Invocation::new()?;
    let file = inv.write("usage.json", r#"{"sessionPercent": 10, "weeklyPercent": "20.5"}"#)?;
    let file = file.to_string_lossy().into_owned();

    let output = inv.run(&["extract", "--file", &file], TIMEOUT).await?;
    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));

    let usage = stdout_json(&output)?;
    assert_eq!(usage["sessionPercent"], 10.0);
    assert_eq!(usage["weeklyPercent"], 20.5);
    Ok(())
}

#[tokio::test]
async fn extract_reads_command_output() -> anyhow::Result<()> {
    let inv = Invocation::new()?;

    let output = inv
        .run(
            &["extract", "--cmd", r#"echo '{"five_hour":{"utilization":7},"seven_day":{"utilization":8}}'"#],
            TIMEOUT,
        )
        .await?;
    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));
    assert_eq!(stdout_json(&output)?["weeklyPercent"], 8.0);
    Ok(())
}

#[tokio::test]
async fn extract_rejects_invalid_stdin() -> anyhow::Result<()> {
    let inv = Invocation::new()?.stdin("not json");

    let output = inv.run(&["extract"], TIMEOUT).await?;
    assert_eq!(output.status.code(), Some(8));
    assert!(output.stdout.is_empty());
    Ok(())
}

#[tokio::test]
async fn extract_without_percentages_is_missing_fields() -> anyhow::Result<()> {
    let inv = Invocation::new()?.stdin(r#"{"sessionPercent": 1}"#);

    let output = inv.run(&["extract"], TIMEOUT).await?;
    assert_eq!(output.status.code(), Some(6));
    Ok(())
}

#[tokio::test]
async fn invalid_cli_exits_two() -> anyhow::Result<()> {
    let inv = Invocation::new()?;

    let output = inv.run(&["--timeout-secs", "0", "extract"], TIMEOUT).await?;
    assert_eq!(output.status.code(), Some(2));
    Ok(())
}
