//! Integration tests for the `novella` binary.
//!
//! Every scenario is rejected before a backend is contacted, so no network or
//! real API key is needed.

use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use tempfile::TempDir;

struct Workspace {
    dir: TempDir,
}

impl Workspace {
    fn new(balance: u64) -> Self {
        let dir = TempDir::new().unwrap();
        let config = json!({
            "api_keys": {"gemini": "test-key"},
            "allowed_origins": ["https://novella.example"]
        });
        let library = json!({
            "tokens": {"tok-1": "writer"},
            "balances": {"writer": balance},
            "novels": {"novel-1": {"summary": "A cultivator seeks revenge."}}
        });
        let request = json!({
            "novelId": "novel-1",
            "contentType": "chapter",
            "wordCount": 800,
            "instruction": "Lin Feng confronts the elder."
        });
        std::fs::write(dir.path().join("config.json"), config.to_string()).unwrap();
        std::fs::write(dir.path().join("library.json"), library.to_string()).unwrap();
        std::fs::write(dir.path().join("request.json"), request.to_string()).unwrap();
        Self { dir }
    }

    fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    fn novella(&self, args: &[&str]) -> Output {
        Command::new(env!("CARGO_BIN_EXE_novella"))
            .arg("--config")
            .arg(self.path("config.json"))
            .args(args)
            .env_remove("GEMINI_API_KEY")
            .env_remove("ANTHROPIC_API_KEY")
            .env_remove("DEEPSEEK_API_KEY")
            .env_remove("OPENAI_API_KEY")
            .output()
            .unwrap()
    }

    fn generate(&self, token: &str, origin: &str) -> Output {
        let library = self.path("library.json");
        let request = self.path("request.json");
        let records = self.path("records");
        self.novella(&[
            "generate",
            "--library",
            arg(&library),
            "--token",
            token,
            "--origin",
            origin,
            "--records-dir",
            arg(&records),
            arg(&request),
        ])
    }
}

fn arg(path: &Path) -> &str {
    path.to_str().unwrap()
}

fn stdout_json(output: &Output) -> Value {
    serde_json::from_slice(&output.stdout).unwrap()
}

#[test]
fn test_insufficient_credits_exit_code_and_body() {
    let ws = Workspace::new(3);
    let output = ws.generate("tok-1", "https://novella.example");

    assert_eq!(output.status.code(), Some(4));
    let body = stdout_json(&output);
    assert_eq!(body["required"], 10);
    assert_eq!(body["balance"], 3);
}

#[test]
fn test_unknown_token_is_unauthenticated() {
    let ws = Workspace::new(100);
    let output = ws.generate("nope", "https://novella.example");

    assert_eq!(output.status.code(), Some(3));
    assert_eq!(stdout_json(&output)["error"], "authentication required");
}

#[test]
fn test_foreign_origin_is_refused() {
    let ws = Workspace::new(100);
    let output = ws.generate("tok-1", "https://elsewhere.example");
    assert_eq!(output.status.code(), Some(5));
}

#[test]
fn test_cost_prints_quote() {
    let ws = Workspace::new(0);
    let output = ws.novella(&["cost", "--model", "claude-opus-4", "--linked-chars", "2000"]);

    assert!(output.status.success());
    let quote = stdout_json(&output);
    assert_eq!(quote["baseCost"], 40);
    assert_eq!(quote["required"], 41);
}

#[test]
fn test_providers_marks_configured_backends() {
    let ws = Workspace::new(0);
    let output = ws.novella(&["providers"]);

    assert!(output.status.success());
    let text = String::from_utf8_lossy(&output.stdout);
    assert!(text.contains("gemini [configured]"));
    assert!(text.contains("anthropic [no key]"));
}

#[test]
fn test_records_empty_directory() {
    let ws = Workspace::new(0);
    let records = ws.path("records");
    let output = ws.novella(&["records", "--user", "writer", "--records-dir", arg(&records)]);

    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("No records found."));
}
