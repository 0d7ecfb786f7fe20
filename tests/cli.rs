//! End-to-end tests of the `crag` binary with offline backends.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn crag_binary() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_crag"))
}

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    fs::create_dir_all(root.join("config")).unwrap();
    fs::create_dir_all(root.join("files")).unwrap();

    fs::write(
        root.join("files").join("bylaws.txt"),
        "Condominium Bylaws\n\n\
         Art. 1 - The general meeting of owners is held every March.\n\n\
         Art. 2 - Monthly fees are due on the fifth business day.\n\n\
         Art. 3 - Fines require approval by the general meeting.\n",
    )
    .unwrap();
    fs::write(root.join("files").join("broken.pdf"), b"%PDF-1.4 truncated").unwrap();

    // Ollama generation needs no key at startup; questions in these tests
    // never reach it because the memory store starts empty in each process.
    let config_content = format!(
        r#"[embedding]
provider = "hashing"
dims = 256

[vector_store]
provider = "memory"

[generation]
provider = "ollama"
models = ["llama3"]
url = "http://127.0.0.1:9"

[audit]
path = "{}/data/audit.sqlite"

[logging]
level = "warn"
"#,
        root.display()
    );
    let config_path = root.join("config").join("crag.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_crag(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let output = Command::new(crag_binary())
        .arg("--config")
        .arg(config_path)
        .args(args)
        .env_remove("RUST_LOG")
        .output()
        .unwrap_or_else(|e| panic!("Failed to run crag: {}", e));
    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    (stdout, stderr, output.status.success())
}

#[test]
fn test_init_writes_config_once() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("config").join("crag.toml");

    let (stdout, _, success) = run_crag(&path, &["init"]);
    assert!(success);
    assert!(stdout.contains("wrote"));
    let written = fs::read_to_string(&path).unwrap();
    assert!(written.contains("text-embedding-ada-002"));
    assert!(written.contains("gpt-4o-mini"));

    let (_, stderr, success) = run_crag(&path, &["init"]);
    assert!(!success);
    assert!(stderr.contains("--force"));

    let (_, _, success) = run_crag(&path, &["init", "--force"]);
    assert!(success);
}

#[test]
fn test_classify_dry_run() {
    let (tmp, config) = setup_test_env();
    let file = tmp.path().join("files").join("bylaws.txt");
    let (stdout, stderr, success) = run_crag(&config, &["classify", file.to_str().unwrap()]);
    assert!(success, "stderr: {}", stderr);
    assert!(stdout.contains("doc type: bylaws"));
    assert!(stdout.contains("identity: bylaws"));
    assert!(stdout.contains("article: 3"));
    assert!(stdout.contains("articles: 1, 2, 3"));
}

#[test]
fn test_unreadable_pdf_fails_cleanly() {
    let (tmp, config) = setup_test_env();
    let file = tmp.path().join("files").join("broken.pdf");
    let (_, stderr, success) = run_crag(&config, &["classify", file.to_str().unwrap()]);
    assert!(!success);
    assert!(stderr.contains("extract"));
}

#[test]
fn test_ingest_then_history() {
    let (tmp, config) = setup_test_env();
    let file = tmp.path().join("files").join("bylaws.txt");

    let (stdout, stderr, success) = run_crag(
        &config,
        &["ingest", file.to_str().unwrap(), "--tenant", "12", "--sub", "3"],
    );
    assert!(success, "stderr: {}", stderr);
    assert!(stdout.contains("namespace: user_12_cond_3"));
    assert!(stdout.contains("stored: 3"));

    let (stdout, stderr, success) = run_crag(
        &config,
        &["ask", "Who approves fines?", "--tenant", "12", "--sub", "3", "--json"],
    );
    assert!(success, "stderr: {}", stderr);
    assert!(stdout.contains("\"success\": false"));
    assert!(stdout.contains("\"status\": \"no_candidates\""));

    let (stdout, _, success) = run_crag(&config, &["history", "--tenant", "12", "--sub", "3"]);
    assert!(success);
    assert!(stdout.contains("Who approves fines?"));
    assert!(stdout.contains("unanswered"));

    let (stdout, _, success) = run_crag(&config, &["history", "--tenant", "12", "--sub", "4"]);
    assert!(success);
    assert!(stdout.contains("No questions recorded"));
}

#[test]
fn test_bad_mode_rejected() {
    let (_tmp, config) = setup_test_env();
    let (_, stderr, success) = run_crag(
        &config,
        &["ask", "q", "--tenant", "1", "--sub", "1", "--mode", "everything"],
    );
    assert!(!success);
    assert!(stderr.contains("condo_only"));
}
