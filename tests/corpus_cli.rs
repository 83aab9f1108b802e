//! Integration tests that exercise the `dqa` binary end to end.

use std::fs;
use std::path::Path;
use std::process::Command;
use tempfile::TempDir;

fn dqa_binary() -> std::path::PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop();
    path.pop();
    path.push("dqa");
    path
}

fn setup_env(doc_name: &str, content: &str) -> (TempDir, std::path::PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();
    let docs = root.join("docs");
    fs::create_dir_all(&docs).unwrap();
    fs::write(docs.join(doc_name), content).unwrap();

    let config_content = format!(
        r#"[documents]
dir = "{}/docs"
"#,
        root.display()
    );
    let config_path = root.join("dqa.toml");
    fs::write(&config_path, config_content).unwrap();
    (tmp, config_path)
}

fn run_dqa(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let output = Command::new(dqa_binary())
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .output()
        .unwrap_or_else(|e| panic!("Failed to run dqa: {}", e));
    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    (stdout, stderr, output.status.success())
}

#[test]
fn corpus_reports_ingested_files() {
    let (_tmp, config_path) = setup_env("handbook.txt", "The office opens at 9 AM.\n");
    let (stdout, stderr, success) = run_dqa(&config_path, &["corpus"]);
    assert!(success, "corpus failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("ingested 1 file(s)"), "got: {}", stdout);
    assert!(stdout.contains("handbook.txt"), "got: {}", stdout);
}

#[test]
fn corpus_dump_prints_document_text() {
    let (_tmp, config_path) = setup_env("handbook.txt", "Badges come from facilities.\n");
    let (stdout, _, success) = run_dqa(&config_path, &["corpus", "--dump"]);
    assert!(success);
    assert!(stdout.contains("Badges come from facilities."), "got: {}", stdout);
    assert!(stdout.contains("===== handbook.txt ====="), "got: {}", stdout);
}

#[test]
fn corpus_fails_on_a_directory_without_documents() {
    let tmp = TempDir::new().unwrap();
    let docs = tmp.path().join("docs");
    fs::create_dir_all(&docs).unwrap();
    fs::write(docs.join("image.png"), [0x89u8, 0x50]).unwrap();

    let config_path = tmp.path().join("dqa.toml");
    fs::write(
        &config_path,
        format!("[documents]\ndir = \"{}/docs\"\n", tmp.path().display()),
    )
    .unwrap();

    let (stdout, stderr, success) = run_dqa(&config_path, &["corpus"]);
    assert!(!success, "corpus should fail: {}", stdout);
    assert!(
        stderr.contains("no readable documents"),
        "got stderr: {}",
        stderr
    );
}

#[test]
fn bad_retrieval_mode_is_rejected_at_config_load() {
    let (_tmp, config_path) = setup_env("notes.txt", "content");
    let mut config = fs::read_to_string(&config_path).unwrap();
    config.push_str("\n[retrieval]\nmode = \"hybrid\"\n");
    fs::write(&config_path, config).unwrap();

    let (_, stderr, success) = run_dqa(&config_path, &["corpus"]);
    assert!(!success);
    assert!(stderr.contains("retrieval mode"), "got stderr: {}", stderr);
}
