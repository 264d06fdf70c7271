//! CLI bridge tests
//!
//! Run the built binary against a shared directory and check its exit codes
//! and output. The export snapshot is produced by the real store so the two
//! halves of the bridge are tested against each other.

use marginalia_core::{Category, DocumentStore, SharedPaths, TextRange};
use std::path::Path;
use std::process::{Command, Output};
use tempfile::TempDir;

fn run(dir: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_marginalia"))
        .arg("--dir")
        .arg(dir)
        .args(args)
        .output()
        .unwrap()
}

#[test]
fn exits_with_code_one_when_export_is_missing() {
    let temp = TempDir::new().unwrap();

    let output = run(temp.path(), &["prompt"]);

    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("No export snapshot"));
}

#[test]
fn exits_with_code_one_when_export_is_unparseable() {
    let temp = TempDir::new().unwrap();
    std::fs::write(SharedPaths::new(temp.path()).export_path(), "{broken").unwrap();

    let output = run(temp.path(), &["status"]);

    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("not valid"));
}

#[tokio::test]
async fn prompt_prints_generated_prompt() {
    let temp = TempDir::new().unwrap();
    let paths = SharedPaths::new(temp.path());
    let store = DocumentStore::new(paths.clone());

    store.update_title("Essay").await;
    store.update_content("one two three").await;
    store
        .add_annotation(
            TextRange::new(0, 3),
            "one",
            Some(Category::Voice),
            "livelier",
        )
        .await;
    store.save_now().await.unwrap();

    let output = run(temp.path(), &["prompt"]);

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Document: Essay"));
    assert!(stdout.contains("livelier"));
}
