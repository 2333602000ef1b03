use std::process::{Command, Output};

fn sift(dir: &std::path::Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_sift"))
        .args(args)
        .current_dir(dir)
        .env_remove("RUST_LOG")
        .output()
        .unwrap()
}

#[test]
fn stats_on_fresh_directory_reports_empty_store() {
    let dir = tempfile::tempdir().unwrap();
    let output = sift(dir.path(), &["stats", "--format", "json"]);
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    let stats: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(stats["vectors"], 0);
    assert!(stats["dimension"].is_null());
    assert!(stats["indexPath"].as_str().unwrap().ends_with("vector_store.idx"));
}

#[test]
fn search_on_empty_store_needs_no_provider() {
    let dir = tempfile::tempdir().unwrap();
    let output = sift(dir.path(), &["search", "anything"]);
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    assert!(String::from_utf8_lossy(&output.stdout).contains("No results found."));
    assert!(String::from_utf8_lossy(&output.stderr).contains("sift ingest"));
}

#[test]
fn zero_top_k_is_rejected_on_empty_store() {
    let dir = tempfile::tempdir().unwrap();
    let output = sift(dir.path(), &["search", "q", "--top-k", "0"]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("top_k"), "{stderr}");
    assert!(output.stdout.is_empty());
}

#[test]
fn nan_threshold_is_rejected_on_empty_store() {
    let dir = tempfile::tempdir().unwrap();
    let output = sift(dir.path(), &["search", "q", "--threshold", "NaN"]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("score_threshold"));
}

#[test]
fn malformed_filter_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let output = sift(dir.path(), &["search", "q", "--filter", "no-equals-sign"]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("key=value"));
}

#[test]
fn ingest_rejects_small_chunk_size() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("a.txt"), "text").unwrap();
    let output = sift(dir.path(), &["ingest", "a.txt", "--chunk-size", "50"]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("chunk_size"));
    assert!(!dir.path().join(".sift").exists());
}

#[test]
fn half_written_store_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir_all(dir.path().join(".sift")).unwrap();
    std::fs::write(dir.path().join(".sift/metadata.db"), "stray").unwrap();

    let output = sift(dir.path(), &["stats"]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("corrupt state"));
}
