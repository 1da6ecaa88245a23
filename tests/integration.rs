use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn kb_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("kb");
    path
}

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();

    let files_dir = root.join("files");
    fs::create_dir_all(&files_dir).unwrap();
    fs::write(
        files_dir.join("paper.txt"),
        "We propose the Transformer, based solely on attention mechanisms.",
    )
    .unwrap();

    let config_content = format!(
        r#"[db]
path = "{root}/data/kb.sqlite"

[storage]
root = "{root}/store"

[retrieval]
default_limit = 10
"#,
        root = root.display()
    );

    let config_path = config_dir.join("kb.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_kb(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = kb_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .output()
        .unwrap_or_else(|e| panic!("Failed to run kb binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let success = output.status.success();
    (stdout, stderr, success)
}

/// Value of the first `  <key>: <value>` line in ingest output.
fn field<'a>(stdout: &'a str, key: &str) -> &'a str {
    let prefix = format!("  {}: ", key);
    stdout
        .lines()
        .find_map(|l| l.strip_prefix(prefix.as_str()))
        .unwrap_or_else(|| panic!("no '{}' in output:\n{}", key, stdout))
}

fn ingest(config_path: &Path, url: &str, keywords: &[&str]) -> String {
    let mut args = vec!["ingest", url, "--content", "body text", "--summary", "a summary"];
    for k in keywords {
        args.push("--keyword");
        args.push(k);
    }
    let (stdout, stderr, success) = run_kb(config_path, &args);
    assert!(success, "ingest failed: stdout={}, stderr={}", stdout, stderr);
    stdout
}

#[test]
fn test_init_creates_database() {
    let (tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_kb(&config_path, &["init"]);
    assert!(success, "init failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("initialized"));
    assert!(tmp.path().join("data/kb.sqlite").exists());
    assert!(tmp.path().join("store").is_dir());
}

#[test]
fn test_init_idempotent() {
    let (_tmp, config_path) = setup_test_env();

    let (_, _, success1) = run_kb(&config_path, &["init"]);
    assert!(success1, "First init failed");

    let (_, _, success2) = run_kb(&config_path, &["init"]);
    assert!(success2, "Second init failed (not idempotent)");
}

#[test]
fn test_types_needs_no_config() {
    let binary = kb_binary();
    let output = Command::new(&binary)
        .args(["--config", "/nonexistent/kb.toml", "types"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    let types: Vec<&str> = stdout.lines().collect();
    assert_eq!(
        types,
        vec!["github", "github_ipynb", "arxiv", "youtube", "huggingface", "general"]
    );
}

#[test]
fn test_missing_config_fails() {
    let binary = kb_binary();
    let output = Command::new(&binary)
        .args(["--config", "/nonexistent/kb.toml", "stats"])
        .output()
        .unwrap();
    assert!(!output.status.success());
}

#[test]
fn test_classify_writes_nothing() {
    let (tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_kb(
        &config_path,
        &["classify", "https://github.com/rust-lang/rust?utm_source=x"],
    );
    assert!(success, "classify failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("type:       github"));
    assert!(stdout.contains("url:        https://github.com/rust-lang/rust\n"));
    assert!(stdout.contains("github_rust-lang_rust_"));
    assert!(!tmp.path().join("store").exists());
}

#[test]
fn test_classify_reader_proxy_forces_general() {
    let (_tmp, config_path) = setup_test_env();

    let (stdout, _, success) = run_kb(
        &config_path,
        &["classify", "https://arxiv.org/abs/1706.03762", "--reader-proxy"],
    );
    assert!(success);
    assert!(stdout.contains("type:       general"));
    assert!(stdout.contains("fetch via:  https://r.jina.ai/https://arxiv.org/abs/1706.03762"));
}

#[test]
fn test_ingest_three_way_write() {
    let (tmp, config_path) = setup_test_env();
    run_kb(&config_path, &["init"]);

    let paper = tmp.path().join("files/paper.txt");
    let (stdout, stderr, success) = run_kb(
        &config_path,
        &[
            "ingest",
            "https://arxiv.org/abs/1706.03762",
            "--content-file",
            paper.to_str().unwrap(),
            "--keyword",
            "transformers",
            "--keyword",
            " attention ",
            "--embeddings",
            "0.1,0.2,0.3",
        ],
    );
    assert!(success, "ingest failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("ok"));
    assert_eq!(field(&stdout, "id"), "1");
    assert_eq!(field(&stdout, "type"), "arxiv");

    // JSON file
    let path = PathBuf::from(field(&stdout, "path"));
    assert!(path.starts_with(tmp.path().join("store")));
    let file_name = path.file_name().unwrap().to_str().unwrap();
    assert!(file_name.starts_with("arxiv_1706.03762_"));
    let json: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(json["type"], "arxiv");
    assert_eq!(json["url"], "https://arxiv.org/abs/1706.03762");
    assert_eq!(json["keywords"], serde_json::json!(["transformers", "attention"]));

    // Index line
    let index = fs::read_to_string(tmp.path().join("store/index.csv")).unwrap();
    let timestamp = field(&stdout, "timestamp");
    assert_eq!(index, format!("arxiv,{},{}\n", timestamp, path.display()));

    // Relational row
    let (stdout, stderr, success) = run_kb(&config_path, &["get", "1", "--json"]);
    assert!(success, "get failed: stdout={}, stderr={}", stdout, stderr);
    let record: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(record["id"], 1);
    assert_eq!(record["type"], "arxiv");
    assert!(record["content"]
        .as_str()
        .unwrap()
        .contains("attention mechanisms"));
    assert_eq!(record["embeddings"].as_array().unwrap().len(), 3);
}

#[test]
fn test_ingest_exits_when_storage_root_unusable() {
    let (tmp, config_path) = setup_test_env();
    run_kb(&config_path, &["init"]);

    // storage.root is a regular file, so no date directory can be created
    let blocker = tmp.path().join("blocker");
    fs::write(&blocker, "not a directory").unwrap();
    let bad_config = tmp.path().join("config/blocked.toml");
    fs::write(
        &bad_config,
        format!(
            "[db]\npath = \"{root}/data/kb.sqlite\"\n\n[storage]\nroot = \"{blocker}\"\n",
            root = tmp.path().display(),
            blocker = blocker.display()
        ),
    )
    .unwrap();

    let output = Command::new(kb_binary())
        .arg("--config")
        .arg(&bad_config)
        .args(["ingest", "https://example.com/page", "--content", "body"])
        .output()
        .unwrap();
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert_eq!(output.status.code(), Some(2), "stderr={}", stderr);
    assert!(stderr.contains("fatal:"), "stderr={}", stderr);
    assert!(stderr.contains("hint:"), "stderr={}", stderr);
    assert!(stderr.contains("storage.root"), "stderr={}", stderr);

    let (stdout, _, success) = run_kb(&config_path, &["search", "--json"]);
    assert!(success);
    let records: Vec<serde_json::Value> = serde_json::from_str(&stdout).unwrap();
    assert!(records.is_empty());
    assert!(!tmp.path().join("store/index.csv").exists());
}

#[test]
fn test_ingest_requires_content() {
    let (_tmp, config_path) = setup_test_env();
    run_kb(&config_path, &["init"]);

    let (_, stderr, success) = run_kb(&config_path, &["ingest", "https://example.com"]);
    assert!(!success);
    assert!(stderr.contains("--content"));
}

#[test]
fn test_get_not_found() {
    let (_tmp, config_path) = setup_test_env();
    run_kb(&config_path, &["init"]);

    let (_, stderr, success) = run_kb(&config_path, &["get", "42"]);
    assert!(!success);
    assert!(stderr.contains("not found"));
}

#[test]
fn test_update_replaces_keywords() {
    let (_tmp, config_path) = setup_test_env();
    run_kb(&config_path, &["init"]);
    ingest(&config_path, "https://example.com/post", &["old", "stale"]);

    let (stdout, stderr, success) = run_kb(
        &config_path,
        &["update", "1", "--keyword", "fresh", "--summary", "new summary"],
    );
    assert!(success, "update failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("updated 1"));

    let (stdout, _, _) = run_kb(&config_path, &["get", "1", "--json"]);
    let record: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(record["keywords"], serde_json::json!(["fresh"]));
    assert_eq!(record["summary"], "new summary");
}

#[test]
fn test_update_rejects_timestamp_in_patch() {
    let (tmp, config_path) = setup_test_env();
    run_kb(&config_path, &["init"]);
    ingest(&config_path, "https://example.com/post", &[]);

    let patch = tmp.path().join("patch.json");
    fs::write(&patch, r#"{"timestamp": 0}"#).unwrap();
    let (_, _, success) = run_kb(
        &config_path,
        &["update", "1", "--patch-file", patch.to_str().unwrap()],
    );
    assert!(!success);
}

#[test]
fn test_update_missing_record() {
    let (_tmp, config_path) = setup_test_env();
    run_kb(&config_path, &["init"]);

    let (_, stderr, success) = run_kb(&config_path, &["update", "9", "--summary", "x"]);
    assert!(!success);
    assert!(stderr.contains("not found"));
}

#[test]
fn test_delete() {
    let (_tmp, config_path) = setup_test_env();
    run_kb(&config_path, &["init"]);
    ingest(&config_path, "https://example.com/post", &["a"]);

    let (stdout, _, success) = run_kb(&config_path, &["delete", "1"]);
    assert!(success);
    assert!(stdout.contains("deleted 1"));

    let (_, _, success) = run_kb(&config_path, &["get", "1"]);
    assert!(!success);

    let (_, stderr, success) = run_kb(&config_path, &["delete", "1"]);
    assert!(!success, "deleting a missing record must fail");
    assert!(stderr.contains("not found"));
}

#[test]
fn test_search_filters() {
    let (_tmp, config_path) = setup_test_env();
    run_kb(&config_path, &["init"]);
    ingest(&config_path, "https://github.com/tokio-rs/tokio", &["rust", "async"]);
    ingest(&config_path, "https://arxiv.org/abs/1706.03762", &["ml"]);
    ingest(&config_path, "https://example.com/blog", &["rust"]);

    let (stdout, stderr, success) = run_kb(&config_path, &["search", "--keyword", "rust"]);
    assert!(success, "search failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("github.com/tokio-rs/tokio"));
    assert!(stdout.contains("example.com/blog"));
    assert!(!stdout.contains("arxiv.org"));

    let (stdout, _, _) = run_kb(
        &config_path,
        &["search", "--keyword", "rust", "--type", "general"],
    );
    assert!(stdout.contains("example.com/blog"));
    assert!(!stdout.contains("tokio"));

    let (stdout, _, _) = run_kb(&config_path, &["search", "--text", "nonexistent"]);
    assert!(stdout.contains("No results."));

    let (_, _, success) = run_kb(&config_path, &["search", "--type", "podcast"]);
    assert!(!success, "unknown type must be rejected");
}

#[test]
fn test_recent_limit() {
    let (_tmp, config_path) = setup_test_env();
    run_kb(&config_path, &["init"]);
    ingest(&config_path, "https://example.com/a", &[]);
    ingest(&config_path, "https://example.com/b", &[]);

    let (stdout, _, success) = run_kb(&config_path, &["recent", "--limit", "1", "--json"]);
    assert!(success);
    let records: Vec<serde_json::Value> = serde_json::from_str(&stdout).unwrap();
    assert_eq!(records.len(), 1);
}

#[test]
fn test_related_ranks_by_overlap() {
    let (_tmp, config_path) = setup_test_env();
    run_kb(&config_path, &["init"]);
    ingest(&config_path, "https://example.com/subject", &["rust", "async", "tokio"]);
    ingest(&config_path, "https://example.com/close", &["rust", "async", "tokio"]);
    ingest(&config_path, "https://example.com/far", &["rust", "python"]);
    ingest(&config_path, "https://example.com/none", &["cooking"]);

    let (stdout, stderr, success) = run_kb(&config_path, &["related", "1", "--json"]);
    assert!(success, "related failed: stdout={}, stderr={}", stdout, stderr);
    let items: Vec<serde_json::Value> = serde_json::from_str(&stdout).unwrap();
    let ids: Vec<i64> = items.iter().map(|i| i["id"].as_i64().unwrap()).collect();
    assert_eq!(ids, vec![2, 3]);
    assert_eq!(items[0]["score"].as_f64().unwrap(), 1.0);

    let (stdout, _, success) = run_kb(&config_path, &["related", "99"]);
    assert!(success);
    assert!(stdout.contains("No related records."));
}

#[test]
fn test_load_is_idempotent() {
    let (tmp, config_path) = setup_test_env();
    run_kb(&config_path, &["init"]);

    let dir = tmp.path().join("import/2022-01-01");
    fs::create_dir_all(&dir).unwrap();
    fs::write(
        dir.join("github_a_b_1640995200.json"),
        r#"{"url": "https://github.com/a/b", "type": "github", "timestamp": 1640995200,
            "content": "repo", "keywords": ["x"]}"#,
    )
    .unwrap();
    fs::write(
        dir.join("general_c_1640995201.json"),
        r#"{"url": "c.example.com", "type": "general", "timestamp": 1640995201,
            "content": "page", "embeddings": "[0.5, 0.25]"}"#,
    )
    .unwrap();
    fs::write(dir.join("broken.json"), "{not json").unwrap();
    fs::write(dir.join("notes.txt"), "ignored").unwrap();

    let import = tmp.path().join("import");
    let (stdout, stderr, success) = run_kb(&config_path, &["load", import.to_str().unwrap()]);
    assert!(success, "load failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("scanned: 3"));
    assert!(stdout.contains("inserted: 2"));
    assert!(stdout.contains("failed: 1"));

    let (stdout, _, success) = run_kb(&config_path, &["load", import.to_str().unwrap()]);
    assert!(success);
    assert!(stdout.contains("inserted: 0"));
    assert!(stdout.contains("already present: 2"));

    let (stdout, _, _) = run_kb(&config_path, &["search", "--json"]);
    let records: Vec<serde_json::Value> = serde_json::from_str(&stdout).unwrap();
    assert_eq!(records.len(), 2);
}

#[test]
fn test_index_rebuild_matches_records() {
    let (tmp, config_path) = setup_test_env();
    run_kb(&config_path, &["init"]);
    ingest(&config_path, "https://github.com/a/b", &[]);
    ingest(&config_path, "https://example.com/x", &[]);
    run_kb(&config_path, &["delete", "1"]);

    let index_path = tmp.path().join("store/index.csv");
    fs::write(&index_path, "garbage\n").unwrap();

    let (stdout, stderr, success) = run_kb(&config_path, &["index", "rebuild"]);
    assert!(success, "rebuild failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("entries: 1"));

    let (stdout, _, success) = run_kb(&config_path, &["index", "list"]);
    assert!(success);
    let lines: Vec<&str> = stdout.lines().collect();
    assert_eq!(lines.len(), 1);
    assert!(lines[0].starts_with("general,"));
    assert!(lines[0].contains("general_httpsexamplecomx_"));
}

#[test]
fn test_index_rebuild_keeps_loaded_file_paths() {
    let (tmp, config_path) = setup_test_env();
    run_kb(&config_path, &["init"]);

    let legacy = tmp.path().join("legacy");
    fs::create_dir_all(&legacy).unwrap();
    let file = legacy.join("old.json");
    fs::write(
        &file,
        r#"{"url": "https://github.com/old/repo", "type": "github", "timestamp": 1234,
            "content": "repo"}"#,
    )
    .unwrap();

    let (_, stderr, success) = run_kb(&config_path, &["load", legacy.to_str().unwrap()]);
    assert!(success, "load failed: {}", stderr);
    let (stdout, stderr, success) = run_kb(&config_path, &["index", "rebuild"]);
    assert!(success, "rebuild failed: {}", stderr);
    assert!(stdout.contains("entries: 1"));

    let (stdout, _, _) = run_kb(&config_path, &["index", "list"]);
    assert_eq!(stdout.trim(), format!("github,1234,{}", file.display()));
}

#[test]
fn test_stats() {
    let (_tmp, config_path) = setup_test_env();
    run_kb(&config_path, &["init"]);
    ingest(&config_path, "https://github.com/a/b", &["rust", "cli"]);
    ingest(&config_path, "https://example.com/x", &["rust"]);

    let (stdout, stderr, success) = run_kb(&config_path, &["stats"]);
    assert!(success, "stats failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("Records:     2"));
    assert!(stdout.contains("Index:       2 entries"));
    assert!(stdout.contains("rust"));
}
