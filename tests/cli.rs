//! Tests that drive the `advisor` binary.

use axum::{routing::post, Json, Router};
use serde_json::{json, Value};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn advisor_binary() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_advisor"))
}

/// Write a config whose index lives in `tmp/index` and whose remote
/// services point at `remote` (unused when nothing is called).
fn write_config(tmp: &TempDir, remote: &str, trusted: bool) -> PathBuf {
    let root = tmp.path();
    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();

    let config_content = format!(
        r#"[index]
path = "{root}/index"
top_k = 10
trusted = {trusted}

[embedding]
provider = "gemini"
model = "text-embedding-004"
dims = 3
url = "{remote}"
max_retries = 0

[answer]
provider = "gemini"
model = "gemini-1.5-flash"
url = "{remote}"
max_retries = 0
"#,
        root = root.display(),
        trusted = trusted,
        remote = remote,
    );

    let config_path = config_dir.join("advisor.toml");
    fs::write(&config_path, config_content).unwrap();
    config_path
}

fn run_advisor(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = advisor_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path)
        .args(args)
        .env("GOOGLE_API_KEY", "test-key")
        .env_remove("RUST_LOG")
        .output()
        .unwrap_or_else(|e| panic!("Failed to run advisor binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    (stdout, stderr, output.status.success())
}

/// Run the binary off the async runtime so in-process mocks keep serving.
async fn run_advisor_async(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let config_path = config_path.to_path_buf();
    let args: Vec<String> = args.iter().map(|a| a.to_string()).collect();
    tokio::task::spawn_blocking(move || {
        let args: Vec<&str> = args.iter().map(String::as_str).collect();
        run_advisor(&config_path, &args)
    })
    .await
    .unwrap()
}

/// Gemini stand-in: every text embeds to the same vector and every prompt
/// gets the same answer.
async fn spawn_gemini_mock() -> String {
    let app = Router::new()
        .route(
            "/v1beta/models/text-embedding-004:batchEmbedContents",
            post(|Json(body): Json<Value>| async move {
                let n = body["requests"].as_array().map(|r| r.len()).unwrap_or(0);
                let embeddings: Vec<Value> =
                    (0..n).map(|_| json!({ "values": [1.0, 0.5, 0.25] })).collect();
                Json(json!({ "embeddings": embeddings }))
            }),
        )
        .route(
            "/v1beta/models/gemini-1.5-flash:generateContent",
            post(|| async {
                Json(json!({
                    "candidates": [{ "content": { "parts": [{ "text": "SFCは自由な学びの場です。" }] } }]
                }))
            }),
        );

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

fn write_corpus(tmp: &TempDir) -> PathBuf {
    let path = tmp.path().join("corpus.jsonl");
    fs::write(
        &path,
        concat!(
            r#"{"content": "SFCの研究会", "source_url": "https://syllabus.example/u1"}"#,
            "\n",
            r#"{"content": "SFCの授業", "source_url": "https://syllabus.example/u2"}"#,
            "\n",
            r#"{"content": "SFCの研究会", "source_url": "https://syllabus.example/u1"}"#,
            "\n",
            r#"{"content": "SFCのキャンパス", "source_url": "https://syllabus.example/u1"}"#,
            "\n",
        ),
    )
    .unwrap();
    path
}

#[test]
fn test_missing_config_fails() {
    let tmp = TempDir::new().unwrap();
    let (_, stderr, success) = run_advisor(&tmp.path().join("nope.toml"), &["index", "info"]);
    assert!(!success);
    assert!(stderr.contains("Failed to read config file"));
}

#[test]
fn test_ask_without_index_fails_before_answering() {
    let tmp = TempDir::new().unwrap();
    let config = write_config(&tmp, "http://127.0.0.1:9", true);

    let (stdout, stderr, success) = run_advisor(&config, &["ask", "慶應SFCの良さは何ですか？"]);
    assert!(!success);
    assert!(stdout.is_empty());
    assert!(stderr.contains("vector store unavailable"));
}

#[test]
fn test_index_info_without_index_fails() {
    let tmp = TempDir::new().unwrap();
    let config = write_config(&tmp, "http://127.0.0.1:9", true);

    let (_, stderr, success) = run_advisor(&config, &["index", "info"]);
    assert!(!success);
    assert!(stderr.contains("no index found"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_build_then_ask() {
    let tmp = TempDir::new().unwrap();
    let remote = spawn_gemini_mock().await;
    let config = write_config(&tmp, &remote, true);
    let corpus = write_corpus(&tmp);

    let (stdout, stderr, success) =
        run_advisor_async(&config, &["index", "build", "--input", corpus.to_str().unwrap()]).await;
    assert!(success, "index build failed: {}", stderr);
    assert!(stdout.contains("embedded: 3"));
    assert!(stdout.contains("duplicates skipped: 1"));

    let (stdout, _, success) = run_advisor_async(&config, &["index", "info"]).await;
    assert!(success);
    assert!(stdout.contains("Documents:   3"));
    assert!(stdout.contains("Sources:     2"));
    assert!(stdout.contains("models/text-embedding-004"));

    let (stdout, stderr, success) =
        run_advisor_async(&config, &["ask", "慶應SFCの良さは何ですか？"]).await;
    assert!(success, "ask failed: {}", stderr);
    assert_eq!(
        stdout,
        "SFCは自由な学びの場です。\n参考元：https://syllabus.example/u1\n参考元：https://syllabus.example/u2\n\n"
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn test_untrusted_index_is_refused() {
    let tmp = TempDir::new().unwrap();
    let remote = spawn_gemini_mock().await;
    let config = write_config(&tmp, &remote, false);
    let corpus = write_corpus(&tmp);

    let (_, _, success) =
        run_advisor_async(&config, &["index", "build", "--input", corpus.to_str().unwrap()]).await;
    assert!(success);

    let (_, stderr, success) = run_advisor_async(&config, &["ask", "質問"]).await;
    assert!(!success);
    assert!(stderr.contains("index.trusted"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_ask_reports_answer_service_failure() {
    let tmp = TempDir::new().unwrap();
    let remote = spawn_gemini_mock().await;
    let config = write_config(&tmp, &remote, true);
    let corpus = write_corpus(&tmp);
    run_advisor_async(&config, &["index", "build", "--input", corpus.to_str().unwrap()]).await;

    // Point the answer service at a closed port.
    let broken = fs::read_to_string(&config).unwrap().replacen(
        &format!("model = \"gemini-1.5-flash\"\nurl = \"{}\"", remote),
        "model = \"gemini-1.5-flash\"\nurl = \"http://127.0.0.1:9\"",
        1,
    );
    fs::write(&config, broken).unwrap();

    let (stdout, stderr, success) = run_advisor_async(&config, &["ask", "質問"]).await;
    assert!(!success);
    assert!(stdout.is_empty());
    assert!(stderr.contains("answer service error"));
}
