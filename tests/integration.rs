use qa_context::corpus_file::load_corpus;
use qa_context::index_file::write_safetensors;
use qa_context_core::embedding::vec_to_blob;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn qactx_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("qactx");
    path
}

const CORPUS: &str = "question,answer,URL\n\
What breaks the fast?,Eating or drinking deliberately.,u1\n\
How many daily prayers?,Five.,u2\n\
\"What is zakat, briefly?\",\"Obligatory alms,\npaid yearly.\",u3\n";

fn setup_test_env(embedding: &str) -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    let data_dir = root.join("data");
    fs::create_dir_all(&config_dir).unwrap();
    fs::create_dir_all(&data_dir).unwrap();
    fs::write(data_dir.join("collected.csv"), CORPUS).unwrap();

    let config_content = format!(
        r#"[corpus]
path = "../data/collected.csv"

[index]
path = "../models/embeddings.safetensors"

[embedding]
{}

[generation]
provider = "disabled"

[context]
question_label = "السؤال"
answer_label = "الإجابة"
"#,
        embedding
    );
    let config_path = config_dir.join("qactx.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn write_aligned_index(root: &Path) {
    let corpus = load_corpus(&root.join("data/collected.csv")).unwrap();
    let rows = vec![
        vec![1.0, 0.0, 0.0],
        vec![0.0, 1.0, 0.0],
        vec![0.0, 0.0, 1.0],
    ];
    write_safetensors(
        &root.join("models/embeddings.safetensors"),
        &rows,
        "embeddings",
        "fixture",
        &corpus,
    )
    .unwrap();
}

fn run_qactx(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = qactx_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .env("RUST_LOG", "warn")
        .output()
        .unwrap_or_else(|e| panic!("Failed to run qactx binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let success = output.status.success();
    (stdout, stderr, success)
}

#[test]
fn test_check_aligned() {
    let (tmp, config_path) = setup_test_env("provider = \"disabled\"");
    write_aligned_index(tmp.path());

    let (stdout, stderr, success) = run_qactx(&config_path, &["check"]);
    assert!(success, "check failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("rows:        3"));
    assert!(stdout.contains("dims:        3"));
    assert!(stdout.contains("state:       ready"));
}

#[test]
fn test_check_row_count_mismatch_fails() {
    let (tmp, config_path) = setup_test_env("provider = \"disabled\"\ndims = 2");
    fs::write(
        &config_path,
        fs::read_to_string(&config_path)
            .unwrap()
            .replace("embeddings.safetensors", "embeddings.f32"),
    )
    .unwrap();
    fs::create_dir_all(tmp.path().join("models")).unwrap();
    fs::write(
        tmp.path().join("models/embeddings.f32"),
        vec_to_blob(&[1.0, 0.0, 0.0, 1.0]),
    )
    .unwrap();

    let (_, stderr, success) = run_qactx(&config_path, &["check"]);
    assert!(!success, "check should fail on a 2-row index for a 3-row corpus");
    assert!(stderr.contains("3 records"), "stderr={}", stderr);
}

#[test]
fn test_check_stale_index_fails() {
    let (tmp, config_path) = setup_test_env("provider = \"disabled\"");
    write_aligned_index(tmp.path());
    fs::write(
        tmp.path().join("data/collected.csv"),
        CORPUS.replace("Five.", "Five at set times."),
    )
    .unwrap();

    let (_, stderr, success) = run_qactx(&config_path, &["check"]);
    assert!(!success);
    assert!(stderr.contains("different corpus"), "stderr={}", stderr);
}

#[test]
fn test_check_missing_index_fails() {
    let (_tmp, config_path) = setup_test_env("provider = \"disabled\"");

    let (_, stderr, success) = run_qactx(&config_path, &["check"]);
    assert!(!success);
    assert!(stderr.contains("not found"), "stderr={}", stderr);
}

#[test]
fn test_missing_config_fails() {
    let tmp = TempDir::new().unwrap();
    let (_, stderr, success) = run_qactx(&tmp.path().join("nope.toml"), &["check"]);
    assert!(!success);
    assert!(stderr.contains("config"));
}

#[test]
fn test_search_with_disabled_encoder_fails() {
    let (tmp, config_path) = setup_test_env("provider = \"disabled\"");
    write_aligned_index(tmp.path());

    let (_, stderr, success) = run_qactx(&config_path, &["search", "How many prayers?"]);
    assert!(!success);
    assert!(stderr.contains("disabled"), "stderr={}", stderr);
}

#[test]
fn test_search_empty_query_is_encoding_failure() {
    let (tmp, config_path) = setup_test_env("provider = \"disabled\"");
    write_aligned_index(tmp.path());

    let (stdout, stderr, success) = run_qactx(&config_path, &["search", "  "]);
    assert!(!success, "stdout={}", stdout);
    assert!(stderr.contains("encoding failed"), "stderr={}", stderr);
    assert!(stderr.contains("empty"), "stderr={}", stderr);
}

#[test]
fn test_index_build_requires_provider() {
    let (_tmp, config_path) = setup_test_env("provider = \"disabled\"");

    let (_, stderr, success) = run_qactx(&config_path, &["index", "build"]);
    assert!(!success);
    assert!(stderr.contains("disabled"), "stderr={}", stderr);
}
