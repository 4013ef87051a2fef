use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn medrag_binary() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_medrag"))
}

fn setup_test_env(with_precautions: bool) -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();

    let csv_dir = root.join("csv");
    fs::create_dir_all(&csv_dir).unwrap();
    fs::write(
        csv_dir.join("dataset.csv"),
        "Disease,Symptom_1,Symptom_2,Symptom_3\n\
         Fungal infection,itching,skin_rash,nodal_skin_eruptions\n\
         Heart attack,vomiting,breathlessness,chest_pain\n\
         Common Cold,continuous_sneezing,chills,cough\n",
    )
    .unwrap();
    if with_precautions {
        fs::write(
            csv_dir.join("symptom_precaution.csv"),
            "Disease,Precaution_1,Precaution_2\n\
             Fungal infection,bath twice,keep infected area dry\n\
             Heart attack,call ambulance,keep calm\n",
        )
        .unwrap();
    }

    let config_content = format!(
        r#"[data]
dir = "{root}/csv"
documents = "{root}/data/documents.jsonl"

[embedding]
provider = "hash"
dims = 256

[index]
backend = "sqlite"
collection = "medical_diseases"
path = "{root}/data/medrag.sqlite"
batch_size = 2

[retrieval]
default_max_results = 2

[server]
bind = "127.0.0.1:7431"
"#,
        root = root.display()
    );

    let config_path = config_dir.join("medrag.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_medrag(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = medrag_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .env_remove("RUST_LOG")
        .output()
        .unwrap_or_else(|e| panic!("Failed to run medrag binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let success = output.status.success();
    (stdout, stderr, success)
}

fn ingest_all(config_path: &Path) {
    let (stdout, stderr, success) = run_medrag(config_path, &["documents"]);
    assert!(success, "documents failed: stdout={}, stderr={}", stdout, stderr);
    let (stdout, stderr, success) = run_medrag(config_path, &["ingest"]);
    assert!(success, "ingest failed: stdout={}, stderr={}", stdout, stderr);
}

#[test]
fn test_documents_writes_jsonl() {
    let (tmp, config_path) = setup_test_env(true);

    let (stdout, stderr, success) = run_medrag(&config_path, &["documents"]);
    assert!(success, "documents failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("documents written: 3"));
    assert!(stdout.contains("# Disease: Fungal infection"));

    let jsonl = fs::read_to_string(tmp.path().join("data/documents.jsonl")).unwrap();
    assert_eq!(jsonl.lines().count(), 3);
    let first: serde_json::Value = serde_json::from_str(jsonl.lines().next().unwrap()).unwrap();
    assert_eq!(first["metadata"]["disease"], "Fungal infection");
    assert_eq!(first["metadata"]["precaution_count"], 2);
    assert_eq!(first["metadata"]["row_id"], 0);
}

#[test]
fn test_documents_without_precaution_file() {
    let (tmp, config_path) = setup_test_env(false);

    let (stdout, stderr, success) = run_medrag(&config_path, &["documents"]);
    assert!(success, "documents failed: stdout={}, stderr={}", stdout, stderr);
    let jsonl = fs::read_to_string(tmp.path().join("data/documents.jsonl")).unwrap();
    assert!(jsonl.contains("No precautions listed"));
}

#[test]
fn test_init_idempotent() {
    let (_tmp, config_path) = setup_test_env(true);

    let (stdout, _, success1) = run_medrag(&config_path, &["init"]);
    assert!(success1, "First init failed");
    assert!(stdout.contains("dims: 256"));

    let (_, _, success2) = run_medrag(&config_path, &["init"]);
    assert!(success2, "Second init failed (not idempotent)");
}

#[test]
fn test_ingest_reports_batches() {
    let (_tmp, config_path) = setup_test_env(true);

    run_medrag(&config_path, &["documents"]);
    let (stdout, stderr, success) = run_medrag(&config_path, &["ingest"]);
    assert!(success, "ingest failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("points upserted: 3"));
    assert!(stdout.contains("batches: 2"));
    assert!(stdout.contains("ok"));
}

#[test]
fn test_query_after_ingest() {
    let (_tmp, config_path) = setup_test_env(true);
    ingest_all(&config_path);

    let (stdout, stderr, success) =
        run_medrag(&config_path, &["query", "itching skin rash", "--limit", "1"]);
    assert!(success, "query failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.starts_with("1. ["));
    assert!(stdout.contains("Fungal infection"));
    assert!(!stdout.contains("2. ["));
}

#[test]
fn test_query_zero_limit_uses_default() {
    let (_tmp, config_path) = setup_test_env(true);
    ingest_all(&config_path);

    let (stdout, _, success) = run_medrag(&config_path, &["query", "fever", "--limit", "0"]);
    assert!(success);
    assert!(stdout.contains("2. ["));
    assert!(!stdout.contains("3. ["));
}

#[test]
fn test_ingest_without_documents_fails() {
    let (_tmp, config_path) = setup_test_env(true);

    let (_, stderr, success) = run_medrag(&config_path, &["ingest"]);
    assert!(!success, "ingest should fail without a documents file");
    assert!(stderr.contains("missing source"));
}

#[test]
fn test_ask_requires_answer_provider() {
    let (_tmp, config_path) = setup_test_env(true);
    ingest_all(&config_path);

    let (_, stderr, success) = run_medrag(&config_path, &["ask", "what helps a rash?"]);
    assert!(!success);
    assert!(stderr.contains("answer provider is disabled"));
}

#[test]
fn test_ingest_and_query_without_precaution_file() {
    let (_tmp, config_path) = setup_test_env(false);
    ingest_all(&config_path);

    let (stdout, stderr, success) =
        run_medrag(&config_path, &["query", "chest pain breathlessness", "--limit", "1"]);
    assert!(success, "query failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("Heart attack"));
    assert!(stdout.contains("No precautions listed"));
}

#[test]
fn test_memory_backend_rejected() {
    let (_tmp, config_path) = setup_test_env(true);
    let config = fs::read_to_string(&config_path).unwrap();
    fs::write(
        &config_path,
        config.replace(r#"backend = "sqlite""#, r#"backend = "memory""#),
    )
    .unwrap();

    let commands: [&[&str]; 4] = [&["init"], &["ingest"], &["query", "itching"], &["serve"]];
    for args in commands {
        let (_, stderr, success) = run_medrag(&config_path, args);
        assert!(!success, "{:?} should reject the memory backend", args);
        assert!(stderr.contains("library/test-only"), "stderr={}", stderr);
    }
}

#[test]
fn test_missing_config_fails() {
    let tmp = TempDir::new().unwrap();
    let (_, stderr, success) = run_medrag(&tmp.path().join("nope.toml"), &["init"]);
    assert!(!success);
    assert!(stderr.contains("loading config"));
}
