use std::{
    path::{Path, PathBuf},
    process::{Command, Output},
};

use serde_json::Value;

fn medrag(data_dir: &Path, args: &[&str]) -> Output {
    Command::new(medrag_bin())
        .args(args)
        .env("MEDRAG_DATA_DIR", data_dir)
        .env("MEDRAG_EMBEDDER", "hashing")
        .env("MEDRAG_LOG", "warn")
        .env_remove("MEDRAG_QDRANT_URL")
        .env_remove("MEDRAG_MODEL")
        .env_remove("MEDRAG_LLM_MODEL")
        .env_remove("OPENAI_API_KEY")
        .output()
        .expect("failed to run medrag")
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).to_string()
}

fn status_json(data_dir: &Path) -> Value {
    let output = medrag(data_dir, &["status", "--json"]);
    assert!(output.status.success());
    serde_json::from_str(stdout(&output).trim()).unwrap()
}

#[test]
fn ingest_status_ask_reset() {
    let tmp = tempfile::tempdir().unwrap();
    let data_dir = tmp.path().join("data");
    let docs = tmp.path().join("docs");
    std::fs::create_dir_all(docs.join("cardiology")).unwrap();
    std::fs::write(
        docs.join("cardiology/hypertension.md"),
        "Hypertension is persistently elevated arterial blood pressure.",
    )
    .unwrap();
    std::fs::write(docs.join("lipids.txt"), "Statins lower LDL cholesterol.")
        .unwrap();
    std::fs::write(docs.join("scan.png"), "not a document").unwrap();

    let empty = medrag(&data_dir, &["ask", "What is hypertension?", "--json"]);
    assert!(empty.status.success());
    let answer: Value = serde_json::from_str(stdout(&empty).trim()).unwrap();
    assert_eq!(
        answer["answer"],
        "I don't have enough information. Please upload relevant documents first."
    );
    assert_eq!(answer["doc"], "");

    let ingest = medrag(&data_dir, &["ingest", docs.to_str().unwrap()]);
    assert!(ingest.status.success());
    let out = stdout(&ingest);
    assert!(out.contains("Processed .md file successfully"));
    assert!(out.contains("Processed .txt file successfully"));
    assert!(!out.contains("scan.png"));

    let status = status_json(&data_dir);
    assert_eq!(status["store"], "local");
    assert_eq!(status["segments"], 2);
    assert_eq!(status["lexical_segments"], 2);
    assert_eq!(status["embedder"], "hashing");

    // Segments are found, but no API key is configured.
    let no_key = medrag(&data_dir, &["ask", "arterial blood pressure", "--json"]);
    assert!(!no_key.status.success());
    let failed: Value = serde_json::from_str(stdout(&no_key).trim()).unwrap();
    assert!(
        failed["error"]
            .as_str()
            .unwrap()
            .starts_with("System error: ")
    );

    let reset = medrag(&data_dir, &["reset"]);
    assert!(reset.status.success());
    assert_eq!(status_json(&data_dir)["segments"], 0);
}

#[test]
fn unsupported_file_fails() {
    let tmp = tempfile::tempdir().unwrap();
    let file = tmp.path().join("report.docx");
    std::fs::write(&file, "binary").unwrap();

    let output = medrag(tmp.path(), &["ingest", file.to_str().unwrap()]);
    assert!(!output.status.success());
    assert!(stdout(&output).contains("Unsupported file type: .docx"));
}

#[test]
fn config_set_show_clear() {
    let tmp = tempfile::tempdir().unwrap();

    let bad = medrag(tmp.path(), &["config", "set", "embedder", "word2vec"]);
    assert!(!bad.status.success());

    let set = medrag(tmp.path(), &["config", "set", "llm_model", "gpt-4"]);
    assert!(set.status.success());

    let show = medrag(tmp.path(), &["config", "show", "--json"]);
    assert!(show.status.success());
    let config: Value = serde_json::from_str(stdout(&show).trim()).unwrap();
    assert_eq!(config["stored"]["llm_model"], "gpt-4");
    assert_eq!(config["resolved"]["llm_model"], "gpt-4");
    // Set through MEDRAG_EMBEDDER.
    assert_eq!(config["resolved"]["embedder"], "hashing");

    let clear = medrag(tmp.path(), &["config", "clear", "llm_model"]);
    assert!(clear.status.success());
    let again = medrag(tmp.path(), &["config", "clear", "llm_model"]);
    assert!(!again.status.success());
}

fn medrag_bin() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_medrag"))
}
