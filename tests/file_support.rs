//! Integration tests for multi-format file support: Office documents are
//! extracted and searchable, broken files are recorded as failed documents,
//! and oversized files are skipped.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn sift_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop();
    path.pop();
    path.push("sift");
    path
}

fn zip_entries(entries: &[(&str, String)]) -> Vec<u8> {
    let mut buf = Vec::new();
    {
        let mut zip = zip::ZipWriter::new(std::io::Cursor::new(&mut buf));
        for (name, body) in entries {
            zip.start_file(*name, zip::write::SimpleFileOptions::default())
                .unwrap();
            zip.write_all(body.as_bytes()).unwrap();
        }
        zip.finish().unwrap();
    }
    buf
}

/// Minimal docx (ZIP) whose body holds one paragraph per entry of `paragraphs`.
fn minimal_docx(paragraphs: &[&str]) -> Vec<u8> {
    let body: String = paragraphs
        .iter()
        .map(|p| format!("<w:p><w:r><w:t>{}</w:t></w:r></w:p>", p))
        .collect();
    zip_entries(&[(
        "word/document.xml",
        format!(
            "<?xml version=\"1.0\"?><w:document xmlns:w=\"http://schemas.openxmlformats.org/wordprocessingml/2006/main\"><w:body>{}</w:body></w:document>",
            body
        ),
    )])
}

/// Minimal xlsx with a shared-string header row and one data row.
fn minimal_xlsx() -> Vec<u8> {
    zip_entries(&[
        (
            "xl/sharedStrings.xml",
            "<sst><si><t>区域</t></si><si><t>营业收入</t></si><si><t>华东</t></si></sst>".to_string(),
        ),
        (
            "xl/worksheets/sheet1.xml",
            "<worksheet><sheetData><row><c t=\"s\"><v>0</v></c><c t=\"s\"><v>1</v></c></row><row><c t=\"s\"><v>2</v></c><c><v>1250</v></c></row></sheetData></worksheet>".to_string(),
        ),
    ])
}

fn setup_file_support_env(max_file_bytes: u64) -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    fs::create_dir_all(root.join("config")).unwrap();
    let files_dir = root.join("files");
    fs::create_dir_all(&files_dir).unwrap();

    let config_content = format!(
        r#"[store]
snapshot_path = "{}/data/index.json"

[ingest]
max_file_bytes = {}
"#,
        root.display(),
        max_file_bytes
    );
    fs::write(root.join("config").join("sift.toml"), config_content).unwrap();

    fs::write(
        files_dir.join("readme.md"),
        "# Readme\n\nPlain text file for tests.\n",
    )
    .unwrap();
    fs::write(files_dir.join("holidays.md"), "Holiday schedule is posted online.").unwrap();
    fs::write(files_dir.join("parking.txt"), "Parking passes are issued yearly.").unwrap();

    (tmp, root.join("config").join("sift.toml"))
}

fn run_sift(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let output = Command::new(sift_binary())
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .output()
        .unwrap_or_else(|e| panic!("Failed to run sift: {}", e));
    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    (stdout, stderr, output.status.success())
}

fn ingest(tmp: &TempDir, config_path: &Path) -> String {
    let files = tmp.path().join("files");
    let (stdout, stderr, success) = run_sift(
        config_path,
        &["ingest", files.to_str().unwrap(), "--progress", "off"],
    );
    assert!(success, "ingest failed: stdout={}, stderr={}", stdout, stderr);
    stdout
}

fn documents(config_path: &Path) -> Vec<serde_json::Value> {
    let (stdout, _, success) = run_sift(config_path, &["list", "--json"]);
    assert!(success);
    serde_json::from_str(&stdout).unwrap()
}

#[test]
fn file_support_docx_ingest_and_search() {
    let (tmp, config_path) = setup_file_support_env(20 * 1024 * 1024);
    fs::write(
        tmp.path().join("files/policy.docx"),
        minimal_docx(&["Procurement Policy", "Purchases above the threshold need three quotes."]),
    )
    .unwrap();

    let stdout = ingest(&tmp, &config_path);
    assert!(stdout.contains("4 indexed"), "got: {}", stdout);

    let (search_out, _, success) = run_sift(&config_path, &["search", "procurement quotes"]);
    assert!(success);
    assert!(search_out.contains("policy.docx"), "got: {}", search_out);
    assert!(search_out.contains("three quotes"));

    let doc = documents(&config_path)
        .into_iter()
        .find(|d| d["name"] == "policy.docx")
        .unwrap();
    assert_eq!(
        doc["media_type"],
        "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
    );
    assert_eq!(doc["title"], "Procurement Policy");
}

#[test]
fn file_support_xlsx_rows_searchable() {
    let (tmp, config_path) = setup_file_support_env(20 * 1024 * 1024);
    fs::write(tmp.path().join("files/revenue.xlsx"), minimal_xlsx()).unwrap();
    ingest(&tmp, &config_path);

    let (stdout, _, success) = run_sift(&config_path, &["search", "华东营业收入", "--json"]);
    assert!(success);
    let hits: Vec<serde_json::Value> = serde_json::from_str(&stdout).unwrap();
    assert!(!hits.is_empty());
    assert_eq!(hits[0]["document"]["name"], "revenue.xlsx");
    assert!(hits[0]["chunk"]["text"]
        .as_str()
        .unwrap()
        .contains("区域 | 营业收入"));
}

#[test]
fn file_support_broken_files_recorded_as_failed() {
    let (tmp, config_path) = setup_file_support_env(20 * 1024 * 1024);
    fs::write(tmp.path().join("files/broken.pdf"), b"%PDF-1.4 truncated").unwrap();
    fs::write(tmp.path().join("files/broken.docx"), b"not a zip archive").unwrap();

    let stdout = ingest(&tmp, &config_path);
    assert!(stdout.contains("3 indexed"), "got: {}", stdout);
    assert!(stdout.contains("2 failed"), "got: {}", stdout);

    let failed: Vec<_> = documents(&config_path)
        .into_iter()
        .filter(|d| d["status"] == "error")
        .collect();
    assert_eq!(failed.len(), 2);
    assert!(failed.iter().all(|d| d["error"].as_str().unwrap().contains("unsupported input")));

    let (stats, _, _) = run_sift(&config_path, &["stats", "--json"]);
    let stats: serde_json::Value = serde_json::from_str(&stats).unwrap();
    assert_eq!(stats["total_documents"], 3);
    assert_eq!(stats["failed_documents"], 2);
}

#[test]
fn file_support_max_file_bytes_skips() {
    let (tmp, config_path) = setup_file_support_env(100);
    fs::write(tmp.path().join("files/large.txt"), "word ".repeat(100)).unwrap();

    let stdout = ingest(&tmp, &config_path);
    assert!(stdout.contains("3 indexed"), "got: {}", stdout);
    assert!(stdout.contains("1 skipped"), "got: {}", stdout);
    let names: Vec<_> = documents(&config_path)
        .iter()
        .map(|d| d["name"].as_str().unwrap().to_string())
        .collect();
    assert!(!names.contains(&"large.txt".to_string()));
    assert_eq!(names.len(), 3);
}

#[test]
fn file_support_json_file() {
    let (tmp, config_path) = setup_file_support_env(20 * 1024 * 1024);
    fs::write(
        tmp.path().join("files/vendors.json"),
        r#"{"vendors":[{"name":"Acme Logistics","terms":"net 45"}]}"#,
    )
    .unwrap();
    ingest(&tmp, &config_path);

    let (stdout, _, success) = run_sift(&config_path, &["search", "acme logistics"]);
    assert!(success);
    assert!(stdout.contains("vendors.json"), "got: {}", stdout);
}
