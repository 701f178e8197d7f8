use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn txt2kb_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("txt2kb");
    path
}

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();

    let raw_dir = root.join("raw");
    fs::create_dir_all(raw_dir.join("network")).unwrap();
    fs::write(
        raw_dir.join("network/lease-storm.txt"),
        "Lease storm at HQ\n\n\
The DHCP server at 10.20.30.40 stopped handing out leases to 00:1A:2B:3C:4D:5E.\n\n\
Root cause analysis: the lease time was set to 7 days, because ACME Corp sized the pool.\n\n\
$ sudo systemctl restart dhcpd\nRestarted dhcpd and applied the shorter lease setting.",
    )
    .unwrap();
    fs::write(
        raw_dir.join("chat.txt"),
        "Talk with infra-team\n\
[kim] [10:01] the sensor keeps dropping clients since this morning\n\
[lee] [10:03] which site?\n\
[kim] [10:04] HQ, the firewall session table looks full\n\
[lee] [10:20] $ sudo systemctl restart sensor fixed it",
    )
    .unwrap();
    fs::write(raw_dir.join("empty.txt"), "\n\n").unwrap();
    fs::write(raw_dir.join("readme.md"), "not a log").unwrap();

    fs::write(
        config_dir.join("masking_rules.toml"),
        r#"
[[rules]]
kind = "customer"
pattern = "ACME ?Corp"
"#,
    )
    .unwrap();
    fs::write(
        config_dir.join("tagging_rules.toml"),
        r#"
[[rules]]
id = "dhcp"
keywords = ["DHCP", "lease"]
tag = "DHCP"
category = "Network"
priority = 10

[[rules]]
id = "chat"
heuristic = "chat-transcript"
tag = "chat"
"#,
    )
    .unwrap();

    let config_content = format!(
        r#"[run]
concurrency = 2

[masking]
enabled = true
rules = "{root}/config/masking_rules.toml"

[tagging]
rules = "{root}/config/tagging_rules.toml"
max_tags = 5

[extraction]
strategy = "rule-based"
"#,
        root = root.display()
    );

    let config_path = config_dir.join("txt2kb.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_txt2kb(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = txt2kb_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .env_remove("RUST_LOG")
        .output()
        .unwrap_or_else(|e| panic!("Failed to run txt2kb binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let success = output.status.success();
    (stdout, stderr, success)
}

fn path_arg(path: &Path) -> String {
    path.to_str().unwrap().to_string()
}

#[test]
fn test_convert_directory() {
    let (tmp, config_path) = setup_test_env();
    let raw = path_arg(&tmp.path().join("raw"));
    let out = path_arg(&tmp.path().join("kb"));

    let (stdout, stderr, success) = run_txt2kb(&config_path, &["convert", &raw, &out]);
    assert!(success, "convert failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("found: 3"));
    assert!(stdout.contains("converted: 2"));
    assert!(stdout.contains("skipped: 1"));
    assert!(stdout.contains("failed: 0"));
    assert!(stdout.contains("ok"));

    let md = fs::read_to_string(tmp.path().join("kb/network/lease-storm.md")).unwrap();
    assert!(md.contains("title: \"Lease storm at HQ\""));
    assert!(md.contains("tags: [\"DHCP\"]"));
    assert!(md.contains("category: [\"Network\"]"));
    assert!(md.contains("storage_category: \"network\""));
    assert!(md.contains("extraction: rule-based"));
    assert!(md.contains("## Actions"));
    assert!(md.contains("[IP_REDACTED]"));
    assert!(md.contains("[MAC_REDACTED]"));
    assert!(md.contains("[CUSTOMER_REDACTED]"));
    assert!(!md.contains("10.20.30.40"));
    assert!(!md.contains("ACME"));

    assert!(tmp.path().join("kb/chat.md").exists());
    assert!(!tmp.path().join("kb/empty.md").exists());
    assert!(!tmp.path().join("kb/readme.md").exists());
}

#[test]
fn test_convert_dry_run() {
    let (tmp, config_path) = setup_test_env();
    let raw = path_arg(&tmp.path().join("raw"));
    let out = path_arg(&tmp.path().join("kb"));

    let (stdout, stderr, success) =
        run_txt2kb(&config_path, &["convert", &raw, &out, "--dry-run"]);
    assert!(success, "dry run failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("(dry-run)"));
    assert!(stdout.contains("[DRY]"));
    assert!(!tmp.path().join("kb").exists());
}

#[test]
fn test_convert_json_format() {
    let (tmp, config_path) = setup_test_env();
    let raw = path_arg(&tmp.path().join("raw"));
    let out = path_arg(&tmp.path().join("kb"));

    let (_, stderr, success) =
        run_txt2kb(&config_path, &["convert", &raw, &out, "--format", "json"]);
    assert!(success, "convert failed: {}", stderr);

    let json = fs::read_to_string(tmp.path().join("kb/chat.json")).unwrap();
    let value: serde_json::Value = serde_json::from_str(&json).unwrap();
    assert_eq!(value["provenance"]["extraction"], "rule-based");
    assert_eq!(value["record"]["tags"][0], "chat");
}

#[test]
fn test_mask_command() {
    let (tmp, config_path) = setup_test_env();
    let file = path_arg(&tmp.path().join("raw/network/lease-storm.txt"));

    let (stdout, stderr, success) = run_txt2kb(&config_path, &["mask", &file]);
    assert!(success, "mask failed: {}", stderr);
    assert!(stdout.contains("[IP_REDACTED]"));
    assert!(stdout.contains("[MAC_REDACTED]"));
    assert!(stdout.contains("[CUSTOMER_REDACTED]"));
    assert!(stderr.contains("replacements: 3"));
}

#[test]
fn test_no_mask_flag() {
    let (tmp, config_path) = setup_test_env();
    let file = path_arg(&tmp.path().join("raw/network/lease-storm.txt"));

    let (stdout, _, success) = run_txt2kb(&config_path, &["--no-mask", "mask", &file]);
    assert!(success);
    assert!(stdout.contains("10.20.30.40"));
}

#[test]
fn test_classify_command() {
    let (tmp, config_path) = setup_test_env();
    let file = path_arg(&tmp.path().join("raw/network/lease-storm.txt"));

    let (stdout, stderr, success) = run_txt2kb(&config_path, &["classify", &file]);
    assert!(success, "classify failed: {}", stderr);
    assert!(stdout.contains("tags: DHCP"));
    assert!(stdout.contains("category: Network"));
}

#[test]
fn test_classify_no_match_is_not_an_error() {
    let (tmp, config_path) = setup_test_env();
    let file = tmp.path().join("plain.txt");
    fs::write(&file, "nothing interesting in here at all").unwrap();

    let (stdout, stderr, success) = run_txt2kb(&config_path, &["classify", &path_arg(&file)]);
    assert!(success);
    assert!(stdout.contains("tags: \n"));
    assert!(stderr.contains("no tagging rule matched"));
}

#[test]
fn test_extract_command() {
    let (tmp, config_path) = setup_test_env();
    let file = path_arg(&tmp.path().join("raw/network/lease-storm.txt"));

    let (stdout, stderr, success) = run_txt2kb(&config_path, &["extract", &file]);
    assert!(success, "extract failed: {}", stderr);
    let value: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(value["record"]["title"], "Lease storm at HQ");
    assert_eq!(value["provenance"]["extraction"], "rule-based");
    assert_eq!(value["provenance"]["masking_replacements"], 3);
}

#[test]
fn test_llm_without_provider_falls_back_to_rules() {
    let (tmp, config_path) = setup_test_env();
    let file = path_arg(&tmp.path().join("raw/network/lease-storm.txt"));

    let (stdout, stderr, success) = run_txt2kb(&config_path, &["--llm", "extract", &file]);
    assert!(success, "extract failed: {}", stderr);
    let value: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(value["provenance"]["extraction"], "rule-based");
}

#[test]
fn test_rules_command() {
    let (_tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_txt2kb(&config_path, &["rules"]);
    assert!(success, "rules failed: {}", stderr);
    assert!(stdout.contains("masking rules: 3"));
    assert!(stdout.contains("builtin:ipv4"));
    assert!(stdout.contains("tagging rules: 2"));
    assert!(stdout.contains("dhcp"));
}

#[test]
fn test_invalid_config_is_rejected() {
    let (tmp, _) = setup_test_env();
    let bad = tmp.path().join("bad.toml");
    fs::write(&bad, "[run]\nconcurrency = 0\n").unwrap();

    let (_, stderr, success) = run_txt2kb(&bad, &["rules"]);
    assert!(!success);
    assert!(stderr.contains("concurrency"));
}

#[test]
fn test_missing_source_directory() {
    let (tmp, config_path) = setup_test_env();
    let missing = path_arg(&tmp.path().join("nope"));
    let out = path_arg(&tmp.path().join("kb"));

    let (_, stderr, success) = run_txt2kb(&config_path, &["convert", &missing, &out]);
    assert!(!success);
    assert!(stderr.contains("does not exist"));
}

#[test]
fn test_max_categories_flag_is_validated() {
    let (_tmp, config_path) = setup_test_env();

    let (_, stderr, success) = run_txt2kb(&config_path, &["--max-categories", "0", "rules"]);
    assert!(!success);
    assert!(stderr.contains("max_categories"));

    let (_, stderr, success) = run_txt2kb(&config_path, &["--max-categories", "1", "rules"]);
    assert!(success, "rules failed: {}", stderr);
}
