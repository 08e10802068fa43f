use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn rollcall(home: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("rollcall").unwrap();
    cmd.env("ROLLCALL_HOME", home.path()).env_remove("RUST_LOG");
    cmd
}

#[test]
fn test_status_of_empty_queue() {
    let home = TempDir::new().unwrap();

    rollcall(&home)
        .args(["queue", "status", "--output", "json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"total\": 0"))
        .stdout(predicate::str::contains("\"processing\": false"));
}

#[test]
fn test_record_then_list() {
    let home = TempDir::new().unwrap();
    let file = home.path().join("checkins.json");
    std::fs::write(&file, r#"[{"id": "a1"}, {"id": "a2"}]"#).unwrap();

    rollcall(&home)
        .args(["record", "attendance"])
        .arg(&file)
        .assert()
        .success()
        .stdout(predicate::str::contains("Recorded 2 attendance record(s)"));

    rollcall(&home)
        .args(["-o", "json", "queue", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"count\": 1"))
        .stdout(predicate::str::contains("\"dataType\": \"attendance\""));
}

#[test]
fn test_add_merges_duplicate_download() {
    let home = TempDir::new().unwrap();

    for expected in ["\"merged\": false", "\"merged\": true"] {
        rollcall(&home)
            .args(["-o", "json", "queue", "add", "--type", "download", "--data-type", "events"])
            .assert()
            .success()
            .stdout(predicate::str::contains(expected));
    }
}

#[test]
fn test_invalid_add_fails() {
    let home = TempDir::new().unwrap();

    rollcall(&home)
        .args(["queue", "add", "--type", "upload", "--data-type", "events"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("error"))
        .stderr(predicate::str::contains("Invalid operation"));

    rollcall(&home)
        .args(["queue", "add", "--type", "sync", "--data-type", "events"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown operation type"));
}

#[test]
fn test_run_without_endpoint_fails() {
    let home = TempDir::new().unwrap();

    rollcall(&home)
        .args(["queue", "run"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("remote.endpoint is not set"));
}

#[test]
fn test_config_init_and_path() {
    let home = TempDir::new().unwrap();

    rollcall(&home)
        .args(["config", "init"])
        .assert()
        .success();
    assert!(home.path().join("config.yaml").exists());

    rollcall(&home)
        .args(["config", "path"])
        .assert()
        .success()
        .stdout(predicate::str::contains("config.yaml"));

    rollcall(&home)
        .args(["config", "init"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("already exists"));
}

#[test]
fn test_default_output_from_config() {
    let home = TempDir::new().unwrap();
    std::fs::write(
        home.path().join("config.yaml"),
        "general:\n  default_output: json\n",
    )
    .unwrap();

    rollcall(&home)
        .args(["queue", "stats"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"byStatus\""));
}
