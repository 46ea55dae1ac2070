use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use assert_cmd::prelude::*;
use predicates::str::contains;
use tempfile::TempDir;

const HOST: &str = "mirror.example.com";

const SETTINGS_KEYS: &[&str] = &[
    "DESTINATION_REGISTRY_HOSTNAME",
    "CATALOG_DIR",
    "DATA_DIR",
    "STATE_DATABASE_PATH",
    "LOCK_FILE_PATH",
    "SYNC_INTERVAL",
    "SYNC_WORKERS",
    "DEBUG_LEVEL",
    "LOCAL_APPS_RUN_INSIDE_CONTAINER",
    "RUST_LOG",
];

struct Workspace {
    dir: TempDir,
}

impl Workspace {
    fn new() -> Self {
        let dir = TempDir::new().expect("workspace");
        fs::create_dir_all(dir.path().join("sync.d")).expect("catalog dir");
        Self { dir }
    }

    fn data_dir(&self) -> PathBuf {
        self.dir.path().join("data")
    }

    fn state_path(&self) -> PathBuf {
        self.data_dir().join("state").join("database.json")
    }

    fn lock_path(&self) -> PathBuf {
        self.data_dir().join("run").join("regmirror.lock")
    }

    fn write_catalog(&self, name: &str, yaml: &str) {
        fs::write(self.dir.path().join("sync.d").join(name), yaml).expect("write catalog");
    }

    fn write_state(&self, json: &str) {
        let path = self.state_path();
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, json).unwrap();
    }

    fn cmd(&self) -> Command {
        let mut cmd = bare_cmd(self.dir.path());
        cmd.env("DESTINATION_REGISTRY_HOSTNAME", HOST)
            .env("DATA_DIR", self.data_dir())
            .env("CATALOG_DIR", self.dir.path().join("sync.d"));
        cmd
    }
}

fn bare_cmd(cwd: &Path) -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_regmirror"));
    cmd.current_dir(cwd);
    for key in SETTINGS_KEYS {
        cmd.env_remove(key);
    }
    cmd
}

fn record(source: &str, status: &str, last_check: i64) -> String {
    format!(
        r#"{{"SourceFullArtifactReference":"{source}",
            "DestinationFullArtifactReference":"{HOST}/{source}",
            "SourceHash":"sha256:{a}","DestinationHash":"sha256:{a}",
            "Status":"{status}","LastCheck":{last_check},"LastUpdate":0}}"#,
        a = "a".repeat(64)
    )
}

#[test]
fn missing_destination_host_is_a_config_error() {
    let tmp = TempDir::new().unwrap();
    bare_cmd(tmp.path())
        .env("DATA_DIR", tmp.path())
        .arg("status")
        .assert()
        .code(78)
        .stderr(contains("DESTINATION_REGISTRY_HOSTNAME"));
}

#[test]
fn env_file_supplies_settings() {
    let ws = Workspace::new();
    let env_file = ws.dir.path().join("regmirror.env");
    fs::write(
        &env_file,
        format!(
            "DESTINATION_REGISTRY_HOSTNAME={HOST}\nDATA_DIR={}\n",
            ws.data_dir().display()
        ),
    )
    .unwrap();

    bare_cmd(ws.dir.path())
        .arg("--env-file")
        .arg(&env_file)
        .arg("status")
        .assert()
        .success()
        .stdout(contains(HOST));
}

#[test]
fn status_without_state_points_at_run() {
    let ws = Workspace::new();
    ws.cmd()
        .arg("status")
        .assert()
        .success()
        .stdout(contains("No state recorded yet"));
}

#[test]
fn status_json_reports_records_and_counts() {
    let ws = Workspace::new();
    ws.write_state(&format!(
        "[{},{}]",
        record("docker.io/library/nginx:1.27", "OK", 100),
        record("docker.io/library/redis:7", "SYNC_NEEDED", 100)
    ));

    let assert = ws.cmd().args(["status", "--json"]).assert().success();
    let value: serde_json::Value =
        serde_json::from_slice(&assert.get_output().stdout).expect("status json");
    assert_eq!(value["summary"]["artifacts"], 2);
    assert_eq!(value["summary"]["statuses"]["SYNC_NEEDED"], 1);
    assert_eq!(value["artifacts"][0]["source"], "docker.io/library/nginx:1.27");
    assert_eq!(value["artifacts"][1]["status"], "SYNC_NEEDED");
}

#[test]
fn status_failing_filters_ok_records() {
    let ws = Workspace::new();
    ws.write_state(&format!(
        "[{},{}]",
        record("docker.io/library/nginx:1.27", "OK", 100),
        record("docker.io/library/redis:7", "ERROR_RETRIEVING_MANIFEST_FROM_SOURCE", 100)
    ));

    let assert = ws
        .cmd()
        .args(["status", "--json", "--failing"])
        .assert()
        .success();
    let value: serde_json::Value = serde_json::from_slice(&assert.get_output().stdout).unwrap();
    let artifacts = value["artifacts"].as_array().unwrap();
    assert_eq!(artifacts.len(), 1);
    assert_eq!(artifacts[0]["source"], "docker.io/library/redis:7");
}

#[test]
fn corrupt_state_is_reported_as_empty() {
    let ws = Workspace::new();
    ws.write_state("not json at all");
    ws.cmd()
        .arg("status")
        .assert()
        .success()
        .stdout(contains("No state recorded yet"));
}

#[test]
fn catalog_lists_deduplicated_entries() {
    let ws = Workspace::new();
    ws.write_catalog(
        "a.yml",
        "docker.io:\n  images:\n    nginx: ['1.27', '1.27']\n    bitnami/redis: ['7.2']\n",
    );
    ws.write_catalog(
        "b.yaml",
        "quay.io/prometheus:\n  interval: 60\n  images:\n    node-exporter: ['v1.8.0']\n",
    );

    let assert = ws.cmd().args(["catalog", "--json"]).assert().success();
    let value: serde_json::Value = serde_json::from_slice(&assert.get_output().stdout).unwrap();
    let entries = value.as_array().unwrap();
    assert_eq!(entries.len(), 3);
    assert_eq!(entries[0]["source"], "docker.io/library/nginx:1.27");
    assert_eq!(
        entries[0]["destination"],
        "mirror.example.com/docker.io/library/nginx:1.27"
    );
    assert_eq!(entries[1]["namespace"], "bitnami");
    assert_eq!(entries[2]["namespace"], "prometheus");
    assert_eq!(entries[2]["interval"], 60);
    assert_eq!(entries[0]["interval"], 3600);
}

#[test]
fn catalog_table_mentions_duplicates() {
    let ws = Workspace::new();
    ws.write_catalog("a.yml", "docker.io:\n  images:\n    nginx: ['1.27', '1.27']\n");
    ws.cmd()
        .arg("catalog")
        .assert()
        .success()
        .stdout(contains("duplicate docker.io/library/nginx:1.27"));
}

#[test]
fn run_is_refused_while_lock_is_held() {
    let ws = Workspace::new();
    ws.write_catalog("a.yml", "docker.io:\n  images:\n    nginx: ['1.27']\n");
    let lock = ws.lock_path();
    fs::create_dir_all(lock.parent().unwrap()).unwrap();
    fs::write(&lock, "1700000000\n").unwrap();

    ws.cmd()
        .arg("run")
        .assert()
        .code(75)
        .stderr(contains("another run is in progress"));

    assert_eq!(fs::read_to_string(&lock).unwrap(), "1700000000\n");
    assert!(!ws.state_path().exists());
}

#[test]
fn run_with_missing_catalog_dir_fails_without_touching_state() {
    let ws = Workspace::new();
    ws.cmd()
        .env("CATALOG_DIR", ws.dir.path().join("nowhere"))
        .arg("run")
        .assert()
        .code(78);
    assert!(!ws.state_path().exists());
    assert!(!ws.lock_path().exists());
}

#[test]
fn unlock_removes_stale_lock() {
    let ws = Workspace::new();
    let lock = ws.lock_path();
    fs::create_dir_all(lock.parent().unwrap()).unwrap();
    fs::write(&lock, "1700000000\n").unwrap();

    ws.cmd()
        .arg("unlock")
        .assert()
        .success()
        .stdout(contains("removed lock"))
        .stdout(contains("2023-11-14"));
    assert!(!lock.exists());

    ws.cmd()
        .arg("unlock")
        .assert()
        .success()
        .stdout(contains("no lock"));
}
