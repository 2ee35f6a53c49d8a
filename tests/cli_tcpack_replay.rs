use serde_json::Value;
use std::fs;
use std::path::PathBuf;
use std::process::Command;
use std::time::{SystemTime, UNIX_EPOCH};

fn unique_temp_dir(prefix: &str) -> PathBuf {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("time went backwards")
        .as_nanos();
    let dir = std::env::temp_dir().join(format!(
        "tcpack-sup-{prefix}-{}-{nanos}",
        std::process::id()
    ));
    fs::create_dir_all(&dir).expect("create temp dir");
    dir
}

fn write_file(dir: &PathBuf, name: &str, contents: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, contents).expect("write temp file");
    path
}

const HOLD_TRACE: &str = r#"
{
    "config": { "mode": "hold" },
    "events": [
        { "at_ms": 0, "kind": "tx", "frame": { "src": "10.0.0.1", "dst": "10.0.0.2", "sport": 5000, "dport": 80, "ack": 100 } },
        { "at_ms": 1, "kind": "tx", "frame": { "src": "10.0.0.1", "dst": "10.0.0.2", "sport": 5000, "dport": 80, "ack": 200 } },
        { "at_ms": 2, "kind": "tx", "frame": { "src": "10.0.0.1", "dst": "10.0.0.2", "sport": 5000, "dport": 80, "ack": 300 } }
    ]
}
"#;

#[test]
fn tcpack_replay_writes_json_report() {
    let dir = unique_temp_dir("replay-json");
    let trace = write_file(&dir, "trace.json", HOLD_TRACE);
    let out_json = dir.join("report.json");

    let output = Command::new(env!("CARGO_BIN_EXE_tcpack_replay"))
        .args([
            "--trace",
            trace.to_str().unwrap(),
            "--json-out",
            out_json.to_str().unwrap(),
            "--quiet",
        ])
        .output()
        .expect("run tcpack_replay");
    assert!(
        output.status.success(),
        "tcpack_replay failed: stderr={}",
        String::from_utf8_lossy(&output.stderr)
    );

    let raw = fs::read_to_string(&out_json).expect("read report.json");
    let v: Value = serde_json::from_str(&raw).expect("parse report.json");
    assert_eq!(v.get("final_mode").and_then(|m| m.as_str()), Some("hold"));
    let sent: Vec<u64> = v["sent"]
        .as_array()
        .expect("sent must be an array")
        .iter()
        .filter_map(Value::as_u64)
        .collect();
    assert_eq!(sent, vec![2, 3]);
    assert_eq!(v["stats"]["hold_flushes"].as_u64(), Some(1));
    assert_eq!(
        v["bus_log"][0].get("kind").and_then(|k| k.as_str()),
        Some("free")
    );

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(
        stdout.lines().any(|l| l.starts_with("done @ 12ms, mode=hold")),
        "unexpected stdout: {stdout}"
    );

    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn tcpack_replay_mode_override_switches_off_suppression() {
    let dir = unique_temp_dir("replay-mode");
    let trace = write_file(&dir, "trace.json", HOLD_TRACE);

    let output = Command::new(env!("CARGO_BIN_EXE_tcpack_replay"))
        .args(["--trace", trace.to_str().unwrap(), "--mode", "0", "--quiet"])
        .output()
        .expect("run tcpack_replay");
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(
        stdout.lines().any(|l| l.starts_with("sent=3 freed=0")),
        "unexpected stdout: {stdout}"
    );

    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn tcpack_replay_rejects_delay_tx_on_pcie() {
    let dir = unique_temp_dir("replay-bad");
    let trace = write_file(
        &dir,
        "trace.json",
        r#"{ "config": { "mode": "delay_tx", "bus": "pcie" }, "events": [] }"#,
    );

    let output = Command::new(env!("CARGO_BIN_EXE_tcpack_replay"))
        .args(["--trace", trace.to_str().unwrap(), "--quiet"])
        .output()
        .expect("run tcpack_replay");
    assert!(!output.status.success());
    assert!(
        String::from_utf8_lossy(&output.stderr).contains("bad argument"),
        "stderr should explain the rejection"
    );

    let _ = fs::remove_dir_all(&dir);
}
