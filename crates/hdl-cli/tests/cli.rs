use serde_json::Value;
use std::process::Command;

fn hdlrun() -> Command {
    Command::new(env!("CARGO_BIN_EXE_hdlrun"))
}

#[test]
fn list_reports_every_runner_as_json() {
    let out = hdlrun().args(["list", "--json"]).output().expect("spawn hdlrun");
    assert_eq!(out.status.code(), Some(0));
    let payload: Value = serde_json::from_slice(&out.stdout).expect("json output");
    let names: Vec<&str> = payload["runners"]
        .as_array()
        .expect("runners array")
        .iter()
        .filter_map(|r| r["name"].as_str())
        .collect();
    assert_eq!(names, vec!["icarus", "odin", "yosys"]);
}

#[test]
fn unknown_runner_is_a_harness_failure() {
    let out = hdlrun()
        .args(["run", "quartus", "--work-dir", ".", "--file", "a.sv", "--json"])
        .output()
        .expect("spawn hdlrun");
    assert_eq!(out.status.code(), Some(125));
    let payload: Value = serde_json::from_slice(&out.stdout).expect("json output");
    assert_eq!(payload["ok"], Value::Bool(false));
    assert_eq!(payload["error"]["code"], "unknown_runner");
}

#[test]
fn missing_work_dir_is_a_harness_failure() {
    let missing = std::env::temp_dir().join(format!("hdlrun_cli_missing_{}", std::process::id()));
    let out = hdlrun()
        .args(["run", "odin", "--file", "a.sv", "--json", "--work-dir"])
        .arg(&missing)
        .output()
        .expect("spawn hdlrun");
    assert_eq!(out.status.code(), Some(125));
    let payload: Value = serde_json::from_slice(&out.stdout).expect("json output");
    assert_eq!(payload["error"]["code"], "invalid_working_directory");
}
