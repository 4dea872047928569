use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::time::{SystemTime, UNIX_EPOCH};

fn temp_dir(prefix: &str) -> PathBuf {
    let p = std::env::temp_dir().join(format!(
        "{}-{}",
        prefix,
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos()
    ));
    std::fs::create_dir_all(&p).expect("create temp dir");
    p
}

fn spawn_sidecar() -> (Child, ChildStdin, BufReader<ChildStdout>) {
    let exe = env!("CARGO_BIN_EXE_rosterd");
    let mut child = Command::new(exe)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn rosterd");
    let stdin = child.stdin.take().expect("child stdin");
    let stdout = child.stdout.take().expect("child stdout");
    (child, stdin, BufReader::new(stdout))
}

fn request(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let payload = json!({
        "id": id,
        "method": method,
        "params": params,
    });
    writeln!(stdin, "{}", payload).expect("write request");
    stdin.flush().expect("flush request");

    let mut line = String::new();
    reader.read_line(&mut line).expect("read response line");
    let value: serde_json::Value = serde_json::from_str(line.trim()).expect("parse response json");
    assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id));
    value
}

fn request_ok(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let value = request(stdin, reader, id, method, params);
    assert_eq!(
        value.get("ok").and_then(|v| v.as_bool()),
        Some(true),
        "{} failed: {}",
        method,
        value
            .get("error")
            .and_then(|e| e.get("message"))
            .and_then(|v| v.as_str())
            .unwrap_or("unknown error")
    );
    value.get("result").cloned().unwrap_or_else(|| json!({}))
}

#[test]
fn pod_metadata_fields_are_stored_independently() {
    let (_child, mut stdin, mut reader) = spawn_sidecar();

    let empty = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "podMeta.get",
        json!({ "podId": "pod_1" }),
    );
    assert_eq!(empty["metadata"], json!({}));

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "podMeta.savePlan",
        json!({ "podId": "pod_1", "plan": { "title": "Fractions", "weeks": 3 } }),
    );
    for (i, v) in [1, 2].iter().enumerate() {
        let res = request_ok(
            &mut stdin,
            &mut reader,
            &format!("h{}", i),
            "podMeta.appendHistory",
            json!({ "podId": "pod_1", "entry": { "rev": v } }),
        );
        assert_eq!(res.get("historyLength").and_then(|v| v.as_u64()), Some(i as u64 + 1));
    }

    let exec = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "podMeta.setExecution",
        json!({ "podId": "pod_1", "execution": { "executed": true } }),
    );
    assert_eq!(exec.get("saved").and_then(|v| v.as_bool()), Some(true));
    assert!(exec["execution"].get("executedAt").and_then(|v| v.as_str()).is_some());
    assert_eq!(exec["execution"]["feedbackComplete"], json!(false));

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "podMeta.submitFeedback",
        json!({ "podId": "pod_1", "entry": { "studentId": "s1", "rating": 2 } }),
    );
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "podMeta.submitFeedback",
        json!({ "podId": "pod_1", "entry": { "studentId": "s1", "rating": 4 } }),
    );

    let got = request_ok(
        &mut stdin,
        &mut reader,
        "6",
        "podMeta.get",
        json!({ "podId": "pod_1" }),
    );
    let meta = &got["metadata"];
    assert_eq!(meta["plan"]["title"], json!("Fractions"));
    assert_eq!(meta["planHistory"].as_array().map(|a| a.len()), Some(2));
    assert_eq!(meta["execution"]["executed"], json!(true));
    assert_eq!(meta["feedback"], json!([{ "studentId": "s1", "rating": 4 }]));

    let other = request_ok(
        &mut stdin,
        &mut reader,
        "7",
        "podMeta.get",
        json!({ "podId": "pod_2" }),
    );
    assert_eq!(other["metadata"], json!({}));
}

#[test]
fn feedback_requires_student_id() {
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let resp = request(
        &mut stdin,
        &mut reader,
        "1",
        "podMeta.submitFeedback",
        json!({ "podId": "pod_1", "entry": { "rating": 3 } }),
    );
    assert_eq!(resp.get("ok").and_then(|v| v.as_bool()), Some(false));
    assert_eq!(resp["error"]["code"], json!("bad_params"));
}
