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

fn write_remote_config(workspace: &std::path::Path, remote: &std::path::Path) {
    let text = format!(
        "[remote]\nurl = \"file://{}\"\ntimeout_ms = 5000\n",
        remote.to_string_lossy()
    );
    std::fs::write(workspace.join("rosterd.toml"), text).expect("write rosterd.toml");
}

fn select(stdin: &mut ChildStdin, reader: &mut BufReader<ChildStdout>, workspace: &std::path::Path) {
    let sel = request_ok(
        stdin,
        reader,
        "select",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    assert_eq!(sel.get("remoteEnabled").and_then(|v| v.as_bool()), Some(true));
}

#[test]
fn shared_config_saved_on_one_workspace_loads_on_another() {
    let a = temp_dir("rosterd-shared-a");
    let b = temp_dir("rosterd-shared-b");
    let remote = temp_dir("rosterd-shared-remote");
    write_remote_config(&a, &remote);
    write_remote_config(&b, &remote);

    let (_c1, mut a_in, mut a_out) = spawn_sidecar();
    select(&mut a_in, &mut a_out, &a);
    let saved = request_ok(
        &mut a_in,
        &mut a_out,
        "1",
        "sharedConfig.save",
        json!({ "endpoint": "https://llm.example.net/v1", "apiKey": "sk-1", "model": "tutor-large" }),
    );
    assert_eq!(saved["success"], json!(true));
    assert!(saved["config"]["updatedAt"].as_str().is_some());
    assert!(remote.join("roster/sharedConfig.json").is_file());

    let (_c2, mut b_in, mut b_out) = spawn_sidecar();
    select(&mut b_in, &mut b_out, &b);
    let loaded = request_ok(&mut b_in, &mut b_out, "1", "sharedConfig.load", json!({}));
    assert_eq!(loaded["success"], json!(true));
    assert_eq!(loaded["config"], saved["config"]);

    let _ = std::fs::remove_dir_all(a);
    let _ = std::fs::remove_dir_all(b);
    let _ = std::fs::remove_dir_all(remote);
}

#[test]
fn shared_config_load_without_document_keeps_cache() {
    let workspace = temp_dir("rosterd-shared-empty");
    let remote = temp_dir("rosterd-shared-empty-remote");
    write_remote_config(&workspace, &remote);

    let (_child, mut stdin, mut reader) = spawn_sidecar();
    select(&mut stdin, &mut reader, &workspace);
    let loaded = request_ok(&mut stdin, &mut reader, "1", "sharedConfig.load", json!({}));
    assert_eq!(loaded["success"], json!(false));
    assert_eq!(loaded["reason"], json!("No cloud data"));
    assert_eq!(loaded["cached"], json!(null));

    let missing = request(
        &mut stdin,
        &mut reader,
        "2",
        "sharedConfig.save",
        json!({ "endpoint": "https://llm.example.net/v1" }),
    );
    assert_eq!(missing["error"]["code"], json!("bad_params"));

    let _ = std::fs::remove_dir_all(workspace);
    let _ = std::fs::remove_dir_all(remote);
}

#[test]
fn shared_config_without_remote_is_not_enabled() {
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let saved = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "sharedConfig.save",
        json!({ "endpoint": "https://llm.example.net/v1", "model": "m" }),
    );
    assert_eq!(saved, json!({ "success": false, "reason": "not enabled" }));
}
