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
    let exe = env!("CARGO_BIN_EXE_marksafed");
    let mut child = Command::new(exe)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn marksafed");
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
    assert!(!line.trim().is_empty(), "empty response for {}", method);
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
    assert!(
        value.get("ok").and_then(|v| v.as_bool()).unwrap_or(false),
        "{} failed: {}",
        method,
        value
    );
    value.get("result").cloned().unwrap_or_else(|| json!({}))
}

#[test]
fn add_then_update_preserves_untouched_fields() {
    let workspace = temp_dir("marksafe-update");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let init = request_ok(&mut stdin, &mut reader, "2", "protection.init", json!({}));
    assert_eq!(init["marksCount"], 0);
    assert_eq!(init["backupsCount"], 0);

    let added = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "marks.update",
        json!({ "record": { "studentId": "s1", "examId": "e1", "score": 80, "maxScore": 100 } }),
    );
    assert_eq!(added["action"], "added");
    assert_eq!(added["count"], 1);
    let assigned_id = added["id"].as_str().expect("new record gets an id").to_string();

    // Both safety snapshots exist after a successful add.
    let backups = request_ok(&mut stdin, &mut reader, "4", "backup.list", json!({}));
    assert_eq!(backups["count"], 2);
    let entries = backups["backups"].as_array().expect("backup entries");
    assert_eq!(entries[0]["action"], "before_update");
    assert_eq!(entries[0]["count"], 0);
    assert_eq!(entries[1]["action"], "after_update");
    assert_eq!(entries[1]["count"], 1);

    // Update the same (studentId, examId) pair without maxScore.
    let updated = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "marks.update",
        json!({ "record": { "studentId": "s1", "examId": "e1", "score": 95 } }),
    );
    assert_eq!(updated["action"], "updated");
    assert_eq!(updated["count"], 1);

    let marks = request_ok(&mut stdin, &mut reader, "6", "marks.get", json!({}));
    assert_eq!(marks["count"], 1);
    let record = &marks["marks"][0];
    assert_eq!(record["studentId"], "s1");
    assert_eq!(record["examId"], "e1");
    assert_eq!(record["score"], 95.0);
    assert_eq!(record["maxScore"], 100.0);
    assert_eq!(record["id"], assigned_id.as_str());

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn committed_updates_survive_a_restart() {
    let workspace = temp_dir("marksafe-durability");

    {
        let (mut child, mut stdin, mut reader) = spawn_sidecar();
        request_ok(
            &mut stdin,
            &mut reader,
            "1",
            "workspace.select",
            json!({ "path": workspace.to_string_lossy() }),
        );
        request_ok(
            &mut stdin,
            &mut reader,
            "2",
            "marks.update",
            json!({ "record": { "studentId": "s1", "examId": "e1", "score": 80, "maxScore": 100 } }),
        );
        drop(stdin);
        let _ = child.wait();
    }

    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let marks = request_ok(&mut stdin, &mut reader, "2", "marks.get", json!({}));
    assert_eq!(marks["count"], 1);
    assert_eq!(marks["marks"][0]["score"], 80.0);
    assert_eq!(marks["marks"][0]["maxScore"], 100.0);

    let status = request_ok(&mut stdin, &mut reader, "3", "protection.status", json!({}));
    assert_eq!(status["marksCount"], 1);
    assert_eq!(status["validationIssues"].as_array().map(|a| a.len()), Some(0));

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn records_for_different_exams_append_in_order() {
    let workspace = temp_dir("marksafe-append-order");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    for (i, (student, exam)) in [("s1", "e1"), ("s2", "e1"), ("s1", "e2")]
        .iter()
        .enumerate()
    {
        let resp = request_ok(
            &mut stdin,
            &mut reader,
            &format!("u{i}"),
            "marks.update",
            json!({ "record": { "studentId": student, "examId": exam, "score": 50 } }),
        );
        assert_eq!(resp["action"], "added");
    }

    let marks = request_ok(&mut stdin, &mut reader, "9", "marks.get", json!({}));
    assert_eq!(marks["count"], 3);
    let entries = marks["marks"].as_array().expect("marks array");
    assert_eq!(entries[0]["studentId"], "s1");
    assert_eq!(entries[0]["examId"], "e1");
    assert_eq!(entries[1]["studentId"], "s2");
    assert_eq!(entries[2]["examId"], "e2");

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}
