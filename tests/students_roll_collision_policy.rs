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
    let exe = env!("CARGO_BIN_EXE_rollcalld");
    let mut child = Command::new(exe)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn rollcalld");
    let stdin = child.stdin.take().expect("child stdin");
    let stdout = child.stdout.take().expect("child stdout");
    (child, stdin, BufReader::new(stdout))
}

fn request_raw(
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
    let value = request_raw(stdin, reader, id, method, params);
    assert!(
        value.get("ok").and_then(|v| v.as_bool()).unwrap_or(false),
        "{} failed: {}",
        method,
        value
    );
    value.get("result").cloned().unwrap_or_else(|| json!({}))
}

fn student_params(name: &str, email: &str, class_id: &str, roll_no: &str) -> serde_json::Value {
    json!({
        "name": name,
        "email": email,
        "classId": class_id,
        "rollNo": roll_no,
        "password": "123456"
    })
}

#[test]
fn duplicate_roll_in_same_class_is_rejected_naming_the_roll() {
    let workspace = temp_dir("rollcall-roll-dup");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "students.create",
        student_params("Asha", "asha@test.com", "FY", "7"),
    );
    let resp = request_raw(
        &mut stdin,
        &mut reader,
        "3",
        "students.create",
        student_params("Bilal", "bilal@test.com", "FY", "7"),
    );
    assert_eq!(resp.get("ok").and_then(|v| v.as_bool()), Some(false));
    assert_eq!(
        resp.pointer("/error/code").and_then(|v| v.as_str()),
        Some("validation_failed")
    );
    let message = resp
        .pointer("/error/message")
        .and_then(|v| v.as_str())
        .unwrap_or("");
    assert!(
        message.contains('7'),
        "rejection must name the conflicting roll number, got: {}",
        message
    );

    // Nothing was written for the rejected student.
    let listed = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "students.list",
        json!({ "classId": "FY" }),
    );
    assert_eq!(
        listed
            .get("students")
            .and_then(|v| v.as_array())
            .map(|a| a.len()),
        Some(1)
    );

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn same_roll_in_another_class_is_fine() {
    let workspace = temp_dir("rollcall-roll-other-class");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "students.create",
        student_params("Asha", "asha@test.com", "FY", "7"),
    );
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "students.create",
        student_params("Bilal", "bilal@test.com", "SY", "7"),
    );

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn update_cannot_steal_an_occupied_roll_but_keeps_own() {
    let workspace = temp_dir("rollcall-roll-update");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "students.create",
        student_params("Asha", "asha@test.com", "FY", "1"),
    );
    let created = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "students.create",
        student_params("Bilal", "bilal@test.com", "FY", "2"),
    );
    let bilal = created
        .get("studentId")
        .and_then(|v| v.as_str())
        .expect("studentId")
        .to_string();

    let resp = request_raw(
        &mut stdin,
        &mut reader,
        "4",
        "students.update",
        json!({ "studentId": bilal, "patch": { "rollNo": "1" } }),
    );
    assert_eq!(resp.get("ok").and_then(|v| v.as_bool()), Some(false));
    assert_eq!(
        resp.pointer("/error/code").and_then(|v| v.as_str()),
        Some("validation_failed")
    );

    // Re-submitting your own roll number is not a collision.
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "students.update",
        json!({ "studentId": bilal, "patch": { "rollNo": "2", "name": "Bilal K" } }),
    );

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn duplicate_email_is_an_auth_failure_not_a_roll_conflict() {
    let workspace = temp_dir("rollcall-roll-email");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "students.create",
        student_params("Asha", "asha@test.com", "FY", "1"),
    );
    let resp = request_raw(
        &mut stdin,
        &mut reader,
        "3",
        "students.create",
        student_params("Asha Again", "asha@test.com", "FY", "2"),
    );
    assert_eq!(
        resp.pointer("/error/code").and_then(|v| v.as_str()),
        Some("email_in_use")
    );

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}
