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
    if value.get("ok").and_then(|v| v.as_bool()) == Some(false) {
        let code = value
            .get("error")
            .and_then(|e| e.get("code"))
            .and_then(|v| v.as_str())
            .unwrap_or("unknown");
        assert_ne!(
            code, "not_implemented",
            "unexpected unknown method for {}",
            method
        );
    }
    value
}

#[test]
fn router_dispatch_smoke_covers_handler_families() {
    let workspace = temp_dir("rollcall-router-smoke");
    let bundle_out = workspace.join("smoke-backup.rcbackup.zip");

    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    let _ = request(&mut stdin, &mut reader, "1", "health", json!({}));
    let _ = request(
        &mut stdin,
        &mut reader,
        "2",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let _ = request(&mut stdin, &mut reader, "3", "auth.session", json!({}));
    let _ = request(
        &mut stdin,
        &mut reader,
        "4",
        "routes.resolve",
        json!({ "path": "/" }),
    );
    let _ = request(
        &mut stdin,
        &mut reader,
        "5",
        "auth.demoLogin",
        json!({ "role": "admin" }),
    );
    let _ = request(
        &mut stdin,
        &mut reader,
        "6",
        "classes.create",
        json!({ "id": "FY", "name": "First Year" }),
    );
    let _ = request(
        &mut stdin,
        &mut reader,
        "7",
        "classes.addSubject",
        json!({ "classId": "FY", "name": "Math" }),
    );
    let _ = request(&mut stdin, &mut reader, "8", "classes.list", json!({}));
    let created_teacher = request(
        &mut stdin,
        &mut reader,
        "9",
        "teachers.create",
        json!({
            "name": "Smoke Teacher",
            "email": "smoke.teacher@test.com",
            "classId": "FY",
            "subject": "Math",
            "password": "123456"
        }),
    );
    let teacher_id = created_teacher
        .get("result")
        .and_then(|v| v.get("teacherId"))
        .and_then(|v| v.as_str())
        .expect("teacherId")
        .to_string();
    let _ = request(&mut stdin, &mut reader, "10", "teachers.list", json!({}));
    let created_student = request(
        &mut stdin,
        &mut reader,
        "11",
        "students.create",
        json!({
            "name": "Smoke Student",
            "email": "smoke.student@test.com",
            "classId": "FY",
            "rollNo": "1",
            "password": "123456"
        }),
    );
    let student_id = created_student
        .get("result")
        .and_then(|v| v.get("studentId"))
        .and_then(|v| v.as_str())
        .expect("studentId")
        .to_string();
    let _ = request(
        &mut stdin,
        &mut reader,
        "12",
        "students.list",
        json!({ "classId": "FY" }),
    );
    let _ = request(
        &mut stdin,
        &mut reader,
        "13",
        "students.update",
        json!({ "studentId": student_id, "patch": { "name": "Smoke Updated" } }),
    );
    let mut present_map = serde_json::Map::new();
    present_map.insert(student_id.clone(), json!("present"));
    let saved = request(
        &mut stdin,
        &mut reader,
        "14",
        "attendance.save",
        json!({
            "classId": "FY",
            "teacherId": teacher_id,
            "subject": "Math",
            "timeSlot": "10am-11am",
            "date": "2024-01-10",
            "students": present_map
        }),
    );
    let attendance_id = saved
        .get("result")
        .and_then(|v| v.get("attendanceId"))
        .and_then(|v| v.as_str())
        .expect("attendanceId")
        .to_string();
    let _ = request(
        &mut stdin,
        &mut reader,
        "15",
        "attendance.list",
        json!({ "classId": "FY" }),
    );
    let mut absent_map = serde_json::Map::new();
    absent_map.insert(student_id.clone(), json!("absent"));
    let _ = request(
        &mut stdin,
        &mut reader,
        "16",
        "attendance.updateMarks",
        json!({ "attendanceId": attendance_id, "students": absent_map }),
    );
    let _ = request(
        &mut stdin,
        &mut reader,
        "17",
        "reports.studentDashboard",
        json!({ "studentId": student_id, "classId": "FY" }),
    );
    let _ = request(
        &mut stdin,
        &mut reader,
        "18",
        "reports.studentReport",
        json!({ "studentId": student_id, "classId": "FY" }),
    );
    let _ = request(
        &mut stdin,
        &mut reader,
        "19",
        "reports.classSummary",
        json!({ "classId": "FY" }),
    );
    let _ = request(&mut stdin, &mut reader, "20", "reports.adminOverview", json!({}));
    let _ = request(
        &mut stdin,
        &mut reader,
        "21",
        "backup.exportWorkspaceBundle",
        json!({ "outPath": bundle_out.to_string_lossy() }),
    );
    let _ = request(
        &mut stdin,
        &mut reader,
        "22",
        "backup.importWorkspaceBundle",
        json!({ "inPath": bundle_out.to_string_lossy() }),
    );
    let _ = request(
        &mut stdin,
        &mut reader,
        "23",
        "attendance.delete",
        json!({ "attendanceId": attendance_id }),
    );
    let _ = request(
        &mut stdin,
        &mut reader,
        "24",
        "students.delete",
        json!({ "studentId": student_id }),
    );
    let _ = request(
        &mut stdin,
        &mut reader,
        "25",
        "teachers.delete",
        json!({ "teacherId": teacher_id }),
    );
    let _ = request(
        &mut stdin,
        &mut reader,
        "26",
        "classes.delete",
        json!({ "classId": "FY" }),
    );
    let _ = request(&mut stdin, &mut reader, "27", "auth.signOut", json!({}));

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}
