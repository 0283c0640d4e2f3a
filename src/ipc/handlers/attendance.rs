use crate::ipc::error::{ok, HandlerErr, HandlerResult};
use crate::ipc::helpers::{get_opt_str, get_required_trimmed, require_db};
use crate::ipc::types::{AppState, Request};
use crate::session::Role;
use crate::summary::MarkStatus;
use chrono::NaiveDate;
use rusqlite::{Connection, OptionalExtension};
use serde_json::json;
use std::collections::BTreeMap;

/// One record per (class, teacher, subject, slot, day): the id IS the tuple,
/// so a second save overwrites instead of duplicating.
fn composite_id(
    class_id: &str,
    teacher_id: &str,
    subject: &str,
    time_slot: &str,
    date: &str,
) -> String {
    format!(
        "{}_{}_{}_{}_{}",
        class_id, teacher_id, subject, time_slot, date
    )
}

fn parse_day(date: &str) -> Result<String, HandlerErr> {
    NaiveDate::parse_from_str(date, "%Y-%m-%d")
        .map(|d| d.format("%Y-%m-%d").to_string())
        .map_err(|_| HandlerErr::bad_params("date must be YYYY-MM-DD"))
}

fn today_key() -> String {
    chrono::Local::now().format("%Y-%m-%d").to_string()
}

/// Ordered map keeps response JSON stable across runs.
fn parse_status_map(
    params: &serde_json::Value,
) -> Result<BTreeMap<String, MarkStatus>, HandlerErr> {
    let Some(obj) = params.get("students").and_then(|v| v.as_object()) else {
        return Err(HandlerErr::bad_params("missing students map"));
    };
    let mut out = BTreeMap::new();
    for (student_id, value) in obj {
        let Some(s) = value.as_str() else {
            return Err(HandlerErr::bad_params("status values must be strings"));
        };
        let status = MarkStatus::parse(s).ok_or_else(|| {
            HandlerErr::with_details(
                "validation_failed",
                format!("unknown status {:?} for student {}", s, student_id),
                json!({ "studentId": student_id, "status": s }),
            )
        })?;
        out.insert(student_id.clone(), status);
    }
    Ok(out)
}

fn marks_of(conn: &Connection, attendance_id: &str) -> Result<serde_json::Value, HandlerErr> {
    let mut stmt = conn
        .prepare(
            "SELECT student_id, status FROM attendance_marks
             WHERE attendance_id = ? ORDER BY student_id",
        )
        .map_err(|e| HandlerErr::db("db_query_failed", e))?;
    let rows = stmt
        .query_map([attendance_id], |r| {
            Ok((r.get::<_, String>(0)?, r.get::<_, String>(1)?))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(|e| HandlerErr::db("db_query_failed", e))?;
    let mut map = serde_json::Map::new();
    for (student_id, status) in rows {
        map.insert(student_id, json!(status));
    }
    Ok(serde_json::Value::Object(map))
}

/// Replace the whole map inside one transaction: a save is all-or-nothing.
fn replace_marks(
    conn: &Connection,
    attendance_id: &str,
    statuses: &BTreeMap<String, MarkStatus>,
) -> Result<(), HandlerErr> {
    conn.execute(
        "DELETE FROM attendance_marks WHERE attendance_id = ?",
        [attendance_id],
    )
    .map_err(|e| HandlerErr::db("db_delete_failed", e))?;
    for (student_id, status) in statuses {
        conn.execute(
            "INSERT INTO attendance_marks(attendance_id, student_id, status) VALUES(?, ?, ?)",
            (attendance_id, student_id, status.as_str()),
        )
        .map_err(|e| HandlerErr::db("db_insert_failed", e))?;
    }
    Ok(())
}

/// Who is writing? Teachers save under their own identity; an explicit
/// teacherId lets admin tooling backfill on someone's behalf.
fn acting_teacher_id(state: &AppState, params: &serde_json::Value) -> Result<String, HandlerErr> {
    if let Some(explicit) = get_opt_str(params, "teacherId") {
        return Ok(explicit);
    }
    let session = &state.session;
    if let (Some(identity), Some(profile)) = (&session.identity, &session.profile) {
        if profile.role == Role::Teacher {
            return Ok(identity.id.clone());
        }
    }
    Err(HandlerErr::bad_params(
        "missing teacherId and no teacher session",
    ))
}

fn save(state: &AppState, params: &serde_json::Value) -> HandlerResult {
    let class_id = get_required_trimmed(params, "classId")?;
    let subject = get_required_trimmed(params, "subject")?;
    let time_slot = get_required_trimmed(params, "timeSlot")?;
    let teacher_id = acting_teacher_id(state, params)?;
    let date = match get_opt_str(params, "date") {
        Some(d) => parse_day(&d)?,
        None => today_key(),
    };
    let statuses = parse_status_map(params)?;
    let conn = require_db(state)?;

    let attendance_id = composite_id(&class_id, &teacher_id, &subject, &time_slot, &date);
    let updated_at = chrono::Utc::now().to_rfc3339();

    let tx = conn
        .unchecked_transaction()
        .map_err(|e| HandlerErr::db("db_tx_failed", e))?;
    tx.execute(
        "INSERT INTO attendance(id, class_id, teacher_id, subject, time_slot, date, updated_at)
         VALUES(?, ?, ?, ?, ?, ?, ?)
         ON CONFLICT(id) DO UPDATE SET updated_at = excluded.updated_at",
        (&attendance_id, &class_id, &teacher_id, &subject, &time_slot, &date, &updated_at),
    )
    .map_err(|e| HandlerErr::db("db_update_failed", e))?;
    replace_marks(&tx, &attendance_id, &statuses)?;
    tx.commit().map_err(|e| HandlerErr::db("db_commit_failed", e))?;

    tracing::debug!(attendance = %attendance_id, marks = statuses.len(), "attendance saved");
    Ok(json!({ "attendanceId": attendance_id, "date": date }))
}

fn update_marks(state: &AppState, params: &serde_json::Value) -> HandlerResult {
    let attendance_id = get_required_trimmed(params, "attendanceId")?;
    let statuses = parse_status_map(params)?;
    let conn = require_db(state)?;

    let exists: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM attendance WHERE id = ?",
            [&attendance_id],
            |r| r.get(0),
        )
        .optional()
        .map_err(|e| HandlerErr::db("db_query_failed", e))?;
    if exists.is_none() {
        return Err(HandlerErr::not_found("attendance record not found"));
    }

    // Only the map changes; class/teacher/subject/slot/date stay put.
    let updated_at = chrono::Utc::now().to_rfc3339();
    let tx = conn
        .unchecked_transaction()
        .map_err(|e| HandlerErr::db("db_tx_failed", e))?;
    replace_marks(&tx, &attendance_id, &statuses)?;
    tx.execute(
        "UPDATE attendance SET updated_at = ? WHERE id = ?",
        (&updated_at, &attendance_id),
    )
    .map_err(|e| HandlerErr::db("db_update_failed", e))?;
    tx.commit().map_err(|e| HandlerErr::db("db_commit_failed", e))?;

    Ok(json!({ "ok": true }))
}

fn list(state: &AppState, params: &serde_json::Value) -> HandlerResult {
    let class_id = get_required_trimmed(params, "classId")?;
    let teacher_id = get_opt_str(params, "teacherId");
    let subject = get_opt_str(params, "subject");
    let time_slot = get_opt_str(params, "timeSlot");
    let conn = require_db(state)?;

    let mut sql = String::from(
        "SELECT id, class_id, teacher_id, subject, time_slot, date
         FROM attendance WHERE class_id = ?",
    );
    let mut binds: Vec<&str> = vec![&class_id];
    if let Some(t) = teacher_id.as_deref() {
        sql.push_str(" AND teacher_id = ?");
        binds.push(t);
    }
    if let Some(s) = subject.as_deref() {
        sql.push_str(" AND subject = ?");
        binds.push(s);
    }
    if let Some(slot) = time_slot.as_deref() {
        sql.push_str(" AND time_slot = ?");
        binds.push(slot);
    }
    sql.push_str(" ORDER BY date DESC, subject, time_slot");

    let mut stmt = conn
        .prepare(&sql)
        .map_err(|e| HandlerErr::db("db_query_failed", e))?;
    let headers = stmt
        .query_map(rusqlite::params_from_iter(binds.iter()), |r| {
            Ok((
                r.get::<_, String>(0)?,
                r.get::<_, String>(1)?,
                r.get::<_, String>(2)?,
                r.get::<_, String>(3)?,
                r.get::<_, String>(4)?,
                r.get::<_, String>(5)?,
            ))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(|e| HandlerErr::db("db_query_failed", e))?;

    let mut records = Vec::with_capacity(headers.len());
    for (id, class_id, teacher_id, subject, time_slot, date) in headers {
        let students = marks_of(conn, &id)?;
        records.push(json!({
            "id": id,
            "classId": class_id,
            "teacherId": teacher_id,
            "subject": subject,
            "timeSlot": time_slot,
            "date": date,
            "students": students,
        }));
    }
    Ok(json!({ "records": records }))
}

fn delete(state: &AppState, params: &serde_json::Value) -> HandlerResult {
    let attendance_id = get_required_trimmed(params, "attendanceId")?;
    let conn = require_db(state)?;

    let tx = conn
        .unchecked_transaction()
        .map_err(|e| HandlerErr::db("db_tx_failed", e))?;
    tx.execute(
        "DELETE FROM attendance_marks WHERE attendance_id = ?",
        [&attendance_id],
    )
    .map_err(|e| HandlerErr::db("db_delete_failed", e))?;
    let removed = tx
        .execute("DELETE FROM attendance WHERE id = ?", [&attendance_id])
        .map_err(|e| HandlerErr::db("db_delete_failed", e))?;
    if removed == 0 {
        return Err(HandlerErr::not_found("attendance record not found"));
    }
    tx.commit().map_err(|e| HandlerErr::db("db_commit_failed", e))?;

    Ok(json!({ "ok": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let resp = match req.method.as_str() {
        "attendance.save" => save(state, &req.params),
        "attendance.updateMarks" => update_marks(state, &req.params),
        "attendance.list" => list(state, &req.params),
        "attendance.delete" => delete(state, &req.params),
        _ => return None,
    };
    Some(match resp {
        Ok(result) => ok(&req.id, result),
        Err(e) => e.response(&req.id),
    })
}
