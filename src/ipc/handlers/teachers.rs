use crate::auth;
use crate::ipc::error::{ok, HandlerErr, HandlerResult};
use crate::ipc::helpers::{get_opt_str, get_required_str, get_required_trimmed, require_db};
use crate::ipc::types::{AppState, Request};
use rusqlite::{Connection, OptionalExtension};
use serde_json::json;
use uuid::Uuid;

fn teacher_row_json(r: &rusqlite::Row) -> rusqlite::Result<serde_json::Value> {
    Ok(json!({
        "id": r.get::<_, String>(0)?,
        "name": r.get::<_, String>(1)?,
        "email": r.get::<_, String>(2)?,
        "classId": r.get::<_, Option<String>>(3)?,
        "subject": r.get::<_, Option<String>>(4)?,
    }))
}

/// The `subjects` collection mirrors which teacher teaches what where; the
/// admin attendance filters read it. Rebuild this teacher's entry whenever
/// the assignment changes.
fn sync_subject_assignment(conn: &Connection, teacher_id: &str) -> Result<(), HandlerErr> {
    let assignment: Option<(Option<String>, Option<String>)> = conn
        .query_row(
            "SELECT class_id, subject FROM users WHERE id = ? AND role = 'teacher'",
            [teacher_id],
            |r| Ok((r.get(0)?, r.get(1)?)),
        )
        .optional()
        .map_err(|e| HandlerErr::db("db_query_failed", e))?;

    conn.execute("DELETE FROM subjects WHERE teacher_id = ?", [teacher_id])
        .map_err(|e| HandlerErr::db("db_delete_failed", e))?;

    if let Some((Some(class_id), Some(subject))) = assignment {
        let id = Uuid::new_v4().to_string();
        conn.execute(
            "INSERT INTO subjects(id, class_id, teacher_id, name) VALUES(?, ?, ?, ?)
             ON CONFLICT(class_id, teacher_id, name) DO NOTHING",
            (&id, &class_id, teacher_id, &subject),
        )
        .map_err(|e| HandlerErr::db("db_insert_failed", e))?;
    }
    Ok(())
}

fn list(state: &AppState) -> HandlerResult {
    let conn = require_db(state)?;
    let mut stmt = conn
        .prepare(
            "SELECT id, name, email, class_id, subject
             FROM users WHERE role = 'teacher' ORDER BY name",
        )
        .map_err(|e| HandlerErr::db("db_query_failed", e))?;
    let teachers = stmt
        .query_map([], teacher_row_json)
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(|e| HandlerErr::db("db_query_failed", e))?;
    Ok(json!({ "teachers": teachers }))
}

fn create(state: &AppState, params: &serde_json::Value) -> HandlerResult {
    let conn = require_db(state)?;
    let name = get_required_trimmed(params, "name")?;
    let email = get_required_trimmed(params, "email")?;
    let class_id = get_required_trimmed(params, "classId")?;
    let subject = get_required_trimmed(params, "subject")?;
    let password = get_required_str(params, "password")?;

    if !auth::email_looks_valid(&email) {
        return Err(HandlerErr::new("invalid_email", "invalid email address"));
    }
    if !auth::password_strong_enough(&password) {
        return Err(HandlerErr::new(
            "weak_password",
            format!("password must be at least {} characters", auth::MIN_PASSWORD_LEN),
        ));
    }
    let taken: Option<i64> = conn
        .query_row("SELECT 1 FROM users WHERE email = ?", [&email], |r| r.get(0))
        .optional()
        .map_err(|e| HandlerErr::db("db_query_failed", e))?;
    if taken.is_some() {
        return Err(HandlerErr::new(
            "email_in_use",
            "This email is already in use.",
        ));
    }

    let teacher_id = Uuid::new_v4().to_string();
    let hash = auth::hash_password(&password);
    let created_at = chrono::Utc::now().to_rfc3339();
    conn.execute(
        "INSERT INTO users(id, email, password_hash, role, name, class_id, subject, created_at)
         VALUES(?, ?, ?, 'teacher', ?, ?, ?, ?)",
        (&teacher_id, &email, &hash, &name, &class_id, &subject, &created_at),
    )
    .map_err(|e| HandlerErr::db("db_insert_failed", e))?;
    sync_subject_assignment(conn, &teacher_id)?;

    Ok(json!({ "teacherId": teacher_id }))
}

fn update(state: &AppState, params: &serde_json::Value) -> HandlerResult {
    let conn = require_db(state)?;
    let teacher_id = get_required_trimmed(params, "teacherId")?;
    let patch = params
        .get("patch")
        .ok_or_else(|| HandlerErr::bad_params("missing patch"))?;

    let exists: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM users WHERE id = ? AND role = 'teacher'",
            [&teacher_id],
            |r| r.get(0),
        )
        .optional()
        .map_err(|e| HandlerErr::db("db_query_failed", e))?;
    if exists.is_none() {
        return Err(HandlerErr::not_found("teacher not found"));
    }

    if let Some(name) = get_opt_str(patch, "name") {
        conn.execute("UPDATE users SET name = ? WHERE id = ?", (&name, &teacher_id))
            .map_err(|e| HandlerErr::db("db_update_failed", e))?;
    }
    if let Some(class_id) = get_opt_str(patch, "classId") {
        conn.execute(
            "UPDATE users SET class_id = ? WHERE id = ?",
            (&class_id, &teacher_id),
        )
        .map_err(|e| HandlerErr::db("db_update_failed", e))?;
    }
    if let Some(subject) = get_opt_str(patch, "subject") {
        conn.execute(
            "UPDATE users SET subject = ? WHERE id = ?",
            (&subject, &teacher_id),
        )
        .map_err(|e| HandlerErr::db("db_update_failed", e))?;
    }
    sync_subject_assignment(conn, &teacher_id)?;

    Ok(json!({ "ok": true }))
}

fn delete(state: &AppState, params: &serde_json::Value) -> HandlerResult {
    let conn = require_db(state)?;
    let teacher_id = get_required_trimmed(params, "teacherId")?;

    // Attendance records the teacher wrote stay; delete is by id, no cascade.
    let tx = conn
        .unchecked_transaction()
        .map_err(|e| HandlerErr::db("db_tx_failed", e))?;
    tx.execute("DELETE FROM subjects WHERE teacher_id = ?", [&teacher_id])
        .map_err(|e| HandlerErr::db("db_delete_failed", e))?;
    let removed = tx
        .execute(
            "DELETE FROM users WHERE id = ? AND role = 'teacher'",
            [&teacher_id],
        )
        .map_err(|e| HandlerErr::db("db_delete_failed", e))?;
    if removed == 0 {
        return Err(HandlerErr::not_found("teacher not found"));
    }
    tx.commit().map_err(|e| HandlerErr::db("db_commit_failed", e))?;

    Ok(json!({ "ok": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let resp = match req.method.as_str() {
        "teachers.list" => list(state),
        "teachers.create" => create(state, &req.params),
        "teachers.update" => update(state, &req.params),
        "teachers.delete" => delete(state, &req.params),
        _ => return None,
    };
    Some(match resp {
        Ok(result) => ok(&req.id, result),
        Err(e) => e.response(&req.id),
    })
}
