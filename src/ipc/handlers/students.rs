use crate::auth;
use crate::ipc::error::{ok, HandlerErr, HandlerResult};
use crate::ipc::helpers::{get_opt_str, get_required_str, get_required_trimmed, require_db};
use crate::ipc::types::{AppState, Request};
use rusqlite::{Connection, OptionalExtension};
use serde_json::json;
use uuid::Uuid;

/// (classId, rollNo) must be unique among students. Checked before any
/// write; the rejection names the conflicting roll number.
fn check_roll_unique(
    conn: &Connection,
    class_id: &str,
    roll_no: &str,
    exclude_id: Option<&str>,
) -> Result<(), HandlerErr> {
    let conflict: Option<String> = conn
        .query_row(
            "SELECT id FROM users
             WHERE role = 'student' AND class_id = ? AND TRIM(roll_no) = TRIM(?)",
            (class_id, roll_no),
            |r| r.get(0),
        )
        .optional()
        .map_err(|e| HandlerErr::db("db_query_failed", e))?;
    match conflict {
        Some(id) if Some(id.as_str()) != exclude_id => Err(HandlerErr::with_details(
            "validation_failed",
            format!("Roll number {} already exists in this class", roll_no),
            json!({ "classId": class_id, "rollNo": roll_no }),
        )),
        _ => Ok(()),
    }
}

fn student_row_json(r: &rusqlite::Row) -> rusqlite::Result<serde_json::Value> {
    Ok(json!({
        "id": r.get::<_, String>(0)?,
        "name": r.get::<_, String>(1)?,
        "email": r.get::<_, String>(2)?,
        "classId": r.get::<_, Option<String>>(3)?,
        "rollNo": r.get::<_, Option<String>>(4)?,
        "gender": r.get::<_, Option<String>>(5)?,
    }))
}

fn list(state: &AppState, params: &serde_json::Value) -> HandlerResult {
    let conn = require_db(state)?;
    let class_id = get_opt_str(params, "classId");

    let students = match class_id {
        Some(cid) => {
            let mut stmt = conn
                .prepare(
                    "SELECT id, name, email, class_id, roll_no, gender
                     FROM users WHERE role = 'student' AND class_id = ?
                     ORDER BY CAST(roll_no AS INTEGER), name",
                )
                .map_err(|e| HandlerErr::db("db_query_failed", e))?;
            stmt.query_map([&cid], student_row_json)
                .and_then(|it| it.collect::<Result<Vec<_>, _>>())
                .map_err(|e| HandlerErr::db("db_query_failed", e))?
        }
        None => {
            let mut stmt = conn
                .prepare(
                    "SELECT id, name, email, class_id, roll_no, gender
                     FROM users WHERE role = 'student'
                     ORDER BY class_id, CAST(roll_no AS INTEGER), name",
                )
                .map_err(|e| HandlerErr::db("db_query_failed", e))?;
            stmt.query_map([], student_row_json)
                .and_then(|it| it.collect::<Result<Vec<_>, _>>())
                .map_err(|e| HandlerErr::db("db_query_failed", e))?
        }
    };
    Ok(json!({ "students": students }))
}

fn create(state: &AppState, params: &serde_json::Value) -> HandlerResult {
    let conn = require_db(state)?;
    let name = get_required_trimmed(params, "name")?;
    let email = get_required_trimmed(params, "email")?;
    let class_id = get_required_trimmed(params, "classId")?;
    let roll_no = get_required_trimmed(params, "rollNo")?;
    let password = get_required_str(params, "password")?;
    let gender = get_opt_str(params, "gender").unwrap_or_else(|| "male".to_string());

    if !auth::email_looks_valid(&email) {
        return Err(HandlerErr::new("invalid_email", "invalid email address"));
    }
    if !auth::password_strong_enough(&password) {
        return Err(HandlerErr::new(
            "weak_password",
            format!("password must be at least {} characters", auth::MIN_PASSWORD_LEN),
        ));
    }
    check_roll_unique(conn, &class_id, &roll_no, None)?;

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

    let student_id = Uuid::new_v4().to_string();
    let hash = auth::hash_password(&password);
    let created_at = chrono::Utc::now().to_rfc3339();
    conn.execute(
        "INSERT INTO users(id, email, password_hash, role, name, class_id, roll_no, gender, created_at)
         VALUES(?, ?, ?, 'student', ?, ?, ?, ?, ?)",
        (&student_id, &email, &hash, &name, &class_id, &roll_no, &gender, &created_at),
    )
    .map_err(|e| HandlerErr::db("db_insert_failed", e))?;

    Ok(json!({ "studentId": student_id }))
}

fn update(state: &AppState, params: &serde_json::Value) -> HandlerResult {
    let conn = require_db(state)?;
    let student_id = get_required_trimmed(params, "studentId")?;
    let patch = params
        .get("patch")
        .ok_or_else(|| HandlerErr::bad_params("missing patch"))?;

    let current: Option<(Option<String>, Option<String>)> = conn
        .query_row(
            "SELECT class_id, roll_no FROM users WHERE id = ? AND role = 'student'",
            [&student_id],
            |r| Ok((r.get(0)?, r.get(1)?)),
        )
        .optional()
        .map_err(|e| HandlerErr::db("db_query_failed", e))?;
    let Some((cur_class, cur_roll)) = current else {
        return Err(HandlerErr::not_found("student not found"));
    };

    // Uniqueness is re-checked against the post-patch pair so moving a
    // student between classes can't land on an occupied roll number.
    let next_class = get_opt_str(patch, "classId").or(cur_class);
    let next_roll = get_opt_str(patch, "rollNo").or(cur_roll);
    if let (Some(class_id), Some(roll_no)) = (next_class.as_deref(), next_roll.as_deref()) {
        check_roll_unique(conn, class_id, roll_no, Some(&student_id))?;
    }

    if let Some(name) = get_opt_str(patch, "name") {
        conn.execute("UPDATE users SET name = ? WHERE id = ?", (&name, &student_id))
            .map_err(|e| HandlerErr::db("db_update_failed", e))?;
    }
    if let Some(class_id) = next_class.as_deref() {
        if patch.get("classId").is_some() {
            conn.execute(
                "UPDATE users SET class_id = ? WHERE id = ?",
                (class_id, &student_id),
            )
            .map_err(|e| HandlerErr::db("db_update_failed", e))?;
        }
    }
    if let Some(roll_no) = next_roll.as_deref() {
        if patch.get("rollNo").is_some() {
            conn.execute(
                "UPDATE users SET roll_no = ? WHERE id = ?",
                (roll_no, &student_id),
            )
            .map_err(|e| HandlerErr::db("db_update_failed", e))?;
        }
    }
    if let Some(gender) = get_opt_str(patch, "gender") {
        conn.execute(
            "UPDATE users SET gender = ? WHERE id = ?",
            (&gender, &student_id),
        )
        .map_err(|e| HandlerErr::db("db_update_failed", e))?;
    }

    Ok(json!({ "ok": true }))
}

fn delete(state: &AppState, params: &serde_json::Value) -> HandlerResult {
    let conn = require_db(state)?;
    let student_id = get_required_trimmed(params, "studentId")?;

    // Marks referencing the student stay behind; they keep counting as
    // historical lecture rows, which is the documented non-goal.
    let removed = conn
        .execute(
            "DELETE FROM users WHERE id = ? AND role = 'student'",
            [&student_id],
        )
        .map_err(|e| HandlerErr::db("db_delete_failed", e))?;
    if removed == 0 {
        return Err(HandlerErr::not_found("student not found"));
    }
    Ok(json!({ "ok": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let resp = match req.method.as_str() {
        "students.list" => list(state, &req.params),
        "students.create" => create(state, &req.params),
        "students.update" => update(state, &req.params),
        "students.delete" => delete(state, &req.params),
        _ => return None,
    };
    Some(match resp {
        Ok(result) => ok(&req.id, result),
        Err(e) => e.response(&req.id),
    })
}
