use crate::ipc::error::{ok, HandlerErr, HandlerResult};
use crate::ipc::helpers::{get_required_trimmed, require_db};
use crate::ipc::types::{AppState, Request};
use rusqlite::{Connection, OptionalExtension};
use serde_json::json;

fn class_exists(conn: &Connection, class_id: &str) -> Result<bool, HandlerErr> {
    conn.query_row("SELECT 1 FROM classes WHERE id = ?", [class_id], |r| {
        r.get::<_, i64>(0)
    })
    .optional()
    .map(|v| v.is_some())
    .map_err(|e| HandlerErr::db("db_query_failed", e))
}

fn subjects_of(conn: &Connection, class_id: &str) -> Result<Vec<String>, HandlerErr> {
    let mut stmt = conn
        .prepare("SELECT name FROM class_subjects WHERE class_id = ? ORDER BY sort_order")
        .map_err(|e| HandlerErr::db("db_query_failed", e))?;
    stmt.query_map([class_id], |r| r.get::<_, String>(0))
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(|e| HandlerErr::db("db_query_failed", e))
}

fn list(state: &AppState) -> HandlerResult {
    let Some(conn) = state.db.as_ref() else {
        return Ok(json!({ "classes": [] }));
    };

    // Counts via correlated subqueries so joins can't double-count.
    let mut stmt = conn
        .prepare(
            "SELECT
               c.id,
               c.name,
               (SELECT COUNT(*) FROM users u WHERE u.role = 'student' AND u.class_id = c.id) AS student_count,
               (SELECT COUNT(*) FROM users u WHERE u.role = 'teacher' AND u.class_id = c.id) AS teacher_count
             FROM classes c
             ORDER BY c.name",
        )
        .map_err(|e| HandlerErr::db("db_query_failed", e))?;
    let rows = stmt
        .query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, i64>(2)?,
                row.get::<_, i64>(3)?,
            ))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(|e| HandlerErr::db("db_query_failed", e))?;

    let mut classes = Vec::with_capacity(rows.len());
    for (id, name, student_count, teacher_count) in rows {
        let subjects = subjects_of(conn, &id)?;
        classes.push(json!({
            "id": id,
            "name": name,
            "subjects": subjects,
            "studentCount": student_count,
            "teacherCount": teacher_count,
        }));
    }
    Ok(json!({ "classes": classes }))
}

fn create(state: &AppState, params: &serde_json::Value) -> HandlerResult {
    let conn = require_db(state)?;
    // The class id is the caller-chosen short code ("FY", "IT-3A", ...).
    let class_id = get_required_trimmed(params, "id")?;
    let name = get_required_trimmed(params, "name")?;

    if class_exists(conn, &class_id)? {
        return Err(HandlerErr::with_details(
            "validation_failed",
            format!("class {} already exists", class_id),
            json!({ "classId": class_id }),
        ));
    }

    let created_at = chrono::Utc::now().to_rfc3339();
    conn.execute(
        "INSERT INTO classes(id, name, created_at) VALUES(?, ?, ?)",
        (&class_id, &name, &created_at),
    )
    .map_err(|e| HandlerErr::db("db_insert_failed", e))?;

    Ok(json!({ "classId": class_id, "name": name }))
}

fn rename(state: &AppState, params: &serde_json::Value) -> HandlerResult {
    let conn = require_db(state)?;
    let class_id = get_required_trimmed(params, "classId")?;
    let name = get_required_trimmed(params, "name")?;

    let changed = conn
        .execute("UPDATE classes SET name = ? WHERE id = ?", (&name, &class_id))
        .map_err(|e| HandlerErr::db("db_update_failed", e))?;
    if changed == 0 {
        return Err(HandlerErr::not_found("class not found"));
    }
    Ok(json!({ "ok": true }))
}

fn add_subject(state: &AppState, params: &serde_json::Value) -> HandlerResult {
    let conn = require_db(state)?;
    let class_id = get_required_trimmed(params, "classId")?;
    let name = get_required_trimmed(params, "name")?;

    if !class_exists(conn, &class_id)? {
        return Err(HandlerErr::not_found("class not found"));
    }

    // Set union: adding an existing subject is a no-op, order is preserved.
    let next_order: i64 = conn
        .query_row(
            "SELECT COALESCE(MAX(sort_order) + 1, 0) FROM class_subjects WHERE class_id = ?",
            [&class_id],
            |r| r.get(0),
        )
        .map_err(|e| HandlerErr::db("db_query_failed", e))?;
    conn.execute(
        "INSERT INTO class_subjects(class_id, name, sort_order)
         VALUES(?, ?, ?)
         ON CONFLICT(class_id, name) DO NOTHING",
        (&class_id, &name, next_order),
    )
    .map_err(|e| HandlerErr::db("db_insert_failed", e))?;

    Ok(json!({ "subjects": subjects_of(conn, &class_id)? }))
}

fn remove_subject(state: &AppState, params: &serde_json::Value) -> HandlerResult {
    let conn = require_db(state)?;
    let class_id = get_required_trimmed(params, "classId")?;
    let name = get_required_trimmed(params, "name")?;

    conn.execute(
        "DELETE FROM class_subjects WHERE class_id = ? AND name = ?",
        (&class_id, &name),
    )
    .map_err(|e| HandlerErr::db("db_delete_failed", e))?;

    Ok(json!({ "subjects": subjects_of(conn, &class_id)? }))
}

fn delete(state: &AppState, params: &serde_json::Value) -> HandlerResult {
    let conn = require_db(state)?;
    let class_id = get_required_trimmed(params, "classId")?;

    if !class_exists(conn, &class_id)? {
        return Err(HandlerErr::not_found("class not found"));
    }

    // Removes the class document and its subject list only. Users and
    // attendance that reference the id are left orphaned on purpose.
    let tx = conn
        .unchecked_transaction()
        .map_err(|e| HandlerErr::db("db_tx_failed", e))?;
    tx.execute("DELETE FROM class_subjects WHERE class_id = ?", [&class_id])
        .map_err(|e| HandlerErr::db("db_delete_failed", e))?;
    tx.execute("DELETE FROM classes WHERE id = ?", [&class_id])
        .map_err(|e| HandlerErr::db("db_delete_failed", e))?;
    tx.commit().map_err(|e| HandlerErr::db("db_commit_failed", e))?;

    Ok(json!({ "ok": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let resp = match req.method.as_str() {
        "classes.list" => list(state),
        "classes.create" => create(state, &req.params),
        "classes.rename" => rename(state, &req.params),
        "classes.addSubject" => add_subject(state, &req.params),
        "classes.removeSubject" => remove_subject(state, &req.params),
        "classes.delete" => delete(state, &req.params),
        _ => return None,
    };
    Some(match resp {
        Ok(result) => ok(&req.id, result),
        Err(e) => e.response(&req.id),
    })
}
