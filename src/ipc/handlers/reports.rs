use crate::ipc::error::{ok, HandlerErr, HandlerResult};
use crate::ipc::helpers::{get_opt_str, get_required_trimmed, require_db};
use crate::ipc::types::{AppState, Request};
use crate::session::Role;
use crate::summary::{
    self, LectureRecord, MarkStatus, RosterStudent,
};
use rusqlite::Connection;
use serde_json::json;
use std::collections::HashMap;

fn today_key() -> String {
    chrono::Local::now().format("%Y-%m-%d").to_string()
}

#[derive(Default)]
struct RecordFilter {
    teacher_id: Option<String>,
    subject: Option<String>,
    time_slot: Option<String>,
    from: Option<String>,
    to: Option<String>,
}

fn load_class_records(
    conn: &Connection,
    class_id: &str,
    filter: &RecordFilter,
) -> Result<Vec<LectureRecord>, HandlerErr> {
    let mut sql = String::from(
        "SELECT id, subject, date FROM attendance WHERE class_id = ?",
    );
    let mut binds: Vec<&str> = vec![class_id];
    if let Some(t) = filter.teacher_id.as_deref() {
        sql.push_str(" AND teacher_id = ?");
        binds.push(t);
    }
    if let Some(s) = filter.subject.as_deref() {
        sql.push_str(" AND subject = ?");
        binds.push(s);
    }
    if let Some(slot) = filter.time_slot.as_deref() {
        sql.push_str(" AND time_slot = ?");
        binds.push(slot);
    }
    if let Some(from) = filter.from.as_deref() {
        sql.push_str(" AND date >= ?");
        binds.push(from);
    }
    if let Some(to) = filter.to.as_deref() {
        sql.push_str(" AND date <= ?");
        binds.push(to);
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
            ))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(|e| HandlerErr::db("db_query_failed", e))?;

    let mut records = Vec::with_capacity(headers.len());
    let mut marks_stmt = conn
        .prepare(
            "SELECT student_id, status FROM attendance_marks WHERE attendance_id = ?",
        )
        .map_err(|e| HandlerErr::db("db_query_failed", e))?;
    for (id, subject, date) in headers {
        let rows = marks_stmt
            .query_map([&id], |r| {
                Ok((r.get::<_, String>(0)?, r.get::<_, String>(1)?))
            })
            .and_then(|it| it.collect::<Result<Vec<_>, _>>())
            .map_err(|e| HandlerErr::db("db_query_failed", e))?;
        let mut statuses = HashMap::with_capacity(rows.len());
        for (student_id, status) in rows {
            // Unknown stored values degrade to absent, same as a missing key.
            let parsed = MarkStatus::parse(&status).unwrap_or(MarkStatus::Absent);
            statuses.insert(student_id, parsed);
        }
        records.push(LectureRecord {
            subject,
            date,
            statuses,
        });
    }
    Ok(records)
}

fn load_roster(conn: &Connection, class_id: &str) -> Result<Vec<RosterStudent>, HandlerErr> {
    let mut stmt = conn
        .prepare(
            "SELECT id, name, roll_no FROM users
             WHERE role = 'student' AND class_id = ?
             ORDER BY CAST(roll_no AS INTEGER), name",
        )
        .map_err(|e| HandlerErr::db("db_query_failed", e))?;
    stmt.query_map([class_id], |r| {
        Ok(RosterStudent {
            id: r.get(0)?,
            name: r.get(1)?,
            roll_no: r.get(2)?,
        })
    })
    .and_then(|it| it.collect::<Result<Vec<_>, _>>())
    .map_err(|e| HandlerErr::db("db_query_failed", e))
}

/// Resolve which student a report is about: explicit params for admin
/// tooling, otherwise the signed-in student.
fn target_student(
    state: &AppState,
    params: &serde_json::Value,
) -> Result<(String, String), HandlerErr> {
    let session = &state.session;
    let student_id = get_opt_str(params, "studentId").or_else(|| {
        match (&session.identity, &session.profile) {
            (Some(identity), Some(profile)) if profile.role == Role::Student => {
                Some(identity.id.clone())
            }
            _ => None,
        }
    });
    let class_id = get_opt_str(params, "classId").or_else(|| {
        session
            .profile
            .as_ref()
            .and_then(|p| p.class_id.clone())
    });
    match (student_id, class_id) {
        (Some(s), Some(c)) => Ok((s, c)),
        _ => Err(HandlerErr::bad_params(
            "missing studentId/classId and no student session",
        )),
    }
}

fn student_dashboard(state: &AppState, params: &serde_json::Value) -> HandlerResult {
    let (student_id, class_id) = target_student(state, params)?;
    let conn = require_db(state)?;
    let records = load_class_records(conn, &class_id, &RecordFilter::default())?;
    let today = today_key();

    let subjects = summary::subject_stats_for_student(&records, &student_id, &today);
    let overall = summary::overall_for_student(&records, &student_id);

    Ok(json!({
        "classId": class_id,
        "studentId": student_id,
        "subjects": subjects,
        "summary": overall,
        "today": today,
    }))
}

fn student_report(state: &AppState, params: &serde_json::Value) -> HandlerResult {
    let (student_id, class_id) = target_student(state, params)?;
    let conn = require_db(state)?;
    // Records already arrive newest-first.
    let records = load_class_records(conn, &class_id, &RecordFilter::default())?;

    let rows: Vec<serde_json::Value> = records
        .iter()
        .map(|r| {
            let status = r
                .statuses
                .get(&student_id)
                .copied()
                .unwrap_or(MarkStatus::Absent);
            json!({
                "date": r.date,
                "subject": r.subject,
                "status": status,
            })
        })
        .collect();
    Ok(json!({ "rows": rows }))
}

fn class_summary(state: &AppState, params: &serde_json::Value) -> HandlerResult {
    let class_id = get_required_trimmed(params, "classId")?;
    let filter = RecordFilter {
        teacher_id: get_opt_str(params, "teacherId"),
        subject: get_opt_str(params, "subject"),
        time_slot: get_opt_str(params, "timeSlot"),
        from: get_opt_str(params, "from"),
        to: get_opt_str(params, "to"),
    };
    let conn = require_db(state)?;
    let roster = load_roster(conn, &class_id)?;
    let records = load_class_records(conn, &class_id, &filter)?;
    let today = today_key();

    let rows = summary::class_summary_rows(&records, &roster, &today);
    Ok(json!({
        "classId": class_id,
        "lectureCount": records.len(),
        "rows": rows,
    }))
}

fn admin_overview(state: &AppState) -> HandlerResult {
    let conn = require_db(state)?;

    let mut stmt = conn
        .prepare(
            "SELECT id, name, email, role, class_id, roll_no, subject FROM users
             WHERE role IN ('teacher', 'student') ORDER BY name",
        )
        .map_err(|e| HandlerErr::db("db_query_failed", e))?;
    let users = stmt
        .query_map([], |r| {
            Ok((
                r.get::<_, String>(0)?,
                r.get::<_, String>(1)?,
                r.get::<_, String>(2)?,
                r.get::<_, String>(3)?,
                r.get::<_, Option<String>>(4)?,
                r.get::<_, Option<String>>(5)?,
                r.get::<_, Option<String>>(6)?,
            ))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(|e| HandlerErr::db("db_query_failed", e))?;

    let mut stmt = conn
        .prepare("SELECT id, name FROM classes ORDER BY name")
        .map_err(|e| HandlerErr::db("db_query_failed", e))?;
    let classes = stmt
        .query_map([], |r| Ok((r.get::<_, String>(0)?, r.get::<_, String>(1)?)))
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(|e| HandlerErr::db("db_query_failed", e))?;

    // Group per class; classes with no members still show up, and users
    // pointing at a deleted class get a synthetic bucket.
    let mut buckets: std::collections::BTreeMap<String, (Option<String>, Vec<serde_json::Value>, Vec<serde_json::Value>)> =
        std::collections::BTreeMap::new();
    for (id, name) in &classes {
        buckets.insert(id.clone(), (Some(name.clone()), Vec::new(), Vec::new()));
    }

    let mut teacher_count = 0usize;
    let mut student_count = 0usize;
    for (id, name, email, role, class_id, roll_no, subject) in users {
        let key = class_id.unwrap_or_else(|| "UNKNOWN".to_string());
        let bucket = buckets.entry(key).or_insert((None, Vec::new(), Vec::new()));
        match role.as_str() {
            "teacher" => {
                teacher_count += 1;
                bucket.1.push(json!({
                    "id": id, "name": name, "email": email, "subject": subject,
                }));
            }
            _ => {
                student_count += 1;
                bucket.2.push(json!({
                    "id": id, "name": name, "email": email, "rollNo": roll_no,
                }));
            }
        }
    }

    let per_class: Vec<serde_json::Value> = buckets
        .into_iter()
        .map(|(class_id, (name, teachers, students))| {
            json!({
                "classId": class_id,
                "name": name,
                "teachers": teachers,
                "students": students,
            })
        })
        .collect();

    Ok(json!({
        "counts": {
            "teachers": teacher_count,
            "students": student_count,
            "classes": classes.len(),
        },
        "perClass": per_class,
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let resp = match req.method.as_str() {
        "reports.studentDashboard" => student_dashboard(state, &req.params),
        "reports.studentReport" => student_report(state, &req.params),
        "reports.classSummary" => class_summary(state, &req.params),
        "reports.adminOverview" => admin_overview(state),
        _ => return None,
    };
    Some(match resp {
        Ok(result) => ok(&req.id, result),
        Err(e) => e.response(&req.id),
    })
}
