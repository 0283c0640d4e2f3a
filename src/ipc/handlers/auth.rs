use crate::auth;
use crate::ipc::error::{ok, HandlerErr, HandlerResult};
use crate::ipc::helpers::{get_opt_str, get_required_str, get_required_trimmed, require_db};
use crate::ipc::types::{AppState, Request};
use crate::session::{Identity, Profile, Role};
use rusqlite::{Connection, OptionalExtension};
use serde_json::json;
use uuid::Uuid;

struct UserRow {
    id: String,
    email: String,
    password_hash: Option<String>,
    role: String,
    name: String,
    class_id: Option<String>,
    roll_no: Option<String>,
    subject: Option<String>,
    gender: Option<String>,
}

fn user_by_email(conn: &Connection, email: &str) -> Result<Option<UserRow>, HandlerErr> {
    conn.query_row(
        "SELECT id, email, password_hash, role, name, class_id, roll_no, subject, gender
         FROM users WHERE email = ?",
        [email],
        |r| {
            Ok(UserRow {
                id: r.get(0)?,
                email: r.get(1)?,
                password_hash: r.get(2)?,
                role: r.get(3)?,
                name: r.get(4)?,
                class_id: r.get(5)?,
                roll_no: r.get(6)?,
                subject: r.get(7)?,
                gender: r.get(8)?,
            })
        },
    )
    .optional()
    .map_err(|e| HandlerErr::db("db_query_failed", e))
}

/// A stored role the enum doesn't know means the profile document is
/// unusable; the session degrades to "no profile" rather than erroring.
fn profile_from_row(row: &UserRow) -> Option<Profile> {
    let role = Role::parse(&row.role)?;
    let mut p = Profile::new(role, row.name.clone());
    p.class_id = row.class_id.clone();
    p.roll_no = row.roll_no.clone();
    p.subject = row.subject.clone();
    p.gender = row.gender.clone();
    Some(p)
}

fn session_json(state: &AppState) -> serde_json::Value {
    json!({
        "identity": &state.session.identity,
        "profile": &state.session.profile,
        "loading": state.session.loading,
    })
}

fn sign_in(state: &mut AppState, params: &serde_json::Value) -> HandlerResult {
    let email = get_required_trimmed(params, "email")?;
    let password = get_required_str(params, "password")?;
    let expected_role = match get_opt_str(params, "role") {
        Some(r) => Some(
            Role::parse(&r).ok_or_else(|| HandlerErr::bad_params(format!("unknown role: {}", r)))?,
        ),
        None => None,
    };

    let conn = require_db(state)?;
    let Some(row) = user_by_email(conn, &email)? else {
        return Err(HandlerErr::new(
            "invalid_credentials",
            "Invalid email or password.",
        ));
    };
    let valid = row
        .password_hash
        .as_deref()
        .map(|h| auth::verify_password(h, &password))
        .unwrap_or(false);
    if !valid {
        return Err(HandlerErr::new(
            "invalid_credentials",
            "Invalid email or password.",
        ));
    }
    let profile = profile_from_row(&row);

    if let Some(expected) = expected_role {
        match &profile {
            None => {
                state.session.clear();
                return Err(HandlerErr::new("auth_failed", "User not found in database"));
            }
            Some(p) if p.role != expected => {
                let registered = p.role.as_str();
                state.session.clear();
                return Err(HandlerErr::new(
                    "auth_failed",
                    format!("This account is registered as {}.", registered),
                ));
            }
            Some(_) => {}
        }
    }

    let home = profile
        .as_ref()
        .map(|p| p.role.home_path())
        .unwrap_or("/");
    state.session.establish(
        Identity {
            id: row.id.clone(),
            email: row.email.clone(),
        },
        profile,
    );
    tracing::info!(user = %row.id, "signed in");

    Ok(json!({
        "identity": &state.session.identity,
        "profile": &state.session.profile,
        "home": home,
    }))
}

fn register(state: &mut AppState, params: &serde_json::Value) -> HandlerResult {
    let email = get_required_trimmed(params, "email")?;
    let password = get_required_str(params, "password")?;
    let role_str = get_required_trimmed(params, "role")?;
    let role = Role::parse(&role_str)
        .ok_or_else(|| HandlerErr::bad_params(format!("unknown role: {}", role_str)))?;
    let name = get_opt_str(params, "name").unwrap_or_default();
    let class_id = get_opt_str(params, "classId");

    if !auth::email_looks_valid(&email) {
        return Err(HandlerErr::new("invalid_email", "invalid email address"));
    }
    if !auth::password_strong_enough(&password) {
        return Err(HandlerErr::new(
            "weak_password",
            format!("password must be at least {} characters", auth::MIN_PASSWORD_LEN),
        ));
    }

    let conn = require_db(state)?;
    if user_by_email(conn, &email)?.is_some() {
        return Err(HandlerErr::new(
            "email_in_use",
            "This email is already in use.",
        ));
    }

    let user_id = Uuid::new_v4().to_string();
    let hash = auth::hash_password(&password);
    let created_at = chrono::Utc::now().to_rfc3339();
    conn.execute(
        "INSERT INTO users(id, email, password_hash, role, name, class_id, created_at)
         VALUES(?, ?, ?, ?, ?, ?, ?)",
        (&user_id, &email, &hash, role.as_str(), &name, &class_id, &created_at),
    )
    .map_err(|e| HandlerErr::db("db_insert_failed", e))?;

    // The account provider signs a fresh account in; do the same.
    let mut profile = Profile::new(role, name);
    profile.class_id = class_id;
    state.session.establish(
        Identity {
            id: user_id.clone(),
            email: email.clone(),
        },
        Some(profile),
    );

    Ok(json!({ "userId": user_id }))
}

fn demo_login(state: &mut AppState, params: &serde_json::Value) -> HandlerResult {
    let role_str = get_required_trimmed(params, "role")?;
    let role = Role::parse(&role_str)
        .ok_or_else(|| HandlerErr::bad_params(format!("unknown role: {}", role_str)))?;
    state.session.establish_demo(role);
    Ok(json!({
        "identity": &state.session.identity,
        "profile": &state.session.profile,
        "home": role.home_path(),
    }))
}

fn request_password_reset(state: &mut AppState, params: &serde_json::Value) -> HandlerResult {
    let email = get_required_trimmed(params, "email")?;
    let conn = require_db(state)?;
    let row = user_by_email(conn, &email)?
        .ok_or_else(|| HandlerErr::not_found("no account with that email"))?;

    // Token delivery (mail, shell, ...) is the embedder's concern; the
    // daemon only issues and honors tokens.
    let token = Uuid::new_v4().to_string();
    let created_at = chrono::Utc::now().to_rfc3339();
    conn.execute(
        "INSERT INTO password_resets(token, user_id, created_at) VALUES(?, ?, ?)",
        (&token, &row.id, &created_at),
    )
    .map_err(|e| HandlerErr::db("db_insert_failed", e))?;

    Ok(json!({ "resetToken": token }))
}

fn reset_password(state: &mut AppState, params: &serde_json::Value) -> HandlerResult {
    let token = get_required_trimmed(params, "token")?;
    let password = get_required_str(params, "password")?;
    if !auth::password_strong_enough(&password) {
        return Err(HandlerErr::new(
            "weak_password",
            format!("password must be at least {} characters", auth::MIN_PASSWORD_LEN),
        ));
    }

    let conn = require_db(state)?;
    let user_id: Option<String> = conn
        .query_row(
            "SELECT user_id FROM password_resets WHERE token = ?",
            [&token],
            |r| r.get(0),
        )
        .optional()
        .map_err(|e| HandlerErr::db("db_query_failed", e))?;
    let Some(user_id) = user_id else {
        return Err(HandlerErr::not_found("unknown or used reset token"));
    };

    let hash = auth::hash_password(&password);
    conn.execute(
        "UPDATE users SET password_hash = ? WHERE id = ?",
        (&hash, &user_id),
    )
    .map_err(|e| HandlerErr::db("db_update_failed", e))?;
    conn.execute("DELETE FROM password_resets WHERE token = ?", [&token])
        .map_err(|e| HandlerErr::db("db_delete_failed", e))?;

    Ok(json!({ "ok": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let resp = match req.method.as_str() {
        "auth.session" => Ok(session_json(state)),
        "auth.signIn" => sign_in(state, &req.params),
        "auth.register" => register(state, &req.params),
        "auth.demoLogin" => demo_login(state, &req.params),
        "auth.signOut" => {
            // Must clear even if the provider/store is unreachable; the UI
            // must never stay authenticated-looking after a sign-out.
            state.session.clear();
            tracing::debug!("signed out");
            Ok(json!({ "ok": true }))
        }
        "auth.requestPasswordReset" => request_password_reset(state, &req.params),
        "auth.resetPassword" => reset_password(state, &req.params),
        _ => return None,
    };
    Some(match resp {
        Ok(result) => ok(&req.id, result),
        Err(e) => e.response(&req.id),
    })
}
