use crate::guard::{self, GuardOutcome};
use crate::ipc::error::{ok, HandlerErr, HandlerResult};
use crate::ipc::helpers::get_required_str;
use crate::ipc::types::{AppState, Request};
use crate::session::Role;
use serde_json::json;

fn resolve(state: &AppState, params: &serde_json::Value) -> HandlerResult {
    let path = get_required_str(params, "path")?;
    let Some(route) = guard::find_route(&path) else {
        return Ok(json!({ "decision": "notFound" }));
    };

    let Some(allowed) = route.allowed else {
        // Public route, no guard.
        return Ok(json!({
            "decision": "render",
            "page": route.page,
        }));
    };

    let session = &state.session;
    match guard::evaluate(
        session.loading,
        session.identity.as_ref(),
        session.profile.as_ref(),
        allowed,
    ) {
        GuardOutcome::Loading => Ok(json!({ "decision": "loading" })),
        GuardOutcome::Render => Ok(json!({
            "decision": "render",
            "page": route.page,
            "layout": route.layout,
        })),
        GuardOutcome::Redirect(to) => Ok(json!({
            "decision": "redirect",
            "to": to,
        })),
    }
}

fn home(params: &serde_json::Value) -> HandlerResult {
    let role_str = get_required_str(params, "role")?;
    let role = Role::parse(&role_str)
        .ok_or_else(|| HandlerErr::bad_params(format!("unknown role: {}", role_str)))?;
    Ok(json!({ "home": role.home_path() }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let resp = match req.method.as_str() {
        "routes.resolve" => resolve(state, &req.params),
        "routes.home" => home(&req.params),
        _ => return None,
    };
    Some(match resp {
        Ok(result) => ok(&req.id, result),
        Err(e) => e.response(&req.id),
    })
}
