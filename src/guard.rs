use serde::Serialize;

use crate::session::{Identity, Profile, Role};

/// Layout shell a routed page renders inside.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Layout {
    Admin,
    Teacher,
    Student,
}

pub struct RouteSpec {
    pub path: &'static str,
    pub page: &'static str,
    pub layout: Option<Layout>,
    /// None = public route, no guard.
    pub allowed: Option<&'static [Role]>,
}

const ADMIN_ONLY: &[Role] = &[Role::Admin];
const TEACHER_ONLY: &[Role] = &[Role::Teacher];
const STUDENT_ONLY: &[Role] = &[Role::Student];

pub const ROUTES: &[RouteSpec] = &[
    RouteSpec { path: "/", page: "Login", layout: None, allowed: None },
    RouteSpec { path: "/register", page: "Register", layout: None, allowed: None },
    RouteSpec { path: "/admin", page: "AdminDashboard", layout: Some(Layout::Admin), allowed: Some(ADMIN_ONLY) },
    RouteSpec { path: "/admin/attendance", page: "ManageAttendance", layout: Some(Layout::Admin), allowed: Some(ADMIN_ONLY) },
    RouteSpec { path: "/admin/teachers", page: "ManageTeachers", layout: Some(Layout::Admin), allowed: Some(ADMIN_ONLY) },
    RouteSpec { path: "/admin/students", page: "ManageStudents", layout: Some(Layout::Admin), allowed: Some(ADMIN_ONLY) },
    RouteSpec { path: "/admin/classes", page: "ManageClasses", layout: Some(Layout::Admin), allowed: Some(ADMIN_ONLY) },
    RouteSpec { path: "/teacher", page: "TeacherDashboard", layout: Some(Layout::Teacher), allowed: Some(TEACHER_ONLY) },
    RouteSpec { path: "/teacher/mark", page: "MarkAttendance", layout: Some(Layout::Teacher), allowed: Some(TEACHER_ONLY) },
    RouteSpec { path: "/teacher/history", page: "AttendanceHistory", layout: Some(Layout::Teacher), allowed: Some(TEACHER_ONLY) },
    RouteSpec { path: "/student", page: "StudentDashboard", layout: Some(Layout::Student), allowed: Some(STUDENT_ONLY) },
    RouteSpec { path: "/student/report", page: "AttendanceReport", layout: Some(Layout::Student), allowed: Some(STUDENT_ONLY) },
];

pub fn find_route(path: &str) -> Option<&'static RouteSpec> {
    ROUTES.iter().find(|r| r.path == path)
}

/// Outcome of guarding one route request against the current session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardOutcome {
    /// Session not resolved yet; render a loading state, no redirect.
    Loading,
    Render,
    Redirect(&'static str),
}

/// The guard itself. Rules, in order:
///
/// 1. loading -> Loading.
/// 2. no identity and no profile -> render. Fully-anonymous visitors are
///    waved through; see DESIGN.md, this is intentionally left as shipped.
/// 3. no identity but a profile -> back to "/".
/// 4. profile missing or role not allowed -> the profile's canonical home,
///    "/" when there is no role to go by.
/// 5. otherwise render.
pub fn evaluate(
    loading: bool,
    identity: Option<&Identity>,
    profile: Option<&Profile>,
    allowed: &[Role],
) -> GuardOutcome {
    if loading {
        return GuardOutcome::Loading;
    }
    match (identity, profile) {
        (None, None) => GuardOutcome::Render,
        (None, Some(_)) => GuardOutcome::Redirect("/"),
        (Some(_), profile) => {
            let role = profile.map(|p| p.role);
            let permitted = role.map(|r| allowed.contains(&r)).unwrap_or(false);
            if permitted {
                GuardOutcome::Render
            } else {
                GuardOutcome::Redirect(role.map(|r| r.home_path()).unwrap_or("/"))
            }
        }
    }
}
