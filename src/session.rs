use serde::Serialize;

/// User role as stored in the `users` collection. Every role-keyed decision
/// (menu links, redirects, canonical home) goes through this enum rather than
/// raw strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Teacher,
    Student,
}

impl Role {
    pub fn parse(s: &str) -> Option<Role> {
        match s {
            "admin" => Some(Role::Admin),
            "teacher" => Some(Role::Teacher),
            "student" => Some(Role::Student),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Teacher => "teacher",
            Role::Student => "student",
        }
    }

    /// Canonical landing route for the role. Total: every role maps somewhere.
    pub fn home_path(&self) -> &'static str {
        match self {
            Role::Admin => "/admin",
            Role::Teacher => "/teacher",
            Role::Student => "/student",
        }
    }
}

/// Externally-issued authenticated-user reference. Not authoritative here;
/// cleared on sign-out.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    pub id: String,
    pub email: String,
}

/// Application-level user record keyed by identity id.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    pub role: Role,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub class_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub roll_no: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gender: Option<String>,
}

impl Profile {
    pub fn new(role: Role, name: String) -> Self {
        Profile {
            role,
            name,
            class_id: None,
            roll_no: None,
            subject: None,
            gender: None,
        }
    }
}

/// The session store. One instance lives in `AppState` for the lifetime of
/// the process; handlers mutate it through the methods below so `loading`
/// resolves exactly once per identity transition.
pub struct SessionState {
    pub identity: Option<Identity>,
    pub profile: Option<Profile>,
    pub loading: bool,
}

impl SessionState {
    /// Initial state: nothing resolved yet. `routes.resolve` reports Loading
    /// until the first transition lands.
    pub fn new() -> Self {
        SessionState {
            identity: None,
            profile: None,
            loading: true,
        }
    }

    /// Resolve to an authenticated session. A missing profile is not an
    /// error: the session degrades to "no profile".
    pub fn establish(&mut self, identity: Identity, profile: Option<Profile>) {
        self.identity = Some(identity);
        self.profile = profile;
        self.loading = false;
    }

    /// Resolve to anonymous. Used both for initial auth-state resolution and
    /// for sign-out; must never leave the store looking authenticated.
    pub fn clear(&mut self) {
        self.identity = None;
        self.profile = None;
        self.loading = false;
    }

    /// Synthesize a demo session without touching the store. Sign-out clears
    /// it identically to a real one.
    pub fn establish_demo(&mut self, role: Role) {
        let name = {
            let s = role.as_str();
            let mut c = s.chars();
            match c.next() {
                Some(first) => first.to_uppercase().collect::<String>() + c.as_str(),
                None => String::new(),
            }
        };
        let mut profile = Profile::new(role, name);
        profile.class_id = Some("demo".to_string());
        self.establish(
            Identity {
                id: "demo".to_string(),
                email: format!("{}@test.com", role.as_str()),
            },
            Some(profile),
        );
    }
}
