use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Minimum accepted password length, matching the hosted provider the
/// original deployment used.
pub const MIN_PASSWORD_LEN: usize = 6;

/// Stored as `salt$hex(sha256(salt + password))`.
pub fn hash_password(password: &str) -> String {
    let salt = Uuid::new_v4().simple().to_string();
    format!("{}${}", salt, digest(&salt, password))
}

pub fn verify_password(stored: &str, password: &str) -> bool {
    let Some((salt, expected)) = stored.split_once('$') else {
        return false;
    };
    digest(salt, password) == expected
}

fn digest(salt: &str, password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(password.as_bytes());
    let out = hasher.finalize();
    out.iter().map(|b| format!("{:02x}", b)).collect()
}

/// Cheap shape check; real address validation belongs to the mail layer.
pub fn email_looks_valid(email: &str) -> bool {
    let t = email.trim();
    match t.split_once('@') {
        Some((local, domain)) => !local.is_empty() && domain.contains('.'),
        None => false,
    }
}

pub fn password_strong_enough(password: &str) -> bool {
    password.len() >= MIN_PASSWORD_LEN
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_verifies_and_salts_differ() {
        let a = hash_password("secret1");
        let b = hash_password("secret1");
        assert_ne!(a, b);
        assert!(verify_password(&a, "secret1"));
        assert!(verify_password(&b, "secret1"));
        assert!(!verify_password(&a, "secret2"));
    }

    #[test]
    fn malformed_stored_hash_never_verifies() {
        assert!(!verify_password("not-a-hash", "anything"));
        assert!(!verify_password("", ""));
    }

    #[test]
    fn email_shape_check() {
        assert!(email_looks_valid("s@gmail.com"));
        assert!(email_looks_valid("  a.b@x.co  "));
        assert!(!email_looks_valid("nope"));
        assert!(!email_looks_valid("@x.com"));
        assert!(!email_looks_valid("a@nodot"));
    }

    #[test]
    fn password_length_floor() {
        assert!(!password_strong_enough("12345"));
        assert!(password_strong_enough("123456"));
    }
}
