// Login state for one interactive session

use crate::error::AuthError;
use std::collections::BTreeMap;
use tracing::{info, warn};

/// Accounts shipped with the tool. Overridable through the `[users]` table
/// of the config file.
pub const BUILTIN_USERS: &[(&str, &str)] = &[
    ("admin", "rahasia123"),
    ("lennox", "yolo2026"),
    ("analyst_1", "pass789"),
    ("user_test", "testing321"),
];

/// Static username to password mapping. Plain comparison, no hashing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialStore {
    users: BTreeMap<String, String>,
}

impl CredentialStore {
    pub fn new(users: BTreeMap<String, String>) -> Self {
        Self { users }
    }

    pub fn builtin() -> Self {
        Self::new(builtin_users())
    }

    pub fn verify(&self, username: &str, password: &str) -> bool {
        self.users
            .get(username)
            .is_some_and(|expected| expected == password)
    }

    pub fn usernames(&self) -> impl Iterator<Item = &str> {
        self.users.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}

impl Default for CredentialStore {
    fn default() -> Self {
        Self::builtin()
    }
}

pub fn builtin_users() -> BTreeMap<String, String> {
    BUILTIN_USERS
        .iter()
        .map(|(user, pass)| (user.to_string(), pass.to_string()))
        .collect()
}

/// Owned by whoever drives the interaction (the REPL app or a CLI handler).
/// Starts logged out.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Session {
    authenticated: bool,
    current_user: Option<String>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    /// A failed attempt leaves the session exactly as it was.
    pub fn login(
        &mut self,
        store: &CredentialStore,
        username: &str,
        password: &str,
    ) -> Result<(), AuthError> {
        if !store.verify(username, password) {
            warn!(user = %username, "Login rejected");
            return Err(AuthError::InvalidCredentials);
        }

        info!(user = %username, "Login accepted");
        self.authenticated = true;
        self.current_user = Some(username.to_string());
        Ok(())
    }

    pub fn logout(&mut self) {
        if let Some(user) = self.current_user.take() {
            info!(user = %user, "Logged out");
        }
        self.authenticated = false;
    }

    pub fn is_authenticated(&self) -> bool {
        self.authenticated
    }

    pub fn current_user(&self) -> Option<&str> {
        self.current_user.as_deref()
    }

    /// Name of the logged-in user, or `NotAuthenticated`.
    pub fn require(&self) -> Result<&str, AuthError> {
        match (self.authenticated, self.current_user.as_deref()) {
            (true, Some(user)) => Ok(user),
            _ => Err(AuthError::NotAuthenticated),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_store_has_four_accounts() {
        let store = CredentialStore::builtin();
        assert_eq!(store.len(), 4);
        assert!(store.verify("lennox", "yolo2026"));
        assert!(store.verify("user_test", "testing321"));
    }

    #[test]
    fn test_usernames_are_sorted() {
        let store = CredentialStore::builtin();
        let names: Vec<&str> = store.usernames().collect();
        assert_eq!(names, vec!["admin", "analyst_1", "lennox", "user_test"]);
    }

    #[test]
    fn test_password_is_case_sensitive() {
        let store = CredentialStore::builtin();
        assert!(!store.verify("admin", "RAHASIA123"));
        assert!(!store.verify("Admin", "rahasia123"));
    }
}
