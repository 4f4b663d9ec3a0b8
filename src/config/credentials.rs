//! Credentials passed explicitly to engine constructors
//!
//! Engines never read the process environment themselves; the binary builds a
//! [`Credentials`] from the environment once, tests build one by hand.

use secrecy::{ExposeSecret, SecretString};
use std::collections::HashMap;

/// Credential name to secret value
#[derive(Clone, Default)]
pub struct Credentials {
    values: HashMap<String, SecretString>,
}

impl Credentials {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read the named variables from the process environment
    ///
    /// Unset variables are skipped.
    pub fn from_env<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut credentials = Self::new();
        for name in names {
            let name = name.as_ref();
            if let Ok(value) = std::env::var(name) {
                credentials.insert(name, value);
            }
        }
        credentials
    }

    /// Builder form of [`Credentials::insert`]
    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.values.insert(name.into(), SecretString::from(value.into()));
    }

    /// Secret value of a credential
    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(|secret| secret.expose_secret())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    /// Credential names (not values), sorted
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.values.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials").field("names", &self.names()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_with_and_get() {
        let credentials = Credentials::default().with("OPENAI_API_KEY", "sk-1");
        assert_eq!(credentials.get("OPENAI_API_KEY"), Some("sk-1"));
        assert!(credentials.get("OTHER").is_none());
        assert!(credentials.contains("OPENAI_API_KEY"));
    }

    #[test]
    fn test_debug_hides_values() {
        let credentials = Credentials::default().with("KEY", "very-secret");
        let debug = format!("{:?}", credentials);
        assert!(debug.contains("KEY"));
        assert!(!debug.contains("very-secret"));
    }

    #[test]
    fn test_from_env_reads_only_named() {
        std::env::set_var("SWITCHBOARD_TEST_CREDENTIAL_A", "a");
        std::env::set_var("SWITCHBOARD_TEST_CREDENTIAL_B", "b");

        let credentials = Credentials::from_env(["SWITCHBOARD_TEST_CREDENTIAL_A", "SWITCHBOARD_TEST_CREDENTIAL_MISSING"]);
        assert_eq!(credentials.names(), vec!["SWITCHBOARD_TEST_CREDENTIAL_A"]);
        assert_eq!(credentials.get("SWITCHBOARD_TEST_CREDENTIAL_A"), Some("a"));
    }
}
