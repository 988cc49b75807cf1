//! Database credentials as persisted in the env store.

use crate::env_store::EnvStore;

pub const POSTGRES_USER: &str = "POSTGRES_USER";
pub const POSTGRES_PASSWORD: &str = "POSTGRES_PASSWORD";
pub const POSTGRES_DB: &str = "POSTGRES_DB";

#[derive(Clone, PartialEq, Eq)]
pub struct CredentialSet {
    pub user: Option<String>,
    pub password: Option<String>,
    pub database: Option<String>,
}

impl CredentialSet {
    pub fn from_store(store: &EnvStore) -> Self {
        Self {
            user: store.get_non_empty(POSTGRES_USER),
            password: store.get_non_empty(POSTGRES_PASSWORD),
            database: store.get_non_empty(POSTGRES_DB),
        }
    }

    /// User and password are both required; the database name is optional.
    pub fn is_complete(&self) -> bool {
        self.user.is_some() && self.password.is_some()
    }

    /// Keys that are missing or blank.
    pub fn missing_keys(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.user.is_none() {
            missing.push(POSTGRES_USER);
        }
        if self.password.is_none() {
            missing.push(POSTGRES_PASSWORD);
        }
        missing
    }

    /// Postgres defaults the database name to the user name.
    pub fn database_name(&self) -> Option<&str> {
        self.database.as_deref().or(self.user.as_deref())
    }
}

// Never print the password.
impl std::fmt::Debug for CredentialSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialSet")
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("database", &self.database)
            .finish()
    }
}
