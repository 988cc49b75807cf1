//! Container registry login.
//!
//! A token alone is enough for the registry; the user name is not checked
//! consistently across registries, so two user strategies are tried in
//! order: `oauth2`, then the token itself.

use std::fmt;

use tracing::{debug, info_span, warn};

use crate::RuntimeClient;

const LOGIN_USERS: &[LoginUser] = &[LoginUser::OAuth2, LoginUser::Token];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LoginUser {
    OAuth2,
    Token,
}

impl LoginUser {
    fn resolve<'a>(self, token: &'a str) -> &'a str {
        match self {
            LoginUser::OAuth2 => "oauth2",
            LoginUser::Token => token,
        }
    }
}

/// Why a registry login did not succeed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginFailure {
    InvalidCredentials(String),
    Network(String),
    RateLimited(String),
    Other(String),
}

impl LoginFailure {
    /// Categorise `docker login` output.
    pub fn from_output(output: &str) -> Self {
        let lower = output.to_lowercase();
        let detail = output.trim().to_string();
        if lower.contains("toomanyrequests") || lower.contains("rate limit") {
            LoginFailure::RateLimited(detail)
        } else if lower.contains("unauthorized")
            || lower.contains("denied")
            || lower.contains("incorrect username or password")
            || lower.contains("authentication required")
        {
            LoginFailure::InvalidCredentials(detail)
        } else if lower.contains("timeout")
            || lower.contains("no such host")
            || lower.contains("connection refused")
            || lower.contains("dial tcp")
            || lower.contains("network is unreachable")
        {
            LoginFailure::Network(detail)
        } else {
            LoginFailure::Other(detail)
        }
    }
}

impl fmt::Display for LoginFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoginFailure::InvalidCredentials(d) => write!(f, "invalid credentials ({})", d),
            LoginFailure::Network(d) => write!(f, "registry unreachable ({})", d),
            LoginFailure::RateLimited(d) => write!(f, "rate limited ({})", d),
            LoginFailure::Other(d) => write!(f, "{}", d),
        }
    }
}

/// Performs a registry login through a [`RuntimeClient`].
pub struct RegistryLogin<'a> {
    runtime: &'a dyn RuntimeClient,
    registry: &'a str,
}

impl<'a> RegistryLogin<'a> {
    pub fn new(runtime: &'a dyn RuntimeClient, registry: &'a str) -> Self {
        Self { runtime, registry }
    }

    /// Try each user strategy until one succeeds. Every strategy is attempted
    /// whatever the failure; returns the user name that worked, or the last
    /// failure.
    pub fn login(&self, token: &str) -> std::result::Result<String, LoginFailure> {
        let span = info_span!("registry_login", registry = %self.registry);
        let _enter = span.enter();

        let mut last_failure = LoginFailure::Other("no login attempted".to_string());
        for strategy in LOGIN_USERS {
            let user = strategy.resolve(token);
            debug!("Attempting registry login with {:?} strategy", strategy);
            let failure = match self.runtime.login(self.registry, user, token) {
                Ok(output) if output.success() => return Ok(user.to_string()),
                Ok(output) => LoginFailure::from_output(&output.combined()),
                Err(e) => LoginFailure::Other(e.to_string()),
            };
            warn!("Registry login with {:?} strategy failed: {}", strategy, failure);
            last_failure = failure;
        }
        Err(last_failure)
    }
}
