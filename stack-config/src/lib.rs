//! Configuration layer for stackctl.
//!
//! Everything here is derived fresh per invocation: the essential service
//! set, the `.env` store, the resolved [`EnvironmentContext`] and the
//! tunable [`Settings`].

pub mod context;
pub mod credentials;
pub mod env_store;
pub mod services;
pub mod settings;

pub use context::{ContextOptions, EnvironmentContext};
pub use credentials::CredentialSet;
pub use env_store::EnvStore;
pub use services::{Service, ServiceDescriptor};
pub use settings::Settings;
