//! stack-messages
//!
//! Centralized messaging for the stackctl CLI.
//! Provides the message templates and a small builder that substitutes
//! `{variable}` placeholders.

pub mod builder;
pub mod macros;
pub mod messages;

pub use builder::MessageBuilder;
pub use messages::MESSAGES;
