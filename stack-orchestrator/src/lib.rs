//! Container service lifecycle orchestration.
//!
//! Every component reaches the runtime through the [`Gateway`]; none of them
//! caches runtime state between calls.

pub mod classifier;
pub mod credentials;
pub mod gateway;
pub mod health;
pub mod network;
pub mod poll;
pub mod prompt;
pub mod update;

pub use classifier::{Classification, Classifier, Rule};
pub use credentials::CredentialChecker;
pub use gateway::{Gateway, Operation};
pub use health::{HealthEngine, HealthStatus, HealthSummary, HealthTracker};
pub use network::{NetworkReport, NetworkResolver};
pub use poll::{poll_until, Clock, ManualClock, PollPolicy, SystemClock};
pub use prompt::{AssumeNo, AssumeYes, Confirm};
pub use update::{UpdateOrchestrator, UpdatePlan, UpdateResult, UpdateState, UpdateSummary};
