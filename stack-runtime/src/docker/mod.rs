//! Docker CLI implementation of [`RuntimeClient`](crate::RuntimeClient).

mod client;
mod command;
mod compose;

pub use client::{parse_network_inspect, parse_ps_lines, DockerClient, COMPOSE_PROJECT_LABEL};
pub use command::DockerCommand;
pub use compose::ComposeCommand;
