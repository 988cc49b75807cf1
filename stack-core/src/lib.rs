pub mod command_stream;
pub mod error;
pub mod file_system;
pub mod output_macros;

pub use command_stream::CapturedOutput;
pub use error::{FailureKind, Result, StackError};
