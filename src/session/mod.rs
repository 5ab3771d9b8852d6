//! Offline reconstruction of whole sessions.

mod assembler;
mod error;
mod graph;
mod model;

pub use assembler::{SessionAssembler, SessionLoader};
pub use error::SessionError;
pub use graph::RecordLog;
pub use model::{AgentSession, Session, ToolCall};
