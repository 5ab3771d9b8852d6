//! Claude Session Tail - tailing and reconstruction of Claude Code session logs.

pub mod config;
pub mod display;
pub mod session;
pub mod stores;
pub mod watcher;
