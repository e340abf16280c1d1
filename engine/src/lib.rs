//! Library half of the engine binary: everything `main.rs` wires up,
//! exposed so the workspace-level integration suite under `tests/` can
//! drive a real boot sequence the same way the running daemon does.

pub mod boot;
pub mod config;
pub mod executors;
pub mod heartbeat;
pub mod http;
pub mod jobs;
pub mod state;
