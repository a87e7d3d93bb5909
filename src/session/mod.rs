//! Session - the tutoring conversation
//!
//! Contains:
//! - SessionEngine: per-learner state machine behind `handle_message`
//! - SessionState / SessionPhase: in-memory conversation state
//! - parse_command: control words such as `exit`, `skip` and `path <name>`

pub mod commands;
pub mod engine;
pub mod state;

pub use commands::{parse_command, Command};
pub use engine::{
    target_difficulty, Feedback, Notice, Reply, SessionConfig, SessionEngine, SessionStatus,
};
pub use state::{PendingItem, SessionPhase, SessionState};
