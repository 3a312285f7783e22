//! Session orchestrator for the syllabus analysis workflow.
//!
//! The orchestrator drives one session through its steps:
//! - **Upload**: submit a source URL, creating a discovery/download job
//! - **Download**: poll until the backend finished downloading, then wait for the user
//! - **Metadata**: pick the fields to extract
//! - **Extract**: poll until extraction finished, then load results
//! - **Results**: run library matching when reading materials were extracted
//!
//! State transitions live in [`machine`] as a pure reducer; [`SessionOrchestrator`]
//! runs the background tasks around it.

mod config;
pub mod machine;
mod runner;
mod types;

pub use config::OrchestratorConfig;
pub use machine::{Effect, SessionEvent};
pub use runner::SessionOrchestrator;
pub use types::{
    ErrorKind, MatchingStatus, OrchestratorError, PollKind, PollToken, SessionState, SessionView,
    Step, StepError,
};
