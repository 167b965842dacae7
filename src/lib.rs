//! Multi-agent functional testing pipeline for web games.
//!
//! A planner proposes candidate test cases from a game description (via an
//! external generation endpoint, with built-in fallback templates), a ranker
//! orders them deterministically, an executor drives each case against its
//! own browser session, and the orchestrator ties the phases together and
//! assembles an immutable [`model::RunReport`].

pub mod browser;
pub mod executor;
pub mod generation;
pub mod model;
pub mod orchestrator;
pub mod planner;
pub mod ranker;
pub mod report;

pub use model::{ExecutionResult, RunReport, TestCase};
pub use orchestrator::{Orchestrator, RunConfig, RunError};
pub use planner::Planner;
