//! Cascading removal of legacy users.
//!
//! The deletion graph lists every table holding rows that depend on a user,
//! children first. A purge resolves the ids the user owns, walks the graph
//! inside one transaction, deletes the user row last and commits.

pub mod error;
pub mod executor;
pub mod graph;
pub mod guard;
pub mod orchestrator;
pub mod resolver;
pub mod summary;

pub use error::{FatalReason, PurgeError};
pub use graph::{plan, validate_graph, GraphEntry, GraphError, PlanStep, DELETION_GRAPH, ROOT};
pub use orchestrator::LegacyUserPurger;
pub use summary::{PurgeSummary, StepFailure, StepOutcome};
