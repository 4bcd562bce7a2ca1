pub mod errors;
pub mod environment;
pub mod context;
pub mod source_repo;
pub mod subcontext;
pub mod plan;
pub mod harness;    // drives the real terraform CLI

/// Re-export the most-used types.
pub use context::{Context, ContextInputs, Tags};
pub use environment::EnvironmentType;
pub use errors::ContextError;
pub use plan::{Configuration, Example, Plan, State};
pub use source_repo::{GitRepoSource, StaticRepoMetadata};
pub use subcontext::{compose, primary_failover, Subcontext};
