//! Relink planning and execution.
//!
//! - [`plan`]: turn resolved groups into [`RelinkAction`]s (pure)
//! - [`executor`]: apply actions link-first, or simulate them
//! - [`fs_ops`]: the filesystem primitives the executor is built on

pub mod executor;
pub mod fs_ops;
pub mod plan;

pub use executor::{
    ActionOutcome, ActionResult, ExecutionSummary, RelinkError, RelinkExecutor, RunMode,
};
pub use fs_ops::{FsOps, StdFs};
pub use plan::{action_for, PlanStats, RelinkAction, RelinkPlanner};
