//! Per-block state transition: transaction processing, post-tx bookkeeping
//! and state-root construction (spec.md §4.4).

pub mod bloom;
pub mod cache;
pub mod executor;
pub mod ext;
pub mod interpreter;

pub use cache::{BlockCache, Roots};
pub use executor::{execute_and_verify, execute_block, ExecutionOutput};
pub use ext::ExecutorExt;
pub use interpreter::{CallParams, Interpreter, NullInterpreter};
