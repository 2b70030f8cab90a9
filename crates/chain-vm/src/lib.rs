//! The boundary between the block executor and the EVM interpreter
//! (spec.md §4.4.3): error kind, gas schedule, and host-interface trait.
//! The interpreter itself is treated as a black box (spec.md §1 scope).

pub mod error;
pub mod ext;
pub mod schedule;

pub use error::Error;
pub use ext::{CallResult, ContractCode, Ext};
pub use schedule::Schedule;
