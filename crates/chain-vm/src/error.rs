//! VM-local error kind, folded into [`chain_types::Error`] at the
//! executor boundary the way `vm::Error` converts `ethtrie::TrieError`.

use thiserror::Error;

/// Errors a call/create into the EVM interpreter can return.
///
/// Unlike [`chain_types::Error`], these describe outcomes that belong in a
/// transaction's receipt (§4.4.1 step 6) rather than aborting block commit —
/// `OutOfGas`/`Reverted`/`InvalidCode` are ordinary execution results, not
/// framework failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    #[error("out of gas")]
    OutOfGas,
    #[error("bad jump destination {destination:#x}")]
    BadJumpDestination { destination: usize },
    #[error("bad instruction {instruction:#x}")]
    BadInstruction { instruction: u8 },
    #[error("stack underflow: wanted {wanted}, had {on_stack}")]
    StackUnderflow { wanted: usize, on_stack: usize },
    #[error("out of stack: wanted {wanted}, limit {limit}")]
    OutOfStack { wanted: usize, limit: usize },
    #[error("mutable call in static context")]
    MutableCallInStaticContext,
    #[error("invalid code to deploy as a contract")]
    InvalidCode,
    #[error("built-in failed: {0}")]
    BuiltIn(&'static str),
    #[error("internal vm error: {0}")]
    Internal(String),
    #[error("out of bounds access")]
    OutOfBounds,
    #[error("reverted")]
    Reverted,
}

pub type Result<T> = std::result::Result<T, Error>;

impl From<Error> for chain_types::Error {
    fn from(err: Error) -> Self {
        chain_types::Error::Invalid(err.to_string())
    }
}

/// Framework-level failures (a bad root, a corrupt trie node) surfacing
/// through the host interface collapse to `Internal`, the same way
/// `externalities.rs` maps a state-layer error with `.map_err(Into::into)`.
impl From<chain_types::Error> for Error {
    fn from(err: chain_types::Error) -> Self {
        Error::Internal(err.to_string())
    }
}
