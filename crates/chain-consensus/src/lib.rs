//! DPoS rotation, MPVSS agreement and the proof-of-work fallback
//! (spec.md §4.6).

pub mod agreement;
pub mod driver;
pub mod enrollment;
pub mod pow;
pub mod view;

pub use agreement::{delegated_ballot, Agreement, AgreementResult, EvolveOutput, NullAgreement};
pub use driver::{ConsensusDriver, NextConsensus};
pub use enrollment::{build_enroll_tx, EnrollmentIndex};
pub use pow::{pow_target, verify_work};
pub use view::ConsensusView;
