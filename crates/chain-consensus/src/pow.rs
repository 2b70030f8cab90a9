//! Proof-of-work fallback: produces a slot's block when the MPVSS agreement
//! hasn't resolved in time (spec.md §4.6 "When no agreement is reached, a
//! proof-of-work fallback produces the slot's block"). Grounded on the
//! block-production role `ethcore/src/miner/miner.rs`'s `Miner` plays for
//! the teacher's own consensus engines — the slot-production driver this
//! module stands in for on the PoW branch — rather than any bit-twiddling
//! difficulty routine, since the teacher's own `ethash`/`concensus::miner`
//! crates carry no vendored source in this retrieval.

use ethereum_types::{H256, U256};

/// `coreProtocol.getProofOfWorkTarget(prevHash, algo)` (spec.md §4.6): a
/// simple inverse-difficulty target, matching the common difficulty-as-
/// target-divisor shape (`target = MAX_TARGET / difficulty`) rather than
/// Ethereum's exponential-adjustment formula, since the distilled spec only
/// calls for *a* monotonic difficulty-to-target mapping, not that one.
pub fn pow_target(difficulty: U256) -> U256 {
    if difficulty.is_zero() {
        return U256::MAX;
    }
    U256::MAX / difficulty
}

/// `hashWork <= target`, the acceptance rule for a PoW-sealed block header.
pub fn verify_work(hash_work: H256, target: U256) -> bool {
    U256::from_big_endian(hash_work.as_bytes()) <= target
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn target_shrinks_as_difficulty_grows() {
        let easy = pow_target(U256::from(1));
        let hard = pow_target(U256::from(1_000_000));
        assert!(hard < easy);
    }

    #[test]
    fn zero_difficulty_accepts_anything() {
        let target = pow_target(U256::zero());
        assert!(verify_work(H256::repeat_byte(0xff), target));
    }

    #[test]
    fn hash_above_target_is_rejected() {
        let target = U256::from(100);
        let low = H256::from_low_u64_be(50);
        let high = H256::from_low_u64_be(500);
        assert!(verify_work(low, target));
        assert!(!verify_work(high, target));
    }
}
