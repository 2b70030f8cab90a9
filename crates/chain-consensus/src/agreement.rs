//! The MPVSS (multi-party publicly-verifiable secret-sharing) agreement
//! protocol, modeled as a pluggable trait rather than the real cryptographic
//! scheme — the same seam `chain_executor::Interpreter` gives the EVM
//! bytecode interpreter (spec.md §1 lists "EVM bytecode interpreter
//! internals" as an external black box; the MPVSS math sits in exactly the
//! same place, and spec.md §9 design notes single out "the MPVSS parser" as
//! the one place foreign/non-Rust failures must be caught and converted).
//! [`NullAgreement`] is the deterministic stand-in: a distribute/publish
//! round always completes immediately, and the agreement hash is a plain
//! `keccak` over the round's inputs, so the rest of the pipeline (ballot
//! computation, `chain-manager` block admission, tests) can be exercised
//! without linking a real MPVSS implementation.

use chain_types::{keccak, Destination};
use ethereum_types::{H256, U256};
use std::collections::BTreeMap;

/// Output of `evolve` (spec.md §4.6 step 2): payloads to broadcast for
/// future heights, plus the hash committing this round's publish data.
#[derive(Debug, Clone, Default)]
pub struct EvolveOutput {
    pub distribute: BTreeMap<Destination, Vec<u8>>,
    pub publish: BTreeMap<Destination, Vec<u8>>,
    pub hash_distribute_of_publish: H256,
}

/// A completed agreement for a target height (spec.md GLOSSARY "Agreement").
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgreementResult {
    pub agreement: H256,
    pub weight: usize,
}

/// The pluggable MPVSS seam. `evolve`/`add_distribute`/`add_publish` feed a
/// round in progress; `agreement` resolves a target height once (if) enough
/// publish data has arrived.
pub trait Agreement: Send {
    fn evolve(
        &mut self,
        height: u32,
        weights: &[(Destination, U256)],
        enrolled: &[Destination],
    ) -> EvolveOutput;

    /// Returns `true` if `data` was accepted (new, from a recognized
    /// participant at this anchor).
    fn add_distribute(&mut self, anchor: H256, from: Destination, data: Vec<u8>) -> bool;

    fn add_publish(&mut self, anchor: H256, from: Destination, data: Vec<u8>) -> bool;

    fn agreement(&self, target_height: u32) -> Option<AgreementResult>;
}

/// Deterministic stand-in used until a real MPVSS implementation is linked
/// in. Every distribute/publish submission is accepted and immediately
/// completes the round for its anchor height, so `getNextConsensus` (spec.md
/// §4.6) never has to fall back to proof-of-work waiting on a slow peer set.
#[derive(Default)]
pub struct NullAgreement {
    completed: BTreeMap<u32, AgreementResult>,
}

impl Agreement for NullAgreement {
    fn evolve(
        &mut self,
        height: u32,
        weights: &[(Destination, U256)],
        enrolled: &[Destination],
    ) -> EvolveOutput {
        let mut stream = rlp::RlpStream::new();
        stream.begin_list(2 + weights.len() * 2 + enrolled.len());
        stream.append(&height);
        stream.append(&(weights.len() as u32));
        for (dest, amount) in weights {
            stream.append(&dest.to_trie_key().to_vec());
            stream.append(amount);
        }
        for dest in enrolled {
            stream.append(&dest.to_trie_key().to_vec());
        }
        let hash = keccak(&stream.out());
        let total_weight = weights.len();
        self.completed.insert(
            height,
            AgreementResult {
                agreement: hash,
                weight: total_weight,
            },
        );
        EvolveOutput {
            distribute: BTreeMap::new(),
            publish: BTreeMap::new(),
            hash_distribute_of_publish: hash,
        }
    }

    fn add_distribute(&mut self, _anchor: H256, _from: Destination, _data: Vec<u8>) -> bool {
        true
    }

    fn add_publish(&mut self, _anchor: H256, _from: Destination, _data: Vec<u8>) -> bool {
        true
    }

    fn agreement(&self, target_height: u32) -> Option<AgreementResult> {
        self.completed.get(&target_height).cloned()
    }
}

/// `protocol.delegatedBallot(...)` (spec.md §4.6 "Next-consensus query"):
/// orders `roll` by a score derived from `agreement` so the ordering is
/// unpredictable before the agreement resolves but fully deterministic once
/// it has, weighted so delegates holding a larger share of `money_supply`
/// are proportionally more likely to appear earlier.
pub fn delegated_ballot(
    agreement: H256,
    roll: &[(Destination, U256)],
    money_supply: U256,
) -> Vec<Destination> {
    let mut scored: Vec<(H256, Destination)> = roll
        .iter()
        .map(|(dest, amount)| {
            let weight = if money_supply.is_zero() {
                U256::zero()
            } else {
                amount.saturating_mul(U256::from(u32::MAX)) / money_supply
            };
            let mut stream = rlp::RlpStream::new();
            stream.begin_list(3);
            stream.append(&agreement.as_bytes().to_vec());
            stream.append(&dest.to_trie_key().to_vec());
            stream.append(&weight);
            (keccak(&stream.out()), *dest)
        })
        .collect();
    scored.sort_by(|a, b| a.0.cmp(&b.0));
    scored.into_iter().map(|(_, dest)| dest).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ethereum_types::H256 as Hash;

    fn dest(b: u8) -> Destination {
        Destination::pubkey(Hash::repeat_byte(b))
    }

    #[test]
    fn null_agreement_completes_the_round_it_evolves() {
        let mut agreement = NullAgreement::default();
        assert!(agreement.agreement(10).is_none());
        agreement.evolve(10, &[(dest(1), U256::from(100))], &[dest(1)]);
        assert!(agreement.agreement(10).is_some());
    }

    #[test]
    fn ballot_is_deterministic_for_the_same_agreement() {
        let roll = vec![(dest(1), U256::from(10)), (dest(2), U256::from(20))];
        let a = delegated_ballot(H256::repeat_byte(7), &roll, U256::from(30));
        let b = delegated_ballot(H256::repeat_byte(7), &roll, U256::from(30));
        assert_eq!(a, b);
        assert_eq!(a.len(), 2);
    }

    #[test]
    fn ballot_changes_with_a_different_agreement() {
        let roll = vec![(dest(1), U256::from(10)), (dest(2), U256::from(20))];
        let a = delegated_ballot(H256::repeat_byte(7), &roll, U256::from(30));
        let b = delegated_ballot(H256::repeat_byte(8), &roll, U256::from(30));
        assert_ne!(a, b);
    }
}
