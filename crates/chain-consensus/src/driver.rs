//! `ConsensusDriver`: the mutable consensus state — enrollment window,
//! pluggable MPVSS [`Agreement`], and a one-entry next-consensus cache —
//! behind a single coarse lock (spec.md §5 "Consensus driver is protected by
//! a coarse mutex: `primaryUpdate`, `addNewDistribute`, `addNewPublish`,
//! `getAgreement`, `getNextConsensus` are mutually exclusive"). Grounded on
//! `original_source/src/blockchain/consensus.h`'s `CConsensus`, which wraps
//! the same operations behind a single `boost::mutex mutex`.

use crate::agreement::{delegated_ballot, Agreement, AgreementResult};
use crate::enrollment::{build_enroll_tx, EnrollmentIndex};
use crate::pow::pow_target;
use crate::view::ConsensusView;
use chain_types::{ChainConfig, Destination, Transaction};
use ethereum_types::{H256, U256};
use parking_lot::Mutex;

/// Outcome of `getNextConsensus`: either a slot ready to be produced, or
/// "wait" until `next_block_time` (spec.md §4.6 "Next-consensus query").
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NextConsensus {
    Wait { next_block_time: u64 },
    Stake { ballot: Vec<Destination>, agreement: H256, weight: usize },
    Work { target: U256 },
}

struct CachedBallot {
    tip: H256,
    ballot: Vec<Destination>,
    agreement: H256,
    weight: usize,
}

struct DriverState<A: Agreement> {
    agreement: A,
    enrollment: EnrollmentIndex,
    cache: Option<CachedBallot>,
}

pub struct ConsensusDriver<A: Agreement> {
    config: ChainConfig,
    local_delegates: Vec<Destination>,
    state: Mutex<DriverState<A>>,
}

impl<A: Agreement> ConsensusDriver<A> {
    pub fn new(config: ChainConfig, agreement: A, local_delegates: Vec<Destination>) -> Self {
        ConsensusDriver {
            local_delegates,
            state: Mutex::new(DriverState {
                agreement,
                enrollment: EnrollmentIndex::new(config.consensus_interval),
                cache: None,
            }),
            config,
        }
    }

    /// `primaryUpdate` (spec.md §4.6 steps 1-5).
    pub fn primary_update(
        &self,
        view: &dyn ConsensusView,
        tip_height: u32,
    ) -> chain_types::Result<Vec<Transaction>> {
        let mut state = self.state.lock();

        let enrolled = view.enrolled(tip_height)?;
        let roll = view.delegate_roll(tip_height)?;

        state
            .agreement
            .evolve(tip_height + 1, &roll, &enrolled);

        let elected: Vec<Destination> = roll
            .iter()
            .filter(|(dest, amount)| {
                *amount > self.config.enroll_minimum_amount
                    && enrolled.contains(dest)
                    && self.local_delegates.contains(dest)
            })
            .take(self.config.max_delegate_thresh as usize)
            .map(|(dest, _)| *dest)
            .collect();

        let mut certs = Vec::new();
        for (nonce, delegate) in elected.into_iter().enumerate() {
            certs.push(build_enroll_tx(delegate, view.config().function_contract_address_id, nonce as u64, Vec::new()));
        }
        Ok(certs)
    }

    /// `getNextConsensus` (spec.md §4.6).
    pub fn get_next_consensus(
        &self,
        view: &dyn ConsensusView,
        tip_height: u32,
        tip_hash: H256,
        tip_time: u64,
        now: u64,
        difficulty: U256,
    ) -> chain_types::Result<NextConsensus> {
        let next_block_time = tip_time + self.config.block_target_spacing;
        if now < next_block_time {
            return Ok(NextConsensus::Wait { next_block_time });
        }

        let mut state = self.state.lock();
        if let Some(cached) = &state.cache {
            if cached.tip == tip_hash {
                return Ok(NextConsensus::Stake {
                    ballot: cached.ballot.clone(),
                    agreement: cached.agreement,
                    weight: cached.weight,
                });
            }
        }

        let target_height = tip_height + 1;
        let anchor_height = tip_height.saturating_sub(self.config.consensus_distribute_interval);
        let anchor = match view.block_hash_at(anchor_height)? {
            Some(hash) => hash,
            None => return Ok(NextConsensus::Work { target: pow_target(difficulty) }),
        };
        let _ = anchor;

        match state.agreement.agreement(target_height) {
            Some(AgreementResult { agreement, weight }) => {
                let roll = view.delegate_roll(tip_height)?;
                let money_supply: U256 =
                    roll.iter().fold(U256::zero(), |acc, (_, amount)| acc.saturating_add(*amount));
                let ballot = delegated_ballot(agreement, &roll, money_supply);
                state.cache = Some(CachedBallot {
                    tip: tip_hash,
                    ballot: ballot.clone(),
                    agreement,
                    weight,
                });
                Ok(NextConsensus::Stake { ballot, agreement, weight })
            }
            None => Ok(NextConsensus::Work { target: pow_target(difficulty) }),
        }
    }

    /// `addNewDistribute`.
    pub fn add_new_distribute(&self, anchor: H256, from: Destination, data: Vec<u8>) -> bool {
        self.state.lock().agreement.add_distribute(anchor, from, data)
    }

    /// `addNewPublish`.
    pub fn add_new_publish(&self, anchor: H256, from: Destination, data: Vec<u8>) -> bool {
        self.state.lock().agreement.add_publish(anchor, from, data)
    }

    /// `getAgreement`.
    pub fn get_agreement(&self, target_height: u32) -> Option<AgreementResult> {
        self.state.lock().agreement.agreement(target_height)
    }

    pub fn record_enrollment(&self, height: u32, dest: Destination, pos: chain_types::DiskPos) {
        self.state.lock().enrollment.record(height, dest, pos);
    }
}
