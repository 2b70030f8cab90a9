//! The function contract's method table (spec.md §4.5).

use chain_types::hash::keccak;

/// One of the reserved method ids the function contract dispatches on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Selector {
    DelegateVote,
    DelegateRedeem,
    UserVote,
    UserRedeem,
    PledgeVote,
    PledgeReqRedeem,
    GetDelegateVotes,
    GetUserVotes,
    GetPledgeVotes,
    GetPledgeUnlockHeight,
    GetDelegateCount,
    GetDelegateAddress,
    GetDelegateTotalVotes,
    GetVoteUnlockHeight,
    GetPageSize,
    SetFunctionAddress,
    GetFunctionAddress,
}

const SIGNATURES: &[(Selector, &str)] = &[
    (Selector::DelegateVote, "delegateVote(bytes32,uint32,uint256)"),
    (Selector::DelegateRedeem, "delegateRedeem(bytes32,uint32,uint256)"),
    (Selector::UserVote, "userVote(bytes32,uint8,uint256)"),
    (Selector::UserRedeem, "userRedeem(bytes32,uint8,uint256)"),
    (Selector::PledgeVote, "pledgeVote(bytes32,uint8,uint32,uint64,uint256)"),
    (Selector::PledgeReqRedeem, "pledgeReqRedeem(bytes32,uint8,uint32,uint64)"),
    (Selector::GetDelegateVotes, "getDelegateVotes(bytes32)"),
    (Selector::GetUserVotes, "getUserVotes(bytes32,bytes32,uint8)"),
    (Selector::GetPledgeVotes, "getPledgeVotes(bytes32,bytes32,uint8,uint32,uint64)"),
    (Selector::GetPledgeUnlockHeight, "getPledgeUnlockHeight(bytes32,bytes32,uint8,uint32,uint64)"),
    (Selector::GetDelegateCount, "getDelegateCount()"),
    (Selector::GetDelegateAddress, "getDelegateAddress(uint32)"),
    (Selector::GetDelegateTotalVotes, "getDelegateTotalVotes()"),
    (Selector::GetVoteUnlockHeight, "getVoteUnlockHeight(bytes32,bytes32)"),
    (Selector::GetPageSize, "getPageSize()"),
    (Selector::SetFunctionAddress, "setFunctionAddress(uint32,bytes32,bool)"),
    (Selector::GetFunctionAddress, "getFunctionAddress(uint32)"),
];

fn selector_bytes(signature: &str) -> [u8; 4] {
    let hash = keccak(signature.as_bytes());
    let mut out = [0u8; 4];
    out.copy_from_slice(&hash.as_bytes()[0..4]);
    out
}

impl Selector {
    pub fn from_bytes(bytes: [u8; 4]) -> Option<Self> {
        SIGNATURES
            .iter()
            .find(|(_, sig)| selector_bytes(sig) == bytes)
            .map(|(sel, _)| *sel)
    }
}
