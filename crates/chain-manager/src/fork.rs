//! Fork creation and cancellation, triggered by `TX_TOKEN` transactions to a
//! FORK template address within a primary block (spec.md §4.7 "Fork
//! creation").

use chain_types::{ChainId, DataTag, Destination, Error, Result, Transaction, TxType};
use ethereum_types::H256;
use rlp::{Rlp, RlpStream};
use std::collections::HashMap;

/// The decoded `FORK_DATA` section of a fork-registering transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForkRequest {
    pub chain_id: ChainId,
    pub name: String,
    pub origin: H256,
}

impl ForkRequest {
    fn encode(&self) -> Vec<u8> {
        let mut s = RlpStream::new();
        s.begin_list(3);
        s.append(&self.chain_id);
        s.append(&self.name.as_bytes());
        s.append(&self.origin);
        s.out().to_vec()
    }

    fn decode(bytes: &[u8]) -> Result<Self> {
        let rlp = Rlp::new(bytes);
        let name_bytes: Vec<u8> = rlp
            .val_at(1)
            .map_err(|e| Error::Invalid(format!("fork data: {e}")))?;
        Ok(ForkRequest {
            chain_id: rlp.val_at(0).map_err(|e| Error::Invalid(format!("fork data: {e}")))?,
            name: String::from_utf8(name_bytes).map_err(|_| Error::Invalid("fork name not utf8".into()))?,
            origin: rlp.val_at(2).map_err(|e| Error::Invalid(format!("fork data: {e}")))?,
        })
    }
}

/// Parses a fork registration request out of a `TX_TOKEN` transaction to a
/// FORK template address (spec.md §4.7 "the deeply-encoded origin block in
/// the tx's FORK_DATA section").
pub fn parse_fork_request(tx: &Transaction) -> Result<ForkRequest> {
    if tx.tx_type != TxType::Token {
        return Err(Error::Invalid("fork registration must be a token transaction".into()));
    }
    let section = tx
        .data_section(DataTag::ForkData)
        .ok_or_else(|| Error::Invalid("fork registration missing FORK_DATA section".into()))?;
    ForkRequest::decode(section)
}

/// Tracks registered forks by chain id and name for uniqueness checks
/// (spec.md §4.7 "chainId uniqueness, name uniqueness vs. prior fork
/// contexts").
#[derive(Default)]
pub struct ForkRegistry {
    by_chain_id: HashMap<ChainId, ForkRequest>,
    fork_address: HashMap<ChainId, Destination>,
}

impl ForkRegistry {
    pub fn new() -> Self {
        ForkRegistry::default()
    }

    pub fn is_registered(&self, chain_id: ChainId) -> bool {
        self.by_chain_id.contains_key(&chain_id)
    }

    /// Registers a new fork, rejecting a `chainId` or `name` collision with
    /// an already-registered fork.
    pub fn register(&mut self, fork_address: Destination, request: ForkRequest) -> Result<()> {
        if self.by_chain_id.contains_key(&request.chain_id) {
            return Err(Error::Invalid(format!("chain id {} already registered", request.chain_id)));
        }
        if self.by_chain_id.values().any(|r| r.name == request.name) {
            return Err(Error::Invalid(format!("fork name {:?} already registered", request.name)));
        }
        self.fork_address.insert(request.chain_id, fork_address);
        self.by_chain_id.insert(request.chain_id, request);
        Ok(())
    }

    /// Cancels a registration when its FORK address is spent from within the
    /// same block it was registered in (spec.md §4.7 "Fork registration may
    /// be cancelled by spending from the FORK address in the same block").
    pub fn cancel_if_spent(&mut self, spender: &Destination) {
        if let Some(chain_id) = self
            .fork_address
            .iter()
            .find(|(_, addr)| *addr == spender)
            .map(|(id, _)| *id)
        {
            self.fork_address.remove(&chain_id);
            self.by_chain_id.remove(&chain_id);
        }
    }

    pub fn get(&self, chain_id: ChainId) -> Option<&ForkRequest> {
        self.by_chain_id.get(&chain_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chain_types::Destination;
    use std::collections::BTreeMap;

    fn fork_tx(chain_id: ChainId, name: &str) -> Transaction {
        let request = ForkRequest { chain_id, name: name.into(), origin: H256::zero() };
        let mut sections = BTreeMap::new();
        sections.insert(DataTag::ForkData, request.encode());
        Transaction {
            tx_type: TxType::Token,
            chain_id: 0,
            nonce: 0,
            from: Destination::pubkey(H256::repeat_byte(1)),
            to: Some(Destination::template(H256::repeat_byte(2))),
            amount: Default::default(),
            gas_price: Default::default(),
            gas_limit: 0,
            data_sections: sections,
            signature: vec![],
        }
    }

    #[test]
    fn parses_a_well_formed_fork_request() {
        let tx = fork_tx(7, "sidechain");
        let request = parse_fork_request(&tx).unwrap();
        assert_eq!(request.chain_id, 7);
        assert_eq!(request.name, "sidechain");
    }

    #[test]
    fn rejects_duplicate_chain_id_and_name() {
        let mut registry = ForkRegistry::new();
        let addr1 = Destination::template(H256::repeat_byte(1));
        let addr2 = Destination::template(H256::repeat_byte(2));
        registry
            .register(addr1, ForkRequest { chain_id: 1, name: "a".into(), origin: H256::zero() })
            .unwrap();
        assert!(registry
            .register(addr2, ForkRequest { chain_id: 1, name: "b".into(), origin: H256::zero() })
            .is_err());
        assert!(registry
            .register(addr2, ForkRequest { chain_id: 2, name: "a".into(), origin: H256::zero() })
            .is_err());
    }

    #[test]
    fn spending_the_fork_address_cancels_registration() {
        let mut registry = ForkRegistry::new();
        let addr = Destination::template(H256::repeat_byte(3));
        registry
            .register(addr, ForkRequest { chain_id: 5, name: "c".into(), origin: H256::zero() })
            .unwrap();
        assert!(registry.is_registered(5));
        registry.cancel_if_spent(&addr);
        assert!(!registry.is_registered(5));
    }
}
