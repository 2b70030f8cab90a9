//! Delegate enrollment bookkeeping: the rolling `height -> delegate ->
//! diskPos` window `CDelegateDB`/`CDelegateContext` keep
//! (`original_source/src/storage/delegatedb.h`'s `mapEnrollTx`), plus the
//! enrollment certificate builder grounded on
//! `original_source/src/blockchain/consensus.h`'s
//! `CDelegateContext::BuildEnrollTx`.

use chain_types::{DataTag, Destination, DiskPos, Transaction, TxType};
use std::collections::BTreeMap;

/// Rolling index of enrollment certs seen in the last `window` heights, the
/// range `primaryUpdate` (spec.md §4.6 step 1) scans to decide who is
/// currently enrolled.
pub struct EnrollmentIndex {
    window: u32,
    by_height: BTreeMap<u32, BTreeMap<Destination, DiskPos>>,
}

impl EnrollmentIndex {
    pub fn new(window: u32) -> Self {
        EnrollmentIndex {
            window,
            by_height: BTreeMap::new(),
        }
    }

    pub fn record(&mut self, height: u32, dest: Destination, pos: DiskPos) {
        self.by_height.entry(height).or_default().insert(dest, pos);
        let floor = height.saturating_sub(self.window);
        self.by_height.retain(|&h, _| h > floor || h == 0);
    }

    /// Every delegate with a cert recorded within the window ending at
    /// `height`, matching `RetrieveEnrollTx(height, vBlockRange, ...)`.
    pub fn enrolled_as_of(&self, height: u32) -> Vec<Destination> {
        let floor = height.saturating_sub(self.window);
        let mut out: Vec<Destination> = self
            .by_height
            .range(floor..=height)
            .flat_map(|(_, m)| m.keys().copied())
            .collect();
        out.sort_by_key(|d| d.to_trie_key());
        out.dedup();
        out
    }

    pub fn cert_pos(&self, height: u32, dest: &Destination) -> Option<DiskPos> {
        self.by_height.get(&height)?.get(dest).copied()
    }
}

/// `CDelegateContext::BuildEnrollTx`: a delegate's own enrollment
/// certificate, carrying the delegate's public identity as opaque
/// `CertTxData` (the BLS/MPVSS public key material is out of scope here, the
/// same black box `agreement.rs` treats the rest of MPVSS as).
pub fn build_enroll_tx(
    delegate: Destination,
    chain_id: u32,
    nonce: u64,
    cert_data: Vec<u8>,
) -> Transaction {
    let mut data_sections = std::collections::BTreeMap::new();
    data_sections.insert(DataTag::CertTxData, cert_data);
    Transaction {
        tx_type: TxType::Cert,
        chain_id,
        nonce,
        from: delegate,
        to: None,
        amount: ethereum_types::U256::zero(),
        gas_price: ethereum_types::U256::zero(),
        gas_limit: 0,
        data_sections,
        signature: Vec::new(),
    }
}
