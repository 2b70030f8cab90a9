//! 33-byte tagged addresses (spec.md §3.1).

use ethereum_types::H256;
use rlp::{DecoderError, Rlp, RlpStream};
use std::fmt;

/// Tag byte distinguishing the three address families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
#[repr(u8)]
pub enum DestinationPrefix {
    /// Externally-owned account controlled by a keypair.
    Pubkey = 0x01,
    /// Address derived from a template id (delegate / vote / pledge / fork templates).
    Template = 0x02,
    /// Address derived from `keccak(from, nonce)` at contract creation.
    Contract = 0x03,
}

impl DestinationPrefix {
    fn from_u8(b: u8) -> Result<Self, DecoderError> {
        match b {
            0x01 => Ok(DestinationPrefix::Pubkey),
            0x02 => Ok(DestinationPrefix::Template),
            0x03 => Ok(DestinationPrefix::Contract),
            _ => Err(DecoderError::Custom("unknown destination prefix")),
        }
    }
}

/// A 33-byte tagged address: one prefix byte plus a 32-byte identifier.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
pub struct Destination {
    prefix: DestinationPrefix,
    id: H256,
}

impl Destination {
    pub fn new(prefix: DestinationPrefix, id: H256) -> Self {
        Destination { prefix, id }
    }

    pub fn pubkey(id: H256) -> Self {
        Destination::new(DestinationPrefix::Pubkey, id)
    }

    pub fn template(id: H256) -> Self {
        Destination::new(DestinationPrefix::Template, id)
    }

    pub fn contract(id: H256) -> Self {
        Destination::new(DestinationPrefix::Contract, id)
    }

    pub fn prefix(&self) -> DestinationPrefix {
        self.prefix
    }

    pub fn id(&self) -> &H256 {
        &self.id
    }

    pub fn is_contract(&self) -> bool {
        self.prefix == DestinationPrefix::Contract
    }

    pub fn is_template(&self) -> bool {
        self.prefix == DestinationPrefix::Template
    }

    pub fn is_pubkey(&self) -> bool {
        self.prefix == DestinationPrefix::Pubkey
    }

    /// Serializes as the trie key bytes: the canonical 33-byte form.
    pub fn to_trie_key(&self) -> [u8; 33] {
        let mut out = [0u8; 33];
        out[0] = self.prefix as u8;
        out[1..].copy_from_slice(self.id.as_bytes());
        out
    }

    pub fn from_trie_key(bytes: &[u8]) -> Result<Self, DecoderError> {
        if bytes.len() != 33 {
            return Err(DecoderError::Custom("destination must be 33 bytes"));
        }
        Ok(Destination {
            prefix: DestinationPrefix::from_u8(bytes[0])?,
            id: H256::from_slice(&bytes[1..]),
        })
    }
}

impl fmt::Debug for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}:{:#x}", self.prefix, self.id)
    }
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02x}{:x}", self.prefix as u8, self.id)
    }
}

impl rlp::Encodable for Destination {
    fn rlp_append(&self, s: &mut RlpStream) {
        s.append(&self.to_trie_key().to_vec());
    }
}

impl rlp::Decodable for Destination {
    fn decode(rlp: &Rlp) -> Result<Self, DecoderError> {
        let bytes: Vec<u8> = rlp.as_val()?;
        Destination::from_trie_key(&bytes)
    }
}
