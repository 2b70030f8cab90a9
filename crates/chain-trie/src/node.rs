//! Trie node variants (spec.md §4.1).
//!
//! `Branch` is a 16-ary radix node carrying an optional value at each nibble
//! plus an optional value at the branch itself; `Extension` compresses a
//! shared path; `Value` is a terminal payload. Nodes are content-addressed:
//! `canonicalHash()` is the key a node is stored and read back under
//! (spec.md §4.1 "Correctness").
//!
//! Encoding is RLP, modeled on `patricia-trie-ethereum`'s branch/extension/leaf
//! layout (SPEC_FULL.md §"Trie node RLP encoding"). This encoding has no
//! compatibility goal with any existing Ethereum trie; it exists only to make
//! node hashing well-defined.

use ethereum_types::H256;
use rlp::{DecoderError, Rlp, RlpStream};

/// Number of child slots in a [`Node::Branch`].
pub const BRANCH_WIDTH: usize = 16;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Branch {
        next: [Option<H256>; BRANCH_WIDTH],
        value: Option<H256>,
    },
    Extension {
        key_nibbles: Vec<u8>,
        next: Option<H256>,
        value: Option<H256>,
    },
    Value {
        bytes: Vec<u8>,
    },
}

impl Node {
    pub fn empty_branch() -> Self {
        Node::Branch {
            next: [None; BRANCH_WIDTH],
            value: None,
        }
    }

    /// Serializes the node and hashes it with the engine's domain hash. This
    /// is the key under which [`super::db::TrieDb`] stores and later
    /// verifies the node (spec.md §4.1 "Correctness").
    pub fn canonical_hash(&self) -> H256 {
        crate::keccak(&self.encode())
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut stream = RlpStream::new();
        match self {
            Node::Branch { next, value } => {
                stream.begin_list(18);
                stream.append(&0u8); // tag: branch
                for slot in next {
                    append_opt_hash(&mut stream, slot);
                }
                append_opt_hash(&mut stream, value);
            }
            Node::Extension {
                key_nibbles,
                next,
                value,
            } => {
                stream.begin_list(4);
                stream.append(&1u8); // tag: extension
                stream.append(&key_nibbles.clone());
                append_opt_hash(&mut stream, next);
                append_opt_hash(&mut stream, value);
            }
            Node::Value { bytes } => {
                stream.begin_list(2);
                stream.append(&2u8); // tag: value
                stream.append(&bytes.clone());
            }
        }
        stream.out().to_vec()
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, DecoderError> {
        let rlp = Rlp::new(bytes);
        let tag: u8 = rlp.val_at(0)?;
        match tag {
            0 => {
                let mut next = [None; BRANCH_WIDTH];
                for (i, slot) in next.iter_mut().enumerate() {
                    *slot = read_opt_hash(&rlp, 1 + i)?;
                }
                let value = read_opt_hash(&rlp, 17)?;
                Ok(Node::Branch { next, value })
            }
            1 => {
                let key_nibbles: Vec<u8> = rlp.val_at(1)?;
                let next = read_opt_hash(&rlp, 2)?;
                let value = read_opt_hash(&rlp, 3)?;
                Ok(Node::Extension {
                    key_nibbles,
                    next,
                    value,
                })
            }
            2 => {
                let bytes: Vec<u8> = rlp.val_at(1)?;
                Ok(Node::Value { bytes })
            }
            _ => Err(DecoderError::Custom("unknown trie node tag")),
        }
    }
}

fn append_opt_hash(stream: &mut RlpStream, slot: &Option<H256>) {
    match slot {
        Some(h) => {
            stream.append(&h.as_bytes());
        }
        None => {
            stream.append_empty_data();
        }
    }
}

fn read_opt_hash(rlp: &Rlp, index: usize) -> Result<Option<H256>, DecoderError> {
    let item = rlp.at(index)?;
    if item.is_empty() {
        Ok(None)
    } else {
        let bytes: Vec<u8> = item.as_val()?;
        if bytes.len() != 32 {
            return Err(DecoderError::Custom("expected 32-byte hash"));
        }
        Ok(Some(H256::from_slice(&bytes)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn branch_round_trips_through_encoding() {
        let mut next = [None; BRANCH_WIDTH];
        next[3] = Some(H256::repeat_byte(9));
        let node = Node::Branch {
            next,
            value: Some(H256::repeat_byte(1)),
        };
        let decoded = Node::decode(&node.encode()).unwrap();
        assert_eq!(node, decoded);
    }

    #[test]
    fn extension_round_trips_through_encoding() {
        let node = Node::Extension {
            key_nibbles: vec![1, 2, 3],
            next: Some(H256::repeat_byte(4)),
            value: None,
        };
        let decoded = Node::decode(&node.encode()).unwrap();
        assert_eq!(node, decoded);
    }

    #[test]
    fn value_round_trips_through_encoding() {
        let node = Node::Value {
            bytes: vec![9, 9, 9],
        };
        let decoded = Node::decode(&node.encode()).unwrap();
        assert_eq!(node, decoded);
    }

    #[test]
    fn distinct_nodes_hash_differently() {
        let a = Node::Value { bytes: vec![1] };
        let b = Node::Value { bytes: vec![2] };
        assert_ne!(a.canonical_hash(), b.canonical_hash());
    }
}
