//! Minimal ABI-style word encoding for the function contract's call data and
//! return values (spec.md §4.5 "4-byte selector + ABI-encoded arguments").
//!
//! Arguments are fixed 32-byte big-endian words, mirroring how Solidity's
//! calling convention packs `uint256`/`address`-shaped values; this engine
//! only needs integers, destinations and a handful of small enums, so the
//! dynamic-length encoding rules (arrays, strings) are not implemented.

use chain_types::{Destination, Error, Result};
use ethereum_types::{H256, U256};

pub const SELECTOR_LEN: usize = 4;
const WORD_LEN: usize = 32;

/// A cursor over the words following a call's 4-byte selector.
pub struct Reader<'a> {
    words: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    pub fn new(call_data: &'a [u8]) -> Result<Self> {
        if call_data.len() < SELECTOR_LEN {
            return Err(Error::Invalid("call data shorter than a selector".into()));
        }
        Ok(Reader {
            words: &call_data[SELECTOR_LEN..],
            pos: 0,
        })
    }

    pub fn selector(call_data: &'a [u8]) -> Result<[u8; 4]> {
        if call_data.len() < SELECTOR_LEN {
            return Err(Error::Invalid("call data shorter than a selector".into()));
        }
        let mut sel = [0u8; 4];
        sel.copy_from_slice(&call_data[..SELECTOR_LEN]);
        Ok(sel)
    }

    fn next_word(&mut self) -> Result<&'a [u8]> {
        let end = self.pos + WORD_LEN;
        let word = self
            .words
            .get(self.pos..end)
            .ok_or_else(|| Error::Invalid("truncated function-contract call data".into()))?;
        self.pos = end;
        Ok(word)
    }

    pub fn u256(&mut self) -> Result<U256> {
        Ok(U256::from_big_endian(self.next_word()?))
    }

    pub fn u32(&mut self) -> Result<u32> {
        let word = self.next_word()?;
        Ok(u32::from_be_bytes(word[28..32].try_into().unwrap()))
    }

    pub fn u8(&mut self) -> Result<u8> {
        let word = self.next_word()?;
        Ok(word[31])
    }

    pub fn h256(&mut self) -> Result<H256> {
        Ok(H256::from_slice(self.next_word()?))
    }

    /// A [`Destination`] packed as its 33-byte trie key, right-padded to a
    /// full word boundary (one tag byte, 32 id bytes, 31 bytes of padding).
    pub fn destination(&mut self) -> Result<Destination> {
        let tag = self.next_word()?[31];
        let id = self.h256()?;
        Destination::from_trie_key(&[&[tag][..], id.as_bytes()].concat())
            .map_err(|_| Error::Invalid("bad destination in call data".into()))
    }
}

/// Accumulates return-value words the same way `Reader` consumes them.
#[derive(Default)]
pub struct Writer {
    out: Vec<u8>,
}

impl Writer {
    pub fn new() -> Self {
        Writer::default()
    }

    pub fn push_u256(&mut self, v: U256) -> &mut Self {
        let mut word = [0u8; WORD_LEN];
        v.to_big_endian(&mut word);
        self.out.extend_from_slice(&word);
        self
    }

    pub fn push_u32(&mut self, v: u32) -> &mut Self {
        let mut word = [0u8; WORD_LEN];
        word[28..32].copy_from_slice(&v.to_be_bytes());
        self.out.extend_from_slice(&word);
        self
    }

    pub fn push_destination(&mut self, d: &Destination) -> &mut Self {
        let key = d.to_trie_key();
        let mut word = [0u8; WORD_LEN];
        word[31] = key[0];
        self.out.extend_from_slice(&word);
        self.out.extend_from_slice(&key[1..]);
        self
    }

    pub fn finish(self) -> Vec<u8> {
        self.out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn u256_round_trips() {
        let mut w = Writer::new();
        w.push_u256(U256::from(12345));
        let bytes = w.finish();
        let mut r = Reader { words: &bytes, pos: 0 };
        assert_eq!(r.u256().unwrap(), U256::from(12345));
    }

    #[test]
    fn destination_round_trips() {
        let d = Destination::template(H256::repeat_byte(7));
        let mut w = Writer::new();
        w.push_destination(&d);
        let bytes = w.finish();
        let mut r = Reader { words: &bytes, pos: 0 };
        assert_eq!(r.destination().unwrap(), d);
    }

    #[test]
    fn selector_is_first_four_bytes() {
        let call_data = [0xaa, 0xbb, 0xcc, 0xdd, 0, 0];
        assert_eq!(Reader::selector(&call_data).unwrap(), [0xaa, 0xbb, 0xcc, 0xdd]);
    }
}
