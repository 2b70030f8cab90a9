//! A 2048-bit log bloom accumulated per block (spec.md §3.2 `bloomData`,
//! §4.4.1 step 6 "bloom bits"). Three bits per keccak'd item, the common
//! construction used to make membership tests cheap without a full scan.

use chain_types::{keccak, LogEntry};

pub const BLOOM_BYTES: usize = 256;

pub fn new_bloom() -> Vec<u8> {
    vec![0u8; BLOOM_BYTES]
}

fn set_bits(bloom: &mut [u8], data: &[u8]) {
    let hash = keccak(data);
    for i in [0usize, 2, 4] {
        let bit = ((hash[i] as usize) << 8 | hash[i + 1] as usize) & 0x7ff;
        let byte_index = BLOOM_BYTES - 1 - bit / 8;
        bloom[byte_index] |= 1 << (bit % 8);
    }
}

pub fn add_log(bloom: &mut [u8], log: &LogEntry) {
    set_bits(bloom, &log.address.to_trie_key());
    for topic in &log.topics {
        set_bits(bloom, topic.as_bytes());
    }
}

pub fn merge(into: &mut [u8], other: &[u8]) {
    for (a, b) in into.iter_mut().zip(other.iter()) {
        *a |= b;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chain_types::Destination;
    use ethereum_types::H256;

    #[test]
    fn adding_a_log_sets_at_least_one_bit() {
        let mut bloom = new_bloom();
        let log = LogEntry {
            address: Destination::contract(H256::repeat_byte(1)),
            topics: vec![H256::repeat_byte(2)],
            data: vec![],
        };
        add_log(&mut bloom, &log);
        assert!(bloom.iter().any(|b| *b != 0));
    }
}
