//! CRC-24Q framing checksum used by both the block log and the verify chain
//! (spec.md §4.3, §6).

use crc::{Algorithm, Crc};

/// The standard CRC-24Q parameters (as used by RTCM/QZSS), picked because
/// `crc24q` is the name spec.md §4.3 gives the framing checksum.
const CRC_24_Q: Algorithm<u32> = Algorithm {
    width: 24,
    poly: 0x00864cfb,
    init: 0x00b704ce,
    refin: false,
    refout: false,
    xorout: 0x00000000,
    check: 0x0021cf02,
    residue: 0x00000000,
};

pub fn crc24q(bytes: &[u8]) -> u32 {
    Crc::<u32>::new(&CRC_24_Q).checksum(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_check_value() {
        assert_eq!(crc24q(b"123456789"), 0x0021cf02);
    }

    #[test]
    fn differs_on_single_byte_change() {
        assert_ne!(crc24q(b"hello"), crc24q(b"hellp"));
    }
}
