//! Misc utils

use ethers::{types::Address, utils::to_checksum};

/// Serializes an address in its EIP-55 checksum form
pub fn as_checksum_addr<S>(val: &Address, s: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    s.serialize_str(&to_checksum(val, None))
}

/// If possible, parses an address from the first 20 bytes
pub fn get_address(buf: &[u8]) -> Option<Address> {
    if buf.len() >= 20 {
        Some(Address::from_slice(&buf[0..20]))
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn address_from_short_buffer() {
        assert_eq!(get_address(&[0xab; 19]), None);
        assert_eq!(get_address(&[]), None);
    }

    #[test]
    fn address_from_prefix() {
        let buf = [vec![0x11; 20], vec![0xff; 32]].concat();
        assert_eq!(get_address(&buf), Some(Address::from_slice(&[0x11; 20])));
    }
}
