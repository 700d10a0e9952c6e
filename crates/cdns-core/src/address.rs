//! Address prefix masking.
//!
//! Addresses are stored in the capture after masking: bits below the
//! configured prefix length are zeroed and trailing zero bytes are
//! truncated, so a /24 IPv4 client address occupies three bytes.

use std::net::IpAddr;

/// Mask `addr` to its leading `prefix_len` bits and return the truncated
/// network-order bytes.
///
/// The result has `ceil(prefix_len / 8)` bytes; a zero-length prefix
/// yields no bytes at all. Prefix lengths beyond the address width keep
/// the whole address.
#[must_use]
pub fn mask_address(addr: &IpAddr, prefix_len: u8) -> Vec<u8> {
    let mut bytes = match addr {
        IpAddr::V4(a) => a.octets().to_vec(),
        IpAddr::V6(a) => a.octets().to_vec(),
    };

    let prefix_len = usize::from(prefix_len).min(bytes.len() * 8);
    let nbytes = (prefix_len + 7) / 8;
    bytes.truncate(nbytes);
    if nbytes > 0 {
        let keep = nbytes * 8 - prefix_len;
        bytes[nbytes - 1] &= 0xffu8.wrapping_shl(keep as u32);
    }
    bytes
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v4(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    fn v6(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    #[test]
    fn test_full_prefix_keeps_address() {
        assert_eq!(mask_address(&v4("198.51.100.5"), 32), vec![198, 51, 100, 5]);
        assert_eq!(mask_address(&v6("::1"), 128).len(), 16);
    }

    #[test]
    fn test_byte_aligned_prefix_truncates() {
        assert_eq!(mask_address(&v4("198.51.100.5"), 24), vec![198, 51, 100]);
        assert_eq!(mask_address(&v6("2001:db8::1"), 48), vec![0x20, 0x01, 0x0d, 0xb8, 0, 0]);
    }

    #[test]
    fn test_partial_byte_is_masked() {
        // /12 keeps the top 4 bits of the second octet.
        assert_eq!(mask_address(&v4("203.119.200.1"), 12), vec![203, 0x70]);
        // /1 keeps only the top bit.
        assert_eq!(mask_address(&v4("255.255.255.255"), 1), vec![0x80]);
    }

    #[test]
    fn test_zero_prefix_is_empty() {
        assert!(mask_address(&v4("198.51.100.5"), 0).is_empty());
        assert!(mask_address(&v6("2001:db8::1"), 0).is_empty());
    }

    #[test]
    fn test_result_width_and_idempotence() {
        let addr = v6("2001:db8:1234:5678:9abc:def0:1122:3344");
        for prefix in [0u8, 1, 7, 8, 9, 17, 33, 64, 65, 127, 128] {
            let masked = mask_address(&addr, prefix);
            assert_eq!(masked.len(), (usize::from(prefix) + 7) / 8);

            // Masking the masked value again changes nothing.
            let mut widened = [0u8; 16];
            widened[..masked.len()].copy_from_slice(&masked);
            let again = mask_address(&IpAddr::from(widened), prefix);
            assert_eq!(again, masked);
        }
    }

    #[test]
    fn test_overlong_prefix_clamped() {
        assert_eq!(mask_address(&v4("198.51.100.5"), 255), vec![198, 51, 100, 5]);
    }
}
