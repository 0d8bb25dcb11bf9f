//! IPMB frame layout, constants, and checksum arithmetic
//!
//! Frame format (both directions, on the socket and on the bus):
//!
//! ```text
//! [0]    destination/source slave address (8-bit, bit 0 clear)
//! [1]    netfn << 2 | lun  (netfn bit 0 => the byte's bit 2 marks a response)
//! [2]    header checksum over bytes [0..=1]
//! [3]    source slave address
//! [4]    sequence number
//! [5]    command (responses carry the completion code at [6])
//! [6..]  data bytes
//! [last] trailing checksum over bytes [3..last]
//! ```
//!
//! Both checksums are additive mod-256: the sum of all covered bytes,
//! including the checksum itself, is zero.

mod message;
mod validate;

pub mod bridge;

pub use self::message::{
    build_request, build_response, error_response, ping_request, random_seq, Message, Origin,
};
pub use self::validate::{validate_framed, validate_raw};

/// Maximum total frame size in bytes (address byte included)
pub const MAX_PKT_SIZE: usize = 128;

/// Request header payload bytes: netfn, header checksum, master address,
/// sequence number, command
pub const REQ_HEADER_LEN: usize = 5;

/// Response header payload bytes: request header plus the completion code
pub const RSP_HEADER_LEN: usize = 6;

/// Smallest legal request payload (header + trailing checksum)
pub const MIN_REQ_PAYLOAD: usize = REQ_HEADER_LEN + 1;

/// Smallest legal response payload (header + trailing checksum)
pub const MIN_RSP_PAYLOAD: usize = RSP_HEADER_LEN + 1;

/// Smallest legal request frame (address byte + payload)
pub const MIN_REQ_FRAME: usize = 1 + MIN_REQ_PAYLOAD;

/// Bit in the netfn/lun byte that distinguishes a response from a request
pub const RESPONSE_BIT: u8 = 1 << 2;

/// Application network function
pub const NETFN_APP: u8 = 0x06;

/// Get Device ID command (used as the responder liveness probe)
pub const CMD_GET_DEVICE_ID: u8 = 0x01;

/// Send Message command (carries a bridged inner frame)
pub const CMD_SEND_MESSAGE: u8 = 0x34;

/// Source address stamped on internally generated liveness probes
pub const PING_MASTER_ADDR: u8 = 0x30;

/// Completion code: command completed normally
pub const CC_NORMAL: u8 = 0x00;
/// Completion code: node busy
pub const CC_NODE_BUSY: u8 = 0xC0;
/// Completion code: invalid or unsupported command
pub const CC_INVALID_CMD: u8 = 0xC1;
/// Completion code: timeout while processing the command
pub const CC_TIMEOUT: u8 = 0xC3;
/// Completion code: destination unavailable (no responder / dead peer)
pub const CC_DEST_UNAVAILABLE: u8 = 0xD3;

/// Two's-complement additive checksum: `checksum(covered)` appended to the
/// covered bytes makes the whole run sum to zero mod 256.
pub fn checksum(bytes: &[u8]) -> u8 {
    let sum = bytes.iter().fold(0u8, |acc, b| acc.wrapping_add(*b));
    sum.wrapping_neg()
}

/// True if the byte run (covered bytes plus stored checksum) sums to zero
pub fn sums_to_zero(bytes: &[u8]) -> bool {
    bytes.iter().fold(0u8, |acc, b| acc.wrapping_add(*b)) == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checksum_closes_run() {
        let covered = [0x24u8, 0x18];
        let ck = checksum(&covered);
        assert!(sums_to_zero(&[0x24, 0x18, ck]));
    }

    #[test]
    fn test_checksum_empty() {
        assert_eq!(checksum(&[]), 0);
        assert!(sums_to_zero(&[]));
    }

    #[test]
    fn test_checksum_wraps() {
        let covered = [0xFFu8, 0xFF, 0x02];
        let ck = checksum(&covered);
        assert!(sums_to_zero(&[0xFF, 0xFF, 0x02, ck]));
    }
}
