//! Bridged ("send message") framing
//!
//! A request for a target beyond the immediate bus wraps a complete inner
//! frame inside the data portion of an outer NetFn App / Send Message
//! request. The inner frame carries its own address/checksum header and its
//! own trailing checksum; the mux core routes the outer frame and treats
//! the inner bytes as opaque data.
//!
//! ```text
//! inner: [channel] [target addr] [netfn] [hdr cksum] [requester addr]
//!        [seq] [command] [0..N data] [trailing cksum]
//! ```

use super::{checksum, sums_to_zero, Message, Origin, CMD_SEND_MESSAGE, NETFN_APP};
use crate::error::{Error, Result};

/// Channel byte used when the caller does not name one (track the current
/// bus behind the bridge)
pub const DEFAULT_CHANNEL: u8 = 0x41;

/// Inner frame bytes before data: channel, target, netfn, header checksum,
/// requester, sequence, command
const INNER_HEADER_LEN: usize = 7;

/// One bridged request targeting a device behind a bridge BMC
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgedRequest {
    pub channel: u8,
    /// Slave address of the final target (bit 0 clear)
    pub target_addr: u8,
    /// Raw netfn/lun byte of the inner request
    pub netfn_byte: u8,
    /// Slave address the bridged response should return to
    pub requester_addr: u8,
    pub seq: u8,
    pub command: u8,
    pub data: Vec<u8>,
}

impl BridgedRequest {
    /// Serialize the inner frame, computing both inner checksums
    pub fn encode(&self) -> Vec<u8> {
        let mut inner = Vec::with_capacity(INNER_HEADER_LEN + self.data.len() + 1);
        inner.push(self.channel);
        inner.push(self.target_addr);
        inner.push(self.netfn_byte);
        inner.push(checksum(&[self.target_addr, self.netfn_byte]));
        inner.push(self.requester_addr);
        inner.push(self.seq);
        inner.push(self.command);
        inner.extend_from_slice(&self.data);
        inner.push(checksum(&inner[4..]));
        inner
    }

    /// Parse and checksum-validate an inner frame
    pub fn decode(inner: &[u8]) -> Result<Self> {
        if inner.len() < INNER_HEADER_LEN + 1 {
            return Err(Error::InvalidPacket(format!(
                "bridged frame too short ({} bytes)",
                inner.len()
            )));
        }
        if inner[1] & 1 != 0 {
            return Err(Error::InvalidParameter(format!(
                "bridged target address {:#04x} is odd",
                inner[1]
            )));
        }
        if !sums_to_zero(&inner[1..4]) {
            let expected = checksum(&inner[1..3]);
            return Err(Error::ChecksumError {
                expected,
                actual: inner[3],
            });
        }
        if !sums_to_zero(&inner[4..]) {
            let expected = checksum(&inner[4..inner.len() - 1]);
            return Err(Error::ChecksumError {
                expected,
                actual: inner[inner.len() - 1],
            });
        }
        Ok(Self {
            channel: inner[0],
            target_addr: inner[1],
            netfn_byte: inner[2],
            requester_addr: inner[4],
            seq: inner[5],
            command: inner[6],
            data: inner[INNER_HEADER_LEN..inner.len() - 1].to_vec(),
        })
    }
}

/// Wrap a bridged request in its outer Send Message frame
///
/// Fails when the inner frame is too large to ride in one outer frame.
pub fn send_message(
    origin: Origin,
    bridge_addr: u8,
    master_addr: u8,
    seq: u8,
    bridged: &BridgedRequest,
) -> Result<Message> {
    super::message::build_request(
        origin,
        bridge_addr,
        NETFN_APP << 2,
        master_addr,
        seq,
        CMD_SEND_MESSAGE,
        &bridged.encode(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{random_seq, validate_framed, MIN_REQ_PAYLOAD};

    fn sample() -> BridgedRequest {
        BridgedRequest {
            channel: DEFAULT_CHANNEL,
            target_addr: 0x2C,
            netfn_byte: 0x04 << 2,
            requester_addr: 0x24,
            seq: 0x15,
            command: 0x2D,
            data: vec![0x01, 0x02],
        }
    }

    #[test]
    fn test_encode_decode_round_trip() {
        let bridged = sample();
        let inner = bridged.encode();
        assert_eq!(BridgedRequest::decode(&inner).unwrap(), bridged);
    }

    #[test]
    fn test_inner_checksums_close() {
        let inner = sample().encode();
        assert!(sums_to_zero(&inner[1..4]));
        assert!(sums_to_zero(&inner[4..]));
    }

    #[test]
    fn test_corrupt_inner_rejected() {
        let mut inner = sample().encode();
        inner[5] ^= 0x10;
        assert!(BridgedRequest::decode(&inner).is_err());
    }

    #[test]
    fn test_outer_frame_is_valid_send_message() {
        let bridged = sample();
        let outer = send_message(Origin::Client(0), 0x24, 0x10, 0x44, &bridged).unwrap();
        assert!(validate_framed(&outer));
        assert_eq!(outer.command(), CMD_SEND_MESSAGE);
        assert_eq!(outer.netfn_byte(), NETFN_APP << 2);

        // The inner frame rides in the data section untouched
        let payload = outer.payload();
        let inner = &payload[MIN_REQ_PAYLOAD - 1..payload.len() - 1];
        assert_eq!(BridgedRequest::decode(inner).unwrap(), bridged);
    }

    #[test]
    fn test_crafting_with_generated_sequence() {
        let mut bridged = sample();
        bridged.seq = random_seq();
        let outer = send_message(Origin::Client(0), 0x24, 0x10, random_seq(), &bridged).unwrap();
        assert!(validate_framed(&outer));

        let payload = outer.payload();
        let inner =
            BridgedRequest::decode(&payload[MIN_REQ_PAYLOAD - 1..payload.len() - 1]).unwrap();
        assert_eq!(inner.seq, bridged.seq);
    }

    #[test]
    fn test_oversized_inner_frame_rejected() {
        let mut bridged = sample();
        bridged.data = vec![0u8; 200];
        assert!(send_message(Origin::Client(0), 0x24, 0x10, 0x44, &bridged).is_err());
    }
}
