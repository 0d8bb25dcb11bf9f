//! Frame validators: decide whether a byte stream is a legal request
//!
//! Only requests are accepted from these entry points; responses reaching a
//! client socket are a protocol violation and the offending connection is
//! closed by the caller.

use super::{sums_to_zero, Message, MAX_PKT_SIZE, MIN_REQ_FRAME, RESPONSE_BIT};

/// Validate a raw request frame as read off a socket
///
/// Checks length bounds, the request/response flag, slave-address parity,
/// and both additive checksums. Pure; the caller decides what to do with a
/// rejected frame.
pub fn validate_raw(frame: &[u8]) -> bool {
    if frame.len() > MAX_PKT_SIZE || frame.len() < MIN_REQ_FRAME {
        return false;
    }
    // Netfn bit marks a response; only requests enter here
    if frame[1] & RESPONSE_BIT != 0 {
        return false;
    }
    // 8-bit slave addresses are always even
    if frame[0] & 1 != 0 {
        return false;
    }
    // Header checksum covers destination, netfn, and the checksum itself
    if !sums_to_zero(&frame[..3]) {
        return false;
    }
    // Trailing checksum covers source, sequence, command, and data
    sums_to_zero(&frame[3..])
}

/// Validate an already-framed request message
///
/// Same semantics as [`validate_raw`] with the destination address carried
/// out-of-band from the payload.
pub fn validate_framed(msg: &Message) -> bool {
    let payload = msg.payload();
    if payload.len() + 1 > MAX_PKT_SIZE || payload.len() + 1 < MIN_REQ_FRAME {
        return false;
    }
    if payload[0] & RESPONSE_BIT != 0 {
        return false;
    }
    if msg.dst_addr & 1 != 0 {
        return false;
    }
    let header_sum = msg
        .dst_addr
        .wrapping_add(payload[0])
        .wrapping_add(payload[1]);
    if header_sum != 0 {
        return false;
    }
    sums_to_zero(&payload[2..])
}
