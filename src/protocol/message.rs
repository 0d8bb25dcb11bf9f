//! The message unit moved through every queue and the correlation store

use super::{
    checksum, CMD_GET_DEVICE_ID, MAX_PKT_SIZE, NETFN_APP, PING_MASTER_ADDR, RESPONSE_BIT,
};
use crate::error::{Error, Result};

/// Payload byte offsets shared by requests and responses
const OFF_NETFN: usize = 0;
const OFF_SOURCE: usize = 2;
const OFF_SEQ: usize = 3;
const OFF_CMD: usize = 4;
/// Responses carry the completion code right after the command byte
const OFF_COMPCODE: usize = 5;

/// Who is waiting for the reply to a message
///
/// The wire carries no connection identity, so the origin rides alongside
/// the frame in-process. `Ping` marks the internally generated liveness
/// probe whose reply must be discarded rather than routed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    /// A registered socket connection, by resource-slot index
    Client(usize),
    /// The bus itself; no socket is waiting
    Bus,
    /// Internally generated responder liveness probe
    Ping,
}

impl Origin {
    /// True for origins backed by a socket resource slot
    pub fn is_socket(&self) -> bool {
        matches!(self, Origin::Client(_))
    }
}

/// One IPMB message: destination address plus raw protocol payload
///
/// Copied by value into queues and the correlation store; each copy is
/// independent.
#[derive(Debug, Clone, Copy)]
pub struct Message {
    pub origin: Origin,
    /// 8-bit destination slave address (carried out-of-band from the payload)
    pub dst_addr: u8,
    payload: [u8; MAX_PKT_SIZE],
    len: usize,
}

impl Message {
    /// Build a message from destination address and payload bytes
    pub fn new(origin: Origin, dst_addr: u8, payload: &[u8]) -> Result<Self> {
        if payload.is_empty() || payload.len() >= MAX_PKT_SIZE {
            return Err(Error::InvalidPacket(format!(
                "payload length {} out of range",
                payload.len()
            )));
        }
        let mut buf = [0u8; MAX_PKT_SIZE];
        buf[..payload.len()].copy_from_slice(payload);
        Ok(Self {
            origin,
            dst_addr,
            payload: buf,
            len: payload.len(),
        })
    }

    /// Build a message from a complete frame (leading address byte included)
    pub fn from_frame(origin: Origin, frame: &[u8]) -> Result<Self> {
        if frame.len() < 2 || frame.len() > MAX_PKT_SIZE {
            return Err(Error::InvalidPacket(format!(
                "frame length {} out of range",
                frame.len()
            )));
        }
        Self::new(origin, frame[0], &frame[1..])
    }

    /// Payload bytes (everything after the address byte)
    pub fn payload(&self) -> &[u8] {
        &self.payload[..self.len]
    }

    /// Number of valid payload bytes
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Serialize back into wire form: address byte followed by the payload
    pub fn to_frame(&self) -> Vec<u8> {
        let mut frame = Vec::with_capacity(self.len + 1);
        frame.push(self.dst_addr);
        frame.extend_from_slice(self.payload());
        frame
    }

    /// Raw netfn/lun byte
    pub fn netfn_byte(&self) -> u8 {
        self.byte_at(OFF_NETFN)
    }

    /// True if the netfn marks this payload as a response
    pub fn is_response(&self) -> bool {
        self.netfn_byte() & RESPONSE_BIT != 0
    }

    /// Source slave address (master address on requests)
    pub fn source_addr(&self) -> u8 {
        self.byte_at(OFF_SOURCE)
    }

    /// Sequence number
    pub fn seq_num(&self) -> u8 {
        self.byte_at(OFF_SEQ)
    }

    /// Command byte
    pub fn command(&self) -> u8 {
        self.byte_at(OFF_CMD)
    }

    /// Completion code; only meaningful on responses
    pub fn completion_code(&self) -> u8 {
        self.byte_at(OFF_COMPCODE)
    }

    fn byte_at(&self, off: usize) -> u8 {
        self.payload().get(off).copied().unwrap_or(0)
    }
}

/// Craft a request frame with both checksums computed
///
/// Fails when `data` pushes the frame past [`MAX_PKT_SIZE`].
pub fn build_request(
    origin: Origin,
    dst_addr: u8,
    netfn_byte: u8,
    master_addr: u8,
    seq: u8,
    command: u8,
    data: &[u8],
) -> Result<Message> {
    let mut payload = Vec::with_capacity(super::MIN_REQ_PAYLOAD + data.len());
    payload.push(netfn_byte);
    payload.push(checksum(&[dst_addr, netfn_byte]));
    payload.push(master_addr);
    payload.push(seq);
    payload.push(command);
    payload.extend_from_slice(data);
    payload.push(checksum(&payload[2..]));
    Message::new(origin, dst_addr, &payload)
}

/// Craft a response frame with both checksums computed
///
/// Fails when `data` pushes the frame past [`MAX_PKT_SIZE`].
#[allow(clippy::too_many_arguments)]
pub fn build_response(
    origin: Origin,
    dst_addr: u8,
    netfn_byte: u8,
    slave_addr: u8,
    seq: u8,
    command: u8,
    completion: u8,
    data: &[u8],
) -> Result<Message> {
    let mut payload = Vec::with_capacity(super::MIN_RSP_PAYLOAD + data.len());
    payload.push(netfn_byte);
    payload.push(checksum(&[dst_addr, netfn_byte]));
    payload.push(slave_addr);
    payload.push(seq);
    payload.push(command);
    payload.push(completion);
    payload.extend_from_slice(data);
    payload.push(checksum(&payload[2..]));
    Message::new(origin, dst_addr, &payload)
}

/// Recraft a request as an error response carrying the given completion code
///
/// The synthesized reply travels back to the original requester: it is
/// addressed to the request's source, claims to come from the slave the
/// request targeted, and echoes sequence number and command so the
/// correlation store can marry it to the outstanding request.
pub fn error_response(request: &Message, completion: u8) -> Message {
    // Carries no data; a header-plus-checksum frame always fits
    build_response(
        Origin::Bus,
        request.source_addr(),
        request.netfn_byte() | RESPONSE_BIT,
        request.dst_addr,
        request.seq_num(),
        request.command(),
        completion,
        &[],
    )
    .expect("header-only frame fits")
}

/// Craft the responder liveness probe: a Get Device ID request that is
/// dropped on reply, distinguished in-process by `Origin::Ping`
pub fn ping_request(local_addr: u8, seq: u8) -> Message {
    build_request(
        Origin::Ping,
        local_addr,
        NETFN_APP << 2 | 1,
        PING_MASTER_ADDR,
        seq,
        CMD_GET_DEVICE_ID,
        &[],
    )
    .expect("header-only frame fits")
}

/// Pseudo-random sequence number for internally crafted frames
pub fn random_seq() -> u8 {
    rand::random()
}
