//! Connection resource table
//!
//! Fixed pool of connection slots shared by every server thread. At most
//! one slot at a time may hold the responder; everything else registers as
//! a client. Slot indices double as the socket identity carried in
//! [`Origin::Client`](crate::protocol::Origin::Client), so a slot is only
//! reused after its connection has been fully released.

use crate::error::{Error, Result};
use log::debug;
use parking_lot::Mutex;
use std::net::TcpStream;
use std::sync::atomic::{AtomicU8, Ordering};

/// What a connection registered as
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Client,
    Responder,
}

struct TableInner {
    slots: Vec<Option<TcpStream>>,
    responder: Option<usize>,
}

/// Thread-safe registry of live connections
pub struct ConnectionTable {
    inner: Mutex<TableInner>,
    ping_seq: AtomicU8,
}

impl ConnectionTable {
    /// Create a table with `capacity` connection slots
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(TableInner {
                slots: (0..capacity).map(|_| None).collect(),
                responder: None,
            }),
            ping_seq: AtomicU8::new(0),
        }
    }

    /// Claim a free slot for a newly registered connection
    ///
    /// A second responder is refused with [`Error::ResponderBusy`] while
    /// the current one still holds its slot; a full table refuses with
    /// [`Error::NoSlotAvailable`].
    pub fn reserve(&self, role: Role, stream: &TcpStream) -> Result<usize> {
        let mut inner = self.inner.lock();
        if role == Role::Responder && inner.responder.is_some() {
            return Err(Error::ResponderBusy);
        }
        let slot = inner
            .slots
            .iter()
            .position(|s| s.is_none())
            .ok_or(Error::NoSlotAvailable)?;
        inner.slots[slot] = Some(stream.try_clone()?);
        if role == Role::Responder {
            inner.responder = Some(slot);
        }
        debug!("Reserved slot {} for {:?}", slot, role);
        Ok(slot)
    }

    /// Free a slot, clearing the responder marker if it pointed there
    ///
    /// The caller is responsible for flushing the correlation store of
    /// requests still naming this slot.
    pub fn release(&self, slot: usize) {
        let mut inner = self.inner.lock();
        if slot < inner.slots.len() {
            inner.slots[slot] = None;
        }
        if inner.responder == Some(slot) {
            inner.responder = None;
        }
        debug!("Released slot {}", slot);
    }

    /// Slot currently registered as the responder, if any
    pub fn responder_slot(&self) -> Option<usize> {
        self.inner.lock().responder
    }

    /// Independent handle onto a slot's socket
    pub fn socket(&self, slot: usize) -> Option<TcpStream> {
        let inner = self.inner.lock();
        inner
            .slots
            .get(slot)
            .and_then(|s| s.as_ref())
            .and_then(|s| s.try_clone().ok())
    }

    /// Number of occupied slots
    pub fn active(&self) -> usize {
        self.inner.lock().slots.iter().filter(|s| s.is_some()).count()
    }

    /// Monotonic sequence number for responder liveness probes
    pub fn next_ping_seq(&self) -> u8 {
        self.ping_seq.fetch_add(1, Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;

    fn socket_pair() -> (TcpStream, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let client = TcpStream::connect(addr).unwrap();
        let (server, _) = listener.accept().unwrap();
        (client, server)
    }

    #[test]
    fn test_reserve_and_release() {
        let table = ConnectionTable::new(2);
        let (_c1, s1) = socket_pair();
        let (_c2, s2) = socket_pair();

        let a = table.reserve(Role::Client, &s1).unwrap();
        let b = table.reserve(Role::Client, &s2).unwrap();
        assert_ne!(a, b);
        assert_eq!(table.active(), 2);

        table.release(a);
        assert_eq!(table.active(), 1);
        let (_c3, s3) = socket_pair();
        assert_eq!(table.reserve(Role::Client, &s3).unwrap(), a);
    }

    #[test]
    fn test_table_full() {
        let table = ConnectionTable::new(1);
        let (_c1, s1) = socket_pair();
        let (_c2, s2) = socket_pair();

        table.reserve(Role::Client, &s1).unwrap();
        assert!(matches!(
            table.reserve(Role::Client, &s2),
            Err(Error::NoSlotAvailable)
        ));
    }

    #[test]
    fn test_single_responder() {
        let table = ConnectionTable::new(4);
        let (_c1, s1) = socket_pair();
        let (_c2, s2) = socket_pair();

        let slot = table.reserve(Role::Responder, &s1).unwrap();
        assert_eq!(table.responder_slot(), Some(slot));
        assert!(matches!(
            table.reserve(Role::Responder, &s2),
            Err(Error::ResponderBusy)
        ));

        // A client may still register alongside the responder
        let client = table.reserve(Role::Client, &s2).unwrap();
        assert_ne!(client, slot);

        table.release(slot);
        assert_eq!(table.responder_slot(), None);
        let (_c3, s3) = socket_pair();
        table.reserve(Role::Responder, &s3).unwrap();
    }

    #[test]
    fn test_socket_handle_is_live() {
        use std::io::{Read, Write};

        let table = ConnectionTable::new(1);
        let (mut client, server) = socket_pair();
        let slot = table.reserve(Role::Client, &server).unwrap();

        let mut handle = table.socket(slot).unwrap();
        handle.write_all(b"hi").unwrap();
        let mut buf = [0u8; 2];
        client.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"hi");

        table.release(slot);
        assert!(table.socket(slot).is_none());
    }

    #[test]
    fn test_ping_seq_increments() {
        let table = ConnectionTable::new(1);
        let a = table.next_ping_seq();
        let b = table.next_ping_seq();
        assert_eq!(b, a.wrapping_add(1));
    }
}
