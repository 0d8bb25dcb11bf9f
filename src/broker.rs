//! Request/response correlation store ("marriage broker")
//!
//! Every request forwarded toward the bus or the local responder is parked
//! here until its reply comes back. A reply claims its request by matching
//! source against the request's destination, netfn (response flag masked
//! off), and command; an exact sequence-number match wins, otherwise the
//! oldest plausible request does. The claimed request's origin tells the
//! router which socket, if any, is waiting for the reply.

use crate::error::{Error, Result};
use crate::protocol::{validate_framed, Message, Origin, RESPONSE_BIT};
use parking_lot::Mutex;

/// Netfn with the lun and response flag stripped, for request/reply compare
fn netfn_class(netfn_byte: u8) -> u8 {
    (netfn_byte >> 2) & !1
}

/// Thread-safe store of outstanding requests awaiting replies
pub struct Broker {
    chain: Mutex<Vec<Message>>,
}

impl Broker {
    pub fn new() -> Self {
        Self {
            chain: Mutex::new(Vec::new()),
        }
    }

    /// Park a request until its reply arrives
    ///
    /// The request must be a well-formed frame; a malformed one would never
    /// be claimable and would pin its slot forever.
    pub fn post(&self, request: &Message) -> Result<()> {
        if !validate_framed(request) {
            return Err(Error::InvalidPacket(
                "refusing to track a malformed request".to_string(),
            ));
        }
        self.chain.lock().push(*request);
        Ok(())
    }

    /// Marry a reply to its outstanding request, removing the request
    ///
    /// `want_bus_origin` selects which origin class to search: replies read
    /// off the bus can only answer bus-originated requests, replies headed
    /// to a socket can only answer socket-originated ones. Returns the
    /// claimed request's origin, or `None` when nothing matches.
    pub fn claim(&self, reply: &Message, want_bus_origin: bool) -> Option<Origin> {
        let reply_netfn = netfn_class(reply.netfn_byte() & !RESPONSE_BIT);
        let mut chain = self.chain.lock();

        let mut fallback: Option<usize> = None;
        let mut exact: Option<usize> = None;
        for (i, req) in chain.iter().enumerate() {
            if req.origin.is_socket() == want_bus_origin {
                continue;
            }
            if reply.source_addr() != req.dst_addr {
                continue;
            }
            if reply_netfn != netfn_class(req.netfn_byte()) {
                continue;
            }
            if reply.command() != req.command() {
                continue;
            }
            if reply.seq_num() == req.seq_num() {
                exact = Some(i);
                break;
            }
            // Sequence mismatch: remember the oldest plausible request in
            // case no exact match exists further down the chain
            if fallback.is_none() {
                fallback = Some(i);
            }
        }

        exact.or(fallback).map(|i| chain.remove(i).origin)
    }

    /// Forget every outstanding request from the given origin
    ///
    /// Called when a connection goes away; its replies have nowhere to go.
    pub fn flush_origin(&self, origin: Origin) {
        self.chain.lock().retain(|req| req.origin != origin);
    }

    /// Number of outstanding requests
    pub fn len(&self) -> usize {
        self.chain.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.chain.lock().is_empty()
    }
}

impl Default for Broker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{build_request, build_response, CC_NORMAL};

    const LOCAL: u8 = 0x10;
    const TARGET: u8 = 0x24;

    fn request(origin: Origin, seq: u8) -> Message {
        build_request(origin, TARGET, 0x06 << 2, LOCAL, seq, 0x01, &[]).unwrap()
    }

    fn reply(seq: u8) -> Message {
        build_response(
            Origin::Bus,
            LOCAL,
            0x06 << 2 | RESPONSE_BIT,
            TARGET,
            seq,
            0x01,
            CC_NORMAL,
            &[],
        )
        .unwrap()
    }

    #[test]
    fn test_exact_sequence_match() {
        let broker = Broker::new();
        broker.post(&request(Origin::Client(0), 0x10)).unwrap();
        broker.post(&request(Origin::Client(1), 0x20)).unwrap();

        assert_eq!(broker.claim(&reply(0x20), false), Some(Origin::Client(1)));
        assert_eq!(broker.len(), 1);
        assert_eq!(broker.claim(&reply(0x10), false), Some(Origin::Client(0)));
        assert!(broker.is_empty());
    }

    #[test]
    fn test_exact_match_preferred_over_fuzzy() {
        let broker = Broker::new();
        broker.post(&request(Origin::Client(0), 0x11)).unwrap();
        broker.post(&request(Origin::Client(1), 0x22)).unwrap();

        // 0x22 matches client 1 exactly even though client 0 is older
        assert_eq!(broker.claim(&reply(0x22), false), Some(Origin::Client(1)));
    }

    #[test]
    fn test_fuzzy_falls_back_to_oldest() {
        let broker = Broker::new();
        broker.post(&request(Origin::Client(0), 0x11)).unwrap();
        broker.post(&request(Origin::Client(1), 0x22)).unwrap();

        // No sequence matches; the oldest plausible request wins
        assert_eq!(broker.claim(&reply(0x99), false), Some(Origin::Client(0)));
        assert_eq!(broker.claim(&reply(0x99), false), Some(Origin::Client(1)));
        assert_eq!(broker.claim(&reply(0x99), false), None);
    }

    #[test]
    fn test_origin_class_filter() {
        let broker = Broker::new();
        broker.post(&request(Origin::Client(0), 0x10)).unwrap();
        broker.post(&request(Origin::Bus, 0x10)).unwrap();

        assert_eq!(broker.claim(&reply(0x10), true), Some(Origin::Bus));
        assert_eq!(broker.claim(&reply(0x10), true), None);
        assert_eq!(broker.claim(&reply(0x10), false), Some(Origin::Client(0)));
    }

    #[test]
    fn test_mismatched_fields_never_claim() {
        let broker = Broker::new();
        broker.post(&request(Origin::Client(0), 0x10)).unwrap();

        // Wrong source slave address
        let mut wrong = build_response(
            Origin::Bus,
            LOCAL,
            0x06 << 2 | RESPONSE_BIT,
            0x2C,
            0x10,
            0x01,
            CC_NORMAL,
            &[],
        )
        .unwrap();
        assert_eq!(broker.claim(&wrong, false), None);

        // Wrong netfn
        wrong = build_response(
            Origin::Bus,
            LOCAL,
            0x04 << 2 | RESPONSE_BIT,
            TARGET,
            0x10,
            0x01,
            CC_NORMAL,
            &[],
        )
        .unwrap();
        assert_eq!(broker.claim(&wrong, false), None);

        // Wrong command
        wrong = build_response(
            Origin::Bus,
            LOCAL,
            0x06 << 2 | RESPONSE_BIT,
            TARGET,
            0x10,
            0x02,
            CC_NORMAL,
            &[],
        )
        .unwrap();
        assert_eq!(broker.claim(&wrong, false), None);
        assert_eq!(broker.len(), 1);
    }

    #[test]
    fn test_flush_origin_evicts_only_that_origin() {
        let broker = Broker::new();
        broker.post(&request(Origin::Client(0), 0x10)).unwrap();
        broker.post(&request(Origin::Client(1), 0x20)).unwrap();
        broker.post(&request(Origin::Client(0), 0x30)).unwrap();

        broker.flush_origin(Origin::Client(0));
        assert_eq!(broker.len(), 1);
        assert_eq!(broker.claim(&reply(0x20), false), Some(Origin::Client(1)));
    }

    #[test]
    fn test_malformed_request_rejected() {
        let broker = Broker::new();
        let mut bad = request(Origin::Client(0), 0x10);
        bad.dst_addr = 0x25;
        assert!(broker.post(&bad).is_err());
        assert!(broker.is_empty());
    }
}
