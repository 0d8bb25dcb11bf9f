//! Reply delivery to client sockets
//!
//! A small pool of threads drains the Client queue. Each reply is married
//! to its outstanding request in the correlation store; the claimed
//! request's slot names the socket the reply belongs to. Replies that
//! claim nothing, or whose requester has since disconnected, are dropped.

use crate::app::MuxCore;
use crate::protocol::Origin;
use log::{debug, trace, warn};
use std::io::Write;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

const QUEUE_POLL: Duration = Duration::from_millis(500);

/// Drain the Client queue until shutdown
pub fn run(core: Arc<MuxCore>) {
    while core.running.load(Ordering::SeqCst) {
        let msg = match core.client_q.get_timeout(QUEUE_POLL) {
            Ok(Some(msg)) => msg,
            Ok(None) => continue,
            Err(e) => {
                warn!("Client queue closed: {}", e);
                break;
            }
        };

        let slot = match core.broker.claim(&msg, false) {
            Some(Origin::Client(slot)) => slot,
            Some(origin) => {
                warn!(
                    "Reply seq {:#04x} claimed a non-socket request {:?}; dropping",
                    msg.seq_num(),
                    origin
                );
                continue;
            }
            None => {
                trace!("Reply seq {:#04x} matched no request", msg.seq_num());
                continue;
            }
        };

        let mut socket = match core.table.socket(slot) {
            Some(socket) => socket,
            None => {
                debug!("Requester in slot {} is gone; dropping reply", slot);
                continue;
            }
        };
        if let Err(e) = socket.write_all(&msg.to_frame()) {
            warn!("Failed to deliver reply to slot {}: {}", slot, e);
        } else {
            trace!("Delivered reply seq {:#04x} to slot {}", msg.seq_num(), slot);
        }
    }
    debug!("Delivery thread stopped");
}
