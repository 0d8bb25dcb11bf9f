//! Worker-queue router
//!
//! Single thread draining the Worker queue. Each message lands in one of
//! four buckets based on its destination and its request/response flag:
//!
//! * request for our local address: park it in the broker and hand it to
//!   the responder (liveness probes skip the broker, their replies die)
//! * response for our local address: hand it to the reply delivery pool
//! * request for a remote address: park it in the broker and hand it to
//!   the bus sender
//! * response for a remote address: only forwarded when it marries an
//!   outstanding bus-originated request; anything else is noise and is
//!   dropped

use crate::app::MuxCore;
use crate::protocol::{Message, Origin, MIN_REQ_PAYLOAD};
use crate::server;
use log::{debug, error, trace, warn};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

const POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Drain the Worker queue until shutdown
pub fn run(core: Arc<MuxCore>) {
    let local = core.local_addr();
    while core.running.load(Ordering::SeqCst) {
        let msg = match core.worker_q.get_timeout(POLL_INTERVAL) {
            Ok(Some(msg)) => msg,
            Ok(None) => continue,
            Err(e) => {
                error!("Worker queue closed: {}", e);
                break;
            }
        };
        route(&core, local, &msg);
    }
    debug!("Router stopped");
}

fn route(core: &MuxCore, local: u8, msg: &Message) {
    if msg.len() < MIN_REQ_PAYLOAD {
        warn!(
            "Dropping runt message for {:#04x} ({} bytes)",
            msg.dst_addr,
            msg.len()
        );
        return;
    }

    match (msg.dst_addr == local, msg.is_response()) {
        (true, false) => {
            trace!(
                "Request for local address from {:?} (seq {:#04x})",
                msg.origin,
                msg.seq_num()
            );
            // Probe replies are discarded, so probes are never parked
            if msg.origin != Origin::Ping {
                if let Err(e) = core.broker.post(msg) {
                    warn!("Dropping untrackable local request: {}", e);
                    return;
                }
            }
            server::post_responder(core, msg);
        }
        (true, true) => {
            trace!(
                "Response for a registered client (seq {:#04x})",
                msg.seq_num()
            );
            if let Err(e) = core.client_q.post(msg) {
                warn!("Dropping client-bound response: {}", e);
            }
        }
        (false, false) => {
            trace!(
                "Request for {:#04x} from {:?} (seq {:#04x})",
                msg.dst_addr,
                msg.origin,
                msg.seq_num()
            );
            if let Err(e) = core.broker.post(msg) {
                warn!("Dropping untrackable outbound request: {}", e);
                return;
            }
            if let Err(e) = core.sender_q.post(msg) {
                warn!("Dropping outbound request: {}", e);
            }
        }
        (false, true) => match core.broker.claim(msg, true) {
            Some(Origin::Ping) => {
                trace!("Discarding liveness probe reply (seq {:#04x})", msg.seq_num());
            }
            Some(origin) => {
                let mut out = *msg;
                out.origin = origin;
                if let Err(e) = core.sender_q.post(&out) {
                    warn!("Dropping outbound response: {}", e);
                }
            }
            None => {
                trace!(
                    "Discarding unmatched response for {:#04x} (seq {:#04x})",
                    msg.dst_addr,
                    msg.seq_num()
                );
            }
        },
    }
}
