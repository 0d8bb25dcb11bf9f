//! Responder connection servicing
//!
//! The responder's thread drains the Responder queue: each request is
//! written to the responder socket and a single reply frame is read back
//! within the configured transfer timeout. Any failure in that exchange
//! means the responder is gone or wedged; the in-flight request is
//! answered with destination-unavailable, the rest of the queue is
//! discarded, and the thread returns so the slot opens up.

use crate::app::MuxCore;
use crate::protocol::{error_response, Message, Origin, CC_DEST_UNAVAILABLE, MAX_PKT_SIZE};
use log::{debug, trace, warn};
use std::io::{Read, Write};
use std::net::TcpStream;
use std::sync::atomic::Ordering;
use std::time::Duration;

const QUEUE_POLL: Duration = Duration::from_millis(500);

/// Serve queued requests through one responder socket until it fails
pub fn run(core: &MuxCore, mut stream: TcpStream) {
    let timeout = core.config.socket_timeout();
    if stream.set_read_timeout(Some(timeout)).is_err()
        || stream.set_write_timeout(Some(timeout)).is_err()
    {
        warn!("Failed to set responder socket timeouts");
        return;
    }

    let mut buf = [0u8; MAX_PKT_SIZE];
    while core.running.load(Ordering::SeqCst) {
        let msg = match core.responder_q.get_timeout(QUEUE_POLL) {
            Ok(Some(msg)) => msg,
            Ok(None) => continue,
            Err(e) => {
                warn!("Responder queue closed: {}", e);
                return;
            }
        };

        if let Err(e) = stream.write_all(&msg.to_frame()) {
            warn!("Responder write failed: {}", e);
            fail(core, &msg);
            return;
        }

        let n = match stream.read(&mut buf) {
            Ok(0) => {
                debug!("Responder closed its connection");
                fail(core, &msg);
                return;
            }
            Ok(n) => n,
            Err(e) => {
                warn!("Responder read failed: {}", e);
                fail(core, &msg);
                return;
            }
        };

        let reply = match Message::from_frame(Origin::Bus, &buf[..n]) {
            Ok(reply) => reply,
            Err(e) => {
                warn!("Responder produced an unframeable reply: {}", e);
                fail(core, &msg);
                return;
            }
        };
        trace!(
            "Responder answered seq {:#04x} for {:#04x}",
            reply.seq_num(),
            reply.dst_addr
        );
        if let Err(e) = core.worker_q.post(&reply) {
            warn!("Failed to queue responder reply: {}", e);
            return;
        }
    }
}

/// Answer the in-flight request on the dead responder's behalf and drop
/// whatever else was queued for it
fn fail(core: &MuxCore, msg: &Message) {
    core.responder_q.flush();
    let bounce = error_response(msg, CC_DEST_UNAVAILABLE);
    if let Err(e) = core.worker_q.try_post(&bounce) {
        warn!("Dropping dead-responder reply: {}", e);
    }
}
