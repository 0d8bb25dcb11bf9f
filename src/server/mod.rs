//! TCP connection manager
//!
//! Connections arrive on the loopback listener and identify themselves
//! with a single byte: `C` to act as a client issuing requests, `R` to act
//! as the responder serving requests addressed to the local slave address.
//! Registration is acknowledged with the literal `OK`, refused with `NOK`.
//!
//! Only one responder may hold its slot at a time. When a second responder
//! applies while a slot is held, the incumbent may in fact be gone without
//! the socket having noticed; a liveness probe is queued so the next
//! responder transfer flushes a dead incumbent, and the applicant is
//! expected to retry.

pub mod client;
pub mod delivery;
pub mod responder;
pub mod table;

use crate::app::MuxCore;
use crate::protocol::{error_response, ping_request, Message, CC_DEST_UNAVAILABLE};
use log::{debug, info, warn};
use std::io::{Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use self::table::Role;

const ACK: &[u8] = b"OK";
const NACK: &[u8] = b"NOK";

const ACCEPT_POLL: Duration = Duration::from_millis(100);

/// Accept connections until shutdown, one handler thread per connection
pub fn run_listener(core: Arc<MuxCore>, listener: TcpListener) {
    if let Err(e) = listener.set_nonblocking(true) {
        warn!("Failed to set listener non-blocking: {}", e);
    }
    while core.running.load(Ordering::SeqCst) {
        let (stream, peer) = match listener.accept() {
            Ok(conn) => conn,
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                thread::sleep(ACCEPT_POLL);
                continue;
            }
            Err(e) => {
                warn!("Accept failed: {}", e);
                continue;
            }
        };
        debug!("Connection from {}", peer);

        let core = core.clone();
        let spawned = thread::Builder::new()
            .name(format!("conn-{}", peer))
            .spawn(move || handle_connection(core, stream, peer));
        if let Err(e) = spawned {
            warn!("Failed to spawn connection thread: {}", e);
        }
    }
    debug!("Listener stopped");
}

/// Register one connection and serve it until it goes away
fn handle_connection(core: Arc<MuxCore>, mut stream: TcpStream, peer: SocketAddr) {
    let timeout = core.config.socket_timeout();
    if stream.set_read_timeout(Some(timeout)).is_err()
        || stream.set_write_timeout(Some(timeout)).is_err()
    {
        warn!("Failed to set socket timeouts for {}", peer);
        return;
    }

    // Accepted sockets inherit the listener's non-blocking flag
    if let Err(e) = stream.set_nonblocking(false) {
        warn!("Failed to set {} blocking: {}", peer, e);
        return;
    }

    let mut identity = [0u8; 1];
    if let Err(e) = stream.read_exact(&mut identity) {
        warn!("No registration byte from {}: {}", peer, e);
        return;
    }

    let role = match identity[0] {
        b'C' | b'c' => Role::Client,
        b'R' | b'r' => Role::Responder,
        other => {
            warn!("Unknown registration {:#04x} from {}", other, peer);
            let _ = stream.write_all(NACK);
            return;
        }
    };

    let slot = match core.table.reserve(role, &stream) {
        Ok(slot) => slot,
        Err(crate::error::Error::ResponderBusy) => {
            // The incumbent may be dead without the socket knowing; probe
            // it so a dead one is evicted before the applicant retries
            info!("Responder slot held; probing incumbent for {}", peer);
            let probe = ping_request(core.local_addr(), core.table.next_ping_seq());
            if let Err(e) = core.worker_q.post(&probe) {
                warn!("Failed to queue liveness probe: {}", e);
            }
            let _ = stream.write_all(NACK);
            return;
        }
        Err(e) => {
            warn!("Refusing {}: {}", peer, e);
            let _ = stream.write_all(NACK);
            return;
        }
    };

    if let Err(e) = stream.write_all(ACK) {
        warn!("Failed to acknowledge {}: {}", peer, e);
        core.table.release(slot);
        return;
    }
    info!("{} registered as {:?} in slot {}", peer, role, slot);

    match role {
        Role::Client => client::run(&core, slot, stream),
        Role::Responder => responder::run(&core, stream),
    }

    // Purge before freeing: once the slot is free a new connection can
    // claim the same index, and a stale entry would marry a departed
    // client's reply to the new occupant's socket
    core.broker.flush_origin(crate::protocol::Origin::Client(slot));
    core.table.release(slot);
    info!("{} (slot {}) disconnected", peer, slot);
}

/// Hand a request to the registered responder, or answer it ourselves
///
/// With no responder registered the request is unserviceable: pending
/// responder work is discarded and a destination-unavailable reply is
/// queued back through the router so the requester hears the refusal. The
/// presence check and the queue post deliberately do not overlap any lock;
/// a responder departing in between surfaces as a failed transfer on its
/// own thread.
pub fn post_responder(core: &MuxCore, msg: &Message) {
    if core.table.responder_slot().is_some() {
        if let Err(e) = core.responder_q.post(msg) {
            warn!("Failed to queue request for responder: {}", e);
        }
        return;
    }

    debug!(
        "No responder for request from {:?} (seq {:#04x})",
        msg.origin,
        msg.seq_num()
    );
    core.responder_q.flush();
    let bounce = error_response(msg, CC_DEST_UNAVAILABLE);
    // The router calls this while draining the worker queue; a blocking
    // post back into that same queue could wedge it, so the bounce is
    // dropped under pressure and the requester times out instead
    if let Err(e) = core.worker_q.try_post(&bounce) {
        warn!("Dropping no-responder reply: {}", e);
    }
}
