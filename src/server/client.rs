//! Client connection reader
//!
//! Each registered client gets one thread reading request frames off its
//! socket. One read yields one frame; clients write a complete frame per
//! send and the loopback transport preserves those boundaries at the sizes
//! involved. A malformed frame ends the connection; silence does not.

use crate::app::MuxCore;
use crate::protocol::{validate_raw, Message, Origin, MAX_PKT_SIZE};
use log::{debug, trace, warn};
use std::io::Read;
use std::net::TcpStream;
use std::sync::atomic::Ordering;
use std::time::Duration;

const READ_POLL: Duration = Duration::from_millis(500);

/// Read request frames from one client until it closes or misbehaves
pub fn run(core: &MuxCore, slot: usize, mut stream: TcpStream) {
    if stream.set_read_timeout(Some(READ_POLL)).is_err() {
        warn!("Failed to set read timeout for slot {}", slot);
        return;
    }

    let mut buf = [0u8; MAX_PKT_SIZE];
    while core.running.load(Ordering::SeqCst) {
        let n = match stream.read(&mut buf) {
            Ok(0) => {
                debug!("Client in slot {} closed its connection", slot);
                return;
            }
            Ok(n) => n,
            Err(e)
                if e.kind() == std::io::ErrorKind::WouldBlock
                    || e.kind() == std::io::ErrorKind::TimedOut =>
            {
                continue;
            }
            Err(e) => {
                warn!("Read error on slot {}: {}", slot, e);
                return;
            }
        };

        if !validate_raw(&buf[..n]) {
            warn!("Malformed frame from slot {}; closing connection", slot);
            return;
        }

        let msg = match Message::from_frame(Origin::Client(slot), &buf[..n]) {
            Ok(msg) => msg,
            Err(e) => {
                warn!("Unframeable request from slot {}: {}", slot, e);
                return;
            }
        };
        trace!(
            "Slot {} request for {:#04x} (seq {:#04x})",
            slot,
            msg.dst_addr,
            msg.seq_num()
        );
        if let Err(e) = core.worker_q.post(&msg) {
            warn!("Failed to queue request from slot {}: {}", slot, e);
            return;
        }
    }
}
