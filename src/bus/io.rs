//! Bus sender and receiver threads
//!
//! Two threads share one [`BusTransceiver`] behind a mutex. The sender
//! drains the Sender queue onto the bus; when a transfer fails it resets
//! the driver and, for requests, synthesizes an error reply so the waiting
//! requester hears something instead of timing out. The receiver pulls
//! inbound frames off the bus, tags them as bus-originated, and hands them
//! to the Worker queue for routing.
//!
//! Both loops wake at least twice a second to observe the shutdown flag.

use super::BusTransceiver;
use crate::protocol::{error_response, Message, Origin, MAX_PKT_SIZE};
use crate::queue::MessageQueue;
use log::{debug, error, trace, warn};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

const POLL_INTERVAL: Duration = Duration::from_millis(500);
const WRITE_TIMEOUT: Duration = Duration::from_millis(500);

pub type SharedBus = Arc<Mutex<Box<dyn BusTransceiver>>>;

/// Drain the Sender queue onto the bus until shutdown
pub fn run_sender(
    bus: SharedBus,
    sender_q: MessageQueue,
    worker_q: MessageQueue,
    running: Arc<AtomicBool>,
    inter_transfer_delay: Duration,
) {
    while running.load(Ordering::SeqCst) {
        let msg = match sender_q.get_timeout(POLL_INTERVAL) {
            Ok(Some(msg)) => msg,
            Ok(None) => continue,
            Err(e) => {
                error!("Sender queue closed: {}", e);
                break;
            }
        };

        if !inter_transfer_delay.is_zero() {
            std::thread::sleep(inter_transfer_delay);
        }

        let frame = msg.to_frame();
        let result = bus.lock().write(&frame, WRITE_TIMEOUT);
        match result {
            Ok(()) => {
                trace!(
                    "Transmitted {} bytes to {:#04x} (seq {:#04x})",
                    frame.len(),
                    msg.dst_addr,
                    msg.seq_num()
                );
            }
            Err(e) => {
                warn!("Bus write to {:#04x} failed: {}", msg.dst_addr, e);
                if let Err(reset_err) = bus.lock().reset() {
                    error!("Bus reset failed: {}", reset_err);
                }
                if msg.is_response() {
                    // The remote requester will retry on its own timeout
                    continue;
                }
                // Best effort; a dropped bounce degrades to a requester
                // timeout, and blocking here would stall the sender
                let reply = error_response(&msg, e.completion_code());
                if let Err(post_err) = worker_q.try_post(&reply) {
                    error!("Dropping bus error reply: {}", post_err);
                }
            }
        }
    }
    debug!("Bus sender stopped");
}

/// Pull inbound frames off the bus until shutdown
pub fn run_receiver(
    bus: SharedBus,
    worker_q: MessageQueue,
    running: Arc<AtomicBool>,
    read_timeout: Duration,
) {
    let mut buf = [0u8; MAX_PKT_SIZE];
    while running.load(Ordering::SeqCst) {
        let result = bus.lock().read(&mut buf, read_timeout);
        let n = match result {
            Ok(n) => n,
            Err(super::BusError::Timeout) => continue,
            Err(e) => {
                warn!("Bus read failed: {}", e);
                continue;
            }
        };

        let msg = match Message::from_frame(Origin::Bus, &buf[..n]) {
            Ok(msg) => msg,
            Err(e) => {
                warn!("Discarding inbound bus frame: {}", e);
                continue;
            }
        };
        trace!(
            "Received {} bytes for {:#04x} off the bus",
            n,
            msg.dst_addr
        );
        if let Err(e) = worker_q.post(&msg) {
            warn!("Discarding inbound bus frame: {}", e);
        }
    }
    debug!("Bus receiver stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::mock::MockBus;
    use crate::protocol::{build_request, validate_raw, CC_DEST_UNAVAILABLE};
    use std::thread;

    fn shared(bus: &MockBus) -> SharedBus {
        Arc::new(Mutex::new(Box::new(bus.clone()) as Box<dyn BusTransceiver>))
    }

    fn request(seq: u8) -> Message {
        build_request(Origin::Client(0), 0x24, 0x06 << 2, 0x10, seq, 0x01, &[]).unwrap()
    }

    #[test]
    fn test_sender_transmits_queued_frames() {
        let mock = MockBus::new();
        let sender_q = MessageQueue::new(4).unwrap();
        let worker_q = MessageQueue::new(4).unwrap();
        let running = Arc::new(AtomicBool::new(true));

        sender_q.post(&request(0x11)).unwrap();
        sender_q.post(&request(0x12)).unwrap();

        let handle = {
            let (bus, sq, wq, run) =
                (shared(&mock), sender_q.clone(), worker_q.clone(), running.clone());
            thread::spawn(move || run_sender(bus, sq, wq, run, Duration::ZERO))
        };

        let deadline = std::time::Instant::now() + Duration::from_secs(2);
        while mock.written().len() < 2 && std::time::Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        running.store(false, Ordering::SeqCst);
        handle.join().unwrap();

        let written = mock.written();
        assert_eq!(written.len(), 2);
        assert_eq!(written[0], request(0x11).to_frame());
        assert_eq!(written[1], request(0x12).to_frame());
    }

    #[test]
    fn test_sender_failure_synthesizes_error_reply() {
        let mock = MockBus::new();
        mock.fail_writes(true);
        let sender_q = MessageQueue::new(4).unwrap();
        let worker_q = MessageQueue::new(4).unwrap();
        let running = Arc::new(AtomicBool::new(true));

        sender_q.post(&request(0x42)).unwrap();

        let handle = {
            let (bus, sq, wq, run) =
                (shared(&mock), sender_q.clone(), worker_q.clone(), running.clone());
            thread::spawn(move || run_sender(bus, sq, wq, run, Duration::ZERO))
        };

        let reply = worker_q.get_timeout(Duration::from_secs(2)).unwrap().unwrap();
        running.store(false, Ordering::SeqCst);
        handle.join().unwrap();

        assert!(reply.is_response());
        assert_eq!(reply.dst_addr, 0x10);
        assert_eq!(reply.source_addr(), 0x24);
        assert_eq!(reply.seq_num(), 0x42);
        assert_eq!(reply.completion_code(), CC_DEST_UNAVAILABLE);
        assert_eq!(mock.resets(), 1);
    }

    #[test]
    fn test_receiver_tags_frames_as_bus_origin() {
        let mock = MockBus::new();
        let worker_q = MessageQueue::new(4).unwrap();
        let running = Arc::new(AtomicBool::new(true));

        let frame = request(0x33).to_frame();
        mock.inject(&frame);

        let handle = {
            let (bus, wq, run) = (shared(&mock), worker_q.clone(), running.clone());
            thread::spawn(move || run_receiver(bus, wq, run, Duration::from_millis(20)))
        };

        let msg = worker_q.get_timeout(Duration::from_secs(2)).unwrap().unwrap();
        running.store(false, Ordering::SeqCst);
        handle.join().unwrap();

        assert_eq!(msg.origin, Origin::Bus);
        assert_eq!(msg.to_frame(), frame);
        assert!(validate_raw(&msg.to_frame()));
    }

    #[test]
    fn test_receiver_discards_runt_frames() {
        let mock = MockBus::new();
        let worker_q = MessageQueue::new(4).unwrap();
        let running = Arc::new(AtomicBool::new(true));

        mock.inject(&[0x24]);
        mock.inject(&request(0x55).to_frame());

        let handle = {
            let (bus, wq, run) = (shared(&mock), worker_q.clone(), running.clone());
            thread::spawn(move || run_receiver(bus, wq, run, Duration::from_millis(20)))
        };

        let msg = worker_q.get_timeout(Duration::from_secs(2)).unwrap().unwrap();
        running.store(false, Ordering::SeqCst);
        handle.join().unwrap();

        // The single-byte runt never reaches the queue
        assert_eq!(msg.seq_num(), 0x55);
        assert!(worker_q.is_empty());
    }
}
