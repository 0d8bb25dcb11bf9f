//! In-memory bus driver for tests and hardware-free operation
//!
//! Frames written to the bus are captured for inspection; frames queued
//! with [`MockBus::inject`] are handed out by `read` in FIFO order. The
//! handle is cheaply cloneable so a test can keep one side while the
//! daemon owns the other.

use super::{BusError, BusResult, BusTransceiver};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Default)]
struct Inner {
    inbound: VecDeque<Vec<u8>>,
    written: Vec<Vec<u8>>,
    fail_writes: bool,
    resets: usize,
}

/// Simulated bus transceiver
#[derive(Clone, Default)]
pub struct MockBus {
    inner: Arc<Mutex<Inner>>,
}

impl MockBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a frame for the next `read` to return
    pub fn inject(&self, frame: &[u8]) {
        self.inner.lock().inbound.push_back(frame.to_vec());
    }

    /// Frames transmitted so far, oldest first
    pub fn written(&self) -> Vec<Vec<u8>> {
        self.inner.lock().written.clone()
    }

    /// Make every subsequent `write` fail with [`BusError::Nak`]
    pub fn fail_writes(&self, fail: bool) {
        self.inner.lock().fail_writes = fail;
    }

    /// Number of times the driver was reset
    pub fn resets(&self) -> usize {
        self.inner.lock().resets
    }
}

impl BusTransceiver for MockBus {
    fn read(&mut self, buf: &mut [u8], timeout: Duration) -> BusResult<usize> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(frame) = self.inner.lock().inbound.pop_front() {
                if frame.len() > buf.len() {
                    return Err(BusError::InvalidParameter(format!(
                        "frame of {} bytes exceeds buffer",
                        frame.len()
                    )));
                }
                buf[..frame.len()].copy_from_slice(&frame);
                return Ok(frame.len());
            }
            if Instant::now() >= deadline {
                return Err(BusError::Timeout);
            }
            std::thread::sleep(Duration::from_millis(1));
        }
    }

    fn write(&mut self, frame: &[u8], _timeout: Duration) -> BusResult<()> {
        let mut inner = self.inner.lock();
        if inner.fail_writes {
            return Err(BusError::Nak);
        }
        inner.written.push(frame.to_vec());
        Ok(())
    }

    fn reset(&mut self) -> BusResult<()> {
        self.inner.lock().resets += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_captures_frames() {
        let mut bus = MockBus::new();
        bus.write(&[0x24, 0x18], Duration::from_millis(10)).unwrap();
        bus.write(&[0x10, 0x1D], Duration::from_millis(10)).unwrap();
        assert_eq!(bus.written(), vec![vec![0x24, 0x18], vec![0x10, 0x1D]]);
    }

    #[test]
    fn test_read_returns_injected_in_order() {
        let mut bus = MockBus::new();
        bus.inject(&[0x01, 0x02]);
        bus.inject(&[0x03]);

        let mut buf = [0u8; 8];
        let n = bus.read(&mut buf, Duration::from_millis(10)).unwrap();
        assert_eq!(&buf[..n], &[0x01, 0x02]);
        let n = bus.read(&mut buf, Duration::from_millis(10)).unwrap();
        assert_eq!(&buf[..n], &[0x03]);
    }

    #[test]
    fn test_read_times_out_when_idle() {
        let mut bus = MockBus::new();
        let mut buf = [0u8; 8];
        assert!(matches!(
            bus.read(&mut buf, Duration::from_millis(5)),
            Err(BusError::Timeout)
        ));
    }

    #[test]
    fn test_failed_writes() {
        let mut bus = MockBus::new();
        bus.fail_writes(true);
        assert!(matches!(
            bus.write(&[0x24], Duration::from_millis(10)),
            Err(BusError::Nak)
        ));
        bus.fail_writes(false);
        bus.write(&[0x24], Duration::from_millis(10)).unwrap();
        assert_eq!(bus.written().len(), 1);
    }

    #[test]
    fn test_clone_shares_state() {
        let bus = MockBus::new();
        let mut other = bus.clone();
        bus.inject(&[0xAB]);
        let mut buf = [0u8; 4];
        let n = other.read(&mut buf, Duration::from_millis(10)).unwrap();
        assert_eq!(&buf[..n], &[0xAB]);
    }
}
