//! Daemon assembly and lifecycle
//!
//! [`MuxCore`] bundles the shared state every thread works against: the
//! four queues, the correlation store, the connection table, and the
//! shutdown flag. [`MuxApp`] owns the threads themselves: it binds the
//! listener, spawns the router, the bus sender/receiver pair, the reply
//! delivery pool, and the connection listener, and joins them all on
//! shutdown.

use crate::broker::Broker;
use crate::bus::io::{self, SharedBus};
use crate::bus::BusTransceiver;
use crate::config::MuxConfig;
use crate::error::Result;
use crate::queue::MessageQueue;
use crate::router;
use crate::server::{self, table::ConnectionTable};
use log::{error, info};
use parking_lot::Mutex;
use std::net::{SocketAddr, TcpListener};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// Pending frames headed toward the local responder socket
const RESPONDER_QUEUE_SIZE: usize = 5;
/// Pending replies headed back to client sockets
const CLIENT_QUEUE_SIZE: usize = 10;
/// Frames awaiting routing
const WORKER_QUEUE_SIZE: usize = 10;
/// Frames awaiting bus transmission
const SENDER_QUEUE_SIZE: usize = 10;

/// Reply delivery threads draining the Client queue
const DELIVERY_THREADS: usize = 2;

/// Shared state for every daemon thread
pub struct MuxCore {
    pub config: MuxConfig,
    pub running: Arc<AtomicBool>,
    /// Inbound frames from every source, awaiting routing
    pub worker_q: MessageQueue,
    /// Outbound frames for the bus sender
    pub sender_q: MessageQueue,
    /// Requests for the registered responder
    pub responder_q: MessageQueue,
    /// Replies awaiting delivery to client sockets
    pub client_q: MessageQueue,
    pub broker: Broker,
    pub table: ConnectionTable,
}

impl MuxCore {
    pub fn new(config: MuxConfig) -> Result<Self> {
        let max_connections = config.network.max_connections;
        Ok(Self {
            config,
            running: Arc::new(AtomicBool::new(true)),
            worker_q: MessageQueue::new(WORKER_QUEUE_SIZE)?,
            sender_q: MessageQueue::new(SENDER_QUEUE_SIZE)?,
            responder_q: MessageQueue::new(RESPONDER_QUEUE_SIZE)?,
            client_q: MessageQueue::new(CLIENT_QUEUE_SIZE)?,
            broker: Broker::new(),
            table: ConnectionTable::new(max_connections),
        })
    }

    /// Local slave address this mux answers for
    pub fn local_addr(&self) -> u8 {
        self.config.bus.local_address
    }
}

/// The running daemon: core state plus its worker threads
pub struct MuxApp {
    core: Arc<MuxCore>,
    bus: SharedBus,
    listener: Option<TcpListener>,
    listen_addr: SocketAddr,
    handles: Vec<JoinHandle<()>>,
}

impl MuxApp {
    /// Bind the listener and assemble the core; no threads run yet
    pub fn new(config: MuxConfig, bus: Box<dyn BusTransceiver>) -> Result<Self> {
        let listener = TcpListener::bind(("127.0.0.1", config.network.port))?;
        let listen_addr = listener.local_addr()?;
        info!("Listening on {}", listen_addr);

        let core = Arc::new(MuxCore::new(config)?);
        Ok(Self {
            core,
            bus: Arc::new(Mutex::new(bus)),
            listener: Some(listener),
            listen_addr,
            handles: Vec::new(),
        })
    }

    /// Address the listener actually bound (useful with port 0)
    pub fn listen_addr(&self) -> SocketAddr {
        self.listen_addr
    }

    pub fn core(&self) -> Arc<MuxCore> {
        self.core.clone()
    }

    /// Spawn every daemon thread
    pub fn start(&mut self) -> Result<()> {
        let core = self.core.clone();
        self.spawn("router", move || router::run(core))?;

        let (bus, core) = (self.bus.clone(), self.core.clone());
        self.spawn("bus-sender", move || {
            io::run_sender(
                bus,
                core.sender_q.clone(),
                core.worker_q.clone(),
                core.running.clone(),
                core.config.inter_transfer_delay(),
            )
        })?;

        let (bus, core) = (self.bus.clone(), self.core.clone());
        self.spawn("bus-receiver", move || {
            io::run_receiver(
                bus,
                core.worker_q.clone(),
                core.running.clone(),
                core.config.bus_read_timeout(),
            )
        })?;

        for i in 0..DELIVERY_THREADS {
            let core = self.core.clone();
            self.spawn(&format!("delivery-{}", i), move || {
                server::delivery::run(core)
            })?;
        }

        let listener = self
            .listener
            .take()
            .ok_or_else(|| crate::error::Error::Other("listener already started".to_string()))?;
        let core = self.core.clone();
        self.spawn("listener", move || server::run_listener(core, listener))?;

        info!("All daemon threads started");
        Ok(())
    }

    /// Signal every thread to stop and wait for them
    pub fn shutdown(&mut self) {
        info!("Shutting down");
        self.core.running.store(false, Ordering::SeqCst);
        for handle in self.handles.drain(..) {
            if let Err(e) = handle.join() {
                error!("Thread panicked during shutdown: {:?}", e);
            }
        }
        info!("Shutdown complete");
    }

    fn spawn<F>(&mut self, name: &str, f: F) -> Result<()>
    where
        F: FnOnce() + Send + 'static,
    {
        let handle = thread::Builder::new().name(name.to_string()).spawn(f)?;
        self.handles.push(handle);
        Ok(())
    }
}

impl Drop for MuxApp {
    fn drop(&mut self) {
        if !self.handles.is_empty() {
            self.shutdown();
        }
    }
}
