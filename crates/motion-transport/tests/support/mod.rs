//! In-memory multicast network for driving `MulticastManager` in tests.
//!
//! Every `open()` creates a fresh `MockTransport` wired to the network:
//! datagrams pushed with `deliver()` are returned by the current transport's
//! `recv()`, sends are recorded with their (paused-clock) timestamp, and
//! failures can be injected on either path.

#![allow(dead_code)]

use std::io;
use std::net::{Ipv4Addr, SocketAddrV4};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use motion_transport::{
    AddressProvider, MulticastConfig, Transport, TransportError, TransportFactory,
};
use tokio::sync::mpsc;
use tokio::time::Instant;

pub const PRIMARY: Ipv4Addr = Ipv4Addr::new(192, 168, 1, 20);

#[derive(Debug, Clone)]
pub struct SentDatagram {
    pub at: Instant,
    pub payload: Vec<u8>,
    pub target: SocketAddrV4,
}

type Incoming = io::Result<Vec<u8>>;

#[derive(Default)]
struct NetworkInner {
    opened: AtomicUsize,
    refuse_open: AtomicBool,
    fail_sends: AtomicBool,
    send_attempts: AtomicUsize,
    sent: Mutex<Vec<SentDatagram>>,
    incoming: Mutex<Option<mpsc::UnboundedSender<Incoming>>>,
    interfaces: Mutex<Vec<Ipv4Addr>>,
}

#[derive(Clone, Default)]
pub struct MockNetwork {
    inner: Arc<NetworkInner>,
}

impl MockNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of sockets opened so far.
    pub fn opened(&self) -> usize {
        self.inner.opened.load(Ordering::SeqCst)
    }

    pub fn refuse_open(&self, refuse: bool) {
        self.inner.refuse_open.store(refuse, Ordering::SeqCst);
    }

    pub fn fail_sends(&self, fail: bool) {
        self.inner.fail_sends.store(fail, Ordering::SeqCst);
    }

    pub fn send_attempts(&self) -> usize {
        self.inner.send_attempts.load(Ordering::SeqCst)
    }

    pub fn sent(&self) -> Vec<SentDatagram> {
        self.inner.sent.lock().unwrap().clone()
    }

    /// Interface addresses passed to `open()`, in order.
    pub fn interfaces(&self) -> Vec<Ipv4Addr> {
        self.inner.interfaces.lock().unwrap().clone()
    }

    /// Hand a datagram to the current socket. Returns false if none is open.
    pub fn deliver(&self, payload: impl AsRef<[u8]>) -> bool {
        self.push(Ok(payload.as_ref().to_vec()))
    }

    /// Make the current socket's pending `recv()` fail.
    pub fn fail_receive(&self) -> bool {
        self.push(Err(io::Error::new(
            io::ErrorKind::ConnectionReset,
            "simulated receive failure",
        )))
    }

    fn push(&self, item: Incoming) -> bool {
        match self.inner.incoming.lock().unwrap().as_ref() {
            Some(tx) => tx.send(item).is_ok(),
            None => false,
        }
    }
}

impl TransportFactory for MockNetwork {
    fn open(
        &self,
        interface: Ipv4Addr,
        _config: &MulticastConfig,
    ) -> Result<Arc<dyn Transport>, TransportError> {
        if self.inner.refuse_open.load(Ordering::SeqCst) {
            return Err(TransportError::Setup(io::Error::new(
                io::ErrorKind::AddrInUse,
                "simulated bind failure",
            )));
        }

        let (tx, rx) = mpsc::unbounded_channel();
        *self.inner.incoming.lock().unwrap() = Some(tx);
        self.inner.interfaces.lock().unwrap().push(interface);
        self.inner.opened.fetch_add(1, Ordering::SeqCst);

        Ok(Arc::new(MockTransport {
            network: Arc::clone(&self.inner),
            incoming: tokio::sync::Mutex::new(rx),
        }))
    }
}

pub struct MockTransport {
    network: Arc<NetworkInner>,
    incoming: tokio::sync::Mutex<mpsc::UnboundedReceiver<Incoming>>,
}

#[async_trait]
impl Transport for MockTransport {
    async fn send_to(&self, payload: &[u8], target: SocketAddrV4) -> io::Result<usize> {
        self.network.send_attempts.fetch_add(1, Ordering::SeqCst);
        if self.network.fail_sends.load(Ordering::SeqCst) {
            return Err(io::Error::new(
                io::ErrorKind::NetworkUnreachable,
                "simulated send failure",
            ));
        }
        self.network.sent.lock().unwrap().push(SentDatagram {
            at: Instant::now(),
            payload: payload.to_vec(),
            target,
        });
        Ok(payload.len())
    }

    async fn recv(&self, buf: &mut [u8]) -> io::Result<usize> {
        let mut incoming = self.incoming.lock().await;
        match incoming.recv().await {
            Some(Ok(datagram)) => {
                let len = datagram.len().min(buf.len());
                buf[..len].copy_from_slice(&datagram[..len]);
                Ok(len)
            }
            Some(Err(e)) => Err(e),
            None => Err(io::ErrorKind::ConnectionAborted.into()),
        }
    }
}

/// Address provider with a fixed answer.
pub struct FixedAddress(pub Option<Ipv4Addr>);

impl AddressProvider for FixedAddress {
    fn primary_ipv4(&self) -> Option<Ipv4Addr> {
        self.0
    }
}

/// Poll `condition` on the (paused) clock until it holds or `limit` passes.
pub async fn wait_until(limit: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + limit;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}
