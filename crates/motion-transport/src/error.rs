use std::io;
use std::net::Ipv4Addr;

use thiserror::Error;

/// Failures of the multicast socket or the queues around it.
#[derive(Error, Debug)]
pub enum TransportError {
    /// The primary address is not bound to any up, non-loopback interface
    #[error("no local interface owns {0}")]
    UnknownInterface(Ipv4Addr),

    /// Creating, binding or configuring the socket failed
    #[error("socket setup failed: {0}")]
    Setup(#[source] io::Error),

    #[error("send failed: {0}")]
    Send(#[source] io::Error),

    #[error("receive failed: {0}")]
    Receive(#[source] io::Error),

    /// The socket was closed underneath a worker
    #[error("socket closed")]
    SocketClosed,

    /// A queue lost its other end; only possible if the manager is torn down
    #[error("{0} queue closed")]
    QueueClosed(&'static str),
}

/// Why a start attempt did not produce a live socket.
#[derive(Error, Debug)]
pub enum StartError {
    /// Configuration problem; no retry is scheduled for it
    #[error("cannot resolve the primary IPv4 address")]
    NoPrimaryAddress,

    #[error(transparent)]
    Transport(#[from] TransportError),

    /// `stop()` won the race against the start attempt
    #[error("manager is stopped")]
    Stopped,
}

/// How a worker loop ended. The supervisor decides what to do with it.
#[derive(Debug)]
pub enum WorkerExit {
    /// Asked to stop; nothing to recover
    Shutdown,
    /// I/O failed; rebuilding the socket may help
    Transient(TransportError),
    /// Internal invariant broken; restarting would not help
    Fatal(TransportError),
}

impl From<TransportError> for WorkerExit {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::QueueClosed(_) => Self::Fatal(err),
            other => Self::Transient(other),
        }
    }
}
