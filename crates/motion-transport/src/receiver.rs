/// Receive worker.
/// Reads datagrams from the multicast socket and queues their text for the
/// consumer. A full inbound queue parks this worker until the consumer
/// catches up.

use std::sync::Arc;

use tracing::{debug, trace};

use crate::error::{TransportError, WorkerExit};
use crate::health::TransportCounters;
use crate::manager::Session;
use crate::queue::InboundQueue;

pub(crate) async fn run(
    session: Session,
    queue: Arc<InboundQueue>,
    counters: Arc<TransportCounters>,
    buffer_size: usize,
) -> WorkerExit {
    debug!(generation = session.generation, buffer_size, "Receive worker started");

    let mut buf = vec![0u8; buffer_size];

    loop {
        let len = tokio::select! {
            _ = session.closed.cancelled() => return TransportError::SocketClosed.into(),
            result = session.transport.recv(&mut buf) => match result {
                Ok(len) => len,
                Err(e) => return TransportError::Receive(e).into(),
            },
        };

        // Copy exactly what arrived; the buffer is reused for the next read.
        let text = String::from_utf8_lossy(&buf[..len]).into_owned();
        TransportCounters::bump(&counters.datagrams_received);
        trace!(len, "Queued inbound datagram");

        tokio::select! {
            _ = session.closed.cancelled() => return TransportError::SocketClosed.into(),
            result = queue.put(text) => {
                if result.is_err() {
                    return TransportError::QueueClosed("inbound").into();
                }
            }
        }
    }
}
