/// Send worker.
/// Drains the outbound queue and puts each packet on the wire `repeat_count`
/// times, pausing between repeats of the same packet. Runs until the socket
/// session is closed or a send fails.

use std::net::SocketAddrV4;
use std::sync::Arc;
use std::time::Duration;

use motion_protocol::OutboundPacket;
use tracing::{debug, error, trace};

use crate::error::{TransportError, WorkerExit};
use crate::health::TransportCounters;
use crate::manager::Session;
use crate::queue::OutboundQueue;

pub(crate) async fn run(
    session: Session,
    queue: Arc<OutboundQueue>,
    counters: Arc<TransportCounters>,
    target: SocketAddrV4,
    repeat_delay: Duration,
) -> WorkerExit {
    debug!(generation = session.generation, target = %target, "Send worker started");

    loop {
        let packet = tokio::select! {
            _ = session.closed.cancelled() => return TransportError::SocketClosed.into(),
            packet = queue.take() => match packet {
                Some(packet) => packet,
                None => return TransportError::QueueClosed("outbound").into(),
            },
        };

        if let Err(e) = send_packet(&session, &packet, &counters, target, repeat_delay).await {
            return e.into();
        }
    }
}

async fn send_packet(
    session: &Session,
    packet: &OutboundPacket,
    counters: &TransportCounters,
    target: SocketAddrV4,
    repeat_delay: Duration,
) -> Result<(), TransportError> {
    if packet.payload().is_empty() {
        // Still sent; an empty request is only worth flagging.
        error!("Empty request");
    }

    for attempt in 0..packet.repeat_count() {
        if attempt > 0 {
            tokio::select! {
                _ = session.closed.cancelled() => return Err(TransportError::SocketClosed),
                _ = tokio::time::sleep(repeat_delay) => {}
            }
        }
        if session.closed.is_cancelled() {
            return Err(TransportError::SocketClosed);
        }

        session
            .transport
            .send_to(packet.as_bytes(), target)
            .await
            .map_err(TransportError::Send)?;
        TransportCounters::bump(&counters.datagrams_sent);
    }

    trace!(
        payload = packet.payload(),
        repeats = packet.repeat_count(),
        "Sent request"
    );
    Ok(())
}
