/// Consumer worker.
/// Takes raw datagram text off the inbound queue, parses it and routes
/// heartbeats to the sink. A bad message is logged and skipped; it never
/// stops the loop or touches the socket.

use std::sync::Arc;

use motion_protocol::{DecodeError, HeartbeatSink, InboundMessage, MessageType};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, trace};

use crate::error::WorkerExit;
use crate::health::TransportCounters;
use crate::queue::InboundQueue;

/// What happened to one inbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatched {
    Heartbeat,
    /// Valid frame of a type this bridge does not act on
    Ignored(MessageType),
}

/// Parse one message and hand heartbeats to `sink`.
pub fn dispatch(text: &str, sink: &dyn HeartbeatSink) -> Result<Dispatched, DecodeError> {
    let message = InboundMessage::parse(text)?;
    match message.msg_type {
        MessageType::Heartbeat => {
            sink.on_heartbeat(&message.body)?;
            Ok(Dispatched::Heartbeat)
        }
        other => Ok(Dispatched::Ignored(other)),
    }
}

pub(crate) async fn run(
    queue: Arc<InboundQueue>,
    sink: Arc<dyn HeartbeatSink>,
    counters: Arc<TransportCounters>,
    stop: CancellationToken,
) -> WorkerExit {
    debug!("Consumer started");

    loop {
        let text = tokio::select! {
            _ = stop.cancelled() => return WorkerExit::Shutdown,
            text = queue.take() => match text {
                Some(text) => text,
                None => return WorkerExit::Shutdown,
            },
        };

        if text.is_empty() {
            continue;
        }

        match dispatch(&text, sink.as_ref()) {
            Ok(Dispatched::Heartbeat) => TransportCounters::bump(&counters.heartbeats_applied),
            Ok(Dispatched::Ignored(msg_type)) => {
                trace!(msg_type = ?msg_type, "Ignoring message");
            }
            Err(e) => {
                TransportCounters::bump(&counters.decode_errors);
                error!(error = %e, payload = %text, "Failed to handle inbound message");
            }
        }
    }
}
