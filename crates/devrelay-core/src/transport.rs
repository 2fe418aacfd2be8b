//! Transport: deliver-and-forget message channel to the remote observer.
//!
//! Posting never waits. Messages are FIFO per direction; there is no
//! acknowledgement and no request/response correlation.

use crate::error::RelayError;
use crate::message::{InboundEvent, InboundMessage, OutboundEnvelope};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Outbound side of the transport as seen by the relay.
pub trait Transport: Send + Sync {
    /// Post one envelope. Must not block.
    fn post(&self, envelope: OutboundEnvelope) -> Result<(), RelayError>;
}

/// Internal stats with atomic fields for lock-free updates.
#[derive(Debug, Default)]
struct TransportStatsInner {
    posted: AtomicU64,
    post_errors: AtomicU64,
}

/// Statistics for one transport.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TransportStats {
    /// Envelopes handed to the channel.
    pub posted: u64,
    /// Envelopes dropped because the observer side was gone.
    pub post_errors: u64,
}

/// In-process transport over tokio unbounded channels.
#[derive(Clone)]
pub struct ChannelTransport {
    sender: mpsc::UnboundedSender<OutboundEnvelope>,
    stats: Arc<TransportStatsInner>,
}

impl ChannelTransport {
    /// Snapshot of current statistics.
    pub fn stats(&self) -> TransportStats {
        TransportStats {
            posted: self.stats.posted.load(Ordering::Relaxed),
            post_errors: self.stats.post_errors.load(Ordering::Relaxed),
        }
    }
}

impl Transport for ChannelTransport {
    fn post(&self, envelope: OutboundEnvelope) -> Result<(), RelayError> {
        match self.sender.send(envelope) {
            Ok(()) => {
                self.stats.posted.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
            Err(_) => {
                self.stats.post_errors.fetch_add(1, Ordering::Relaxed);
                Err(RelayError::TransportClosed)
            }
        }
    }
}

/// The observer's end of a channel transport.
pub struct ObserverEndpoint {
    receiver: mpsc::UnboundedReceiver<OutboundEnvelope>,
    sender: mpsc::UnboundedSender<InboundEvent>,
}

impl ObserverEndpoint {
    /// Wait for the next outbound envelope. Returns None once the relay side is dropped.
    pub async fn recv(&mut self) -> Option<OutboundEnvelope> {
        self.receiver.recv().await
    }

    /// Next outbound envelope if one is queued.
    pub fn try_recv(&mut self) -> Option<OutboundEnvelope> {
        self.receiver.try_recv().ok()
    }

    /// Every queued outbound envelope, in posting order.
    pub fn drain(&mut self) -> Vec<OutboundEnvelope> {
        let mut out = Vec::new();
        while let Some(envelope) = self.try_recv() {
            out.push(envelope);
        }
        out
    }

    /// Send a relay message to the relay.
    pub fn send(&self, message: &InboundMessage) -> Result<(), RelayError> {
        self.send_event(InboundEvent::relay(message))
    }

    /// Split into the outbound receiver and the inbound sender.
    pub fn split(
        self,
    ) -> (
        mpsc::UnboundedReceiver<OutboundEnvelope>,
        mpsc::UnboundedSender<InboundEvent>,
    ) {
        (self.receiver, self.sender)
    }

    /// Send a raw event (any method) to the relay.
    pub fn send_event(&self, event: InboundEvent) -> Result<(), RelayError> {
        self.sender
            .send(event)
            .map_err(|_| RelayError::TransportClosed)
    }
}

/// Create a connected transport.
///
/// Returns the relay's outbound transport, the receiver the relay listens on
/// for inbound events, and the observer's endpoint.
pub fn channel_pair() -> (
    ChannelTransport,
    mpsc::UnboundedReceiver<InboundEvent>,
    ObserverEndpoint,
) {
    let (out_tx, out_rx) = mpsc::unbounded_channel();
    let (in_tx, in_rx) = mpsc::unbounded_channel();
    let transport = ChannelTransport {
        sender: out_tx,
        stats: Arc::new(TransportStatsInner::default()),
    };
    let endpoint = ObserverEndpoint {
        receiver: out_rx,
        sender: in_tx,
    };
    (transport, in_rx, endpoint)
}
