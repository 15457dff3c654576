//! Committed-state notifications that drive the generation cascade.
//!
//! Services publish an event only after the unit of work it describes has
//! been committed to the store, so a listener never sees a predecessor that
//! is not yet visible. The [`EventPublisher`] also counts outstanding events
//! (and the listener jobs they spawn) so callers can wait for a cascade to
//! settle.

use crate::workers::{InFlight, InFlightGuard};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DomainEvent {
    /// RealNews rows were committed.
    RealNewsCreated { ids: Vec<u64> },
    /// FakeNews rows exist for these RealNews ids.
    FakeNewsCreated { ids: Vec<u64> },
    /// A RealNews id was designated today's news.
    TodayNewsCreated { id: u64 },
}

impl DomainEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            DomainEvent::RealNewsCreated { .. } => "real_news_created",
            DomainEvent::FakeNewsCreated { .. } => "fake_news_created",
            DomainEvent::TodayNewsCreated { .. } => "today_news_created",
        }
    }
}

/// An event plus the guard that keeps it counted until it is fully handled.
#[derive(Debug)]
pub struct Envelope {
    pub event: DomainEvent,
    pub guard: InFlightGuard,
}

#[derive(Debug, Clone)]
pub struct EventPublisher {
    tx: mpsc::UnboundedSender<Envelope>,
    pending: Arc<InFlight>,
}

impl EventPublisher {
    pub fn channel() -> (EventPublisher, mpsc::UnboundedReceiver<Envelope>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            EventPublisher {
                tx,
                pending: Arc::new(InFlight::default()),
            },
            rx,
        )
    }

    pub fn publish(&self, event: DomainEvent) {
        debug!(kind = event.kind(), ?event, "Publishing event");
        let envelope = Envelope {
            guard: self.pending.enter(),
            event,
        };
        if let Err(mpsc::error::SendError(dropped)) = self.tx.send(envelope) {
            warn!(kind = dropped.event.kind(), "Event pipeline stopped; event dropped");
        }
    }

    /// Count a listener job as part of the cascade until the guard drops.
    pub fn track(&self) -> InFlightGuard {
        self.pending.enter()
    }

    pub fn pending(&self) -> usize {
        self.pending.count()
    }

    /// Resolve once every published event and the jobs it spawned have finished.
    pub async fn settled(&self) {
        self.pending.wait_idle().await
    }
}
