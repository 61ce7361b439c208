//! Implements NotificationPort with a tokio broadcast channel.
//!
//! One channel for all tickets; subscribers filter by ticket id.

use crate::domain::ArticleEvent;
use crate::ports::NotificationPort;
use crate::shared::config::DEFAULT_NOTIFY_CAPACITY;
use tokio::sync::broadcast;
use tracing::{debug, warn};

/// Event as carried on the wire between publisher and subscribers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TicketEvent {
    pub ticket_id: i64,
    pub event: ArticleEvent,
}

/// Broadcast-backed notifier.
#[derive(Clone)]
pub struct BroadcastNotifier {
    tx: broadcast::Sender<TicketEvent>,
}

impl BroadcastNotifier {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Events for one ticket.
    pub fn subscribe(&self, ticket_id: i64) -> TicketSubscription {
        TicketSubscription {
            ticket_id,
            rx: self.tx.subscribe(),
        }
    }

    /// Events for every ticket.
    pub fn subscribe_all(&self) -> broadcast::Receiver<TicketEvent> {
        self.tx.subscribe()
    }
}

impl Default for BroadcastNotifier {
    fn default() -> Self {
        Self::new(DEFAULT_NOTIFY_CAPACITY)
    }
}

#[async_trait::async_trait]
impl NotificationPort for BroadcastNotifier {
    async fn publish(&self, ticket_id: i64, event: ArticleEvent) {
        // No subscribers is fine: nobody is viewing the ticket.
        match self.tx.send(TicketEvent { ticket_id, event }) {
            Ok(receivers) => debug!(ticket_id, receivers, "ticket event published"),
            Err(_) => debug!(ticket_id, "ticket event dropped (no subscribers)"),
        }
    }
}

/// Receiver filtered to one ticket.
pub struct TicketSubscription {
    ticket_id: i64,
    rx: broadcast::Receiver<TicketEvent>,
}

impl TicketSubscription {
    /// Next event for this ticket. `None` once the notifier is gone.
    /// Lagging is logged and skipped; the caller should re-list articles.
    pub async fn recv(&mut self) -> Option<ArticleEvent> {
        loop {
            match self.rx.recv().await {
                Ok(ev) if ev.ticket_id == self.ticket_id => return Some(ev.event),
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!(
                        ticket_id = self.ticket_id,
                        missed = n,
                        "ticket subscriber lagged behind broadcast"
                    );
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Non-blocking variant of `recv`.
    pub fn try_recv(&mut self) -> Option<ArticleEvent> {
        loop {
            match self.rx.try_recv() {
                Ok(ev) if ev.ticket_id == self.ticket_id => return Some(ev.event),
                Ok(_) => continue,
                Err(broadcast::error::TryRecvError::Lagged(_)) => continue,
                Err(_) => return None,
            }
        }
    }
}
