use tokio::sync::{broadcast, mpsc};
use tracing::warn;

use circle_backend::Subscription;
use circle_types::events::ChangeEvent;
use circle_types::{Filter, Table};

/// Fans row changes out to realtime subscribers.
#[derive(Clone)]
pub struct Hub {
    tx: broadcast::Sender<ChangeEvent>,
}

impl Default for Hub {
    fn default() -> Self {
        Self::new()
    }
}

impl Hub {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(1024);
        Self { tx }
    }

    /// Publish a change. Nobody listening is not an error.
    pub fn publish(&self, event: ChangeEvent) {
        let _ = self.tx.send(event);
    }

    /// Subscribe to one table, optionally narrowed by a filter on the changed row.
    /// Must be called from within a tokio runtime.
    pub fn subscribe(&self, table: Table, filter: Option<Filter>) -> Subscription {
        let mut broadcast_rx = self.tx.subscribe();
        let (tx, rx) = mpsc::unbounded_channel();

        let task = tokio::spawn(async move {
            loop {
                let event = match broadcast_rx.recv().await {
                    Ok(event) => event,
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!("Realtime subscriber on {} lagged by {} events", table, n);
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                };

                if event.table != table {
                    continue;
                }
                if let Some(filter) = &filter {
                    if !filter.matches(event.subject()) {
                        continue;
                    }
                }
                if tx.send(event).is_err() {
                    break;
                }
            }
        });

        Subscription::new(rx, task)
    }
}
