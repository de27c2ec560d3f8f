use tokio::sync::broadcast;

use super::{SwapKind, SwapStatus};

/// A swap status transition as seen by subscribers. The status string on the
/// wire is `status.to_string()`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwapUpdate {
    pub id: String,
    pub kind: SwapKind,
    pub status: SwapStatus,
}

/// Multicasts swap status transitions. Slow subscribers may miss updates;
/// they can always re-read the repository for current state.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<SwapUpdate>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SwapUpdate> {
        self.sender.subscribe()
    }

    pub fn publish(&self, id: &str, kind: SwapKind, status: SwapStatus) {
        tracing::info!(swap_id = %id, %kind, %status, "swap status update");

        // A send only fails when nobody is subscribed, which is fine.
        let _ = self.sender.send(SwapUpdate {
            id: id.to_string(),
            kind,
            status,
        });
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}
