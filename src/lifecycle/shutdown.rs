//! Listener shutdown coordination.

use tokio::sync::broadcast;

/// Broadcast handle every accept loop subscribes to.
///
/// Dropping it closes the channel, which listeners treat the same as a trigger.
#[derive(Debug)]
pub struct Shutdown {
    tx: broadcast::Sender<()>,
}

impl Shutdown {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(1);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.tx.subscribe()
    }

    /// Tell every subscribed accept loop to stop.
    pub fn trigger(&self) {
        let _ = self.tx.send(());
    }

    /// Accept loops still listening.
    pub fn listener_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}
