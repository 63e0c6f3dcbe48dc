use crate::domain::events::OutboundEvent;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Creates the outbound channel: any number of emitters, one host receiver.
pub fn channel() -> (EventEmitter, EventReceiver) {
    let (sender, receiver) = mpsc::unbounded_channel();
    (EventEmitter { sender }, EventReceiver { receiver })
}

/// Pushes terminal outcomes toward the host.
///
/// Every clone feeds the same ordered channel, so the host observes events in
/// the order they were emitted.
#[derive(Clone)]
pub struct EventEmitter {
    sender: mpsc::UnboundedSender<OutboundEvent>,
}

impl EventEmitter {
    /// Returns `false` when the host receiver has gone away.
    pub fn emit(&self, event: OutboundEvent) -> bool {
        match self.sender.send(event) {
            Ok(()) => {
                debug!("Event emitted");
                true
            }
            Err(err) => {
                warn!(event = ?err.0, "Event dropped (host receiver closed)");
                false
            }
        }
    }
}

/// The host's end of the outbound channel.
pub struct EventReceiver {
    receiver: mpsc::UnboundedReceiver<OutboundEvent>,
}

impl EventReceiver {
    /// Waits for the next event; `None` once every emitter is gone.
    pub async fn recv(&mut self) -> Option<OutboundEvent> {
        self.receiver.recv().await
    }

    /// Takes every event already emitted without waiting.
    pub fn drain(&mut self) -> Vec<OutboundEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.receiver.try_recv() {
            events.push(event);
        }
        events
    }
}
