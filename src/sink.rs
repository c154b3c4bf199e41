use tokio::sync::watch;

use crate::intensity::IntensityEvent;

/// Create the single-slot hand-off between the scheduler and one consumer.
///
/// The producer never waits: publishing replaces whatever the consumer has not
/// read yet, so the consumer sees the latest event only.
pub fn event_channel() -> (EventSink, EventReceiver) {
    let (tx, rx) = watch::channel(None);
    (EventSink { tx }, EventReceiver { rx })
}

#[derive(Debug)]
pub struct EventSink {
    tx: watch::Sender<Option<IntensityEvent>>,
}

impl EventSink {
    /// Replace the pending event. Never waits, and succeeds with no receiver.
    pub fn publish(&self, event: IntensityEvent) {
        self.tx.send_replace(Some(event));
    }

    /// Additional receiver. Events published before this call count as seen.
    pub fn subscribe(&self) -> EventReceiver {
        EventReceiver {
            rx: self.tx.subscribe(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct EventReceiver {
    rx: watch::Receiver<Option<IntensityEvent>>,
}

impl EventReceiver {
    /// Take the pending event without waiting. An event is returned at most once,
    /// and the last one is still delivered after the producer is gone.
    pub fn try_recv(&mut self) -> Option<IntensityEvent> {
        let pending = self.rx.borrow_and_update();
        if pending.has_changed() {
            (*pending).clone()
        } else {
            None
        }
    }

    /// Wait for the next event. Returns `None` once the producer is gone and the
    /// last event has been taken.
    pub async fn recv(&mut self) -> Option<IntensityEvent> {
        self.rx.changed().await.ok()?;
        self.rx.borrow_and_update().clone()
    }
}
