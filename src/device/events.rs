use std::sync::{Arc, Mutex};
use futures::SinkExt;
use futures::channel::mpsc::Sender;
use log::{debug, warn};
use tokio_util::sync::CancellationToken;

use crate::device::types::{Reading, ScaleEvent, Status};

/// Fans scale events out to every subscriber and remembers the last reported status, so that
/// a status is only sent when it actually changes.
pub struct EventSink {
    senders: Vec<Sender<ScaleEvent>>,
    // shared with the driver so that a restart does not repeat the last status
    status: Arc<Mutex<Option<Status>>>,
    cancel: CancellationToken,
}

impl EventSink {
    pub fn new(senders: Vec<Sender<ScaleEvent>>) -> Self {
        Self::with_status(senders, Arc::new(Mutex::new(None)), CancellationToken::new())
    }

    /// A sink that continues from `status`, and that stops sending once `cancel` is cancelled,
    /// even if a subscriber is full.
    pub fn with_status(
        senders: Vec<Sender<ScaleEvent>>,
        status: Arc<Mutex<Option<Status>>>,
        cancel: CancellationToken,
    ) -> Self {
        EventSink { senders, status, cancel }
    }

    /// Returns true if the status changed (and was sent).
    pub async fn report_status(&mut self, status: Status) -> bool {
        {
            let mut last = self.status.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            if *last == Some(status) {
                return false;
            }
            *last = Some(status);
        }

        debug!("Status changed to {:?}", status);
        self.send(ScaleEvent::Status(status)).await;
        true
    }

    pub async fn emit(&mut self, reading: Reading) {
        self.send(ScaleEvent::Reading(reading)).await;
    }

    async fn send(&mut self, event: ScaleEvent) {
        for sender in &mut self.senders {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    debug!("Not sending ScaleEvent, driver is stopping");
                    return;
                },
                result = sender.send(event.clone()) => {
                    if let Err(err) = result {
                        warn!("Failed to send ScaleEvent: {}", err);
                    }
                },
            }
        }

        // a receiver that went away will never come back
        self.senders.retain(|sender| !sender.is_closed());
    }
}

#[cfg(test)]
mod tests {
    use futures::StreamExt;
    use futures::channel::mpsc::channel;
    use crate::device::types::Units;
    use super::*;

    #[tokio::test]
    async fn test_status_is_level_triggered() {
        let (tx, rx) = channel::<ScaleEvent>(16);
        let mut sink = EventSink::new(vec![tx]);

        assert!(sink.report_status(Status::Warning).await);
        assert!(!sink.report_status(Status::Warning).await);
        assert!(sink.report_status(Status::Ok).await);
        assert!(!sink.report_status(Status::Ok).await);
        drop(sink);

        let events: Vec<ScaleEvent> = rx.collect().await;
        assert_eq!(events, vec![
            ScaleEvent::Status(Status::Warning),
            ScaleEvent::Status(Status::Ok),
        ]);
    }

    #[tokio::test]
    async fn test_emit_survives_dropped_receiver() {
        let (tx, rx) = channel::<ScaleEvent>(16);
        let (tx2, rx2) = channel::<ScaleEvent>(16);
        let mut sink = EventSink::new(vec![tx, tx2]);
        drop(rx);

        let reading = Reading { units: Units::Grams, weight: 1.0 };
        sink.emit(reading).await;
        sink.emit(reading).await;
        drop(sink);

        let events: Vec<ScaleEvent> = rx2.collect().await;
        assert_eq!(events.len(), 2);
    }

    #[tokio::test]
    async fn test_status_carries_over_to_next_sink() {
        let (tx, rx) = channel::<ScaleEvent>(16);
        let status = Arc::new(Mutex::new(None));

        let mut sink = EventSink::with_status(vec![tx.clone()], status.clone(), CancellationToken::new());
        assert!(sink.report_status(Status::Ok).await);
        drop(sink);

        let mut sink = EventSink::with_status(vec![tx], status, CancellationToken::new());
        assert!(!sink.report_status(Status::Ok).await);
        assert!(sink.report_status(Status::Warning).await);
        drop(sink);

        let events: Vec<ScaleEvent> = rx.collect().await;
        assert_eq!(events, vec![
            ScaleEvent::Status(Status::Ok),
            ScaleEvent::Status(Status::Warning),
        ]);
    }

    #[tokio::test]
    async fn test_send_gives_up_on_full_subscriber_when_cancelled() {
        // buffer 0 still leaves one slot for the sender
        let (tx, _rx) = channel::<ScaleEvent>(0);
        let cancel = CancellationToken::new();
        let mut sink = EventSink::with_status(vec![tx], Arc::new(Mutex::new(None)), cancel.clone());
        let reading = Reading { units: Units::Grams, weight: 1.0 };

        sink.emit(reading).await;
        cancel.cancel();
        // would wait forever for the subscriber otherwise
        sink.emit(reading).await;
    }
}
