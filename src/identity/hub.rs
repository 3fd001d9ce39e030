use crate::identity::SessionChange;
use log::{debug, warn};
use tokio::sync::broadcast;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::{Stream, StreamExt};

// Notifications are rare; a slow subscriber only ever needs the latest few
const HUB_CAPACITY: usize = 16;

/// Fan-out point for session change notifications
#[derive(Debug, Clone)]
pub struct SessionChangeHub {
    sender: broadcast::Sender<SessionChange>,
}

impl Default for SessionChangeHub {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionChangeHub {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(HUB_CAPACITY);
        Self { sender }
    }

    pub fn publish(&self, change: SessionChange) {
        let event = change.event;
        match self.sender.send(change) {
            Ok(receivers) => debug!("Published {} to {} subscriber(s)", event.as_str(), receivers),
            Err(_) => debug!("Published {} with no subscribers", event.as_str()),
        }
    }

    pub fn subscribe(&self) -> SessionChangeSubscription {
        SessionChangeSubscription {
            inner: BroadcastStream::new(self.sender.subscribe()),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

/// Handle for one change registration
pub struct SessionChangeSubscription {
    inner: BroadcastStream<SessionChange>,
}

impl SessionChangeSubscription {
    /// Next notification, or `None` once the hub is gone.
    ///
    /// A lagging subscriber skips what it missed and carries on.
    pub async fn recv(&mut self) -> Option<SessionChange> {
        loop {
            match self.inner.next().await {
                Some(Ok(change)) => return Some(change),
                Some(Err(BroadcastStreamRecvError::Lagged(skipped))) => {
                    warn!("Session change subscriber lagged, skipped {} notification(s)", skipped);
                }
                None => return None,
            }
        }
    }

    /// Release the registration
    pub fn unsubscribe(self) {
        drop(self);
    }

    /// Notifications as a stream, lag errors filtered out
    pub fn into_stream(self) -> impl Stream<Item = SessionChange> {
        self.inner.filter_map(|item| item.ok())
    }
}
