use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc::{self, error::TrySendError};
use uuid::Uuid;

use crate::models::CollabMessage;

pub type ConnectionId = Uuid;

/// Messages queued for one connection's writer
pub type OutboundReceiver = mpsc::Receiver<Arc<CollabMessage>>;

/// The relay's handle on one connection.
/// Dropping it closes the connection's outbound queue, which ends its writer.
#[derive(Debug)]
pub struct ParticipantHandle {
    pub connection_id: ConnectionId,
    pub user_id: String,
    pub joined_at: DateTime<Utc>,
    outbound: mpsc::Sender<Arc<CollabMessage>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum DeliveryError {
    /// The reader fell behind and its queue is at capacity
    Full,
    /// The writer is gone
    Closed,
}

impl ParticipantHandle {
    pub fn new(user_id: &str, queue_size: usize) -> (Self, OutboundReceiver) {
        let (outbound, rx) = mpsc::channel(queue_size.max(1));
        let handle = Self {
            connection_id: Uuid::new_v4(),
            user_id: user_id.to_string(),
            joined_at: Utc::now(),
            outbound,
        };
        (handle, rx)
    }

    /// Queue a message without ever waiting on the reader
    pub(crate) fn deliver(&self, msg: &Arc<CollabMessage>) -> Result<(), DeliveryError> {
        self.outbound.try_send(msg.clone()).map_err(|e| match e {
            TrySendError::Full(_) => DeliveryError::Full,
            TrySendError::Closed(_) => DeliveryError::Closed,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn full_queue_is_reported_instead_of_waiting() {
        let (handle, mut rx) = ParticipantHandle::new("alice@example.com", 1);
        let msg = Arc::new(CollabMessage::join("bob@example.com"));
        assert_eq!(handle.deliver(&msg), Ok(()));
        assert_eq!(handle.deliver(&msg), Err(DeliveryError::Full));
        assert_eq!(rx.recv().await.as_deref(), Some(msg.as_ref()));
    }

    #[tokio::test]
    async fn dropped_reader_is_reported_as_closed() {
        let (handle, rx) = ParticipantHandle::new("alice@example.com", 4);
        drop(rx);
        let msg = Arc::new(CollabMessage::leave("bob@example.com"));
        assert_eq!(handle.deliver(&msg), Err(DeliveryError::Closed));
    }
}
