use std::time::{Duration, Instant};

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::id::ClientId;
use crate::wire::Envelope;

const DEFAULT_MAILBOX_CAPACITY: usize = 64;
const BACKPRESSURE_THRESHOLD: f64 = 0.8;
const SEND_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, thiserror::Error)]
pub enum SendError {
    #[error("client connection stopped")]
    Stopped,
    #[error("client mailbox is full")]
    MailboxFull,
    #[error("timed out sending to client")]
    Timeout,
}

/// A handle to a single client connection's outbound mailbox, mirroring the
/// actor-handle send/backpressure conventions: a `try_send` fast path, and a
/// `reserve()` + timeout slow path for callers that must not drop a message.
#[derive(Clone)]
pub struct ClientHandle {
    sender: mpsc::Sender<Envelope>,
    cancellation_token: CancellationToken,
    client_id: ClientId,
    connected_at: Instant,
}

impl ClientHandle {
    pub fn new(client_id: ClientId) -> (Self, mpsc::Receiver<Envelope>) {
        let (tx, rx) = mpsc::channel(DEFAULT_MAILBOX_CAPACITY);
        let handle = Self {
            sender: tx,
            cancellation_token: CancellationToken::new(),
            client_id,
            connected_at: Instant::now(),
        };
        (handle, rx)
    }

    pub fn client_id(&self) -> ClientId {
        self.client_id
    }

    pub fn try_send(&self, envelope: Envelope) -> Result<(), SendError> {
        self.sender.try_send(envelope).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => SendError::MailboxFull,
            mpsc::error::TrySendError::Closed(_) => SendError::Stopped,
        })
    }

    pub async fn send(&self, envelope: Envelope) -> Result<(), SendError> {
        if let Ok(()) = self.try_send(envelope.clone()) {
            return Ok(());
        }
        let permit = tokio::time::timeout(SEND_TIMEOUT, self.sender.reserve())
            .await
            .map_err(|_| SendError::Timeout)?
            .map_err(|_| SendError::Stopped)?;
        permit.send(envelope);
        Ok(())
    }

    pub fn mailbox_capacity(&self) -> usize {
        self.sender.max_capacity()
    }

    pub fn mailbox_usage(&self) -> usize {
        self.mailbox_capacity() - self.sender.capacity()
    }

    pub fn should_apply_backpressure(&self) -> bool {
        let cap = self.mailbox_capacity() as f64;
        if cap == 0.0 {
            return false;
        }
        (self.mailbox_usage() as f64 / cap) >= BACKPRESSURE_THRESHOLD
    }

    pub fn cancel(&self) {
        self.cancellation_token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation_token.is_cancelled()
    }

    pub fn uptime(&self) -> Duration {
        self.connected_at.elapsed()
    }

    pub fn child_token(&self) -> CancellationToken {
        self.cancellation_token.child_token()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::Message;

    #[tokio::test]
    async fn try_send_then_receive() {
        let (handle, mut rx) = ClientHandle::new(ClientId::new());
        handle.try_send(Envelope::new(1, Message::KeepAlive)).unwrap();
        let env = rx.recv().await.unwrap();
        assert_eq!(env.message_id, 1);
    }

    #[tokio::test]
    async fn send_after_cancel_fails_once_receiver_dropped() {
        let (handle, rx) = ClientHandle::new(ClientId::new());
        drop(rx);
        handle.cancel();
        let result = handle.send(Envelope::new(2, Message::KeepAlive)).await;
        assert!(matches!(result, Err(SendError::Stopped)));
    }
}
