use std::net::SocketAddr;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;

/// Pending outbound lines for one session. At most one line is in flight;
/// a second enqueue waits until the owning dispatch loop drains the first.
pub const OUTBOX_CAPACITY: usize = 1;

pub type Outbox = mpsc::Sender<String>;
pub type OutboxReceiver = mpsc::Receiver<String>;

pub fn outbox() -> (Outbox, OutboxReceiver) {
    mpsc::channel(OUTBOX_CAPACITY)
}

/// A client that has asked to register under `identity`.
///
/// Cloning is cheap and every clone shares the same outbox. The identity is
/// fixed at construction; a client retrying with another name gets a fresh
/// `Session`.
#[derive(Debug, Clone)]
pub struct Session {
    identity: String,
    joined_at: DateTime<Utc>,
    peer: Option<SocketAddr>,
    outbox: Outbox,
}

impl Session {
    pub fn new(identity: impl Into<String>, outbox: Outbox) -> Self {
        Self {
            identity: identity.into(),
            joined_at: Utc::now(),
            peer: None,
            outbox,
        }
    }

    pub fn with_peer(mut self, peer: Option<SocketAddr>) -> Self {
        self.peer = peer;
        self
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }

    pub fn joined_at(&self) -> DateTime<Utc> {
        self.joined_at
    }

    pub fn peer(&self) -> Option<SocketAddr> {
        self.peer
    }

    /// Queues a line for this session, waiting while the outbox is full.
    ///
    /// Returns `false` if the session's dispatch loop has already shut down.
    pub async fn enqueue(&self, line: String) -> bool {
        self.outbox.send(line).await.is_ok()
    }
}
