//! The shared list of registered sessions.
//!
//! Every mutation and every broadcast snapshot goes through one lock, so the
//! identity check in [`Registry::add`] and the insert that follows cannot
//! interleave with another `add` or `remove`. Delivery into outboxes happens
//! after the lock is released: a full outbox stalls only the caller, never the
//! registry.

use std::net::SocketAddr;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::debug;

use crate::{message, session::Session};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("username '{0}' is already in use")]
    DuplicateIdentity(String),
}

pub struct Registry {
    listen_addr: SocketAddr,
    started_at: DateTime<Utc>,
    // Registration order.
    sessions: Mutex<Vec<Session>>,
}

impl Registry {
    pub fn new(listen_addr: SocketAddr) -> Self {
        Self {
            listen_addr,
            started_at: Utc::now(),
            sessions: Mutex::new(Vec::new()),
        }
    }

    pub fn listen_addr(&self) -> SocketAddr {
        self.listen_addr
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Identities of the active sessions, in registration order.
    pub async fn identities(&self) -> Vec<String> {
        let sessions = self.sessions.lock().await;
        sessions
            .iter()
            .map(|session| session.identity().to_string())
            .collect()
    }

    /// Registers `session` if no active session has the same identity.
    ///
    /// On success every other member is told the session joined. On failure
    /// the rejection notice is queued into the rejected session's own outbox.
    pub async fn add(&self, session: Session) -> Result<(), RegistryError> {
        let identity = session.identity().to_string();
        let recipients = {
            let mut sessions = self.sessions.lock().await;
            if sessions.iter().any(|active| active.identity() == identity) {
                None
            } else {
                let others = sessions.clone();
                sessions.push(session.clone());
                Some(others)
            }
        };

        let Some(recipients) = recipients else {
            debug!(%identity, "rejecting duplicate username");
            session.enqueue(message::USERNAME_IN_USE.to_string()).await;
            return Err(RegistryError::DuplicateIdentity(identity));
        };

        let line = message::relay_line(&identity, Utc::now(), message::JOINED);
        deliver(&recipients, &line).await;
        Ok(())
    }

    /// Removes the active session with `session`'s identity and tells the
    /// remaining members it left. Returns `false`, and notifies nobody, if
    /// there was no such session.
    pub async fn remove(&self, session: &Session) -> bool {
        let recipients = {
            let mut sessions = self.sessions.lock().await;
            let Some(index) = sessions
                .iter()
                .position(|active| active.identity() == session.identity())
            else {
                return false;
            };
            sessions.remove(index);
            sessions.clone()
        };

        let now = Utc::now();
        let line = message::relay_line(session.identity(), now, &message::left_at(now));
        deliver(&recipients, &line).await;
        true
    }

    /// Sends `[sender][timestamp]: text` to every active session except the
    /// sender, waiting on any recipient whose outbox is full.
    pub async fn broadcast(&self, text: &str, sender: &str) {
        let recipients: Vec<Session> = {
            let sessions = self.sessions.lock().await;
            sessions
                .iter()
                .filter(|session| session.identity() != sender)
                .cloned()
                .collect()
        };

        let line = message::relay_line(sender, Utc::now(), text);
        deliver(&recipients, &line).await;
    }
}

async fn deliver(recipients: &[Session], line: &str) {
    for recipient in recipients {
        if !recipient.enqueue(line.to_string()).await {
            debug!(
                identity = recipient.identity(),
                peer = ?recipient.peer(),
                "recipient already disconnected"
            );
        }
    }
}
