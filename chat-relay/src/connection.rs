//! Per-connection dispatch loop.
//!
//! Each accepted connection runs one loop that waits on two sources: lines
//! decoded by the [`LineReader`] and lines queued into the session's outbox.
//! The loop is the only writer to its socket and the only reader of its
//! outbox; other sessions reach it through [`Registry::broadcast`].

use std::{future::Future, net::SocketAddr, sync::Arc};

use anyhow::Result;
use tokio::{
    io::{AsyncRead, AsyncWrite, AsyncWriteExt},
    select,
};
use tracing::{debug, info};

use crate::{
    message,
    reader::LineReader,
    registry::Registry,
    session::{self, Outbox, OutboxReceiver, Session},
};

const IDENTITY_TRIM: &[char] = &['\r', '\n'];

enum Phase {
    Unregistered,
    Registered(Session),
}

/// Runs the registration and relay protocol for one client until its
/// inbound stream closes or a write fails.
///
/// Whatever the exit path, the session is removed from the registry if it
/// ever registered, and both halves of the connection are dropped.
pub async fn handle_connection<R, W>(
    reader: R,
    writer: W,
    registry: Arc<Registry>,
    peer: Option<SocketAddr>,
) -> Result<()>
where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin,
{
    let mut lines = LineReader::spawn(reader);
    let (outbox, outbox_rx) = session::outbox();
    let mut conn = Connection {
        writer,
        outbox: outbox_rx,
    };
    let mut phase = Phase::Unregistered;

    let result = dispatch(&mut conn, &mut lines, &registry, &outbox, peer, &mut phase).await;

    // Senders still holding our outbox fail fast from here on.
    conn.outbox.close();
    if let Phase::Registered(session) = &phase {
        if registry.remove(session).await {
            info!(
                ?peer,
                identity = session.identity(),
                joined_at = %message::timestamp(session.joined_at()),
                "client left"
            );
        }
    }

    result
}

async fn dispatch<W>(
    conn: &mut Connection<W>,
    lines: &mut LineReader,
    registry: &Registry,
    outbox: &Outbox,
    peer: Option<SocketAddr>,
    phase: &mut Phase,
) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    conn.write(message::USERNAME_PROMPT).await?;

    loop {
        select! {
            line = lines.next_line() => {
                let Some(line) = line else {
                    debug!(?peer, "inbound stream closed");
                    return Ok(());
                };
                match phase {
                    Phase::Unregistered => {
                        if let Some(session) = register(conn, registry, outbox, peer, &line).await? {
                            *phase = Phase::Registered(session);
                        }
                    }
                    Phase::Registered(session) => {
                        conn.drain_while(registry.broadcast(&line, session.identity())).await?;
                    }
                }
            }
            Some(queued) = conn.outbox.recv() => {
                conn.write(&queued).await?;
            }
        }
    }
}

/// Attempts to register the identity carried by `line`.
///
/// Returns the new session on success, `None` if the line was blank or the
/// identity is taken (the client may retry).
async fn register<W>(
    conn: &mut Connection<W>,
    registry: &Registry,
    outbox: &Outbox,
    peer: Option<SocketAddr>,
    line: &str,
) -> Result<Option<Session>>
where
    W: AsyncWrite + Unpin,
{
    let identity = line.trim_matches(IDENTITY_TRIM);
    if identity.is_empty() {
        return Ok(None);
    }

    let session = Session::new(identity, outbox.clone()).with_peer(peer);
    // Other members can reach us as soon as we are inserted, but the welcome
    // line has to be the first thing written after a successful name.
    let (added, held) = conn.hold_while(registry.add(session.clone())).await;
    let registered = match added {
        Ok(()) => {
            conn.write(&message::welcome(identity)).await?;
            info!(?peer, identity, "client joined");
            Some(session)
        }
        Err(err) => {
            debug!(?peer, error = %err, "registration rejected");
            None
        }
    };
    for queued in held {
        conn.write(&queued).await?;
    }

    Ok(registered)
}

struct Connection<W> {
    writer: W,
    outbox: OutboxReceiver,
}

impl<W> Connection<W>
where
    W: AsyncWrite + Unpin,
{
    async fn write(&mut self, text: &str) -> std::io::Result<()> {
        self.writer.write_all(text.as_bytes()).await?;
        self.writer.flush().await
    }

    /// Awaits `operation` while still flushing this session's outbox.
    ///
    /// A registry fan-out can wait on another session's full outbox. That
    /// session may itself be waiting on ours, so we keep draining until the
    /// operation finishes.
    async fn drain_while<F>(&mut self, operation: F) -> std::io::Result<F::Output>
    where
        F: Future,
    {
        tokio::pin!(operation);
        loop {
            select! {
                biased;
                output = &mut operation => return Ok(output),
                Some(queued) = self.outbox.recv() => self.write(&queued).await?,
            }
        }
    }

    /// Like [`Connection::drain_while`], but keeps the drained lines for the
    /// caller to write afterwards instead of writing them immediately.
    async fn hold_while<F>(&mut self, operation: F) -> (F::Output, Vec<String>)
    where
        F: Future,
    {
        tokio::pin!(operation);
        let mut held = Vec::new();
        loop {
            select! {
                biased;
                output = &mut operation => return (output, held),
                Some(queued) = self.outbox.recv() => held.push(queued),
            }
        }
    }
}
