//! Dedicated writer task for outgoing lines.
//!
//! All senders share one mpsc channel feeding a single task that owns the
//! write half of the transport, so concurrent `send` calls never interleave
//! partial lines and are written in the order they were queued.
//!
//! ```text
//! Caller 1 ─┐
//! Caller 2 ─┼─► mpsc::Sender<OutboundLine> ─► Writer Task ─► Transport
//! Caller N ─┘
//! ```
//!
//! Each line carries a `oneshot` that is completed after the batch containing
//! it was written and flushed. When the link leaves the open state the task
//! exits; queued and in-flight lines are dropped, which fails their senders
//! with [`LinkError::ConnectionClosed`].
//!
//! A failed write is fatal: the batch fails with the I/O error and the task
//! moves the link from open to lost before exiting.

use std::io;
use std::sync::Arc;

use bytes::Bytes;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;

use crate::error::{LinkError, Result};
use crate::link::{mark_lost, LinkState};

/// Default channel capacity.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 256;

/// Maximum lines to batch in a single write operation.
const MAX_BATCH_SIZE: usize = 64;

/// A line queued for the transport.
#[derive(Debug)]
struct OutboundLine {
    line: Bytes,
    done: oneshot::Sender<io::Result<()>>,
}

/// Configuration for the writer task.
#[derive(Debug, Clone)]
pub struct WriterConfig {
    /// Channel capacity for the line queue.
    pub channel_capacity: usize,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }
}

/// Handle for sending lines to the writer task.
///
/// This is cheaply cloneable.
#[derive(Clone)]
pub struct WriterHandle {
    tx: mpsc::Sender<OutboundLine>,
}

impl WriterHandle {
    /// Queue a line and wait until it has been written and flushed.
    pub async fn send(&self, line: Bytes) -> Result<()> {
        let (done, written) = oneshot::channel();

        self.tx
            .send(OutboundLine { line, done })
            .await
            .map_err(|_| LinkError::ConnectionClosed)?;

        written
            .await
            .map_err(|_| LinkError::ConnectionClosed)?
            .map_err(LinkError::Io)
    }
}

/// Spawn the writer task and return a handle for sending lines.
///
/// The task runs until `state` leaves [`LinkState::Open`], every handle is
/// dropped, or a write fails. A failed write marks the link lost.
pub fn spawn_writer_task<W>(
    writer: W,
    config: WriterConfig,
    state: Arc<watch::Sender<LinkState>>,
) -> (WriterHandle, JoinHandle<Result<()>>)
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (tx, rx) = mpsc::channel(config.channel_capacity.max(1));
    let task = tokio::spawn(writer_loop(rx, writer, state));
    (WriterHandle { tx }, task)
}

async fn writer_loop<W>(
    mut rx: mpsc::Receiver<OutboundLine>,
    mut writer: W,
    link_state: Arc<watch::Sender<LinkState>>,
) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let mut state = link_state.subscribe();
    loop {
        let first = tokio::select! {
            biased;
            _ = state.wait_for(|s| *s != LinkState::Open) => return Ok(()),
            line = rx.recv() => match line {
                Some(line) => line,
                None => return Ok(()),
            },
        };

        // Collect additional ready lines (non-blocking)
        let mut batch = Vec::with_capacity(MAX_BATCH_SIZE);
        batch.push(first);
        while batch.len() < MAX_BATCH_SIZE {
            match rx.try_recv() {
                Ok(line) => batch.push(line),
                Err(_) => break,
            }
        }

        let result = tokio::select! {
            biased;
            _ = state.wait_for(|s| *s != LinkState::Open) => return Ok(()),
            result = write_batch(&mut writer, &batch) => result,
        };

        match result {
            Ok(()) => {
                for line in batch {
                    let _ = line.done.send(Ok(()));
                }
            }
            Err(e) => {
                tracing::error!("Transport write failed: {}", e);
                for line in batch {
                    let _ = line.done.send(Err(io::Error::new(e.kind(), e.to_string())));
                }
                mark_lost(&link_state);
                return Err(LinkError::Io(e));
            }
        }
    }
}

/// Write a batch of lines back to back, then flush once.
async fn write_batch<W>(writer: &mut W, batch: &[OutboundLine]) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    for line in batch {
        writer.write_all(&line.line).await?;
    }
    writer.flush().await
}
