//! Tokio driver: pumps an async byte stream through a [`Connection`].

use std::time::Duration;

use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, trace};

use crate::adapter::{Connection, HttpHost, Transport};
use crate::error::Result;

/// How the connection was asked to close.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseMode {
    /// After everything queued has been written.
    AfterWriting,
    /// Right away, dropping queued bytes.
    Immediately,
}

/// A [`Transport`] that queues writes for [`serve`] to flush.
#[derive(Debug, Default)]
pub struct QueuedTransport {
    outbound: BytesMut,
    close: Option<CloseMode>,
    idle_timeout: Option<Duration>,
}

impl QueuedTransport {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Bytes waiting to be written.
    #[must_use]
    pub fn pending(&self) -> &[u8] {
        &self.outbound
    }

    /// Take the bytes waiting to be written.
    pub fn take_pending(&mut self) -> BytesMut {
        self.outbound.split()
    }

    #[must_use]
    pub fn close_mode(&self) -> Option<CloseMode> {
        self.close
    }

    #[must_use]
    pub fn idle_timeout(&self) -> Option<Duration> {
        self.idle_timeout
    }
}

impl Transport for QueuedTransport {
    fn send_data(&mut self, data: &[u8]) {
        if self.close.is_none() {
            self.outbound.extend_from_slice(data);
        }
    }

    fn close_connection(&mut self, after_writing: bool) {
        self.close = match (self.close, after_writing) {
            (Some(CloseMode::Immediately), _) | (_, false) => Some(CloseMode::Immediately),
            _ => Some(CloseMode::AfterWriting),
        };
        if self.close == Some(CloseMode::Immediately) {
            self.outbound.clear();
        }
    }

    fn set_inactivity_timeout(&mut self, timeout: Option<Duration>) {
        self.idle_timeout = timeout;
    }
}

/// Serve one connection until the peer leaves, the bridge closes it, or the
/// idle timeout fires. The connection is unbound on the way out.
///
/// # Errors
///
/// I/O errors, and failures the bridge could not route to an error callback.
pub async fn serve<S, H>(stream: &mut S, conn: &mut Connection<H, QueuedTransport>) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
    H: HttpHost,
{
    let result = pump(stream, conn).await;
    if let Err(err) = stream.shutdown().await {
        trace!(error = %err, "shutdown failed");
    }
    let unbound = conn.on_unbind();
    result.and(unbound)
}

async fn pump<S, H>(stream: &mut S, conn: &mut Connection<H, QueuedTransport>) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
    H: HttpHost,
{
    let mut read_buf = BytesMut::with_capacity(conn.config().read_buffer_size);
    loop {
        let pending = conn.transport_mut().take_pending();
        match conn.transport().close_mode() {
            Some(CloseMode::Immediately) => {
                debug!("connection aborted");
                return Ok(());
            }
            Some(CloseMode::AfterWriting) => {
                stream.write_all(&pending).await?;
                stream.flush().await?;
                debug!("connection closed");
                return Ok(());
            }
            None if !pending.is_empty() => {
                stream.write_all(&pending).await?;
                stream.flush().await?;
            }
            None => {}
        }

        read_buf.clear();
        let read = match conn.transport().idle_timeout() {
            Some(limit) => match tokio::time::timeout(limit, stream.read_buf(&mut read_buf)).await {
                Ok(read) => read?,
                Err(_) => {
                    debug!(?limit, "idle timeout");
                    return Ok(());
                }
            },
            None => stream.read_buf(&mut read_buf).await?,
        };
        if read == 0 {
            debug!("peer closed connection");
            return Ok(());
        }
        conn.on_incoming_bytes(&read_buf)?;
    }
}
