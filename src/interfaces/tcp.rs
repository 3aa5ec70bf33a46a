//! Raw tilde-protocol listener: one command per connection.

use crate::application::decoder::CommandVector;
use crate::application::dispatcher::{DispatchError, Dispatcher};
use serde_json::{Value, json};
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Semaphore;
use tokio::time::timeout;
use tracing::{debug, info, warn};

/// Largest command accepted on a single connection.
pub const MAX_COMMAND_BYTES: usize = 1024;

#[derive(Debug, Clone, Copy)]
pub struct TcpConfig {
    pub max_connections: usize,
    pub io_timeout: Duration,
}

impl Default for TcpConfig {
    fn default() -> Self {
        Self {
            max_connections: 256,
            io_timeout: Duration::from_secs(10),
        }
    }
}

/// `1~{json}\n` on success, `0~{"error":{...}}\n` on failure.
pub fn render_reply(reply: &std::result::Result<Value, DispatchError>) -> String {
    match reply {
        Ok(value) => format!("1~{}\n", value),
        Err(err) => format!("0~{}\n", json!({ "error": err.body() })),
    }
}

/// Accepts connections until the listener fails. A permit is taken before
/// `accept`, so at most `max_connections` are served at once.
pub async fn serve(
    listener: TcpListener,
    dispatcher: Arc<Dispatcher>,
    config: TcpConfig,
) -> io::Result<()> {
    info!("TCP protocol listening on {}", listener.local_addr()?);
    let permits = Arc::new(Semaphore::new(config.max_connections.max(1)));

    loop {
        let Ok(permit) = permits.clone().acquire_owned().await else {
            return Ok(());
        };
        let (stream, peer) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(e) => {
                warn!(error = %e, "failed to accept connection");
                continue;
            }
        };

        let dispatcher = dispatcher.clone();
        tokio::spawn(async move {
            if let Err(e) = handle_connection(stream, peer, &dispatcher, config.io_timeout).await {
                warn!(%peer, error = %e, "connection dropped");
            }
            drop(permit);
        });
    }
}

/// Reads into `buf` until a newline, end of stream, or a full buffer, so a
/// command split across several TCP segments arrives whole.
async fn read_command<R>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize>
where
    R: AsyncRead + Unpin,
{
    let mut filled = 0;
    while filled < buf.len() {
        let read = reader.read(&mut buf[filled..]).await?;
        if read == 0 {
            break;
        }
        filled += read;
        if buf[filled - read..filled].contains(&b'\n') {
            break;
        }
    }
    Ok(filled)
}

async fn handle_connection(
    mut stream: TcpStream,
    peer: SocketAddr,
    dispatcher: &Dispatcher,
    io_timeout: Duration,
) -> io::Result<()> {
    let mut buf = [0u8; MAX_COMMAND_BYTES];
    let read = timeout(io_timeout, read_command(&mut stream, &mut buf))
        .await
        .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "read timed out"))??;
    if read == 0 {
        debug!(%peer, "connection closed before sending a command");
        return Ok(());
    }

    let raw = String::from_utf8_lossy(&buf[..read]);
    let reply = dispatcher.dispatch(&CommandVector::parse_line(&raw)).await;
    if let Err(e) = &reply {
        debug!(%peer, error = %e, "command rejected");
    }

    let rendered = render_reply(&reply);
    timeout(io_timeout, async {
        stream.write_all(rendered.as_bytes()).await?;
        stream.shutdown().await
    })
    .await
    .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "write timed out"))?
}
