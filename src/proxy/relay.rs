//! Bidirectional byte relay between client and upstream.
//!
//! One direction (client → upstream) runs on a spawned task, the other runs on
//! the connection's own task. Which completion ends the relay depends on the
//! [`Teardown`] policy. Once it ends, the spawned task is aborted and both
//! streams are dropped, which closes the sockets.

use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::io::{
    AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader,
};
use tokio::task::JoinHandle;

use crate::observability::metrics;
use crate::proxy::response::CONNECTION_ESTABLISHED;

/// Copy buffer size per direction.
const BUFFER_SIZE: usize = 32 * 1024;

/// Which side's completion tears the relay down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Teardown {
    /// Only upstream → client reaching EOF or failing ends the relay.
    UpstreamClosed,
    /// Whichever direction finishes first ends the relay.
    EitherClosed,
}

/// Bytes moved in each direction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelayStats {
    pub client_to_upstream: u64,
    pub upstream_to_client: u64,
}

/// Forward a plain HTTP request.
///
/// The request line goes first, then whatever `client` already buffered, then
/// raw client bytes. Ends when the upstream stops sending.
pub async fn http_relay<C, U>(
    client: BufReader<C>,
    mut upstream: U,
    request_line: &[u8],
) -> io::Result<RelayStats>
where
    C: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    U: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    upstream.write_all(request_line).await?;
    relay(client, upstream, Teardown::UpstreamClosed).await
}

/// Open a CONNECT tunnel.
///
/// Replies `200 Connection Established` before any data moves. Header lines
/// the line reader already pulled in are dropped; any other buffered bytes
/// are tunnelled like the rest.
pub async fn tunnel_relay<C, U>(mut client: BufReader<C>, upstream: U) -> io::Result<RelayStats>
where
    C: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    U: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let header_len = header_block_len(client.buffer());
    if header_len > 0 {
        tracing::trace!(bytes = header_len, "Discarding buffered CONNECT headers");
        client.consume(header_len);
    }

    client.write_all(CONNECTION_ESTABLISHED).await?;
    client.flush().await?;

    relay(client, upstream, Teardown::EitherClosed).await
}

/// Length of the buffered header section following a CONNECT request line.
///
/// Only complete header lines are counted, through the first empty line
/// (`\r\n` or `\n`). Counting stops before the first line that is not a
/// header or has no terminator yet; those bytes stay buffered as tunnel data.
fn header_block_len(buf: &[u8]) -> usize {
    let mut consumed = 0;
    while let Some(end) = buf[consumed..].iter().position(|&b| b == b'\n') {
        let line = &buf[consumed..consumed + end];
        let line = line.strip_suffix(b"\r").unwrap_or(line);
        let next = consumed + end + 1;

        if line.is_empty() {
            return next;
        }
        if !is_header_line(line) {
            break;
        }
        consumed = next;
    }
    consumed
}

/// `name: value` with a non-empty name made of visible ASCII.
fn is_header_line(line: &[u8]) -> bool {
    match line.iter().position(|&b| b == b':') {
        Some(0) | None => false,
        Some(colon) => line[..colon].iter().all(|b| b.is_ascii_graphic()),
    }
}

async fn relay<C, U>(client: C, upstream: U, teardown: Teardown) -> io::Result<RelayStats>
where
    C: AsyncRead + AsyncWrite + Send + 'static,
    U: AsyncRead + AsyncWrite + Send + 'static,
{
    let (mut client_read, mut client_write) = tokio::io::split(client);
    let (mut upstream_read, mut upstream_write) = tokio::io::split(upstream);

    let outbound_bytes = Arc::new(AtomicU64::new(0));
    let inbound_bytes = AtomicU64::new(0);

    let counter = Arc::clone(&outbound_bytes);
    let mut outbound: JoinHandle<io::Result<()>> = tokio::spawn(async move {
        let res = pump(&mut client_read, &mut upstream_write, &counter).await;
        upstream_write.shutdown().await.ok();
        res
    });

    let inbound = pump(&mut upstream_read, &mut client_write, &inbound_bytes);

    let mut outbound_finished = false;
    let result = match teardown {
        Teardown::UpstreamClosed => inbound.await,
        Teardown::EitherClosed => {
            tokio::select! {
                res = inbound => res,
                joined = &mut outbound => {
                    outbound_finished = true;
                    flatten(joined)
                }
            }
        }
    };

    // Closing is idempotent; the peer may already be gone.
    client_write.shutdown().await.ok();
    if !outbound_finished {
        outbound.abort();
        if let Err(e) = flatten(outbound.await) {
            tracing::trace!(error = %e, "client -> upstream ended");
        }
    }

    let stats = RelayStats {
        client_to_upstream: outbound_bytes.load(Ordering::Relaxed),
        upstream_to_client: inbound_bytes.load(Ordering::Relaxed),
    };
    metrics::record_relay(&stats);

    match result {
        Ok(()) => Ok(stats),
        Err(e) if is_disconnect(&e) => {
            tracing::trace!(error = %e, "Relay ended by disconnect");
            Ok(stats)
        }
        Err(e) => Err(e),
    }
}

/// Copy until EOF or error, counting bytes as they are written.
async fn pump<R, W>(reader: &mut R, writer: &mut W, written: &AtomicU64) -> io::Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buf = vec![0u8; BUFFER_SIZE];
    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            return Ok(());
        }
        writer.write_all(&buf[..n]).await?;
        writer.flush().await?;
        written.fetch_add(n as u64, Ordering::Relaxed);
    }
}

fn flatten(joined: Result<io::Result<()>, tokio::task::JoinError>) -> io::Result<()> {
    match joined {
        Ok(res) => res,
        Err(e) if e.is_cancelled() => Ok(()),
        Err(e) => Err(io::Error::other(e)),
    }
}

fn is_disconnect(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::BrokenPipe
            | io::ErrorKind::UnexpectedEof
            | io::ErrorKind::NotConnected
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::duplex;

    #[test]
    fn header_block_through_blank_line() {
        assert_eq!(header_block_len(b"\r\n"), 2);
        assert_eq!(header_block_len(b"\r\nDATA"), 2);
        assert_eq!(header_block_len(b"\nDATA"), 1);
        assert_eq!(header_block_len(b"Host: a:443\r\n\r\nDATA"), 15);
        assert_eq!(header_block_len(b"Host: a\n\nDATA"), 9);
        assert_eq!(header_block_len(b""), 0);
    }

    #[test]
    fn header_block_keeps_non_header_bytes() {
        // Unterminated fragment stays buffered.
        assert_eq!(header_block_len(b"Host: a:4"), 0);
        assert_eq!(header_block_len(b"Host: a\r\nUser-Ag"), 9);
        // Raw tunnel data with no headers at all.
        assert_eq!(header_block_len(b"\x16\x03\x01hello"), 0);
        assert_eq!(header_block_len(b"hello world\nmore"), 0);
        assert_eq!(header_block_len(b": no name\n\n"), 0);
    }

    #[tokio::test]
    async fn http_relay_sends_request_line_then_residual() {
        let (proxy_client, mut client) = duplex(1024);
        let (proxy_upstream, mut upstream) = duplex(1024);

        let mut reader = BufReader::new(proxy_client);
        client
            .write_all(b"GET http://a/ HTTP/1.1\r\nHost: a\r\n\r\n")
            .await
            .unwrap();
        let line = crate::proxy::request::read_request_line(&mut reader, 8192)
            .await
            .unwrap();

        let relay = tokio::spawn(async move {
            http_relay(reader, proxy_upstream, line.raw()).await
        });

        let expected = b"GET http://a/ HTTP/1.1\r\nHost: a\r\n\r\n";
        let mut received = vec![0u8; expected.len()];
        upstream.read_exact(&mut received).await.unwrap();
        assert_eq!(&received, expected);

        upstream.write_all(b"HTTP/1.1 200 OK\r\n\r\nhi").await.unwrap();
        drop(upstream);

        let mut response = Vec::new();
        client.read_to_end(&mut response).await.unwrap();
        assert_eq!(response, b"HTTP/1.1 200 OK\r\n\r\nhi");

        let stats = relay.await.unwrap().unwrap();
        assert_eq!(stats.upstream_to_client, 21);
    }

    #[tokio::test]
    async fn tunnel_relay_replies_then_pipes_both_ways() {
        let (proxy_client, mut client) = duplex(1024);
        let (proxy_upstream, mut upstream) = duplex(1024);

        let relay = tokio::spawn(async move {
            tunnel_relay(BufReader::new(proxy_client), proxy_upstream).await
        });

        let mut reply = vec![0u8; CONNECTION_ESTABLISHED.len()];
        client.read_exact(&mut reply).await.unwrap();
        assert_eq!(reply, CONNECTION_ESTABLISHED);

        client.write_all(b"ping").await.unwrap();
        let mut buf = [0u8; 4];
        upstream.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"ping");

        upstream.write_all(b"pong").await.unwrap();
        client.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"pong");

        drop(client);
        let stats = relay.await.unwrap().unwrap();
        assert_eq!(stats.client_to_upstream, 4);
        assert_eq!(stats.upstream_to_client, 4);
    }

    #[tokio::test]
    async fn tunnel_relay_forwards_data_pipelined_after_headers() {
        let (proxy_client, mut client) = duplex(1024);
        let (proxy_upstream, mut upstream) = duplex(1024);

        client
            .write_all(b"CONNECT a:443 HTTP/1.1\r\nHost: a:443\r\n\r\nhello")
            .await
            .unwrap();
        let mut reader = BufReader::new(proxy_client);
        crate::proxy::request::read_request_line(&mut reader, 8192)
            .await
            .unwrap();

        let relay = tokio::spawn(async move { tunnel_relay(reader, proxy_upstream).await });

        let mut buf = [0u8; 5];
        upstream.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"hello");

        drop(upstream);
        relay.await.unwrap().unwrap();
    }

    async fn upstream_bytes_after_connect(input: &'static [u8]) -> Vec<u8> {
        let (proxy_client, mut client) = duplex(1024);
        let (proxy_upstream, mut upstream) = duplex(1024);

        client.write_all(input).await.unwrap();
        let mut reader = BufReader::new(proxy_client);
        crate::proxy::request::read_request_line(&mut reader, 8192)
            .await
            .unwrap();

        let relay = tokio::spawn(async move { tunnel_relay(reader, proxy_upstream).await });

        let mut reply = vec![0u8; CONNECTION_ESTABLISHED.len()];
        client.read_exact(&mut reply).await.unwrap();
        drop(client);

        let mut received = Vec::new();
        upstream.read_to_end(&mut received).await.unwrap();
        relay.await.unwrap().unwrap();
        received
    }

    #[tokio::test]
    async fn tunnel_relay_forwards_data_sent_without_headers() {
        let received = upstream_bytes_after_connect(b"CONNECT a:443 HTTP/1.1\r\n\x16\x03\x01hello").await;
        assert_eq!(received, b"\x16\x03\x01hello");
    }

    #[tokio::test]
    async fn tunnel_relay_forwards_data_after_lf_headers() {
        let received = upstream_bytes_after_connect(b"CONNECT a:443 HTTP/1.1\nHost: a\n\nhello").await;
        assert_eq!(received, b"hello");
    }

    #[tokio::test]
    async fn teardown_survives_both_sides_closing() {
        let (proxy_client, client) = duplex(64);
        let (proxy_upstream, upstream) = duplex(64);
        drop(client);
        drop(upstream);

        let stats = tunnel_relay(BufReader::new(proxy_client), proxy_upstream).await;
        // Writing the 200 to a closed client fails; nothing hangs or panics.
        assert!(stats.is_err() || stats.unwrap() == RelayStats::default());
    }
}
