//! Fixed responses the proxy answers itself.
//!
//! Nothing here touches an upstream. Write errors are swallowed because the
//! connection is closed straight afterwards either way.

use tokio::io::{AsyncWrite, AsyncWriteExt};

/// Body of the 404 returned for origin-form requests.
pub const NOT_FOUND_BODY: &str = "This is a proxy server.";

/// Reply to a successful CONNECT.
pub const CONNECTION_ESTABLISHED: &[u8] = b"HTTP/1.1 200 Connection Established\r\n\r\n";

/// `text/plain` response with CRLF framing and an exact `Content-Length`.
fn plain_text(status_line: &str, body: &str) -> Vec<u8> {
    format!(
        "{status_line}\r\nContent-Type: text/plain\r\nContent-Length: {}\r\n\r\n{body}",
        body.len()
    )
    .into_bytes()
}

pub fn not_found() -> Vec<u8> {
    plain_text("HTTP/1.1 404 Not Found", NOT_FOUND_BODY)
}

pub fn bad_request(message: &str) -> Vec<u8> {
    plain_text("HTTP/1.1 400 Bad Request", message)
}

pub async fn send_not_found<W>(writer: &mut W)
where
    W: AsyncWrite + Unpin,
{
    send(writer, &not_found(), 404).await;
}

pub async fn send_bad_request<W>(writer: &mut W, message: &str)
where
    W: AsyncWrite + Unpin,
{
    send(writer, &bad_request(message), 400).await;
}

async fn send<W>(writer: &mut W, response: &[u8], status: u16)
where
    W: AsyncWrite + Unpin,
{
    let result = async {
        writer.write_all(response).await?;
        writer.flush().await
    }
    .await;

    if let Err(e) = result {
        tracing::debug!(status, error = %e, "Failed to write local response");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_is_exact() {
        assert_eq!(NOT_FOUND_BODY.len(), 23);
        assert_eq!(
            not_found(),
            b"HTTP/1.1 404 Not Found\r\n\
              Content-Type: text/plain\r\n\
              Content-Length: 23\r\n\
              \r\n\
              This is a proxy server."
                .to_vec()
        );
    }

    #[test]
    fn bad_request_length_matches_message() {
        let response = String::from_utf8(bad_request("Invalid request line")).unwrap();
        assert!(response.starts_with("HTTP/1.1 400 Bad Request\r\n"));
        assert!(response.contains("Content-Type: text/plain\r\n"));
        assert!(response.contains("Content-Length: 20\r\n"));
        assert!(response.ends_with("\r\n\r\nInvalid request line"));
    }

    #[tokio::test]
    async fn send_writes_whole_response() {
        let mut out = Vec::new();
        send_not_found(&mut out).await;
        assert_eq!(out, not_found());
    }
}
