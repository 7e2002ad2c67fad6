//! Size-capped HTTP retrieval of referenced payloads.

use lurepot_core::{FetchError, FetchOptions};
use tracing::debug;

/// Matches what exploitation toolchains expect to see fetching a class.
const USER_AGENT: &str = "Java/17.0.1";

/// Redirects are followed; anything past this status is a failed fetch.
const MAX_OK_STATUS: u16 = 302;

/// Download `url`, honoring the configured timeouts and size cap.
///
/// # Errors
///
/// Returns a `FetchError` on client construction failure, transport errors,
/// a status above 302, or a body exceeding `opts.max_bytes`.
pub async fn download(url: &str, opts: &FetchOptions) -> Result<Vec<u8>, FetchError> {
    debug!(url, "downloading referenced payload");

    let client = reqwest::Client::builder()
        .connect_timeout(opts.connect_timeout)
        .timeout(opts.read_timeout)
        .user_agent(USER_AGENT)
        .build()
        .map_err(|e| FetchError::Http(e.to_string()))?;

    let mut response = client
        .get(url)
        .send()
        .await
        .map_err(|e| FetchError::Http(e.to_string()))?;

    let status = response.status().as_u16();
    if status > MAX_OK_STATUS {
        return Err(FetchError::HttpStatus(status));
    }

    let mut body = Vec::new();
    while let Some(chunk) = response
        .chunk()
        .await
        .map_err(|e| FetchError::Http(e.to_string()))?
    {
        if (body.len() + chunk.len()) as u64 > opts.max_bytes {
            return Err(FetchError::TooLarge(opts.max_bytes));
        }
        body.extend_from_slice(&chunk);
    }

    debug!(url, bytes = body.len(), "payload downloaded");
    Ok(body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    fn test_opts() -> FetchOptions {
        FetchOptions {
            enabled: true,
            connect_timeout: Duration::from_secs(1),
            read_timeout: Duration::from_secs(1),
            max_bytes: 64,
            ..FetchOptions::default()
        }
    }

    async fn canned_server(status_line: &'static str, body: &'static [u8]) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 2048];
            let _ = stream.read(&mut buf).await;
            let head = format!(
                "{status_line}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                body.len()
            );
            stream.write_all(head.as_bytes()).await.unwrap();
            stream.write_all(body).await.unwrap();
        });
        format!("http://{addr}/payload.class")
    }

    #[tokio::test]
    async fn downloads_a_small_body() {
        let url = canned_server("HTTP/1.1 200 OK", b"hello").await;
        let body = download(&url, &test_opts()).await.unwrap();
        assert_eq!(body, b"hello");
    }

    #[tokio::test]
    async fn error_status_fails() {
        let url = canned_server("HTTP/1.1 404 Not Found", b"gone").await;
        let err = download(&url, &test_opts()).await.unwrap_err();
        assert!(matches!(err, FetchError::HttpStatus(404)), "{err}");
    }

    #[tokio::test]
    async fn oversized_body_is_capped() {
        let url = canned_server("HTTP/1.1 200 OK", &[0x41u8; 256]).await;
        let err = download(&url, &test_opts()).await.unwrap_err();
        assert!(matches!(err, FetchError::TooLarge(64)), "{err}");
    }

    #[tokio::test]
    async fn refused_connection_fails() {
        let err = download("http://127.0.0.1:1/x", &test_opts())
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::Http(_)), "{err}");
    }
}
