// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;

/// User agent sent with every outbound request
pub const USER_AGENT: &str = concat!("podstash/", env!("CARGO_PKG_VERSION"));

/// A streaming response body
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, reqwest::Error>> + Send>>;

/// HTTP response with status, content length, and body stream
pub struct HttpResponse {
    /// HTTP status code
    pub status: u16,
    /// Content-Length header value, if present
    pub content_length: Option<u64>,
    /// Response body as a stream of bytes
    pub body: ByteStream,
}

/// HTTP client abstraction for testability
#[async_trait]
pub trait HttpClient: Send + Sync {
    /// Issue a GET and return the response as a stream
    async fn get_stream(&self, url: &str) -> Result<HttpResponse, reqwest::Error>;
}

/// Timeouts applied to every request
#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// Longest a response may go without delivering any bytes. Slow but
    /// steady transfers are never cut off.
    pub read_timeout: Duration,
    /// Upper bound for establishing the connection
    pub connect_timeout: Duration,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            read_timeout: Duration::from_secs(300),
            connect_timeout: Duration::from_secs(30),
        }
    }
}

/// Default HTTP client implementation using reqwest
#[derive(Clone)]
pub struct ReqwestClient {
    client: reqwest::Client,
}

impl ReqwestClient {
    /// Create a client with the podstash user agent and the given timeouts
    pub fn new(options: &ClientOptions) -> Result<Self, reqwest::Error> {
        let client = builder(options).build()?;
        Ok(Self { client })
    }
}

fn builder(options: &ClientOptions) -> reqwest::ClientBuilder {
    reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .read_timeout(options.read_timeout)
        .connect_timeout(options.connect_timeout)
}

#[async_trait]
impl HttpClient for ReqwestClient {
    async fn get_stream(&self, url: &str) -> Result<HttpResponse, reqwest::Error> {
        let response = self.client.get(url).send().await?;
        let status = response.status().as_u16();
        let content_length = response.content_length();

        let body: ByteStream = Box::pin(response.bytes_stream());

        Ok(HttpResponse {
            status,
            content_length,
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use std::time::Instant;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Serve one response whose body bytes arrive `gap` apart. With `stall`
    /// set, the server stops sending after the first two bytes.
    async fn trickle_server(gap: Duration, stall: bool) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = [0u8; 1024];
            let _ = socket.read(&mut request).await.unwrap();
            socket
                .write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 6\r\n\r\n")
                .await
                .unwrap();
            for (i, byte) in b"abcdef".iter().enumerate() {
                if stall && i == 2 {
                    tokio::time::sleep(Duration::from_secs(30)).await;
                }
                socket.write_all(&[*byte]).await.unwrap();
                socket.flush().await.unwrap();
                tokio::time::sleep(gap).await;
            }
        });
        format!("http://{addr}/episode.mp3")
    }

    fn local_client(read_timeout: Duration) -> ReqwestClient {
        let options = ClientOptions {
            read_timeout,
            ..ClientOptions::default()
        };
        ReqwestClient {
            client: builder(&options).no_proxy().build().unwrap(),
        }
    }

    async fn read_body(client: &ReqwestClient, url: &str) -> Result<Vec<u8>, reqwest::Error> {
        let mut response = client.get_stream(url).await?;
        let mut body = Vec::new();
        while let Some(chunk) = response.body.next().await {
            body.extend_from_slice(&chunk?);
        }
        Ok(body)
    }

    #[test]
    fn reqwest_client_can_be_created() {
        let _client = ReqwestClient::new(&ClientOptions::default()).unwrap();
    }

    #[tokio::test]
    async fn slow_steady_transfer_outlives_read_timeout() {
        let url = trickle_server(Duration::from_millis(150), false).await;
        let client = local_client(Duration::from_millis(400));

        let started = Instant::now();
        let body = read_body(&client, &url).await.unwrap();

        assert_eq!(body, b"abcdef");
        assert!(started.elapsed() > Duration::from_millis(400));
    }

    #[tokio::test]
    async fn stalled_transfer_hits_read_timeout() {
        let url = trickle_server(Duration::from_millis(10), true).await;
        let client = local_client(Duration::from_millis(300));

        let result = tokio::time::timeout(Duration::from_secs(10), read_body(&client, &url))
            .await
            .expect("read timeout should fire long before the stall ends");

        assert!(result.is_err());
    }

    #[test]
    fn user_agent_identifies_tool() {
        assert!(USER_AGENT.starts_with("podstash/"));
    }
}
