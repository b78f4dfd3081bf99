//! Shared fixtures for unit tests.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::time::Instant;

use crate::http::{ByteStream, HttpClient, HttpResponse};

/// Serves canned responses by exact URL and records every request.
///
/// Unknown URLs answer 404.
#[derive(Clone, Default)]
pub struct MockHttpClient {
    responses: Arc<Mutex<HashMap<String, (u16, Vec<u8>)>>>,
    stalls: Arc<Mutex<HashMap<String, Duration>>>,
    requests: Arc<Mutex<Vec<(String, Instant)>>>,
}

impl MockHttpClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn serve(&self, url: &str, status: u16, body: impl Into<Vec<u8>>) {
        self.responses
            .lock()
            .unwrap()
            .insert(url.to_string(), (status, body.into()));
    }

    /// Like `serve`, but the body only arrives after `stall`
    pub fn serve_stalled(&self, url: &str, status: u16, body: impl Into<Vec<u8>>, stall: Duration) {
        self.serve(url, status, body);
        self.stalls.lock().unwrap().insert(url.to_string(), stall);
    }

    pub fn requests(&self) -> Vec<String> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .map(|(url, _)| url.clone())
            .collect()
    }

    pub fn request_times(&self) -> Vec<(String, Instant)> {
        self.requests.lock().unwrap().clone()
    }

    pub fn count_requests(&self, url: &str) -> usize {
        self.requests().iter().filter(|u| *u == url).count()
    }
}

#[async_trait]
impl HttpClient for MockHttpClient {
    async fn get_stream(&self, url: &str) -> Result<HttpResponse, reqwest::Error> {
        self.requests
            .lock()
            .unwrap()
            .push((url.to_string(), Instant::now()));

        let (status, data) = self
            .responses
            .lock()
            .unwrap()
            .get(url)
            .cloned()
            .unwrap_or((404, b"not found".to_vec()));
        let len = data.len() as u64;
        let stall = self.stalls.lock().unwrap().get(url).copied();

        let body: ByteStream = Box::pin(futures::stream::once(async move {
            if let Some(stall) = stall {
                tokio::time::sleep(stall).await;
            }
            Ok(Bytes::from(data))
        }));

        Ok(HttpResponse {
            status,
            content_length: Some(len),
            body,
        })
    }
}

/// Build a small RSS document with one item per `(guid, title, pub_date, enclosure)`
pub fn rss_feed(title: &str, items: &[(&str, &str, &str, &str)]) -> String {
    let items: String = items
        .iter()
        .map(|(guid, item_title, pub_date, enclosure)| {
            format!(
                r#"
    <item>
      <title>{item_title}</title>
      <link>https://example.org/{guid}</link>
      <description>Notes for {item_title}</description>
      <guid isPermaLink="false">{guid}</guid>
      <pubDate>{pub_date}</pubDate>
      <enclosure url="{enclosure}" length="1234" type="audio/mpeg"/>
    </item>"#
            )
        })
        .collect();

    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0" xmlns:itunes="http://www.itunes.com/dtds/podcast-1.0.dtd">
  <channel>
    <title>{title}</title>
    <link>https://example.org</link>
    <description>About {title}</description>
    <language>en</language>
    <itunes:author>Some Host</itunes:author>
    <itunes:image href="https://img.example.org/cover.jpg"/>{items}
  </channel>
</rss>"#
    )
}
