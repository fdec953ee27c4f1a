//! YouTube Data API v3 video search.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, instrument};
use url::Url;

use enhancer_shared::{ProviderError, Result, VideoConfig, VideoRef, VideoSearch, read_secret};

use crate::http::{build_client, check_status, decode_json, endpoint, map_send_error};

/// Results requested per search; the enricher keeps only the top few.
const PAGE_SIZE: usize = 5;

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    items: Vec<SearchItem>,
}

#[derive(Debug, Deserialize)]
struct SearchItem {
    id: ItemId,
    #[serde(default)]
    snippet: Option<Snippet>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ItemId {
    #[serde(default)]
    video_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct Snippet {
    #[serde(default)]
    title: String,
    #[serde(default)]
    description: String,
}

#[derive(Debug, Clone)]
pub struct YouTubeClient {
    client: Client,
    url: Url,
    api_key: String,
}

impl YouTubeClient {
    pub fn new(base_url: &str, api_key: impl Into<String>, timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: build_client(timeout)?,
            url: endpoint(base_url, "search")?,
            api_key: api_key.into(),
        })
    }

    pub fn from_config(config: &VideoConfig, timeout: Duration) -> Result<Self> {
        let api_key = read_secret(&config.api_key_env)?;
        Self::new(&config.base_url, api_key, timeout)
    }
}

fn watch_url(video_id: &str) -> String {
    format!("https://www.youtube.com/watch?v={video_id}")
}

#[async_trait]
impl VideoSearch for YouTubeClient {
    #[instrument(skip_all, fields(query = %query))]
    async fn search(&self, query: &str) -> std::result::Result<Vec<VideoRef>, ProviderError> {
        let page_size = PAGE_SIZE.to_string();
        let response = self
            .client
            .get(self.url.clone())
            .query(&[
                ("part", "snippet"),
                ("type", "video"),
                ("q", query),
                ("maxResults", page_size.as_str()),
                ("relevanceLanguage", "hu"),
                ("key", self.api_key.as_str()),
            ])
            .send()
            .await
            .map_err(map_send_error)?;
        let response = check_status(response).await?;
        let body: SearchResponse = decode_json(response).await?;

        let videos: Vec<VideoRef> = body
            .items
            .into_iter()
            .filter_map(|item| {
                let video_id = item.id.video_id.filter(|id| !id.is_empty())?;
                let snippet = item.snippet.unwrap_or_default();
                Some(VideoRef {
                    url: watch_url(&video_id),
                    title: snippet.title,
                    description: snippet.description,
                    video_id,
                })
            })
            .collect();

        if videos.is_empty() {
            return Err(ProviderError::NoResults);
        }

        debug!(count = videos.len(), "video results");
        Ok(videos)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer) -> YouTubeClient {
        YouTubeClient::new(&server.uri(), "yt-key", Duration::from_secs(5)).unwrap()
    }

    #[tokio::test]
    async fn maps_video_items() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/search"))
            .and(query_param("type", "video"))
            .and(query_param("relevanceLanguage", "hu"))
            .and(query_param("key", "yt-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "items": [
                    {"id": {"kind": "youtube#video", "videoId": "abc123"},
                     "snippet": {"title": "AWI hegesztés", "description": "Bemutató"}},
                    {"id": {"kind": "youtube#channel", "channelId": "ch1"},
                     "snippet": {"title": "Csatorna"}}
                ]
            })))
            .mount(&server)
            .await;

        let videos = client(&server).search("AWI hegesztés").await.unwrap();
        assert_eq!(videos.len(), 1);
        assert_eq!(videos[0].video_id, "abc123");
        assert_eq!(videos[0].url, "https://www.youtube.com/watch?v=abc123");
        assert_eq!(videos[0].title, "AWI hegesztés");
    }

    #[tokio::test]
    async fn quota_exceeded() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(403).set_body_json(serde_json::json!({
                "error": {"code": 403, "errors": [{"reason": "quotaExceeded", "domain": "youtube.quota"}]}
            })))
            .mount(&server)
            .await;

        let err = client(&server).search("x").await.unwrap_err();
        assert_eq!(err, ProviderError::QuotaExceeded);
    }

    #[tokio::test]
    async fn no_videos_is_no_results() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "items": [] })))
            .mount(&server)
            .await;

        let err = client(&server).search("x").await.unwrap_err();
        assert_eq!(err, ProviderError::NoResults);
    }
}
