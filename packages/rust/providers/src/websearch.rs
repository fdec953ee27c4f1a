//! Google Custom Search JSON API client.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, instrument};
use url::Url;

use enhancer_shared::{ProviderError, Result, SearchConfig, SearchSnippet, WebSearch, read_secret};

use crate::http::{build_client, check_status, decode_json, endpoint, map_send_error};

/// The API rejects `num` above this.
const MAX_RESULTS: usize = 10;

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    items: Vec<SearchItem>,
}

#[derive(Debug, Deserialize)]
struct SearchItem {
    #[serde(default)]
    title: String,
    #[serde(default)]
    link: String,
    #[serde(default)]
    snippet: String,
}

#[derive(Debug, Clone)]
pub struct GoogleSearchClient {
    client: Client,
    url: Url,
    api_key: String,
    engine_id: String,
    results: usize,
}

impl GoogleSearchClient {
    pub fn new(
        base_url: &str,
        api_key: impl Into<String>,
        engine_id: impl Into<String>,
        results: usize,
        timeout: Duration,
    ) -> Result<Self> {
        Ok(Self {
            client: build_client(timeout)?,
            url: endpoint(base_url, "")?,
            api_key: api_key.into(),
            engine_id: engine_id.into(),
            results: results.clamp(1, MAX_RESULTS),
        })
    }

    pub fn from_config(config: &SearchConfig, timeout: Duration) -> Result<Self> {
        let api_key = read_secret(&config.api_key_env)?;
        let engine_id = read_secret(&config.engine_id_env)?;
        Self::new(
            &config.base_url,
            api_key,
            engine_id,
            config.results_per_query,
            timeout,
        )
    }
}

#[async_trait]
impl WebSearch for GoogleSearchClient {
    #[instrument(skip_all, fields(query = %query))]
    async fn search(&self, query: &str) -> std::result::Result<Vec<SearchSnippet>, ProviderError> {
        let num = self.results.to_string();
        let response = self
            .client
            .get(self.url.clone())
            .query(&[
                ("key", self.api_key.as_str()),
                ("cx", self.engine_id.as_str()),
                ("q", query),
                ("num", num.as_str()),
                ("hl", "hu"),
            ])
            .send()
            .await
            .map_err(map_send_error)?;
        let response = check_status(response).await?;
        let body: SearchResponse = decode_json(response).await?;

        let snippets: Vec<SearchSnippet> = body
            .items
            .into_iter()
            .filter(|item| !item.link.is_empty())
            .map(|item| SearchSnippet {
                title: item.title,
                url: item.link,
                snippet: item.snippet.replace('\n', " "),
            })
            .collect();

        if snippets.is_empty() {
            return Err(ProviderError::NoResults);
        }

        debug!(count = snippets.len(), "search results");
        Ok(snippets)
    }
}
