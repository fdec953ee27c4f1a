//! MediaWiki search client for article resolution.
//!
//! A term resolves to the top search hit only when the hit's title plausibly
//! names the same thing. Hungarian inflects heavily ("hegesztést",
//! "hegesztéssel"), so the check is a shared-prefix test rather than equality.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, instrument};
use url::Url;

use enhancer_shared::{Article, Encyclopedia, EncyclopediaConfig, ProviderError, Result};

use crate::http::{build_client, check_status, decode_json, endpoint, map_send_error};

/// Shortest shared prefix accepted as a match.
const MIN_SHARED_PREFIX: usize = 4;

#[derive(Debug, Deserialize)]
struct QueryResponse {
    #[serde(default)]
    query: Option<QueryBody>,
}

#[derive(Debug, Deserialize)]
struct QueryBody {
    #[serde(default)]
    search: Vec<SearchHit>,
}

#[derive(Debug, Deserialize)]
struct SearchHit {
    title: String,
}

#[derive(Debug, Clone)]
pub struct WikipediaClient {
    client: Client,
    base_url: String,
    api_url: Url,
}

impl WikipediaClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: build_client(timeout)?,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_url: endpoint(base_url, "w/api.php")?,
        })
    }

    pub fn from_config(config: &EncyclopediaConfig, timeout: Duration) -> Result<Self> {
        Self::new(&config.base_url, timeout)
    }

    fn article_url(&self, title: &str) -> String {
        format!("{}/wiki/{}", self.base_url, title.replace(' ', "_"))
    }
}

/// Whether `title` is a plausible article for `term`.
pub(crate) fn plausible_match(term: &str, title: &str) -> bool {
    let term: Vec<char> = term.trim().to_lowercase().chars().collect();
    let title: Vec<char> = title.trim().to_lowercase().chars().collect();
    if term.is_empty() || title.is_empty() {
        return false;
    }

    if term.len() < MIN_SHARED_PREFIX {
        return term == title;
    }

    let shared = term
        .iter()
        .zip(title.iter())
        .take_while(|(a, b)| a == b)
        .count();
    let shorter = term.len().min(title.len());

    // Either string is a prefix of the other, or they share a long common stem
    shared >= MIN_SHARED_PREFIX && (shared == shorter || shared * 5 >= shorter * 3)
}

#[async_trait]
impl Encyclopedia for WikipediaClient {
    #[instrument(skip_all, fields(term = %term))]
    async fn resolve(&self, term: &str) -> std::result::Result<Option<Article>, ProviderError> {
        let response = self
            .client
            .get(self.api_url.clone())
            .query(&[
                ("action", "query"),
                ("list", "search"),
                ("srsearch", term),
                ("srlimit", "1"),
                ("format", "json"),
                ("utf8", "1"),
            ])
            .send()
            .await
            .map_err(map_send_error)?;
        let response = check_status(response).await?;
        let body: QueryResponse = decode_json(response).await?;

        let Some(hit) = body.query.and_then(|q| q.search.into_iter().next()) else {
            debug!("no article");
            return Ok(None);
        };

        if !plausible_match(term, &hit.title) {
            debug!(title = %hit.title, "top hit rejected");
            return Ok(None);
        }

        Ok(Some(Article {
            url: self.article_url(&hit.title),
            title: hit.title,
        }))
    }
}
