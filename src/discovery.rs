//! Candidate PDF discovery through a programmable web search endpoint.
//!
//! Queries are rewritten before dispatch: an optional grade filter is folded
//! into the query text and a `filetype:pdf` qualifier is always appended.
//! The endpoint caps each request at ten results, so up to twenty candidates
//! are collected across two paged requests, stopping early on a short page.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, instrument};

const RESULTS_PER_PAGE: usize = 10;
const TOTAL_RESULTS: usize = 20;

/// Errors from the discovery step.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    /// Transport-level failure reaching the search endpoint.
    #[error("search request failed: {0}")]
    Request(#[from] reqwest::Error),
    /// The endpoint answered with a non-success status.
    #[error("search endpoint returned {status}: {body}")]
    UnexpectedStatus {
        /// HTTP status code.
        status: u16,
        /// Response body, for the log.
        body: String,
    },
}

/// One discovered candidate document.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SearchResult {
    /// Result title as reported by the search engine.
    pub title: String,
    /// URL of the candidate PDF.
    pub link: String,
    /// Result snippet, when the engine provides one.
    pub snippet: String,
    /// Reported file size, `Unknown` when the engine omits it.
    pub file_size: String,
    /// Reported page count, `Unknown` when the engine omits it.
    pub page_count: String,
    /// Reported last-modified date, `Unknown` when the engine omits it.
    pub last_modified: String,
    /// Position within the collected result list.
    pub index: usize,
}

#[derive(Deserialize)]
struct SearchResponse {
    items: Option<Vec<SearchItem>>,
}

#[derive(Deserialize)]
struct SearchItem {
    title: Option<String>,
    link: Option<String>,
    snippet: Option<String>,
    pagemap: Option<Pagemap>,
}

#[derive(Deserialize)]
struct Pagemap {
    #[serde(default)]
    metatags: Vec<serde_json::Map<String, serde_json::Value>>,
}

impl SearchItem {
    /// Look up a key in the first pagemap metatag block.
    fn metatag(&self, key: &str) -> Option<String> {
        self.pagemap
            .as_ref()?
            .metatags
            .first()?
            .get(key)?
            .as_str()
            .map(str::to_string)
    }
}

/// Client for the programmable search endpoint.
pub struct SearchClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    engine_id: String,
}

impl SearchClient {
    /// Build a client against `base_url` with the given credentials.
    pub fn new(base_url: &str, api_key: &str, engine_id: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            engine_id: engine_id.to_string(),
        }
    }

    /// Find up to twenty candidate PDFs for `query`.
    #[instrument(skip(self), fields(query = %query))]
    pub async fn search_pdfs(
        &self,
        query: &str,
        grade: Option<&str>,
    ) -> Result<Vec<SearchResult>, DiscoveryError> {
        let search_query = build_search_query(query, grade);
        debug!(search_query = %search_query, "dispatching discovery query");

        let mut results = Vec::new();
        let pages = TOTAL_RESULTS.div_ceil(RESULTS_PER_PAGE);
        for page in 0..pages {
            let start_index = page * RESULTS_PER_PAGE + 1;
            let response = self
                .client
                .get(&self.base_url)
                .query(&[
                    ("key", self.api_key.as_str()),
                    ("cx", self.engine_id.as_str()),
                    ("q", search_query.as_str()),
                    ("num", &RESULTS_PER_PAGE.to_string()),
                    ("start", &start_index.to_string()),
                ])
                .send()
                .await?;

            let status = response.status();
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(DiscoveryError::UnexpectedStatus {
                    status: status.as_u16(),
                    body,
                });
            }

            let parsed: SearchResponse = response.json().await?;
            let Some(items) = parsed.items else {
                break;
            };
            let page_len = items.len();
            for item in items {
                let snippet = item
                    .snippet
                    .clone()
                    .or_else(|| item.metatag("og:description"))
                    .unwrap_or_else(|| "No description available".to_string());
                let file_size = item.metatag("pdf:filesize");
                let page_count = item.metatag("pdf:pagecount");
                let last_modified = item.metatag("pdf:lastmodified");
                results.push(SearchResult {
                    title: item.title.unwrap_or_else(|| "Untitled".to_string()),
                    link: item.link.unwrap_or_default(),
                    snippet,
                    file_size: file_size.unwrap_or_else(|| "Unknown".to_string()),
                    page_count: page_count.unwrap_or_else(|| "Unknown".to_string()),
                    last_modified: last_modified.unwrap_or_else(|| "Unknown".to_string()),
                    index: results.len(),
                });
            }
            if page_len < RESULTS_PER_PAGE {
                break;
            }
        }

        Ok(results)
    }
}

fn build_search_query(query: &str, grade: Option<&str>) -> String {
    let mut search_query = query.to_string();
    if let Some(grade) = grade
        && grade != "ALL"
    {
        search_query = format!("{search_query} grade {grade}");
    }
    format!("{search_query} filetype:pdf")
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;

    fn item(title: &str, link: &str) -> serde_json::Value {
        serde_json::json!({ "title": title, "link": link, "snippet": "a worksheet" })
    }

    #[test]
    fn folds_grade_and_filetype_into_the_query() {
        assert_eq!(
            build_search_query("fractions", Some("3")),
            "fractions grade 3 filetype:pdf"
        );
        assert_eq!(
            build_search_query("fractions", Some("ALL")),
            "fractions filetype:pdf"
        );
        assert_eq!(build_search_query("fractions", None), "fractions filetype:pdf");
    }

    #[tokio::test]
    async fn collects_results_across_two_pages() {
        let server = MockServer::start_async().await;
        let first_items: Vec<_> = (0..10).map(|i| item(&format!("doc {i}"), "https://example.org/a.pdf")).collect();
        let first = server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/customsearch/v1")
                    .query_param("start", "1")
                    .query_param("q", "fractions filetype:pdf");
                then.status(200)
                    .json_body(serde_json::json!({ "items": first_items }));
            })
            .await;
        let second = server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/customsearch/v1")
                    .query_param("start", "11");
                then.status(200).json_body(serde_json::json!({
                    "items": [item("doc 10", "https://example.org/b.pdf")]
                }));
            })
            .await;

        let client = SearchClient::new(
            &format!("{}/customsearch/v1", server.base_url()),
            "key",
            "engine",
        );
        let results = client.search_pdfs("fractions", None).await.expect("search");

        first.assert_async().await;
        second.assert_async().await;
        assert_eq!(results.len(), 11);
        assert_eq!(results[10].index, 10);
        assert_eq!(results[10].title, "doc 10");
    }

    #[tokio::test]
    async fn a_short_first_page_stops_paging() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(GET).path("/customsearch/v1");
                then.status(200).json_body(serde_json::json!({
                    "items": [item("only", "https://example.org/a.pdf")]
                }));
            })
            .await;

        let client = SearchClient::new(
            &format!("{}/customsearch/v1", server.base_url()),
            "key",
            "engine",
        );
        let results = client.search_pdfs("fractions", None).await.expect("search");

        mock.assert_hits_async(1).await;
        assert_eq!(results.len(), 1);
    }

    #[tokio::test]
    async fn pdf_metadata_is_read_from_pagemap_metatags() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/customsearch/v1");
                then.status(200).json_body(serde_json::json!({
                    "items": [
                        {
                            "title": "rich.pdf",
                            "link": "https://example.org/rich.pdf",
                            "pagemap": {
                                "metatags": [{
                                    "og:description": "tagged description",
                                    "pdf:filesize": "2 MB",
                                    "pdf:pagecount": "14",
                                    "pdf:lastmodified": "2024-01-05"
                                }]
                            }
                        },
                        item("bare.pdf", "https://example.org/bare.pdf")
                    ]
                }));
            })
            .await;

        let client = SearchClient::new(
            &format!("{}/customsearch/v1", server.base_url()),
            "key",
            "engine",
        );
        let results = client.search_pdfs("fractions", None).await.expect("search");

        assert_eq!(results[0].snippet, "tagged description");
        assert_eq!(results[0].file_size, "2 MB");
        assert_eq!(results[0].page_count, "14");
        assert_eq!(results[0].last_modified, "2024-01-05");

        assert_eq!(results[1].snippet, "a worksheet");
        assert_eq!(results[1].file_size, "Unknown");
        assert_eq!(results[1].page_count, "Unknown");
        assert_eq!(results[1].last_modified, "Unknown");
    }

    #[tokio::test]
    async fn an_empty_response_yields_no_results() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/customsearch/v1");
                then.status(200).json_body(serde_json::json!({}));
            })
            .await;

        let client = SearchClient::new(
            &format!("{}/customsearch/v1", server.base_url()),
            "key",
            "engine",
        );
        let results = client.search_pdfs("nothing", None).await.expect("search");
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn surfaces_endpoint_errors() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/customsearch/v1");
                then.status(403).body("quota exceeded");
            })
            .await;

        let client = SearchClient::new(
            &format!("{}/customsearch/v1", server.base_url()),
            "key",
            "engine",
        );
        let err = client.search_pdfs("fractions", None).await.unwrap_err();
        assert!(matches!(
            err,
            DiscoveryError::UnexpectedStatus { status: 403, .. }
        ));
    }
}
