//! Status event protocol for batch processing.
//!
//! A batch run is reported as a single ordered stream of NDJSON status
//! events. Each candidate document gets a `processing` announcement before
//! its terminal `completed` or `error` event, terminal events arrive in
//! completion order, and one aggregate `completed` event closes every batch
//! that started processing; a discovery failure instead ends the stream with
//! a single terminal `error` event. Error events carry a stable
//! machine-readable tag ahead of the human-readable message.

use crate::discovery::{SearchClient, SearchResult};
use crate::inference::PageRange;
use crate::pipeline::{DocumentProcessor, DocumentReport, PipelineError};
use crate::pool::WorkerPool;
use async_stream::stream;
use futures_core::Stream;
use futures_util::StreamExt;
use futures_util::stream::FuturesUnordered;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

/// A batch processing request.
#[derive(Debug, Clone, Deserialize)]
pub struct BatchRequest {
    /// The relevance query.
    pub query: String,
    /// Optional grade filter folded into discovery queries.
    pub grade: Option<String>,
    /// Candidate PDF URLs. When absent, discovery runs inside the batch.
    pub document_links: Option<Vec<String>>,
}

/// Lifecycle state carried on every event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    /// Work has been announced but not finished.
    Processing,
    /// Work finished successfully.
    Completed,
    /// Work failed.
    Error,
}

/// Optional structured payload attached to an event.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventData {
    /// Discovery results, on the discovery event only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub search_results: Option<Vec<SearchResult>>,
    /// Whether the document finished successfully.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processed: Option<bool>,
    /// URL of the document the event refers to.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
    /// Stable identifier of the processed document.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub document_id: Option<String>,
    /// Title of the processed document.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// The inferred relevant page range.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub relevancy_report: Option<PageRange>,
    /// Number of documents attempted, on the aggregate event only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_processed: Option<usize>,
}

/// One line of the NDJSON status stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusEvent {
    /// Lifecycle state.
    pub status: Status,
    /// Human-readable progress message.
    pub message: String,
    /// Structured payload, when the event carries one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<EventData>,
    /// Tagged error description, on `error` events only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl StatusEvent {
    fn processing(message: String) -> Self {
        Self {
            status: Status::Processing,
            message,
            data: None,
            error: None,
        }
    }

    fn search_results(results: Vec<SearchResult>) -> Self {
        let count = results.len();
        Self {
            status: Status::Completed,
            message: format!("Found {count} candidate documents"),
            data: Some(EventData {
                search_results: Some(results),
                ..EventData::default()
            }),
            error: None,
        }
    }

    fn document_completed(link: &str, report: DocumentReport) -> Self {
        Self {
            status: Status::Completed,
            message: format!("Completed processing: {link}"),
            data: Some(EventData {
                processed: Some(true),
                link: Some(link.to_string()),
                document_id: Some(report.document_id),
                title: Some(report.title),
                relevancy_report: Some(report.relevancy_report),
                ..EventData::default()
            }),
            error: None,
        }
    }

    fn document_failed(link: &str, error: &PipelineError) -> Self {
        Self {
            status: Status::Error,
            message: format!("Error processing document: {link}"),
            data: Some(EventData {
                processed: Some(false),
                link: Some(link.to_string()),
                ..EventData::default()
            }),
            error: Some(format!("{}: {}", error.tag(), error)),
        }
    }

    fn batch_completed(total: usize) -> Self {
        Self {
            status: Status::Completed,
            message: "All documents processed".to_string(),
            data: Some(EventData {
                total_processed: Some(total),
                ..EventData::default()
            }),
            error: None,
        }
    }

    fn discovery_failed(error: &crate::discovery::DiscoveryError) -> Self {
        Self {
            status: Status::Error,
            message: "Document discovery failed".to_string(),
            data: None,
            error: Some(format!("search_error: {error}")),
        }
    }

    /// Serialize the event as one NDJSON line.
    pub fn to_ndjson(&self) -> String {
        match serde_json::to_string(self) {
            Ok(line) => format!("{line}\n"),
            Err(_) => {
                "{\"status\":\"error\",\"message\":\"failed to encode status event\"}\n".to_string()
            }
        }
    }
}

/// Derive a document title from the last path segment of its URL.
pub fn title_from_url(url: &str) -> String {
    let trimmed = url
        .split(['?', '#'])
        .next()
        .unwrap_or(url)
        .trim_end_matches('/');
    let basename = trimmed.rsplit('/').next().unwrap_or(trimmed);
    if basename.is_empty() {
        url.to_string()
    } else {
        basename.to_string()
    }
}

/// Run one batch to completion, yielding status events as they happen.
///
/// Every document is announced before scheduling; terminal per-document
/// events follow in completion order; the aggregate event closes the stream
/// even when every document failed. A failed discovery phase instead ends
/// the stream with its error event alone.
pub fn run_batch(
    search: Arc<SearchClient>,
    processor: Arc<dyn DocumentProcessor>,
    pool: WorkerPool,
    request: BatchRequest,
) -> impl Stream<Item = StatusEvent> + Send {
    stream! {
        let query = request.query.clone();
        yield StatusEvent::processing(format!("Starting PDF search for: {query}"));

        let candidates: Vec<(String, String)> = match request.document_links {
            Some(links) => links
                .into_iter()
                .filter(|link| !link.is_empty())
                .map(|link| {
                    let title = title_from_url(&link);
                    (link, title)
                })
                .collect(),
            None => match search.search_pdfs(&query, request.grade.as_deref()).await {
                Ok(results) => {
                    let candidates = results
                        .iter()
                        .filter(|result| !result.link.is_empty())
                        .map(|result| (result.link.clone(), result.title.clone()))
                        .collect();
                    yield StatusEvent::search_results(results);
                    candidates
                }
                // A discovery failure is the stream's single terminal event;
                // no documents were attempted, so no aggregate follows.
                Err(error) => {
                    yield StatusEvent::discovery_failed(&error);
                    return;
                }
            },
        };

        let total = candidates.len();
        info!(query = %query, documents = total, "Starting batch");

        let mut outcomes = FuturesUnordered::new();
        for (link, title) in candidates {
            yield StatusEvent::processing(format!("Processing document: {link}"));

            let processor = Arc::clone(&processor);
            let pool = pool.clone();
            let query = query.clone();
            outcomes.push(async move {
                let result = match pool
                    .run({
                        let link = link.clone();
                        async move { processor.process_document(&query, &link, &title).await }
                    })
                    .await
                {
                    Ok(outcome) => outcome,
                    Err(pool_error) => Err(PipelineError::Worker(pool_error)),
                };
                (link, result)
            });
        }

        while let Some((link, result)) = outcomes.next().await {
            match result {
                Ok(report) => yield StatusEvent::document_completed(&link, report),
                Err(error) => yield StatusEvent::document_failed(&link, &error),
            }
        }

        yield StatusEvent::batch_completed(total);
    }
}
