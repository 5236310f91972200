//! Page-range relevance inference over retrieved snippets.
//!
//! The inferencer sends the query plus the top retrieved snippets to a chat
//! completion endpoint and expects a strict JSON object naming a page range.
//! Responses are parsed defensively (models like to wrap JSON in code fences)
//! and the resulting range is validated against the document's real page
//! count before anything reaches a client.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use thiserror::Error;

/// One retrieved snippet handed to the model as evidence.
#[derive(Debug, Clone)]
pub struct Snippet {
    /// 1-based page the snippet came from.
    pub page: u32,
    /// Snippet text.
    pub text: String,
}

/// An inferred relevant page range, inclusive on both ends.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageRange {
    /// First relevant page, 1-based.
    pub start_page: u32,
    /// Last relevant page, 1-based.
    pub end_page: u32,
}

/// Errors from the inference step.
#[derive(Debug, Error)]
pub enum InferenceError {
    /// Transport-level failure reaching the completion endpoint.
    #[error("inference request failed: {0}")]
    Request(#[from] reqwest::Error),
    /// The endpoint answered with a non-success status.
    #[error("inference endpoint returned {status}: {body}")]
    UnexpectedStatus {
        /// HTTP status code.
        status: u16,
        /// Response body, for the log.
        body: String,
    },
    /// The completion did not contain the expected JSON object.
    #[error("completion was not a page-range object: {0}")]
    MalformedCompletion(String),
    /// The model produced a range that contradicts the supplied evidence.
    #[error("inferred range {start_page}-{end_page} references pages absent from the evidence")]
    InvalidRange {
        /// Claimed first page.
        start_page: u32,
        /// Claimed last page.
        end_page: u32,
    },
}

/// Strategy seam for relevance inference, mockable in tests.
#[async_trait]
pub trait RelevanceInferencer: Send + Sync {
    /// Infer the page range most relevant to `query` from `snippets`.
    async fn infer_page_range(
        &self,
        query: &str,
        snippets: &[Snippet],
    ) -> Result<PageRange, InferenceError>;
}

/// Inferencer backed by an OpenAI-compatible chat completions endpoint.
pub struct ChatInferencer {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Deserialize)]
struct ChatResponseMessage {
    content: String,
}

impl ChatInferencer {
    /// Build an inferencer against `base_url` using `model`.
    pub fn new(base_url: &str, api_key: Option<String>, model: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            model: model.to_string(),
        }
    }

    fn build_prompt(query: &str, snippets: &[Snippet]) -> String {
        let mut prompt = format!(
            "Identify the contiguous page range most relevant to the query.\n\
             Query: {query}\n\nEvidence snippets:\n"
        );
        for snippet in snippets {
            prompt.push_str(&format!("[page {}] {}\n", snippet.page, snippet.text));
        }
        prompt.push_str(
            "\nAnswer with only a JSON object of the form \
             {\"startPage\": <number>, \"endPage\": <number>} and nothing else.",
        );
        prompt
    }
}

#[async_trait]
impl RelevanceInferencer for ChatInferencer {
    async fn infer_page_range(
        &self,
        query: &str,
        snippets: &[Snippet],
    ) -> Result<PageRange, InferenceError> {
        let body = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: "You locate relevant page ranges in documents. \
                              Respond with strict JSON only."
                        .to_string(),
                },
                ChatMessage {
                    role: "user",
                    content: Self::build_prompt(query, snippets),
                },
            ],
            temperature: 0.3,
        };

        let mut request = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .json(&body);
        if let Some(key) = &self.api_key
            && !key.is_empty()
        {
            request = request.bearer_auth(key);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(InferenceError::UnexpectedStatus {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: ChatResponse = response.json().await?;
        let content = parsed
            .choices
            .first()
            .map(|choice| choice.message.content.as_str())
            .unwrap_or_default();

        parse_page_range(content)
    }
}

/// Parse a completion into a [`PageRange`], tolerating code fences.
pub fn parse_page_range(content: &str) -> Result<PageRange, InferenceError> {
    let stripped = strip_code_fence(content.trim());
    serde_json::from_str(stripped)
        .map_err(|_| InferenceError::MalformedCompletion(content.trim().to_string()))
}

fn strip_code_fence(content: &str) -> &str {
    let Some(rest) = content.strip_prefix("```") else {
        return content;
    };
    // Drop an optional language tag on the fence line.
    let rest = match rest.split_once('\n') {
        Some((_, body)) => body,
        None => rest,
    };
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

/// Reject ranges that are inverted, zero, or whose endpoints name pages the
/// model was never shown.
///
/// A completion may only cite pages that appeared among the supplied
/// snippets; anything else is hallucinated evidence and must not reach a
/// client.
pub fn validate_page_range(
    range: &PageRange,
    evidence_pages: &BTreeSet<u32>,
) -> Result<(), InferenceError> {
    let invalid = range.start_page == 0
        || range.end_page < range.start_page
        || !evidence_pages.contains(&range.start_page)
        || !evidence_pages.contains(&range.end_page);
    if invalid {
        return Err(InferenceError::InvalidRange {
            start_page: range.start_page,
            end_page: range.end_page,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;

    #[test]
    fn parses_a_bare_json_object() {
        let range = parse_page_range(r#"{"startPage": 3, "endPage": 7}"#).expect("parse");
        assert_eq!(
            range,
            PageRange {
                start_page: 3,
                end_page: 7
            }
        );
    }

    #[test]
    fn parses_a_fenced_json_object() {
        let content = "```json\n{\"startPage\": 2, \"endPage\": 2}\n```";
        let range = parse_page_range(content).expect("parse");
        assert_eq!(range.start_page, 2);
        assert_eq!(range.end_page, 2);
    }

    #[test]
    fn rejects_prose_completions() {
        let err = parse_page_range("The relevant pages are 3 to 7.").unwrap_err();
        assert!(matches!(err, InferenceError::MalformedCompletion(_)));
    }

    #[test]
    fn validates_range_against_the_evidence_pages() {
        let evidence: BTreeSet<u32> = [1, 2, 4].into_iter().collect();

        let ok = PageRange {
            start_page: 1,
            end_page: 4,
        };
        assert!(validate_page_range(&ok, &evidence).is_ok());

        let inverted = PageRange {
            start_page: 4,
            end_page: 2,
        };
        assert!(validate_page_range(&inverted, &evidence).is_err());

        let zero = PageRange {
            start_page: 0,
            end_page: 1,
        };
        assert!(validate_page_range(&zero, &evidence).is_err());

        // Page 3 was never among the snippets shown to the model.
        let unseen = PageRange {
            start_page: 3,
            end_page: 3,
        };
        assert!(matches!(
            validate_page_range(&unseen, &evidence).unwrap_err(),
            InferenceError::InvalidRange {
                start_page: 3,
                end_page: 3
            }
        ));

        // In-bounds endpoints are not enough; both must be evidence pages.
        let endpoint_gap = PageRange {
            start_page: 2,
            end_page: 3,
        };
        assert!(validate_page_range(&endpoint_gap, &evidence).is_err());
    }

    #[tokio::test]
    async fn infers_a_range_from_the_completion_endpoint() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/v1/chat/completions")
                    .json_body_partial(r#"{"model": "test-model"}"#);
                then.status(200).json_body(serde_json::json!({
                    "choices": [{
                        "message": {
                            "role": "assistant",
                            "content": "{\"startPage\": 4, \"endPage\": 9}"
                        }
                    }]
                }));
            })
            .await;

        let inferencer = ChatInferencer::new(&format!("{}/v1", server.base_url()), None, "test-model");
        let snippets = vec![Snippet {
            page: 4,
            text: "long division with remainders".to_string(),
        }];
        let range = inferencer
            .infer_page_range("long division", &snippets)
            .await
            .expect("infer");

        mock.assert_async().await;
        assert_eq!(range.start_page, 4);
        assert_eq!(range.end_page, 9);
    }

    #[tokio::test]
    async fn surfaces_non_success_statuses() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/v1/chat/completions");
                then.status(429).body("rate limited");
            })
            .await;

        let inferencer = ChatInferencer::new(&format!("{}/v1", server.base_url()), None, "test-model");
        let err = inferencer
            .infer_page_range("anything", &[])
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            InferenceError::UnexpectedStatus { status: 429, .. }
        ));
    }
}
