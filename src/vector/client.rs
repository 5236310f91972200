//! HTTP client wrapper for the Qdrant vector index.

use crate::vector::types::{
    ChunkPoint, QueryResponse, QueryResponseResult, SnippetHit, VectorError,
};
use reqwest::{Method, StatusCode};
use serde_json::{Value, json};
use std::time::Duration;
use uuid::Uuid;

/// Lightweight HTTP client for the chunk vector index.
pub struct VectorIndex {
    pub(crate) client: reqwest::Client,
    pub(crate) base_url: String,
    pub(crate) api_key: Option<String>,
}

impl VectorIndex {
    /// Construct a new client for the given Qdrant endpoint.
    pub fn new(url: &str, api_key: Option<String>) -> Result<Self, VectorError> {
        let client = reqwest::Client::builder()
            .user_agent("pagescout/0.1")
            .timeout(Duration::from_secs(30))
            .build()?;
        let base_url = normalize_base_url(url).map_err(VectorError::InvalidUrl)?;
        tracing::debug!(url = %base_url, "Initialized vector index HTTP client");
        Ok(Self {
            client,
            base_url,
            api_key,
        })
    }

    /// Create the collection when missing and ensure the payload index used
    /// for document-scoped queries exists.
    pub async fn ensure_collection(
        &self,
        collection: &str,
        vector_size: u64,
    ) -> Result<(), VectorError> {
        if !self.collection_exists(collection).await? {
            tracing::debug!(collection, vector_size, "Creating collection");
            let body = json!({
                "vectors": {
                    "size": vector_size,
                    "distance": "Cosine"
                }
            });
            let response = self
                .request(Method::PUT, &format!("collections/{collection}"))
                .json(&body)
                .send()
                .await?;
            self.ensure_success(response).await?;
        }

        let body = json!({
            "field_name": "document_id",
            "field_schema": "keyword",
        });
        let response = self
            .request(Method::PUT, &format!("collections/{collection}/index"))
            .json(&body)
            .send()
            .await?;
        match response.status() {
            status if status.is_success() || status == StatusCode::CONFLICT => {
                tracing::debug!(collection, "Payload index ensured");
                Ok(())
            }
            status => {
                let body = response.text().await.unwrap_or_default();
                let error = VectorError::UnexpectedStatus { status, body };
                tracing::warn!(collection, error = %error, "Failed to ensure payload index");
                Err(error)
            }
        }
    }

    /// Upload chunk vectors for one document in a single batched request.
    pub async fn upsert_chunks(
        &self,
        collection: &str,
        points: Vec<ChunkPoint>,
    ) -> Result<usize, VectorError> {
        if points.is_empty() {
            return Ok(0);
        }

        // Ids derive from (document, chunk) so re-upserting the same set
        // overwrites points instead of duplicating them.
        let serialized: Vec<Value> = points
            .into_iter()
            .map(|point| {
                json!({
                    "id": point_id(&point.document_id, &point.chunk_hash),
                    "vector": point.vector,
                    "payload": {
                        "document_id": point.document_id,
                        "page_number": point.page,
                        "text": point.text,
                        "chunk_hash": point.chunk_hash,
                    },
                })
            })
            .collect();

        let point_count = serialized.len();
        let response = self
            .request(Method::PUT, &format!("collections/{collection}/points"))
            .query(&[("wait", true)])
            .json(&json!({ "points": serialized }))
            .send()
            .await?;
        self.ensure_success(response).await?;

        tracing::debug!(collection, points = point_count, "Chunk vectors indexed");
        Ok(point_count)
    }

    /// Top-K similarity query scoped to exactly one document.
    pub async fn query_document(
        &self,
        collection: &str,
        vector: Vec<f32>,
        document_id: &str,
        top_k: usize,
    ) -> Result<Vec<SnippetHit>, VectorError> {
        let body = json!({
            "query": vector,
            "limit": top_k,
            "with_payload": true,
            "filter": {
                "must": [
                    {
                        "key": "document_id",
                        "match": { "value": document_id }
                    }
                ]
            },
        });

        let response = self
            .request(Method::POST, &format!("collections/{collection}/points/query"))
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let error = VectorError::UnexpectedStatus { status, body };
            tracing::error!(collection, document_id, error = %error, "Similarity query failed");
            return Err(error);
        }

        let payload: QueryResponse = response.json().await?;
        let points = match payload.result {
            QueryResponseResult::Points(points) => points,
            QueryResponseResult::Object { points } => points,
        };

        let hits = points
            .into_iter()
            .filter_map(|point| {
                let payload = point.payload?;
                let page = payload.get("page_number").and_then(Value::as_u64)? as u32;
                let text = payload.get("text").and_then(Value::as_str)?.to_string();
                Some(SnippetHit {
                    page,
                    text,
                    score: point.score,
                })
            })
            .collect();

        Ok(hits)
    }

    async fn collection_exists(&self, collection: &str) -> Result<bool, VectorError> {
        let response = self
            .request(Method::GET, &format!("collections/{collection}"))
            .send()
            .await?;

        match response.status() {
            StatusCode::OK => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            status => {
                let body = response.text().await.unwrap_or_default();
                let error = VectorError::UnexpectedStatus { status, body };
                tracing::error!(collection, error = %error, "Collection existence check failed");
                Err(error)
            }
        }
    }

    fn request(&self, method: Method, path: &str) -> reqwest::RequestBuilder {
        let url = format_endpoint(&self.base_url, path);
        let mut req = self.client.request(method, url);
        if let Some(api_key) = &self.api_key
            && !api_key.is_empty()
        {
            req = req.header("api-key", api_key);
        }
        req
    }

    async fn ensure_success(&self, response: reqwest::Response) -> Result<(), VectorError> {
        if response.status().is_success() {
            Ok(())
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let error = VectorError::UnexpectedStatus { status, body };
            tracing::error!(error = %error, "Qdrant request failed");
            Err(error)
        }
    }
}

fn normalize_base_url(url: &str) -> Result<String, String> {
    let mut parsed = reqwest::Url::parse(url).map_err(|err| err.to_string())?;
    let path = parsed.path().trim_end_matches('/').to_string();
    parsed.set_path(&path);
    Ok(parsed.to_string())
}

fn format_endpoint(base: &str, path: &str) -> String {
    let base = base.trim_end_matches('/');
    let path = path.trim_start_matches('/');
    format!("{base}/{path}")
}

fn point_id(document_id: &str, chunk_hash: &str) -> String {
    let name = format!("{document_id}:{chunk_hash}");
    Uuid::new_v5(&Uuid::NAMESPACE_OID, name.as_bytes()).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::{Method::POST, Method::PUT, MockServer};

    fn index(server: &MockServer) -> VectorIndex {
        VectorIndex {
            client: reqwest::Client::builder()
                .user_agent("pagescout-test")
                .build()
                .expect("client"),
            base_url: server.base_url(),
            api_key: None,
        }
    }

    #[tokio::test]
    async fn query_is_scoped_to_one_document() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/collections/chunks/points/query")
                    .body_contains("\"document_id\"")
                    .body_contains("doc-1");
                then.status(200).json_body(json!({
                    "result": [
                        {
                            "id": "p1",
                            "score": 0.91,
                            "payload": {
                                "document_id": "doc-1",
                                "page_number": 4,
                                "text": "snippet text"
                            }
                        }
                    ]
                }));
            })
            .await;

        let hits = index(&server)
            .query_document("chunks", vec![0.1, 0.2], "doc-1", 10)
            .await
            .expect("query");

        mock.assert();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].page, 4);
        assert_eq!(hits[0].text, "snippet text");
        assert!((hits[0].score - 0.91).abs() < f32::EPSILON);
    }

    #[tokio::test]
    async fn upsert_sends_one_batched_request() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(PUT)
                    .path("/collections/chunks/points")
                    .query_param("wait", "true");
                then.status(200).json_body(json!({ "result": {} }));
            })
            .await;

        let points = vec![
            ChunkPoint {
                document_id: "doc-1".into(),
                page: 1,
                text: "alpha".into(),
                chunk_hash: "h1".into(),
                vector: vec![0.1, 0.2],
            },
            ChunkPoint {
                document_id: "doc-1".into(),
                page: 2,
                text: "beta".into(),
                chunk_hash: "h2".into(),
                vector: vec![0.3, 0.4],
            },
        ];

        let indexed = index(&server)
            .upsert_chunks("chunks", points)
            .await
            .expect("upsert");

        mock.assert();
        assert_eq!(indexed, 2);
    }

    #[test]
    fn point_ids_are_stable_per_document_and_chunk() {
        assert_eq!(point_id("doc-1", "h1"), point_id("doc-1", "h1"));
        assert_ne!(point_id("doc-1", "h1"), point_id("doc-1", "h2"));
        assert_ne!(point_id("doc-1", "h1"), point_id("doc-2", "h1"));
    }

    #[tokio::test]
    async fn upsert_with_no_points_is_a_no_op() {
        let server = MockServer::start_async().await;
        let indexed = index(&server)
            .upsert_chunks("chunks", Vec::new())
            .await
            .expect("upsert");
        assert_eq!(indexed, 0);
    }

    #[tokio::test]
    async fn query_surfaces_unexpected_status() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/collections/chunks/points/query");
                then.status(500).body("boom");
            })
            .await;

        let error = index(&server)
            .query_document("chunks", vec![0.1], "doc-1", 10)
            .await
            .unwrap_err();
        assert!(matches!(error, VectorError::UnexpectedStatus { .. }));
    }
}
