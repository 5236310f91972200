use anyhow::Context;
use pagescout::api::{self, AppState};
use pagescout::cache::ResultCache;
use pagescout::chunker::Chunker;
use pagescout::config::Config;
use pagescout::discovery::SearchClient;
use pagescout::embedding::HttpEmbeddingClient;
use pagescout::extract::TextExtractor;
use pagescout::fetcher::PdfFetcher;
use pagescout::inference::ChatInferencer;
use pagescout::logging;
use pagescout::metrics::ProcessingMetrics;
use pagescout::pipeline::DocumentPipeline;
use pagescout::pool::WorkerPool;
use pagescout::store::Store;
use pagescout::vector::VectorIndex;
use std::sync::Arc;
use tokio::net::TcpListener;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    logging::init_tracing();

    let config = Config::from_env().context("failed to load configuration")?;

    let store = Store::connect(&config.database_url)
        .await
        .context("failed to open record store")?;

    let vectors = Arc::new(
        VectorIndex::new(&config.qdrant_url, config.qdrant_api_key.clone())
            .context("invalid Qdrant URL")?,
    );
    vectors
        .ensure_collection(
            &config.qdrant_collection_name,
            config.embedding_dimension as u64,
        )
        .await
        .context("failed to prepare vector collection")?;

    let embedder = Arc::new(
        HttpEmbeddingClient::new(
            &config.openai_base_url,
            config.openai_api_key.clone(),
            &config.embedding_model,
            config.embedding_dimension,
        )
        .context("failed to build embedding client")?,
    );
    let inferencer = Arc::new(ChatInferencer::new(
        &config.openai_base_url,
        config.openai_api_key.clone(),
        &config.inference_model,
    ));
    let search = Arc::new(SearchClient::new(
        &config.search_base_url,
        config.search_api_key.as_deref().unwrap_or_default(),
        config.search_engine_id.as_deref().unwrap_or_default(),
    ));

    let metrics = Arc::new(ProcessingMetrics::new());
    let pipeline = DocumentPipeline::new(
        PdfFetcher::new(config.fetch_timeout, config.max_pdf_bytes)
            .context("failed to build PDF fetcher")?,
        TextExtractor::new(config.max_pdf_pages, config.extract_timeout),
        Chunker::new(config.chunk_size, config.chunk_overlap)
            .context("invalid chunking configuration")?,
        embedder,
        vectors,
        config.qdrant_collection_name.clone(),
        store.clone(),
        inferencer,
        Arc::new(ResultCache::new(config.cache_ttl)),
        Arc::clone(&metrics),
        config.retrieval_top_k,
    );

    let state = AppState {
        search,
        processor: Arc::new(pipeline),
        pool: WorkerPool::new(config.worker_count),
        store,
        metrics,
    };
    let app = api::create_router(state);

    let (listener, port) = bind_listener(config.server_port)
        .await
        .context("failed to bind listener")?;
    tracing::info!("Listening on http://0.0.0.0:{}", port);
    axum::serve(listener, app).await?;
    Ok(())
}

async fn bind_listener(configured_port: Option<u16>) -> Result<(TcpListener, u16), std::io::Error> {
    use std::net::Ipv4Addr;

    if let Some(port) = configured_port {
        return TcpListener::bind((Ipv4Addr::UNSPECIFIED, port))
            .await
            .map(|listener| (listener, port));
    }

    const PORT_RANGE: std::ops::RangeInclusive<u16> = 4300..=4399;
    for port in PORT_RANGE {
        match TcpListener::bind((Ipv4Addr::UNSPECIFIED, port)).await {
            Ok(listener) => {
                tracing::debug!(port, "Bound server port");
                return Ok((listener, port));
            }
            Err(err) if err.kind() == std::io::ErrorKind::AddrInUse => {
                tracing::debug!(port, "Port already in use; trying next");
                continue;
            }
            Err(err) => return Err(err),
        }
    }

    Err(std::io::Error::new(
        std::io::ErrorKind::AddrNotAvailable,
        "No available port found in range 4300-4399",
    ))
}
