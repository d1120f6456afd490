//! An `Embedder` targeting any OpenAI-compatible `/v1/embeddings` endpoint.
use super::{Embedder, Embedding};
use crate::chunker::CodeChunk;
use crate::error::{DimensionMismatchError, GitCtxError, NetworkError, RateLimitError};
use crate::models::{self, ModelSpec};
use async_trait::async_trait;
use futures::StreamExt;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const MAX_ATTEMPTS: u32 = 6;
const BASE_BACKOFF: Duration = Duration::from_secs(1);
const DEFAULT_BATCH_TIMEOUT: Duration = Duration::from_secs(60);
const DEFAULT_ATTEMPT_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_CHUNK_CAP: usize = 100;
const DEFAULT_CONCURRENCY: usize = 8;

pub struct OpenAiCompatibleEmbedder {
    client: reqwest::Client,
    api_key: String,
    model: ModelSpec,
    base_url: String,
    chunk_cap: usize,
    concurrency: usize,
    batch_timeout: Duration,
    attempt_timeout: Duration,
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingDatum>,
    usage: Option<Usage>,
}

#[derive(Deserialize)]
struct EmbeddingDatum {
    embedding: Vec<f32>,
}

#[derive(Deserialize)]
struct Usage {
    prompt_tokens: Option<u64>,
}

impl OpenAiCompatibleEmbedder {
    pub fn new(api_key: impl Into<String>, model_name: &str) -> Result<Self, GitCtxError> {
        let model = models::lookup(model_name)?;
        let base_url = model.provider.base_url().to_string();
        Ok(Self {
            client: reqwest::Client::new(),
            api_key: api_key.into(),
            model,
            base_url,
            chunk_cap: DEFAULT_CHUNK_CAP,
            concurrency: DEFAULT_CONCURRENCY,
            batch_timeout: DEFAULT_BATCH_TIMEOUT,
            attempt_timeout: DEFAULT_ATTEMPT_TIMEOUT,
        })
    }

    /// Overrides the request URL, bypassing the provider's default endpoint.
    /// Used by tests to point at a local mock server.
    #[cfg(test)]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_chunk_cap(mut self, cap: usize) -> Self {
        self.chunk_cap = cap.max(1);
        self
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn with_batch_timeout(mut self, timeout: Duration) -> Self {
        self.batch_timeout = timeout;
        self
    }

    fn batches<'a>(&self, texts: &'a [String]) -> Vec<&'a [String]> {
        texts.chunks(self.chunk_cap).collect()
    }

    async fn embed_batch_with_retry(&self, batch: &[String]) -> Result<Vec<Vec<f32>>, GitCtxError> {
        let started = std::time::Instant::now();
        let mut attempt = 0u32;
        let mut last_error = String::new();

        loop {
            attempt += 1;
            match self.send_once(batch).await {
                Ok(vectors) => return Ok(vectors),
                Err(RetryOutcome::Fatal(err)) => return Err(err),
                Err(RetryOutcome::Transient {
                    message,
                    retry_after,
                }) => {
                    last_error = message;
                    if attempt >= MAX_ATTEMPTS || started.elapsed() >= self.batch_timeout {
                        if retry_after.is_some() {
                            return Err(RateLimitError::Exhausted {
                                attempts: attempt,
                                retry_after_honored: true,
                            }
                            .into());
                        }
                        return Err(NetworkError::RetriesExhausted {
                            attempts: attempt,
                            last_error,
                        }
                        .into());
                    }
                    let wait = retry_after.unwrap_or_else(|| backoff_duration(attempt));
                    tokio::time::sleep(wait).await;
                }
            }
        }
    }

    async fn send_once(&self, batch: &[String]) -> Result<Vec<Vec<f32>>, RetryOutcome> {
        let body = EmbeddingRequest {
            model: self.model.name,
            input: batch,
        };
        let request = self
            .client
            .post(&self.base_url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send();

        let response = tokio::time::timeout(self.attempt_timeout, request)
            .await
            .map_err(|_| RetryOutcome::Transient {
                message: format!("request timed out after {}s", self.attempt_timeout.as_secs()),
                retry_after: None,
            })?
            .map_err(|e| RetryOutcome::Transient {
                message: e.to_string(),
                retry_after: None,
            })?;

        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
                .map(Duration::from_secs);
            return Err(RetryOutcome::Transient {
                message: "rate limited".to_string(),
                retry_after: Some(retry_after.unwrap_or_else(|| backoff_duration(1))),
            });
        }
        if status.is_server_error() {
            let text = response.text().await.unwrap_or_default();
            return Err(RetryOutcome::Transient {
                message: format!("{status}: {text}"),
                retry_after: None,
            });
        }
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(RetryOutcome::Fatal(
                NetworkError::ProviderError(format!("{status}: {text}")).into(),
            ));
        }

        let parsed: EmbeddingResponse = response.json().await.map_err(|e| RetryOutcome::Transient {
            message: format!("response parse error: {e}"),
            retry_after: None,
        })?;

        for datum in &parsed.data {
            if datum.embedding.len() != self.model.dimensions {
                return Err(RetryOutcome::Fatal(
                    DimensionMismatchError {
                        expected: self.model.dimensions,
                        actual: datum.embedding.len(),
                    }
                    .into(),
                ));
            }
        }

        let _ = parsed.usage.and_then(|u| u.prompt_tokens);
        Ok(parsed.data.into_iter().map(|d| d.embedding).collect())
    }
}

enum RetryOutcome {
    Fatal(GitCtxError),
    Transient {
        message: String,
        retry_after: Option<Duration>,
    },
}

/// Exponential backoff: `base * 2^(attempt-1)`, jittered by +/-25%.
fn backoff_duration(attempt: u32) -> Duration {
    let exp = BASE_BACKOFF.as_secs_f64() * 2f64.powi(attempt as i32 - 1);
    let jitter = rand::thread_rng().gen_range(-0.25..=0.25);
    let secs = (exp * (1.0 + jitter)).max(0.0);
    Duration::from_secs_f64(secs)
}

#[async_trait]
impl Embedder for OpenAiCompatibleEmbedder {
    async fn embed_chunks(
        &self,
        blob_sha: &str,
        chunks: &[CodeChunk],
    ) -> Result<Vec<Embedding>, GitCtxError> {
        if chunks.is_empty() {
            return Ok(Vec::new());
        }
        let texts: Vec<String> = chunks.iter().map(|c| c.content.clone()).collect();
        let batches = self.batches(&texts);

        // Bounded-concurrency fan-out, preserving batch order on reassembly.
        let results = futures::stream::iter(batches.into_iter().map(|batch| async move {
            self.embed_batch_with_retry(batch).await
        }))
        .buffered(self.concurrency)
        .collect::<Vec<_>>()
        .await;

        let mut vectors = Vec::with_capacity(chunks.len());
        for batch_result in results {
            vectors.extend(batch_result?);
        }
        if vectors.len() != chunks.len() {
            return Err(GitCtxError::other(format!(
                "embedder returned {} vectors for {} chunks",
                vectors.len(),
                chunks.len()
            )));
        }

        let total_chunks = chunks.len();
        Ok(chunks
            .iter()
            .zip(vectors)
            .enumerate()
            .map(|(idx, (chunk, vector))| Embedding {
                vector,
                token_count: chunk.token_count,
                model: self.model.name.to_string(),
                cost_usd: self.model.estimate_cost(chunk.token_count as u64),
                blob_sha: blob_sha.to_string(),
                chunk_index: idx,
                chunk_content: chunk.content.clone(),
                start_line: chunk.start_line,
                end_line: chunk.end_line,
                total_chunks,
                language: chunk
                    .metadata
                    .get("language")
                    .cloned()
                    .unwrap_or_else(|| "unknown".to_string()),
                api_token_count: None,
            })
            .collect())
    }

    fn estimate_cost(&self, token_count: u64) -> f64 {
        self.model.estimate_cost(token_count)
    }

    fn model_name(&self) -> &str {
        self.model.name
    }

    fn dimensions(&self) -> usize {
        self.model.dimensions
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_grows_exponentially_within_jitter() {
        let d1 = backoff_duration(1).as_secs_f64();
        let d4 = backoff_duration(4).as_secs_f64();
        // base 1s * 2^3 = 8s, +/-25% => [6, 10]; attempt 1 is [0.75, 1.25].
        assert!(d1 < 2.0);
        assert!(d4 > 4.0 && d4 < 12.0);
    }

    #[test]
    fn new_rejects_unknown_model() {
        let err = OpenAiCompatibleEmbedder::new("sk-test", "not-a-model").unwrap_err();
        assert!(matches!(
            err,
            GitCtxError::Configuration(crate::error::ConfigurationError::UnknownModel { .. })
        ));
    }

    #[test]
    fn new_resolves_dimensions_from_registry() {
        let embedder = OpenAiCompatibleEmbedder::new("sk-test", "text-embedding-3-small").unwrap();
        assert_eq!(embedder.dimensions(), 1536);
        assert_eq!(embedder.estimate_cost(1_000_000), 0.02);
    }

    /// Accepts one connection, drains whatever the client has sent so far,
    /// and writes back a canned HTTP response.
    async fn respond_once(listener: &tokio::net::TcpListener, status_line: &str, body: &str) {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut buf = [0u8; 8192];
        let _ = tokio::time::timeout(Duration::from_millis(500), socket.read(&mut buf)).await;
        let response = format!(
            "HTTP/1.1 {status_line}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            body.len(),
            body
        );
        socket.write_all(response.as_bytes()).await.unwrap();
        let _ = socket.shutdown().await;
    }

    fn sample_chunk() -> CodeChunk {
        CodeChunk {
            content: "fn main() {}".to_string(),
            start_line: 1,
            end_line: 1,
            token_count: 4,
            metadata: Default::default(),
        }
    }

    #[tokio::test]
    async fn dimension_mismatch_response_fails_without_retry() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            // text-embedding-3-small expects 1536 dimensions; return 2.
            respond_once(
                &listener,
                "200 OK",
                r#"{"data":[{"embedding":[0.1,0.2]}],"usage":null}"#,
            )
            .await;
        });

        let embedder = OpenAiCompatibleEmbedder::new("sk-test", "text-embedding-3-small")
            .unwrap()
            .with_base_url(format!("http://{addr}/v1/embeddings"));

        let result = tokio::time::timeout(
            Duration::from_secs(5),
            embedder.embed_chunks("deadbeef", &[sample_chunk()]),
        )
        .await
        .expect("embed_chunks must not hang retrying a fatal error");

        let err = result.unwrap_err();
        assert!(matches!(err, GitCtxError::DimensionMismatch(DimensionMismatchError { expected: 1536, actual: 2 })));
        server.await.unwrap();
    }

    #[tokio::test]
    async fn rate_limited_response_is_retried_and_then_succeeds() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            respond_once(&listener, "429 Too Many Requests", "{}").await;
            respond_once(
                &listener,
                "200 OK",
                &format!(
                    r#"{{"data":[{{"embedding":[{}]}}],"usage":null}}"#,
                    vec!["0.01"; 1536].join(",")
                ),
            )
            .await;
        });

        let embedder = OpenAiCompatibleEmbedder::new("sk-test", "text-embedding-3-small")
            .unwrap()
            .with_base_url(format!("http://{addr}/v1/embeddings"));

        let result = tokio::time::timeout(
            Duration::from_secs(10),
            embedder.embed_chunks("deadbeef", &[sample_chunk()]),
        )
        .await
        .expect("embed_chunks must not hang across a single retry");

        let embeddings = result.unwrap();
        assert_eq!(embeddings.len(), 1);
        assert_eq!(embeddings[0].vector.len(), 1536);
        server.await.unwrap();
    }
}
