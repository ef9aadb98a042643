use crate::embeddings::{Embedder, LocalEmbedder};
use crate::error::ProviderError;
use crate::models::SearchHit;
use crate::traits::{EmbeddingProvider, ResponseGenerator};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{error, info, warn};
use url::Url;

pub const DEFAULT_BASE_URL: &str = "https://api.deepseek.com/v1";
pub const DEFAULT_EMBEDDING_MODEL: &str = "deepseek-base";
pub const DEFAULT_CHAT_MODEL: &str = "deepseek-chat";
pub const PROVIDER_TIMEOUT: Duration = Duration::from_secs(30);

pub const NO_CONTEXT_RESPONSE: &str =
    "I don't have any relevant context from the documents to answer your question.";

const SYSTEM_PROMPT: &str = "You are a helpful assistant that answers questions based on the \
provided document context. Always be accurate and concise.";

const MOCK_CONTEXT_CHUNKS: usize = 2;

#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub api_key: Option<String>,
    pub base_url: String,
    pub embedding_model: String,
    pub chat_model: String,
    pub timeout: Duration,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: DEFAULT_BASE_URL.to_string(),
            embedding_model: DEFAULT_EMBEDDING_MODEL.to_string(),
            chat_model: DEFAULT_CHAT_MODEL.to_string(),
            timeout: PROVIDER_TIMEOUT,
        }
    }
}

impl ProviderConfig {
    /// Reads `DEEPSEEK_API_KEY`, `DEEPSEEK_BASE_URL`, `DEEPSEEK_EMBEDDING_MODEL` and
    /// `DEEPSEEK_CHAT_MODEL`. Blank values count as unset.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            api_key: non_blank_env("DEEPSEEK_API_KEY"),
            base_url: non_blank_env("DEEPSEEK_BASE_URL").unwrap_or(defaults.base_url),
            embedding_model: non_blank_env("DEEPSEEK_EMBEDDING_MODEL")
                .unwrap_or(defaults.embedding_model),
            chat_model: non_blank_env("DEEPSEEK_CHAT_MODEL").unwrap_or(defaults.chat_model),
            timeout: defaults.timeout,
        }
    }
}

fn non_blank_env(name: &str) -> Option<String> {
    std::env::var(name).ok().and_then(|value| {
        let value = value.trim().to_string();
        if value.is_empty() {
            None
        } else {
            Some(value)
        }
    })
}

#[derive(Debug, Clone, Serialize)]
struct EmbeddingRequest<'a> {
    input: &'a [String],
    model: &'a str,
}

#[derive(Debug, Clone, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingDatum>,
}

#[derive(Debug, Clone, Deserialize)]
struct EmbeddingDatum {
    embedding: Vec<f32>,
    #[serde(default)]
    index: Option<usize>,
}

#[derive(Debug, Clone, Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Clone, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Clone, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Clone, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Clone, Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

/// Client for an OpenAI-compatible embeddings + chat completions API.
#[derive(Debug, Clone)]
pub struct RemoteProvider {
    client: Client,
    base: Url,
    api_key: String,
    embedding_model: String,
    chat_model: String,
}

impl RemoteProvider {
    pub fn new(config: &ProviderConfig) -> Result<Self, ProviderError> {
        let api_key = config
            .api_key
            .clone()
            .ok_or_else(|| ProviderError::NotConfigured("no API key".to_string()))?;

        let mut base = config.base_url.trim().to_string();
        if !base.ends_with('/') {
            base.push('/');
        }

        Ok(Self {
            client: Client::builder().timeout(config.timeout).build()?,
            base: Url::parse(&base)?,
            api_key,
            embedding_model: config.embedding_model.clone(),
            chat_model: config.chat_model.clone(),
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url, ProviderError> {
        Ok(self.base.join(path)?)
    }

    async fn post_json<B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<reqwest::Response, ProviderError> {
        let url = self.endpoint(path)?;
        let response = self
            .client
            .post(url.clone())
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::BackendResponse {
                backend: url.to_string(),
                details: format!("{status} - {body}"),
            });
        }

        Ok(response)
    }
}

#[async_trait]
impl EmbeddingProvider for RemoteProvider {
    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
        let request = EmbeddingRequest {
            input: texts,
            model: &self.embedding_model,
        };
        let mut parsed: EmbeddingResponse =
            self.post_json("embeddings", &request).await?.json().await?;

        if parsed.data.iter().all(|datum| datum.index.is_some()) {
            parsed.data.sort_by_key(|datum| datum.index);
        }
        if parsed.data.len() != texts.len() {
            return Err(ProviderError::BackendResponse {
                backend: "embeddings".to_string(),
                details: format!(
                    "{} embeddings returned for {} inputs",
                    parsed.data.len(),
                    texts.len()
                ),
            });
        }

        Ok(parsed.data.into_iter().map(|datum| datum.embedding).collect())
    }

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
        let mut rows = self.embed_documents(&[text.to_string()]).await?;
        rows.pop().ok_or_else(|| ProviderError::BackendResponse {
            backend: "embeddings".to_string(),
            details: "no embedding returned for query".to_string(),
        })
    }
}

#[async_trait]
impl ResponseGenerator for RemoteProvider {
    async fn generate(&self, query: &str, context: &[SearchHit]) -> Result<String, ProviderError> {
        let request = ChatRequest {
            model: &self.chat_model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT.to_string(),
                },
                ChatMessage {
                    role: "user",
                    content: user_prompt(query, context),
                },
            ],
            temperature: 0.3,
            max_tokens: 500,
        };

        let parsed: ChatResponse = self
            .post_json("chat/completions", &request)
            .await?
            .json()
            .await?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .map(|content| content.trim().to_string())
            .ok_or_else(|| ProviderError::BackendResponse {
                backend: "chat/completions".to_string(),
                details: "response had no message content".to_string(),
            })
    }
}

fn user_prompt(query: &str, context: &[SearchHit]) -> String {
    let context = context
        .iter()
        .map(SearchHit::text)
        .collect::<Vec<_>>()
        .join("\n\n");
    format!(
        "Context from documents:\n\n{context}\n\nQuestion: {query}\n\n\
         Answer the question based only on the provided context."
    )
}

/// Offline answer built straight from the best-ranked chunks.
pub fn mock_response(context: &[SearchHit]) -> String {
    if context.is_empty() {
        return NO_CONTEXT_RESPONSE.to_string();
    }

    let excerpt = context
        .iter()
        .take(MOCK_CONTEXT_CHUNKS)
        .map(SearchHit::text)
        .collect::<Vec<_>>()
        .join("\n\n");
    format!(
        "Based on the documents, here's what I found:\n\n{excerpt}\n\n\
         (Note: This is a mock response. Add your DeepSeek API key for AI-powered answers.)"
    )
}

/// Embedding and answer generation that never fails: every remote error falls back to
/// the local embedder or the mock response.
#[derive(Debug, Clone)]
pub struct ChatHandler<R = RemoteProvider> {
    remote: Option<R>,
    local: LocalEmbedder,
}

impl ChatHandler<RemoteProvider> {
    pub fn from_config(config: &ProviderConfig, local: LocalEmbedder) -> Self {
        if config.api_key.is_none() {
            warn!("no DeepSeek API key found; using local embeddings and mock responses");
            return Self::offline(local);
        }

        match RemoteProvider::new(config) {
            Ok(remote) => {
                info!(base_url = %config.base_url, "DeepSeek API key loaded");
                Self::with_remote(remote, local)
            }
            Err(setup_error) => {
                error!(error = %setup_error, "remote provider unusable; staying offline");
                Self::offline(local)
            }
        }
    }
}

impl<R> ChatHandler<R>
where
    R: EmbeddingProvider + ResponseGenerator + Send + Sync,
{
    pub fn with_remote(remote: R, local: LocalEmbedder) -> Self {
        Self {
            remote: Some(remote),
            local,
        }
    }

    pub fn offline(local: LocalEmbedder) -> Self {
        Self {
            remote: None,
            local,
        }
    }

    pub fn is_remote(&self) -> bool {
        self.remote.is_some()
    }

    pub fn local(&self) -> &LocalEmbedder {
        &self.local
    }

    pub async fn generate_embeddings(&self, texts: &[String]) -> Vec<Vec<f32>> {
        if let Some(remote) = &self.remote {
            match remote.embed_documents(texts).await {
                Ok(rows) => return rows,
                Err(remote_error) => {
                    error!(error = %remote_error, inputs = texts.len(), "embedding API failed; using local embeddings")
                }
            }
        }
        self.local.embed_batch(texts)
    }

    pub async fn generate_query_embedding(&self, text: &str) -> Vec<f32> {
        if let Some(remote) = &self.remote {
            match remote.embed_query(text).await {
                Ok(row) => return row,
                Err(remote_error) => {
                    error!(error = %remote_error, "query embedding failed; using local embedding")
                }
            }
        }
        self.local.embed(text)
    }

    pub async fn generate_response(&self, query: &str, context: &[SearchHit]) -> String {
        let Some(remote) = &self.remote else {
            return mock_response(context);
        };
        if context.is_empty() {
            return NO_CONTEXT_RESPONSE.to_string();
        }

        match remote.generate(query, context).await {
            Ok(answer) => answer,
            Err(remote_error) => {
                error!(error = %remote_error, "chat API failed; using mock response");
                mock_response(context)
            }
        }
    }
}
