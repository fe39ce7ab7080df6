//! Streaming chat-completion contract consumed by the summarizer

use async_trait::async_trait;
use futures::{Stream, StreamExt};
use std::pin::Pin;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use super::messages::Message;
use crate::error::{TallyError, TallyResult};

/// One event from a streaming completion
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// A chunk of generated text
    Text(String),
    /// The backend reported an error mid-stream
    Error(String),
}

/// Boxed stream of completion events
pub type ChatStream = Pin<Box<dyn Stream<Item = StreamEvent> + Send>>;

/// Parameters for a single completion call
#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<Message>,
    pub max_tokens: usize,
    pub temperature: f32,
    /// Upper bound for the whole call, stream included
    pub timeout: Duration,
    /// Aborts the call when cancelled
    pub cancel: CancellationToken,
}

impl ChatRequest {
    pub fn new(model: impl Into<String>, messages: Vec<Message>) -> Self {
        Self {
            model: model.into(),
            messages,
            max_tokens: 1024,
            temperature: 0.3,
            timeout: Duration::from_secs(120),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_max_tokens(mut self, max_tokens: usize) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }
}

/// A backend able to stream chat completions
#[async_trait]
pub trait ChatProvider: Send + Sync {
    /// Provider name used in logs and errors
    fn name(&self) -> &str {
        "chat-provider"
    }

    /// Start a streaming completion
    async fn chat_stream(&self, request: ChatRequest) -> TallyResult<ChatStream>;
}

/// Drain a completion into a single string.
///
/// Honors the request timeout and cancellation token. An error event in the stream
/// aborts the collection with [`TallyError::Llm`].
pub async fn collect_text(provider: &dyn ChatProvider, request: ChatRequest) -> TallyResult<String> {
    let timeout = request.timeout;
    let cancel = request.cancel.clone();
    let provider_name = provider.name().to_string();

    let work = async move {
        let mut stream = provider.chat_stream(request).await?;
        let mut text = String::new();
        while let Some(event) = stream.next().await {
            match event {
                StreamEvent::Text(chunk) => text.push_str(&chunk),
                StreamEvent::Error(message) => {
                    return Err(TallyError::llm_with_provider(message, provider_name));
                }
            }
        }
        Ok(text)
    };

    tokio::select! {
        _ = cancel.cancelled() => Err(TallyError::Cancelled),
        result = tokio::time::timeout(timeout, work) => match result {
            Ok(inner) => inner,
            Err(_) => Err(TallyError::timeout(timeout.as_secs())),
        },
    }
}
