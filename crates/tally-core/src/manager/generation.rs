//! In-flight generation accounting

use std::sync::Arc;

use super::ContextManager;
use crate::error::TallyResult;
use crate::llm::Message;
use crate::pool::{ContextPool, ContextUsage};
use crate::tokens::{InFlightTokens, StreamingTokenCounter};

/// Tracks a response while it streams in.
///
/// Chunks grow the in-flight total that usage checks see. Dropping the guard,
/// whether the generation finished or was aborted, clears that total and ends
/// the pool request so deferred resizes can apply.
pub struct GenerationGuard {
    in_flight: Arc<InFlightTokens>,
    pool: Arc<ContextPool>,
    counter: StreamingTokenCounter,
    text: String,
}

impl GenerationGuard {
    fn new(in_flight: Arc<InFlightTokens>, pool: Arc<ContextPool>) -> Self {
        pool.begin_request();
        in_flight.clear();
        Self {
            in_flight,
            pool,
            counter: StreamingTokenCounter::new(),
            text: String::new(),
        }
    }

    /// Account for a streamed chunk. Returns the in-flight total.
    pub fn record_chunk(&mut self, chunk: &str) -> usize {
        self.text.push_str(chunk);
        let delta = self.counter.process_chunk(chunk);
        self.in_flight.add(delta)
    }

    pub fn estimated_tokens(&self) -> usize {
        self.counter.estimated_tokens()
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// Finish the generation as an assistant message
    pub fn into_message(mut self) -> Message {
        Message::assistant(std::mem::take(&mut self.text))
    }
}

impl Drop for GenerationGuard {
    fn drop(&mut self) {
        self.in_flight.clear();
        self.pool.end_request();
    }
}

impl ContextManager {
    /// Start tracking a response. Resizes requested meanwhile are deferred.
    pub fn begin_generation(&mut self) -> GenerationGuard {
        self.sync_pool_resize();
        GenerationGuard::new(self.in_flight.clone(), self.pool.clone())
    }

    /// Commit a finished response and run any compression scheduled for after it
    pub async fn complete_response(
        &mut self,
        generation: GenerationGuard,
        message: Message,
    ) -> TallyResult<ContextUsage> {
        drop(generation);
        self.commit_response(message).await
    }

    /// Commit the streamed text of `generation` as the assistant reply
    pub async fn complete_generation(&mut self, generation: GenerationGuard) -> TallyResult<ContextUsage> {
        self.commit_response(generation.into_message()).await
    }

    async fn commit_response(&mut self, message: Message) -> TallyResult<ContextUsage> {
        self.sync_pool_resize();
        self.add_message(message).await?;
        self.run_deferred_compression().await;
        Ok(self.publish_usage())
    }
}
