//! Cached token counter

use lru::LruCache;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::llm::{Message, ToolCall};

/// Characters per token used by the fallback estimator
pub const CHARS_PER_TOKEN: f32 = 4.0;
/// Tokens added per message for role and formatting
pub const MESSAGE_OVERHEAD: usize = 4;
/// Tokens added per tool call for call structure
pub const TOOL_CALL_OVERHEAD: usize = 10;

const DEFAULT_CACHE_CAPACITY: usize = 4096;

/// Exact tokenizer for a specific model
pub trait Tokenizer: Send + Sync {
    /// Count tokens in raw text
    fn count(&self, text: &str) -> usize;
}

/// Cache statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct TokenCounterMetrics {
    pub hits: u64,
    pub misses: u64,
    /// Entries currently cached
    pub entries: usize,
    /// hits / (hits + misses), 0 when nothing was looked up
    pub hit_rate: f64,
}

#[derive(Debug, Clone, Copy)]
struct CacheEntry {
    fingerprint: u64,
    tokens: usize,
}

/// Token counter with a per-message LRU cache.
///
/// Cache entries are keyed by message id and guarded by a fingerprint of the text, so
/// a reused id with different content is recounted instead of returning a stale value.
pub struct TokenCounter {
    tokenizer: Option<Arc<dyn Tokenizer>>,
    cache: Mutex<LruCache<u64, CacheEntry>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl Default for TokenCounter {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for TokenCounter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenCounter")
            .field("has_tokenizer", &self.tokenizer.is_some())
            .field("metrics", &self.metrics())
            .finish()
    }
}

impl TokenCounter {
    /// Counter using the length/4 estimator
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CACHE_CAPACITY)
    }

    /// Counter with a custom cache capacity
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1)).unwrap_or(NonZeroUsize::MIN);
        Self {
            tokenizer: None,
            cache: Mutex::new(LruCache::new(capacity)),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Use an exact tokenizer instead of the estimator
    pub fn with_tokenizer(mut self, tokenizer: Arc<dyn Tokenizer>) -> Self {
        self.tokenizer = Some(tokenizer);
        self
    }

    /// Count tokens in raw text, without message overhead
    pub fn count_tokens(&self, text: &str) -> usize {
        match &self.tokenizer {
            Some(tokenizer) => tokenizer.count(text),
            None => estimate(text),
        }
    }

    /// Count a message body by id, memoized.
    ///
    /// Returns text tokens plus [`MESSAGE_OVERHEAD`]. Repeated calls with the same
    /// `(id, text)` return the same value until [`clear_cache`](Self::clear_cache).
    pub fn count_tokens_cached(&self, id: &str, text: &str) -> usize {
        let key = hash_str(id);
        let fingerprint = hash_str(text);

        {
            let mut cache = self.cache.lock();
            if let Some(entry) = cache.get(&key) {
                if entry.fingerprint == fingerprint {
                    self.hits.fetch_add(1, Ordering::Relaxed);
                    return entry.tokens;
                }
            }
        }

        let tokens = self.count_tokens(text) + MESSAGE_OVERHEAD;
        self.misses.fetch_add(1, Ordering::Relaxed);
        self.cache
            .lock()
            .put(key, CacheEntry { fingerprint, tokens });
        tokens
    }

    /// Full cost of a message including tool calls
    pub fn count_message(&self, message: &Message) -> usize {
        let base = self.count_tokens_cached(&message.id, &message.content);
        let tools = message
            .tool_calls
            .as_ref()
            .map(|calls| calls.iter().map(|c| self.count_tool_call(c)).sum())
            .unwrap_or(0);
        base + tools
    }

    /// Total cost of a message list
    pub fn count_conversation_tokens(&self, messages: &[Message]) -> usize {
        messages.iter().map(|m| self.count_message(m)).sum()
    }

    fn count_tool_call(&self, call: &ToolCall) -> usize {
        let args = serde_json::to_string(&call.arguments).unwrap_or_default();
        self.count_tokens(&call.name) + self.count_tokens(&args) + TOOL_CALL_OVERHEAD
    }

    /// Current cache statistics
    pub fn metrics(&self) -> TokenCounterMetrics {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let lookups = hits + misses;
        TokenCounterMetrics {
            hits,
            misses,
            entries: self.cache.lock().len(),
            hit_rate: if lookups == 0 {
                0.0
            } else {
                hits as f64 / lookups as f64
            },
        }
    }

    /// Drop every cached count
    pub fn clear_cache(&self) {
        self.cache.lock().clear();
        tracing::debug!("Token cache cleared");
    }

    /// Reset hit/miss counters without touching cached entries
    pub fn reset_metrics(&self) {
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
    }
}

fn estimate(text: &str) -> usize {
    (text.len() as f32 / CHARS_PER_TOKEN).ceil() as usize
}

fn hash_str(value: &str) -> u64 {
    let mut hasher = DefaultHasher::new();
    value.hash(&mut hasher);
    hasher.finish()
}
