//! Token tracking for responses that are still streaming

use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};

use super::counter::CHARS_PER_TOKEN;

/// Running estimate of a streaming response's token cost
#[derive(Debug)]
pub struct StreamingTokenCounter {
    chars_per_token: f32,
    char_count: AtomicUsize,
    estimated_tokens: AtomicUsize,
    chunk_count: AtomicUsize,
}

impl Default for StreamingTokenCounter {
    fn default() -> Self {
        Self::new()
    }
}

impl StreamingTokenCounter {
    pub fn new() -> Self {
        Self {
            chars_per_token: CHARS_PER_TOKEN,
            char_count: AtomicUsize::new(0),
            estimated_tokens: AtomicUsize::new(0),
            chunk_count: AtomicUsize::new(0),
        }
    }

    /// Create with custom chars per token estimate
    pub fn with_chars_per_token(mut self, chars_per_token: f32) -> Self {
        self.chars_per_token = chars_per_token.max(0.1);
        self
    }

    /// Account for a chunk and return the change in estimated tokens
    pub fn process_chunk(&self, content: &str) -> i64 {
        let total_chars = self.char_count.fetch_add(content.len(), Ordering::SeqCst) + content.len();
        let estimated = (total_chars as f32 / self.chars_per_token).ceil() as usize;
        let previous = self.estimated_tokens.swap(estimated, Ordering::SeqCst);
        self.chunk_count.fetch_add(1, Ordering::SeqCst);
        estimated as i64 - previous as i64
    }

    pub fn estimated_tokens(&self) -> usize {
        self.estimated_tokens.load(Ordering::SeqCst)
    }

    pub fn char_count(&self) -> usize {
        self.char_count.load(Ordering::SeqCst)
    }

    pub fn chunk_count(&self) -> usize {
        self.chunk_count.load(Ordering::SeqCst)
    }

    pub fn reset(&self) {
        self.char_count.store(0, Ordering::SeqCst);
        self.estimated_tokens.store(0, Ordering::SeqCst);
        self.chunk_count.store(0, Ordering::SeqCst);
    }
}

/// Prospective tokens of a generation in progress.
///
/// Accepts signed deltas and never drops below zero. Must be cleared whenever a
/// generation ends, including when it is aborted.
#[derive(Debug, Default)]
pub struct InFlightTokens {
    tokens: AtomicI64,
}

impl InFlightTokens {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply a delta and return the new total
    pub fn add(&self, delta: i64) -> usize {
        let previous = self
            .tokens
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |current| {
                Some((current + delta).max(0))
            })
            .unwrap_or(0);
        (previous + delta).max(0) as usize
    }

    pub fn current(&self) -> usize {
        self.tokens.load(Ordering::SeqCst).max(0) as usize
    }

    pub fn clear(&self) {
        self.tokens.store(0, Ordering::SeqCst);
    }
}
