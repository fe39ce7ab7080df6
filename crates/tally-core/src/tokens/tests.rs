//! Tests for token accounting

use super::*;
use crate::llm::{Message, ToolCall};
use std::sync::Arc;

struct WordTokenizer;

impl Tokenizer for WordTokenizer {
    fn count(&self, text: &str) -> usize {
        text.split_whitespace().count()
    }
}

#[test]
fn test_estimator_rounds_up() {
    let counter = TokenCounter::new();
    assert_eq!(counter.count_tokens(""), 0);
    assert_eq!(counter.count_tokens("abcd"), 1);
    assert_eq!(counter.count_tokens("abcde"), 2);
}

#[test]
fn test_cached_count_adds_overhead() {
    let counter = TokenCounter::new();
    assert_eq!(counter.count_tokens_cached("m1", "abcdefgh"), 2 + MESSAGE_OVERHEAD);
}

#[test]
fn test_cached_count_is_idempotent() {
    let counter = TokenCounter::new();
    let first = counter.count_tokens_cached("m1", "the quick brown fox");
    let second = counter.count_tokens_cached("m1", "the quick brown fox");
    assert_eq!(first, second);

    let metrics = counter.metrics();
    assert_eq!(metrics.hits, 1);
    assert_eq!(metrics.misses, 1);
    assert_eq!(metrics.entries, 1);
    assert!((metrics.hit_rate - 0.5).abs() < f64::EPSILON);
}

#[test]
fn test_reused_id_with_new_text_is_recounted() {
    let counter = TokenCounter::new();
    let short = counter.count_tokens_cached("m1", "abcd");
    let long = counter.count_tokens_cached("m1", &"x".repeat(400));
    assert_ne!(short, long);
    assert_eq!(long, 100 + MESSAGE_OVERHEAD);
    assert_eq!(counter.metrics().misses, 2);
}

#[test]
fn test_clear_cache() {
    let counter = TokenCounter::new();
    counter.count_tokens_cached("m1", "hello");
    counter.clear_cache();
    assert_eq!(counter.metrics().entries, 0);
    counter.count_tokens_cached("m1", "hello");
    assert_eq!(counter.metrics().misses, 2);
}

#[test]
fn test_lru_capacity_bounds_entries() {
    let counter = TokenCounter::with_capacity(2);
    counter.count_tokens_cached("a", "1");
    counter.count_tokens_cached("b", "2");
    counter.count_tokens_cached("c", "3");
    assert_eq!(counter.metrics().entries, 2);
}

#[test]
fn test_custom_tokenizer() {
    let counter = TokenCounter::new().with_tokenizer(Arc::new(WordTokenizer));
    assert_eq!(counter.count_tokens("one two three"), 3);
    assert_eq!(counter.count_tokens_cached("m", "one two"), 2 + MESSAGE_OVERHEAD);
}

#[test]
fn test_conversation_includes_tool_calls() {
    let counter = TokenCounter::new();
    let plain = Message::assistant("abcd");
    let with_tools = Message::assistant("abcd").with_tool_calls(vec![ToolCall::new(
        "c1",
        "grep",
        serde_json::json!({}),
    )]);

    let plain_cost = counter.count_message(&plain);
    let tool_cost = counter.count_message(&with_tools);
    // "grep" -> 1, "{}" -> 1, plus structure overhead
    assert_eq!(tool_cost, plain_cost + 2 + TOOL_CALL_OVERHEAD);
    assert_eq!(
        counter.count_conversation_tokens(&[plain, with_tools]),
        plain_cost + tool_cost
    );
}

#[test]
fn test_streaming_counter_reports_deltas() {
    let counter = StreamingTokenCounter::new();
    assert_eq!(counter.process_chunk("abcd"), 1);
    assert_eq!(counter.process_chunk("ab"), 1);
    assert_eq!(counter.process_chunk("cd"), 0);
    assert_eq!(counter.estimated_tokens(), 2);
    assert_eq!(counter.chunk_count(), 3);

    counter.reset();
    assert_eq!(counter.estimated_tokens(), 0);
}

#[test]
fn test_in_flight_never_negative() {
    let in_flight = InFlightTokens::new();
    assert_eq!(in_flight.add(50), 50);
    assert_eq!(in_flight.add(-20), 30);
    assert_eq!(in_flight.add(-100), 0);
    assert_eq!(in_flight.current(), 0);

    in_flight.add(10);
    in_flight.clear();
    assert_eq!(in_flight.current(), 0);
}
