//! Tests for messages and the provider seam

use super::*;
use crate::error::{TallyError, TallyResult};
use async_trait::async_trait;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

struct ChunkedProvider {
    events: Vec<StreamEvent>,
}

#[async_trait]
impl ChatProvider for ChunkedProvider {
    async fn chat_stream(&self, _request: ChatRequest) -> TallyResult<ChatStream> {
        Ok(Box::pin(futures::stream::iter(self.events.clone())))
    }
}

struct StalledProvider;

#[async_trait]
impl ChatProvider for StalledProvider {
    async fn chat_stream(&self, _request: ChatRequest) -> TallyResult<ChatStream> {
        Ok(Box::pin(futures::stream::pending::<StreamEvent>()))
    }
}

#[test]
fn test_message_constructors() {
    let msg = Message::user("hello");
    assert_eq!(msg.role, MessageRole::User);
    assert!(msg.is_user());
    assert!(!msg.id.is_empty());
    assert!(msg.token_count.is_none());

    let other = Message::user("hello");
    assert_ne!(msg.id, other.id);
}

#[test]
fn test_message_flags() {
    let msg = Message::system("marker")
        .with_metadata("tally_summary", true)
        .with_metadata("compressed_count", 12u64);
    assert!(msg.has_flag("tally_summary"));
    assert!(!msg.has_flag("missing"));
    assert_eq!(msg.metadata_u64("compressed_count"), Some(12));
}

#[test]
fn test_message_serde_roundtrip_keeps_metadata() {
    let msg = Message::assistant("done")
        .with_tool_calls(vec![ToolCall::new("c1", "read_file", serde_json::json!({"path": "a.rs"}))])
        .with_metadata("k", "v");
    let json = serde_json::to_string(&msg).unwrap();
    assert!(json.contains("\"role\":\"assistant\""));
    let back: Message = serde_json::from_str(&json).unwrap();
    assert_eq!(back, msg);
}

#[tokio::test]
async fn test_collect_text_concatenates_chunks() {
    let provider = ChunkedProvider {
        events: vec![
            StreamEvent::Text("Hello, ".into()),
            StreamEvent::Text("world".into()),
        ],
    };
    let text = collect_text(&provider, ChatRequest::new("m", vec![])).await.unwrap();
    assert_eq!(text, "Hello, world");
}

#[tokio::test]
async fn test_collect_text_surfaces_stream_error() {
    let provider = ChunkedProvider {
        events: vec![
            StreamEvent::Text("partial".into()),
            StreamEvent::Error("model crashed".into()),
        ],
    };
    let err = collect_text(&provider, ChatRequest::new("m", vec![]))
        .await
        .unwrap_err();
    assert!(matches!(err, TallyError::Llm { .. }));
}

#[tokio::test]
async fn test_collect_text_times_out() {
    let request = ChatRequest::new("m", vec![]).with_timeout(Duration::from_millis(20));
    let err = collect_text(&StalledProvider, request).await.unwrap_err();
    assert!(matches!(err, TallyError::Timeout { .. }));
}

#[tokio::test]
async fn test_collect_text_cancelled() {
    let cancel = CancellationToken::new();
    let request = ChatRequest::new("m", vec![]).with_cancel(cancel.clone());
    cancel.cancel();
    let err = collect_text(&StalledProvider, request).await.unwrap_err();
    assert!(matches!(err, TallyError::Cancelled));
}
