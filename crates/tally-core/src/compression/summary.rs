//! Summarization prompt and response handling

use crate::llm::{Message, MessageRole};

/// First line of every summary message, used to recognise earlier summaries
pub const SUMMARY_HEADER: &str = "[Conversation summary]";

const MAX_MESSAGE_CHARS: usize = 1000;

const SUMMARY_INSTRUCTIONS: &str = "You compress conversation history for a long-running session. \
Summarize the conversation below so work can continue without it. Respond with exactly two sections:

## Active Goals
Tasks still in progress, open questions, constraints and decisions that still apply.

## History Archive
Completed work, resolved issues, file paths and facts worth keeping.

Be specific and terse. Wrap the whole answer in <summary></summary> tags.";

/// Build the request messages for summarizing `span`.
///
/// A previous summary is merged so the new one supersedes it instead of losing it.
pub fn build_summary_prompt(span: &[Message], previous_summary: Option<&str>) -> Vec<Message> {
    let mut body = String::new();
    if let Some(previous) = previous_summary.filter(|p| !p.trim().is_empty()) {
        body.push_str(
            "An earlier summary exists. Merge it into your answer so nothing it records is lost:\n\
             <previous_summary>\n",
        );
        body.push_str(previous.trim());
        body.push_str("\n</previous_summary>\n\n");
    }
    body.push_str("---\nCONVERSATION TO SUMMARIZE:\n");
    body.push_str(&format_messages_for_summary(span));
    body.push_str("\n---");

    vec![Message::system(SUMMARY_INSTRUCTIONS), Message::user(body)]
}

/// Render messages as `[ROLE]: content` blocks
pub fn format_messages_for_summary(messages: &[Message]) -> String {
    messages
        .iter()
        .map(|m| {
            let role = match m.role {
                MessageRole::User => "USER",
                MessageRole::Assistant => "ASSISTANT",
                MessageRole::Tool => "TOOL",
                MessageRole::System => "SYSTEM",
            };
            let tools = match &m.tool_calls {
                Some(calls) if !calls.is_empty() => {
                    let names: Vec<_> = calls.iter().map(|c| c.name.as_str()).collect();
                    format!(" [Tools: {}]", names.join(", "))
                }
                _ => String::new(),
            };
            format!("[{}{}]: {}", role, tools, truncate_chars(&m.content, MAX_MESSAGE_CHARS))
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Extract summary from a response, handling <summary> tags
pub fn extract_summary(response: &str) -> String {
    if let Some(start) = response.find("<summary>") {
        let body_start = start + "<summary>".len();
        let body_end = response[body_start..]
            .find("</summary>")
            .map(|end| body_start + end)
            .unwrap_or(response.len());
        return response[body_start..body_end].trim().to_string();
    }
    response.trim().to_string()
}

/// Summary body of an earlier summary message, header removed
pub fn strip_summary_header(content: &str) -> &str {
    content
        .strip_prefix(SUMMARY_HEADER)
        .unwrap_or(content)
        .trim()
}

/// Deterministic text used when summarization is unavailable
pub fn placeholder_summary(count: usize) -> String {
    format!("[Summary unavailable: {} messages compressed]", count)
}

/// Truncate to at most `max_chars` characters, appending an ellipsis when cut
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((byte_index, _)) => format!("{}...", &text[..byte_index]),
        None => text.to_string(),
    }
}
