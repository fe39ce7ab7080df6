//! Tests for conversation context and budget

use super::*;
use crate::llm::Message;
use crate::tokens::TokenCounter;

#[test]
fn test_new_context_starts_with_system_prompt() {
    let context = ConversationContext::new("s1", "be brief", 8192);
    assert_eq!(context.messages.len(), 1);
    assert!(context.messages[0].has_flag(SYSTEM_PROMPT_KEY));
    assert_eq!(context.system_message().unwrap().content, "be brief");
    assert_eq!(context.conversation().count(), 0);
}

#[test]
fn test_set_system_prompt_replaces_in_place() {
    let mut context = ConversationContext::new("s1", "old", 8192);
    context.push(Message::user("hi"));
    context.set_system_prompt("new");

    assert_eq!(context.messages.len(), 2);
    assert_eq!(context.messages[0].content, "new");
    assert_eq!(context.system_prompt, "new");
}

#[test]
fn test_replace_messages_restores_missing_system_prompt() {
    let mut context = ConversationContext::new("s1", "prompt", 8192);
    context.replace_messages(vec![Message::user("a"), Message::user("b")]);

    assert_eq!(context.messages.len(), 3);
    assert!(context.messages[0].has_flag(SYSTEM_PROMPT_KEY));
    assert_eq!(context.user_messages().count(), 2);
}

#[test]
fn test_protected_render() {
    let mut protected = ProtectedContent::default();
    assert!(protected.render().is_none());

    protected.task_definition = Some("Port the parser".to_string());
    protected.architecture_decisions.push("Use tokio".to_string());
    let rendered = protected.render().unwrap();
    assert!(rendered.starts_with("## Task\nPort the parser"));
    assert!(rendered.contains("- Use tokio"));
}

#[test]
fn test_budget_subtracts_overhead() {
    let counter = TokenCounter::new();
    let mut context = ConversationContext::new("s1", "x".repeat(400), 1000);
    context.push(Message::user("y".repeat(396)));

    let budget = ContextBudget::compute(&context, &counter, 1000);
    assert_eq!(budget.system_prompt_tokens, 104);
    assert_eq!(budget.checkpoint_tokens, 0);
    assert_eq!(budget.available_budget, 896);
    assert_eq!(budget.conversation_tokens, 103);
    assert!((budget.budget_percentage - 103.0 / 896.0 * 100.0).abs() < 1e-9);
    assert_eq!(budget.remaining(), 793);
}

#[test]
fn test_budget_is_clamped() {
    let counter = TokenCounter::new();
    let mut context = ConversationContext::new("s1", "x".repeat(400), 100);
    context.push(Message::user("y".repeat(4000)));

    let budget = ContextBudget::compute(&context, &counter, 100);
    assert_eq!(budget.available_budget, 0);
    assert_eq!(budget.budget_percentage, 100.0);

    let budget = ContextBudget::compute(&context, &counter, 1500);
    assert!(budget.budget_percentage <= 100.0);
    assert!(budget.budget_percentage >= 0.0);
}

#[test]
fn test_recount_updates_cached_total() {
    let counter = TokenCounter::new();
    let mut context = ConversationContext::new("s1", "abcd", 100);
    context.push(Message::assistant("abcdefgh"));
    assert_eq!(context.recount(&counter), 5 + 6);
    assert_eq!(context.token_count, 11);
}
