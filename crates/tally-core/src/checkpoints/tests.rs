//! Tests for checkpoint aging and merging

use super::*;
use crate::compression::SUMMARY_HEADER;
use crate::llm::Message;
use crate::tokens::TokenCounter;
use std::collections::HashMap;
use std::sync::Arc;

fn manager() -> CheckpointManager {
    CheckpointManager::new(AgingConfig::default(), Arc::new(TokenCounter::new()))
}

fn summary(n: usize) -> Message {
    let lines: Vec<String> = (0..12)
        .map(|i| format!("- checkpoint {} detail line {} {}", n, i, "x".repeat(40)))
        .collect();
    Message::system(format!("{}\n{}", SUMMARY_HEADER, lines.join("\n")))
}

fn removed(n: usize) -> Vec<Message> {
    vec![
        Message::assistant(format!("We decided to split module {}.", n)),
        Message::tool(format!("wrote src/module_{}.rs", n)),
    ]
}

#[test]
fn test_record_creates_detailed_checkpoint() {
    let mut manager = manager();
    let mut checkpoints = Vec::new();

    let id = manager.record(&mut checkpoints, summary(1), &removed(1), 500, 5);

    assert_eq!(checkpoints.len(), 1);
    let checkpoint = &checkpoints[0];
    assert_eq!(checkpoint.id, id);
    assert_eq!(checkpoint.level, CheckpointLevel::Detailed);
    assert_eq!(checkpoint.compression_number, 1);
    assert_eq!(checkpoint.original_tokens, 500);
    assert_eq!(checkpoint.range.message_count, 2);
    assert_eq!(checkpoint.key_decisions, vec!["We decided to split module 1.".to_string()]);
    assert_eq!(checkpoint.files_modified, vec!["src/module_1.rs".to_string()]);
    assert!(checkpoint.current_tokens > 0);
}

#[test]
fn test_aging_demotes_by_compression_age() {
    let mut manager = manager();
    let mut checkpoints = Vec::new();

    for n in 1..=4 {
        manager.record(&mut checkpoints, summary(n), &removed(n), 500, 20);
    }
    assert_eq!(checkpoints[0].level, CheckpointLevel::Moderate);
    assert_eq!(checkpoints[1].level, CheckpointLevel::Detailed);

    for n in 5..=7 {
        manager.record(&mut checkpoints, summary(n), &removed(n), 500, 20);
    }
    assert_eq!(checkpoints[0].level, CheckpointLevel::Compact);
    assert_eq!(checkpoints[1].level, CheckpointLevel::Moderate);
    assert_eq!(checkpoints[6].level, CheckpointLevel::Detailed);
}

#[test]
fn test_demotion_remeasures_tokens() {
    let mut manager = manager();
    let mut checkpoints = Vec::new();
    for n in 1..=7 {
        manager.record(&mut checkpoints, summary(n), &removed(n), 500, 20);
    }

    let detailed = checkpoints[6].current_tokens;
    let moderate = checkpoints[1].current_tokens;
    let compact = checkpoints[0].current_tokens;
    assert!(moderate < detailed);
    assert!(compact < moderate);

    let moderate_text = &checkpoints[1].summary.content;
    assert!(moderate_text.contains("Key decisions:"));
    assert!(moderate_text.contains("detail line 4"));
    assert!(!moderate_text.contains("detail line 5"));

    let compact_body = checkpoints[0].summary.content.trim_start_matches(SUMMARY_HEADER).trim();
    assert_eq!(compact_body.lines().count(), 1);
    assert!(compact_body.chars().count() <= AgingConfig::default().compact_max_chars + 3);
}

#[test]
fn test_levels_never_gain_detail() {
    let mut manager = manager();
    let mut checkpoints = Vec::new();
    let mut seen: HashMap<String, CheckpointLevel> = HashMap::new();

    for n in 1..=20 {
        manager.record(&mut checkpoints, summary(n), &removed(n), 100, 50);
        for checkpoint in &checkpoints {
            if let Some(previous) = seen.get(&checkpoint.id) {
                assert!(checkpoint.level <= *previous);
            }
            seen.insert(checkpoint.id.clone(), checkpoint.level);
        }
    }
}

#[test]
fn test_twelve_checkpoints_merge_down_to_cap() {
    let mut manager = manager();
    let mut checkpoints = Vec::new();

    for n in 1..=12 {
        manager.record(&mut checkpoints, summary(n), &removed(n), n * 100, 5);
    }

    assert_eq!(checkpoints.len(), 5);
    let merged = &checkpoints[0];
    assert_eq!(merged.compression_count, 8);
    assert_eq!(merged.original_tokens, (1..=8).map(|n| n * 100).sum::<usize>());
    assert_eq!(merged.compression_number, 1);
    assert_eq!(merged.level, CheckpointLevel::Compact);
    assert_eq!(merged.key_decisions.len(), 8);
    assert_eq!(merged.files_modified.len(), 8);
    assert_eq!(merged.range.message_count, 16);

    let numbers: Vec<u64> = checkpoints[1..].iter().map(|c| c.compression_number).collect();
    assert_eq!(numbers, vec![9, 10, 11, 12]);
    assert_eq!(checkpoints.iter().map(|c| c.compression_count).sum::<u32>(), 12);
}

#[test]
fn test_repeated_merges_stay_bounded() {
    let mut manager = manager();
    let mut checkpoints = Vec::new();
    let mut merged_tokens = Vec::new();

    for n in 1..=300 {
        manager.record(&mut checkpoints, summary(n), &removed(n), 100, 5);
        if n % 100 == 0 {
            merged_tokens.push(checkpoints[0].current_tokens);
        }
    }

    let merged = &checkpoints[0];
    assert_eq!(checkpoints.len(), 5);
    assert_eq!(merged.level, CheckpointLevel::Compact);
    assert_eq!(merged.compression_count, 296);
    assert_eq!(merged.original_tokens, 296 * 100);

    let body: Vec<&str> = merged
        .summary
        .content
        .trim_start_matches(SUMMARY_HEADER)
        .trim()
        .lines()
        .collect();
    assert_eq!(body.len(), 1 + AgingConfig::default().merged_digest_entries);
    assert_eq!(body[0], "Merged 296 compressions (29600 tokens); 292 earlier not listed");
    assert!(body[body.len() - 1].contains("checkpoint 296 detail"));

    assert!(merged_tokens.iter().all(|t| *t < 400));
    assert!(merged_tokens[2] <= merged_tokens[0] + 4);
    assert_eq!(merged.current_tokens, manager.checkpoint_tokens(&checkpoints[..1]));
}

#[test]
fn test_merge_keeps_least_detailed_level_and_unions() {
    let manager = manager();
    let mut checkpoints = Vec::new();
    let mut recorder = CheckpointManager::new(AgingConfig::default(), Arc::new(TokenCounter::new()));
    recorder.record(&mut checkpoints, summary(1), &removed(1), 100, 10);
    recorder.record(&mut checkpoints, summary(2), &removed(1), 200, 10);
    recorder.record(&mut checkpoints, summary(3), &removed(3), 300, 10);
    checkpoints[1].level = CheckpointLevel::Moderate;

    manager.enforce_limit(&mut checkpoints, 2);

    assert_eq!(checkpoints.len(), 2);
    assert_eq!(checkpoints[0].level, CheckpointLevel::Moderate);
    assert_eq!(checkpoints[0].original_tokens, 300);
    assert_eq!(checkpoints[0].key_decisions.len(), 1);
    assert!(checkpoints[0].summary.content.contains("checkpoint 1 detail"));
    assert!(checkpoints[0].summary.content.contains("checkpoint 2 detail"));
    assert_eq!(checkpoints[1].original_tokens, 300);
}

#[test]
fn test_checkpoint_tokens_sum_summaries() {
    let mut manager = manager();
    let mut checkpoints = Vec::new();
    manager.record(&mut checkpoints, summary(1), &removed(1), 100, 5);
    manager.record(&mut checkpoints, summary(2), &removed(2), 100, 5);

    let total: usize = checkpoints.iter().map(|c| c.current_tokens).sum();
    assert_eq!(manager.checkpoint_tokens(&checkpoints), total);
}
