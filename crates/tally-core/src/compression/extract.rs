//! Key-decision and file-path extraction for checkpoints

use regex::Regex;
use std::sync::LazyLock;

use super::summary::truncate_chars;
use crate::llm::Message;

const MAX_DECISIONS: usize = 10;
const MAX_FILES: usize = 20;
const MAX_DECISION_CHARS: usize = 160;

static DECISION_PATTERN: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(decided|decision|we will|we'll|agreed|chose|choose to|going with|the plan is|switched to|settled on)\b",
    )
    .ok()
});

static FILE_PATTERN: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(
        r"(?:\.{0,2}/)?(?:[A-Za-z0-9_.-]+/)*[A-Za-z0-9_-]+\.(?:rs|toml|ts|tsx|js|jsx|py|go|md|json|ya?ml|c|h|cc|cpp|hpp|java|kt|swift|rb|sh|css|html|sql|lock)\b",
    )
    .ok()
});

/// Lines that record a decision, deduplicated, in order of appearance
pub fn extract_key_decisions(messages: &[Message]) -> Vec<String> {
    let Some(pattern) = DECISION_PATTERN.as_ref() else {
        return Vec::new();
    };

    let mut decisions: Vec<String> = Vec::new();
    for line in messages.iter().flat_map(|m| m.content.lines()) {
        let line = line.trim().trim_start_matches(['-', '*', ' ']);
        if line.is_empty() || !pattern.is_match(line) {
            continue;
        }
        let decision = truncate_chars(line, MAX_DECISION_CHARS);
        if !decisions.contains(&decision) {
            decisions.push(decision);
            if decisions.len() >= MAX_DECISIONS {
                break;
            }
        }
    }
    decisions
}

/// File paths mentioned in messages, deduplicated, in order of appearance
pub fn extract_file_paths(messages: &[Message]) -> Vec<String> {
    let Some(pattern) = FILE_PATTERN.as_ref() else {
        return Vec::new();
    };

    let mut files: Vec<String> = Vec::new();
    for message in messages {
        for found in pattern.find_iter(&message.content) {
            let path = found.as_str().to_string();
            if !files.contains(&path) {
                files.push(path);
                if files.len() >= MAX_FILES {
                    return files;
                }
            }
        }
    }
    files
}
