//! End-to-end budget scenarios
//!
//! Drives complete sessions through the public API: filling a window,
//! emergency compression, rollover into an on-disk snapshot and checkpoint merging.

use std::sync::Arc;

use tally::checkpoints::{AgingConfig, CheckpointLevel};
use tally::context::{ROLLOVER_MARKER_KEY, SYSTEM_PROMPT_KEY};
use tally::snapshots::SnapshotConfig;
use tally::{
    CheckpointManager, CompressionConfig, CompressionService, CompressionStrategy, ContextManager,
    EmergencyAction, FileSnapshotStorage, Message, ModelProfile, SnapshotReason, TallyConfig,
    TokenCounter,
};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("tally_core=debug")
        .with_test_writer()
        .try_init();
}

fn config(size: usize) -> TallyConfig {
    TallyConfig::default()
        .with_session_id("scenario")
        .with_system_prompt("You are a coding assistant.")
        .with_pool(tally::ContextPoolConfig::default().with_target_size(size))
        .with_snapshots(SnapshotConfig::default().with_turn_interval(0))
}

fn manager(config: TallyConfig) -> anyhow::Result<ContextManager> {
    let manager = ContextManager::builder(config)
        .with_profile(ModelProfile::default().with_discount_factor(1.0))
        .build()?;
    Ok(manager)
}

/// Add user/assistant pairs until the prompt reaches `target` tokens
async fn fill(manager: &mut ContextManager, target: usize) -> anyhow::Result<Vec<String>> {
    let mut user_ids = Vec::new();
    let mut n = 0;
    while manager.prompt_tokens() < target {
        let question = Message::user(format!("question {:03}", n));
        user_ids.push(question.id.clone());
        manager.add_message(question).await?;
        manager.add_message(Message::assistant("a".repeat(396))).await?;
        n += 1;
    }
    Ok(user_ids)
}

#[tokio::test]
async fn user_only_history_is_left_alone() {
    init_tracing();
    let messages: Vec<Message> = (0..50)
        .map(|i| Message::user(format!("please look at item {}", i)))
        .collect();
    let service = CompressionService::new(
        CompressionConfig::default().with_preserve_recent_tokens(2000),
        Arc::new(TokenCounter::new()),
    );

    let result = service.compress(&messages, CompressionStrategy::Truncate).await;

    assert_eq!(result.preserved.len(), 50);
    assert_eq!(result.compressed_tokens, result.original_tokens);
    assert!(result.is_inflated());
}

#[tokio::test]
async fn emergency_compression_before_send() -> anyhow::Result<()> {
    init_tracing();
    let mut manager = manager(config(8192))?;
    manager.start().await?;
    let user_ids = fill(&mut manager, 7800).await?;
    let candidate = Message::user("c".repeat(184));

    let result = manager.validate_and_build_prompt(Some(&candidate)).await;

    assert_eq!(result.emergency_action, EmergencyAction::Compression);
    assert!(result.valid, "still over the limit: {:?}", result.warning);
    assert!(result.percentage < 95.0);
    let kept: Vec<String> = manager.context().user_messages().map(|m| m.id.clone()).collect();
    assert_eq!(kept, user_ids);
    assert!(result.messages[0].has_flag(SYSTEM_PROMPT_KEY));
    assert_eq!(result.messages.last().map(|m| m.id.as_str()), Some(candidate.id.as_str()));

    manager.shutdown();
    Ok(())
}

#[tokio::test]
async fn rollover_archives_to_disk() -> anyhow::Result<()> {
    init_tracing();
    let dir = tempfile::tempdir()?;
    let mut manager = ContextManager::builder(config(8192))
        .with_profile(ModelProfile::default().with_discount_factor(1.0))
        .with_storage(Arc::new(FileSnapshotStorage::new(dir.path())))
        .build()?;
    let user_ids = fill(&mut manager, 4000).await?;
    manager.compress_now().await?;
    let mut all_users = user_ids;
    all_users.extend(fill(&mut manager, 7800).await?);
    let archived = manager.context().messages.len();

    let result = manager
        .validate_and_build_prompt(Some(&Message::user("y".repeat(3984))))
        .await;

    assert_eq!(result.emergency_action, EmergencyAction::Rollover);
    assert!(result.valid);
    let context = manager.context();
    assert!(context.checkpoints.is_empty());
    assert!(context.messages[0].has_flag(SYSTEM_PROMPT_KEY));
    assert!(context.messages[1].has_flag(ROLLOVER_MARKER_KEY));
    let kept: Vec<String> = context.messages[2..].iter().map(|m| m.id.clone()).collect();
    assert!(kept.len() <= 10);
    assert_eq!(kept, all_users[all_users.len() - kept.len()..].to_vec());

    let snapshot_id = result.snapshot_id.expect("rollover snapshot");
    assert!(dir.path().join("scenario").join(format!("{}.json", snapshot_id)).exists());
    let snapshot = manager.snapshots().load_snapshot(&snapshot_id).await?;
    assert_eq!(snapshot.messages.len(), archived);
    assert_eq!(snapshot.metadata.reason, SnapshotReason::Rollover);
    Ok(())
}

#[test]
fn checkpoints_merge_to_tier_cap() {
    let mut manager = CheckpointManager::new(AgingConfig::default(), Arc::new(TokenCounter::new()));
    let mut checkpoints = Vec::new();

    for n in 1..=12usize {
        let summary = Message::system(format!("## Checkpoint {}\n- reviewed module {}", n, n));
        let removed = vec![Message::assistant(format!("Refactored module {}.", n))];
        manager.record(&mut checkpoints, summary, &removed, n * 250, 5);
    }

    assert!(checkpoints.len() <= 5);
    let merged = &checkpoints[0];
    assert_eq!(merged.compression_count, 8);
    assert_eq!(merged.original_tokens, (1..=8).map(|n| n * 250).sum::<usize>());
    assert_eq!(merged.level, CheckpointLevel::Compact);
}

#[tokio::test]
async fn snapshot_restores_into_a_new_session() -> anyhow::Result<()> {
    init_tracing();
    let dir = tempfile::tempdir()?;
    let snapshots = SnapshotConfig::default()
        .with_turn_interval(0)
        .with_storage_dir(dir.path());

    let mut first = manager(config(8192).with_snapshots(snapshots.clone()))?;
    fill(&mut first, 2000).await?;
    first.protect_task_definition("Migrate the build to the new toolchain");
    let snapshot = first.create_snapshot(SnapshotReason::Manual).await?;
    let expected = first.context().messages.clone();

    let mut second = manager(
        config(8192)
            .with_session_id("resumed")
            .with_snapshots(snapshots),
    )?;
    // listings are per session, lookups by id are not
    assert!(second.list_snapshots().await?.is_empty());
    let listed = first.list_snapshots().await?;
    assert!(listed.iter().any(|s| s.id == snapshot.id));

    second.restore_snapshot(&snapshot.id).await?;

    assert_eq!(second.session_id(), "resumed");
    assert_eq!(second.context().conversation().count(), expected.len() - 1);
    assert!(second.build_prompt(None)[0].content.contains("Migrate the build"));
    Ok(())
}
