//! Tests for per-session serialization

use super::*;
use futures::FutureExt;
use std::time::Duration;

#[tokio::test]
async fn test_operations_apply_in_arrival_order() {
    let registry = Arc::new(SessionRegistry::<Vec<u32>>::new());
    let id = SessionId::new("s1");
    registry.insert(id.clone(), Vec::new());

    let mut handles = Vec::new();
    for i in 0..5u32 {
        let registry = registry.clone();
        let id = id.clone();
        handles.push(tokio::spawn(async move {
            registry
                .execute(&id, move |log| {
                    async move {
                        // Earlier operations sleep longer; order must still hold
                        tokio::time::sleep(Duration::from_millis(u64::from(10 - i * 2))).await;
                        log.push(i);
                    }
                    .boxed()
                })
                .await
        }));
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let state = registry.get(&id).unwrap();
    assert_eq!(*state.lock().await, vec![0, 1, 2, 3, 4]);
}

#[tokio::test]
async fn test_sessions_do_not_block_each_other() {
    let registry = Arc::new(SessionRegistry::<u32>::new());
    registry.insert("a", 0);
    registry.insert("b", 0);

    let held = registry.get(&SessionId::from("a")).unwrap();
    let _lock = held.lock().await;

    let result = tokio::time::timeout(
        Duration::from_millis(200),
        registry.execute(&SessionId::from("b"), |n| {
            async move {
                *n += 1;
                *n
            }
            .boxed()
        }),
    )
    .await;
    assert_eq!(result.unwrap().unwrap(), 1);
}

#[tokio::test]
async fn test_unknown_session_is_not_found() {
    let registry = SessionRegistry::<u32>::new();
    let result = registry
        .execute(&SessionId::from("missing"), |n| async move { *n }.boxed())
        .await;
    assert!(matches!(result, Err(TallyError::NotFound { .. })));
}

#[tokio::test]
async fn test_remove_cancels_queued_operations() {
    let registry = Arc::new(SessionRegistry::<u32>::new());
    let id = SessionId::from("s1");
    registry.insert(id.clone(), 0);

    let state = registry.get(&id).unwrap();
    let lock = state.lock().await;

    let queued = {
        let registry = registry.clone();
        let id = id.clone();
        tokio::spawn(async move { registry.execute(&id, |n| async move { *n }.boxed()).await })
    };
    tokio::time::sleep(Duration::from_millis(10)).await;
    registry.remove(&id);
    drop(lock);

    assert!(matches!(queued.await.unwrap(), Err(TallyError::Cancelled)));
    assert!(registry.is_empty());
}

#[test]
fn test_insert_replaces_and_cancels_previous() {
    let registry = SessionRegistry::<u32>::new();
    let first = registry.insert("s1", 1);
    let second = registry.insert("s1", 2);

    assert!(first.is_cancelled());
    assert!(!second.is_cancelled());
    assert_eq!(registry.len(), 1);

    registry.cancel_all();
    assert!(second.is_cancelled());
}
