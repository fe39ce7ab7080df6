//! Tests for the VRAM monitor

use super::*;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

const GIB: u64 = 1024 * 1024 * 1024;

fn counting_monitor(provider: Arc<FixedVramProvider>) -> (VramMonitor, Arc<AtomicUsize>) {
    let monitor = VramMonitor::new(provider, &VramConfig::default());
    let fired = Arc::new(AtomicUsize::new(0));
    let counter = fired.clone();
    monitor.on_low_memory(Arc::new(move |_info| {
        counter.fetch_add(1, Ordering::SeqCst);
    }));
    (monitor, fired)
}

#[test]
fn test_vram_info_available() {
    let info = VramInfo::new(8 * GIB, 6 * GIB, true);
    assert_eq!(info.available, 2 * GIB);
    assert!((info.available_fraction() - 0.25).abs() < 1e-9);
    assert!(VramInfo::cpu_only().is_cpu_only());
    assert_eq!(VramInfo::cpu_only().available_fraction(), 1.0);
}

#[tokio::test]
async fn test_low_memory_fires_once_per_crossing() {
    let provider = Arc::new(FixedVramProvider::new(VramInfo::new(8 * GIB, 4 * GIB, true)));
    let (monitor, fired) = counting_monitor(provider.clone());

    monitor.get_info().await.unwrap();
    assert_eq!(fired.load(Ordering::SeqCst), 0);

    provider.set(VramInfo::new(8 * GIB, 8 * GIB - GIB / 2, true));
    monitor.get_info().await.unwrap();
    monitor.get_info().await.unwrap();
    assert_eq!(fired.load(Ordering::SeqCst), 1);
    assert!(monitor.is_low());

    provider.set(VramInfo::new(8 * GIB, 2 * GIB, true));
    monitor.get_info().await.unwrap();
    assert!(!monitor.is_low());

    provider.set(VramInfo::new(8 * GIB, 8 * GIB, true));
    monitor.get_info().await.unwrap();
    assert_eq!(fired.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_cpu_only_never_low() {
    let provider = Arc::new(FixedVramProvider::cpu_only());
    let (monitor, fired) = counting_monitor(provider);
    monitor.get_info().await.unwrap();
    assert_eq!(fired.load(Ordering::SeqCst), 0);
    assert_eq!(monitor.latest(), Some(VramInfo::cpu_only()));
}

#[tokio::test]
async fn test_background_monitoring_polls() {
    let provider = Arc::new(FixedVramProvider::new(VramInfo::new(8 * GIB, 8 * GIB, true)));
    let (monitor, fired) = counting_monitor(provider);

    monitor.start_monitoring(Duration::from_millis(10));
    assert!(monitor.is_monitoring());
    tokio::time::sleep(Duration::from_millis(60)).await;
    monitor.stop_monitoring();

    assert!(!monitor.is_monitoring());
    assert_eq!(fired.load(Ordering::SeqCst), 1);
    assert!(monitor.latest().is_some());
}

#[tokio::test]
async fn test_readings_forwarded_while_monitoring() {
    let provider = Arc::new(FixedVramProvider::new(VramInfo::new(8 * GIB, GIB, true)));
    let monitor = VramMonitor::new(provider.clone(), &VramConfig::default());
    let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
    let sink = seen.clone();
    monitor.on_reading(Arc::new(move |info: VramInfo| sink.lock().push(info.used)));

    monitor.start_monitoring(Duration::from_millis(10));
    tokio::time::sleep(Duration::from_millis(40)).await;
    provider.set(VramInfo::new(8 * GIB, 3 * GIB, true));
    tokio::time::sleep(Duration::from_millis(60)).await;
    monitor.stop_monitoring();

    let seen = seen.lock();
    assert_eq!(seen.first(), Some(&GIB));
    assert_eq!(seen.last(), Some(&(3 * GIB)));
    assert!(seen.len() >= 3);
}
