//! Comprehensive unit tests for metrics.rs module

use std::time::Duration;

use medassist::metrics::MetricsCollector;
use medassist::models::NotificationKind;

#[test]
fn test_metrics_collector_default_names() {
    let collector = MetricsCollector::default();

    assert_eq!(collector.scan_cycles_total, "medassist_scan_cycles_total");
    assert_eq!(collector.scan_cycle_duration, "medassist_scan_cycle_duration_seconds");
    assert_eq!(collector.notifications_dispatched_total, "medassist_notifications_dispatched_total");
    assert_eq!(collector.live_connections, "medassist_live_connections");
    assert_eq!(collector.insights_generated_total, "medassist_insights_generated_total");
}

#[test]
fn test_metric_names_share_prefix() {
    let collector = MetricsCollector::default();
    let names = [
        collector.scan_cycles_total,
        collector.scan_cycle_duration,
        collector.scan_failures_total,
        collector.notifications_dispatched_total,
        collector.notifications_undelivered_total,
        collector.notifications_duplicated_total,
        collector.live_connections,
        collector.reminders_materialized_total,
        collector.time_tokens_skipped_total,
        collector.insights_generated_total,
        collector.external_failures_total,
    ];

    for name in names {
        assert!(name.starts_with("medassist_"), "unexpected metric name: {}", name);
    }
}

#[test]
fn test_record_scan_metrics() {
    let collector = MetricsCollector::default();
    collector.record_scan_cycle(Duration::from_millis(12));
    collector.record_scan_cycle(Duration::ZERO);
    collector.record_scan_failure("medication_reminders");
}

#[test]
fn test_record_dispatch_for_every_kind() {
    let collector = MetricsCollector::default();
    for kind in [
        NotificationKind::MedicationReminder,
        NotificationKind::AppointmentReminder,
        NotificationKind::TimerCompleted,
        NotificationKind::HealthInsight,
    ] {
        collector.record_dispatch(kind, 0);
        collector.record_dispatch(kind, 3);
        collector.record_duplicate_dispatch(kind);
    }
}

#[test]
fn test_record_connection_and_schedule_metrics() {
    let collector = MetricsCollector::default();
    collector.set_live_connections(0);
    collector.set_live_connections(42);
    collector.record_materialized(60, 0);
    collector.record_materialized(0, 2);
}

#[test]
fn test_record_assistant_metrics() {
    let collector = MetricsCollector::default();
    collector.record_insight();
    collector.record_external_failure("generation");
    collector.record_external_failure("speech");
}

#[test]
fn test_collector_is_copy() {
    let collector = MetricsCollector::default();
    let copy = collector;
    assert_eq!(collector.scan_failures_total, copy.scan_failures_total);
}
