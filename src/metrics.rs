use metrics::{counter, gauge, histogram};
use std::time::Duration;

use crate::models::NotificationKind;

/// Metrics collection and management
#[derive(Debug, Clone, Copy)]
pub struct MetricsCollector {
    // Scanner metrics
    pub scan_cycles_total: &'static str,
    pub scan_cycle_duration: &'static str,
    pub scan_failures_total: &'static str,

    // Delivery metrics
    pub notifications_dispatched_total: &'static str,
    pub notifications_undelivered_total: &'static str,
    pub notifications_duplicated_total: &'static str,
    pub live_connections: &'static str,

    // Schedule metrics
    pub reminders_materialized_total: &'static str,
    pub time_tokens_skipped_total: &'static str,

    // Assistant metrics
    pub insights_generated_total: &'static str,
    pub external_failures_total: &'static str,
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self {
            scan_cycles_total: "medassist_scan_cycles_total",
            scan_cycle_duration: "medassist_scan_cycle_duration_seconds",
            scan_failures_total: "medassist_scan_failures_total",

            notifications_dispatched_total: "medassist_notifications_dispatched_total",
            notifications_undelivered_total: "medassist_notifications_undelivered_total",
            notifications_duplicated_total: "medassist_notifications_duplicated_total",
            live_connections: "medassist_live_connections",

            reminders_materialized_total: "medassist_reminders_materialized_total",
            time_tokens_skipped_total: "medassist_time_tokens_skipped_total",

            insights_generated_total: "medassist_insights_generated_total",
            external_failures_total: "medassist_external_failures_total",
        }
    }
}

impl MetricsCollector {
    /// Record a completed scan cycle
    pub fn record_scan_cycle(&self, duration: Duration) {
        counter!(self.scan_cycles_total).increment(1);
        histogram!(self.scan_cycle_duration).record(duration.as_secs_f64());
    }

    /// Record a per-item or per-step failure inside the scanner
    pub fn record_scan_failure(&self, step: &'static str) {
        counter!(self.scan_failures_total, "step" => step).increment(1);
    }

    /// Record a dispatched notification and how many live connections received it
    pub fn record_dispatch(&self, kind: NotificationKind, receivers: usize) {
        counter!(self.notifications_dispatched_total, "kind" => kind.as_str()).increment(1);
        if receivers == 0 {
            counter!(self.notifications_undelivered_total, "kind" => kind.as_str()).increment(1);
        }
    }

    /// Record a push for an item another scanner flagged first
    pub fn record_duplicate_dispatch(&self, kind: NotificationKind) {
        counter!(self.notifications_duplicated_total, "kind" => kind.as_str()).increment(1);
    }

    /// Update the number of open push connections
    pub fn set_live_connections(&self, count: usize) {
        gauge!(self.live_connections).set(count as f64);
    }

    /// Record reminders created for a new medication
    pub fn record_materialized(&self, created: usize, skipped_tokens: usize) {
        counter!(self.reminders_materialized_total).increment(created as u64);
        if skipped_tokens > 0 {
            counter!(self.time_tokens_skipped_total).increment(skipped_tokens as u64);
        }
    }

    /// Record a stored health insight
    pub fn record_insight(&self) {
        counter!(self.insights_generated_total).increment(1);
    }

    /// Record a failed call to an external collaborator
    pub fn record_external_failure(&self, service: &'static str) {
        counter!(self.external_failures_total, "service" => service).increment(1);
    }
}
