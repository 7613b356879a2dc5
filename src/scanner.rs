//! Due-item scanner.
//!
//! One background loop polls the store every [`POLL_INTERVAL`], pushes every
//! reminder or timer whose time has come, and records that it did so before
//! moving on to the next item. A crash mid-cycle re-sends at most the item in
//! flight.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Timelike, Utc};
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::db::{run_blocking, Database};
use crate::dispatcher::NotificationSink;
use crate::error::{AssistantError, Result};
use crate::external::TextGenerator;
use crate::insights::InsightGenerator;
use crate::logging::OperationTimer;
use crate::metrics::MetricsCollector;
use crate::models::{AppointmentReminder, MedicationReminder, Notification, NotificationKind, Timer};

/// Sleep between two cycles
pub const POLL_INTERVAL: Duration = Duration::from_secs(30);

/// UTC hour and minute at which daily insights are generated
pub const INSIGHT_TIME: (u32, u32) = (8, 0);

/// What one cycle did
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CycleReport {
    pub medication_reminders: usize,
    pub appointment_reminders: usize,
    pub timers_completed: usize,
    pub insights_generated: usize,
    /// Items or steps that failed and will be retried next cycle
    pub failures: usize,
    /// Pushes whose item another scanner had flagged in the meantime
    pub duplicates: usize,
}

impl CycleReport {
    /// Total notifications pushed for reminders and timers
    #[must_use]
    pub const fn dispatched(&self) -> usize {
        self.medication_reminders + self.appointment_reminders + self.timers_completed
    }
}

/// True only during the exact insight minute
#[must_use]
pub fn is_insight_tick(now: DateTime<Utc>) -> bool {
    (now.hour(), now.minute()) == INSIGHT_TIME
}

/// The polling loop and its single-cycle entry point
#[derive(Clone)]
pub struct Scanner {
    store: Database,
    sink: Arc<dyn NotificationSink>,
    insights: InsightGenerator,
    metrics: MetricsCollector,
}

impl Scanner {
    pub fn new(
        store: Database,
        sink: Arc<dyn NotificationSink>,
        generator: Arc<dyn TextGenerator>,
        metrics: MetricsCollector,
    ) -> Self {
        let insights = InsightGenerator::new(store.clone(), generator, Arc::clone(&sink), metrics);
        Self {
            store,
            sink,
            insights,
            metrics,
        }
    }

    /// Poll forever.
    ///
    /// Store failures are retried on the next cycle. Returns only if a cycle's
    /// blocking work panicked.
    pub async fn run(self) -> Result<()> {
        info!(interval_secs = POLL_INTERVAL.as_secs(), "Reminder scanner started");

        loop {
            match self.run_cycle(Utc::now()).await {
                Ok(report) if report.dispatched() > 0 || report.failures > 0 || report.duplicates > 0 => {
                    info!(
                        medication_reminders = report.medication_reminders,
                        appointment_reminders = report.appointment_reminders,
                        timers_completed = report.timers_completed,
                        insights_generated = report.insights_generated,
                        failures = report.failures,
                        duplicates = report.duplicates,
                        "Scan cycle finished"
                    );
                },
                Ok(_) => debug!("Scan cycle found nothing due"),
                Err(e) => {
                    error!(error = %e, "Scan cycle aborted, stopping scanner");
                    return Err(e);
                },
            }

            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    /// Run one scan at `now`.
    ///
    /// Store work runs on the blocking pool. Per-item and per-step failures,
    /// including an exhausted connection pool, are logged, counted and left
    /// for the next cycle.
    pub async fn run_cycle(&self, now: DateTime<Utc>) -> Result<CycleReport> {
        let timer = OperationTimer::new("scan_cycle");

        let scanner = self.clone();
        let mut report = run_blocking(move || Ok(scanner.scan_due_items(now))).await?;

        if is_insight_tick(now) {
            self.generate_insights(now, &mut report).await;
        }

        self.metrics.record_scan_cycle(timer.elapsed());
        Ok(report)
    }

    fn scan_due_items(&self, now: DateTime<Utc>) -> CycleReport {
        let mut report = CycleReport::default();
        self.scan_medication_reminders(now, &mut report);
        self.scan_appointment_reminders(now, &mut report);
        self.scan_timers(now, &mut report);
        report
    }

    /// Log and count a failure. Returns false when the pool is exhausted and
    /// the rest of the step should wait for the next cycle.
    fn absorb(&self, step: &'static str, err: &AssistantError, report: &mut CycleReport) -> bool {
        report.failures += 1;
        self.metrics.record_scan_failure(step);

        if err.is_store_unavailable() {
            error!(step, error = %err, "Schedule store unavailable, retrying next cycle");
            return false;
        }
        warn!(step, error = %err, "Scan step failed, will retry next cycle");
        true
    }

    fn duplicate(&self, kind: NotificationKind, report: &mut CycleReport) {
        report.duplicates += 1;
        self.metrics.record_duplicate_dispatch(kind);
    }

    fn scan_medication_reminders(&self, now: DateTime<Utc>, report: &mut CycleReport) {
        let pending = match self.store.unsent_medication_reminders() {
            Ok(pending) => pending,
            Err(e) => {
                self.absorb("medication_reminders", &e, report);
                return;
            },
        };

        for reminder in pending.iter().filter(|r| r.scheduled_time <= now) {
            match self.send_medication_reminder(reminder) {
                Ok(true) => report.medication_reminders += 1,
                Ok(false) => {
                    warn!(reminder_id = reminder.id, "Medication reminder was flagged concurrently, duplicate pushed");
                    self.duplicate(NotificationKind::MedicationReminder, report);
                },
                Err(e) => {
                    if !self.absorb("medication_reminder", &e, report) {
                        break;
                    }
                },
            }
        }
    }

    fn send_medication_reminder(&self, reminder: &MedicationReminder) -> Result<bool> {
        let medication = self
            .store
            .get_medication(reminder.medication_id)?
            .ok_or_else(|| AssistantError::not_found("Medication", reminder.medication_id))?;

        let notification = Notification::medication_reminder(&medication, reminder);
        self.push(medication.user_id, &notification);
        self.store.mark_medication_reminder_sent(reminder.id)
    }

    fn scan_appointment_reminders(&self, now: DateTime<Utc>, report: &mut CycleReport) {
        let pending = match self.store.unsent_appointment_reminders() {
            Ok(pending) => pending,
            Err(e) => {
                self.absorb("appointment_reminders", &e, report);
                return;
            },
        };

        for reminder in pending.iter().filter(|r| r.reminder_time <= now) {
            match self.send_appointment_reminder(reminder) {
                Ok(true) => report.appointment_reminders += 1,
                Ok(false) => {
                    warn!(reminder_id = reminder.id, "Appointment reminder was flagged concurrently, duplicate pushed");
                    self.duplicate(NotificationKind::AppointmentReminder, report);
                },
                Err(e) => {
                    if !self.absorb("appointment_reminder", &e, report) {
                        break;
                    }
                },
            }
        }
    }

    fn send_appointment_reminder(&self, reminder: &AppointmentReminder) -> Result<bool> {
        let appointment = self
            .store
            .get_appointment(reminder.appointment_id)?
            .ok_or_else(|| AssistantError::not_found("Appointment", reminder.appointment_id))?;

        let notification = Notification::appointment_reminder(&appointment, reminder);
        self.push(appointment.user_id, &notification);
        self.store.mark_appointment_reminder_sent(reminder.id)
    }

    fn scan_timers(&self, now: DateTime<Utc>, report: &mut CycleReport) {
        let running = match self.store.running_timers() {
            Ok(running) => running,
            Err(e) => {
                self.absorb("timers", &e, report);
                return;
            },
        };

        let due = running
            .iter()
            .filter(|t| t.start_time.is_some() && t.end_time.is_some_and(|end| end <= now));

        for timer in due {
            match self.complete_timer(timer) {
                Ok(true) => report.timers_completed += 1,
                Ok(false) => {
                    warn!(timer_id = timer.id, "Timer was completed concurrently, duplicate pushed");
                    self.duplicate(NotificationKind::TimerCompleted, report);
                },
                Err(e) => {
                    if !self.absorb("timer", &e, report) {
                        break;
                    }
                },
            }
        }
    }

    fn complete_timer(&self, timer: &Timer) -> Result<bool> {
        let notification = Notification::timer_completed(timer);
        self.push(timer.user_id, &notification);
        self.store.complete_timer(timer.id)
    }

    async fn generate_insights(&self, now: DateTime<Utc>, report: &mut CycleReport) {
        let store = self.store.clone();
        let user_ids = match run_blocking(move || store.list_user_ids()).await {
            Ok(ids) => ids,
            Err(e) => {
                self.absorb("insight_users", &e, report);
                return;
            },
        };

        for user_id in user_ids {
            match self.insights.generate_for_user(user_id, now).await {
                Ok(Some(_)) => report.insights_generated += 1,
                Ok(None) => {},
                Err(e) => {
                    if !self.absorb("insight", &e, report) {
                        break;
                    }
                },
            }
        }
    }

    fn push(&self, user_id: i64, notification: &Notification) {
        let receivers = self.sink.deliver(user_id, notification);
        self.metrics.record_dispatch(notification.kind(), receivers);
        debug!(user_id, kind = notification.kind().as_str(), receivers, "Notification dispatched");
    }
}
