//! Integration tests for the due-item scanner

mod common;

use std::sync::Arc;

use chrono::Duration;
use medassist::db::Database;
use medassist::dispatcher::NotificationSink;
use medassist::metrics::MetricsCollector;
use medassist::models::{
    NewAppointment, NewMedication, NewTimer, Notification, NotificationKind, NotificationSubject, ReminderStatus,
    TimerStatus,
};
use medassist::scanner::Scanner;
use medassist::service::HealthService;

use common::{at, create_user, temp_store, FixedGenerator, RecordingSink};

fn daily(name: &str, times: &str) -> NewMedication {
    NewMedication {
        name: name.to_string(),
        dosage: "10mg".to_string(),
        frequency: "Daily".to_string(),
        time_of_day: times.to_string(),
        ..NewMedication::default()
    }
}

fn set_medication_status(db: &Database, medication_id: i64, status: &str) {
    db.get_connection()
        .unwrap()
        .execute("UPDATE medications SET status = ?1 WHERE id = ?2", (status, medication_id))
        .unwrap();
}

/// Flags a medication reminder the moment it is pushed, the way a second
/// scanner working the same store would
struct FlaggingSink {
    store: Database,
    recorded: RecordingSink,
}

impl NotificationSink for FlaggingSink {
    fn deliver(&self, user_id: i64, notification: &Notification) -> usize {
        if let NotificationSubject::MedicationReminder { reminder_id, .. } = notification.subject {
            self.store.mark_medication_reminder_sent(reminder_id).unwrap();
        }
        self.recorded.deliver(user_id, notification)
    }
}

#[tokio::test]
async fn test_due_reminders_dispatch_once_and_cycle_is_idempotent() {
    let (_dir, db) = temp_store();
    let user = create_user(&db, "alice");
    let service = HealthService::new(db.clone(), MetricsCollector::default());
    let created_at = at(2024, 3, 1, 6, 0, 0);
    let medication = service
        .create_medication(user.id, &daily("Metformin", "8:00 AM, 8:00 PM"), created_at)
        .unwrap();

    let sink = Arc::new(RecordingSink::default());
    let scanner = Scanner::new(db.clone(), sink.clone(), FixedGenerator::replying("tip"), MetricsCollector::default());

    // Only today's 08:00 reminder is due at 09:00
    let now = at(2024, 3, 1, 9, 0, 0);
    let first = scanner.run_cycle(now).await.unwrap();
    assert_eq!(first.medication_reminders, 1);
    assert_eq!(sink.count(), 1);

    let second = scanner.run_cycle(now).await.unwrap();
    assert_eq!(second.dispatched(), 0);
    assert_eq!(sink.count(), 1);

    let (user_id, notification) = sink.delivered().remove(0);
    assert_eq!(user_id, user.id);
    assert_eq!(notification.kind(), NotificationKind::MedicationReminder);
    assert_eq!(notification.message, "Time to take your Metformin (10mg)");

    let reminders = db.reminders_for_medication(medication.medication.id).unwrap();
    let sent: Vec<_> = reminders.iter().filter(|r| r.is_sent).collect();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].scheduled_time, at(2024, 3, 1, 8, 0, 0));
    assert_eq!(sent[0].status, ReminderStatus::Sent);
}

#[tokio::test]
async fn test_future_reminders_are_left_alone() {
    let (_dir, db) = temp_store();
    let user = create_user(&db, "bruno");
    let service = HealthService::new(db.clone(), MetricsCollector::default());
    service
        .create_medication(user.id, &daily("Aspirin", "8:00 PM"), at(2024, 3, 1, 6, 0, 0))
        .unwrap();

    let sink = Arc::new(RecordingSink::default());
    let scanner = Scanner::new(db.clone(), sink.clone(), FixedGenerator::replying("tip"), MetricsCollector::default());

    let report = scanner.run_cycle(at(2024, 3, 1, 19, 59, 59)).await.unwrap();
    assert_eq!(report.dispatched(), 0);
    assert!(db.unsent_medication_reminders().unwrap().len() == 30);
}

#[tokio::test]
async fn test_acknowledged_reminder_still_gets_sent_flag() {
    let (_dir, db) = temp_store();
    let user = create_user(&db, "chen");
    let service = HealthService::new(db.clone(), MetricsCollector::default());
    let created = service
        .create_medication(user.id, &daily("Insulin", "7:00 AM"), at(2024, 3, 1, 6, 0, 0))
        .unwrap();
    let first = created.reminders[0].clone();

    service
        .acknowledge_reminder(user.id, created.medication.id, first.id)
        .unwrap();

    let sink = Arc::new(RecordingSink::default());
    let scanner = Scanner::new(db.clone(), sink.clone(), FixedGenerator::replying("tip"), MetricsCollector::default());
    scanner.run_cycle(at(2024, 3, 1, 7, 0, 30)).await.unwrap();

    let stored = db.reminders_for_medication(created.medication.id).unwrap();
    let stored = stored.iter().find(|r| r.id == first.id).unwrap();
    assert!(stored.is_sent);
    assert!(stored.is_acknowledged);
    assert_eq!(stored.status, ReminderStatus::Acknowledged);
}

#[tokio::test]
async fn test_appointment_reminders_fire_a_day_and_an_hour_ahead() {
    let (_dir, db) = temp_store();
    let user = create_user(&db, "dana");
    let service = HealthService::new(db.clone(), MetricsCollector::default());
    let created = service
        .create_appointment(
            user.id,
            &NewAppointment {
                doctor_name: "Okafor".to_string(),
                location: "City Clinic".to_string(),
                date_time: "2024-04-10T15:30:00Z".to_string(),
                purpose: Some("annual checkup".to_string()),
                ..NewAppointment::default()
            },
            at(2024, 4, 1, 0, 0, 0),
        )
        .unwrap();

    let appointment_time = at(2024, 4, 10, 15, 30, 0);
    let times: Vec<_> = created.reminders.iter().map(|r| r.reminder_time).collect();
    assert_eq!(
        times,
        vec![appointment_time - Duration::days(1), appointment_time - Duration::hours(1)]
    );
    assert!(created.reminders.iter().all(|r| !r.is_sent));

    let sink = Arc::new(RecordingSink::default());
    let scanner = Scanner::new(db.clone(), sink.clone(), FixedGenerator::replying("tip"), MetricsCollector::default());

    let report = scanner.run_cycle(at(2024, 4, 9, 16, 0, 0)).await.unwrap();
    assert_eq!(report.appointment_reminders, 1);
    assert_eq!(
        sink.delivered()[0].1.message,
        "You have an appointment with Dr. Okafor at 03:30 PM for annual checkup"
    );

    let report = scanner.run_cycle(at(2024, 4, 10, 14, 45, 0)).await.unwrap();
    assert_eq!(report.appointment_reminders, 1);
    assert!(db.unsent_appointment_reminders().unwrap().is_empty());
}

#[tokio::test]
async fn test_timer_completes_only_after_end_time() {
    let (_dir, db) = temp_store();
    let user = create_user(&db, "emil");
    let service = HealthService::new(db.clone(), MetricsCollector::default());
    let start = at(2024, 5, 1, 12, 0, 0);

    let timer = service
        .create_timer(
            user.id,
            &NewTimer {
                name: "Steep tea".to_string(),
                duration: 600,
            },
            start,
        )
        .unwrap();
    assert_eq!(timer.status, TimerStatus::Ready);

    let running = service.start_timer(user.id, timer.id, start).unwrap();
    assert_eq!(running.status, TimerStatus::Running);
    assert_eq!(running.end_time, Some(start + Duration::seconds(600)));

    let sink = Arc::new(RecordingSink::default());
    let scanner = Scanner::new(db.clone(), sink.clone(), FixedGenerator::replying("tip"), MetricsCollector::default());

    let early = scanner.run_cycle(start + Duration::seconds(599)).await.unwrap();
    assert_eq!(early.timers_completed, 0);
    assert_eq!(service.list_timers(user.id).unwrap()[0].status, TimerStatus::Running);

    let late = scanner.run_cycle(start + Duration::seconds(601)).await.unwrap();
    assert_eq!(late.timers_completed, 1);
    assert_eq!(service.list_timers(user.id).unwrap()[0].status, TimerStatus::Completed);
    assert_eq!(sink.delivered()[0].1.message, "Your timer for Steep tea has completed");

    let again = scanner.run_cycle(start + Duration::seconds(700)).await.unwrap();
    assert_eq!(again.timers_completed, 0);
    assert_eq!(sink.count(), 1);
}

#[tokio::test]
async fn test_insights_run_only_in_the_eight_oclock_minute() {
    let (_dir, db) = temp_store();
    let user = create_user(&db, "fatima");
    let generator = FixedGenerator::replying("Take a short walk after lunch.");
    let sink = Arc::new(RecordingSink::default());
    let scanner = Scanner::new(db.clone(), sink.clone(), generator.clone(), MetricsCollector::default());

    let off_tick = scanner.run_cycle(at(2024, 6, 1, 8, 1, 0)).await.unwrap();
    assert_eq!(off_tick.insights_generated, 0);
    assert!(generator.prompts().is_empty());

    let on_tick = scanner.run_cycle(at(2024, 6, 1, 8, 0, 5)).await.unwrap();
    assert_eq!(on_tick.insights_generated, 1);

    // A second poll inside the same minute must not duplicate it
    let same_minute = scanner.run_cycle(at(2024, 6, 1, 8, 0, 35)).await.unwrap();
    assert_eq!(same_minute.insights_generated, 0);

    let insights = db.unread_insights(user.id).unwrap();
    assert_eq!(insights.len(), 1);
    assert_eq!(insights[0].content, "Take a short walk after lunch.");
    assert_eq!(sink.delivered()[0].1.kind(), NotificationKind::HealthInsight);
}

#[tokio::test]
async fn test_insight_failure_leaves_no_row_and_does_not_abort_cycle() {
    let (_dir, db) = temp_store();
    let first = create_user(&db, "gus");
    let second = create_user(&db, "hana");
    let generator = FixedGenerator::failing();
    let sink = Arc::new(RecordingSink::default());
    let scanner = Scanner::new(db.clone(), sink.clone(), generator.clone(), MetricsCollector::default());

    let report = scanner.run_cycle(at(2024, 6, 1, 8, 0, 0)).await.unwrap();
    assert_eq!(report.insights_generated, 0);
    assert_eq!(report.failures, 0);
    // The first user's failure did not stop generation for the second
    assert_eq!(generator.prompts().len(), 2);
    assert!(db.unread_insights(first.id).unwrap().is_empty());
    assert!(db.unread_insights(second.id).unwrap().is_empty());
    assert_eq!(sink.count(), 0);
}

#[tokio::test]
async fn test_insight_prompt_carries_profile_and_schedule() {
    let (_dir, db) = temp_store();
    let user = create_user(&db, "ivan");
    let service = HealthService::new(db.clone(), MetricsCollector::default());
    service
        .create_medication(user.id, &daily("Lisinopril", "9:00 AM"), at(2024, 6, 1, 0, 0, 0))
        .unwrap();
    service
        .create_appointment(
            user.id,
            &NewAppointment {
                doctor_name: "Reyes".to_string(),
                location: "Heart Center".to_string(),
                date_time: "2024-06-20".to_string(),
                ..NewAppointment::default()
            },
            at(2024, 6, 1, 0, 0, 0),
        )
        .unwrap();

    let generator = FixedGenerator::replying("Keep salt low.");
    let scanner = Scanner::new(
        db.clone(),
        Arc::new(RecordingSink::default()),
        generator.clone(),
        MetricsCollector::default(),
    );
    scanner.run_cycle(at(2024, 6, 2, 8, 0, 0)).await.unwrap();

    let prompt = generator.prompts().remove(0);
    assert!(prompt.contains("Recent medications: Lisinopril"));
    assert!(prompt.contains("Dr. Reyes on 2024-06-20"));
    assert!(prompt.contains("- Blood Type: unknown"));
}

#[tokio::test]
async fn test_unreadable_item_does_not_stop_cycle_and_is_retried() {
    let (_dir, db) = temp_store();
    let jonas = create_user(&db, "jonas");
    let kira = create_user(&db, "kira");
    let service = HealthService::new(db.clone(), MetricsCollector::default());
    let created_at = at(2024, 7, 1, 6, 0, 0);
    let broken = service
        .create_medication(jonas.id, &daily("Digoxin", "8:00 AM"), created_at)
        .unwrap();
    let healthy = service
        .create_medication(kira.id, &daily("Folic acid", "8:00 AM"), created_at)
        .unwrap();
    let first_due = |medication_id| db.reminders_for_medication(medication_id).unwrap().remove(0);

    // A status value the store cannot decode makes the medication unreadable
    set_medication_status(&db, broken.medication.id, "Archived?");

    let sink = Arc::new(RecordingSink::default());
    let scanner = Scanner::new(db.clone(), sink.clone(), FixedGenerator::replying("tip"), MetricsCollector::default());
    let now = at(2024, 7, 1, 9, 0, 0);

    let first = scanner.run_cycle(now).await.unwrap();
    assert_eq!(first.medication_reminders, 1);
    assert_eq!(first.failures, 1);
    assert_eq!(sink.delivered()[0].0, kira.id);
    assert!(first_due(healthy.medication.id).is_sent);
    assert!(!first_due(broken.medication.id).is_sent);

    set_medication_status(&db, broken.medication.id, "Pending");

    let second = scanner.run_cycle(now + Duration::seconds(30)).await.unwrap();
    assert_eq!(second.medication_reminders, 1);
    assert_eq!(second.failures, 0);
    assert_eq!(sink.count(), 2);
    assert_eq!(sink.delivered()[1].0, jonas.id);
    assert!(first_due(broken.medication.id).is_sent);
}

#[tokio::test]
async fn test_item_flagged_during_push_is_reported_as_duplicate() {
    let (_dir, db) = temp_store();
    let user = create_user(&db, "lena");
    let service = HealthService::new(db.clone(), MetricsCollector::default());
    let created = service
        .create_medication(user.id, &daily("Levetiracetam", "7:00 AM"), at(2024, 7, 2, 6, 0, 0))
        .unwrap();

    let sink = Arc::new(FlaggingSink {
        store: db.clone(),
        recorded: RecordingSink::default(),
    });
    let scanner = Scanner::new(db.clone(), sink.clone(), FixedGenerator::replying("tip"), MetricsCollector::default());

    let report = scanner.run_cycle(at(2024, 7, 2, 7, 0, 0)).await.unwrap();
    assert_eq!(report.medication_reminders, 0);
    assert_eq!(report.duplicates, 1);
    assert_eq!(report.failures, 0);
    assert_eq!(sink.recorded.count(), 1);
    assert!(db.reminders_for_medication(created.medication.id).unwrap()[0].is_sent);

    let again = scanner.run_cycle(at(2024, 7, 2, 7, 0, 30)).await.unwrap();
    assert_eq!(again.duplicates, 0);
    assert_eq!(sink.recorded.count(), 1);
}

fn single_connection_store(dir: &tempfile::TempDir) -> Database {
    Database::with_options(dir.path().join("single.db"), 1, std::time::Duration::from_millis(250)).unwrap()
}

#[tokio::test]
async fn test_exhausted_pool_is_a_step_failure_retried_next_cycle() {
    let dir = tempfile::tempdir().unwrap();
    let db = single_connection_store(&dir);
    let user = create_user(&db, "mads");
    let service = HealthService::new(db.clone(), MetricsCollector::default());
    service
        .create_medication(user.id, &daily("Omeprazole", "8:00 AM"), at(2024, 7, 3, 6, 0, 0))
        .unwrap();

    let sink = Arc::new(RecordingSink::default());
    let scanner = Scanner::new(db.clone(), sink.clone(), FixedGenerator::replying("tip"), MetricsCollector::default());
    let now = at(2024, 7, 3, 9, 0, 0);

    let held = db.get_connection().unwrap();
    let starved = scanner.run_cycle(now).await.unwrap();
    assert_eq!(starved.dispatched(), 0);
    assert_eq!(starved.failures, 3);
    assert_eq!(sink.count(), 0);
    drop(held);

    let recovered = scanner.run_cycle(now).await.unwrap();
    assert_eq!(recovered.medication_reminders, 1);
    assert_eq!(recovered.failures, 0);
    assert_eq!(sink.count(), 1);
}

#[tokio::test]
async fn test_scanner_keeps_running_while_pool_is_exhausted() {
    let dir = tempfile::tempdir().unwrap();
    let db = single_connection_store(&dir);
    let scanner = Scanner::new(
        db.clone(),
        Arc::new(RecordingSink::default()),
        FixedGenerator::replying("tip"),
        MetricsCollector::default(),
    );

    let held = db.get_connection().unwrap();
    let task = tokio::spawn(scanner.run());
    tokio::time::sleep(std::time::Duration::from_millis(1200)).await;
    assert!(!task.is_finished());

    task.abort();
    drop(held);
}
