mod common;

use std::sync::{Arc, Barrier};
use std::thread;

use chrono::Duration;
use medassist::db::Database;
use medassist::models::{
    AppointmentDraft, InsightCategory, MedicationDraft, MedicationStatus, NewUser, ProfileUpdate, TimerStatus,
};

use common::{at, create_user, temp_store};

fn draft(name: &str) -> MedicationDraft {
    MedicationDraft {
        name: name.to_string(),
        dosage: "5mg".to_string(),
        frequency: "Daily".to_string(),
        time_of_day: "8:00 AM".to_string(),
        start_date: at(2024, 1, 1, 0, 0, 0),
        end_date: None,
        notes: None,
    }
}

#[test]
fn test_database_creation_and_initialization() {
    let temp_dir = tempfile::tempdir().expect("Failed to create temp directory");
    let db_path = temp_dir.path().join("nested").join("medassist.db");

    // Parent directories are created on demand
    let db = Database::new(&db_path).expect("Failed to create database");
    let _conn = db.get_connection().expect("Failed to get database connection");
    assert!(db_path.exists());

    // Reopening runs migrations again without error
    let reopened = Database::new(&db_path).expect("Failed to reopen database");
    assert!(reopened.list_user_ids().unwrap().is_empty());
}

#[test]
fn test_user_round_trip() {
    let (_dir, db) = temp_store();
    let user = create_user(&db, "tester");

    let stored = db.get_user(user.id).unwrap().expect("user exists");
    assert_eq!(stored, user);
    assert_eq!(stored.preferred_language, "en-US");
    assert!(!stored.has_medical_profile());
    assert_eq!(db.list_user_ids().unwrap(), vec![user.id]);
    assert!(db.get_user(user.id + 1).unwrap().is_none());
}

#[test]
fn test_duplicate_user_is_a_conflict() {
    let (_dir, db) = temp_store();
    create_user(&db, "tester");

    let err = db
        .create_user(
            &NewUser {
                username: "tester".to_string(),
                email: "someone-else@example.com".to_string(),
            },
            at(2024, 1, 2, 0, 0, 0),
        )
        .unwrap_err();
    assert_eq!(err.to_string(), "Conflict: Username already exists");
}

#[test]
fn test_update_profile_for_unknown_user() {
    let (_dir, db) = temp_store();
    assert!(db.update_profile(77, &ProfileUpdate::default()).unwrap().is_none());
}

#[test]
fn test_medication_with_reminders_is_atomic_unit() {
    let (_dir, db) = temp_store();
    let user = create_user(&db, "tester");
    let times = [at(2024, 1, 2, 8, 0, 0), at(2024, 1, 1, 8, 0, 0)];

    let medication = db.create_medication(user.id, &draft("Levothyroxine"), &times).unwrap();
    assert_eq!(medication.status, MedicationStatus::Pending);

    let reminders = db.reminders_for_medication(medication.id).unwrap();
    assert_eq!(reminders.len(), 2);
    // Ordered by due time, not insertion order
    assert_eq!(reminders[0].scheduled_time, at(2024, 1, 1, 8, 0, 0));
    assert!(reminders.iter().all(|r| !r.is_sent && !r.is_acknowledged));

    assert!(db.get_user_medication(user.id + 1, medication.id).unwrap().is_none());
    assert_eq!(db.get_medication(medication.id).unwrap(), Some(medication));
}

#[test]
fn test_recent_medications_newest_first() {
    let (_dir, db) = temp_store();
    let user = create_user(&db, "tester");
    for name in ["A", "B", "C"] {
        db.create_medication(user.id, &draft(name), &[]).unwrap();
    }

    let names: Vec<_> = db
        .recent_medications(user.id, 2)
        .unwrap()
        .into_iter()
        .map(|m| m.name)
        .collect();
    assert_eq!(names, vec!["C", "B"]);

    let all: Vec<_> = db.list_medications(user.id).unwrap().into_iter().map(|m| m.name).collect();
    assert_eq!(all, vec!["A", "B", "C"]);
}

#[test]
fn test_acknowledge_during_edit_is_not_lost() {
    let (_dir, db) = temp_store();
    let user = create_user(&db, "tester");
    let medication = db
        .create_medication(user.id, &draft("Prednisone"), &[at(2024, 1, 1, 8, 0, 0)])
        .unwrap();
    let reminder = db.reminders_for_medication(medication.id).unwrap().remove(0);
    let barrier = Arc::new(Barrier::new(2));

    let editor = {
        let db = db.clone();
        let barrier = Arc::clone(&barrier);
        thread::spawn(move || {
            db.update_medication(user.id, medication.id, |m| {
                // Let the acknowledgment start while this edit holds the row
                barrier.wait();
                thread::sleep(std::time::Duration::from_millis(150));
                m.name = "Prednisolone".to_string();
                Ok(())
            })
        })
    };

    barrier.wait();
    assert!(db.acknowledge_medication_reminder(user.id, medication.id, reminder.id).unwrap());
    let edited = editor.join().unwrap().unwrap().expect("medication exists");
    assert_eq!(edited.status, MedicationStatus::Pending);

    let stored = db.get_medication(medication.id).unwrap().unwrap();
    assert_eq!(stored.name, "Prednisolone");
    assert_eq!(stored.status, MedicationStatus::Taken);
}

#[test]
fn test_edit_reads_committed_status() {
    let (_dir, db) = temp_store();
    let user = create_user(&db, "tester");
    let medication = db
        .create_medication(user.id, &draft("Losartan"), &[at(2024, 1, 1, 8, 0, 0)])
        .unwrap();
    let reminder = db.reminders_for_medication(medication.id).unwrap().remove(0);

    let stale = db.get_medication(medication.id).unwrap().unwrap();
    db.acknowledge_medication_reminder(user.id, medication.id, reminder.id)
        .unwrap();

    let edited = db
        .update_medication(user.id, stale.id, |m| {
            m.notes = Some("with food".to_string());
            Ok(())
        })
        .unwrap()
        .expect("medication exists");
    assert_eq!(edited.status, MedicationStatus::Taken);
    assert_eq!(db.get_medication(medication.id).unwrap().unwrap(), edited);
}

#[test]
fn test_appointments_and_reminders() {
    let (_dir, db) = temp_store();
    let user = create_user(&db, "tester");
    let when = at(2024, 2, 10, 9, 0, 0);

    let appointment = db
        .create_appointment(
            user.id,
            &AppointmentDraft {
                doctor_name: "Lindqvist".to_string(),
                specialty: Some("Dermatology".to_string()),
                location: "North Clinic".to_string(),
                date_time: when,
                purpose: None,
                notes: None,
            },
            &[when - Duration::days(1), when - Duration::hours(1)],
        )
        .unwrap();

    assert_eq!(db.scheduled_appointments(user.id, 3).unwrap(), vec![appointment.clone()]);
    let reminders = db.reminders_for_appointment(appointment.id).unwrap();
    assert_eq!(reminders.len(), 2);

    assert!(db.mark_appointment_reminder_sent(reminders[0].id).unwrap());
    assert!(!db.mark_appointment_reminder_sent(reminders[0].id).unwrap());
    assert_eq!(db.unsent_appointment_reminders().unwrap().len(), 1);
}

#[test]
fn test_timer_lifecycle() {
    let (_dir, db) = temp_store();
    let user = create_user(&db, "tester");
    let now = at(2024, 3, 1, 10, 0, 0);

    let timer = db.create_timer(user.id, "Stretch", 90, now).unwrap();
    assert_eq!(timer.status, TimerStatus::Ready);
    assert!(db.running_timers().unwrap().is_empty());

    let started = db
        .start_timer(user.id, timer.id, now, now + Duration::seconds(90))
        .unwrap()
        .expect("timer exists");
    assert_eq!(started.status, TimerStatus::Running);
    assert_eq!(db.running_timers().unwrap().len(), 1);

    assert!(db.complete_timer(timer.id).unwrap());
    assert!(!db.complete_timer(timer.id).unwrap());
    assert!(db.start_timer(user.id + 1, timer.id, now, now).unwrap().is_none());
}

#[test]
fn test_has_insight_since() {
    let (_dir, db) = temp_store();
    let user = create_user(&db, "tester");
    db.create_insight(user.id, InsightCategory::Daily, "Sleep well", at(2024, 4, 1, 8, 0, 0))
        .unwrap();

    assert!(db
        .has_insight_since(user.id, InsightCategory::Daily, at(2024, 4, 1, 0, 0, 0))
        .unwrap());
    assert!(!db
        .has_insight_since(user.id, InsightCategory::Daily, at(2024, 4, 2, 0, 0, 0))
        .unwrap());
    assert!(!db
        .has_insight_since(user.id, InsightCategory::Exercise, at(2024, 4, 1, 0, 0, 0))
        .unwrap());
}

#[test]
fn test_deleting_user_cascades() {
    let (_dir, db) = temp_store();
    let user = create_user(&db, "tester");
    let medication = db
        .create_medication(user.id, &draft("Ibuprofen"), &[at(2024, 1, 1, 8, 0, 0)])
        .unwrap();

    let conn = db.get_connection().unwrap();
    conn.execute("DELETE FROM users WHERE id = ?", [user.id]).unwrap();
    drop(conn);

    assert!(db.get_medication(medication.id).unwrap().is_none());
    assert!(db.unsent_medication_reminders().unwrap().is_empty());
}
