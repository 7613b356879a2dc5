use std::fs;
use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, Utc};
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, Connection, OptionalExtension, Params, Row, TransactionBehavior};
use tracing::debug;

use crate::error::{AssistantError, Result};
use crate::models::{
    Appointment, AppointmentDraft, AppointmentReminder, AppointmentStatus, Conversation, HealthInsight, InsightCategory,
    InteractionType, Medication, MedicationDraft, MedicationReminder, MedicationStatus, NewUser, ProfileUpdate,
    ReminderStatus, Timer, TimerStatus, User,
};
use crate::schema::{appointment_reminders, appointments, conversations, health_insights, medication_reminders, medications, timers, users};

// Type alias for the database connection pool
pub type DbPool = Pool<SqliteConnectionManager>;
pub type DbConnection = PooledConnection<SqliteConnectionManager>;

/// Run synchronous store work on tokio's blocking pool.
///
/// Pool checkouts and busy waits would otherwise park a runtime worker.
pub async fn run_blocking<T, F>(work: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work).await?
}

/// Schedule store backed by a pooled SQLite database.
///
/// Cloning is cheap; clones share the pool. Every write is committed before the
/// call returns.
#[derive(Clone)]
pub struct Database {
    pool: DbPool,
}

impl Database {
    /// Open (or create) the store at `path` with default pool settings
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        Self::with_options(path, 10, Duration::from_secs(5))
    }

    /// Open (or create) the store with an explicit pool size and busy timeout.
    ///
    /// The busy timeout also bounds how long a caller waits for a pooled
    /// connection.
    pub fn with_options(path: impl AsRef<Path>, max_connections: u32, busy_timeout: Duration) -> Result<Self> {
        let path = path.as_ref();

        // Create parent directory if it doesn't exist
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let manager = SqliteConnectionManager::file(path).with_init(move |conn| {
            conn.busy_timeout(busy_timeout)?;
            conn.pragma_update(None, "foreign_keys", true)
        });
        let pool = Pool::builder()
            .max_size(max_connections)
            .connection_timeout(busy_timeout)
            .build(manager)?;

        let conn = pool.get()?;
        Self::run_migrations(&conn)?;
        debug!(path = %path.display(), "Schedule store ready");

        Ok(Self { pool })
    }

    /// Run database migrations
    fn run_migrations(conn: &Connection) -> Result<()> {
        conn.execute_batch(include_str!("../migrations/2026-01-10-000000_create_tables/up.sql"))?;
        Ok(())
    }

    /// Get a connection from the pool
    pub fn get_connection(&self) -> Result<DbConnection> {
        Ok(self.pool.get()?)
    }

    fn query_all<T, P: Params>(&self, sql: &str, params: P, map: fn(&Row<'_>) -> rusqlite::Result<T>) -> Result<Vec<T>> {
        let conn = self.get_connection()?;
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt.query_map(params, map)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    fn query_one<T, P: Params>(&self, sql: &str, params: P, map: fn(&Row<'_>) -> rusqlite::Result<T>) -> Result<Option<T>> {
        let conn = self.get_connection()?;
        Ok(conn.query_row(sql, params, map).optional()?)
    }

    fn execute<P: Params>(&self, sql: &str, params: P) -> Result<usize> {
        let conn = self.get_connection()?;
        Ok(conn.execute(sql, params)?)
    }

    // ---------------------------------------------------------------------
    // Users
    // ---------------------------------------------------------------------

    /// Register a user; username and email must both be unused
    pub fn create_user(&self, new_user: &NewUser, now: DateTime<Utc>) -> Result<User> {
        let mut conn = self.get_connection()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let username_taken: bool = tx.query_row(
            &format!("SELECT EXISTS(SELECT 1 FROM {} WHERE {} = ?)", users::TABLE, users::USERNAME),
            params![new_user.username],
            |row| row.get(0),
        )?;
        if username_taken {
            return Err(AssistantError::Conflict("Username already exists".to_string()));
        }

        let email_taken: bool = tx.query_row(
            &format!("SELECT EXISTS(SELECT 1 FROM {} WHERE {} = ?)", users::TABLE, users::EMAIL),
            params![new_user.email],
            |row| row.get(0),
        )?;
        if email_taken {
            return Err(AssistantError::Conflict("Email already exists".to_string()));
        }

        tx.execute(
            &format!(
                "INSERT INTO {} ({}, {}, {}) VALUES (?, ?, ?)",
                users::TABLE,
                users::USERNAME,
                users::EMAIL,
                users::CREATED_AT
            ),
            params![new_user.username, new_user.email, now],
        )?;
        let id = tx.last_insert_rowid();
        let user = tx.query_row(
            &format!("SELECT * FROM {} WHERE {} = ?", users::TABLE, users::ID),
            params![id],
            Self::map_user,
        )?;
        tx.commit()?;

        Ok(user)
    }

    /// Get a user by ID
    pub fn get_user(&self, user_id: i64) -> Result<Option<User>> {
        self.query_one(
            &format!("SELECT * FROM {} WHERE {} = ?", users::TABLE, users::ID),
            params![user_id],
            Self::map_user,
        )
    }

    /// IDs of every registered user
    pub fn list_user_ids(&self) -> Result<Vec<i64>> {
        self.query_all(
            &format!("SELECT {} FROM {} ORDER BY {}", users::ID, users::TABLE, users::ID),
            [],
            |row| row.get(0),
        )
    }

    /// Apply a partial profile update, returning the updated user
    pub fn update_profile(&self, user_id: i64, update: &ProfileUpdate) -> Result<Option<User>> {
        let changed = self.execute(
            &format!(
                "UPDATE {table} SET {h} = COALESCE(?1, {h}), {w} = COALESCE(?2, {w}), {b} = COALESCE(?3, {b}), \
                 {a} = COALESCE(?4, {a}), {m} = COALESCE(?5, {m}), {e} = COALESCE(?6, {e}), {l} = COALESCE(?7, {l}) \
                 WHERE {id} = ?8",
                table = users::TABLE,
                h = users::HEIGHT,
                w = users::WEIGHT,
                b = users::BLOOD_TYPE,
                a = users::ALLERGIES,
                m = users::MEDICAL_CONDITIONS,
                e = users::EMERGENCY_CONTACT,
                l = users::PREFERRED_LANGUAGE,
                id = users::ID
            ),
            params![
                update.height,
                update.weight,
                update.blood_type,
                update.allergies,
                update.medical_conditions,
                update.emergency_contact,
                update.preferred_language,
                user_id
            ],
        )?;

        if changed == 0 {
            return Ok(None);
        }
        self.get_user(user_id)
    }

    fn map_user(row: &Row<'_>) -> rusqlite::Result<User> {
        Ok(User {
            id: row.get(users::ID)?,
            username: row.get(users::USERNAME)?,
            email: row.get(users::EMAIL)?,
            created_at: row.get(users::CREATED_AT)?,
            height: row.get(users::HEIGHT)?,
            weight: row.get(users::WEIGHT)?,
            blood_type: row.get(users::BLOOD_TYPE)?,
            allergies: row.get(users::ALLERGIES)?,
            medical_conditions: row.get(users::MEDICAL_CONDITIONS)?,
            emergency_contact: row.get(users::EMERGENCY_CONTACT)?,
            preferred_language: row.get(users::PREFERRED_LANGUAGE)?,
        })
    }

    // ---------------------------------------------------------------------
    // Medications and their reminders
    // ---------------------------------------------------------------------

    /// Insert a medication together with its reminders in one transaction
    pub fn create_medication(
        &self,
        user_id: i64,
        draft: &MedicationDraft,
        reminder_times: &[DateTime<Utc>],
    ) -> Result<Medication> {
        let mut conn = self.get_connection()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        tx.execute(
            &format!(
                "INSERT INTO {} ({}, {}, {}, {}, {}, {}, {}, {}, {}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
                medications::TABLE,
                medications::USER_ID,
                medications::NAME,
                medications::DOSAGE,
                medications::FREQUENCY,
                medications::TIME_OF_DAY,
                medications::START_DATE,
                medications::END_DATE,
                medications::STATUS,
                medications::NOTES
            ),
            params![
                user_id,
                draft.name,
                draft.dosage,
                draft.frequency,
                draft.time_of_day,
                draft.start_date,
                draft.end_date,
                MedicationStatus::Pending,
                draft.notes
            ],
        )?;
        let medication_id = tx.last_insert_rowid();

        {
            let mut insert = tx.prepare(&format!(
                "INSERT INTO {} ({}, {}, {}, {}, {}) VALUES (?, ?, 0, 0, ?)",
                medication_reminders::TABLE,
                medication_reminders::MEDICATION_ID,
                medication_reminders::SCHEDULED_TIME,
                medication_reminders::IS_SENT,
                medication_reminders::IS_ACKNOWLEDGED,
                medication_reminders::STATUS
            ))?;
            for scheduled_time in reminder_times {
                insert.execute(params![medication_id, scheduled_time, ReminderStatus::Pending])?;
            }
        }

        tx.commit()?;

        Ok(Medication {
            id: medication_id,
            user_id,
            name: draft.name.clone(),
            dosage: draft.dosage.clone(),
            frequency: draft.frequency.clone(),
            time_of_day: draft.time_of_day.clone(),
            start_date: draft.start_date,
            end_date: draft.end_date,
            status: MedicationStatus::Pending,
            notes: draft.notes.clone(),
        })
    }

    /// Get a medication by ID regardless of owner (scanner use)
    pub fn get_medication(&self, medication_id: i64) -> Result<Option<Medication>> {
        self.query_one(
            &format!("SELECT * FROM {} WHERE {} = ?", medications::TABLE, medications::ID),
            params![medication_id],
            Self::map_medication,
        )
    }

    /// Get a medication only if `user_id` owns it
    pub fn get_user_medication(&self, user_id: i64, medication_id: i64) -> Result<Option<Medication>> {
        self.query_one(
            &format!(
                "SELECT * FROM {} WHERE {} = ? AND {} = ?",
                medications::TABLE,
                medications::ID,
                medications::USER_ID
            ),
            params![medication_id, user_id],
            Self::map_medication,
        )
    }

    /// All medications of a user in creation order
    pub fn list_medications(&self, user_id: i64) -> Result<Vec<Medication>> {
        self.query_all(
            &format!(
                "SELECT * FROM {} WHERE {} = ? ORDER BY {} ASC",
                medications::TABLE,
                medications::USER_ID,
                medications::ID
            ),
            params![user_id],
            Self::map_medication,
        )
    }

    /// The `limit` most recently created medications of a user
    pub fn recent_medications(&self, user_id: i64, limit: usize) -> Result<Vec<Medication>> {
        self.query_all(
            &format!(
                "SELECT * FROM {} WHERE {} = ? ORDER BY {} DESC LIMIT ?",
                medications::TABLE,
                medications::USER_ID,
                medications::ID
            ),
            params![user_id, limit as i64],
            Self::map_medication,
        )
    }

    /// Edit a medication in place.
    ///
    /// The row is read and written back inside one IMMEDIATE transaction, so
    /// `edit` always sees the committed state and a concurrent acknowledgment
    /// cannot be overwritten. Returns None when `user_id` does not own it; an
    /// error from `edit` rolls the transaction back.
    pub fn update_medication<F>(&self, user_id: i64, medication_id: i64, edit: F) -> Result<Option<Medication>>
    where
        F: FnOnce(&mut Medication) -> Result<()>,
    {
        let mut conn = self.get_connection()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let current = tx
            .query_row(
                &format!(
                    "SELECT * FROM {} WHERE {} = ? AND {} = ?",
                    medications::TABLE,
                    medications::ID,
                    medications::USER_ID
                ),
                params![medication_id, user_id],
                Self::map_medication,
            )
            .optional()?;
        let Some(mut medication) = current else {
            return Ok(None);
        };

        edit(&mut medication)?;

        tx.execute(
            &format!(
                "UPDATE {} SET {} = ?, {} = ?, {} = ?, {} = ?, {} = ?, {} = ?, {} = ?, {} = ? WHERE {} = ?",
                medications::TABLE,
                medications::NAME,
                medications::DOSAGE,
                medications::FREQUENCY,
                medications::TIME_OF_DAY,
                medications::START_DATE,
                medications::END_DATE,
                medications::STATUS,
                medications::NOTES,
                medications::ID
            ),
            params![
                medication.name,
                medication.dosage,
                medication.frequency,
                medication.time_of_day,
                medication.start_date,
                medication.end_date,
                medication.status,
                medication.notes,
                medication.id
            ],
        )?;
        tx.commit()?;

        Ok(Some(medication))
    }

    /// Delete a medication; its reminders go with it
    pub fn delete_medication(&self, user_id: i64, medication_id: i64) -> Result<bool> {
        let deleted = self.execute(
            &format!(
                "DELETE FROM {} WHERE {} = ? AND {} = ?",
                medications::TABLE,
                medications::ID,
                medications::USER_ID
            ),
            params![medication_id, user_id],
        )?;
        Ok(deleted > 0)
    }

    /// Reminders of one medication ordered by due time
    pub fn reminders_for_medication(&self, medication_id: i64) -> Result<Vec<MedicationReminder>> {
        self.query_all(
            &format!(
                "SELECT * FROM {} WHERE {} = ? ORDER BY {} ASC, {} ASC",
                medication_reminders::TABLE,
                medication_reminders::MEDICATION_ID,
                medication_reminders::SCHEDULED_TIME,
                medication_reminders::ID
            ),
            params![medication_id],
            Self::map_medication_reminder,
        )
    }

    /// Every medication reminder not yet pushed
    pub fn unsent_medication_reminders(&self) -> Result<Vec<MedicationReminder>> {
        self.query_all(
            &format!(
                "SELECT * FROM {} WHERE {} = 0 ORDER BY {} ASC",
                medication_reminders::TABLE,
                medication_reminders::IS_SENT,
                medication_reminders::ID
            ),
            [],
            Self::map_medication_reminder,
        )
    }

    /// Flip `is_sent` to true. Returns false if it was already set.
    pub fn mark_medication_reminder_sent(&self, reminder_id: i64) -> Result<bool> {
        let changed = self.execute(
            &format!(
                "UPDATE {t} SET {sent} = 1, {status} = CASE WHEN {status} = ?1 THEN ?2 ELSE {status} END \
                 WHERE {id} = ?3 AND {sent} = 0",
                t = medication_reminders::TABLE,
                sent = medication_reminders::IS_SENT,
                status = medication_reminders::STATUS,
                id = medication_reminders::ID
            ),
            params![ReminderStatus::Pending, ReminderStatus::Sent, reminder_id],
        )?;
        Ok(changed > 0)
    }

    /// Mark a reminder acknowledged and its medication taken.
    ///
    /// Returns false when the reminder does not belong to the medication or the
    /// medication does not belong to the user.
    pub fn acknowledge_medication_reminder(&self, user_id: i64, medication_id: i64, reminder_id: i64) -> Result<bool> {
        let mut conn = self.get_connection()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let owned = tx
            .query_row(
                &format!(
                    "SELECT r.{rid} FROM {rt} r JOIN {mt} m ON r.{rmid} = m.{mid} \
                     WHERE r.{rid} = ? AND m.{mid} = ? AND m.{uid} = ?",
                    rid = medication_reminders::ID,
                    rt = medication_reminders::TABLE,
                    mt = medications::TABLE,
                    rmid = medication_reminders::MEDICATION_ID,
                    mid = medications::ID,
                    uid = medications::USER_ID
                ),
                params![reminder_id, medication_id, user_id],
                |row| row.get::<_, i64>(0),
            )
            .optional()?;
        if owned.is_none() {
            return Ok(false);
        }

        tx.execute(
            &format!(
                "UPDATE {} SET {} = 1, {} = ? WHERE {} = ?",
                medication_reminders::TABLE,
                medication_reminders::IS_ACKNOWLEDGED,
                medication_reminders::STATUS,
                medication_reminders::ID
            ),
            params![ReminderStatus::Acknowledged, reminder_id],
        )?;
        tx.execute(
            &format!(
                "UPDATE {} SET {} = ? WHERE {} = ?",
                medications::TABLE,
                medications::STATUS,
                medications::ID
            ),
            params![MedicationStatus::Taken, medication_id],
        )?;
        tx.commit()?;

        Ok(true)
    }

    /// Set a reminder's status to Dismissed if `user_id` owns it
    pub fn dismiss_medication_reminder(&self, user_id: i64, reminder_id: i64) -> Result<bool> {
        let changed = self.execute(
            &format!(
                "UPDATE {rt} SET {status} = ? WHERE {rid} = ? AND {rmid} IN (SELECT {mid} FROM {mt} WHERE {uid} = ?)",
                rt = medication_reminders::TABLE,
                status = medication_reminders::STATUS,
                rid = medication_reminders::ID,
                rmid = medication_reminders::MEDICATION_ID,
                mid = medications::ID,
                mt = medications::TABLE,
                uid = medications::USER_ID
            ),
            params![ReminderStatus::Dismissed, reminder_id, user_id],
        )?;
        Ok(changed > 0)
    }

    fn map_medication(row: &Row<'_>) -> rusqlite::Result<Medication> {
        Ok(Medication {
            id: row.get(medications::ID)?,
            user_id: row.get(medications::USER_ID)?,
            name: row.get(medications::NAME)?,
            dosage: row.get(medications::DOSAGE)?,
            frequency: row.get(medications::FREQUENCY)?,
            time_of_day: row.get(medications::TIME_OF_DAY)?,
            start_date: row.get(medications::START_DATE)?,
            end_date: row.get(medications::END_DATE)?,
            status: row.get(medications::STATUS)?,
            notes: row.get(medications::NOTES)?,
        })
    }

    fn map_medication_reminder(row: &Row<'_>) -> rusqlite::Result<MedicationReminder> {
        Ok(MedicationReminder {
            id: row.get(medication_reminders::ID)?,
            medication_id: row.get(medication_reminders::MEDICATION_ID)?,
            scheduled_time: row.get(medication_reminders::SCHEDULED_TIME)?,
            is_sent: row.get(medication_reminders::IS_SENT)?,
            is_acknowledged: row.get(medication_reminders::IS_ACKNOWLEDGED)?,
            status: row.get(medication_reminders::STATUS)?,
        })
    }

    // ---------------------------------------------------------------------
    // Appointments and their reminders
    // ---------------------------------------------------------------------

    /// Insert an appointment together with its reminders in one transaction
    pub fn create_appointment(
        &self,
        user_id: i64,
        draft: &AppointmentDraft,
        reminder_times: &[DateTime<Utc>],
    ) -> Result<Appointment> {
        let mut conn = self.get_connection()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        tx.execute(
            &format!(
                "INSERT INTO {} ({}, {}, {}, {}, {}, {}, {}, {}) VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
                appointments::TABLE,
                appointments::USER_ID,
                appointments::DOCTOR_NAME,
                appointments::SPECIALTY,
                appointments::LOCATION,
                appointments::DATE_TIME,
                appointments::PURPOSE,
                appointments::NOTES,
                appointments::STATUS
            ),
            params![
                user_id,
                draft.doctor_name,
                draft.specialty,
                draft.location,
                draft.date_time,
                draft.purpose,
                draft.notes,
                AppointmentStatus::Scheduled
            ],
        )?;
        let appointment_id = tx.last_insert_rowid();

        {
            let mut insert = tx.prepare(&format!(
                "INSERT INTO {} ({}, {}, {}) VALUES (?, ?, 0)",
                appointment_reminders::TABLE,
                appointment_reminders::APPOINTMENT_ID,
                appointment_reminders::REMINDER_TIME,
                appointment_reminders::IS_SENT
            ))?;
            for reminder_time in reminder_times {
                insert.execute(params![appointment_id, reminder_time])?;
            }
        }

        tx.commit()?;

        Ok(Appointment {
            id: appointment_id,
            user_id,
            doctor_name: draft.doctor_name.clone(),
            specialty: draft.specialty.clone(),
            location: draft.location.clone(),
            date_time: draft.date_time,
            purpose: draft.purpose.clone(),
            notes: draft.notes.clone(),
            status: AppointmentStatus::Scheduled,
        })
    }

    /// Get an appointment by ID regardless of owner (scanner use)
    pub fn get_appointment(&self, appointment_id: i64) -> Result<Option<Appointment>> {
        self.query_one(
            &format!("SELECT * FROM {} WHERE {} = ?", appointments::TABLE, appointments::ID),
            params![appointment_id],
            Self::map_appointment,
        )
    }

    /// All appointments of a user in creation order
    pub fn list_appointments(&self, user_id: i64) -> Result<Vec<Appointment>> {
        self.query_all(
            &format!(
                "SELECT * FROM {} WHERE {} = ? ORDER BY {} ASC",
                appointments::TABLE,
                appointments::USER_ID,
                appointments::ID
            ),
            params![user_id],
            Self::map_appointment,
        )
    }

    /// Up to `limit` Scheduled appointments, soonest first
    pub fn scheduled_appointments(&self, user_id: i64, limit: usize) -> Result<Vec<Appointment>> {
        self.query_all(
            &format!(
                "SELECT * FROM {} WHERE {} = ? AND {} = ? ORDER BY {} ASC LIMIT ?",
                appointments::TABLE,
                appointments::USER_ID,
                appointments::STATUS,
                appointments::DATE_TIME
            ),
            params![user_id, AppointmentStatus::Scheduled, limit as i64],
            Self::map_appointment,
        )
    }

    /// Reminders of one appointment ordered by due time
    pub fn reminders_for_appointment(&self, appointment_id: i64) -> Result<Vec<AppointmentReminder>> {
        self.query_all(
            &format!(
                "SELECT * FROM {} WHERE {} = ? ORDER BY {} ASC",
                appointment_reminders::TABLE,
                appointment_reminders::APPOINTMENT_ID,
                appointment_reminders::REMINDER_TIME
            ),
            params![appointment_id],
            Self::map_appointment_reminder,
        )
    }

    /// Every appointment reminder not yet pushed
    pub fn unsent_appointment_reminders(&self) -> Result<Vec<AppointmentReminder>> {
        self.query_all(
            &format!(
                "SELECT * FROM {} WHERE {} = 0 ORDER BY {} ASC",
                appointment_reminders::TABLE,
                appointment_reminders::IS_SENT,
                appointment_reminders::ID
            ),
            [],
            Self::map_appointment_reminder,
        )
    }

    /// Flip `is_sent` to true. Returns false if it was already set.
    pub fn mark_appointment_reminder_sent(&self, reminder_id: i64) -> Result<bool> {
        let changed = self.execute(
            &format!(
                "UPDATE {} SET {} = 1 WHERE {} = ? AND {} = 0",
                appointment_reminders::TABLE,
                appointment_reminders::IS_SENT,
                appointment_reminders::ID,
                appointment_reminders::IS_SENT
            ),
            params![reminder_id],
        )?;
        Ok(changed > 0)
    }

    fn map_appointment(row: &Row<'_>) -> rusqlite::Result<Appointment> {
        Ok(Appointment {
            id: row.get(appointments::ID)?,
            user_id: row.get(appointments::USER_ID)?,
            doctor_name: row.get(appointments::DOCTOR_NAME)?,
            specialty: row.get(appointments::SPECIALTY)?,
            location: row.get(appointments::LOCATION)?,
            date_time: row.get(appointments::DATE_TIME)?,
            purpose: row.get(appointments::PURPOSE)?,
            notes: row.get(appointments::NOTES)?,
            status: row.get(appointments::STATUS)?,
        })
    }

    fn map_appointment_reminder(row: &Row<'_>) -> rusqlite::Result<AppointmentReminder> {
        Ok(AppointmentReminder {
            id: row.get(appointment_reminders::ID)?,
            appointment_id: row.get(appointment_reminders::APPOINTMENT_ID)?,
            reminder_time: row.get(appointment_reminders::REMINDER_TIME)?,
            is_sent: row.get(appointment_reminders::IS_SENT)?,
        })
    }

    // ---------------------------------------------------------------------
    // Timers
    // ---------------------------------------------------------------------

    /// Create a timer in the Ready state
    pub fn create_timer(&self, user_id: i64, name: &str, duration: i64, now: DateTime<Utc>) -> Result<Timer> {
        let conn = self.get_connection()?;
        conn.execute(
            &format!(
                "INSERT INTO {} ({}, {}, {}, {}, {}) VALUES (?, ?, ?, ?, ?)",
                timers::TABLE,
                timers::USER_ID,
                timers::NAME,
                timers::DURATION,
                timers::STATUS,
                timers::CREATED_AT
            ),
            params![user_id, name, duration, TimerStatus::Ready, now],
        )?;

        Ok(Timer {
            id: conn.last_insert_rowid(),
            user_id,
            name: name.to_string(),
            duration,
            start_time: None,
            end_time: None,
            status: TimerStatus::Ready,
            created_at: now,
        })
    }

    /// Get a timer only if `user_id` owns it
    pub fn get_user_timer(&self, user_id: i64, timer_id: i64) -> Result<Option<Timer>> {
        self.query_one(
            &format!(
                "SELECT * FROM {} WHERE {} = ? AND {} = ?",
                timers::TABLE,
                timers::ID,
                timers::USER_ID
            ),
            params![timer_id, user_id],
            Self::map_timer,
        )
    }

    /// All timers of a user in creation order
    pub fn list_timers(&self, user_id: i64) -> Result<Vec<Timer>> {
        self.query_all(
            &format!(
                "SELECT * FROM {} WHERE {} = ? ORDER BY {} ASC",
                timers::TABLE,
                timers::USER_ID,
                timers::ID
            ),
            params![user_id],
            Self::map_timer,
        )
    }

    /// Move a timer to Running with the given window
    pub fn start_timer(
        &self,
        user_id: i64,
        timer_id: i64,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
    ) -> Result<Option<Timer>> {
        let changed = self.execute(
            &format!(
                "UPDATE {} SET {} = ?, {} = ?, {} = ? WHERE {} = ? AND {} = ?",
                timers::TABLE,
                timers::START_TIME,
                timers::END_TIME,
                timers::STATUS,
                timers::ID,
                timers::USER_ID
            ),
            params![start_time, end_time, TimerStatus::Running, timer_id, user_id],
        )?;

        if changed == 0 {
            return Ok(None);
        }
        self.get_user_timer(user_id, timer_id)
    }

    /// Every timer currently Running
    pub fn running_timers(&self) -> Result<Vec<Timer>> {
        self.query_all(
            &format!(
                "SELECT * FROM {} WHERE {} = ? ORDER BY {} ASC",
                timers::TABLE,
                timers::STATUS,
                timers::ID
            ),
            params![TimerStatus::Running],
            Self::map_timer,
        )
    }

    /// Running -> Completed. Returns false if the timer was no longer Running.
    pub fn complete_timer(&self, timer_id: i64) -> Result<bool> {
        let changed = self.execute(
            &format!(
                "UPDATE {} SET {} = ? WHERE {} = ? AND {} = ?",
                timers::TABLE,
                timers::STATUS,
                timers::ID,
                timers::STATUS
            ),
            params![TimerStatus::Completed, timer_id, TimerStatus::Running],
        )?;
        Ok(changed > 0)
    }

    fn map_timer(row: &Row<'_>) -> rusqlite::Result<Timer> {
        Ok(Timer {
            id: row.get(timers::ID)?,
            user_id: row.get(timers::USER_ID)?,
            name: row.get(timers::NAME)?,
            duration: row.get(timers::DURATION)?,
            start_time: row.get(timers::START_TIME)?,
            end_time: row.get(timers::END_TIME)?,
            status: row.get(timers::STATUS)?,
            created_at: row.get(timers::CREATED_AT)?,
        })
    }

    // ---------------------------------------------------------------------
    // Health insights
    // ---------------------------------------------------------------------

    /// Store a generated insight
    pub fn create_insight(
        &self,
        user_id: i64,
        category: InsightCategory,
        content: &str,
        now: DateTime<Utc>,
    ) -> Result<HealthInsight> {
        let conn = self.get_connection()?;
        conn.execute(
            &format!(
                "INSERT INTO {} ({}, {}, {}, {}, {}) VALUES (?, ?, ?, ?, 0)",
                health_insights::TABLE,
                health_insights::USER_ID,
                health_insights::CATEGORY,
                health_insights::CONTENT,
                health_insights::GENERATED_AT,
                health_insights::IS_READ
            ),
            params![user_id, category, content, now],
        )?;

        Ok(HealthInsight {
            id: conn.last_insert_rowid(),
            user_id,
            category,
            content: content.to_string(),
            generated_at: now,
            is_read: false,
        })
    }

    /// Unread insights of a user, newest first
    pub fn unread_insights(&self, user_id: i64) -> Result<Vec<HealthInsight>> {
        self.query_all(
            &format!(
                "SELECT * FROM {} WHERE {} = ? AND {} = 0 ORDER BY {} DESC, {} DESC",
                health_insights::TABLE,
                health_insights::USER_ID,
                health_insights::IS_READ,
                health_insights::GENERATED_AT,
                health_insights::ID
            ),
            params![user_id],
            Self::map_insight,
        )
    }

    /// Up to `limit` read insights of a user, newest first
    pub fn read_insights(&self, user_id: i64, limit: usize) -> Result<Vec<HealthInsight>> {
        self.query_all(
            &format!(
                "SELECT * FROM {} WHERE {} = ? AND {} = 1 ORDER BY {} DESC, {} DESC LIMIT ?",
                health_insights::TABLE,
                health_insights::USER_ID,
                health_insights::IS_READ,
                health_insights::GENERATED_AT,
                health_insights::ID
            ),
            params![user_id, limit as i64],
            Self::map_insight,
        )
    }

    /// Flip `is_read` if `user_id` owns the insight
    pub fn mark_insight_read(&self, user_id: i64, insight_id: i64) -> Result<bool> {
        let changed = self.execute(
            &format!(
                "UPDATE {} SET {} = 1 WHERE {} = ? AND {} = ?",
                health_insights::TABLE,
                health_insights::IS_READ,
                health_insights::ID,
                health_insights::USER_ID
            ),
            params![insight_id, user_id],
        )?;
        Ok(changed > 0)
    }

    /// Whether the user has an insight of `category` generated at or after `since`
    pub fn has_insight_since(&self, user_id: i64, category: InsightCategory, since: DateTime<Utc>) -> Result<bool> {
        let insights = self.query_all(
            &format!(
                "SELECT * FROM {} WHERE {} = ? AND {} = ?",
                health_insights::TABLE,
                health_insights::USER_ID,
                health_insights::CATEGORY
            ),
            params![user_id, category],
            Self::map_insight,
        )?;
        Ok(insights.iter().any(|insight| insight.generated_at >= since))
    }

    fn map_insight(row: &Row<'_>) -> rusqlite::Result<HealthInsight> {
        Ok(HealthInsight {
            id: row.get(health_insights::ID)?,
            user_id: row.get(health_insights::USER_ID)?,
            category: row.get(health_insights::CATEGORY)?,
            content: row.get(health_insights::CONTENT)?,
            generated_at: row.get(health_insights::GENERATED_AT)?,
            is_read: row.get(health_insights::IS_READ)?,
        })
    }

    // ---------------------------------------------------------------------
    // Conversations
    // ---------------------------------------------------------------------

    /// Store one assistant exchange
    pub fn record_conversation(
        &self,
        user_id: i64,
        message: &str,
        response: &str,
        interaction: InteractionType,
        now: DateTime<Utc>,
    ) -> Result<Conversation> {
        let conn = self.get_connection()?;
        conn.execute(
            &format!(
                "INSERT INTO {} ({}, {}, {}, {}, {}) VALUES (?, ?, ?, ?, ?)",
                conversations::TABLE,
                conversations::USER_ID,
                conversations::MESSAGE,
                conversations::RESPONSE,
                conversations::TIMESTAMP,
                conversations::INTERACTION
            ),
            params![user_id, message, response, now, interaction],
        )?;

        Ok(Conversation {
            id: conn.last_insert_rowid(),
            user_id,
            message: message.to_string(),
            response: response.to_string(),
            timestamp: now,
            interaction,
        })
    }

    /// Up to `limit` exchanges of a user, newest first
    pub fn list_conversations(&self, user_id: i64, limit: usize) -> Result<Vec<Conversation>> {
        self.query_all(
            &format!(
                "SELECT * FROM {} WHERE {} = ? ORDER BY {} DESC, {} DESC LIMIT ?",
                conversations::TABLE,
                conversations::USER_ID,
                conversations::TIMESTAMP,
                conversations::ID
            ),
            params![user_id, limit as i64],
            |row| {
                Ok(Conversation {
                    id: row.get(conversations::ID)?,
                    user_id: row.get(conversations::USER_ID)?,
                    message: row.get(conversations::MESSAGE)?,
                    response: row.get(conversations::RESPONSE)?,
                    timestamp: row.get(conversations::TIMESTAMP)?,
                    interaction: row.get(conversations::INTERACTION)?,
                })
            },
        )
    }
}
