use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info};

use crate::db::Database;
use crate::error::{AssistantError, Result};
use crate::materializer::materialize_daily;
use crate::metrics::MetricsCollector;
use crate::models::{
    AppointmentDraft, AppointmentWithReminders, Conversation, HealthInsight, Medication, MedicationDraft,
    MedicationUpdate, MedicationWithReminders, NewAppointment, NewMedication, NewTimer, NewUser, ProfileUpdate,
    Timer, User,
};
use crate::time_parser::resolve_timestamp;
use crate::validation::InputValidator;

/// Insights returned by [`HealthService::list_insights`]
pub const INSIGHT_LIST_LIMIT: usize = 10;
/// Exchanges returned by [`HealthService::list_conversations`]
pub const CONVERSATION_LIST_LIMIT: usize = 50;

fn optional_text(value: Option<&String>) -> Option<String> {
    value
        .map(|text| InputValidator::sanitize_text(text))
        .filter(|text| !text.is_empty())
}

/// User-facing operations over the schedule store.
///
/// Every operation is scoped to the calling user; records owned by someone
/// else are reported as not found.
#[derive(Clone)]
pub struct HealthService {
    store: Database,
    metrics: MetricsCollector,
}

impl HealthService {
    pub const fn new(store: Database, metrics: MetricsCollector) -> Self {
        Self { store, metrics }
    }

    fn require_user(&self, user_id: i64) -> Result<User> {
        self.store
            .get_user(user_id)?
            .ok_or_else(|| AssistantError::not_found("User", user_id))
    }

    // Users

    pub fn register_user(&self, new_user: &NewUser, now: DateTime<Utc>) -> Result<User> {
        let new_user = NewUser {
            username: new_user.username.trim().to_string(),
            email: new_user.email.trim().to_lowercase(),
        };
        InputValidator::validate_new_user(&new_user)?;

        let user = self.store.create_user(&new_user, now)?;
        info!(user_id = user.id, "User registered");
        Ok(user)
    }

    pub fn get_profile(&self, user_id: i64) -> Result<User> {
        self.require_user(user_id)
    }

    pub fn update_profile(&self, user_id: i64, update: &ProfileUpdate) -> Result<User> {
        InputValidator::validate_profile(update)?;
        let update = ProfileUpdate {
            height: update.height,
            weight: update.weight,
            blood_type: optional_text(update.blood_type.as_ref()),
            allergies: optional_text(update.allergies.as_ref()),
            medical_conditions: optional_text(update.medical_conditions.as_ref()),
            emergency_contact: optional_text(update.emergency_contact.as_ref()),
            preferred_language: optional_text(update.preferred_language.as_ref()),
        };

        self.store
            .update_profile(user_id, &update)?
            .ok_or_else(|| AssistantError::not_found("User", user_id))
    }

    // Medications

    /// Create a medication and, for daily schedules, its reminders
    pub fn create_medication(
        &self,
        user_id: i64,
        request: &NewMedication,
        now: DateTime<Utc>,
    ) -> Result<MedicationWithReminders> {
        self.require_user(user_id)?;
        InputValidator::validate_new_medication(request)?;

        let start_date = match request.start_date.as_deref().filter(|s| !s.trim().is_empty()) {
            Some(text) => resolve_timestamp(text, now)?,
            None => now,
        };
        let end_date = request
            .end_date
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .map(|text| resolve_timestamp(text, now))
            .transpose()?;
        InputValidator::validate_date_range(start_date, end_date)?;

        let draft = MedicationDraft {
            name: request.name.trim().to_string(),
            dosage: request.dosage.trim().to_string(),
            frequency: request.frequency.trim().to_string(),
            time_of_day: request.time_of_day.trim().to_string(),
            start_date,
            end_date,
            notes: optional_text(request.notes.as_ref()),
        };

        let schedule = materialize_daily(&draft.frequency, &draft.time_of_day, now.date_naive());
        let medication = self.store.create_medication(user_id, &draft, &schedule.times)?;
        self.metrics
            .record_materialized(schedule.times.len(), schedule.skipped.len());

        info!(
            user_id,
            medication_id = medication.id,
            reminders = schedule.times.len(),
            skipped_tokens = schedule.skipped.len(),
            "Medication created"
        );

        let reminders = self.store.reminders_for_medication(medication.id)?;
        Ok(MedicationWithReminders { medication, reminders })
    }

    pub fn list_medications(&self, user_id: i64) -> Result<Vec<MedicationWithReminders>> {
        self.store
            .list_medications(user_id)?
            .into_iter()
            .map(|medication| {
                let reminders = self.store.reminders_for_medication(medication.id)?;
                Ok(MedicationWithReminders { medication, reminders })
            })
            .collect()
    }

    /// Apply a partial edit. Existing reminders are left as they are.
    ///
    /// Fields absent from `update` keep their stored value, including a status
    /// set by an acknowledgment that committed after the caller last read it.
    pub fn update_medication(
        &self,
        user_id: i64,
        medication_id: i64,
        update: &MedicationUpdate,
        now: DateTime<Utc>,
    ) -> Result<Medication> {
        let medication = self
            .store
            .update_medication(user_id, medication_id, |medication| {
                if let Some(name) = &update.name {
                    InputValidator::validate_required("Medication name", name, 200)?;
                    medication.name = name.trim().to_string();
                }
                if let Some(dosage) = &update.dosage {
                    InputValidator::validate_required("Dosage", dosage, 100)?;
                    medication.dosage = dosage.trim().to_string();
                }
                if let Some(frequency) = &update.frequency {
                    InputValidator::validate_required("Frequency", frequency, 100)?;
                    medication.frequency = frequency.trim().to_string();
                }
                if let Some(time_of_day) = &update.time_of_day {
                    InputValidator::validate_required("Time of day", time_of_day, 500)?;
                    medication.time_of_day = time_of_day.trim().to_string();
                }
                if let Some(start) = &update.start_date {
                    medication.start_date = resolve_timestamp(start, now)?;
                }
                if let Some(end) = &update.end_date {
                    medication.end_date = Some(resolve_timestamp(end, now)?);
                }
                if let Some(status) = update.status {
                    medication.status = status;
                }
                if update.notes.is_some() {
                    medication.notes = optional_text(update.notes.as_ref());
                }
                InputValidator::validate_date_range(medication.start_date, medication.end_date)
            })?
            .ok_or_else(|| AssistantError::not_found("Medication", medication_id))?;

        debug!(user_id, medication_id, "Medication updated");
        Ok(medication)
    }

    pub fn delete_medication(&self, user_id: i64, medication_id: i64) -> Result<()> {
        if !self.store.delete_medication(user_id, medication_id)? {
            return Err(AssistantError::not_found("Medication", medication_id));
        }
        info!(user_id, medication_id, "Medication deleted");
        Ok(())
    }

    /// Confirm a dose: the reminder becomes Acknowledged and the medication Taken
    pub fn acknowledge_reminder(&self, user_id: i64, medication_id: i64, reminder_id: i64) -> Result<()> {
        if !self
            .store
            .acknowledge_medication_reminder(user_id, medication_id, reminder_id)?
        {
            return Err(AssistantError::not_found("Medication reminder", reminder_id));
        }
        info!(user_id, medication_id, reminder_id, "Medication reminder acknowledged");
        Ok(())
    }

    pub fn dismiss_reminder(&self, user_id: i64, reminder_id: i64) -> Result<()> {
        if !self.store.dismiss_medication_reminder(user_id, reminder_id)? {
            return Err(AssistantError::not_found("Medication reminder", reminder_id));
        }
        debug!(user_id, reminder_id, "Medication reminder dismissed");
        Ok(())
    }

    // Appointments

    /// Create an appointment with reminders one day and one hour ahead
    pub fn create_appointment(
        &self,
        user_id: i64,
        request: &NewAppointment,
        now: DateTime<Utc>,
    ) -> Result<AppointmentWithReminders> {
        self.require_user(user_id)?;
        InputValidator::validate_new_appointment(request)?;

        let date_time = resolve_timestamp(&request.date_time, now)?;
        let reminder_times = [Duration::days(1), Duration::hours(1)]
            .into_iter()
            .map(|lead| {
                date_time
                    .checked_sub_signed(lead)
                    .ok_or_else(|| AssistantError::InvalidTime(format!("appointment time out of range: {date_time}")))
            })
            .collect::<Result<Vec<_>>>()?;

        let draft = AppointmentDraft {
            doctor_name: request.doctor_name.trim().to_string(),
            specialty: optional_text(request.specialty.as_ref()),
            location: request.location.trim().to_string(),
            date_time,
            purpose: optional_text(request.purpose.as_ref()),
            notes: optional_text(request.notes.as_ref()),
        };

        let appointment = self.store.create_appointment(user_id, &draft, &reminder_times)?;
        info!(user_id, appointment_id = appointment.id, "Appointment created");

        let reminders = self.store.reminders_for_appointment(appointment.id)?;
        Ok(AppointmentWithReminders { appointment, reminders })
    }

    pub fn list_appointments(&self, user_id: i64) -> Result<Vec<AppointmentWithReminders>> {
        self.store
            .list_appointments(user_id)?
            .into_iter()
            .map(|appointment| {
                let reminders = self.store.reminders_for_appointment(appointment.id)?;
                Ok(AppointmentWithReminders { appointment, reminders })
            })
            .collect()
    }

    // Timers

    pub fn create_timer(&self, user_id: i64, request: &NewTimer, now: DateTime<Utc>) -> Result<Timer> {
        self.require_user(user_id)?;
        InputValidator::validate_new_timer(request)?;
        let timer = self
            .store
            .create_timer(user_id, request.name.trim(), request.duration, now)?;
        debug!(user_id, timer_id = timer.id, duration = timer.duration, "Timer created");
        Ok(timer)
    }

    pub fn list_timers(&self, user_id: i64) -> Result<Vec<Timer>> {
        self.store.list_timers(user_id)
    }

    /// Start (or restart) a timer at `now`
    pub fn start_timer(&self, user_id: i64, timer_id: i64, now: DateTime<Utc>) -> Result<Timer> {
        let timer = self
            .store
            .get_user_timer(user_id, timer_id)?
            .ok_or_else(|| AssistantError::not_found("Timer", timer_id))?;

        let end_time = Duration::try_seconds(timer.duration)
            .and_then(|length| now.checked_add_signed(length))
            .ok_or_else(|| AssistantError::Validation(format!("Timer duration out of range: {}", timer.duration)))?;

        let started = self
            .store
            .start_timer(user_id, timer_id, now, end_time)?
            .ok_or_else(|| AssistantError::not_found("Timer", timer_id))?;
        info!(user_id, timer_id, end_time = %end_time, "Timer started");
        Ok(started)
    }

    // Insights

    /// Unread insights first, then read ones, newest first within each group
    pub fn list_insights(&self, user_id: i64) -> Result<Vec<HealthInsight>> {
        let mut insights = self.store.unread_insights(user_id)?;
        if insights.len() < INSIGHT_LIST_LIMIT {
            let remaining = INSIGHT_LIST_LIMIT - insights.len();
            insights.extend(self.store.read_insights(user_id, remaining)?);
        }
        Ok(insights)
    }

    pub fn mark_insight_read(&self, user_id: i64, insight_id: i64) -> Result<()> {
        if !self.store.mark_insight_read(user_id, insight_id)? {
            return Err(AssistantError::not_found("Health insight", insight_id));
        }
        Ok(())
    }

    // Conversations

    pub fn list_conversations(&self, user_id: i64) -> Result<Vec<Conversation>> {
        self.store.list_conversations(user_id, CONVERSATION_LIST_LIMIT)
    }
}
