//! Data models for schedules, reminders and notifications
//!
//! This module contains all data structures used throughout the application,
//! including stored entities, request payloads and push notifications.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Declares a closed status enum stored as text.
///
/// Generates `as_str`, `Display`, `FromStr` and the rusqlite conversions so the
/// enum can be bound and read directly.
macro_rules! text_enum {
    ($(#[$meta:meta])* $name:ident { $($(#[$vmeta:meta])* $variant:ident => $text:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $($(#[$vmeta])* #[serde(rename = $text)] $variant),+
        }

        impl $name {
            /// Stored and serialized text for this value
            #[must_use]
            pub const fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $text),+
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $name {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok(Self::$variant),)+
                    other => Err(format!("unknown {} value: {}", stringify!($name), other)),
                }
            }
        }

        impl rusqlite::types::ToSql for $name {
            fn to_sql(&self) -> rusqlite::Result<rusqlite::types::ToSqlOutput<'_>> {
                Ok(rusqlite::types::ToSqlOutput::from(self.as_str()))
            }
        }

        impl rusqlite::types::FromSql for $name {
            fn column_result(value: rusqlite::types::ValueRef<'_>) -> rusqlite::types::FromSqlResult<Self> {
                value
                    .as_str()?
                    .parse()
                    .map_err(|e: String| rusqlite::types::FromSqlError::Other(e.into()))
            }
        }
    };
}

text_enum! {
    /// Lifecycle of a medication
    MedicationStatus {
        /// Not yet taken for the current dose
        Pending => "Pending",
        /// Acknowledged by the user
        Taken => "Taken",
        /// Dose was missed
        Missed => "Missed",
    }
}

text_enum! {
    /// State of a single medication reminder
    ReminderStatus {
        /// Waiting for its scheduled time
        Pending => "Pending",
        /// Pushed by the scanner
        Sent => "Sent",
        /// User confirmed the dose
        Acknowledged => "Acknowledged",
        /// User dismissed the reminder
        Dismissed => "Dismissed",
    }
}

text_enum! {
    /// State of an appointment
    AppointmentStatus {
        /// Upcoming
        Scheduled => "Scheduled",
        /// Took place
        Completed => "Completed",
        /// Called off
        Cancelled => "Cancelled",
        /// Moved to another time
        Rescheduled => "Rescheduled",
    }
}

text_enum! {
    /// State of a countdown timer
    TimerStatus {
        /// Created, never started
        Ready => "Ready",
        /// Counting down
        Running => "Running",
        /// Halted by the user
        Paused => "Paused",
        /// Reached its end time
        Completed => "Completed",
    }
}

text_enum! {
    /// Topic of a generated health insight
    InsightCategory {
        /// Produced by the daily generation run
        Daily => "daily",
        /// Hydration advice
        Hydration => "hydration",
        /// Exercise advice
        Exercise => "exercise",
        /// Mental wellbeing advice
        Mental => "mental",
        /// Medication advice
        Medication => "medication",
    }
}

text_enum! {
    /// How the user talked to the assistant
    InteractionType {
        /// Typed chat
        Chat => "chat",
        /// Spoken query answered with audio
        Voice => "voice",
    }
}

/// A registered user and their medical profile
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub created_at: DateTime<Utc>,
    pub height: Option<f64>,
    pub weight: Option<f64>,
    pub blood_type: Option<String>,
    pub allergies: Option<String>,
    pub medical_conditions: Option<String>,
    pub emergency_contact: Option<String>,
    pub preferred_language: String,
}

impl User {
    /// True once height, weight and blood type are filled in
    #[must_use]
    pub const fn has_medical_profile(&self) -> bool {
        self.height.is_some() && self.weight.is_some() && self.blood_type.is_some()
    }

    /// Medical profile as prompt lines; missing fields read "unknown"
    #[must_use]
    pub fn profile_summary(&self) -> String {
        fn or_unknown<T: std::fmt::Display>(value: Option<&T>) -> String {
            value.map_or_else(|| "unknown".to_string(), ToString::to_string)
        }

        format!(
            "- Height: {}cm\n- Weight: {}kg\n- Blood Type: {}\n- Allergies: {}\n- Medical Conditions: {}",
            or_unknown(self.height.as_ref()),
            or_unknown(self.weight.as_ref()),
            or_unknown(self.blood_type.as_ref()),
            or_unknown(self.allergies.as_ref()),
            or_unknown(self.medical_conditions.as_ref()),
        )
    }
}

/// Data for registering a user
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewUser {
    pub username: String,
    pub email: String,
}

/// Partial profile update; `None` leaves a field unchanged
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProfileUpdate {
    pub height: Option<f64>,
    pub weight: Option<f64>,
    pub blood_type: Option<String>,
    pub allergies: Option<String>,
    pub medical_conditions: Option<String>,
    pub emergency_contact: Option<String>,
    pub preferred_language: Option<String>,
}

/// A medication schedule owned by a user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Medication {
    pub id: i64,
    pub user_id: i64,
    pub name: String,
    pub dosage: String,
    pub frequency: String,
    /// Comma-separated times such as "8:00 AM, 8:00 PM"
    pub time_of_day: String,
    pub start_date: DateTime<Utc>,
    pub end_date: Option<DateTime<Utc>>,
    pub status: MedicationStatus,
    pub notes: Option<String>,
}

/// Request body for creating a medication.
///
/// Dates accept ISO-8601 or a natural-language expression.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewMedication {
    pub name: String,
    pub dosage: String,
    pub frequency: String,
    pub time_of_day: String,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub notes: Option<String>,
}

/// Resolved medication row ready for insertion
#[derive(Debug, Clone)]
pub struct MedicationDraft {
    pub name: String,
    pub dosage: String,
    pub frequency: String,
    pub time_of_day: String,
    pub start_date: DateTime<Utc>,
    pub end_date: Option<DateTime<Utc>>,
    pub notes: Option<String>,
}

/// Partial medication update; `None` leaves a field unchanged
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MedicationUpdate {
    pub name: Option<String>,
    pub dosage: Option<String>,
    pub frequency: Option<String>,
    pub time_of_day: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub status: Option<MedicationStatus>,
    pub notes: Option<String>,
}

/// One concrete dose reminder
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MedicationReminder {
    pub id: i64,
    pub medication_id: i64,
    pub scheduled_time: DateTime<Utc>,
    pub is_sent: bool,
    pub is_acknowledged: bool,
    pub status: ReminderStatus,
}

/// A medication together with its reminders, as listed to the owner
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MedicationWithReminders {
    #[serde(flatten)]
    pub medication: Medication,
    pub reminders: Vec<MedicationReminder>,
}

/// A doctor's appointment owned by a user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Appointment {
    pub id: i64,
    pub user_id: i64,
    pub doctor_name: String,
    pub specialty: Option<String>,
    pub location: String,
    pub date_time: DateTime<Utc>,
    pub purpose: Option<String>,
    pub notes: Option<String>,
    pub status: AppointmentStatus,
}

/// Request body for creating an appointment
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewAppointment {
    pub doctor_name: String,
    pub specialty: Option<String>,
    pub location: String,
    /// ISO-8601 or natural-language expression
    pub date_time: String,
    pub purpose: Option<String>,
    pub notes: Option<String>,
}

/// Resolved appointment row ready for insertion
#[derive(Debug, Clone)]
pub struct AppointmentDraft {
    pub doctor_name: String,
    pub specialty: Option<String>,
    pub location: String,
    pub date_time: DateTime<Utc>,
    pub purpose: Option<String>,
    pub notes: Option<String>,
}

/// Reminder ahead of an appointment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppointmentReminder {
    pub id: i64,
    pub appointment_id: i64,
    pub reminder_time: DateTime<Utc>,
    pub is_sent: bool,
}

/// An appointment together with its reminders
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppointmentWithReminders {
    #[serde(flatten)]
    pub appointment: Appointment,
    pub reminders: Vec<AppointmentReminder>,
}

/// Countdown timer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timer {
    pub id: i64,
    pub user_id: i64,
    pub name: String,
    /// Length in seconds
    pub duration: i64,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub status: TimerStatus,
    pub created_at: DateTime<Utc>,
}

/// Request body for creating a timer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewTimer {
    pub name: String,
    pub duration: i64,
}

/// A generated wellbeing tip
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthInsight {
    pub id: i64,
    pub user_id: i64,
    pub category: InsightCategory,
    pub content: String,
    pub generated_at: DateTime<Utc>,
    pub is_read: bool,
}

/// One stored assistant exchange
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: i64,
    pub user_id: i64,
    pub message: String,
    pub response: String,
    pub timestamp: DateTime<Utc>,
    pub interaction: InteractionType,
}

/// Kind tag carried in every push payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    MedicationReminder,
    AppointmentReminder,
    TimerCompleted,
    HealthInsight,
}

impl NotificationKind {
    /// Wire name of the kind
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::MedicationReminder => "medication_reminder",
            Self::AppointmentReminder => "appointment_reminder",
            Self::TimerCompleted => "timer_completed",
            Self::HealthInsight => "health_insight",
        }
    }
}

/// What a notification is about, with the ids a client needs to act on it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NotificationSubject {
    MedicationReminder { medication_id: i64, reminder_id: i64 },
    AppointmentReminder { appointment_id: i64, reminder_id: i64 },
    TimerCompleted { timer_id: i64 },
    HealthInsight { insight_id: i64 },
}

/// A real-time push to one user's channel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub user_id: i64,
    pub title: String,
    pub message: String,
    #[serde(flatten)]
    pub subject: NotificationSubject,
}

impl Notification {
    /// Kind tag of this notification
    #[must_use]
    pub const fn kind(&self) -> NotificationKind {
        match self.subject {
            NotificationSubject::MedicationReminder { .. } => NotificationKind::MedicationReminder,
            NotificationSubject::AppointmentReminder { .. } => NotificationKind::AppointmentReminder,
            NotificationSubject::TimerCompleted { .. } => NotificationKind::TimerCompleted,
            NotificationSubject::HealthInsight { .. } => NotificationKind::HealthInsight,
        }
    }

    /// "Time to take your <name> (<dosage>)"
    #[must_use]
    pub fn medication_reminder(medication: &Medication, reminder: &MedicationReminder) -> Self {
        Self {
            user_id: medication.user_id,
            title: "Medication Reminder".to_string(),
            message: format!("Time to take your {} ({})", medication.name, medication.dosage),
            subject: NotificationSubject::MedicationReminder {
                medication_id: medication.id,
                reminder_id: reminder.id,
            },
        }
    }

    /// Appointment reminder naming the doctor, the time and the purpose
    #[must_use]
    pub fn appointment_reminder(appointment: &Appointment, reminder: &AppointmentReminder) -> Self {
        Self {
            user_id: appointment.user_id,
            title: "Appointment Reminder".to_string(),
            message: format!(
                "You have an appointment with Dr. {} at {} for {}",
                appointment.doctor_name,
                appointment.date_time.format("%I:%M %p"),
                appointment.purpose.as_deref().unwrap_or_default()
            ),
            subject: NotificationSubject::AppointmentReminder {
                appointment_id: appointment.id,
                reminder_id: reminder.id,
            },
        }
    }

    /// "Your timer for <name> has completed"
    #[must_use]
    pub fn timer_completed(timer: &Timer) -> Self {
        Self {
            user_id: timer.user_id,
            title: "Timer Completed".to_string(),
            message: format!("Your timer for {} has completed", timer.name),
            subject: NotificationSubject::TimerCompleted { timer_id: timer.id },
        }
    }

    /// Carries the generated insight text
    #[must_use]
    pub fn health_insight(insight: &HealthInsight) -> Self {
        Self {
            user_id: insight.user_id,
            title: "Daily Health Insight".to_string(),
            message: insight.content.clone(),
            subject: NotificationSubject::HealthInsight { insight_id: insight.id },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_status_round_trips_through_text() {
        assert_eq!("Running".parse::<TimerStatus>(), Ok(TimerStatus::Running));
        assert_eq!(InsightCategory::Daily.as_str(), "daily");
        assert!("running".parse::<TimerStatus>().is_err());
    }

    #[test]
    fn test_notification_wire_shape() {
        let timer = Timer {
            id: 4,
            user_id: 9,
            name: "Tea".to_string(),
            duration: 180,
            start_time: None,
            end_time: None,
            status: TimerStatus::Running,
            created_at: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
        };
        let notification = Notification::timer_completed(&timer);
        let value = serde_json::to_value(&notification).unwrap();

        assert_eq!(value["type"], "timer_completed");
        assert_eq!(value["user_id"], 9);
        assert_eq!(value["timer_id"], 4);
        assert_eq!(value["message"], "Your timer for Tea has completed");
        assert_eq!(notification.kind(), NotificationKind::TimerCompleted);
    }

    #[test]
    fn test_appointment_message_uses_twelve_hour_clock() {
        let appointment = Appointment {
            id: 1,
            user_id: 2,
            doctor_name: "Okafor".to_string(),
            specialty: None,
            location: "Clinic".to_string(),
            date_time: Utc.with_ymd_and_hms(2024, 3, 5, 14, 30, 0).unwrap(),
            purpose: Some("checkup".to_string()),
            notes: None,
            status: AppointmentStatus::Scheduled,
        };
        let reminder = AppointmentReminder {
            id: 3,
            appointment_id: 1,
            reminder_time: appointment.date_time,
            is_sent: false,
        };
        let notification = Notification::appointment_reminder(&appointment, &reminder);
        assert_eq!(
            notification.message,
            "You have an appointment with Dr. Okafor at 02:30 PM for checkup"
        );
    }
}
