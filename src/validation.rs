use chrono::{DateTime, Utc};

use crate::error::{AssistantError, Result};
use crate::models::{NewAppointment, NewMedication, NewTimer, NewUser, ProfileUpdate};

/// Longest timer accepted, one week
pub const MAX_TIMER_SECONDS: i64 = 7 * 24 * 60 * 60;

fn invalid(message: impl Into<String>) -> AssistantError {
    AssistantError::Validation(message.into())
}

/// Validation utilities for input sanitization and edge case handling
#[derive(Debug, Copy, Clone)]
pub struct InputValidator;

impl InputValidator {
    /// Validate a required single-line text field
    pub fn validate_required(field: &str, value: &str, max_len: usize) -> Result<()> {
        if value.trim().is_empty() {
            return Err(invalid(format!("{field} cannot be empty")));
        }

        if value.chars().count() > max_len {
            return Err(invalid(format!("{field} too long (max {max_len} characters)")));
        }

        // Check for potentially dangerous characters
        if value.contains('\0') || value.contains('\r') || value.contains('\n') {
            return Err(invalid(format!("{field} contains invalid characters")));
        }

        Ok(())
    }

    /// Validate username format
    pub fn validate_username(username: &str) -> Result<()> {
        Self::validate_required("Username", username, 80)?;

        if !username.chars().all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '-' || c == '_') {
            return Err(invalid("Username contains invalid characters"));
        }

        Ok(())
    }

    /// Validate email format
    pub fn validate_email(email: &str) -> Result<()> {
        if email.trim().is_empty() {
            return Err(invalid("Email cannot be empty"));
        }

        if email.len() > 254 {
            return Err(invalid("Email too long (max 254 characters)"));
        }

        let Some((local_part, domain_part)) = email.split_once('@') else {
            return Err(invalid("Email must contain @ symbol"));
        };

        if domain_part.contains('@') {
            return Err(invalid("Email must have exactly one @ symbol"));
        }

        if local_part.is_empty() || local_part.len() > 64 {
            return Err(invalid("Email local part invalid"));
        }

        if domain_part.is_empty() || !domain_part.contains('.') {
            return Err(invalid("Email domain invalid"));
        }

        Ok(())
    }

    /// Validate a registration request
    pub fn validate_new_user(user: &NewUser) -> Result<()> {
        Self::validate_username(&user.username)?;
        Self::validate_email(&user.email)
    }

    /// Validate a profile update
    pub fn validate_profile(update: &ProfileUpdate) -> Result<()> {
        if let Some(height) = update.height {
            if !(height > 0.0 && height < 300.0) {
                return Err(invalid("Height must be between 0 and 300 cm"));
            }
        }

        if let Some(weight) = update.weight {
            if !(weight > 0.0 && weight < 700.0) {
                return Err(invalid("Weight must be between 0 and 700 kg"));
            }
        }

        if let Some(language) = &update.preferred_language {
            Self::validate_language_code(language)?;
        }

        Ok(())
    }

    /// Validate a BCP-47 style language code such as "en-US"
    pub fn validate_language_code(code: &str) -> Result<()> {
        let valid = !code.is_empty()
            && code.len() <= 35
            && code
                .split('-')
                .all(|part| !part.is_empty() && part.chars().all(|c| c.is_ascii_alphanumeric()));

        if !valid {
            return Err(invalid(format!("Invalid language code: {code}")));
        }

        Ok(())
    }

    /// Validate a medication request
    pub fn validate_new_medication(medication: &NewMedication) -> Result<()> {
        Self::validate_required("Medication name", &medication.name, 200)?;
        Self::validate_required("Dosage", &medication.dosage, 100)?;
        Self::validate_required("Frequency", &medication.frequency, 100)?;
        Self::validate_required("Time of day", &medication.time_of_day, 500)
    }

    /// Validate an appointment request
    pub fn validate_new_appointment(appointment: &NewAppointment) -> Result<()> {
        Self::validate_required("Doctor name", &appointment.doctor_name, 200)?;
        Self::validate_required("Location", &appointment.location, 500)?;
        Self::validate_required("Date and time", &appointment.date_time, 200)
    }

    /// Validate a timer request
    pub fn validate_new_timer(timer: &NewTimer) -> Result<()> {
        Self::validate_required("Timer name", &timer.name, 200)?;

        if timer.duration <= 0 {
            return Err(invalid("Timer duration must be positive"));
        }

        if timer.duration > MAX_TIMER_SECONDS {
            return Err(invalid(format!("Timer duration too large (max {MAX_TIMER_SECONDS} seconds)")));
        }

        Ok(())
    }

    /// Validate date range
    pub fn validate_date_range(start: DateTime<Utc>, end: Option<DateTime<Utc>>) -> Result<()> {
        if let Some(end_date) = end {
            if start > end_date {
                return Err(invalid("Start date cannot be after end date"));
            }
        }

        Ok(())
    }

    /// Validate a message for the assistant
    pub fn validate_message(message: &str) -> Result<()> {
        if message.trim().is_empty() {
            return Err(invalid("Message cannot be empty"));
        }

        if message.chars().count() > 4000 {
            return Err(invalid("Message too long (max 4000 characters)"));
        }

        Ok(())
    }

    /// Sanitize text input
    #[must_use]
    pub fn sanitize_text(text: &str) -> String {
        text.chars()
            .filter(|c| !c.is_control() || *c == '\n' || *c == '\t' || *c == '\r')
            .collect::<String>()
            .trim()
            .to_string()
    }
}
