//! Database schema definitions
//!
//! This module provides constants for table and column names used with rusqlite.
//! The tables themselves are created by the SQL files under `migrations/`.

/// Users table schema
pub mod users {
    /// Table name
    pub const TABLE: &str = "users";
    /// Primary key column
    pub const ID: &str = "id";
    /// Unique login name column
    pub const USERNAME: &str = "username";
    /// Unique email column
    pub const EMAIL: &str = "email";
    /// Registration timestamp column
    pub const CREATED_AT: &str = "created_at";
    /// Height in centimetres
    pub const HEIGHT: &str = "height";
    /// Weight in kilograms
    pub const WEIGHT: &str = "weight";
    /// Blood type column
    pub const BLOOD_TYPE: &str = "blood_type";
    /// Free-text allergies column
    pub const ALLERGIES: &str = "allergies";
    /// Free-text conditions column
    pub const MEDICAL_CONDITIONS: &str = "medical_conditions";
    /// Emergency contact column
    pub const EMERGENCY_CONTACT: &str = "emergency_contact";
    /// Speech language code column
    pub const PREFERRED_LANGUAGE: &str = "preferred_language";
}

/// Medications table schema
pub mod medications {
    /// Table name
    pub const TABLE: &str = "medications";
    /// Primary key column
    pub const ID: &str = "id";
    /// Owning user column
    pub const USER_ID: &str = "user_id";
    /// Medication name column
    pub const NAME: &str = "name";
    /// Dosage description column
    pub const DOSAGE: &str = "dosage";
    /// Frequency description column
    pub const FREQUENCY: &str = "frequency";
    /// Comma-separated times of day column
    pub const TIME_OF_DAY: &str = "time_of_day";
    /// Validity start column
    pub const START_DATE: &str = "start_date";
    /// Optional validity end column
    pub const END_DATE: &str = "end_date";
    /// Lifecycle status column
    pub const STATUS: &str = "status";
    /// Notes column
    pub const NOTES: &str = "notes";
}

/// Medication reminders table schema
pub mod medication_reminders {
    /// Table name
    pub const TABLE: &str = "medication_reminders";
    /// Primary key column
    pub const ID: &str = "id";
    /// Owning medication column
    pub const MEDICATION_ID: &str = "medication_id";
    /// Due time column
    pub const SCHEDULED_TIME: &str = "scheduled_time";
    /// Pushed flag column
    pub const IS_SENT: &str = "is_sent";
    /// User confirmation flag column
    pub const IS_ACKNOWLEDGED: &str = "is_acknowledged";
    /// Reminder status column
    pub const STATUS: &str = "status";
}

/// Appointments table schema
pub mod appointments {
    /// Table name
    pub const TABLE: &str = "appointments";
    /// Primary key column
    pub const ID: &str = "id";
    /// Owning user column
    pub const USER_ID: &str = "user_id";
    /// Doctor name column
    pub const DOCTOR_NAME: &str = "doctor_name";
    /// Specialty column
    pub const SPECIALTY: &str = "specialty";
    /// Location column
    pub const LOCATION: &str = "location";
    /// Appointment time column
    pub const DATE_TIME: &str = "date_time";
    /// Purpose column
    pub const PURPOSE: &str = "purpose";
    /// Notes column
    pub const NOTES: &str = "notes";
    /// Status column
    pub const STATUS: &str = "status";
}

/// Appointment reminders table schema
pub mod appointment_reminders {
    /// Table name
    pub const TABLE: &str = "appointment_reminders";
    /// Primary key column
    pub const ID: &str = "id";
    /// Owning appointment column
    pub const APPOINTMENT_ID: &str = "appointment_id";
    /// Due time column
    pub const REMINDER_TIME: &str = "reminder_time";
    /// Pushed flag column
    pub const IS_SENT: &str = "is_sent";
}

/// Timers table schema
pub mod timers {
    /// Table name
    pub const TABLE: &str = "timers";
    /// Primary key column
    pub const ID: &str = "id";
    /// Owning user column
    pub const USER_ID: &str = "user_id";
    /// Timer label column
    pub const NAME: &str = "name";
    /// Length in seconds column
    pub const DURATION: &str = "duration";
    /// Start time column
    pub const START_TIME: &str = "start_time";
    /// End time column
    pub const END_TIME: &str = "end_time";
    /// Status column
    pub const STATUS: &str = "status";
    /// Creation timestamp column
    pub const CREATED_AT: &str = "created_at";
}

/// Health insights table schema
pub mod health_insights {
    /// Table name
    pub const TABLE: &str = "health_insights";
    /// Primary key column
    pub const ID: &str = "id";
    /// Owning user column
    pub const USER_ID: &str = "user_id";
    /// Category tag column
    pub const CATEGORY: &str = "category";
    /// Generated text column
    pub const CONTENT: &str = "content";
    /// Generation timestamp column
    pub const GENERATED_AT: &str = "generated_at";
    /// Read flag column
    pub const IS_READ: &str = "is_read";
}

/// Conversations table schema
pub mod conversations {
    /// Table name
    pub const TABLE: &str = "conversations";
    /// Primary key column
    pub const ID: &str = "id";
    /// Owning user column
    pub const USER_ID: &str = "user_id";
    /// User message column
    pub const MESSAGE: &str = "message";
    /// Assistant response column
    pub const RESPONSE: &str = "response";
    /// Exchange timestamp column
    pub const TIMESTAMP: &str = "timestamp";
    /// Chat or voice column
    pub const INTERACTION: &str = "interaction";
}
