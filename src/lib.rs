//! Medassist - Personal Health Reminders and Assistant
//!
//! A Rust library for tracking medications, appointments and timers, pushing
//! reminders to connected clients when they fall due, and answering health
//! questions through a hosted text-generation service.
//!
//! # Features
//!
//! - Daily medication schedules expanded into concrete reminders
//! - Appointment reminders a day and an hour ahead
//! - Background scanner with at-least-once push delivery
//! - Natural-language time expressions ("tomorrow", "in 3 days", "9pm")
//! - Daily personalized health insights
//! - Chat and voice queries with conversation history

/// AI chat and voice queries
pub mod assistant;
/// HTTP routes and WebSocket push channel
pub mod api;
/// Configuration management
pub mod config;
/// Database operations and connection pooling
pub mod db;
/// Real-time notification delivery
pub mod dispatcher;
/// Error types
pub mod error;
/// Text generation and speech synthesis clients
pub mod external;
/// Daily health insight generation
pub mod insights;
/// Logging setup and utilities
pub mod logging;
/// Daily reminder expansion
pub mod materializer;
/// Metrics collection
pub mod metrics;
/// Data models and structures
pub mod models;
/// Due-item scanner
pub mod scanner;
/// Database schema definitions
pub mod schema;
/// User-facing operations
pub mod service;
/// Natural-language time parsing
pub mod time_parser;
/// Input validation and sanitization
pub mod validation;

// Re-export key components for easier access
pub use db::Database;
pub use dispatcher::{NotificationHub, NotificationSink};
pub use error::{AssistantError, Result};
pub use models::{Medication, MedicationReminder, Notification, Timer};
pub use scanner::{CycleReport, Scanner};
pub use service::HealthService;
