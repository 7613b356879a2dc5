//! Shared fixtures for integration tests
#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use tempfile::TempDir;

use medassist::db::Database;
use medassist::dispatcher::NotificationSink;
use medassist::error::{AssistantError, Result};
use medassist::external::{SpeechSynthesizer, TextGenerator};
use medassist::models::{NewUser, Notification, User};

/// A throwaway store; keep the directory alive for the test's duration
pub fn temp_store() -> (TempDir, Database) {
    let dir = tempfile::tempdir().expect("Failed to create temp directory");
    let db = Database::new(dir.path().join("test.db")).expect("Failed to create database");
    (dir, db)
}

pub fn at(year: i32, month: u32, day: u32, hour: u32, minute: u32, second: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(year, month, day, hour, minute, second)
        .single()
        .expect("valid timestamp")
}

pub fn create_user(db: &Database, name: &str) -> User {
    db.create_user(
        &NewUser {
            username: name.to_string(),
            email: format!("{name}@example.com"),
        },
        at(2024, 1, 1, 0, 0, 0),
    )
    .expect("Failed to create user")
}

/// Records every delivered notification and reports one live receiver
#[derive(Default)]
pub struct RecordingSink {
    delivered: Mutex<Vec<(i64, Notification)>>,
}

impl RecordingSink {
    pub fn delivered(&self) -> Vec<(i64, Notification)> {
        self.delivered.lock().expect("sink lock").clone()
    }

    pub fn count(&self) -> usize {
        self.delivered.lock().expect("sink lock").len()
    }
}

impl NotificationSink for RecordingSink {
    fn deliver(&self, user_id: i64, notification: &Notification) -> usize {
        self.delivered
            .lock()
            .expect("sink lock")
            .push((user_id, notification.clone()));
        1
    }
}

/// Text generator returning a fixed reply, or failing when `reply` is None
pub struct FixedGenerator {
    reply: Option<String>,
    prompts: Mutex<Vec<String>>,
}

impl FixedGenerator {
    pub fn replying(reply: &str) -> Arc<Self> {
        Arc::new(Self {
            reply: Some(reply.to_string()),
            prompts: Mutex::new(Vec::new()),
        })
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            reply: None,
            prompts: Mutex::new(Vec::new()),
        })
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().expect("prompt lock").clone()
    }
}

#[async_trait]
impl TextGenerator for FixedGenerator {
    async fn generate(&self, prompt: &str) -> Result<String> {
        self.prompts.lock().expect("prompt lock").push(prompt.to_string());
        self.reply
            .clone()
            .ok_or_else(|| AssistantError::External("simulated outage".to_string()))
    }
}

/// Speech synthesizer that never produces audio
pub struct SilentSpeech;

#[async_trait]
impl SpeechSynthesizer for SilentSpeech {
    async fn synthesize(&self, _text: &str, _language_code: &str) -> Option<Vec<u8>> {
        None
    }
}
