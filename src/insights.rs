//! Daily health insight generation.

use std::sync::Arc;

use chrono::{DateTime, NaiveTime, Utc};
use tracing::{debug, info, warn};

use crate::db::{run_blocking, Database};
use crate::dispatcher::NotificationSink;
use crate::error::Result;
use crate::external::TextGenerator;
use crate::metrics::MetricsCollector;
use crate::models::{HealthInsight, InsightCategory, Notification, User};

/// Recent medications included in the prompt
const RECENT_MEDICATIONS: usize = 5;
/// Upcoming appointments included in the prompt
const UPCOMING_APPOINTMENTS: usize = 3;

/// Generates one insight per user per day and pushes it
#[derive(Clone)]
pub struct InsightGenerator {
    store: Database,
    generator: Arc<dyn TextGenerator>,
    sink: Arc<dyn NotificationSink>,
    metrics: MetricsCollector,
}

impl InsightGenerator {
    pub fn new(
        store: Database,
        generator: Arc<dyn TextGenerator>,
        sink: Arc<dyn NotificationSink>,
        metrics: MetricsCollector,
    ) -> Self {
        Self {
            store,
            generator,
            sink,
            metrics,
        }
    }

    /// Build the generation prompt for `user`
    pub fn build_prompt(&self, user: &User) -> Result<String> {
        let medications = self.store.recent_medications(user.id, RECENT_MEDICATIONS)?;
        let appointments = self.store.scheduled_appointments(user.id, UPCOMING_APPOINTMENTS)?;

        let medication_names = medications
            .iter()
            .map(|m| m.name.as_str())
            .collect::<Vec<_>>()
            .join(", ");
        let appointment_lines = appointments
            .iter()
            .map(|a| format!("Dr. {} on {}", a.doctor_name, a.date_time.format("%Y-%m-%d")))
            .collect::<Vec<_>>()
            .join(", ");

        Ok(format!(
            "Generate a personalized health insight for a user with the following profile:\n{}\n\n\
             Recent medications: {}\nUpcoming appointments: {}\n\n\
             Generate one concise health tip that would be valuable for this user's wellbeing today.",
            user.profile_summary(),
            medication_names,
            appointment_lines
        ))
    }

    /// Generate, store and push today's insight for `user_id`.
    ///
    /// Returns `Ok(None)` when the user is unknown, already has today's insight,
    /// or the text generator failed. Only store errors are returned.
    pub async fn generate_for_user(&self, user_id: i64, now: DateTime<Utc>) -> Result<Option<HealthInsight>> {
        let this = self.clone();
        let Some(prompt) = run_blocking(move || this.prepare(user_id, now)).await? else {
            return Ok(None);
        };

        let content = match self.generator.generate(&prompt).await {
            Ok(content) => content.trim().to_string(),
            Err(e) => {
                warn!(user_id, error = %e, "Insight generation failed");
                self.metrics.record_external_failure("text_generation");
                return Ok(None);
            },
        };

        let this = self.clone();
        let insight = run_blocking(move || this.publish(user_id, &content, now)).await?;
        Ok(Some(insight))
    }

    /// Prompt for today's insight, or None when none should be generated
    fn prepare(&self, user_id: i64, now: DateTime<Utc>) -> Result<Option<String>> {
        let Some(user) = self.store.get_user(user_id)? else {
            debug!(user_id, "User vanished before insight generation");
            return Ok(None);
        };

        let start_of_day = now.date_naive().and_time(NaiveTime::MIN).and_utc();
        if self.store.has_insight_since(user_id, InsightCategory::Daily, start_of_day)? {
            debug!(user_id, "Daily insight already generated today");
            return Ok(None);
        }

        self.build_prompt(&user).map(Some)
    }

    fn publish(&self, user_id: i64, content: &str, now: DateTime<Utc>) -> Result<HealthInsight> {
        let insight = self
            .store
            .create_insight(user_id, InsightCategory::Daily, content, now)?;
        self.metrics.record_insight();

        let notification = Notification::health_insight(&insight);
        let receivers = self.sink.deliver(user_id, &notification);
        self.metrics.record_dispatch(notification.kind(), receivers);

        info!(user_id, insight_id = insight.id, "Daily health insight generated");
        Ok(insight)
    }
}
