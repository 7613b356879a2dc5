//! Chat and voice queries answered by the text generator.

use std::sync::Arc;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::db::{run_blocking, Database};
use crate::error::{AssistantError, Result};
use crate::external::{SpeechSynthesizer, TextGenerator};
use crate::metrics::MetricsCollector;
use crate::models::{InteractionType, User};
use crate::validation::InputValidator;

/// Reply used whenever text generation fails
pub const APOLOGY: &str = "I'm sorry, I encountered an error processing your request. Please try again later.";

/// Chat request body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    pub message: String,
}

/// Chat reply
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatReply {
    pub response: String,
}

/// Voice reply; `audio` is base64 MP3 or null when synthesis failed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoiceReply {
    pub response: String,
    pub audio: Option<String>,
}

/// Answers user queries with their medical profile as context
#[derive(Clone)]
pub struct Assistant {
    store: Database,
    generator: Arc<dyn TextGenerator>,
    speech: Arc<dyn SpeechSynthesizer>,
    metrics: MetricsCollector,
    default_language: String,
}

impl Assistant {
    pub fn new(
        store: Database,
        generator: Arc<dyn TextGenerator>,
        speech: Arc<dyn SpeechSynthesizer>,
        metrics: MetricsCollector,
        default_language: impl Into<String>,
    ) -> Self {
        Self {
            store,
            generator,
            speech,
            metrics,
            default_language: default_language.into(),
        }
    }

    fn prompt(user: &User, message: &str) -> String {
        format!(
            "User Medical Profile:\n{}\n\nAs a medical assistant, provide a helpful response based on this profile.\n\n\
             User Query: {}",
            user.profile_summary(),
            message
        )
    }

    async fn answer(&self, user: &User, message: &str, interaction: InteractionType) -> String {
        match self.generator.generate(&Self::prompt(user, message)).await {
            Ok(response) => {
                let store = self.store.clone();
                let (user_id, message, reply) = (user.id, message.to_string(), response.clone());
                let recorded = run_blocking(move || {
                    store.record_conversation(user_id, &message, &reply, interaction, Utc::now())
                })
                .await;
                if let Err(e) = recorded {
                    warn!(user_id, error = %e, "Failed to store conversation");
                }
                response
            },
            Err(e) => {
                warn!(user_id = user.id, error = %e, "Assistant reply generation failed");
                self.metrics.record_external_failure("text_generation");
                APOLOGY.to_string()
            },
        }
    }

    async fn user(&self, user_id: i64, message: &str) -> Result<User> {
        InputValidator::validate_message(message)?;
        let store = self.store.clone();
        run_blocking(move || store.get_user(user_id))
            .await?
            .ok_or_else(|| AssistantError::not_found("User", user_id))
    }

    /// Answer a typed message
    pub async fn chat(&self, user_id: i64, message: &str) -> Result<ChatReply> {
        let message = InputValidator::sanitize_text(message);
        let user = self.user(user_id, &message).await?;

        let response = self.answer(&user, &message, InteractionType::Chat).await;
        info!(user_id, "Chat query answered");
        Ok(ChatReply { response })
    }

    /// Answer a spoken message and render the reply as audio
    pub async fn voice(&self, user_id: i64, message: &str) -> Result<VoiceReply> {
        let message = InputValidator::sanitize_text(message);
        let user = self.user(user_id, &message).await?;

        let response = self.answer(&user, &message, InteractionType::Voice).await;

        let language = if user.preferred_language.trim().is_empty() {
            self.default_language.as_str()
        } else {
            user.preferred_language.as_str()
        };
        let audio = match self.speech.synthesize(&response, language).await {
            Some(bytes) => Some(STANDARD.encode(bytes)),
            None => {
                self.metrics.record_external_failure("speech_synthesis");
                None
            },
        };

        info!(user_id, has_audio = audio.is_some(), "Voice query answered");
        Ok(VoiceReply { response, audio })
    }
}
