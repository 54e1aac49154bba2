//! Conversation controller.
//!
//! Owns the ordered message log and drives the per-send state machine:
//! validate preconditions, append the user message and an assistant
//! placeholder, assemble the grounding context from the active files, issue
//! one inference call, and reconcile the result into the log. Success fills
//! the placeholder in place; failure removes it so a half-answered turn is
//! never silently kept.

use crate::error::{Result, WeaverError};
use crate::monitor::ServerStatus;
use crate::ollama::{GenerateOptions, GenerateRequest, NUM_PREDICT, OllamaClient};
use crate::registry::ContextFile;
use crate::settings::ServerSettings;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

/// Fixed system instruction describing the assistant's role.
const SYSTEM_INSTRUCTION: &str = "You are an intelligent AI assistant specialized in document \
analysis. You provide accurate, helpful responses based on the context provided. Always cite \
specific parts of the documents when relevant. Respond in the same language as the user's \
question.";

/// Fallback text when the server returns an empty response.
const EMPTY_RESPONSE_TEXT: &str = "No response generated.";

/// Author of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// One entry in the conversation log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    /// True only for an assistant placeholder whose request has not settled.
    pub is_loading: bool,
}

impl Message {
    fn new(role: Role, content: impl Into<String>, is_loading: bool) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            role,
            content: content.into(),
            timestamp: Utc::now(),
            is_loading,
        }
    }
}

/// Result of a completed send.
#[derive(Debug, Clone)]
pub struct SendOutcome {
    /// Id of the appended user message.
    pub user_message_id: String,
    /// Id of the settled assistant message.
    pub assistant_message_id: String,
    /// Advisory: the send proceeded without any grounding context.
    pub ungrounded: bool,
}

/// Controller for one conversation's message log.
pub struct ChatController {
    client: OllamaClient,
    messages: Vec<Message>,
}

impl ChatController {
    /// Create an empty conversation.
    #[must_use]
    pub fn new() -> Self {
        Self {
            client: OllamaClient::new(),
            messages: Vec::new(),
        }
    }

    /// The ordered message log.
    #[must_use]
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Empty the log.
    pub fn clear(&mut self) {
        self.messages.clear();
    }

    /// Send one user message and settle the assistant reply.
    ///
    /// Rejects with a validation error while the server is disconnected,
    /// without touching the log. An empty active context is advisory only;
    /// the send proceeds ungrounded. On inference failure the placeholder is
    /// removed (the user message stays) and the classified error is returned.
    pub async fn send(
        &mut self,
        text: &str,
        status: &ServerStatus,
        context: &[ContextFile],
        settings: &ServerSettings,
    ) -> Result<SendOutcome> {
        if !status.is_connected {
            return Err(WeaverError::Validation(
                "cannot send while the server is offline".to_owned(),
            ));
        }

        let ungrounded = context.is_empty();
        if ungrounded {
            info!("no context selected; sending ungrounded");
        }

        let user_message = Message::new(Role::User, text, false);
        let placeholder = Message::new(Role::Assistant, "", true);
        let user_message_id = user_message.id.clone();
        let assistant_message_id = placeholder.id.clone();
        self.messages.push(user_message);
        self.messages.push(placeholder);

        let request = GenerateRequest {
            model: settings.model.clone(),
            prompt: text.to_owned(),
            system: compose_system_prompt(context),
            stream: false,
            options: GenerateOptions {
                temperature: settings.temperature,
                top_p: settings.top_p,
                num_predict: NUM_PREDICT,
            },
        };

        match self.client.generate(&settings.endpoint, &request).await {
            Ok(response) => {
                let content = if response.response.is_empty() {
                    EMPTY_RESPONSE_TEXT.to_owned()
                } else {
                    response.response
                };
                if let Some(message) = self
                    .messages
                    .iter_mut()
                    .find(|m| m.id == assistant_message_id)
                {
                    message.content = content;
                    message.is_loading = false;
                }
                Ok(SendOutcome {
                    user_message_id,
                    assistant_message_id,
                    ungrounded,
                })
            }
            Err(e) => {
                warn!(error = %e, "generate failed; removing placeholder");
                self.messages.retain(|m| m.id != assistant_message_id);
                Err(user_facing(e))
            }
        }
    }
}

impl Default for ChatController {
    fn default() -> Self {
        Self::new()
    }
}

/// Rewrite transport-level errors into the user-facing phrasing; server
/// errors already carry the server's reported text.
fn user_facing(err: WeaverError) -> WeaverError {
    match err {
        WeaverError::Timeout(_) => WeaverError::Timeout(
            "Request timed out. The model might be processing a complex query.".to_owned(),
        ),
        WeaverError::Network(_) => WeaverError::Network(
            "Cannot connect to Ollama server. Please check CORS settings or server availability."
                .to_owned(),
        ),
        other => other,
    }
}

/// Compose the system instruction plus the delimited context block.
///
/// Each file becomes a `--- START: name --- / --- END: name ---` section;
/// sections are joined by blank lines and wrapped in outer CONTEXT markers
/// only when at least one section exists.
fn compose_system_prompt(context: &[ContextFile]) -> String {
    let sections: Vec<String> = context
        .iter()
        .filter_map(|f| {
            let content = f.content.as_deref()?;
            Some(format!(
                "--- START: {name} ---\n{content}\n--- END: {name} ---",
                name = f.name
            ))
        })
        .collect();

    if sections.is_empty() {
        SYSTEM_INSTRUCTION.to_owned()
    } else {
        format!(
            "{SYSTEM_INSTRUCTION}\n\n=== CONTEXT STARTS HERE ===\n{}\n=== CONTEXT ENDS HERE ===\n\n",
            sections.join("\n\n")
        )
    }
}
