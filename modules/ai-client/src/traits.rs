use async_trait::async_trait;

use crate::error::Result;
use crate::openai::StructuredOutput;
use crate::util::strip_code_blocks;

// =============================================================================
// Message Types
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageRole {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone)]
pub struct Message {
    pub role: MessageRole,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }
}

// =============================================================================
// StructuredAgent Trait
// =============================================================================

/// A chat model that can be constrained to answer with JSON matching a schema.
#[async_trait]
pub trait StructuredAgent: Send + Sync {
    /// Send `messages` and return the raw JSON text of the answer.
    async fn structured_json(
        &self,
        messages: &[Message],
        schema_name: &str,
        schema: serde_json::Value,
    ) -> Result<String>;

    fn model(&self) -> &str;
}

/// Typed structured extraction over any [`StructuredAgent`].
///
/// Answers that do not deserialize into `T` fail with [`crate::AiError::Parse`].
pub async fn extract<T: StructuredOutput>(
    agent: &dyn StructuredAgent,
    system_prompt: &str,
    user_prompt: &str,
) -> Result<T> {
    let messages = [Message::system(system_prompt), Message::user(user_prompt)];
    let json = agent
        .structured_json(&messages, &T::schema_name_for_wire(), T::openai_schema())
        .await?;
    decode(&json)
}

/// Deserialize a model answer, tolerating a markdown code fence around it.
pub fn decode<T: StructuredOutput>(raw: &str) -> Result<T> {
    serde_json::from_str(strip_code_blocks(raw)).map_err(|e| {
        crate::AiError::Parse(format!("{} does not match schema: {e}", T::type_name()))
    })
}
