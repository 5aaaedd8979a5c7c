mod client;
pub(crate) mod schema;
pub(crate) mod types;

pub use schema::StructuredOutput;

use std::time::Duration;

use async_trait::async_trait;

use crate::error::Result;
use crate::traits::{Message, StructuredAgent};

use client::OpenAiClient;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// OpenAI chat completions with `json_schema` response formats.
#[derive(Clone)]
pub struct OpenAi {
    api_key: String,
    model: String,
    base_url: String,
    timeout: Duration,
    client: OpenAiClient,
}

impl OpenAi {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        let api_key = api_key.into();
        Self {
            client: OpenAiClient::new(&api_key, DEFAULT_TIMEOUT),
            api_key,
            model: model.into(),
            base_url: client::OPENAI_API_URL.to_string(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Point at an OpenAI-compatible endpoint instead of api.openai.com.
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self.rebuild()
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self.rebuild()
    }

    fn rebuild(mut self) -> Self {
        self.client = OpenAiClient::new(&self.api_key, self.timeout).with_base_url(&self.base_url);
        self
    }
}

#[async_trait]
impl StructuredAgent for OpenAi {
    async fn structured_json(
        &self,
        messages: &[Message],
        schema_name: &str,
        schema: serde_json::Value,
    ) -> Result<String> {
        let request = types::StructuredRequest::new(&self.model, messages, schema_name, schema);
        self.client.structured_output(&request).await
    }

    fn model(&self) -> &str {
        &self.model
    }
}
