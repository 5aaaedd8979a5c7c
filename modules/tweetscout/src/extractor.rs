use std::sync::Arc;

use ai_client::{extract, truncate_to_char_boundary, StructuredAgent};
use async_trait::async_trait;
use schemars::JsonSchema;
use serde::Deserialize;
use tracing::{debug, warn};
use tweetscout_common::{ExtractedFacts, Month, RawItem};

use crate::error::ExtractionError;
use crate::traits::FactExtractor;

/// Longest item text sent to the model, in bytes.
const MAX_ITEM_BYTES: usize = 4_000;

const FILTER_SYSTEM_PROMPT: &str = "You classify social media posts. \
Answer whether the post reports on the given topic. \
Posts that only mention the topic in passing, jokes and advertisements are not relevant.";

const EXTRACT_SYSTEM_PROMPT: &str = "You extract facts from a social media post about a disaster. \
Return the city and country where it happened, the year as a four-digit integer, \
the month by its full English name, the day of month as a two-digit string from \"01\" to \"31\", \
and a short disaster category such as wildfire, flood, earthquake or storm. \
When the post does not state the date, use the date it refers to most plausibly.";

const RELAXED_SYSTEM_PROMPT: &str = "You extract facts from a social media post about a disaster. \
Fill every field with your best reading of the post: city, country, year, month, day and disaster type.";

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ExtractorSettings {
    /// Retry a failed extraction once with a looser schema.
    pub fallback_prompt: bool,
}

/// Relevance answer from the model.
#[derive(Debug, Deserialize, JsonSchema)]
pub struct RelevanceVerdict {
    /// True when the post reports on the topic
    pub is_relevant: bool,
}

/// Loose facts from the fallback prompt, normalised before use.
#[derive(Debug, Deserialize, JsonSchema)]
pub struct RelaxedFacts {
    pub city: String,
    pub country: String,
    pub year: String,
    pub month: String,
    pub day: String,
    pub disaster_type: String,
}

impl RelaxedFacts {
    pub fn normalize(self) -> Result<ExtractedFacts, ExtractionError> {
        let year = self
            .year
            .trim()
            .parse::<i32>()
            .map_err(|_| ExtractionError::SchemaViolation(format!("year '{}'", self.year)))?;
        let month = Month::parse_loose(&self.month)
            .ok_or_else(|| ExtractionError::SchemaViolation(format!("month '{}'", self.month)))?;
        let day = match self.day.trim().parse::<u32>() {
            Ok(d) => format!("{d:02}"),
            Err(_) => {
                return Err(ExtractionError::SchemaViolation(format!("day '{}'", self.day)));
            }
        };

        let facts = ExtractedFacts {
            city: self.city.trim().to_string(),
            country: self.country.trim().to_string(),
            year,
            month,
            day,
            disaster_type: self.disaster_type.trim().to_string(),
        };
        facts.validate()?;
        Ok(facts)
    }
}

/// Render an item the way every prompt sees it.
pub fn format_item_text(item: &RawItem) -> String {
    let mut text = format!(
        "Title: {}\nTweet: {}\nAuthor: @{}",
        item.title, item.content, item.author_handle
    );
    if let Some(link) = &item.permalink {
        text.push_str("\nLink: ");
        text.push_str(link);
    }
    truncate_to_char_boundary(&text, MAX_ITEM_BYTES).to_string()
}

pub struct LlmExtractor {
    agent: Arc<dyn StructuredAgent>,
    settings: ExtractorSettings,
}

impl LlmExtractor {
    pub fn new(agent: Arc<dyn StructuredAgent>, settings: ExtractorSettings) -> Self {
        Self { agent, settings }
    }

    async fn extract_relaxed(&self, item_text: &str) -> Result<ExtractedFacts, ExtractionError> {
        let relaxed: RelaxedFacts =
            extract(self.agent.as_ref(), RELAXED_SYSTEM_PROMPT, item_text).await?;
        relaxed.normalize()
    }
}

#[async_trait]
impl FactExtractor for LlmExtractor {
    async fn is_relevant(&self, item_text: &str, topic: &str) -> Result<bool, ExtractionError> {
        let user = format!("Topic: {topic}\n\n{item_text}");
        let verdict: RelevanceVerdict =
            extract(self.agent.as_ref(), FILTER_SYSTEM_PROMPT, &user).await?;
        debug!(topic, is_relevant = verdict.is_relevant, "Relevance verdict");
        Ok(verdict.is_relevant)
    }

    async fn extract_facts(&self, item_text: &str) -> Result<ExtractedFacts, ExtractionError> {
        let strict = extract::<ExtractedFacts>(self.agent.as_ref(), EXTRACT_SYSTEM_PROMPT, item_text)
            .await
            .map_err(ExtractionError::from)
            .and_then(|facts| {
                facts.validate()?;
                Ok(facts)
            });

        match strict {
            Err(ExtractionError::SchemaViolation(reason)) if self.settings.fallback_prompt => {
                warn!(model = self.agent.model(), %reason, "Strict extraction failed, trying relaxed prompt");
                self.extract_relaxed(item_text).await
            }
            other => other,
        }
    }
}
