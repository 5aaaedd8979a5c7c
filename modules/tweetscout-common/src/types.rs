use std::fmt;
use std::sync::LazyLock;

use chrono::NaiveDate;
use regex::Regex;
use schemars::JsonSchema;
use serde::ser::SerializeStruct;
use serde::{Deserialize, Serialize, Serializer};

use crate::error::TweetscoutError;

// --- Search query ---

/// One search over a query and a closed date range, positioned at a page.
///
/// Validated once in [`SearchQuery::new`]; moving to another page produces a
/// new value and never mutates the original.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchQuery {
    query: String,
    start_date: NaiveDate,
    end_date: NaiveDate,
    page: u32,
}

impl SearchQuery {
    pub fn new(
        query: impl Into<String>,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<Self, TweetscoutError> {
        let query = query.into();
        if query.trim().is_empty() {
            return Err(TweetscoutError::Validation("query must not be empty".into()));
        }
        if start_date > end_date {
            return Err(TweetscoutError::Validation(format!(
                "start date {start_date} is after end date {end_date}"
            )));
        }
        Ok(Self {
            query,
            start_date,
            end_date,
            page: 1,
        })
    }

    /// Parse `YYYY-MM-DD` dates, then validate as [`SearchQuery::new`] does.
    pub fn parse(query: impl Into<String>, start: &str, end: &str) -> Result<Self, TweetscoutError> {
        let parse = |s: &str| {
            NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
                .map_err(|e| TweetscoutError::Validation(format!("invalid date '{s}': {e}")))
        };
        Self::new(query, parse(start)?, parse(end)?)
    }

    pub fn at_page(&self, page: u32) -> Self {
        Self {
            page: page.max(1),
            ..self.clone()
        }
    }

    pub fn next_page(&self) -> Self {
        self.at_page(self.page + 1)
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn start_date(&self) -> NaiveDate {
        self.start_date
    }

    pub fn end_date(&self) -> NaiveDate {
        self.end_date
    }

    pub fn page(&self) -> u32 {
        self.page
    }
}

// --- Raw items ---

/// Handle used when a post's text carries no `@handle` token.
pub const UNKNOWN_AUTHOR: &str = "unknown";

static RE_HANDLE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"@([A-Za-z0-9_]{1,15})").unwrap());

/// One fetched post. `original` is the provider's entry, kept verbatim for
/// the raw artifact.
#[derive(Debug, Clone, PartialEq)]
pub struct RawItem {
    pub title: String,
    pub content: String,
    pub permalink: Option<String>,
    pub author_handle: String,
    pub original: serde_json::Value,
}

impl RawItem {
    pub fn new(
        title: impl Into<String>,
        content: impl Into<String>,
        permalink: Option<String>,
        original: serde_json::Value,
    ) -> Self {
        let content = content.into();
        let author_handle = author_handle(&content);
        Self {
            title: title.into(),
            content,
            permalink,
            author_handle,
            original,
        }
    }
}

/// First `@handle` token in `text`, or [`UNKNOWN_AUTHOR`].
pub fn author_handle(text: &str) -> String {
    RE_HANDLE
        .captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
        .unwrap_or_else(|| UNKNOWN_AUTHOR.to_string())
}

// --- Extraction ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub enum Month {
    January,
    February,
    March,
    April,
    May,
    June,
    July,
    August,
    September,
    October,
    November,
    December,
}

impl Month {
    pub const ALL: [Month; 12] = [
        Month::January,
        Month::February,
        Month::March,
        Month::April,
        Month::May,
        Month::June,
        Month::July,
        Month::August,
        Month::September,
        Month::October,
        Month::November,
        Month::December,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Month::January => "January",
            Month::February => "February",
            Month::March => "March",
            Month::April => "April",
            Month::May => "May",
            Month::June => "June",
            Month::July => "July",
            Month::August => "August",
            Month::September => "September",
            Month::October => "October",
            Month::November => "November",
            Month::December => "December",
        }
    }

    /// 1-based month number.
    pub fn number(&self) -> u32 {
        Month::ALL.iter().position(|m| m == self).unwrap_or(0) as u32 + 1
    }

    /// Case-insensitive match on the full name, its three-letter abbreviation,
    /// or a month number.
    pub fn parse_loose(s: &str) -> Option<Month> {
        let s = s.trim();
        if let Ok(n) = s.parse::<usize>() {
            return (1..=12).contains(&n).then(|| Month::ALL[n - 1]);
        }
        let lower = s.to_lowercase();
        Month::ALL.into_iter().find(|m| {
            let name = m.name().to_lowercase();
            name == lower || (lower.len() == 3 && name.starts_with(&lower))
        })
    }
}

impl fmt::Display for Month {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// What the LLM returns for a relevant post.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ExtractedFacts {
    /// City where the event took place
    pub city: String,
    /// Country where the event took place
    pub country: String,
    /// Four-digit year of the event
    pub year: i32,
    /// Month of the event
    pub month: Month,
    /// Two-digit zero-padded day of month, "01" to "31"
    pub day: String,
    /// Disaster category, e.g. "wildfire", "flood", "earthquake"
    pub disaster_type: String,
}

impl ExtractedFacts {
    /// Checks the constraints strict JSON schema cannot express.
    pub fn validate(&self) -> Result<(), TweetscoutError> {
        if self.city.trim().is_empty() || self.country.trim().is_empty() {
            return Err(TweetscoutError::Validation("city and country are required".into()));
        }
        if !is_two_digit_day(&self.day) {
            return Err(TweetscoutError::Validation(format!(
                "day must be a two-digit string 01..31, got '{}'",
                self.day
            )));
        }
        if !(1000..=9999).contains(&self.year) {
            return Err(TweetscoutError::Validation(format!(
                "year must have four digits, got {}",
                self.year
            )));
        }
        if self.disaster_type.trim().is_empty() {
            return Err(TweetscoutError::Validation("disaster_type is required".into()));
        }
        Ok(())
    }

    /// `"<city>,<country>"`, the string handed to the geocoder.
    pub fn location(&self) -> String {
        format!("{},{}", self.city.trim(), self.country.trim())
    }
}

fn is_two_digit_day(day: &str) -> bool {
    day.len() == 2
        && day.bytes().all(|b| b.is_ascii_digit())
        && matches!(day.parse::<u32>(), Ok(1..=31))
}

// --- Geocoding ---

/// Serialized in place of a coordinate the geocoder could not resolve.
pub const UNRESOLVED: &str = "unresolved";

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GeoPoint {
    Resolved { latitude: f64, longitude: f64 },
    Unresolved,
}

impl GeoPoint {
    pub fn is_resolved(&self) -> bool {
        matches!(self, GeoPoint::Resolved { .. })
    }

    pub fn latitude_value(&self) -> serde_json::Value {
        match self {
            GeoPoint::Resolved { latitude, .. } => serde_json::json!(latitude),
            GeoPoint::Unresolved => serde_json::Value::String(UNRESOLVED.into()),
        }
    }

    pub fn longitude_value(&self) -> serde_json::Value {
        match self {
            GeoPoint::Resolved { longitude, .. } => serde_json::json!(longitude),
            GeoPoint::Unresolved => serde_json::Value::String(UNRESOLVED.into()),
        }
    }
}

// --- Enriched records ---

/// Column names of the augmented table, in output order.
pub const TABLE_COLUMNS: [&str; 9] = [
    "Title",
    "Tweet",
    "Extracted_Location",
    "Resolved_Latitude",
    "Resolved_Longitude",
    "Month",
    "Day",
    "Year",
    "Disaster_Type",
];

/// One row of the augmented table: a post that passed filter, extraction and
/// geocoding.
#[derive(Debug, Clone, PartialEq)]
pub struct EnrichedRecord {
    pub title: String,
    pub content: String,
    pub location: String,
    pub geo: GeoPoint,
    pub month: Month,
    pub day: String,
    pub year: i32,
    pub disaster_type: String,
}

impl EnrichedRecord {
    pub fn new(item: &RawItem, facts: ExtractedFacts, geo: GeoPoint) -> Self {
        Self {
            title: item.title.clone(),
            content: item.content.clone(),
            location: facts.location(),
            geo,
            month: facts.month,
            day: facts.day,
            year: facts.year,
            disaster_type: facts.disaster_type,
        }
    }
}

impl Serialize for EnrichedRecord {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let [title, tweet, location, lat, lng, month, day, year, disaster] = TABLE_COLUMNS;
        let mut row = serializer.serialize_struct("EnrichedRecord", TABLE_COLUMNS.len())?;
        row.serialize_field(title, &self.title)?;
        row.serialize_field(tweet, &self.content)?;
        row.serialize_field(location, &self.location)?;
        row.serialize_field(lat, &self.geo.latitude_value())?;
        row.serialize_field(lng, &self.geo.longitude_value())?;
        row.serialize_field(month, self.month.name())?;
        row.serialize_field(day, &self.day)?;
        row.serialize_field(year, &self.year)?;
        row.serialize_field(disaster, &self.disaster_type)?;
        row.end()
    }
}
