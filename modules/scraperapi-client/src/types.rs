use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::{Result, ScraperApiError};

/// Key under which the search endpoint returns its results. Its absence is
/// how the endpoint signals that the query is exhausted.
pub const RESULTS_KEY: &str = "organic_results";

/// Query parameters for one search page. Built once through [`SearchParams::new`],
/// then only the page cursor changes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchParams {
    query: String,
    date_range_start: NaiveDate,
    date_range_end: NaiveDate,
    page: u32,
}

impl SearchParams {
    pub fn new(
        query: impl Into<String>,
        date_range_start: NaiveDate,
        date_range_end: NaiveDate,
        page: u32,
    ) -> Result<Self> {
        let query = query.into();
        if query.trim().is_empty() {
            return Err(ScraperApiError::InvalidRequest("query must not be empty".into()));
        }
        if date_range_start > date_range_end {
            return Err(ScraperApiError::InvalidRequest(format!(
                "date_range_start {date_range_start} is after date_range_end {date_range_end}"
            )));
        }
        if page == 0 {
            return Err(ScraperApiError::InvalidRequest("pages are 1-based".into()));
        }
        Ok(Self {
            query,
            date_range_start,
            date_range_end,
            page,
        })
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn page(&self) -> u32 {
        self.page
    }

    pub(crate) fn wire<'a>(&'a self, api_key: &'a str) -> WireParams<'a> {
        WireParams {
            api_key,
            query: &self.query,
            date_range_start: self.date_range_start.format("%Y-%m-%d").to_string(),
            date_range_end: self.date_range_end.format("%Y-%m-%d").to_string(),
            page: self.page,
            format: "json",
        }
    }
}

/// Serialized form of [`SearchParams`] sent as the URL query string.
#[derive(Debug, Serialize)]
pub(crate) struct WireParams<'a> {
    pub api_key: &'a str,
    pub query: &'a str,
    pub date_range_start: String,
    pub date_range_end: String,
    pub page: u32,
    pub format: &'static str,
}

/// Classified body of a successful (2xx) search response.
#[derive(Debug, Clone, PartialEq)]
pub enum SearchPage {
    /// The results array, possibly empty. Each entry is kept verbatim.
    Results(Vec<serde_json::Value>),
    /// The body parsed but carried no results key.
    Exhausted,
}

/// Typed view over one entry of the results array. Every field is optional
/// because the upstream shape is not guaranteed.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct OrganicResult {
    pub position: Option<i64>,
    pub title: Option<String>,
    pub snippet: Option<String>,
    pub link: Option<String>,
    pub url: Option<String>,
}

impl OrganicResult {
    pub fn from_value(value: &serde_json::Value) -> Self {
        serde_json::from_value(value.clone()).unwrap_or_default()
    }

    /// Returns whichever permalink field is populated, preferring `link`.
    pub fn permalink(&self) -> Option<&str> {
        self.link.as_deref().or(self.url.as_deref())
    }
}

/// Classify a response body. A body that is not a JSON object, or whose
/// results key is not an array, is a decode error.
pub fn parse_search_body(body: &str) -> Result<SearchPage> {
    let value: serde_json::Value = serde_json::from_str(body)?;
    let serde_json::Value::Object(mut map) = value else {
        return Err(ScraperApiError::Decode(
            "expected a JSON object at the top level".into(),
        ));
    };

    match map.remove(RESULTS_KEY) {
        None => Ok(SearchPage::Exhausted),
        Some(serde_json::Value::Array(items)) => Ok(SearchPage::Results(items)),
        Some(other) => Err(ScraperApiError::Decode(format!(
            "{RESULTS_KEY} is not an array: {other}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn results_key_present_yields_items() {
        let body = r#"{"organic_results":[{"title":"a"},{"title":"b"}]}"#;
        match parse_search_body(body).unwrap() {
            SearchPage::Results(items) => assert_eq!(items.len(), 2),
            other => panic!("expected results, got {other:?}"),
        }
    }

    #[test]
    fn empty_results_are_not_exhaustion() {
        let page = parse_search_body(r#"{"organic_results":[]}"#).unwrap();
        assert_eq!(page, SearchPage::Results(vec![]));
    }

    #[test]
    fn missing_results_key_is_exhausted() {
        let page = parse_search_body(r#"{"search_information":{"total":0}}"#).unwrap();
        assert_eq!(page, SearchPage::Exhausted);
    }

    #[test]
    fn malformed_body_is_decode_error() {
        let err = parse_search_body("<html>502 Bad Gateway</html>").unwrap_err();
        assert!(matches!(err, ScraperApiError::Decode(_)));
        assert!(!err.is_http());
    }

    #[test]
    fn non_array_results_is_decode_error() {
        let err = parse_search_body(r#"{"organic_results":"oops"}"#).unwrap_err();
        assert!(matches!(err, ScraperApiError::Decode(_)));
    }

    #[test]
    fn params_are_validated_once() {
        assert!(SearchParams::new("", date("2024-03-10"), date("2024-03-15"), 1).is_err());
        assert!(SearchParams::new("fire", date("2024-03-16"), date("2024-03-15"), 1).is_err());
        assert!(SearchParams::new("fire", date("2024-03-10"), date("2024-03-15"), 0).is_err());
        let params = SearchParams::new("fire", date("2024-03-10"), date("2024-03-15"), 2).unwrap();
        assert_eq!(params.page(), 2);
    }

    #[test]
    fn wire_params_carry_all_fields() {
        let params = SearchParams::new("wildfire", date("2024-03-10"), date("2024-03-15"), 3).unwrap();
        let wire = serde_json::to_value(params.wire("key")).unwrap();
        assert_eq!(wire["api_key"], "key");
        assert_eq!(wire["query"], "wildfire");
        assert_eq!(wire["date_range_start"], "2024-03-10");
        assert_eq!(wire["date_range_end"], "2024-03-15");
        assert_eq!(wire["page"], 3);
        assert_eq!(wire["format"], "json");
    }

    #[test]
    fn organic_result_prefers_link() {
        let value = serde_json::json!({"title": "t", "link": "https://x.com/a/1", "url": "u"});
        let result = OrganicResult::from_value(&value);
        assert_eq!(result.permalink(), Some("https://x.com/a/1"));
        assert_eq!(result.title.as_deref(), Some("t"));
    }
}
