use thiserror::Error;

pub type Result<T> = std::result::Result<T, ScraperApiError>;

#[derive(Debug, Error)]
pub enum ScraperApiError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl ScraperApiError {
    /// HTTP-level and transport failures. Decode failures are transient too,
    /// but callers pace them differently.
    pub fn is_http(&self) -> bool {
        matches!(self, ScraperApiError::Network(_) | ScraperApiError::Api { .. })
    }
}

/// The request URL carries the API key as a query parameter, so it is
/// stripped before the error is rendered.
impl From<reqwest::Error> for ScraperApiError {
    fn from(err: reqwest::Error) -> Self {
        ScraperApiError::Network(err.without_url().to_string())
    }
}

impl From<serde_json::Error> for ScraperApiError {
    fn from(err: serde_json::Error) -> Self {
        ScraperApiError::Decode(err.to_string())
    }
}
