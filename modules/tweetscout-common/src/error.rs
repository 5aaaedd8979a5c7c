use thiserror::Error;

#[derive(Error, Debug)]
pub enum TweetscoutError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid logical path: {0}")]
    LogicalPath(String),
}
