use thiserror::Error;

/// Failures returned by the review store and its collaborators.
#[derive(Debug, Error)]
pub enum ReviewError {
    #[error("movie '{0}' does not exist")]
    NotFound(String),

    #[error("author '{author_id}' has not reviewed '{movie}'")]
    NotAuthored { movie: String, author_id: String },

    #[error("movie '{0}' already exists")]
    AlreadyExists(String),

    #[error("invalid input: {0}")]
    Validation(String),

    #[error("storage failure: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("external service failure: {0}")]
    External(String),
}

impl From<reqwest::Error> for ReviewError {
    fn from(err: reqwest::Error) -> Self {
        ReviewError::External(err.to_string())
    }
}
