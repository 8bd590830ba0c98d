// src/models/review.rs
use serde::{Deserialize, Serialize};

/// Longest comment accepted on a review, counted in characters.
pub const MAX_COMMENT_LEN: usize = 150;
/// Inclusive bounds for a review score.
pub const MIN_SCORE: f64 = 0.0;
pub const MAX_SCORE: f64 = 10.0;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Review {
    pub author_id: String, // Opaque id of the user who wrote the review
    pub score: f64,        // Score in [MIN_SCORE, MAX_SCORE]
    pub comment: String,   // Short free-text comment
}

impl Review {
    pub fn new(author_id: impl Into<String>, score: f64, comment: impl Into<String>) -> Self {
        Review {
            author_id: author_id.into(),
            score,
            comment: comment.into(),
        }
    }
}

/// A review together with the movie it belongs to, as returned by
/// per-user lookups.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct UserReview {
    pub movie_name: String,
    pub review: Review,
}

/// Arithmetic mean of the review scores. An empty slice averages to 0.
pub fn average_score(reviews: &[Review]) -> f64 {
    if reviews.is_empty() {
        return 0.0;
    }
    let total: f64 = reviews.iter().map(|review| review.score).sum();
    total / reviews.len() as f64
}
