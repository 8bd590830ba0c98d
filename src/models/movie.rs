use serde::{Deserialize, Serialize};

use crate::error::ReviewError;

/// A movie name with its mean review score.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct MovieSummary {
    pub movie_name: String,
    pub average_score: f64,
}

/// Lookup key for a movie: trimmed and lower-cased.
pub fn canonical_name(name: &str) -> Result<String, ReviewError> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(ReviewError::Validation("movie name must not be empty".into()));
    }
    Ok(trimmed.to_lowercase())
}

// Response shapes of the TMDB movie search endpoint, only the fields we read.
#[derive(Deserialize, Debug, Clone)]
pub struct TmdbResponse {
    #[serde(default)]
    pub results: Vec<TmdbMovie>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct TmdbMovie {
    pub title: String,
    #[serde(default)]
    pub vote_count: u64,
    #[serde(default)]
    pub adult: bool,
    #[serde(default)]
    pub release_date: String,
}

impl TmdbMovie {
    /// "Title (Year)", the form offered to users as a suggestion.
    pub fn display_name(&self) -> String {
        let year = self.release_date.split('-').next().unwrap_or_default();
        format!("{} ({})", self.title, year)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_name_trims_and_lowercases() {
        assert_eq!(canonical_name("  The Matrix ").unwrap(), "the matrix");
    }

    #[test]
    fn canonical_name_rejects_blank() {
        assert!(matches!(
            canonical_name("   "),
            Err(ReviewError::Validation(_))
        ));
    }

    #[test]
    fn display_name_uses_release_year() {
        let movie = TmdbMovie {
            title: "Heat".into(),
            vote_count: 5000,
            adult: false,
            release_date: "1995-12-15".into(),
        };
        assert_eq!(movie.display_name(), "Heat (1995)");
    }
}
