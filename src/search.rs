use futures::future::{BoxFuture, FutureExt};
use tracing::{debug, warn};

use crate::db::{ReviewStore, SEARCH_LIMIT};
use crate::error::ReviewError;
use crate::models::movie::{TmdbMovie, TmdbResponse};

/// Votes a TMDB title needs before it is offered as a suggestion.
pub const MIN_VOTE_COUNT: u64 = 100;

/// External movie title lookup used to pad local search results.
pub trait MovieSearch: Send + Sync {
    fn search<'a>(
        &'a self,
        query: &'a str,
        max_results: usize,
    ) -> BoxFuture<'a, Result<Vec<String>, ReviewError>>;
}

/// Title search against the TMDB `search/movie` endpoint.
pub struct TmdbSearch {
    client: reqwest::Client,
    api_key: String,
    search_url: String,
}

impl TmdbSearch {
    pub fn new(client: reqwest::Client, api_key: impl Into<String>, search_url: impl Into<String>) -> Self {
        TmdbSearch {
            client,
            api_key: api_key.into(),
            search_url: search_url.into(),
        }
    }
}

impl MovieSearch for TmdbSearch {
    fn search<'a>(
        &'a self,
        query: &'a str,
        max_results: usize,
    ) -> BoxFuture<'a, Result<Vec<String>, ReviewError>> {
        async move {
            let response = self
                .client
                .get(&self.search_url)
                .query(&[("api_key", self.api_key.as_str()), ("query", query)])
                .send()
                .await?;

            let status = response.status();
            if !status.is_success() {
                return Err(ReviewError::External(format!(
                    "movie search answered with status {}",
                    status
                )));
            }

            let body: TmdbResponse = response.json().await?;
            Ok(popular_titles(body.results, max_results))
        }
        .boxed()
    }
}

/// Stand-in used when no search service is configured.
pub struct NoSearch;

impl MovieSearch for NoSearch {
    fn search<'a>(
        &'a self,
        _query: &'a str,
        _max_results: usize,
    ) -> BoxFuture<'a, Result<Vec<String>, ReviewError>> {
        async { Ok(Vec::new()) }.boxed()
    }
}

/// Keep well-known, non-adult titles, formatted for display.
pub fn popular_titles(movies: Vec<TmdbMovie>, max_results: usize) -> Vec<String> {
    movies
        .into_iter()
        .filter(|movie| movie.vote_count >= MIN_VOTE_COUNT && !movie.adult)
        .take(max_results)
        .map(|movie| movie.display_name())
        .collect()
}

/// Suggestions for a partially typed movie name: movies already reviewed
/// first, then external titles to fill up to [`SEARCH_LIMIT`]. Failures on
/// either side only shrink the result.
pub async fn suggest_movies(store: &ReviewStore, search: &dyn MovieSearch, query: &str) -> Vec<String> {
    let mut names = match store.search_movies(query).await {
        Ok(names) => names,
        Err(err) => {
            warn!(error = %err, "local movie search failed");
            Vec::new()
        }
    };

    let remaining = SEARCH_LIMIT.saturating_sub(names.len());
    if remaining > 0 && !query.trim().is_empty() {
        match search.search(query.trim(), remaining).await {
            Ok(external) => names.extend(external.into_iter().take(remaining)),
            Err(err) => warn!(error = %err, "external movie search failed"),
        }
    }

    debug!(query = %query, count = names.len(), "movie suggestions ready");
    names
}
