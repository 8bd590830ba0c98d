#[cfg(feature = "ssr")]
use actix_web::{http::StatusCode, web, HttpResponse, ResponseError};
#[cfg(feature = "ssr")]
use serde::{Deserialize, Serialize};
#[cfg(feature = "ssr")]
use std::sync::Arc;
#[cfg(feature = "ssr")]
use tokio::sync::oneshot;
#[cfg(feature = "ssr")]
use tracing::{error, info, warn};

#[cfg(feature = "ssr")]
use crate::db::ReviewStore;
#[cfg(feature = "ssr")]
use crate::error::ReviewError;
#[cfg(feature = "ssr")]
use crate::llm::{examine_prompt, recommend_prompt, TextGenerator};
#[cfg(feature = "ssr")]
use crate::models::review::Review;
#[cfg(feature = "ssr")]
use crate::search::{suggest_movies, MovieSearch};
#[cfg(feature = "ssr")]
use crate::utils::CoalescingGate;

/// Shared state handed to every handler.
#[cfg(feature = "ssr")]
pub struct AppState {
    pub store: ReviewStore,
    pub gate: CoalescingGate<String>,
    pub search: Arc<dyn MovieSearch>,
    pub generator: Arc<dyn TextGenerator>,
}

#[cfg(feature = "ssr")]
impl AppState {
    pub fn new(
        store: ReviewStore,
        gate: CoalescingGate<String>,
        search: Arc<dyn MovieSearch>,
        generator: Arc<dyn TextGenerator>,
    ) -> Self {
        AppState {
            store,
            gate,
            search,
            generator,
        }
    }
}

#[cfg(feature = "ssr")]
#[derive(Serialize, Deserialize, Debug)]
pub struct StatusBody {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[cfg(feature = "ssr")]
impl StatusBody {
    fn ok(status: impl Into<String>) -> Self {
        StatusBody {
            status: status.into(),
            error: None,
        }
    }
}

#[cfg(feature = "ssr")]
impl ResponseError for ReviewError {
    fn status_code(&self) -> StatusCode {
        match self {
            ReviewError::NotFound(_) => StatusCode::NOT_FOUND,
            ReviewError::NotAuthored { .. } => StatusCode::FORBIDDEN,
            ReviewError::AlreadyExists(_) => StatusCode::CONFLICT,
            ReviewError::Validation(_) => StatusCode::BAD_REQUEST,
            ReviewError::External(_) => StatusCode::BAD_GATEWAY,
            ReviewError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        if status.is_server_error() {
            error!(error = %self, "request failed");
        } else {
            warn!(error = %self, "request rejected");
        }
        HttpResponse::build(status).json(StatusBody {
            status: status.canonical_reason().unwrap_or("Error").to_string(),
            error: Some(self.to_string()),
        })
    }
}

#[cfg(feature = "ssr")]
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct AddReviewRequest {
    pub author_id: String,
    pub movie: String,
    pub score: f64,
    #[serde(default)]
    pub comment: String,
}

#[cfg(feature = "ssr")]
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct AddMovieRequest {
    pub movie_name: String,
}

#[cfg(feature = "ssr")]
#[derive(Serialize, Deserialize, Debug)]
pub struct MovieReviews {
    pub movie_name: String,
    pub reviews: Vec<Review>,
}

#[cfg(feature = "ssr")]
#[derive(Serialize, Deserialize, Debug)]
pub struct MovieWithReviews {
    pub movie_name: String,
    pub average_score: f64,
    pub reviews: Vec<Review>,
}

#[cfg(feature = "ssr")]
#[derive(Serialize, Deserialize, Debug)]
pub struct DeleteReviewResponse {
    pub status: String,
    pub movie_removed: bool,
}

#[cfg(feature = "ssr")]
#[derive(Serialize, Deserialize, Debug)]
pub struct Examination {
    pub movie_name: String,
    pub examination: String,
}

#[cfg(feature = "ssr")]
#[derive(Serialize, Deserialize, Debug)]
pub struct Recommendation {
    pub recommendation: String,
}

// Every query parameter is optional at the extractor level so that a
// missing one turns into a ValidationError instead of actix's plain 400.
#[cfg(feature = "ssr")]
#[derive(Deserialize, Debug, Default)]
pub struct ApiQuery {
    pub user_id: Option<String>,
    pub author_id: Option<String>,
    pub movie_name: Option<String>,
    pub query: Option<String>,
    pub personal: Option<bool>,
}

#[cfg(feature = "ssr")]
fn required(name: &str, value: &Option<String>) -> Result<String, ReviewError> {
    match value.as_deref().map(str::trim) {
        Some(value) if !value.is_empty() => Ok(value.to_string()),
        _ => Err(ReviewError::Validation(format!("missing {} parameter", name))),
    }
}

/// Register every route on an actix app.
#[cfg(feature = "ssr")]
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/health", web::get().to(health))
        .route("/myreviews", web::get().to(get_reviews_by_author))
        .route("/allmovies", web::get().to(get_all_movies))
        .service(
            web::resource("/movie")
                .route(web::get().to(get_reviews_by_movie))
                .route(web::post().to(add_movie)),
        )
        .service(
            web::resource("/review")
                .route(web::post().to(add_review))
                .route(web::delete().to(delete_review)),
        )
        .route("/search", web::get().to(search_movies))
        .route("/examine", web::get().to(examine_movie))
        .route("/recommend", web::get().to(recommend_movies));
}

#[cfg(feature = "ssr")]
pub async fn health() -> HttpResponse {
    HttpResponse::Ok().json(StatusBody::ok("ok"))
}

#[cfg(feature = "ssr")]
pub async fn get_reviews_by_author(
    state: web::Data<AppState>,
    query: web::Query<ApiQuery>,
) -> Result<HttpResponse, ReviewError> {
    let user_id = required("user_id", &query.user_id)?;
    info!(user = %user_id, "[API] reviews by author requested");

    let mut grouped: Vec<MovieReviews> = Vec::new();
    for entry in state.store.get_reviews_by_user(&user_id).await? {
        match grouped.last_mut() {
            Some(group) if group.movie_name == entry.movie_name => group.reviews.push(entry.review),
            _ => grouped.push(MovieReviews {
                movie_name: entry.movie_name,
                reviews: vec![entry.review],
            }),
        }
    }

    Ok(HttpResponse::Ok().json(grouped))
}

#[cfg(feature = "ssr")]
pub async fn get_all_movies(state: web::Data<AppState>) -> Result<HttpResponse, ReviewError> {
    let movies = state.store.get_movies().await?;
    info!(count = movies.len(), "[API] returning all movies");
    Ok(HttpResponse::Ok().json(movies))
}

#[cfg(feature = "ssr")]
pub async fn get_reviews_by_movie(
    state: web::Data<AppState>,
    query: web::Query<ApiQuery>,
) -> Result<HttpResponse, ReviewError> {
    let movie_name = required("movie_name", &query.movie_name)?;
    let (reviews, average_score) = state.store.get_reviews(&movie_name).await?;
    info!(movie = %movie_name, count = reviews.len(), "[API] returning reviews");

    Ok(HttpResponse::Ok().json(MovieWithReviews {
        movie_name,
        average_score,
        reviews,
    }))
}

#[cfg(feature = "ssr")]
pub async fn add_review(
    state: web::Data<AppState>,
    request: web::Json<AddReviewRequest>,
) -> Result<HttpResponse, ReviewError> {
    let request = request.into_inner();
    info!(movie = %request.movie, author = %request.author_id, "[API] review submitted");

    let review = Review::new(request.author_id, request.score, request.comment);
    state.store.add_review(&request.movie, &review).await?;

    Ok(HttpResponse::Created().json(StatusBody::ok("Review added")))
}

#[cfg(feature = "ssr")]
pub async fn add_movie(
    state: web::Data<AppState>,
    request: web::Json<AddMovieRequest>,
) -> Result<HttpResponse, ReviewError> {
    state.store.add_movie(&request.movie_name).await?;
    Ok(HttpResponse::Created().json(StatusBody::ok("Movie added")))
}

#[cfg(feature = "ssr")]
pub async fn delete_review(
    state: web::Data<AppState>,
    query: web::Query<ApiQuery>,
) -> Result<HttpResponse, ReviewError> {
    let author_id = required("author_id", &query.author_id)?;
    let movie_name = required("movie_name", &query.movie_name)?;

    let movie_removed = state.store.retract_review(&movie_name, &author_id).await?;
    let status = if movie_removed {
        "Review deleted, movie removed because no reviews remain"
    } else {
        "Review deleted"
    };

    Ok(HttpResponse::Ok().json(DeleteReviewResponse {
        status: status.to_string(),
        movie_removed,
    }))
}

/// Search-as-you-type suggestions. Requests are coalesced per user: when a
/// newer request from the same user arrives within the settle interval this
/// one answers with an empty list.
#[cfg(feature = "ssr")]
pub async fn search_movies(
    state: web::Data<AppState>,
    query: web::Query<ApiQuery>,
) -> Result<HttpResponse, ReviewError> {
    let user_id = required("user_id", &query.user_id)?;
    let text = query.query.clone().unwrap_or_default();

    let (tx, rx) = oneshot::channel();
    let store = state.store.clone();
    let search = Arc::clone(&state.search);
    state.gate.trigger(user_id, async move {
        let names = suggest_movies(&store, search.as_ref(), &text).await;
        let _ = tx.send(names);
    });

    // A superseded action is dropped together with its sender
    let names: Vec<String> = rx.await.unwrap_or_default();
    Ok(HttpResponse::Ok().json(names))
}

#[cfg(feature = "ssr")]
pub async fn examine_movie(
    state: web::Data<AppState>,
    query: web::Query<ApiQuery>,
) -> Result<HttpResponse, ReviewError> {
    let movie_name = required("movie_name", &query.movie_name)?;
    let personal = query.personal.unwrap_or(false);

    // Movies nobody has reviewed yet can still be examined
    let (reviews, average) = match state.store.get_reviews(&movie_name).await {
        Ok(found) => found,
        Err(ReviewError::NotFound(_)) => (Vec::new(), 0.0),
        Err(err) => return Err(err),
    };

    let own = if personal {
        let author_id = required("author_id", &query.author_id)?;
        Some(state.store.get_reviews_by_user(&author_id).await?)
    } else {
        None
    };

    let prompt = examine_prompt(&movie_name, &reviews, average, own.as_deref());
    let examination = state.generator.generate(&prompt).await?;
    info!(movie = %movie_name, personal, "[API] examination generated");

    Ok(HttpResponse::Ok().json(Examination {
        movie_name,
        examination,
    }))
}

#[cfg(feature = "ssr")]
pub async fn recommend_movies(
    state: web::Data<AppState>,
    query: web::Query<ApiQuery>,
) -> Result<HttpResponse, ReviewError> {
    let personal = query.personal.unwrap_or(false);

    let rated: Vec<(String, f64)> = if personal {
        let author_id = required("author_id", &query.author_id)?;
        state
            .store
            .get_reviews_by_user(&author_id)
            .await?
            .into_iter()
            .map(|entry| (entry.movie_name, entry.review.score))
            .collect()
    } else {
        state
            .store
            .get_movies()
            .await?
            .into_iter()
            .map(|movie| (movie.movie_name, movie.average_score))
            .collect()
    };

    if rated.is_empty() {
        return Err(ReviewError::Validation(
            "no rated movies to base recommendations on".into(),
        ));
    }

    let recommendation = state.generator.generate(&recommend_prompt(&rated)).await?;
    info!(personal, based_on = rated.len(), "[API] recommendation generated");

    Ok(HttpResponse::Ok().json(Recommendation { recommendation }))
}
