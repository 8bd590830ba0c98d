#![cfg(feature = "ssr")]

use actix_web::{http::StatusCode, test, web, App};
use futures::future::{BoxFuture, FutureExt};
use reelnotes::api::{
    configure, AppState, DeleteReviewResponse, Examination, MovieReviews, MovieWithReviews,
    Recommendation,
};
use reelnotes::db::ReviewStore;
use reelnotes::error::ReviewError;
use reelnotes::llm::{DisabledGenerator, TextGenerator};
use reelnotes::search::MovieSearch;
use reelnotes::utils::CoalescingGate;
use reelnotes::MovieSummary;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

struct FixedSearch(Vec<&'static str>);

impl MovieSearch for FixedSearch {
    fn search<'a>(
        &'a self,
        _query: &'a str,
        max_results: usize,
    ) -> BoxFuture<'a, Result<Vec<String>, ReviewError>> {
        let titles = self.0.iter().take(max_results).map(|t| t.to_string()).collect();
        async move { Ok(titles) }.boxed()
    }
}

struct EchoGenerator;

impl TextGenerator for EchoGenerator {
    fn generate<'a>(&'a self, prompt: &'a str) -> BoxFuture<'a, Result<String, ReviewError>> {
        async move { Ok(format!("echo: {}", prompt)) }.boxed()
    }
}

// Helper function to build shared state around an in-memory store
async fn setup_state(generator: Arc<dyn TextGenerator>) -> web::Data<AppState> {
    setup_state_with_settle(generator, Duration::from_millis(20)).await
}

async fn setup_state_with_settle(
    generator: Arc<dyn TextGenerator>,
    settle: Duration,
) -> web::Data<AppState> {
    let store = ReviewStore::open_in_memory().await.unwrap();
    web::Data::new(AppState::new(
        store,
        CoalescingGate::new(settle),
        Arc::new(FixedSearch(vec!["Star Trek (1979)", "Stardust (2007)"])),
        generator,
    ))
}

fn review_request(author: &str, movie: &str, score: f64) -> test::TestRequest {
    test::TestRequest::post().uri("/review").set_json(json!({
        "author_id": author,
        "movie": movie,
        "score": score,
        "comment": "seen it"
    }))
}

#[actix_web::test]
async fn test_health() {
    let state = setup_state(Arc::new(EchoGenerator)).await;
    let app = test::init_service(App::new().app_data(state).configure(configure)).await;

    let resp = test::call_service(&app, test::TestRequest::get().uri("/health").to_request()).await;
    assert_eq!(resp.status(), StatusCode::OK);
}

#[actix_web::test]
async fn test_review_round_trip_through_http() {
    let state = setup_state(Arc::new(EchoGenerator)).await;
    let app = test::init_service(App::new().app_data(state).configure(configure)).await;

    for (author, score) in [("u1", 8.0), ("u2", 6.0)] {
        let resp = test::call_service(&app, review_request(author, "Heat", score).to_request()).await;
        assert_eq!(resp.status(), StatusCode::CREATED);
    }

    let movie: MovieWithReviews = test::call_and_read_body_json(
        &app,
        test::TestRequest::get().uri("/movie?movie_name=heat").to_request(),
    )
    .await;
    assert_eq!(movie.reviews.len(), 2);
    assert_eq!(movie.average_score, 7.0);

    let all: Vec<MovieSummary> = test::call_and_read_body_json(
        &app,
        test::TestRequest::get().uri("/allmovies").to_request(),
    )
    .await;
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].movie_name, "heat");

    let mine: Vec<MovieReviews> = test::call_and_read_body_json(
        &app,
        test::TestRequest::get().uri("/myreviews?user_id=u1").to_request(),
    )
    .await;
    assert_eq!(mine.len(), 1);
    assert_eq!(mine[0].reviews[0].score, 8.0);
}

#[actix_web::test]
async fn test_errors_map_to_status_codes() {
    let state = setup_state(Arc::new(DisabledGenerator)).await;
    let app = test::init_service(App::new().app_data(state).configure(configure)).await;

    // Out of range score
    let resp = test::call_service(&app, review_request("u1", "heat", 11.0).to_request()).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    // Unknown movie
    let resp = test::call_service(
        &app,
        test::TestRequest::get().uri("/movie?movie_name=nope").to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    // Duplicate movie
    let add = || test::TestRequest::post().uri("/movie").set_json(json!({ "movie_name": "Ronin" }));
    assert_eq!(test::call_service(&app, add().to_request()).await.status(), StatusCode::CREATED);
    assert_eq!(test::call_service(&app, add().to_request()).await.status(), StatusCode::CONFLICT);

    // Deleting someone else's review
    test::call_service(&app, review_request("u1", "heat", 7.0).to_request()).await;
    let resp = test::call_service(
        &app,
        test::TestRequest::delete()
            .uri("/review?author_id=u2&movie_name=heat")
            .to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);

    // No generator configured
    let resp = test::call_service(
        &app,
        test::TestRequest::get().uri("/examine?movie_name=heat").to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::BAD_GATEWAY);
}

#[actix_web::test]
async fn test_missing_parameters_are_rejected() {
    let state = setup_state(Arc::new(EchoGenerator)).await;
    let app = test::init_service(App::new().app_data(state).configure(configure)).await;

    for uri in ["/myreviews", "/movie", "/search?query=x", "/examine", "/recommend?personal=true"] {
        let resp = test::call_service(&app, test::TestRequest::get().uri(uri).to_request()).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST, "{}", uri);
    }
}

#[actix_web::test]
async fn test_deleting_last_review_removes_movie() {
    let state = setup_state(Arc::new(EchoGenerator)).await;
    let app = test::init_service(App::new().app_data(state.clone()).configure(configure)).await;

    test::call_service(&app, review_request("u1", "heat", 8.0).to_request()).await;
    test::call_service(&app, review_request("u2", "heat", 5.0).to_request()).await;

    let delete = |author: &str| {
        test::TestRequest::delete()
            .uri(&format!("/review?author_id={}&movie_name=heat", author))
            .to_request()
    };

    let first: DeleteReviewResponse = test::call_and_read_body_json(&app, delete("u1")).await;
    assert!(!first.movie_removed);

    let second: DeleteReviewResponse = test::call_and_read_body_json(&app, delete("u2")).await;
    assert!(second.movie_removed);
    assert!(state.store.get_movies().await.unwrap().is_empty());
}

#[actix_web::test]
async fn test_search_puts_local_movies_first() {
    let state = setup_state(Arc::new(EchoGenerator)).await;
    state.store.add_movie("Star Wars").await.unwrap();
    let app = test::init_service(App::new().app_data(state).configure(configure)).await;

    let names: Vec<String> = test::call_and_read_body_json(
        &app,
        test::TestRequest::get().uri("/search?user_id=u1&query=star").to_request(),
    )
    .await;

    assert_eq!(
        names,
        vec![
            "star wars".to_string(),
            "Star Trek (1979)".to_string(),
            "Stardust (2007)".to_string()
        ]
    );
}

#[actix_web::test]
async fn test_superseded_search_answers_empty() {
    let state = setup_state_with_settle(Arc::new(EchoGenerator), Duration::from_millis(200)).await;
    let app = test::init_service(App::new().app_data(state).configure(configure)).await;

    let search = |query: &str| {
        test::TestRequest::get()
            .uri(&format!("/search?user_id=u1&query={}", query))
            .to_request()
    };

    let (first, second) = futures::join!(
        test::call_and_read_body_json::<_, _, Vec<String>>(&app, search("sta")),
        test::call_and_read_body_json::<_, _, Vec<String>>(&app, search("star")),
    );

    // Only one of the two coalesced requests carries results
    assert_eq!(first.is_empty() as u8 + second.is_empty() as u8, 1);
}

#[actix_web::test]
async fn test_examine_and_recommend_use_stored_reviews() {
    let state = setup_state(Arc::new(EchoGenerator)).await;
    let app = test::init_service(App::new().app_data(state).configure(configure)).await;
    test::call_service(&app, review_request("u1", "heat", 9.0).to_request()).await;
    test::call_service(&app, review_request("u1", "alien", 4.0).to_request()).await;

    let examination: Examination = test::call_and_read_body_json(
        &app,
        test::TestRequest::get()
            .uri("/examine?movie_name=heat&personal=true&author_id=u1")
            .to_request(),
    )
    .await;
    assert!(examination.examination.contains("\"heat\""));
    assert!(examination.examination.contains("- alien: 4.0"));

    let recommendation: Recommendation = test::call_and_read_body_json(
        &app,
        test::TestRequest::get().uri("/recommend").to_request(),
    )
    .await;
    assert!(recommendation.recommendation.contains("- heat: 9.0"));
    assert!(recommendation.recommendation.contains("- alien: 4.0"));
}

#[actix_web::test]
async fn test_recommend_without_ratings_is_rejected() {
    let state = setup_state(Arc::new(EchoGenerator)).await;
    let app = test::init_service(App::new().app_data(state).configure(configure)).await;

    let resp = test::call_service(&app, test::TestRequest::get().uri("/recommend").to_request()).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}
