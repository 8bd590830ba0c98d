#[cfg(feature = "ssr")]
#[actix_web::main]
async fn main() -> std::io::Result<()> {
    use actix_web::{middleware, web, App, HttpServer};
    use reelnotes::api::{configure, AppState};
    use reelnotes::config::Config;
    use reelnotes::db::ReviewStore;
    use reelnotes::llm::{ChatCompletionClient, DisabledGenerator, TextGenerator};
    use reelnotes::search::{MovieSearch, NoSearch, TmdbSearch};
    use reelnotes::utils::CoalescingGate;
    use std::io;
    use std::sync::Arc;
    use tracing::info;
    use tracing_subscriber::EnvFilter;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Config::from_env();

    // Without a working store there is nothing to serve
    let store = ReviewStore::open(&config.db_path).await.map_err(io::Error::other)?;

    let http = reqwest::Client::builder()
        .timeout(config.http_timeout)
        .build()
        .map_err(io::Error::other)?;

    let search: Arc<dyn MovieSearch> = if config.search_enabled() {
        Arc::new(TmdbSearch::new(
            http.clone(),
            config.tmdb_api_key.clone(),
            config.tmdb_search_url.clone(),
        ))
    } else {
        info!("TMDB_API_KEY not set, suggestions come from stored movies only");
        Arc::new(NoSearch)
    };

    let generator: Arc<dyn TextGenerator> = if config.generation_enabled() {
        Arc::new(ChatCompletionClient::new(
            http,
            config.llm_api_url.clone(),
            config.llm_api_key.clone(),
            config.llm_model.clone(),
        ))
    } else {
        info!("LLM_API_URL not set, examine and recommend are disabled");
        Arc::new(DisabledGenerator)
    };

    let state = web::Data::new(AppState::new(
        store,
        CoalescingGate::new(config.settle_interval),
        search,
        generator,
    ));

    info!(addr = %config.bind_addr, "listening");

    HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .wrap(middleware::Logger::default())
            .configure(configure)
    })
    .bind(&config.bind_addr)?
    .run()
    .await
}

#[cfg(not(feature = "ssr"))]
pub fn main() {
    // The binary only serves HTTP; build with the `ssr` feature to run it.
    // The library (store, gate, clients) is usable without it.
}
