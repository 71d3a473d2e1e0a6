use std::{collections::HashMap, net::SocketAddr, process, sync::Arc};

use axum::Router;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use raffica::{
    admission::{IpBlocklist, RateLimiter},
    analytics::AnalyticsRecorder,
    cache::{AdaptiveStrategy, BreakerRegistry, CacheClient, TrafficMonitor},
    config::{self, KvBackend},
    domain::freshness::Freshness,
    error::AppError,
    infra::{
        http::{self, EdgeState},
        kv::{KvStore, MemoryStore, RedisStore},
        telemetry,
    },
    util::clock::{Clock, SystemClock},
};
use serde::{Deserialize, Serialize};
use tracing::{Dispatch, Level, dispatcher, error, info};
use tracing_subscriber::fmt as tracing_fmt;

const TARGET: &str = "raffica::main";

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(1);
    }
}

fn report_application_error(error: &AppError) {
    if dispatcher::has_been_set() {
        error!(error = %error, "application error");
        return;
    }

    let subscriber = tracing_fmt().with_max_level(Level::ERROR).finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli()?;

    let command = cli_args
        .command
        .unwrap_or(config::Command::Serve(Box::<config::ServeArgs>::default()));

    telemetry::init(&settings.logging)?;

    match command {
        config::Command::Serve(_) => run_serve(settings).await,
    }
}

async fn run_serve(settings: config::Settings) -> Result<(), AppError> {
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let store = init_store(&settings, clock.clone()).await?;

    let cache = Arc::new(CacheClient::new(store.clone(), clock.clone()));
    let monitor = Arc::new(TrafficMonitor::new(
        cache.clone(),
        (&settings.traffic).into(),
        clock.clone(),
    ));
    let strategy = Arc::new(AdaptiveStrategy::new(
        cache.clone(),
        monitor.clone(),
        (&settings.strategy).into(),
    ));
    let limiter = Arc::new(RateLimiter::new(store.clone(), clock.clone()));
    let blocklist = Arc::new(IpBlocklist::new(store, (&settings.blocklist).into()));
    let analytics = Arc::new(AnalyticsRecorder::new(
        cache.clone(),
        (&settings.analytics).into(),
    ));
    let breakers = Arc::new(BreakerRegistry::new(
        (&settings.breaker).into(),
        clock.clone(),
    ));

    let edge_state = EdgeState {
        limiter,
        policies: Arc::new(settings.rate_limit.policies()),
        blocklist,
        strategy: strategy.clone(),
        monitor,
        analytics: analytics.clone(),
        settings: settings.edge.clone(),
    };

    let content_state = ContentState {
        strategy,
        breakers,
        catalog: Arc::new(sample_catalog()),
    };
    let router = http::build_router(edge_state, content_router(content_state));

    // Background flush keeps the view queue bounded between requests.
    let flush_handle = tokio::spawn({
        let analytics = analytics.clone();
        async move {
            let mut interval = tokio::time::interval(analytics.flush_interval());
            interval.tick().await; // skip the immediate first tick
            loop {
                interval.tick().await;
                analytics.flush().await;
            }
        }
    });

    let listener = tokio::net::TcpListener::bind(settings.server.addr)
        .await
        .map_err(AppError::Server)?;
    info!(target: TARGET, addr = %settings.server.addr, "listening");

    let result = axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .map_err(AppError::Server);

    flush_handle.abort();
    let _ = flush_handle.await;

    // Drain whatever arrived after the last scheduled flush.
    let _ = tokio::time::timeout(settings.server.graceful_shutdown, analytics.flush()).await;

    result
}

async fn init_store(
    settings: &config::Settings,
    clock: Arc<dyn Clock>,
) -> Result<Arc<dyn KvStore>, AppError> {
    match settings.kv.backend {
        KvBackend::Memory => {
            info!(target: TARGET, "using in-process key-value backend");
            Ok(Arc::new(MemoryStore::new(clock)))
        }
        KvBackend::Redis => {
            // Validated at load time; redis backend always carries a URL.
            let url = settings.kv.redis_url.as_deref().unwrap_or_default();
            let store = RedisStore::connect(url)
                .await
                .map_err(raffica::infra::error::InfraError::from)?;
            info!(target: TARGET, "connected to redis backend");
            Ok(Arc::new(store))
        }
    }
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!(target: TARGET, error = %err, "failed to install shutdown handler");
        return;
    }
    info!(target: TARGET, "shutdown signal received");
}

/// Sample content routes exercising the adaptive read path. A real
/// deployment replaces these with its own handlers behind the same
/// edge stack.
#[derive(Clone)]
struct ContentState {
    strategy: Arc<AdaptiveStrategy>,
    breakers: Arc<BreakerRegistry>,
    catalog: Arc<HashMap<String, Article>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Article {
    slug: String,
    title: String,
    body: String,
}

fn sample_catalog() -> HashMap<String, Article> {
    [
        ("hello-world", "Hello, world", "The first post."),
        ("about", "About this site", "A demo origin for the edge cache."),
    ]
    .into_iter()
    .map(|(slug, title, body)| {
        (
            slug.to_string(),
            Article {
                slug: slug.to_string(),
                title: title.to_string(),
                body: body.to_string(),
            },
        )
    })
    .collect()
}

fn content_router(state: ContentState) -> Router {
    Router::new()
        .route("/posts", get(list_posts))
        .route("/posts/{slug}", get(show_post))
        .with_state(state)
}

async fn list_posts(State(state): State<ContentState>) -> Json<Vec<String>> {
    let mut slugs: Vec<String> = state.catalog.keys().cloned().collect();
    slugs.sort();
    Json(slugs)
}

async fn show_post(State(state): State<ContentState>, Path(slug): Path<String>) -> Response {
    let Some(article) = state.catalog.get(&slug).cloned() else {
        return StatusCode::NOT_FOUND.into_response();
    };

    let breaker = state.breakers.breaker("origin:posts");
    let fetched = state
        .strategy
        .get_with_fallback(&format!("posts:{slug}"), Freshness::Warm, move || async move {
            breaker
                .call(|| async move { Ok::<_, std::convert::Infallible>(article) })
                .await
                .ok_or("origin unavailable")
        })
        .await;

    match fetched {
        Some(article) => Json::<Article>(article).into_response(),
        None => StatusCode::SERVICE_UNAVAILABLE.into_response(),
    }
}
