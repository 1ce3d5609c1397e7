use std::net::{IpAddr, SocketAddr};
use std::num::NonZeroU32;
use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use axum::{
    body::Body,
    extract::connect_info::ConnectInfo,
    extract::DefaultBodyLimit,
    extract::State,
    http::header::{HeaderName, HeaderValue, AUTHORIZATION, CONTENT_TYPE},
    http::Method,
    http::Request,
    middleware,
    middleware::Next,
    response::Response,
    routing::{get, post},
    Router,
};
use clap::Parser;
use dotenvy::dotenv;
use governor::{
    clock::DefaultClock, middleware::NoOpMiddleware, state::keyed::DashMapStateStore, Quota,
    RateLimiter,
};
use tower_http::{
    cors::CorsLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};
use tracing::info;

pub mod auth;
pub mod error;
pub mod handlers;

use auth::AuthConfig;
use error::ApiError;
use handlers::{entities, health, index_admin, matches};
use noc_common::logging::install_tracing_panic_hook;
use noc_common::{
    create_embedder, Embedder, EmbedderConfig, IndexStore, ListFieldPolicy, ScoringConfig,
    SearchIndex,
};

const SHUTDOWN_DRAIN_GRACE: Duration = Duration::from_millis(200);

#[derive(Debug, Clone, Parser)]
#[command(name = "noc-api", about = "HTTP API for taxonomy match requests")]
struct Cli {
    /// Taxonomy CSV used by the rebuild operation
    #[arg(long, env = "NOC_TAXONOMY_CSV", default_value = "noc_data_full.csv")]
    taxonomy_csv: PathBuf,

    /// Directory holding the persisted embedding index
    #[arg(long, env = "NOC_INDEX_DIR", default_value = "noc_index")]
    index_dir: PathBuf,

    /// Server port
    #[arg(long, env = "PORT", default_value_t = 3001)]
    port: u16,

    /// API key for X-API-Key authentication; unset disables auth
    #[arg(long, env = "NOC_API_KEY")]
    api_key: Option<String>,

    /// Comma separated list of allowed CORS origins
    #[arg(long, env = "NOC_CORS_ORIGINS", default_value = "http://localhost:3000")]
    cors_origins: String,

    /// Treat malformed list fields in the taxonomy CSV as empty instead
    /// of failing the rebuild
    #[arg(long, env = "NOC_LENIENT_LISTS", default_value = "false")]
    lenient_lists: bool,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub taxonomy_csv: PathBuf,
    pub index_dir: PathBuf,
    pub port: u16,
    pub cors_origins: Vec<String>,
    pub auth: AuthConfig,
    pub list_policy: ListFieldPolicy,
}

impl AppConfig {
    fn from_cli(cli: Cli) -> Result<Self, ApiError> {
        let cors_origins = cli
            .cors_origins
            .split(',')
            .map(|origin| origin.trim().to_string())
            .filter(|origin| !origin.is_empty())
            .collect::<Vec<_>>();

        if cors_origins.iter().any(|origin| origin == "*") {
            return Err(ApiError::BadRequest(
                "NOC_CORS_ORIGINS must list explicit origins".into(),
            ));
        }

        Ok(Self {
            taxonomy_csv: cli.taxonomy_csv,
            index_dir: cli.index_dir,
            port: cli.port,
            cors_origins,
            auth: AuthConfig {
                api_key: cli.api_key,
            },
            list_policy: if cli.lenient_lists {
                ListFieldPolicy::Lenient
            } else {
                ListFieldPolicy::Strict
            },
        })
    }

    pub fn for_tests(auth: AuthConfig) -> Self {
        Self {
            taxonomy_csv: "noc_data_full.csv".into(),
            index_dir: "noc_index".into(),
            port: 3001,
            cors_origins: vec!["http://localhost:3000".into()],
            auth,
            list_policy: ListFieldPolicy::Strict,
        }
    }
}

type IpRateLimiter = RateLimiter<IpAddr, DashMapStateStore<IpAddr>, DefaultClock, NoOpMiddleware>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitConfig {
    pub per_sec: u64,
    pub burst: u32,
}

impl RateLimitConfig {
    fn from_env() -> Self {
        let per_sec = std::env::var("NOC_RATE_LIMIT_PER_SEC")
            .ok()
            .and_then(|value| value.parse::<u64>().ok())
            .filter(|value| *value > 0)
            .unwrap_or(20);
        let burst = std::env::var("NOC_RATE_LIMIT_BURST")
            .ok()
            .and_then(|value| value.parse::<u32>().ok())
            .filter(|value| *value > 0)
            .unwrap_or(40);
        Self { per_sec, burst }
    }
}

fn build_ip_limiter(config: &RateLimitConfig) -> Arc<IpRateLimiter> {
    let nanos_per_token = 1_000_000_000u64 / config.per_sec.max(1);
    let quota = Quota::with_period(Duration::from_nanos(nanos_per_token.max(1)))
        .unwrap()
        .allow_burst(NonZeroU32::new(config.burst.max(1)).unwrap());

    Arc::new(RateLimiter::keyed(quota))
}

pub struct AppState {
    /// Current index generation. Swapped wholesale by a rebuild;
    /// in-flight requests keep the `Arc` they cloned.
    index: RwLock<Arc<SearchIndex>>,
    pub embedder: Arc<dyn Embedder>,
    pub scoring: ScoringConfig,
    pub config: AppConfig,
    /// Single-flight guard for the rebuild operation.
    pub rebuild_lock: tokio::sync::Mutex<()>,
    rate_limit: Arc<IpRateLimiter>,
    pub readiness: Arc<AtomicBool>,
}

pub type SharedState = Arc<AppState>;

impl AppState {
    pub fn new(
        index: Arc<SearchIndex>,
        embedder: Arc<dyn Embedder>,
        scoring: ScoringConfig,
        config: AppConfig,
    ) -> Self {
        Self {
            index: RwLock::new(index),
            embedder,
            scoring,
            config,
            rebuild_lock: tokio::sync::Mutex::new(()),
            rate_limit: build_ip_limiter(&RateLimitConfig::from_env()),
            readiness: Arc::new(AtomicBool::new(true)),
        }
    }

    pub fn current_index(&self) -> Arc<SearchIndex> {
        self.index
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn install_index(&self, new_index: Arc<SearchIndex>) {
        *self
            .index
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = new_index;
    }
}

impl axum::extract::FromRef<SharedState> for AuthConfig {
    fn from_ref(input: &SharedState) -> AuthConfig {
        input.config.auth.clone()
    }
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let allowed = origins
        .iter()
        .filter_map(|origin| origin.parse::<HeaderValue>().ok())
        .collect::<Vec<_>>();

    CorsLayer::new()
        .allow_origin(allowed)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([
            AUTHORIZATION,
            CONTENT_TYPE,
            HeaderName::from_static("x-api-key"),
        ])
}

fn request_ip<B>(req: &Request<B>) -> Option<IpAddr> {
    req.extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|info| info.0.ip())
}

async fn global_rate_limit(
    State(state): State<SharedState>,
    req: Request<Body>,
    next: Next,
) -> Result<Response, ApiError> {
    if let Some(client_ip) = request_ip(&req) {
        if state.rate_limit.check_key(&client_ip).is_err() {
            return Err(ApiError::TooManyRequests("rate limit exceeded".into()));
        }
    }
    Ok(next.run(req).await)
}

async fn attach_request_id_context(req: Request<Body>, next: Next) -> Result<Response, ApiError> {
    let request_id = req
        .headers()
        .get("x-request-id")
        .and_then(|value| value.to_str().ok())
        .map(|value| value.to_string());

    Ok(error::with_request_id(request_id, next.run(req)).await)
}

pub fn create_router(state: SharedState) -> Router {
    let cors = cors_layer(&state.config.cors_origins);

    let request_id_header = HeaderName::from_static("x-request-id");
    let trace_header = request_id_header.clone();

    let trace = TraceLayer::new_for_http().make_span_with(move |request: &Request<Body>| {
        let request_id = request
            .headers()
            .get(&trace_header)
            .and_then(|value| value.to_str().ok())
            .unwrap_or("");

        tracing::info_span!(
            "http_request",
            method = %request.method(),
            uri = %request.uri(),
            request_id = %request_id,
        )
    });

    let api_routes = Router::new()
        .route("/match", post(matches::run_match))
        .route("/entities/:code", get(entities::get_entity))
        .route("/index/status", get(index_admin::status))
        .route("/index/rebuild", post(index_admin::rebuild));

    Router::new()
        .route("/health", get(health::readyz))
        .route("/livez", get(health::livez))
        .route("/readyz", get(health::readyz))
        .nest("/api", api_routes)
        .layer(middleware::from_fn_with_state(
            state.clone(),
            global_rate_limit,
        ))
        .layer(middleware::from_fn(attach_request_id_context))
        .layer(DefaultBodyLimit::max(256 * 1024))
        .layer(trace)
        .layer(PropagateRequestIdLayer::new(request_id_header.clone()))
        .layer(SetRequestIdLayer::new(
            request_id_header,
            MakeRequestUuid::default(),
        ))
        .layer(cors)
        .with_state(state)
}

pub async fn run() -> Result<(), ApiError> {
    dotenv().ok();
    noc_common::logging::init_tracing_subscriber("noc-api");
    install_tracing_panic_hook("noc-api");

    let cli = Cli::parse();
    let config = AppConfig::from_cli(cli)?;

    // The http embedder's blocking client must be built and used off the
    // async workers.
    let embedder = tokio::task::spawn_blocking(|| create_embedder(&EmbedderConfig::from_env()))
        .await
        .map_err(|err| ApiError::Internal(err.to_string()))??;

    // A missing or corrupt index is fatal: refuse to serve rather than
    // serve against a partial load. The remedy is a full rebuild.
    let index = IndexStore::new(&config.index_dir).load().map_err(|err| {
        ApiError::ServiceUnavailable(format!(
            "cannot serve without a usable index ({err}); run noc-indexer to rebuild"
        ))
    })?;
    let index = Arc::new(index);

    if embedder.dimension() != index.manifest.dimension {
        return Err(ApiError::ServiceUnavailable(format!(
            "embedder dimension {} does not match index dimension {}; \
             rebuild the index with the configured embedder",
            embedder.dimension(),
            index.manifest.dimension
        )));
    }

    let state = Arc::new(AppState::new(
        index,
        embedder,
        ScoringConfig::from_env(),
        config.clone(),
    ));

    let addr: SocketAddr = ([0, 0, 0, 0], config.port).into();
    let app = create_router(state.clone());

    info!(%addr, auth = state.config.auth.api_key.is_some(), "noc-api listening");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|err| ApiError::Internal(err.to_string()))?;

    let service = app.into_make_service_with_connect_info::<SocketAddr>();

    axum::serve(listener, service)
        .with_graceful_shutdown(shutdown_signal(state.clone()))
        .await
        .map_err(|err| ApiError::Internal(err.to_string()))?;

    Ok(())
}

async fn shutdown_signal(state: SharedState) {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        if let Ok(mut sigterm) = signal(SignalKind::terminate()) {
            let _ = sigterm.recv().await;
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    state
        .readiness
        .store(false, std::sync::atomic::Ordering::SeqCst);

    // Give load balancers a brief window to observe /readyz as not ready
    // before axum stops accepting new connections.
    tokio::time::sleep(SHUTDOWN_DRAIN_GRACE).await;
}

/// Builds a ready-to-route state over an in-memory index; used by the
/// integration tests.
pub fn test_state(entities: Vec<noc_common::Entity>, api_key: Option<&str>) -> SharedState {
    use noc_common::embedding::HashEmbedder;
    use noc_common::index::IndexBuilder;
    use noc_common::TaxonomyStore;

    let store = TaxonomyStore::from_entities(entities).expect("unique entity codes");
    let embedder: Arc<dyn Embedder> = Arc::new(HashEmbedder::new(128));
    let index = IndexBuilder::new(embedder.as_ref())
        .build(&store)
        .expect("index build");

    let auth = AuthConfig {
        api_key: api_key.map(str::to_string),
    };

    Arc::new(AppState::new(
        Arc::new(index),
        embedder,
        ScoringConfig::default(),
        AppConfig::for_tests(auth),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_rejects_wildcard_cors_origin() {
        let cli = Cli {
            taxonomy_csv: "noc_data_full.csv".into(),
            index_dir: "noc_index".into(),
            port: 3001,
            api_key: None,
            cors_origins: "*".into(),
            lenient_lists: false,
        };

        assert!(AppConfig::from_cli(cli).is_err());
    }

    #[test]
    fn cli_splits_and_trims_cors_origins() {
        let cli = Cli {
            taxonomy_csv: "noc_data_full.csv".into(),
            index_dir: "noc_index".into(),
            port: 3001,
            api_key: Some("secret".into()),
            cors_origins: "http://localhost:3000, https://noc.example.org ,".into(),
            lenient_lists: true,
        };

        let config = AppConfig::from_cli(cli).unwrap();
        assert_eq!(config.cors_origins.len(), 2);
        assert_eq!(config.list_policy, ListFieldPolicy::Lenient);
        assert!(config.auth.api_key.is_some());
    }
}
