use std::env;
use std::net::{IpAddr, SocketAddr};
use std::num::NonZeroU32;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use axum::{
    Router,
    body::Body,
    extract::DefaultBodyLimit,
    extract::State,
    extract::connect_info::ConnectInfo,
    http::Method,
    http::Request,
    http::header::{CONTENT_TYPE, HeaderName, HeaderValue},
    middleware,
    middleware::Next,
    response::Response,
    routing::get,
};
use clap::{Parser, ValueEnum};
use dotenvy::dotenv;
use governor::{
    Quota, RateLimiter, clock::DefaultClock, middleware::NoOpMiddleware,
    state::keyed::DashMapStateStore,
};
use lfg_common::db::{PgStore, PoolSettings, create_pool_from_url_checked, run_migrations};
use lfg_common::logging::{LogConfig, init_logging};
use lfg_common::matching::{DiscoveryConfig, DiscoveryEngine};
use lfg_common::store::{InMemoryStore, ProfileStore, StatsStore};
use tower_http::{
    cors::CorsLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};
use tracing::{debug, info, warn};

pub mod error;
pub mod handlers;

use error::ApiError;
use handlers::{health, players};

const SHUTDOWN_DRAIN_GRACE: Duration = Duration::from_millis(200);
const RATE_LIMIT_PRUNE_INTERVAL: Duration = Duration::from_secs(60);
const DEFAULT_METRICS_PORT: u16 = 9101;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StoreBackend {
    Postgres,
    Memory,
}

impl StoreBackend {
    pub fn as_str(&self) -> &'static str {
        match self {
            StoreBackend::Postgres => "postgres",
            StoreBackend::Memory => "memory",
        }
    }
}

#[derive(Debug, Clone, Parser)]
#[command(name = "lfg-api", about = "HTTP API for teammate discovery")]
struct Cli {
    /// Server port
    #[arg(long, env = "PORT", default_value_t = 3001)]
    port: u16,

    /// Profile/stats backend: postgres | memory
    #[arg(long, env = "LFG_STORE", default_value = "postgres", value_enum)]
    store: StoreBackend,

    /// PostgreSQL connection string (required for the postgres backend)
    #[arg(long, env = "DATABASE_URL")]
    database_url: Option<String>,

    /// JSON fixture file loaded by the memory backend
    #[arg(long, env = "LFG_FIXTURES")]
    fixtures: Option<PathBuf>,

    /// Apply schema migrations on startup (postgres backend)
    #[arg(long, env = "LFG_RUN_MIGRATIONS", default_value_t = true, action = clap::ArgAction::Set)]
    run_migrations: bool,

    /// Comma separated list of allowed CORS origins
    #[arg(long, env = "LFG_CORS_ORIGINS", default_value = "http://localhost:3000")]
    cors_origins: String,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub port: u16,
    pub store: StoreBackend,
    pub database_url: Option<String>,
    pub fixtures: Option<PathBuf>,
    pub run_migrations: bool,
    pub cors_origins: Vec<String>,
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
                "LFG_CORS_ORIGINS must list explicit origins".into(),
            ));
        }

        let database_url = cli.database_url.filter(|url| !url.trim().is_empty());
        if cli.store == StoreBackend::Postgres && database_url.is_none() {
            return Err(ApiError::BadRequest(
                "DATABASE_URL is required when LFG_STORE=postgres".into(),
            ));
        }

        Ok(Self {
            port: cli.port,
            store: cli.store,
            database_url,
            fixtures: cli.fixtures,
            run_migrations: cli.run_migrations,
            cors_origins,
        })
    }

    pub fn for_tests() -> Self {
        Self {
            port: 3001,
            store: StoreBackend::Memory,
            database_url: None,
            fixtures: None,
            run_migrations: false,
            cors_origins: vec!["http://localhost:3000".into()],
        }
    }
}

type IpRateLimiter = RateLimiter<IpAddr, DashMapStateStore<IpAddr>, DefaultClock, NoOpMiddleware>;

#[derive(Clone)]
pub struct RateLimits {
    global: Arc<IpRateLimiter>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitConfig {
    pub per_sec: u32,
    pub burst: u32,
}

impl RateLimitConfig {
    fn parse_env_u32(name: &str) -> Option<u32> {
        env::var(name)
            .ok()
            .and_then(|value| value.parse::<u32>().ok())
            .filter(|value| *value > 0)
    }

    fn from_env() -> Self {
        Self {
            per_sec: Self::parse_env_u32("LFG_RATE_LIMIT_PER_SEC").unwrap_or(20),
            burst: Self::parse_env_u32("LFG_RATE_LIMIT_BURST").unwrap_or(40),
        }
    }
}

fn build_ip_limiter(per_second: u32, burst_size: u32) -> Arc<IpRateLimiter> {
    let per_second = NonZeroU32::new(per_second).unwrap_or(NonZeroU32::MIN);
    let burst = NonZeroU32::new(burst_size).unwrap_or(per_second);

    Arc::new(RateLimiter::keyed(Quota::per_second(per_second).allow_burst(burst)))
}

/// Drop per-IP entries whose quota has fully replenished. Returns how many remain.
fn prune_rate_limiter(limiter: &IpRateLimiter) -> usize {
    limiter.retain_recent();
    limiter.shrink_to_fit();
    limiter.len()
}

fn spawn_rate_limit_pruner(limits: RateLimits) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(RATE_LIMIT_PRUNE_INTERVAL);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let tracked = prune_rate_limiter(&limits.global);
            debug!(tracked_clients = tracked, "pruned rate limiter state");
        }
    })
}

pub fn default_rate_limits() -> RateLimits {
    let cfg = RateLimitConfig::from_env();
    RateLimits {
        global: build_ip_limiter(cfg.per_sec, cfg.burst),
    }
}

#[derive(Clone)]
pub struct AppState {
    pub profiles: Arc<dyn ProfileStore>,
    pub stats: Arc<dyn StatsStore>,
    pub engine: DiscoveryEngine,
    pub config: AppConfig,
    pub(crate) rate_limits: RateLimits,
    pub readiness: Arc<AtomicBool>,
}

pub type SharedState = Arc<AppState>;

fn cors_layer(origins: &[String]) -> CorsLayer {
    let allowed = origins
        .iter()
        .filter_map(|origin| origin.parse::<HeaderValue>().ok())
        .collect::<Vec<_>>();

    CorsLayer::new()
        .allow_origin(allowed)
        .allow_methods([Method::GET, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE])
}

fn request_ip<B>(req: &Request<B>) -> Option<IpAddr> {
    req.extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|info| info.0.ip())
}

fn enforce_rate_limit(limiter: &IpRateLimiter, ip: Option<IpAddr>) -> Result<(), ApiError> {
    match ip {
        Some(client_ip) if limiter.check_key(&client_ip).is_err() => {
            Err(ApiError::TooManyRequests("rate limit exceeded".into()))
        }
        _ => Ok(()),
    }
}

async fn global_rate_limit(
    State(state): State<SharedState>,
    req: Request<Body>,
    next: Next,
) -> Result<Response, ApiError> {
    enforce_rate_limit(&state.rate_limits.global, request_ip(&req))?;
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
            status = tracing::field::Empty,
        )
    });

    let api_routes = Router::new()
        .route("/players/search", get(players::search_players))
        .route("/players/:id/explain", get(players::explain_player));

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
        .layer(DefaultBodyLimit::max(64 * 1024))
        .layer(trace)
        .layer(PropagateRequestIdLayer::new(request_id_header.clone()))
        .layer(SetRequestIdLayer::new(
            request_id_header,
            MakeRequestUuid,
        ))
        .layer(cors)
        .with_state(state)
}

/// State backed by the given in-memory store, for tests and local runs.
pub fn state_with_store(store: InMemoryStore) -> SharedState {
    let store = Arc::new(store);

    Arc::new(AppState {
        profiles: store.clone(),
        stats: store,
        engine: DiscoveryEngine::default(),
        config: AppConfig::for_tests(),
        rate_limits: default_rate_limits(),
        readiness: Arc::new(AtomicBool::new(true)),
    })
}

pub fn test_state() -> SharedState {
    state_with_store(InMemoryStore::default())
}

type Stores = (Arc<dyn ProfileStore>, Arc<dyn StatsStore>);

async fn build_stores(config: &AppConfig) -> Result<Stores, ApiError> {
    match config.store {
        StoreBackend::Memory => {
            let store = match &config.fixtures {
                Some(path) => InMemoryStore::from_fixture_file(path)?,
                None => {
                    warn!("memory store started without fixtures; every search returns nothing");
                    InMemoryStore::default()
                }
            };
            let store = Arc::new(store);
            Ok((store.clone(), store))
        }
        StoreBackend::Postgres => {
            let url = config
                .database_url
                .as_deref()
                .ok_or_else(|| ApiError::BadRequest("DATABASE_URL is required".into()))?;
            let settings = PoolSettings::from_env(env!("CARGO_PKG_NAME"));
            let pool = create_pool_from_url_checked(url, &settings)
                .await
                .map_err(|err| ApiError::Store(format!("failed to create pool: {err}")))?;

            if config.run_migrations {
                run_migrations(&pool)
                    .await
                    .map_err(|err| ApiError::Store(format!("failed to run migrations: {err}")))?;
            }

            let store = Arc::new(PgStore::new(pool));
            Ok((store.clone(), store))
        }
    }
}

pub async fn run() -> Result<(), ApiError> {
    dotenv().ok();
    init_logging(env!("CARGO_PKG_NAME"), &LogConfig::from_env());

    let cli = Cli::parse();
    let config = AppConfig::from_cli(cli)?;
    lfg_metrics::init_metrics("LFG_METRICS_PORT", DEFAULT_METRICS_PORT);

    let (profiles, stats) = build_stores(&config).await?;
    let engine = DiscoveryEngine::new(DiscoveryConfig::from_env())
        .with_span(tracing::info_span!("discovery", service = env!("CARGO_PKG_NAME")));

    let state = Arc::new(AppState {
        profiles,
        stats,
        engine,
        config: config.clone(),
        rate_limits: default_rate_limits(),
        readiness: Arc::new(AtomicBool::new(true)),
    });

    let pruner = spawn_rate_limit_pruner(state.rate_limits.clone());

    let addr: SocketAddr = ([0, 0, 0, 0], config.port).into();
    let app = create_router(state.clone());

    info!(%addr, store = config.store.as_str(), "lfg-api listening");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|err| ApiError::Internal(err.to_string()))?;

    let service = app.into_make_service_with_connect_info::<SocketAddr>();

    let served = axum::serve(listener, service)
        .with_graceful_shutdown(shutdown_signal(state.clone()))
        .await;
    pruner.abort();

    served.map_err(|err| ApiError::Internal(err.to_string()))
}

async fn shutdown_signal(state: SharedState) {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
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

    state.readiness.store(false, Ordering::SeqCst);

    // Let load balancers see /readyz fail before connections stop being accepted.
    tokio::time::sleep(SHUTDOWN_DRAIN_GRACE).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use std::sync::Mutex;
    use tower::ServiceExt;

    static ENV_GUARD: Mutex<()> = Mutex::new(());

    fn with_envs(vars: &[(&str, Option<&str>)], f: impl FnOnce()) {
        let _guard = ENV_GUARD.lock().unwrap();

        let previous: Vec<(&str, Option<String>)> = vars
            .iter()
            .map(|(var, value)| {
                let old = env::var(var).ok();
                match value {
                    Some(v) => unsafe { env::set_var(var, v) },
                    None => unsafe { env::remove_var(var) },
                }
                (*var, old)
            })
            .collect();

        f();

        for (var, previous_value) in previous {
            match previous_value {
                Some(v) => unsafe { env::set_var(var, v) },
                None => unsafe { env::remove_var(var) },
            }
        }
    }

    fn cli(args: &[&str]) -> Cli {
        let mut argv = vec!["lfg-api"];
        argv.extend_from_slice(args);
        Cli::try_parse_from(argv).unwrap()
    }

    #[tokio::test]
    async fn sets_request_id_when_missing() {
        let app = create_router(test_state());

        let response = app
            .oneshot(Request::builder().uri("/livez").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key("x-request-id"));
    }

    #[test]
    fn rate_limit_config_respects_env_overrides() {
        with_envs(
            &[
                ("LFG_RATE_LIMIT_PER_SEC", Some("10")),
                ("LFG_RATE_LIMIT_BURST", Some("25")),
            ],
            || {
                assert_eq!(
                    RateLimitConfig::from_env(),
                    RateLimitConfig {
                        per_sec: 10,
                        burst: 25,
                    }
                );
            },
        );
    }

    #[test]
    fn postgres_backend_requires_database_url() {
        with_envs(&[("DATABASE_URL", None), ("LFG_STORE", None)], || {
            let err = AppConfig::from_cli(cli(&["--store", "postgres"])).unwrap_err();
            assert!(matches!(err, ApiError::BadRequest(msg) if msg.contains("DATABASE_URL")));

            let config = AppConfig::from_cli(cli(&["--store", "memory"])).unwrap();
            assert_eq!(config.store, StoreBackend::Memory);
        });
    }

    #[test]
    fn wildcard_cors_origin_is_rejected() {
        with_envs(&[("LFG_CORS_ORIGINS", None)], || {
            let result = AppConfig::from_cli(cli(&["--store", "memory", "--cors-origins", "*"]));
            assert!(result.is_err());
        });
    }

    #[test]
    fn limiter_without_client_ip_never_blocks() {
        let limiter = build_ip_limiter(1, 1);
        for _ in 0..5 {
            assert!(enforce_rate_limit(&limiter, None).is_ok());
        }

        let ip: IpAddr = [10, 0, 0, 1].into();
        assert!(enforce_rate_limit(&limiter, Some(ip)).is_ok());
        assert!(enforce_rate_limit(&limiter, Some(ip)).is_err());
    }

    #[test]
    fn pruning_forgets_clients_whose_quota_has_replenished() {
        let limiter = build_ip_limiter(1_000, 1);
        for last_octet in 1..=4u8 {
            let ip: IpAddr = [10, 0, 0, last_octet].into();
            assert!(limiter.check_key(&ip).is_ok());
        }
        assert_eq!(limiter.len(), 4);

        std::thread::sleep(Duration::from_millis(50));

        assert_eq!(prune_rate_limiter(&limiter), 0);
        assert!(limiter.is_empty());
    }

    #[test]
    fn pruning_keeps_clients_still_inside_their_window() {
        let limiter = build_ip_limiter(1, 1);
        let ip: IpAddr = [192, 168, 1, 7].into();
        assert!(limiter.check_key(&ip).is_ok());

        assert_eq!(prune_rate_limiter(&limiter), 1);
        assert!(enforce_rate_limit(&limiter, Some(ip)).is_err());
    }
}
