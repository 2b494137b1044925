//! LabCore service binary
//!
//! Builds the laboratory services over the in-memory Store, exports cache
//! statistics for Prometheus and purges expired cache entries periodically.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                            labcore                               │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  ┌──────────────┐    ┌──────────────┐    ┌──────────────┐       │
//! │  │   Services   │───▶│ Coordinator  │───▶│ Region Cache │       │
//! │  └──────────────┘    └──────┬───────┘    └──────┬───────┘       │
//! │                             ▼                   │               │
//! │                      ┌──────────────┐    ┌──────▼───────┐       │
//! │                      │    Store     │    │  /metrics    │       │
//! │                      └──────────────┘    └──────────────┘       │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use labcore::cache::{CacheManager, PolicyKind};
use labcore::domain::{
    Gender, OrderRequest, OrderStatus, PatientRequest, TestRequest, TestStatus, TestTypeRequest,
};
use labcore::telemetry::CacheMetrics;
use labcore::{Error, LabConfig, LabContext, Result};

// =============================================================================
// CLI Arguments
// =============================================================================

/// LabCore - laboratory services with a consistent read-through cache
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// YAML configuration file
    #[arg(long, env = "LABCORE_CONFIG")]
    config: Option<PathBuf>,

    /// Maximum entries per cache region
    #[arg(long, env = "CACHE_CAPACITY")]
    cache_capacity: Option<usize>,

    /// Cache entry time to live in seconds
    #[arg(long, env = "CACHE_TTL_SECONDS")]
    cache_ttl_seconds: Option<u64>,

    /// Cache eviction policy (lru, lfu, lru-k)
    #[arg(long, env = "CACHE_EVICTION_POLICY")]
    eviction_policy: Option<String>,

    /// Endpoint receiving order status notifications
    #[arg(long, env = "NOTIFICATION_URL")]
    notification_url: Option<String>,

    /// Interval between expired-entry purges in seconds
    #[arg(long, env = "PURGE_INTERVAL_SECONDS", default_value = "60")]
    purge_interval_seconds: u64,

    /// Metrics server bind address
    #[arg(long, env = "METRICS_ADDR", default_value = "0.0.0.0:8080")]
    metrics_addr: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Output logs as JSON
    #[arg(long, env = "LOG_JSON")]
    log_json: bool,

    /// Load a small demo data set on startup
    #[arg(long, env = "SEED_DEMO")]
    seed_demo: bool,
}

// =============================================================================
// Main
// =============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(&args);

    let config = load_config(&args)?;
    info!("Starting LabCore {}", labcore::version());
    info!("  Cache capacity per region: {}", config.cache.capacity_per_region);
    info!("  Cache TTL: {}s", config.cache.ttl.as_secs());
    info!("  Eviction policy: {:?}", config.cache.eviction_policy);
    info!(
        "  Notifications: {}",
        config.notification_url.as_deref().unwrap_or("disabled")
    );

    let (ctx, _store) = LabContext::in_memory(&config)?;

    if args.seed_demo {
        seed_demo(&ctx).await?;
    }

    let shutdown = CancellationToken::new();

    // Periodic purge of expired entries
    let purge_cache = ctx.cache.clone();
    let purge_shutdown = shutdown.clone();
    let purge_interval = Duration::from_secs(args.purge_interval_seconds.max(1));
    let purge_handle = tokio::spawn(async move {
        run_purge_loop(purge_cache, purge_interval, purge_shutdown).await;
    });

    // Start metrics server
    let metrics = Arc::new(CacheMetrics::new()?);
    let metrics_addr = args.metrics_addr.clone();
    let metrics_cache = ctx.cache.clone();
    let metrics_shutdown = shutdown.clone();
    tokio::spawn(async move {
        if let Err(e) =
            run_metrics_server(&metrics_addr, metrics_cache, metrics, metrics_shutdown).await
        {
            error!("Metrics server error: {}", e);
        }
    });

    tokio::signal::ctrl_c().await?;
    info!("Shutdown requested");
    shutdown.cancel();

    if let Err(e) = purge_handle.await {
        warn!("Purge task ended abnormally: {}", e);
    }

    for stats in ctx.cache.stats() {
        info!(
            region = %stats.region,
            entries = stats.entries,
            hits = stats.hits,
            misses = stats.misses,
            hit_ratio = stats.hit_ratio(),
            "Final cache statistics"
        );
    }
    info!("LabCore shutdown complete");
    Ok(())
}

fn load_config(args: &Args) -> Result<LabConfig> {
    let mut config = match &args.config {
        Some(path) => LabConfig::from_file(path)?,
        None => LabConfig::default(),
    };

    if let Some(capacity) = args.cache_capacity {
        config = config.with_capacity(capacity);
    }
    if let Some(ttl) = args.cache_ttl_seconds {
        config = config.with_ttl(Duration::from_secs(ttl));
    }
    if let Some(policy) = &args.eviction_policy {
        config = config.with_eviction_policy(policy.parse::<PolicyKind>()?);
    }
    if let Some(url) = &args.notification_url {
        config = config.with_notification_url(url.clone());
    }

    config.validate()?;
    Ok(config)
}

// =============================================================================
// Logging Setup
// =============================================================================

fn init_logging(args: &Args) {
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!("{},hyper=warn,reqwest=warn", level.as_str().to_lowercase()))
    });

    if args.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true))
            .init();
    }
}

// =============================================================================
// Background Tasks
// =============================================================================

async fn run_purge_loop(cache: Arc<CacheManager>, interval: Duration, shutdown: CancellationToken) {
    let mut ticker = tokio::time::interval(interval);
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = ticker.tick() => {
                let purged = cache.purge_expired();
                if purged > 0 {
                    info!(purged, "Expired cache entries purged");
                }
            }
        }
    }
}

async fn seed_demo(ctx: &LabContext) -> Result<()> {
    let date = |y, m, d| {
        NaiveDate::from_ymd_opt(y, m, d)
            .ok_or_else(|| Error::Internal(format!("invalid demo date {}-{}-{}", y, m, d)))
    };

    let ivanov = ctx
        .patients
        .create(PatientRequest {
            last_name: "Ivanov".into(),
            first_name: "Ivan".into(),
            middle_name: Some("Ivanovich".into()),
            birth_date: date(1985, 4, 12)?,
            gender: Gender::Male,
            phone_number: Some("+7 911 123-45-67".into()),
            snils: Some("112-233-445 95".into()),
        })
        .await?;
    let petrova = ctx
        .patients
        .create(PatientRequest {
            last_name: "Petrova".into(),
            first_name: "Maria".into(),
            middle_name: None,
            birth_date: date(1992, 9, 1)?,
            gender: Gender::Female,
            phone_number: None,
            snils: None,
        })
        .await?;

    let glucose = ctx
        .test_types
        .create(TestTypeRequest {
            name: "Glucose".into(),
            code: "GLU".into(),
            description: Some("Fasting plasma glucose".into()),
            price: 350.0,
        })
        .await?;
    let cbc = ctx
        .test_types
        .create(TestTypeRequest {
            name: "Complete blood count".into(),
            code: "CBC".into(),
            description: None,
            price: 600.0,
        })
        .await?;

    for (patient, test_type) in [(ivanov.id, glucose.id), (petrova.id, cbc.id)] {
        let order = ctx
            .orders
            .create(OrderRequest {
                patient_id: patient,
                status: Some(OrderStatus::InProgress),
                comment: None,
            })
            .await?;
        ctx.tests
            .create(TestRequest {
                order_id: order.id,
                test_type_id: test_type,
                result: None,
                reference_values: None,
                status: TestStatus::Pending,
            })
            .await?;
    }

    info!("Demo data loaded: 2 patients, 2 orders, 2 tests, 2 test types");
    Ok(())
}

// =============================================================================
// Metrics Server
// =============================================================================

async fn run_metrics_server(
    addr: &str,
    cache: Arc<CacheManager>,
    metrics: Arc<CacheMetrics>,
    shutdown: CancellationToken,
) -> Result<()> {
    use http_body_util::Full;
    use hyper::body::Bytes;
    use hyper::header::{HeaderValue, CONTENT_TYPE};
    use hyper::server::conn::http1;
    use hyper::service::service_fn;
    use hyper::{Request, Response, StatusCode};
    use hyper_util::rt::TokioIo;
    use tokio::net::TcpListener;

    fn respond(status: StatusCode, body: impl Into<Bytes>) -> Response<Full<Bytes>> {
        let mut response = Response::new(Full::new(body.into()));
        *response.status_mut() = status;
        response
    }

    async fn handle(
        req: Request<hyper::body::Incoming>,
        cache: Arc<CacheManager>,
        metrics: Arc<CacheMetrics>,
    ) -> std::result::Result<Response<Full<Bytes>>, std::convert::Infallible> {
        let response = match req.uri().path() {
            "/metrics" => {
                metrics.observe(&cache.stats());
                match metrics.encode() {
                    Ok((content_type, buffer)) => {
                        let mut response = respond(StatusCode::OK, buffer);
                        if let Ok(value) = HeaderValue::from_str(&content_type) {
                            response.headers_mut().insert(CONTENT_TYPE, value);
                        }
                        response
                    }
                    Err(e) => respond(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
                }
            }
            "/healthz" => respond(StatusCode::OK, "ok"),
            _ => respond(StatusCode::NOT_FOUND, "not found"),
        };
        Ok(response)
    }

    let addr: SocketAddr = addr
        .parse()
        .map_err(|e| Error::Config(format!("Invalid metrics server address: {}", e)))?;

    let listener = TcpListener::bind(addr)
        .await
        .map_err(|e| Error::Internal(format!("Failed to bind metrics server: {}", e)))?;

    info!("Metrics server listening on {}", addr);

    loop {
        let (stream, _) = tokio::select! {
            _ = shutdown.cancelled() => return Ok(()),
            accepted = listener.accept() => accepted
                .map_err(|e| Error::Internal(format!("Metrics server accept error: {}", e)))?,
        };

        let io = TokioIo::new(stream);
        let cache = cache.clone();
        let metrics = metrics.clone();

        tokio::spawn(async move {
            let service = service_fn(move |req| handle(req, cache.clone(), metrics.clone()));
            if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                error!("Metrics server connection error: {}", e);
            }
        });
    }
}
