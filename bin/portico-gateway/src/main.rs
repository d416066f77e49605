//! Portico Gateway - multi-tenant S3 API gateway
//!
//! Accepts the AWS S3 REST/XML protocol, enforces per-tenant isolation,
//! quotas, and rate limits, and dispatches storage operations onto the
//! configured backend drivers.

use anyhow::{Context, Result};
use clap::Parser;
use portico_auth::{KeyStore, SigV4Verifier};
use portico_common::config::{BackendConfig, BackendKind};
use portico_common::{GatewayConfig, Plan, TenantId};
use portico_events::{AccessLogSink, AccessPatternLog, CsvSink, EventPipeline, TracingSink};
use portico_gateway::multipart::MultipartRegistry;
use portico_gateway::router::build_router;
use portico_gateway::s3::AppState;
use portico_health::HealthRegistry;
use portico_storage::{CloudDriveDriver, Driver, Engine, LocalFsDriver, S3FamilyDriver};
use portico_tenant::{QuotaManager, RateLimiter, TenantDirectory, tenant::TEST_TENANT_ID};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "portico-gateway")]
#[command(about = "Multi-tenant S3-compatible storage gateway")]
#[command(version)]
struct Args {
    /// Configuration file path
    #[arg(short, long, default_value = "/etc/portico/gateway.toml")]
    config: String,

    /// Listen address for the S3 API (overrides config)
    #[arg(short, long)]
    listen: Option<String>,

    /// Data directory for the default local backend (overrides config)
    #[arg(long)]
    data_dir: Option<String>,

    /// AWS region for SigV4 verification (overrides config)
    #[arg(long)]
    region: Option<String>,

    /// Accept anonymous requests as a synthetic tenant (development only)
    #[arg(long, default_value_t = false)]
    test_mode: bool,

    /// Log level
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn load_config(args: &Args) -> Result<GatewayConfig> {
    let mut config: GatewayConfig = config::Config::builder()
        .add_source(config::File::with_name(&args.config).required(false))
        .build()
        .context("failed to read configuration")?
        .try_deserialize()
        .context("invalid configuration")?;

    if let Some(listen) = &args.listen {
        config.network.listen = listen
            .parse()
            .with_context(|| format!("invalid listen address: {listen}"))?;
    }
    if let Some(region) = &args.region {
        config.s3.region.clone_from(region);
    }
    if let Some(data_dir) = &args.data_dir {
        config.storage = portico_common::config::StorageConfig {
            primary: "local".to_string(),
            backup: None,
            backends: vec![BackendConfig {
                id: "local".to_string(),
                kind: BackendKind::Local,
                root: Some(data_dir.into()),
                ..BackendConfig::default()
            }],
        };
    }
    if args.test_mode {
        config.test_mode = true;
    }
    Ok(config)
}

fn build_driver(backend: &BackendConfig, region: &str) -> Result<Arc<dyn Driver>> {
    match backend.kind {
        BackendKind::Local => {
            let root = backend
                .root
                .as_ref()
                .with_context(|| format!("backend {} needs a root directory", backend.id))?;
            Ok(Arc::new(
                LocalFsDriver::new(&backend.id, root)
                    .with_context(|| format!("failed to open {}", root.display()))?,
            ))
        }
        BackendKind::S3Family => {
            let endpoint = backend
                .endpoint
                .as_ref()
                .with_context(|| format!("backend {} needs an endpoint", backend.id))?;
            let access_key = backend
                .access_key
                .as_ref()
                .with_context(|| format!("backend {} needs an access key", backend.id))?;
            let secret_key = backend
                .secret_key
                .as_ref()
                .with_context(|| format!("backend {} needs a secret key", backend.id))?;
            let driver = S3FamilyDriver::new(
                &backend.id,
                endpoint,
                access_key,
                secret_key,
                backend.region.as_deref().unwrap_or(region),
            )
            .map_err(|e| anyhow::anyhow!("backend {}: {}", backend.id, e))?;
            Ok(Arc::new(driver))
        }
        BackendKind::CloudDrive => {
            let endpoint = backend
                .endpoint
                .as_ref()
                .with_context(|| format!("backend {} needs an endpoint", backend.id))?;
            let token = backend
                .token
                .as_ref()
                .with_context(|| format!("backend {} needs a token", backend.id))?;
            Ok(Arc::new(CloudDriveDriver::new(&backend.id, endpoint, token)))
        }
    }
}

/// Probe every registered driver on an interval and push the outcomes
/// into the health registry.
fn spawn_probe_loop(state: Arc<AppState>) {
    let interval = Duration::from_secs(state.config.health.probe_interval_secs.max(1));
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            for driver in state.engine.drivers() {
                let id = driver.id().to_string();
                let outcome = driver
                    .health_probe()
                    .await
                    .map_err(|e| e.to_string());
                state.health.record_probe(&id, outcome);
            }
        }
    });
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| args.log_level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = load_config(&args)?;
    info!("Starting Portico Gateway");
    info!("Region: {}", config.s3.region);

    // Storage engine and drivers.
    let engine = Engine::new();
    let health = HealthRegistry::new();
    for backend in &config.storage.backends {
        let driver = build_driver(backend, &config.s3.region)?;
        health.register(driver.id());
        engine.add_driver(driver);
    }
    engine
        .set_primary(&config.storage.primary)
        .map_err(|e| anyhow::anyhow!("primary backend: {e}"))?;
    if let Some(backup) = &config.storage.backup {
        engine
            .set_backup(backup)
            .map_err(|e| anyhow::anyhow!("backup backend: {e}"))?;
    }

    // Tenant, quota, and key state.
    let tenants = TenantDirectory::new(config.test_mode);
    let quotas = QuotaManager::new();
    let keys = Arc::new(KeyStore::new());
    if config.test_mode {
        warn!("TEST MODE is enabled; anonymous requests map to '{TEST_TENANT_ID}'");
        quotas
            .create_tenant(
                TenantId::new_unchecked(TEST_TENANT_ID),
                Plan::Professional,
                Plan::Professional.storage_quota(),
            )
            .ok();
    }

    // Event pipeline and consumer.
    let (events, rx) = EventPipeline::new(config.events.capacity);
    let patterns = Arc::new(AccessPatternLog::new());
    let sink: Arc<dyn AccessLogSink> = match &config.events.access_log {
        Some(path) => {
            info!("Access log: {}", path.display());
            Arc::new(
                CsvSink::open(path)
                    .await
                    .with_context(|| format!("failed to open access log {}", path.display()))?,
            )
        }
        None => Arc::new(TracingSink),
    };
    tokio::spawn(portico_events::run_consumer(
        rx,
        sink,
        Arc::clone(&patterns),
    ));

    let verifier = SigV4Verifier::new(Arc::clone(&keys), config.s3.region.clone())
        .with_max_skew_minutes(config.s3.max_clock_skew_minutes);

    let addr: SocketAddr = config.network.listen;
    let state = Arc::new(AppState {
        engine,
        tenants,
        quotas,
        keys,
        verifier,
        limiter: RateLimiter::new(config.rate_limit.max_entries),
        health,
        events,
        patterns,
        uploads: MultipartRegistry::new(),
        config,
        started_at: Instant::now(),
    });

    spawn_probe_loop(Arc::clone(&state));

    let app = build_router(state);

    info!("Listening on {}", addr);
    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
            info!("Shutting down...");
        })
        .await?;

    info!("Gateway shut down gracefully");
    Ok(())
}
