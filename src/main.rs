use anyhow::Result;
use axum::{middleware, routing::get, Router};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{info, Level};
use tracing_subscriber::fmt::format::FmtSpan;

use lazuli_engine::{
    api::middleware::{logging_middleware, security_headers_middleware, RequestLogConfig},
    api::votes::{create_engine_router, EngineApiState},
    AccountDirectory, EngineConfig, GemLedger, MemoryStore, ScoreEngine, Store, VoteLedger,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first; it validates every tunable.
    let config = EngineConfig::from_env().map_err(|e| {
        eprintln!("Configuration error: {}", e);
        e
    })?;

    init_logging(&config)?;

    info!("Starting Lazuli engagement engine");
    info!(
        votes_per_window = config.limits.votes_per_window,
        daily_votes = config.limits.daily_votes,
        fraud_threshold = config.fraud.threshold,
        "Engine limits loaded"
    );

    // One shared store backs every component.
    let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
    let ledger = Arc::new(GemLedger::new(store.clone()));
    let scores = Arc::new(ScoreEngine::new(store.clone()));
    let accounts = Arc::new(AccountDirectory::new(
        store.clone(),
        config.cache.account_ttl_ms,
    ));
    let votes = Arc::new(VoteLedger::new(
        store,
        ledger.clone(),
        scores.clone(),
        accounts,
        config.clone(),
    ));

    let log_config = RequestLogConfig {
        log_requests: config.logging.log_requests,
    };

    let app = Router::new()
        .merge(create_engine_router(EngineApiState {
            votes,
            ledger,
            scores,
        }))
        .route("/health", get(|| async { "OK" }))
        .layer(middleware::from_fn_with_state(
            log_config,
            logging_middleware,
        ))
        .layer(middleware::from_fn(security_headers_middleware))
        .layer(TraceLayer::new_for_http());

    let bind_addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to bind to {}: {}", bind_addr, e))?;

    info!("Lazuli engine listening on {}", bind_addr);

    // Serve with connect info for client IP extraction
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}

fn init_logging(config: &EngineConfig) -> Result<()> {
    let log_level = match config.logging.level.to_lowercase().as_str() {
        "error" => Level::ERROR,
        "warn" => Level::WARN,
        "info" => Level::INFO,
        "debug" => Level::DEBUG,
        "trace" => Level::TRACE,
        _ => Level::INFO,
    };

    let subscriber = tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_span_events(if config.logging.log_requests {
            FmtSpan::NEW | FmtSpan::CLOSE
        } else {
            FmtSpan::NONE
        })
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| anyhow::anyhow!("Failed to set logging subscriber: {}", e))?;

    Ok(())
}
