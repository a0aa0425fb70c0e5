use clap::Parser;
use dotenvy::dotenv;
use pdf_compression_service::config::AppConfig;
use pdf_compression_service::services::callback::CallbackNotifier;
use pdf_compression_service::services::compression::CompressionExecutor;
use pdf_compression_service::services::job::JobOrchestrator;
use pdf_compression_service::services::worker::JobWorkerPool;
use pdf_compression_service::{AppState, create_app};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(author, version, about = "Asynchronous PDF compression service")]
struct Args {
    /// Port to listen on
    #[arg(short, long, env = "PORT", default_value_t = 3000)]
    port: u16,

    /// Address to bind
    #[arg(long, env = "BIND_ADDRESS", default_value = "0.0.0.0")]
    bind: std::net::IpAddr,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    // Initialize tracing with EnvFilter
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "pdf_compression_service=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    info!("🚀 Starting PDF Compression Service...");

    let config = Arc::new(AppConfig::from_env());
    info!(
        "🛠️  Compression Config: Tool={}, Profile={}, Max Size={}MB, Timeout={}s, Max Concurrent={}",
        config.compression.tool_path,
        config.compression.profile,
        config.compression.max_input_bytes / 1024 / 1024,
        config.compression.timeout_seconds,
        config.compression.max_concurrent
    );
    info!(
        "📮 Job Config: Workers={}, Queue={}, Min Latency={:?}",
        config.jobs.workers, config.jobs.queue_capacity, config.jobs.min_latency
    );

    if config.api_token == AppConfig::default().api_token {
        tracing::warn!("⚠️  API_TOKEN is not set, using the placeholder token");
    }

    let executor = Arc::new(CompressionExecutor::new(&config.compression));
    let notifier = Arc::new(CallbackNotifier::new(config.callback.clone())?);
    let orchestrator = JobOrchestrator::new(executor.clone(), notifier, config.jobs.min_latency);

    // Setup Shutdown Channel
    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);

    let (jobs, workers) = JobWorkerPool::start(orchestrator, &config.jobs, shutdown_rx);

    let state = AppState {
        executor,
        jobs,
        config: config.clone(),
    };

    let app = create_app(state).layer(
        TraceLayer::new_for_http()
            .make_span_with(|request: &axum::http::Request<_>| {
                let request_id = request
                    .headers()
                    .get("x-request-id")
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or("unknown");
                tracing::info_span!(
                    "http_request",
                    method = %request.method(),
                    uri = %request.uri(),
                    request_id = %request_id,
                )
            })
            .on_request(|request: &axum::http::Request<_>, _span: &tracing::Span| {
                info!("📥 {} {}", request.method(), request.uri());
            })
            .on_response(
                |response: &axum::http::Response<_>,
                 latency: std::time::Duration,
                 _span: &tracing::Span| {
                    info!(
                        "📤 Finished in {:?} with status {}",
                        latency,
                        response.status()
                    );
                },
            ),
    );

    let addr = SocketAddr::from((args.bind, args.port));
    info!("✅ Server ready at http://{}", addr);
    info!("📖 Swagger UI: http://{}/swagger-ui", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            let _ = shutdown_tx.send(true);
        })
        .await?;

    // Jobs already picked up finish their pipeline
    for worker in workers {
        let _ = worker.await;
    }

    info!("🛑 Server shut down gracefully.");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("⌨️  Ctrl+C received, starting graceful shutdown...");
        },
        _ = terminate => {
            info!("💤 SIGTERM received, starting graceful shutdown...");
        },
    }
}
