use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    Router,
    extract::{State, WebSocketUpgrade},
    http::HeaderValue,
    response::IntoResponse,
    routing::get,
};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use circle_api::{AppState, AppStateInner, Config};
use circle_gateway::{Dispatcher, connection};
use circle_media::CloudinaryClient;
use circle_push::FcmClient;

const REMINDER_JOB_ARG: &str = "send-daily-reminder";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "circle=debug,circle_api=debug,tower_http=debug".into()),
        )
        .init();

    let config = Config::from_env()?;
    let db = circle_db::Database::open(&config.db_path)?;

    let mut inner = AppStateInner::new(db, config.clone(), Dispatcher::new());
    match &config.fcm_credentials {
        Some(path) => inner = inner.with_push(FcmClient::from_file(path)?),
        None => warn!("CIRCLE_FCM_CREDENTIALS not set, push notifications disabled"),
    }
    match config.cloudinary.clone() {
        Some(cloudinary) => inner = inner.with_media(CloudinaryClient::new(cloudinary)?),
        None => warn!("Cloudinary not configured, profile picture uploads disabled"),
    }
    let state: AppState = Arc::new(inner);

    // One-shot mode for the external nightly scheduler
    if std::env::args().nth(1).as_deref() == Some(REMINDER_JOB_ARG) {
        return run_reminder_job(&state).await;
    }

    let ws_route = Router::new()
        .route("/gateway", get(ws_upgrade))
        .with_state(state.clone());

    let app = Router::new()
        .merge(circle_api::router(state))
        .merge(ws_route)
        .layer(cors_layer(&config.cors_origins)?)
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    info!("Circle server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn run_reminder_job(state: &AppState) -> anyhow::Result<()> {
    let push = state
        .push
        .as_ref()
        .ok_or_else(|| anyhow::anyhow!("{} requires CIRCLE_FCM_CREDENTIALS", REMINDER_JOB_ARG))?;
    let summary = circle_push::send_daily_reminder(state.db.clone(), push.as_ref()).await?;
    info!(
        "Reminder job finished: {} users, {} sent, {} failed, {} tokens removed",
        summary.total_users, summary.success_count, summary.failure_count, summary.invalid_tokens_removed
    );
    Ok(())
}

fn cors_layer(origins: &[String]) -> anyhow::Result<CorsLayer> {
    if origins.is_empty() {
        return Ok(CorsLayer::permissive());
    }
    let origins = origins
        .iter()
        .map(|o| o.parse::<HeaderValue>())
        .collect::<Result<Vec<_>, _>>()?;
    Ok(CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods(Any)
        .allow_headers(Any))
}

async fn ws_upgrade(State(state): State<AppState>, ws: WebSocketUpgrade) -> impl IntoResponse {
    let ctx = state.gateway_context();
    ws.on_upgrade(move |socket| connection::handle_connection(socket, ctx))
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => info!("Received Ctrl+C, shutting down..."),
                    _ = sigterm.recv() => info!("Received SIGTERM, shutting down..."),
                }
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                ctrl_c.await.ok();
            }
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
        info!("Received Ctrl+C, shutting down...");
    }
}
