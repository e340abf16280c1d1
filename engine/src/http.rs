//! The read-only introspection surface: `/health`, `/approvals`,
//! `/schedule` — the three endpoints an unattended content operator
//! needs to check on. Everything that can *change* state goes through
//! the Operations Agent's inbox (`sentrypost_ops::InboxPoller`), not
//! HTTP.

use std::net::SocketAddr;

use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use serde_json::json;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::state::AppState;

pub async fn serve(addr: SocketAddr, state: AppState) -> anyhow::Result<()> {
    let app = app_router(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("sentrypost-engine listening on http://{addr}");
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if tokio::signal::ctrl_c().await.is_err() {
                futures::future::pending::<()>().await;
            }
        })
        .await?;
    Ok(())
}

fn app_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health))
        .route("/approvals", get(approvals))
        .route("/schedule", get(schedule))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

async fn health(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({
        "status": "online",
        "killSwitchActive": state.kill_switch.is_active(),
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn approvals(State(state): State<AppState>) -> impl IntoResponse {
    match state.approvals.get_pending(None).await {
        Ok(pending) => Json(json!({ "pending": pending })).into_response(),
        Err(e) => {
            tracing::error!(error = %e, "failed to list pending approvals");
            (axum::http::StatusCode::INTERNAL_SERVER_ERROR, "failed to list pending approvals").into_response()
        }
    }
}

async fn schedule(State(state): State<AppState>) -> impl IntoResponse {
    match state.scheduler.get_upcoming(24).await {
        Ok(upcoming) => Json(json!({ "upcoming": upcoming })).into_response(),
        Err(e) => {
            tracing::error!(error = %e, "failed to list upcoming schedule");
            (axum::http::StatusCode::INTERNAL_SERVER_ERROR, "failed to list upcoming schedule").into_response()
        }
    }
}
