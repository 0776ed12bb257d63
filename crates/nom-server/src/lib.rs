//! HTTP command surface
//!
//! | route            | runs                                |
//! |------------------|-------------------------------------|
//! | `GET /`          | health text                         |
//! | `GET /status`    | the `status` command                |
//! | `GET /state`     | cached node values, scheduled work  |
//! | `GET /cmd/:cmd`  | a command batch                     |
//! | `POST /cmd`      | a command batch from the body       |
//! | `GET /do/:action`| actions by id                       |
//! | `POST /do`       | actions by id from the body         |

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use nom_command::Controller;
use nom_core::{CommandOptions, Context, Response};
use serde_json::Value;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

/// Shared state of all handlers
pub type AppState = Arc<Controller>;

/// Create the HTTP router
pub fn create_router(controller: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(health))
        .route("/status", get(status))
        .route("/state", get(state))
        .route("/cmd", post(command_body))
        .route("/cmd/:cmd", get(command_path))
        .route("/do", post(actions_body))
        .route("/do/:action", get(actions_path))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(controller)
}

/// Bind and serve until `shutdown` resolves
pub async fn start_server(
    controller: AppState,
    port: u16,
    shutdown: impl std::future::Future<Output = ()> + Send + 'static,
) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port)).await?;
    info!("nomctrl listening on port {}", port);
    axum::serve(listener, create_router(controller))
        .with_graceful_shutdown(shutdown)
        .await
}

async fn health() -> &'static str {
    "nomctrl up"
}

async fn run(controller: &Controller, command: &str) -> Json<Value> {
    let response = controller
        .execute(command, CommandOptions::default(), Context::new())
        .await;
    Json(response.to_json())
}

async fn status(State(controller): State<AppState>) -> Json<Value> {
    run(&controller, "status").await
}

async fn state(State(controller): State<AppState>) -> Json<Value> {
    Json(controller.status())
}

async fn command_path(State(controller): State<AppState>, Path(cmd): Path<String>) -> Json<Value> {
    run(&controller, &cmd).await
}

async fn command_body(State(controller): State<AppState>, body: String) -> Json<Value> {
    run(&controller, &body).await
}

/// Action ids separated by whitespace or commas
fn action_ids(text: &str) -> Vec<&str> {
    text.split(|c: char| c.is_whitespace() || c == ',')
        .filter(|id| !id.is_empty())
        .collect()
}

async fn actions(controller: &Controller, text: &str) -> Json<Value> {
    let ids = action_ids(text);
    let response: Response = controller.run_actions(&ids, Context::new()).await;
    Json(response.to_json())
}

async fn actions_path(
    State(controller): State<AppState>,
    Path(action): Path<String>,
) -> Json<Value> {
    actions(&controller, &action).await
}

async fn actions_body(State(controller): State<AppState>, body: String) -> Json<Value> {
    actions(&controller, &body).await
}
