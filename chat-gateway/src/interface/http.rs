//! HTTP 接口：WebSocket 接入、健康检查与指标导出

use std::sync::Arc;

use axum::Router;
use axum::extract::ws::{WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::http::header::CONTENT_TYPE;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use futures::StreamExt;
use serde::Deserialize;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::application::Hub;
use crate::domain::model::AuthenticatedUser;
use crate::infrastructure::auth::JwtAuthenticator;
use crate::interface::connection::{ConnectionSettings, run_connection};

/// 路由共享状态
#[derive(Clone)]
pub struct AppState {
    pub hub: Hub,
    pub authenticator: Arc<JwtAuthenticator>,
    pub connection: ConnectionSettings,
    pub max_message_size: usize,
}

#[derive(Debug, Deserialize)]
pub struct WsConnectParams {
    #[serde(default)]
    pub token: Option<String>,
}

/// 构建网关路由
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .route("/healthz", get(healthz))
        .route("/metrics", get(metrics))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// WebSocket 握手：先校验 token，再升级连接
async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<WsConnectParams>,
    State(state): State<AppState>,
) -> Response {
    let user = match authorize(&state.authenticator, &params) {
        Ok(user) => user,
        Err(status) => return (status, "unauthorized").into_response(),
    };

    info!(user_id = %user.user_id, "Websocket handshake accepted");
    let max_message_size = state.max_message_size;
    ws.max_message_size(max_message_size)
        .on_upgrade(move |socket| handle_socket(socket, user, state))
}

/// 握手鉴权，失败返回 401
pub fn authorize(
    authenticator: &JwtAuthenticator,
    params: &WsConnectParams,
) -> Result<AuthenticatedUser, StatusCode> {
    let token = params.token.as_deref().unwrap_or_default();
    authenticator.authenticate(token).map_err(|err| {
        warn!(error = %err, "Rejecting websocket handshake");
        StatusCode::UNAUTHORIZED
    })
}

async fn handle_socket(socket: WebSocket, user: AuthenticatedUser, state: AppState) {
    let (sink, stream) = socket.split();
    run_connection(sink, stream, user, state.hub, state.connection).await;
}

async fn healthz() -> &'static str {
    "ok"
}

async fn metrics() -> impl IntoResponse {
    (
        [(CONTENT_TYPE, "text/plain; version=0.0.4")],
        chat_core::metrics::gather_metrics(),
    )
}
