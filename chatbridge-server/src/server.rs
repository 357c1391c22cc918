// chatbridge-server/src/server.rs

use std::net::SocketAddr;

use axum::{
    Json, Router,
    extract::{State, ws::{Message, WebSocket, WebSocketUpgrade}},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use tower::ServiceBuilder;
use tower_http::services::{ServeDir, ServeFile};
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

use chatbridge_common::models::ConfigUpdate;
use chatbridge_core::Error;

use crate::context::ServerContext;

pub fn router(ctx: ServerContext) -> Router {
    let mut app = Router::new()
        .route("/api/config", get(get_config).post(post_config))
        .route("/ws", get(ws_upgrade));

    if let Some(dir) = ctx.public_dir.clone() {
        app = app
            .route_service("/dashboard", ServeFile::new(dir.join("dashboard.html")))
            .fallback_service(ServeDir::new(dir));
    }

    app.with_state(ctx)
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
}

/// Binds `addr` and serves until `shutdown` resolves.
pub async fn serve<F>(ctx: ServerContext, addr: SocketAddr, shutdown: F) -> Result<(), Error>
where
    F: std::future::Future<Output = ()> + Send + 'static,
{
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Server running on http://{}", listener.local_addr()?);

    axum::serve(listener, router(ctx))
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}

async fn get_config(State(ctx): State<ServerContext>) -> impl IntoResponse {
    Json(ctx.store.snapshot())
}

async fn post_config(
    State(ctx): State<ServerContext>,
    Json(update): Json<ConfigUpdate>,
) -> Response {
    match ctx.supervisor.apply_configuration(update).await {
        Ok(config) => Json(json!({ "status": "ok", "config": config })).into_response(),
        Err(Error::InvalidConfig(msg)) => (
            StatusCode::BAD_REQUEST,
            Json(json!({ "status": "error", "error": msg })),
        )
            .into_response(),
        Err(e) => {
            warn!("config update failed: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "status": "error", "error": e.to_string() })),
            )
                .into_response()
        }
    }
}

async fn ws_upgrade(ws: WebSocketUpgrade, State(ctx): State<ServerContext>) -> Response {
    ws.on_upgrade(move |socket| viewer_loop(socket, ctx))
}

/// One display client: forwards hub messages as JSON text frames until either
/// side goes away.
async fn viewer_loop(socket: WebSocket, ctx: ServerContext) {
    let mut session = ctx.hub.join();
    let id = session.id();
    let (mut sink, mut stream) = socket.split();

    loop {
        tokio::select! {
            outgoing = session.recv() => {
                let Some(msg) = outgoing else { break };
                let text = match msg.to_json() {
                    Ok(t) => t,
                    Err(e) => {
                        warn!("[Hub] could not encode {} for {}: {}", msg.kind(), id, e);
                        continue;
                    }
                };
                if sink.send(Message::Text(text.into())).await.is_err() {
                    break;
                }
            }
            incoming = stream.next() => {
                match incoming {
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        debug!("[Hub] viewer {} socket error: {}", id, e);
                        break;
                    }
                }
            }
        }
    }

    ctx.hub.leave(id);
}
