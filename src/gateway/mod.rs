/// HTTP webhook server for the gateway.
///
/// Receives Feishu event callbacks and WeChat bridge events, turns them into
/// [`InboundMessage`]s and hands them to the [`MessageBus`]. Handlers answer
/// as soon as the message is queued; replies travel back through the
/// channels, never through the webhook response.
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{Value, json};
use tokio::sync::{Mutex, watch};
use tracing::{debug, error, info, warn};

use crate::bus::{InboundMessage, MessageBus};
use crate::channels::feishu::{FeishuChannel, FeishuEvent};
use crate::channels::wechat::{BRIDGE_TOKEN_HEADER, WechatChannel, WechatEvent};

/// Max webhook payload size: 1 MB.
const WEBHOOK_MAX_BODY: usize = 1_048_576;

/// Shared state for the webhook handlers.
#[derive(Clone)]
pub struct GatewayState {
    bus: Arc<Mutex<MessageBus>>,
    feishu: Option<Arc<FeishuChannel>>,
    wechat: Option<Arc<WechatChannel>>,
}

impl GatewayState {
    pub fn new(bus: Arc<Mutex<MessageBus>>) -> Self {
        Self {
            bus,
            feishu: None,
            wechat: None,
        }
    }

    #[must_use]
    pub fn with_feishu(mut self, channel: Arc<FeishuChannel>) -> Self {
        self.feishu = Some(channel);
        self
    }

    #[must_use]
    pub fn with_wechat(mut self, channel: Arc<WechatChannel>) -> Self {
        self.wechat = Some(channel);
        self
    }

    async fn publish(&self, msg: InboundMessage) {
        let channel = msg.channel.clone();
        if let Err(e) = self.bus.lock().await.publish_inbound(msg).await {
            // the platform already has its 200; a retry would only duplicate
            warn!("{} message not queued: {:#}", channel, e);
        }
    }
}

/// Build the webhook router. Routes for disabled channels answer 404.
pub fn build_router(state: GatewayState) -> Router {
    Router::new()
        .route("/api/health", get(health_handler))
        .route("/api/feishu/event", post(feishu_handler))
        .route("/api/wechat/event", post(wechat_handler))
        .with_state(state)
}

/// GET /api/health
async fn health_handler() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "version": crate::VERSION
    }))
}

fn parse_body(channel: &str, body: &Bytes) -> Result<Value, StatusCode> {
    if body.len() > WEBHOOK_MAX_BODY {
        warn!("{} webhook: payload too large ({} bytes)", channel, body.len());
        return Err(StatusCode::PAYLOAD_TOO_LARGE);
    }
    serde_json::from_slice(body).map_err(|e| {
        debug!("{} webhook: invalid json: {}", channel, e);
        StatusCode::BAD_REQUEST
    })
}

/// POST /api/feishu/event
async fn feishu_handler(State(state): State<GatewayState>, body: Bytes) -> impl IntoResponse {
    let Some(feishu) = state.feishu.clone() else {
        return StatusCode::NOT_FOUND.into_response();
    };
    let event = match parse_body("feishu", &body) {
        Ok(event) => event,
        Err(status) => return status.into_response(),
    };

    match feishu.handle_event(&event) {
        FeishuEvent::Challenge(challenge) => Json(json!({ "challenge": challenge })).into_response(),
        FeishuEvent::Forbidden => {
            warn!("feishu webhook: verification token mismatch");
            StatusCode::FORBIDDEN.into_response()
        }
        FeishuEvent::Ignored(reason) => {
            debug!("feishu event ignored: {}", reason);
            StatusCode::OK.into_response()
        }
        FeishuEvent::Message(msg) => {
            state.publish(*msg).await;
            StatusCode::OK.into_response()
        }
    }
}

/// POST /api/wechat/event
async fn wechat_handler(
    State(state): State<GatewayState>,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    let Some(wechat) = state.wechat.clone() else {
        return StatusCode::NOT_FOUND.into_response();
    };
    let token = headers
        .get(BRIDGE_TOKEN_HEADER)
        .and_then(|v| v.to_str().ok());
    if !wechat.authorize(token) {
        warn!("wechat webhook: bad bridge token");
        return StatusCode::FORBIDDEN.into_response();
    }
    let event = match parse_body("wechat", &body) {
        Ok(event) => event,
        Err(status) => return status.into_response(),
    };

    match wechat.handle_event(&event) {
        WechatEvent::Ignored(reason) => debug!("wechat event ignored: {}", reason),
        WechatEvent::Message(msg) => state.publish(*msg).await,
    }
    StatusCode::OK.into_response()
}

/// Serve the webhook router on `host:port` until `shutdown` flips to true.
pub async fn serve(
    host: &str,
    port: u16,
    state: GatewayState,
    mut shutdown: watch::Receiver<bool>,
) -> Result<()> {
    let addr: SocketAddr = format!("{}:{}", host, port)
        .parse()
        .with_context(|| format!("invalid gateway address {}:{}", host, port))?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    info!("webhook server listening on {}", addr);

    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(async move {
            while !*shutdown.borrow() {
                if shutdown.changed().await.is_err() {
                    break;
                }
            }
        })
        .await
        .inspect_err(|e| error!("webhook server error: {}", e))?;
    Ok(())
}
