//! WebSocket + HTTP front of the relay.
//!
//! One warp server: `/ws` carries the event protocol, `/api/status` reports
//! relay statistics, `/` is a plain banner for load-balancer checks. Each
//! accepted WebSocket gets an unbounded outbound queue; a forward task owns
//! the sink half so routing never blocks on a slow client.

use crate::config::RelayConfig;
use anyhow::Result;
use futures::{SinkExt, StreamExt};
use gramline_core::RelayRouter;
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tracing::{info, warn};
use warp::filters::BoxedFilter;
use warp::{Filter, Reply};

/// Shared state for the HTTP endpoints.
pub struct ServerContext {
    pub router: Arc<RelayRouter>,
    pub start_time: Instant,
}

impl ServerContext {
    pub fn new(router: Arc<RelayRouter>) -> Self {
        Self {
            router,
            start_time: Instant::now(),
        }
    }
}

#[derive(Serialize)]
struct StatusResponse {
    service: &'static str,
    version: &'static str,
    uptime_seconds: u64,
    stats: gramline_core::RelayStats,
}

/// Assemble the full route tree with CORS applied.
pub fn routes(ctx: Arc<ServerContext>, config: &RelayConfig) -> BoxedFilter<(impl Reply,)> {
    let ctx_filter = warp::any().map({
        let ctx = ctx.clone();
        move || ctx.clone()
    });

    // 1. Banner at /
    let banner_route = warp::path::end()
        .and(warp::get())
        .map(|| format!("gramline-relay {}", env!("CARGO_PKG_VERSION")))
        .boxed();

    // 2. WebSocket at /ws
    let ws_route = warp::path("ws")
        .and(warp::ws())
        .and(ctx_filter.clone())
        .map(|ws: warp::ws::Ws, ctx: Arc<ServerContext>| {
            ws.on_upgrade(move |socket| handle_connection(socket, ctx.router.clone()))
        })
        .boxed();

    // 3. Status API
    let status_route = warp::path!("api" / "status")
        .and(warp::get())
        .and(ctx_filter)
        .map(|ctx: Arc<ServerContext>| {
            warp::reply::json(&StatusResponse {
                service: "gramline-relay",
                version: env!("CARGO_PKG_VERSION"),
                uptime_seconds: ctx.start_time.elapsed().as_secs(),
                stats: ctx.router.stats(),
            })
        })
        .boxed();

    let mut cors = warp::cors().allow_methods(vec!["GET", "POST"]);
    if config.allow_any_origin() {
        cors = cors.allow_any_origin();
    } else {
        for origin in &config.cors_origins {
            cors = cors.allow_origin(origin.as_str());
        }
    }

    banner_route
        .or(ws_route)
        .or(status_route)
        .with(cors)
        .boxed()
}

/// Bind and serve until ctrl-c.
pub async fn run(config: RelayConfig, router: Arc<RelayRouter>) -> Result<()> {
    let ctx = Arc::new(ServerContext::new(router));
    let routes = routes(ctx, &config);

    let (addr, server) =
        warp::serve(routes).bind_with_graceful_shutdown(config.bind_addr(), async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutdown signal received");
        });

    info!(%addr, "relay listening");
    server.await;
    info!("relay stopped");
    Ok(())
}

/// Per-connection pump: transport frames in, queued events out.
async fn handle_connection(ws: warp::ws::WebSocket, router: Arc<RelayRouter>) {
    let (mut ws_tx, mut ws_rx) = ws.split();
    let (tx, mut rx) = mpsc::unbounded_channel();
    let conn = router.handle_connect(tx);

    // Outbound queue -> WebSocket. Queue order is delivery order, which is
    // what gives per-destination FIFO.
    let forward_task = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            match event.to_json() {
                Ok(json) => {
                    if ws_tx.send(warp::ws::Message::text(json)).await.is_err() {
                        break;
                    }
                }
                Err(err) => {
                    warn!(%err, "failed to serialize outbound event");
                }
            }
        }
    });

    // WebSocket -> router. Binary, ping and pong frames are ignored; warp
    // answers pings itself.
    while let Some(result) = ws_rx.next().await {
        match result {
            Ok(msg) => {
                if let Ok(text) = msg.to_str() {
                    router.handle_frame(conn, text);
                } else if msg.is_close() {
                    break;
                }
            }
            Err(err) => {
                warn!(%conn, %err, "websocket error");
                break;
            }
        }
    }

    router.handle_disconnect(conn);
    forward_task.abort();
}
