// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Device-model proxy: a broker that lets independently-deployed object
//! models reach each other for state/event publish-subscribe and
//! request/response method calls.

pub mod admission;
pub mod codec;
pub mod config;
pub mod connection;
pub mod error;
pub mod logging;
pub mod router;
pub mod schema;
pub mod transport;
pub mod worker;

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::config::ProxyConfig;
use crate::logging::FrameLog;

/// Run the proxy until `shutdown` fires: the TCP listener always starts;
/// the WebSocket listener starts alongside it when `--ws` is set.
pub async fn run(config: ProxyConfig, shutdown: CancellationToken) -> anyhow::Result<()> {
    if config.print_meta {
        let schema = router::proxy_schema();
        println!("{}", String::from_utf8_lossy(schema.to_canonical_json()));
        return Ok(());
    }

    let frame_log = if config.log_frames { Some(Arc::new(FrameLog::open()?)) } else { None };

    let router = router::spawn(shutdown.clone());
    let addr = config.addr.clone();
    let ws_addr = config.ws_addr.clone();
    let enable_ws = config.ws;
    let config = Arc::new(config);

    info!(addr, ws = enable_ws, "device-proxy starting");

    let tcp_task = tokio::spawn(transport::tcp::serve(
        addr,
        router.clone(),
        Arc::clone(&config),
        frame_log.clone(),
        shutdown.clone(),
    ));

    let ws_task = if enable_ws {
        let ctx = transport::ws::WsContext { router, config: Arc::clone(&config), frame_log };
        Some(tokio::spawn(transport::ws::serve(ws_addr, ctx, shutdown)))
    } else {
        None
    };

    tcp_task.await??;
    if let Some(ws_task) = ws_task {
        ws_task.await??;
    }
    Ok(())
}
