// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

/// Configuration for the device-model proxy.
#[derive(Debug, Clone, clap::Parser)]
#[command(version, about = "device-model proxy: broker for object-model state/event/call traffic")]
pub struct ProxyConfig {
    /// TCP listen address.
    #[arg(long, default_value = "0.0.0.0:8080", env = "PROXY_ADDR")]
    pub addr: String,

    /// Enable the WebSocket listener alongside the TCP one.
    #[arg(long, env = "PROXY_WS")]
    pub ws: bool,

    /// WebSocket listen address (only used when `--ws` is set).
    #[arg(long = "ws-addr", default_value = "0.0.0.0:9090", env = "PROXY_WS_ADDR")]
    pub ws_addr: String,

    /// Echo every decoded/encoded frame to stdout.
    #[arg(short = 'p', long = "print", env = "PROXY_PRINT")]
    pub print_frames: bool,

    /// Tee every frame as a JSON line to `./logs/<date>.log`.
    #[arg(long = "log", env = "PROXY_LOG")]
    pub log_frames: bool,

    /// Print the proxy's own canonical schema and exit.
    #[arg(long = "meta")]
    pub print_meta: bool,
}

impl ProxyConfig {
    pub fn admission_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(5)
    }

    pub fn admission_grace(&self) -> std::time::Duration {
        std::time::Duration::from_secs(1)
    }
}
