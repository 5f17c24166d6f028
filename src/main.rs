//! hystrix-service
//!
//! Resilience layer in front of a remote user service.
//!
//! # Architecture Overview
//!
//! ```text
//!                       ┌──────────────────────────────────────────────────────┐
//!                       │                   HYSTRIX SERVICE                    │
//!                       │                                                      │
//!   Client Request      │  ┌─────────┐   ┌───────────┐   ┌──────────────────┐  │
//!   ────────────────────┼─▶│  http   │──▶│   scope   │──▶│   UserService    │  │
//!                       │  │ server  │   │middleware │   │  commands and    │  │
//!                       │  └─────────┘   └───────────┘   │  collapser       │  │
//!                       │                                └────────┬─────────┘  │
//!                       │                                         ▼            │
//!                       │   ┌───────────────┐   ┌──────────────────────────┐   │
//!                       │   │ request cache │◀──│ executor: breaker,       │   │
//!                       │   │  (per scope)  │   │ bulkhead, timeout,       │   │
//!                       │   └───────────────┘   │ fallback                 │   │
//!                       │                       └────────────┬─────────────┘   │
//!   Client Response     │                                    ▼                 │
//!   ◀───────────────────┼─── ApiResult envelope       RemoteCaller ───────────┼──▶ User
//!                       │                                                      │    Service
//!                       └──────────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;

use hystrix_service::config::{load_config, ServiceConfig};
use hystrix_service::http::HttpServer;
use hystrix_service::lifecycle::{spawn_signal_handler, Shutdown};
use hystrix_service::observability::init_logging;
use hystrix_service::remote::{HttpRemoteCaller, RemoteCaller};
use hystrix_service::user::UserService;

#[derive(Parser)]
#[command(name = "hystrix-service")]
#[command(about = "Circuit breaking, caching and collapsing in front of the user service", long_about = None)]
struct Args {
    /// TOML configuration file; built-in defaults when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the listen address.
    #[arg(short, long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => load_config(path)?,
        None => ServiceConfig::default(),
    };
    if let Some(bind) = args.bind {
        config.server.bind_address = bind;
    }

    init_logging(&config.logging)?;

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        config = ?args.config,
        bind_address = %config.server.bind_address,
        user_service = %config.user_service.base_url,
        command_timeout_ms = config.command.timeout_ms,
        "hystrix-service starting"
    );

    let caller: Arc<dyn RemoteCaller> = Arc::new(HttpRemoteCaller::new(&config.user_service)?);
    let service = Arc::new(UserService::new(&config, caller));

    let listener = TcpListener::bind(&config.server.bind_address).await?;
    let local_addr = listener.local_addr()?;
    tracing::info!(address = %local_addr, "Listening for connections");

    let shutdown = Shutdown::new();
    let server_shutdown = shutdown.subscribe();
    spawn_signal_handler(shutdown);

    let server = HttpServer::new(config, service);
    server.run(listener, server_shutdown).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
