// Copyright (c) 2022-2023 Yuki Kishimoto
// Copyright (c) 2023-2024 Rust Nostr Developers
// Distributed under the MIT software license

//! Binary entry point: parse the CLI, load configuration, open the store and
//! run the façade (spec §5, §6; SPEC_FULL §10).

use std::net::SocketAddr;
use std::sync::Arc;

use clap::Parser;
use hyper::server::conn::http1;
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;

use nostr_relay::broadcast::Registry;
use nostr_relay::cli::Cli;
use nostr_relay::config::Config;
use nostr_relay::facade::{self, AppState, RelayService};
use nostr_relay::store::{self, Store};
use nostr_relay::Result;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref())?;

    let filter = tracing_subscriber::EnvFilter::try_new(&config.log_level)
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let pool = store::open_pool(&config.database)?;
    let store = Arc::new(Store::new(pool, config.limits.max_limit));
    let registry = Arc::new(Registry::new());
    let config = Arc::new(config);

    tokio::spawn(facade::run_expiration_sweep(store.clone()));

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(%addr, "relay listening");

    let state = AppState {
        config,
        store,
        registry,
    };

    loop {
        let (stream, remote) = listener.accept().await?;
        let io = TokioIo::new(stream);
        let service = RelayService {
            state: state.clone(),
            remote,
            listen_addr: addr,
        };
        tokio::spawn(async move {
            if let Err(err) = http1::Builder::new()
                .serve_connection(io, service)
                .with_upgrades()
                .await
            {
                tracing::debug!(%err, "connection closed with error");
            }
        });
    }
}
