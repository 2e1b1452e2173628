use anyhow::Context;
use log::info;
use meshcache::{
    cluster::PeerRegistry,
    eager_env::{self, check_env},
    group::{Group, GroupRegistry},
    loader::DirLoader,
    server::{AppStateInner, start_server},
};
use std::{net::TcpListener, sync::Arc};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Local development convenience; real deployments set the environment.
    let _ = dotenvy::dotenv();

    env_logger::builder()
        .format_timestamp(Some(env_logger::TimestampPrecision::Millis))
        .init();
    check_env();

    let self_address = eager_env::SELF_ADDRESS.clone();
    let peers: Vec<String> = eager_env::PEER_ADDRESSES
        .split(',')
        .map(str::trim)
        .filter(|addr| !addr.is_empty())
        .map(String::from)
        .collect();

    let registry = Arc::new(PeerRegistry::new(self_address.clone()));
    registry.set_peers(peers.clone());
    info!("cache node {self_address} with {} peer(s)", peers.len());

    let loader = Arc::new(DirLoader::new(&*eager_env::CACHE_ROOT));
    let group = Arc::new(Group::new(
        "files",
        *eager_env::CACHE_CAPACITY,
        loader,
        registry,
    ));

    let groups = GroupRegistry::new();
    groups.register(group);

    let state = Arc::new(AppStateInner { groups });
    let listener = TcpListener::bind(("0.0.0.0", *eager_env::PORT))
        .with_context(|| format!("failed to bind port {}", *eager_env::PORT))?;

    start_server(state, listener).await?;

    Ok(())
}
