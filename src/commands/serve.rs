use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;

use clap::Args;

use crate::commands::build_aggregator;
use crate::config::AppConfig;
use crate::server::{self, ServerState};

#[derive(Debug, Args, Clone)]
pub struct ServeArgs {
    /// Address to listen on.
    #[arg(long, default_value_t = IpAddr::V4(Ipv4Addr::LOCALHOST))]
    bind: IpAddr,
    /// Port to listen on.
    #[arg(long, short = 'p', default_value_t = 8080)]
    port: u16,
}

pub async fn run(args: ServeArgs) -> Result<(), String> {
    let config = AppConfig::load()?;
    let state = ServerState {
        aggregator: build_aggregator(&config),
        targets: config.targets.clone(),
    };
    server::serve(SocketAddr::new(args.bind, args.port), Arc::new(state)).await
}
