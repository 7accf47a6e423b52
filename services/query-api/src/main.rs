use clap::Parser;
use query_api::{server, ApiState, ChainRegistry, ServerConfig};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("query_api=debug,tower_http=info,info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = ServerConfig::parse();
    let registry = ChainRegistry::builtin();

    info!("{}", query_api::handler::VERSION);
    for chain_id in registry.chain_ids() {
        if let Ok(chain) = registry.resolve(chain_id) {
            info!("  chain {:>4}: {} ({})", chain_id, chain.display_name, chain.rpc_endpoint);
        }
    }
    info!("  custom json-rpc endpoints: {}", config.allow_custom_rpc);

    let state = ApiState::new(registry, config.allow_custom_rpc);
    server::serve(&config, state).await
}
