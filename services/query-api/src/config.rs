use clap::Parser;

#[derive(Parser, Clone, Debug)]
#[command(name = "query-api")]
#[command(about = "Read-only HTTP gateway for EVM contract queries")]
pub struct ServerConfig {
    /// Server host
    #[arg(long, default_value = "0.0.0.0", env = "HOST")]
    pub host: String,

    /// Server port
    #[arg(short, long, default_value_t = 8080, env = "PORT")]
    pub port: u16,

    /// Honour the per-request `json-rpc` endpoint override
    #[arg(
        long,
        default_value_t = true,
        env = "ALLOW_CUSTOM_RPC",
        action = clap::ArgAction::Set
    )]
    pub allow_custom_rpc: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            allow_custom_rpc: true,
        }
    }
}
