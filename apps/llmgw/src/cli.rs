use std::path::PathBuf;

use clap::Parser;

#[derive(Debug, Parser)]
#[command(name = "llmgw", about = "Multi-tenant LLM API gateway")]
pub struct Cli {
    /// Gateway config file (server settings + static routing directory).
    #[arg(long, env = "LLMGW_CONFIG", default_value = "llmgw.yaml")]
    pub config: PathBuf,

    /// Listen address override.
    #[arg(long, env = "LLMGW_LISTEN")]
    pub listen: Option<String>,

    /// Use the Redis-backed routing directory instead of the static file.
    #[arg(long, env = "LLMGW_REDIS_URL")]
    pub redis_url: Option<String>,

    /// Log filter when RUST_LOG is not set.
    #[arg(long, env = "LLMGW_LOG", default_value = "info")]
    pub log: String,
}
