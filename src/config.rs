use clap::Parser;

// CLI argument structure
#[derive(Parser, Debug, Clone)]
#[command(name = "llm-gateway")]
#[command(about = "Caching gateway for LLM inference backends")]
pub struct Args {
    // Port to run the server on
    #[arg(short, long, default_value_t = 8080)]
    pub port: u16,

    // Backend servers (comma-separated)
    // Example: "localhost:11434,localhost:11435"
    #[arg(short, long, default_value = "localhost:11434")]
    pub backends: String,

    // Max number of cached responses before LRU eviction
    #[arg(long, default_value_t = 100)]
    pub cache_capacity: usize,

    // Default cache TTL in seconds
    #[arg(short, long, default_value_t = 3600)]
    pub cache_ttl: u64,

    // Rate limit max requests per window
    #[arg(long, default_value_t = 10)]
    pub rate_limit: u32,

    // Rate limit window in seconds
    #[arg(long, default_value_t = 60)]
    pub rate_window: u64,

    // Health check interval
    #[arg(long, default_value_t = 30)]
    pub health_interval: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_parse() {
        let args = Args::try_parse_from(["llm-gateway"]).unwrap();
        assert_eq!(args.port, 8080);
        assert_eq!(args.cache_capacity, 100);
        assert_eq!(args.cache_ttl, 3600);
    }

    #[test]
    fn cache_knobs_are_overridable() {
        let args =
            Args::try_parse_from(["llm-gateway", "--cache-capacity", "8", "--cache-ttl", "60"])
                .unwrap();
        assert_eq!(args.cache_capacity, 8);
        assert_eq!(args.cache_ttl, 60);
    }
}
