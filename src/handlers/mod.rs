mod cache_admin;
mod generate;
mod health;
mod metrics;

pub use cache_admin::{cache_clear_handler, cache_stats_handler};
pub use generate::generate_handler;
pub use health::health_handler;
pub use metrics::metrics_handler;
