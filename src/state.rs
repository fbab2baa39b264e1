use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

use crate::cache::ResponseCache;
use crate::models::BatchedRequest;
use crate::providers::ProviderPool;
use crate::rate_limit::RateLimitEntry;

// app's shared state
pub struct AppState {
    pub client: reqwest::Client,
    pub cache: Arc<ResponseCache>,
    pub providers: Arc<ProviderPool>,
    pub rate_limiter: DashMap<String, RateLimitEntry>,
    pub rate_limit: u32,       // max requests allowed per window
    pub rate_window: Duration, // duration of the rate limit window
    pub batch_tx: mpsc::Sender<BatchedRequest>,
}
