use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::cache::{ResponseCache, derive_key};
use crate::metrics::{CACHE_HITS, CACHE_MISSES, CACHE_SIZE};
use crate::models::{BatchedRequest, GenerateResponse};
use crate::providers::ProviderPool;

// Background worker -> processes queued requests one by one, read-through
// against the response cache
pub async fn batch_worker(
    mut rx: mpsc::Receiver<BatchedRequest>,
    client: reqwest::Client,
    providers: Arc<ProviderPool>,
    cache: Arc<ResponseCache>,
) {
    info!("batch worker started - processing requests sequentially");

    while let Some(batched_req) = rx.recv().await {
        let req = &batched_req.request;
        let cache_key = derive_key(&req.prompt, &req.cache_params());

        // check cache first
        if let Some(payload) = cache.get(&cache_key) {
            CACHE_HITS.inc();
            let _ = batched_req.response_tx.send(Ok(payload));
            continue;
        }
        CACHE_MISSES.inc();

        let backend = match providers.next_healthy() {
            Some(b) => b,
            None => {
                let _ = batched_req
                    .response_tx
                    .send(Err("No healthy backends available".to_string()));
                continue;
            }
        };
        debug!("using backend {}", backend.url);

        let result = client
            .post(format!("{}/api/generate", backend.url))
            .json(&batched_req.request)
            .send()
            .await;

        let response = match result {
            Ok(res) => match res.json::<GenerateResponse>().await {
                Ok(body) => {
                    // only successful, complete responses are cached
                    cache.insert(cache_key, body.clone());
                    CACHE_SIZE.set(cache.len() as f64);
                    Ok(body)
                }
                Err(e) => Err(format!("Parse error: {e}")),
            },
            Err(e) => {
                backend.set_healthy(false);
                warn!("backend {} failed, marked unhealthy", backend.url);
                Err(format!("Request failed: {e}"))
            }
        };
        // Send response back to handler
        let _ = batched_req.response_tx.send(response);
    }
}
