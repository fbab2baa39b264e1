use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use thiserror::Error;
use tokio::time::{Duration, interval};
use tracing::{debug, info, warn};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProviderPoolError {
    #[error("at least one backend URL is required")]
    NoBackends,
}

// Single inference backend
pub struct Backend {
    pub url: String,
    healthy: AtomicBool,
}

impl Backend {
    pub fn new(url: String) -> Self {
        Self {
            url,
            healthy: AtomicBool::new(true),
        }
    }

    pub fn is_healthy(&self) -> bool {
        self.healthy.load(Ordering::Relaxed)
    }

    pub fn set_healthy(&self, healthy: bool) {
        self.healthy.store(healthy, Ordering::Relaxed);
    }
}

// Pool of inference backends with round-robin selection
pub struct ProviderPool {
    backends: Vec<Arc<Backend>>,
    current: AtomicUsize,
}

impl ProviderPool {
    // Create from comma-separated urls: "localhost:11434,localhost:11435"
    pub fn new(backends_str: &str) -> Result<Self, ProviderPoolError> {
        let backends: Vec<Arc<Backend>> = backends_str
            .split(',')
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .map(|url| {
                // add http:// if not present
                let full_url = if url.starts_with("http") {
                    url.to_string()
                } else {
                    format!("http://{url}")
                };
                Arc::new(Backend::new(full_url))
            })
            .collect();

        if backends.is_empty() {
            return Err(ProviderPoolError::NoBackends);
        }

        info!("provider pool initialized with {} backends", backends.len());
        for (i, b) in backends.iter().enumerate() {
            debug!("  [{}] {}", i + 1, b.url);
        }

        Ok(Self {
            backends,
            current: AtomicUsize::new(0),
        })
    }

    // Get next healthy backend (round-robin)
    pub fn next_healthy(&self) -> Option<Arc<Backend>> {
        let len = self.backends.len();
        let start = self.current.fetch_add(1, Ordering::Relaxed) % len;

        for i in 0..len {
            let idx = (start + i) % len;
            let backend = &self.backends[idx];

            if backend.is_healthy() {
                return Some(Arc::clone(backend));
            }
        }
        // No healthy backends
        None
    }

    pub fn all_backends(&self) -> &[Arc<Backend>] {
        &self.backends
    }
}

// Marks backends healthy/unhealthy on a fixed interval
pub async fn health_checker(
    pool: Arc<ProviderPool>,
    client: reqwest::Client,
    check_interval: Duration,
) {
    let mut interval = interval(check_interval);
    info!("health checker started (interval: {:?})", check_interval);

    loop {
        interval.tick().await;

        for backend in pool.all_backends() {
            let url = format!("{}/health", backend.url);
            let was_healthy = backend.is_healthy();

            let is_healthy = match client.get(&url).timeout(Duration::from_secs(5)).send().await {
                Ok(res) => res.status().is_success(),
                Err(_) => false,
            };
            backend.set_healthy(is_healthy);

            if was_healthy != is_healthy {
                if is_healthy {
                    info!("backend {} is healthy again", backend.url);
                } else {
                    warn!("backend {} is unhealthy", backend.url);
                }
            }
        }
    }
}
