use axum::{
    Json,
    extract::State,
    response::{
        IntoResponse, Response,
        sse::{Event, KeepAlive, Sse},
    },
};
use futures_util::stream;
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::oneshot;

use crate::metrics::{REQUEST_LATENCY, REQUEST_TOTAL};
use crate::models::{BatchedRequest, GenerateRequest, GenerateResponse};
use crate::rate_limit::RateLimitEntry;
use crate::state::AppState;

// Rate limit check function
fn check_rate_limit(state: &AppState, ip: &str) -> bool {
    let now = Instant::now();

    let mut entry = state
        .rate_limiter
        .entry(ip.to_string())
        .or_insert(RateLimitEntry {
            count: 0,
            window_start: now,
        });

    if entry.window_start.elapsed() > state.rate_window {
        entry.count = 1;
        entry.window_start = now;
        return true;
    }

    if entry.count < state.rate_limit {
        entry.count += 1;
        return true;
    }

    false
}

pub async fn generate_handler(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<GenerateRequest>,
) -> Result<Response, String> {
    REQUEST_TOTAL.inc();

    if !check_rate_limit(&state, "global") {
        return Err("Rate limit exceeded. Try again later.".to_string());
    }

    // streaming requests skip key derivation, lookup and storage entirely
    if payload.stream {
        return stream_generate(&state, payload).await;
    }

    let start_time = Instant::now();

    let (response_tx, response_rx) = oneshot::channel();

    let batched = BatchedRequest {
        request: payload,
        response_tx,
    };

    state
        .batch_tx
        .send(batched)
        .await
        .map_err(|_| "Failed to queue request".to_string())?;

    let result = response_rx
        .await
        .map_err(|_| "Worker failed to respond".to_string())?;

    REQUEST_LATENCY.observe(start_time.elapsed().as_secs_f64());

    result.map(|body| Json(body).into_response())
}

// Calls a backend directly and replays the generated text word by word as
// server-sent events
async fn stream_generate(state: &AppState, req: GenerateRequest) -> Result<Response, String> {
    let backend = state
        .providers
        .next_healthy()
        .ok_or_else(|| "No healthy backends available".to_string())?;

    let res = state
        .client
        .post(format!("{}/api/generate", backend.url))
        .json(&req)
        .send()
        .await
        .map_err(|e| format!("Request failed: {e}"))?;

    let body: GenerateResponse = res
        .json()
        .await
        .map_err(|e| format!("Parse error: {e}"))?;

    let words: Vec<String> = body
        .response
        .split_whitespace()
        .map(|w| w.to_string())
        .collect();

    let events = stream::iter(
        words
            .into_iter()
            .map(|w| Ok::<_, Infallible>(Event::default().data(w)))
            .chain(std::iter::once(Ok(Event::default().data("[DONE]")))),
    );

    Ok(Sse::new(events).keep_alive(KeepAlive::default()).into_response())
}
