use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;

use crate::cache::ParamValue;

// Predict API request format
#[derive(Deserialize, Serialize, Clone)]
pub struct GenerateRequest {
    pub model: String,
    pub prompt: String,

    // Generation knobs, defaults match the backend's
    #[serde(default = "default_max_length")]
    pub max_length: u32,
    #[serde(default = "default_num_return_sequences")]
    pub num_return_sequences: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f64,

    // Streaming responses bypass the cache entirely
    #[serde(default)]
    pub stream: bool,
}

fn default_max_length() -> u32 {
    50
}

fn default_num_return_sequences() -> u32 {
    1
}

fn default_temperature() -> f64 {
    0.7
}

impl GenerateRequest {
    // Every parameter that affects the generated output, for key derivation
    pub fn cache_params(&self) -> [(&'static str, ParamValue); 4] {
        [
            ("model", ParamValue::Text(self.model.clone())),
            ("max_length", ParamValue::Int(i64::from(self.max_length))),
            (
                "num_return_sequences",
                ParamValue::Int(i64::from(self.num_return_sequences)),
            ),
            ("temperature", ParamValue::Float(self.temperature)),
        ]
    }
}

// Backend API response format
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct GenerateResponse {
    pub model: String,
    pub response: String,
}

// Queued request - holds request + response channel
pub struct BatchedRequest {
    pub request: GenerateRequest,
    pub response_tx: oneshot::Sender<Result<GenerateResponse, String>>, // one-time channel to send back response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::derive_key;

    #[test]
    fn omitted_generation_knobs_take_defaults() {
        let req: GenerateRequest =
            serde_json::from_str(r#"{"model": "tiny-gpt2", "prompt": "hola"}"#).unwrap();
        assert_eq!(req.max_length, 50);
        assert_eq!(req.num_return_sequences, 1);
        assert_eq!(req.temperature, 0.7);
        assert!(!req.stream);
    }

    #[test]
    fn explicit_defaults_share_a_cache_key_with_omitted_ones() {
        let omitted: GenerateRequest =
            serde_json::from_str(r#"{"model": "tiny-gpt2", "prompt": "hola"}"#).unwrap();
        let explicit: GenerateRequest = serde_json::from_str(
            r#"{"model": "tiny-gpt2", "prompt": "hola", "max_length": 50, "num_return_sequences": 1, "temperature": 0.7}"#,
        )
        .unwrap();

        assert_eq!(
            derive_key(&omitted.prompt, &omitted.cache_params()),
            derive_key(&explicit.prompt, &explicit.cache_params()),
        );
    }
}
