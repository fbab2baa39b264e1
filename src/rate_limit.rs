use std::time::Instant;

// Fixed-window counter, tracked per client key
pub struct RateLimitEntry {
    pub count: u32,
    pub window_start: Instant,
}
