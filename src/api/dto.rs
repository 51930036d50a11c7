//! REST API response data transfer objects

use serde::Serialize;

/// Ping response
#[derive(Debug, Serialize)]
pub struct PingResponse {
    pub status: String,
    pub model_ready: bool,
    pub version: String,
    pub uptime_seconds: u64,
}

/// Error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

impl ErrorResponse {
    pub fn new(error: &str, code: &str) -> Self {
        Self {
            error: error.to_string(),
            code: code.to_string(),
        }
    }
}
