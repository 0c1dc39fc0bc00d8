//! API request and response types.

use serde::{Deserialize, Serialize};

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub fast_model: String,
    pub correction_model: String,
    /// Documents with an active run.
    pub active_runs: Vec<String>,
}

/// Body of a correction request.
#[derive(Debug, Deserialize)]
pub struct CorrectionRequest {
    pub hint: String,
}

#[derive(Debug, Serialize)]
pub struct CancelResponse {
    pub document_id: String,
    /// False when no run was active.
    pub cancelled: bool,
}
