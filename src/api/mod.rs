//! HTTP API over the orchestrator.
//!
//! ## Endpoints
//!
//! - `GET /api/health` - Health check
//! - `GET /api/config/prompts` - Prompt text of every strategy
//! - `GET /api/extract/:doc` - Task list (persisted, or a preview)
//! - `POST /api/workflow/translate/:doc` - Start a run
//! - `POST /api/workflow/cancel/:doc` - Cancel the active run
//! - `POST /api/tasks/:doc/:task_id/correct` - Queue a correction (`{"hint": "..."}`)
//! - `GET /api/progress/:doc` - SSE stream of `snapshot` events, then `done`

mod routes;
mod types;

pub use routes::{router, serve, AppState};
pub use types::*;
