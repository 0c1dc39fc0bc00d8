//! # Paper Translator
//!
//! Incremental, resumable translation of extracted academic papers.
//!
//! This library provides:
//! - A segmenter that turns an annotated text stream into typed chunks
//! - A content-addressed task store that carries finished work across runs
//! - An execution engine that drives pending tasks through a generation provider
//! - An HTTP API for starting, cancelling, correcting and watching runs
//!
//! ## Architecture
//!
//! ```text
//!   {doc}_context.txt ──► segment ──► merge ◄── {doc}_llm_cache.json
//!                                       │              ▲
//!                                       ▼              │ checkpoint
//!                               ExecutionEngine ───────┘
//!                                       │
//!                                       ▼
//!                                  LlmClient (OpenRouter)
//! ```
//!
//! ## Run Flow
//! 1. Segment the extracted stream into chunks
//! 2. Merge chunks with the previous snapshot by fingerprint
//! 3. Translate every pending task in id order, checkpointing each step
//! 4. Observers poll the snapshot for progress
//!
//! ## Modules
//! - `segment`: Chunking of the annotated stream
//! - `task`: Chunk, task and snapshot types
//! - `store`: Snapshot persistence and fingerprint merge
//! - `engine`: Run loop, prompt strategies, cancellation
//! - `orchestrator`: Per-document control surface
//! - `progress`: Snapshot polling stream

pub mod api;
pub mod config;
pub mod engine;
pub mod llm;
pub mod orchestrator;
pub mod progress;
pub mod segment;
pub mod store;
pub mod task;

pub use config::Config;
pub use orchestrator::{Orchestrator, OrchestratorError};
