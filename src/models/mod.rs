//! Core data models for the video ingest service.
//!
//! Records map to database rows via `sqlx::FromRow` and serialize as JSON
//! via `serde`.

pub mod video;
