//! Upload pipeline and the collaborators it drives.

pub mod auth;
pub mod blob_store;
pub mod keys;
pub mod metadata;
pub mod upload_pipeline;
