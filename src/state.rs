//! Shared state handed to every handler.

use crate::services::{
    auth::Authenticator, blob_store::LocalObjectStore, metadata::SqliteMetadataStore,
    upload_pipeline::UploadPipeline,
};
use std::{sync::Arc, time::Duration};

#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<UploadPipeline>,
    pub metadata: SqliteMetadataStore,
    pub authenticator: Arc<dyn Authenticator>,
    /// Present when objects are kept on local disk and served by this process.
    pub local_objects: Option<LocalObjectStore>,
    pub upload_timeout: Duration,
}
