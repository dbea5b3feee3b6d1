//! Health & readiness handlers.
//!
//! - GET /healthz  -> simple liveness ("ok")
//! - GET /readyz   -> readiness: SQLite plus the staging and object directories

use crate::state::AppState;
use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use serde::Serialize;
use std::{collections::HashMap, path::Path};
use tokio::fs;
use uuid::Uuid;

/// `GET /healthz`
///
/// Very small liveness probe. Always returns 200 OK with a plain JSON body.
/// This endpoint should be cheap and never perform I/O.
pub async fn healthz() -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(HealthResponse {
            status: "ok".into(),
        }),
    )
}

/// `GET /readyz`
///
/// Ready when SQLite answers `SELECT 1` and every directory an upload
/// writes to accepts a write/read/delete round trip: the staging dir, and
/// the object dir when objects are kept locally.
pub async fn readyz(State(state): State<AppState>) -> impl IntoResponse {
    let mut checks = HashMap::new();

    let sqlite = match sqlx::query_scalar::<_, i64>("SELECT 1")
        .fetch_one(&*state.metadata.db)
        .await
    {
        Ok(1) => CheckStatus::ok(),
        Ok(v) => CheckStatus::failed(format!("unexpected result: {}", v)),
        Err(e) => CheckStatus::failed(format!("error: {}", e)),
    };
    checks.insert("sqlite", sqlite);
    checks.insert(
        "temp_dir",
        check_writable(&state.pipeline.config().temp_dir).await,
    );
    if let Some(objects) = &state.local_objects {
        checks.insert("storage_dir", check_writable(&objects.base_path).await);
    }

    let overall_ok = checks.values().all(|c| c.ok);
    let body = ReadyResponse {
        status: if overall_ok { "ok" } else { "error" }.into(),
        checks,
    };
    let status = if overall_ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(body))
}

/// Write, read back and delete a marker file in `dir`.
async fn check_writable(dir: &Path) -> CheckStatus {
    let marker = dir.join(format!(".readyz-{}", Uuid::new_v4()));
    if let Err(e) = fs::write(&marker, b"readyz").await {
        return CheckStatus::failed(format!("could not write {}: {}", dir.display(), e));
    }
    let read = fs::read(&marker).await;
    let removed = fs::remove_file(&marker).await;
    match (read, removed) {
        (Ok(bytes), _) if bytes != b"readyz" => CheckStatus::failed("file content mismatch"),
        (Ok(_), Ok(())) => CheckStatus::ok(),
        (Ok(_), Err(e)) => CheckStatus {
            ok: true,
            error: Some(format!("could not remove marker: {}", e)),
        },
        (Err(e), _) => CheckStatus::failed(format!("could not read marker: {}", e)),
    }
}

#[derive(Serialize)]
struct HealthResponse {
    status: String,
}

#[derive(Serialize)]
struct ReadyResponse {
    status: String,
    checks: HashMap<&'static str, CheckStatus>,
}

#[derive(Serialize, Debug)]
struct CheckStatus {
    ok: bool,
    error: Option<String>,
}

impl CheckStatus {
    fn ok() -> Self {
        Self { ok: true, error: None }
    }

    fn failed(error: impl Into<String>) -> Self {
        Self {
            ok: false,
            error: Some(error.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn writable_dir_passes_and_leaves_nothing_behind() {
        let dir = TempDir::new().unwrap();
        let status = check_writable(dir.path()).await;
        assert!(status.ok, "{:?}", status.error);
        assert!(status.error.is_none());
        assert!(std::fs::read_dir(dir.path()).unwrap().next().is_none());
    }

    #[tokio::test]
    async fn missing_dir_fails() {
        let dir = TempDir::new().unwrap();
        let status = check_writable(&dir.path().join("objects")).await;
        assert!(!status.ok);
        assert!(status.error.unwrap().contains("could not write"));
    }
}
