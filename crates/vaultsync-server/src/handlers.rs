use axum::{
    extract::{Path, State},
    Json,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;

use crate::{
    error::ApiError,
    store::{valid_name, BackupInfo, DeviceInfo},
    AppState,
};

fn default_version() -> String {
    "1.0".into()
}

#[derive(Debug, Deserialize)]
pub struct UploadRequest {
    pub device_id: Option<String>,
    /// Client-supplied timestamp, stored as-is.
    pub timestamp: Option<i64>,
    /// The opaque encrypted blob. Required; everything else is optional.
    pub encrypted_data: Option<String>,
    #[serde(default = "default_version")]
    pub version: String,
}

/// Validate a path-supplied configuration name before it touches the store.
fn validate(name: &str) -> Result<&str, ApiError> {
    if valid_name(name) {
        Ok(name)
    } else {
        Err(ApiError::invalid_name(name))
    }
}

// ── Health ───────────────────────────────────────────────────────────────────

pub async fn health() -> Json<Value> {
    Json(json!({"status": "ok"}))
}

// ── Upload ───────────────────────────────────────────────────────────────────

/// `POST /sync/{config}` — replace the stored blob and upsert the uploading
/// device's bookkeeping entry.
pub async fn upload(
    State(state): State<AppState>,
    Path(config): Path<String>,
    Json(body): Json<UploadRequest>,
) -> Result<Json<Value>, ApiError> {
    let name = validate(&config)?;

    let encrypted_data = body
        .encrypted_data
        .filter(|d| !d.is_empty())
        .ok_or_else(|| ApiError::Validation("encrypted_data is required".into()))?;

    let mut record = state.store.load(name)?;
    record.encrypted_data = Some(encrypted_data);

    if let Some(device_id) = body.device_id.filter(|d| !d.is_empty()) {
        record.device_info.insert(
            device_id,
            DeviceInfo {
                last_upload: Utc::now(),
                timestamp: body.timestamp,
                version: body.version.clone(),
            },
        );
    }

    let stored_at = state.store.save(name, record)?;
    info!(config = %name, version = %body.version, "backup uploaded");

    Ok(Json(json!({
        "status": "success",
        "message": "Data uploaded successfully",
        "config_name": name,
        "stored_at": stored_at,
    })))
}

// ── Download ─────────────────────────────────────────────────────────────────

/// `GET /sync/{config}` — return the stored blob, re-parsed and re-served as
/// JSON. The blob is not reinterpreted; a non-JSON blob comes back as a JSON
/// string.
pub async fn download(
    State(state): State<AppState>,
    Path(config): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let name = validate(&config)?;
    let record = state.store.load(name)?;

    let blob = record
        .encrypted_data
        .ok_or_else(|| ApiError::NotFound("No backup has been uploaded yet".into()))?;

    info!(config = %name, last_updated = ?record.last_updated, "backup downloaded");
    let value = serde_json::from_str(&blob).unwrap_or(Value::String(blob));
    Ok(Json(value))
}

// ── Status ───────────────────────────────────────────────────────────────────

/// `GET /status` — unauthenticated overview of every stored configuration.
/// Backup-info fields are best effort: a blob that fails to parse just
/// omits them for that configuration.
pub async fn status(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let mut configs = Vec::new();
    for name in state.store.list()? {
        let record = state.store.load(&name)?;
        let mut entry = json!({
            "config_name": name,
            "has_data": record.has_data(),
            "last_updated": record.last_updated,
            "devices": record.device_info.keys().collect::<Vec<_>>(),
        });
        if let Some(info) = record.encrypted_data.as_deref().and_then(BackupInfo::parse) {
            entry["backup_info"] = json!(info);
        }
        configs.push(entry);
    }

    Ok(Json(json!({
        "status": "running",
        "storage_dir": state.store.root().display().to_string(),
        "configs": configs,
    })))
}

// ── Clear ────────────────────────────────────────────────────────────────────

/// `POST /clear/{config}` — remove one configuration's record.
pub async fn clear_config(
    State(state): State<AppState>,
    Path(config): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let name = validate(&config)?;
    let existed = state.store.clear(name)?;
    info!(config = %name, existed, "backup cleared");
    Ok(Json(json!({
        "status": "success",
        "message": format!("Data for {name} has been cleared"),
    })))
}

/// `POST /clear` — remove every stored configuration.
pub async fn clear_all(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    state.store.clear_all()?;
    info!("all backups cleared");
    Ok(Json(json!({
        "status": "success",
        "message": "All data has been cleared",
    })))
}
