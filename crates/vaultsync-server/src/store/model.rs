use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Stored on disk as one pretty-printed JSON file per configuration.
/// `encrypted_data` is an opaque, client-encrypted blob — the server never
/// inspects or decrypts it beyond the best-effort display parse in
/// [`BackupInfo`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigRecord {
    pub config_name: String,
    /// The most recently uploaded blob, or `None` before the first upload.
    /// No history is kept — each upload fully replaces the previous one.
    pub encrypted_data: Option<String>,
    /// Stamped by the store on every save (ISO-8601).
    pub last_updated: Option<DateTime<Utc>>,
    /// Per-device upload bookkeeping, accumulated across uploads.
    #[serde(default)]
    pub device_info: BTreeMap<String, DeviceInfo>,
}

impl ConfigRecord {
    /// The zero-value record returned for configurations that have never
    /// been uploaded to (or whose file is unreadable).
    pub fn empty(config_name: &str) -> Self {
        Self {
            config_name: config_name.to_owned(),
            encrypted_data: None,
            last_updated: None,
            device_info: BTreeMap::new(),
        }
    }

    pub fn has_data(&self) -> bool {
        self.encrypted_data.is_some()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceInfo {
    /// Server-side time of this device's last upload.
    pub last_upload: DateTime<Utc>,
    /// Client-supplied timestamp, passed through unverified.
    pub timestamp: Option<i64>,
    pub version: String,
}

/// Best-effort view into an opaque blob for `/status` display.
/// The blob is client-encrypted; only its outer JSON envelope (if any)
/// carries these fields.
#[derive(Debug, Clone, Serialize)]
pub struct BackupInfo {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exported_at: Option<String>,
    /// First 8 characters of the client-supplied checksum.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checksum: Option<String>,
}

impl BackupInfo {
    /// Returns `None` when the blob is not a JSON object — a parse failure
    /// for one configuration must not fail the whole status response.
    pub fn parse(blob: &str) -> Option<Self> {
        let value: serde_json::Value = serde_json::from_str(blob).ok()?;
        let obj = value.as_object()?;

        let str_field = |key: &str| obj.get(key).and_then(|v| v.as_str()).map(str::to_owned);

        Some(Self {
            version: str_field("version"),
            exported_at: str_field("exportedAt"),
            checksum: str_field("checksum").map(|c| c.chars().take(8).collect()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backup_info_from_envelope() {
        let blob = r#"{"version":"1.0","exportedAt":"2024-01-01T00:00:00Z","checksum":"abcdef0123456789"}"#;
        let info = BackupInfo::parse(blob).unwrap();
        assert_eq!(info.version.as_deref(), Some("1.0"));
        assert_eq!(info.exported_at.as_deref(), Some("2024-01-01T00:00:00Z"));
        assert_eq!(info.checksum.as_deref(), Some("abcdef01"));
    }

    #[test]
    fn backup_info_missing_fields_are_none() {
        let info = BackupInfo::parse(r#"{"ciphertext":"..."}"#).unwrap();
        assert!(info.version.is_none());
        assert!(info.exported_at.is_none());
        assert!(info.checksum.is_none());
    }

    #[test]
    fn backup_info_rejects_non_json() {
        assert!(BackupInfo::parse("not json at all").is_none());
        assert!(BackupInfo::parse(r#""a bare string""#).is_none());
    }

    #[test]
    fn empty_record_has_no_data() {
        let rec = ConfigRecord::empty("work");
        assert_eq!(rec.config_name, "work");
        assert!(!rec.has_data());
        assert!(rec.device_info.is_empty());
    }
}
