use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use tempfile::NamedTempFile;
use tracing::{debug, warn};

use super::model::ConfigRecord;

/// Extension for per-configuration record files.
const FILE_EXT: &str = "json";

/// Returns true if `name` is a safe configuration name: non-empty ASCII
/// letters, digits, underscore, hyphen. Anything else is rejected before a
/// path is ever built from it.
pub fn valid_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

/// File-backed store: one `<name>.json` per configuration under `root`.
///
/// No locking — concurrent uploads to the same configuration race and the
/// last write wins. Saves go through a temp file and rename so a reader
/// never observes a torn record.
#[derive(Clone)]
pub struct Store {
    root: Arc<PathBuf>,
}

impl Store {
    /// Open the store rooted at `root`, creating the directory if absent.
    pub fn open(root: &Path) -> Result<Self> {
        std::fs::create_dir_all(root)
            .with_context(|| format!("create storage dir: {}", root.display()))?;
        Ok(Self {
            root: Arc::new(root.to_owned()),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Validate `name` and resolve it to its record path, ensuring the
    /// storage directory exists.
    fn resolve(&self, name: &str) -> Result<PathBuf> {
        if !valid_name(name) {
            anyhow::bail!("invalid configuration name: {name:?}");
        }
        std::fs::create_dir_all(self.root.as_path()).context("create storage dir")?;
        Ok(self.root.join(format!("{name}.{FILE_EXT}")))
    }

    /// Load the record for `name`. A missing, unreadable, or malformed file
    /// yields the zero-value record — first use is not a fault. Corruption
    /// is logged so it stays observable.
    pub fn load(&self, name: &str) -> Result<ConfigRecord> {
        let path = self.resolve(name)?;
        let raw = match std::fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(ConfigRecord::empty(name)),
            Err(e) => {
                warn!(config = %name, error = %e, "record file unreadable; treating as empty");
                return Ok(ConfigRecord::empty(name));
            }
        };
        match serde_json::from_str(&raw) {
            Ok(record) => Ok(record),
            Err(e) => {
                warn!(config = %name, error = %e, "record file corrupt; treating as empty");
                Ok(ConfigRecord::empty(name))
            }
        }
    }

    /// Stamp `last_updated`, then write `record` as pretty-printed JSON,
    /// fully replacing any prior file. Returns the stamp.
    pub fn save(&self, name: &str, mut record: ConfigRecord) -> Result<DateTime<Utc>> {
        let path = self.resolve(name)?;
        let now = Utc::now();
        record.config_name = name.to_owned();
        record.last_updated = Some(now);

        let json = serde_json::to_string_pretty(&record).context("serialize record")?;

        // Write-then-rename keeps concurrent readers off half-written files.
        // Each save gets its own temp file so racing saves to the same
        // config cannot interleave bytes; the last rename wins whole.
        let mut tmp = NamedTempFile::new_in(self.root.as_path()).context("create temp file")?;
        tmp.write_all(json.as_bytes()).context("write temp record")?;
        tmp.persist(&path)
            .with_context(|| format!("rename into place: {}", path.display()))?;

        debug!(config = %name, "saved record");
        Ok(now)
    }

    /// Remove the record for `name`. Returns whether a file existed —
    /// absence is not an error.
    pub fn clear(&self, name: &str) -> Result<bool> {
        let path = self.resolve(name)?;
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e).with_context(|| format!("remove {}", path.display())),
        }
    }

    /// Remove the entire storage directory and recreate it empty.
    pub fn clear_all(&self) -> Result<()> {
        match std::fs::remove_dir_all(self.root.as_path()) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(e).context("remove storage dir"),
        }
        std::fs::create_dir_all(self.root.as_path()).context("recreate storage dir")
    }

    /// Enumerate stored configuration names, sorted, by scanning for
    /// record files. Temp files and foreign entries are skipped.
    pub fn list(&self) -> Result<Vec<String>> {
        let entries = match std::fs::read_dir(self.root.as_path()) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e).context("read storage dir"),
        };

        let mut names = Vec::new();
        for entry in entries {
            let path = entry.context("read storage dir entry")?.path();
            if path.extension().and_then(|e| e.to_str()) != Some(FILE_EXT) {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                if valid_name(stem) {
                    names.push(stem.to_owned());
                }
            }
        }
        names.sort();
        Ok(names)
    }
}
