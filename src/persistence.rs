use {
    serde::{de::DeserializeOwned, Serialize},
    std::{
        fs,
        path::Path,
    },
};

/// Outcome of reading a JSON snapshot from disk
#[derive(Debug, Clone, PartialEq)]
pub enum SnapshotLoad<T> {
    Loaded(T),
    Missing,
    /// File exists but could not be read or parsed
    Corrupt(String),
}

impl<T: Default> SnapshotLoad<T> {
    /// Collapse to a value; a corrupt snapshot is treated as empty state
    pub fn or_empty(self, file_path: &Path) -> T {
        match self {
            SnapshotLoad::Loaded(value) => value,
            SnapshotLoad::Missing => {
                log::info!("No existing snapshot file found: {}", file_path.display());
                T::default()
            }
            SnapshotLoad::Corrupt(reason) => {
                log::warn!(
                    "⚠️  Snapshot {} unreadable ({}), starting from empty state",
                    file_path.display(),
                    reason
                );
                T::default()
            }
        }
    }
}

/// Load a JSON snapshot
pub fn load_snapshot<T: DeserializeOwned>(file_path: &Path) -> SnapshotLoad<T> {
    if !file_path.exists() {
        return SnapshotLoad::Missing;
    }

    let json = match fs::read_to_string(file_path) {
        Ok(json) => json,
        Err(e) => return SnapshotLoad::Corrupt(e.to_string()),
    };
    match serde_json::from_str(&json) {
        Ok(value) => SnapshotLoad::Loaded(value),
        Err(e) => SnapshotLoad::Corrupt(e.to_string()),
    }
}

/// Rewrite a JSON snapshot wholesale
///
/// Writes to a sibling temp file and renames it over the target, so a crash
/// mid-write leaves the previous snapshot intact.
pub fn save_snapshot<T: Serialize + ?Sized>(value: &T, file_path: &Path) -> Result<(), std::io::Error> {
    if let Some(parent) = file_path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    let json = serde_json::to_string_pretty(value)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
    let tmp_path = file_path.with_extension("json.tmp");
    fs::write(&tmp_path, json)?;
    fs::rename(&tmp_path, file_path)?;

    log::debug!("Saved snapshot to {}", file_path.display());
    Ok(())
}
