// JSONL backup and restore of a storage area

use crate::area::StorageArea;
use eyre::{Context, Result};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;
use tracing::{info, warn};

/// One stored key per line
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackupEntry {
    pub key: String,
    pub value: Value,
}

/// Write every entry of `area` to `path`, replacing the file.
///
/// Entries whose stored text is not JSON are skipped. Returns the number written.
pub fn export_jsonl(area: &dyn StorageArea, path: &Path) -> Result<usize> {
    let file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(path)
        .context("Failed to open backup file for writing")?;

    // Acquire exclusive lock before writing
    file.lock_exclusive().context("Failed to acquire file lock")?;

    let mut writer = BufWriter::new(&file);
    let mut count = 0;

    for key in area.keys()? {
        let Some(raw) = area.get_item(&key)? else {
            continue;
        };

        let value: Value = match serde_json::from_str(&raw) {
            Ok(v) => v,
            Err(e) => {
                warn!(key, error = ?e, "Stored value is not JSON, not exported");
                continue;
            }
        };

        let line = serde_json::to_string(&BackupEntry { key, value })?;
        writeln!(writer, "{}", line)?;
        count += 1;
    }

    writer.flush()?;
    drop(writer);
    file.sync_all()?; // Ensure data is flushed to disk

    info!(file = ?path, count, "Exported storage backup");
    Ok(count)
}

/// Read a backup written by [`export_jsonl`], returning entries in file order.
///
/// Malformed lines are skipped with a warning.
pub fn read_backup(path: &Path) -> Result<Vec<BackupEntry>> {
    let file = File::open(path).context("Failed to open backup file")?;
    let reader = BufReader::new(file);
    let mut entries = Vec::new();

    for (line_num, line) in reader.lines().enumerate() {
        let line = match line {
            Ok(l) => l,
            Err(e) => {
                warn!(
                    file = ?path,
                    line = line_num + 1,
                    error = ?e,
                    "Failed to read line, skipping"
                );
                continue;
            }
        };

        if line.trim().is_empty() {
            continue;
        }

        match serde_json::from_str::<BackupEntry>(&line) {
            Ok(entry) => entries.push(entry),
            Err(e) => {
                warn!(
                    file = ?path,
                    line = line_num + 1,
                    error = ?e,
                    "Failed to parse JSON, skipping"
                );
            }
        }
    }

    Ok(entries)
}

/// Restore a backup into `area`, overwriting keys it contains. Returns the number restored.
///
/// All or nothing: if any entry fails to store, the keys already restored get
/// their previous values back before the error is returned.
pub fn import_jsonl(area: &dyn StorageArea, path: &Path) -> Result<usize> {
    let entries = read_backup(path)?;
    let count = entries.len();

    let mut replaced: Vec<(String, Option<String>)> = Vec::with_capacity(count);
    for entry in entries {
        let previous = area.get_item(&entry.key)?;
        if let Err(e) = area.set_item(&entry.key, &entry.value.to_string()) {
            undo_import(area, replaced);
            return Err(e).with_context(|| format!("Failed to restore key {}", entry.key));
        }
        replaced.push((entry.key, previous));
    }

    info!(file = ?path, count, "Imported storage backup");
    Ok(count)
}

/// Walk back a partial import, newest write first
fn undo_import(area: &dyn StorageArea, replaced: Vec<(String, Option<String>)>) {
    warn!(restored = replaced.len(), "Import failed, rolling back");

    for (key, previous) in replaced.into_iter().rev() {
        let undone = match &previous {
            Some(value) => area.set_item(&key, value),
            None => area.remove_item(&key),
        };
        if let Err(e) = undone {
            warn!(key, error = %e, "Failed to roll back restored key");
        }
    }
}
