//! One-shot JSON persistence of the harvested roster.
//!
//! There is no incremental output format: the full record set is written
//! exactly once, at successful or soft-successful completion.

use std::path::Path;

use tracing::info;

use crate::core::{HarvestError, Record};

/// Write the record set as a pretty-printed JSON array.
///
/// Tmp-then-rename, so an interrupted write never leaves a torn file at the
/// output path.
pub fn write_records(path: &Path, records: &[Record]) -> Result<(), HarvestError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let body = serde_json::to_vec_pretty(records).map_err(std::io::Error::other)?;
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, &body)?;
    std::fs::rename(&tmp, path)?;
    info!("💾 wrote {} records to {}", records.len(), path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(key: &str, name: &str) -> Record {
        Record {
            username: key.to_string(),
            display_name: name.to_string(),
            profile_ref: format!("https://www.tiktok.com/@{key}"),
        }
    }

    #[test]
    fn output_is_a_parseable_array_with_wire_names() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("roster.json");

        write_records(&path, &[record("a", "Alice"), record("b", "")]).unwrap();

        let body = std::fs::read_to_string(&path).unwrap();
        let json: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(json.as_array().unwrap().len(), 2);
        assert_eq!(json[0]["username"], "a");
        assert_eq!(json[0]["displayName"], "Alice");
        assert_eq!(json[0]["profileRef"], "https://www.tiktok.com/@a");

        // No stray tmp file once the rename landed.
        let leftovers: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.path().extension().is_some_and(|x| x == "tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn missing_parent_directories_are_created() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("out").join("roster.json");

        write_records(&path, &[record("a", "Alice")]).unwrap();
        assert!(path.exists());
    }

    #[test]
    fn empty_harvest_still_writes_a_valid_array() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("roster.json");

        write_records(&path, &[]).unwrap();
        let json: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(json, serde_json::json!([]));
    }
}
