//! Artifact writer.
//!
//! Serializes raw batches and the enriched table into the job's scratch
//! directory. A write lands in a sibling temp file first and is renamed into
//! place, so a destination path either holds a complete file or nothing new.
//! Output is deterministic: identical input gives byte-identical files.

use std::fs;
use std::path::{Path, PathBuf};

use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use tweetscout_common::EnrichedRecord;
use uuid::Uuid;

use crate::error::WriteError;

#[derive(Serialize)]
struct BatchEntry<'a> {
    item: &'a serde_json::Value,
    item_number: usize,
}

/// Row-number-keyed table: `{"0": {...}, "1": {...}}`.
struct IndexedTable<'a>(&'a [EnrichedRecord]);

impl Serialize for IndexedTable<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (row, record) in self.0.iter().enumerate() {
            map.serialize_entry(&row.to_string(), record)?;
        }
        map.end()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ArtifactWriter;

impl ArtifactWriter {
    pub fn new() -> Self {
        Self
    }

    /// Write provider entries as `[{"item": ..., "item_number": n}]`, 1-based.
    pub fn write_batch(&self, items: &[serde_json::Value], dest: &Path) -> Result<(), WriteError> {
        let entries: Vec<BatchEntry<'_>> = items
            .iter()
            .enumerate()
            .map(|(i, item)| BatchEntry {
                item,
                item_number: i + 1,
            })
            .collect();
        self.write_json(&entries, dest)
    }

    /// Write the enriched table, one row per record in insertion order.
    pub fn write_table(&self, records: &[EnrichedRecord], dest: &Path) -> Result<(), WriteError> {
        self.write_json(&IndexedTable(records), dest)
    }

    fn write_json<T: Serialize + ?Sized>(&self, value: &T, dest: &Path) -> Result<(), WriteError> {
        let bytes = serde_json::to_vec_pretty(value).map_err(|source| WriteError::Serialize {
            path: dest.to_path_buf(),
            source,
        })?;

        if let Some(parent) = dest.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|source| WriteError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let tmp = temp_path(dest);
        let result = fs::write(&tmp, &bytes).and_then(|_| fs::rename(&tmp, dest));
        if let Err(source) = result {
            let _ = fs::remove_file(&tmp);
            return Err(WriteError::Io {
                path: dest.to_path_buf(),
                source,
            });
        }

        tracing::debug!(path = %dest.display(), bytes = bytes.len(), "Artifact written");
        Ok(())
    }
}

fn temp_path(dest: &Path) -> PathBuf {
    let name = dest
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "artifact".to_string());
    dest.with_file_name(format!(".{name}.{}.tmp", Uuid::new_v4()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};
    use tweetscout_common::{ExtractedFacts, GeoPoint, Month, RawItem};

    fn record(title: &str, geo: GeoPoint) -> EnrichedRecord {
        let item = RawItem::new(title, "smoke everywhere", None, Value::Null);
        let facts = ExtractedFacts {
            city: "Malibu".into(),
            country: "USA".into(),
            year: 2024,
            month: Month::March,
            day: "09".into(),
            disaster_type: "wildfire".into(),
        };
        EnrichedRecord::new(&item, facts, geo)
    }

    #[test]
    fn batch_shape_is_item_and_one_based_number() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("scraped/tweet_1.json");
        ArtifactWriter::new()
            .write_batch(&[json!({"title": "a"}), json!({"title": "b"})], &dest)
            .unwrap();

        let written: Value = serde_json::from_slice(&fs::read(&dest).unwrap()).unwrap();
        assert_eq!(
            written,
            json!([
                {"item": {"title": "a"}, "item_number": 1},
                {"item": {"title": "b"}, "item_number": 2}
            ])
        );
    }

    #[test]
    fn table_columns_are_ordered_and_rows_keyed_by_index() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("augmented/data.json");
        let records = [
            record("first", GeoPoint::Resolved { latitude: 34.0, longitude: -118.5 }),
            record("second", GeoPoint::Unresolved),
        ];
        ArtifactWriter::new().write_table(&records, &dest).unwrap();

        let text = fs::read_to_string(&dest).unwrap();
        let positions: Vec<usize> = tweetscout_common::TABLE_COLUMNS
            .iter()
            .map(|c| text.find(&format!("\"{c}\"")).unwrap())
            .collect();
        assert!(positions.windows(2).all(|w| w[0] < w[1]), "columns out of order");

        let table: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(table["0"]["Title"], "first");
        assert_eq!(table["0"]["Resolved_Latitude"], 34.0);
        assert_eq!(table["1"]["Resolved_Latitude"], "unresolved");
        assert_eq!(table["1"]["Resolved_Longitude"], "unresolved");
        assert_eq!(table["1"]["Extracted_Location"], "Malibu,USA");
        assert_eq!(table["1"]["Month"], "March");
        assert_eq!(table["1"]["Year"], 2024);
    }

    #[test]
    fn leaves_no_temp_files_behind() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("out.json");
        ArtifactWriter::new().write_batch(&[json!(1)], &dest).unwrap();
        let names: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(names, vec![std::ffi::OsString::from("out.json")]);
    }

    #[test]
    fn unwritable_destination_is_a_write_error() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("scraped");
        fs::write(&blocker, b"not a directory").unwrap();
        let err = ArtifactWriter::new()
            .write_batch(&[json!(1)], &blocker.join("tweet_1.json"))
            .unwrap_err();
        assert!(matches!(err, WriteError::Io { .. }));
    }
}
