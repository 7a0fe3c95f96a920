//! Source descriptors and the keyed edge files they point at.
//!
//! An edge file is a single JSON object mapping a record key to a
//! `[source, target]` pair:
//!
//! ```json
//! {"0": [1, 13], "1": [1, 11], "2": [2, 5]}
//! ```

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::{bail, Context};
use async_trait::async_trait;
use graphbulk_core::{EntityKey, Value};

use crate::traits::SourceReader;

/// One input file and the offset added to its numeric keys.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceDescriptor {
    pub file_path: PathBuf,
    pub offset: i64,
}

impl SourceDescriptor {
    #[must_use]
    pub fn new(file_path: impl Into<PathBuf>, offset: i64) -> Self {
        Self {
            file_path: file_path.into(),
            offset,
        }
    }

    /// Short name used in logs and reports.
    #[must_use]
    pub fn name(&self) -> String {
        self.file_path.display().to_string()
    }
}

/// Parses `PATH[:OFFSET]`. A suffix after the last `:` that is not an
/// integer is treated as part of the path, with offset 0.
impl FromStr for SourceDescriptor {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err("source path must not be empty".to_string());
        }
        if let Some((path, offset)) = s.rsplit_once(':') {
            if let Ok(offset) = offset.parse::<i64>() {
                if path.is_empty() {
                    return Err(format!("source path missing in {s:?}"));
                }
                return Ok(Self::new(path, offset));
            }
        }
        Ok(Self::new(s, 0))
    }
}

impl fmt::Display for SourceDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.file_path.display(), self.offset)
    }
}

/// One edge of a source file.
#[derive(Debug, Clone, PartialEq)]
pub struct EdgeRecord {
    pub key: EntityKey,
    pub source: Value,
    pub target: Value,
}

/// Edges of one source, in processing order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EdgeSet {
    pub records: Vec<EdgeRecord>,
}

impl EdgeSet {
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Builds the set from a decoded JSON object.
    ///
    /// Keys that are canonical array indices (`0`, `1`, ... below 2^32 - 1,
    /// no sign or leading zeros) come first in ascending numeric order, then
    /// every other key in file order.
    ///
    /// # Errors
    ///
    /// Fails on the first entry whose value is not a two-element array of
    /// scalars.
    pub fn from_json_map(map: serde_json::Map<String, serde_json::Value>) -> anyhow::Result<Self> {
        let mut indexed: Vec<(u32, EdgeRecord)> = Vec::new();
        let mut named: Vec<EdgeRecord> = Vec::new();

        for (raw_key, value) in map {
            let record = edge_record(&raw_key, value)?;
            match array_index(&raw_key) {
                Some(index) => indexed.push((index, record)),
                None => named.push(record),
            }
        }
        indexed.sort_by_key(|(index, _)| *index);

        let records = indexed
            .into_iter()
            .map(|(_, record)| record)
            .chain(named)
            .collect();
        Ok(Self { records })
    }
}

fn edge_record(raw_key: &str, value: serde_json::Value) -> anyhow::Result<EdgeRecord> {
    let serde_json::Value::Array(pair) = value else {
        bail!("entry {raw_key:?} is not a [source, target] array");
    };
    let [source, target]: [serde_json::Value; 2] = pair.try_into().map_err(|pair: Vec<_>| {
        anyhow::anyhow!("entry {raw_key:?} has {} elements, expected 2", pair.len())
    })?;
    let endpoint = |v: serde_json::Value, which: &str| -> anyhow::Result<Value> {
        if v.is_array() || v.is_object() {
            bail!("entry {raw_key:?} has a non-scalar {which}");
        }
        serde_json::from_value(v).with_context(|| format!("entry {raw_key:?} has an invalid {which}"))
    };
    Ok(EdgeRecord {
        key: EntityKey::parse(raw_key),
        source: endpoint(source, "source")?,
        target: endpoint(target, "target")?,
    })
}

/// Canonical array-index form of a key, if it has one.
fn array_index(key: &str) -> Option<u32> {
    let index = key.parse::<u32>().ok()?;
    (index != u32::MAX && index.to_string() == key).then_some(index)
}

/// Reads edge files from the local filesystem.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonEdgeReader;

impl JsonEdgeReader {
    async fn read_path(path: &Path) -> anyhow::Result<EdgeSet> {
        let bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("failed to read {}", path.display()))?;
        let map: serde_json::Map<String, serde_json::Value> = serde_json::from_slice(&bytes)
            .with_context(|| format!("{} is not a JSON object", path.display()))?;
        EdgeSet::from_json_map(map).with_context(|| format!("malformed edge file {}", path.display()))
    }
}

#[async_trait]
impl SourceReader for JsonEdgeReader {
    async fn read(&self, source: &SourceDescriptor) -> anyhow::Result<EdgeSet> {
        Self::read_path(&source.file_path).await
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use serde_json::json;

    use super::*;

    fn keys(set: &EdgeSet) -> Vec<String> {
        set.records.iter().map(|r| r.key.to_string()).collect()
    }

    #[test]
    fn descriptor_parses_path_and_offset() {
        let d: SourceDescriptor = "./data/edges-ab.json:2000000".parse().unwrap();
        assert_eq!(d, SourceDescriptor::new("./data/edges-ab.json", 2_000_000));

        let d: SourceDescriptor = "edges.json".parse().unwrap();
        assert_eq!(d.offset, 0);

        // A non-numeric suffix stays part of the path.
        let d: SourceDescriptor = "C:edges.json".parse().unwrap();
        assert_eq!(d.file_path, PathBuf::from("C:edges.json"));
        assert_eq!(d.offset, 0);

        assert!("".parse::<SourceDescriptor>().is_err());
        assert!(":5".parse::<SourceDescriptor>().is_err());
    }

    #[test]
    fn integer_keys_come_first_in_ascending_order() {
        let map = json!({
            "b": [1, 2],
            "10": [3, 4],
            "2": [5, 6],
            "007": [7, 8],
            "a": [9, 10],
            "-1": [11, 12],
            "0": [13, 14]
        });
        let serde_json::Value::Object(map) = map else {
            unreachable!()
        };
        let set = EdgeSet::from_json_map(map).unwrap();
        // "007" is not a canonical index, so it keeps its file position after
        // "b"; its key still parses as an integer.
        assert_eq!(keys(&set), ["0", "2", "10", "b", "7", "a", "-1"]);
        assert_eq!(set.records[4].key, EntityKey::Int(7));
        assert_eq!(set.records[4].source, Value::Int(7));
        assert_eq!(set.records[0].source, Value::Int(13));
        assert_eq!(set.records[0].target, Value::Int(14));
    }

    #[test]
    fn malformed_entries_are_rejected() {
        for bad in [json!({"0": 5}), json!({"0": [1]}), json!({"0": [1, 2, 3]}), json!({"0": [[1], 2]})] {
            let serde_json::Value::Object(map) = bad else {
                unreachable!()
            };
            assert!(EdgeSet::from_json_map(map).is_err());
        }
    }

    #[test]
    fn array_index_is_canonical_only() {
        assert_eq!(array_index("0"), Some(0));
        assert_eq!(array_index("4294967294"), Some(4_294_967_294));
        assert_eq!(array_index("4294967295"), None);
        assert_eq!(array_index("01"), None);
        assert_eq!(array_index("+1"), None);
        assert_eq!(array_index(""), None);
    }

    #[tokio::test]
    async fn reader_loads_file_from_disk() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"1": [1, 11], "0": [1, 13], "x": ["u", "v"]}}"#).unwrap();

        let source = SourceDescriptor::new(file.path(), 0);
        let set = JsonEdgeReader.read(&source).await.unwrap();
        assert_eq!(keys(&set), ["0", "1", "x"]);
        assert_eq!(set.records[2].source, Value::String("u".into()));
    }

    #[tokio::test]
    async fn reader_reports_missing_and_invalid_files() {
        let missing = SourceDescriptor::new("/definitely/not/here.json", 0);
        let err = JsonEdgeReader.read(&missing).await.unwrap_err();
        assert!(err.to_string().contains("failed to read"));

        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "[1, 2, 3]").unwrap();
        let err = JsonEdgeReader
            .read(&SourceDescriptor::new(file.path(), 0))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("not a JSON object"));
    }
}
