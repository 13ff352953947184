//! JSON document file: a mapping of table name to a list of objects.
//!
//! ```json
//! { "keys": [ { "service": "OpenAI", "key": "AQ..." } ] }
//! ```
//!
//! Tables other than the one being edited are carried through rewrites untouched.

use std::{
    collections::BTreeMap,
    fs,
    io::{ErrorKind, Write},
    path::Path,
};

use keyjar_core::{records::Record, storage::StoreError};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tempfile::NamedTempFile;

/// Table holding API key records.
pub const KEYS_TABLE: &str = "keys";

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Document {
    tables: BTreeMap<String, Value>,
}

impl Document {
    /// Read the document at `path`. A missing or blank file is an empty document.
    pub fn load(path: &Path) -> Result<Self, StoreError> {
        let contents = match fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Self::default()),
            Err(err) => return Err(storage_err(err)),
        };
        if contents.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_json::from_str(&contents).map_err(|e| StoreError::Storage {
            reason: format!("malformed document {}: {e}", path.display()),
        })
    }

    /// Atomically replace the file at `path` with this document.
    pub fn save(&self, path: &Path) -> Result<(), StoreError> {
        let parent = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        fs::create_dir_all(parent).map_err(storage_err)?;

        let mut tmp = NamedTempFile::new_in(parent).map_err(storage_err)?;
        let json = serde_json::to_vec_pretty(self).map_err(storage_err)?;
        tmp.write_all(&json).map_err(storage_err)?;
        tmp.flush().map_err(storage_err)?;
        tmp.persist(path).map_err(|e| storage_err(e.error))?;
        Ok(())
    }

    /// Records in `table`, in file order. A missing table is empty.
    pub fn records(&self, table: &str) -> Result<Vec<Record>, StoreError> {
        match self.tables.get(table) {
            None | Some(Value::Null) => Ok(Vec::new()),
            Some(value) => {
                Vec::<Record>::deserialize(value).map_err(|e| StoreError::Storage {
                    reason: format!("malformed table `{table}`: {e}"),
                })
            }
        }
    }

    pub fn set_records(&mut self, table: &str, records: &[Record]) -> Result<(), StoreError> {
        let value = serde_json::to_value(records).map_err(storage_err)?;
        self.tables.insert(table.to_string(), value);
        Ok(())
    }
}

fn storage_err<E: ToString>(err: E) -> StoreError {
    StoreError::Storage {
        reason: err.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_and_blank_files_are_empty() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("api_keys.json");
        let doc = Document::load(&path).expect("missing file");
        assert!(doc.records(KEYS_TABLE).expect("records").is_empty());

        fs::write(&path, "  \n").expect("write");
        let doc = Document::load(&path).expect("blank file");
        assert_eq!(doc, Document::default());
    }

    #[test]
    fn save_then_load_keeps_records_in_order() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("api_keys.json");

        let mut doc = Document::default();
        let records = vec![Record::new("b", "1"), Record::new("a", "2")];
        doc.set_records(KEYS_TABLE, &records).expect("set");
        doc.save(&path).expect("save");

        let loaded = Document::load(&path).expect("load");
        assert_eq!(loaded.records(KEYS_TABLE).expect("records"), records);
    }

    #[test]
    fn other_tables_survive_a_rewrite() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("api_keys.json");
        fs::write(
            &path,
            r#"{"_default": {"1": {"note": "x"}}, "keys": [{"service": "s", "key": "k"}]}"#,
        )
        .expect("write");

        let mut doc = Document::load(&path).expect("load");
        doc.set_records(KEYS_TABLE, &[]).expect("set");
        doc.save(&path).expect("save");

        let raw: Value =
            serde_json::from_str(&fs::read_to_string(&path).expect("read")).expect("json");
        assert_eq!(raw["_default"]["1"]["note"], "x");
        assert_eq!(raw["keys"], Value::Array(vec![]));
    }

    #[test]
    fn object_missing_fields_is_a_storage_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("api_keys.json");
        fs::write(&path, r#"{"keys": [{"service": "only"}]}"#).expect("write");

        let doc = Document::load(&path).expect("load");
        let err = doc.records(KEYS_TABLE).expect_err("malformed record");
        assert!(matches!(err, StoreError::Storage { .. }));
    }

    #[test]
    fn invalid_json_is_a_storage_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("api_keys.json");
        fs::write(&path, "{not json").expect("write");
        let err = Document::load(&path).expect_err("invalid json");
        assert!(matches!(err, StoreError::Storage { .. }));
    }
}
