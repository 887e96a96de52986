use crate::domain::{CalcError, CalcResult, ResultRecord};
use crate::parameters::{ParameterSet, RECOGNIZED_KEYS};
use crate::structure::{Structure, parse_extxyz, write_extxyz};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::info;

pub const RECORD_EXTENSION: &str = "json";

/// Where a labelled record lives: `<directory>/<label>.json`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordStore {
    directory: PathBuf,
    label: String,
}

impl RecordStore {
    pub fn new(directory: impl Into<PathBuf>, label: impl Into<String>) -> CalcResult<Self> {
        let label = label.into();
        if label.trim().is_empty() || label.contains(['/', '\\']) {
            return Err(CalcError::setup(
                "SETUP.LABEL",
                format!(
                    "record label '{}' must be a non-empty file stem without path separators",
                    label
                ),
            ));
        }
        Ok(Self {
            directory: directory.into(),
            label,
        })
    }

    /// Splits a path such as `runs/si.json` into directory and label.
    pub fn from_path(path: &Path) -> CalcResult<Self> {
        let label = path
            .file_stem()
            .and_then(|stem| stem.to_str())
            .unwrap_or_default();
        let directory = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        Self::new(directory, label)
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn path(&self) -> PathBuf {
        self.directory
            .join(format!("{}.{}", self.label, RECORD_EXTENSION))
    }

    pub fn exists(&self) -> bool {
        self.path().is_file()
    }
}

/// Parameters, results and structure. A solver solution is never stored.
#[derive(Debug, Clone, PartialEq)]
pub struct PersistedRecord {
    pub parameters: ParameterSet,
    pub results: ResultRecord,
    pub structure: Structure,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct RecordDocument {
    parameters: ParameterSet,
    results: ResultRecord,
    structure: String,
}

pub fn render_record(record: &PersistedRecord) -> CalcResult<String> {
    let document = RecordDocument {
        parameters: record.parameters.clone(),
        results: record.results.clone(),
        structure: write_extxyz(&record.structure),
    };
    let json = serde_json::to_string_pretty(&document).map_err(|error| {
        CalcError::internal(
            "IO.RECORD_ENCODE",
            format!("failed to encode calculator record: {}", error),
        )
    })?;
    Ok(normalize_record_text(&json))
}

pub fn parse_record(source: &str) -> CalcResult<PersistedRecord> {
    let document: RecordDocument = serde_json::from_str(source).map_err(|error| {
        CalcError::corrupt_record(
            "IO.RECORD_PARSE",
            format!("record is not a valid calculator record: {}", error),
        )
    })?;
    if let Some((key, _)) = document
        .parameters
        .iter()
        .find(|(key, _)| !RECOGNIZED_KEYS.contains(key))
    {
        return Err(CalcError::corrupt_record(
            "IO.RECORD_PARSE",
            format!("record holds unknown parameter '{}'", key),
        ));
    }
    let structure = parse_extxyz(&document.structure).map_err(|error| {
        CalcError::corrupt_record(
            "IO.RECORD_STRUCTURE",
            format!("record structure could not be parsed: {}", error),
        )
    })?;

    Ok(PersistedRecord {
        parameters: document.parameters,
        results: document.results,
        structure,
    })
}

pub fn write_record(store: &RecordStore, record: &PersistedRecord) -> CalcResult<PathBuf> {
    let path = store.path();
    let text = render_record(record)?;
    if !store.directory().as_os_str().is_empty() {
        fs::create_dir_all(store.directory()).map_err(|error| {
            CalcError::io_system(
                "IO.RECORD_WRITE",
                format!(
                    "failed to create record directory '{}': {}",
                    store.directory().display(),
                    error
                ),
            )
        })?;
    }
    fs::write(&path, text).map_err(|error| {
        CalcError::io_system(
            "IO.RECORD_WRITE",
            format!("failed to write record '{}': {}", path.display(), error),
        )
    })?;

    info!(path = %path.display(), "wrote calculator record");
    Ok(path)
}

pub fn read_record(store: &RecordStore) -> CalcResult<PersistedRecord> {
    let path = store.path();
    let source = fs::read_to_string(&path).map_err(|error| match error.kind() {
        ErrorKind::NotFound => CalcError::not_found(
            "IO.RECORD_MISSING",
            format!("no record named '{}' at '{}'", store.label(), path.display()),
        ),
        _ => CalcError::io_system(
            "IO.RECORD_READ",
            format!("failed to read record '{}': {}", path.display(), error),
        ),
    })?;

    let record = parse_record(&source)?;
    info!(path = %path.display(), "read calculator record");
    Ok(record)
}

fn normalize_record_text(content: &str) -> String {
    let mut normalized = content.replace("\r\n", "\n");
    if !normalized.ends_with('\n') {
        normalized.push('\n');
    }
    normalized
}

#[cfg(test)]
mod tests {
    use super::{PersistedRecord, RecordStore, parse_record, read_record, write_record};
    use crate::domain::{CalcErrorCategory, ResultRecord};
    use crate::parameters::{ParameterSet, ParameterValue};
    use crate::structure::Structure;
    use std::fs;
    use tempfile::TempDir;

    fn sample_record() -> PersistedRecord {
        PersistedRecord {
            parameters: ParameterSet::default()
                .with("xc", "PBE")
                .with("kpts", vec![2, 2, 2])
                .with("smearing", vec![ParameterValue::from("fermi-dirac"), 0.05.into()]),
            results: ResultRecord {
                energy: Some(-215.637_102_4),
                forces: Some(vec![[0.0, 0.0, 0.012_5], [0.0, 0.0, -0.012_5]]),
            },
            structure: Structure::from_symbols(
                &["N", "N"],
                vec![[0.0, 0.0, 0.0], [0.0, 0.0, 1.1]],
                [[8.0, 0.0, 0.0], [0.0, 8.0, 0.0], [0.0, 0.0, 8.0]],
            )
            .expect("structure should build"),
        }
    }

    #[test]
    fn store_path_joins_directory_and_label() {
        let store = RecordStore::new("runs", "nitrogen").expect("store should build");
        assert_eq!(store.path(), std::path::Path::new("runs/nitrogen.json"));

        let parsed = RecordStore::from_path(std::path::Path::new("runs/nitrogen.json"))
            .expect("path should split");
        assert_eq!(parsed, store);

        let error = RecordStore::new("runs", "a/b").expect_err("separators are rejected");
        assert_eq!(error.category(), CalcErrorCategory::SetupError);
    }

    #[test]
    fn written_record_has_exactly_three_fields() {
        let temp = TempDir::new().expect("tempdir should be created");
        let store = RecordStore::new(temp.path().join("nested"), "n2").expect("store");
        let path = write_record(&store, &sample_record()).expect("record should be written");

        let json: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(path).expect("record should be readable"))
                .expect("record should be JSON");
        let object = json.as_object().expect("record should be an object");
        let mut keys = object.keys().cloned().collect::<Vec<_>>();
        keys.sort();
        assert_eq!(keys, vec!["parameters", "results", "structure"]);
        assert_eq!(json["parameters"]["xc"], "PBE");
        assert!(json["structure"].as_str().is_some_and(|text| text.starts_with("2\n")));
    }

    #[test]
    fn record_round_trips_through_disk() {
        let temp = TempDir::new().expect("tempdir should be created");
        let store = RecordStore::new(temp.path(), "n2").expect("store");
        let record = sample_record();

        write_record(&store, &record).expect("record should be written");
        let restored = read_record(&store).expect("record should be read");
        assert_eq!(restored, record);
    }

    #[test]
    fn missing_record_is_not_found() {
        let temp = TempDir::new().expect("tempdir should be created");
        let store = RecordStore::new(temp.path(), "absent").expect("store");
        let error = read_record(&store).expect_err("missing record should fail");
        assert_eq!(error.category(), CalcErrorCategory::NotFound);
    }

    #[test]
    fn malformed_records_are_corrupt() {
        let cases = [
            "not json",
            r#"{"parameters": {}, "results": {}}"#,
            r#"{"parameters": {}, "results": {}, "structure": "", "extra": 1}"#,
            r#"{"parameters": {"spin": 1}, "results": {}, "structure": ""}"#,
            r#"{"parameters": {}, "results": {}, "structure": "1\nLattice=\"1 0 0\"\n"}"#,
        ];
        for source in cases {
            let error = parse_record(source).expect_err("record should be rejected");
            assert_eq!(error.category(), CalcErrorCategory::CorruptRecord);
        }
    }
}
