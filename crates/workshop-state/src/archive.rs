use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;

use crate::error::StateError;
use crate::record::WorkflowRecord;
use crate::store::{StateResult, WorkflowId};

/// Filesystem archive for finished records.
///
/// Layout: `<root>/<workflow_id>.json`, pretty-printed record JSON.
#[derive(Debug, Clone)]
pub struct FileRecordArchive {
    root: PathBuf,
}

impl FileRecordArchive {
    /// Create an archive rooted at `root`. Creates the directory if needed.
    pub fn new(root: impl AsRef<Path>) -> StateResult<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn record_path(&self, id: &WorkflowId) -> PathBuf {
        self.root.join(format!("{id}.json"))
    }

    /// Write `record`, replacing any earlier copy. Returns the file path.
    pub fn store(&self, record: &WorkflowRecord) -> StateResult<PathBuf> {
        let path = self.record_path(&record.workflow_id);
        let bytes = serde_json::to_vec_pretty(record)?;

        // Atomic write: temp file in the same directory, then rename.
        let mut tmp = NamedTempFile::new_in(&self.root)?;
        tmp.write_all(&bytes)?;
        tmp.persist(&path).map_err(|e| StateError::Io(e.error))?;

        Ok(path)
    }

    pub fn load(&self, id: &WorkflowId) -> StateResult<WorkflowRecord> {
        let path = self.record_path(id);
        let bytes = fs::read(&path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                StateError::NotFound(id.clone())
            } else {
                StateError::Io(e)
            }
        })?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Ids of all archived records, sorted.
    pub fn list(&self) -> StateResult<Vec<WorkflowId>> {
        let mut ids = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                ids.push(WorkflowId::from(stem));
            }
        }
        ids.sort();
        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::WorkflowStatus;

    fn make_archive() -> (tempfile::TempDir, FileRecordArchive) {
        let dir = tempfile::tempdir().unwrap();
        let archive = FileRecordArchive::new(dir.path().join("records")).unwrap();
        (dir, archive)
    }

    #[test]
    fn test_store_then_load() {
        let (_dir, archive) = make_archive();
        let mut record = WorkflowRecord::new(WorkflowId::from("WF-A"), "a drum", None, 1);
        record.status = WorkflowStatus::Completed;

        let path = archive.store(&record).unwrap();
        assert!(path.ends_with("WF-A.json"));
        assert_eq!(archive.load(&record.workflow_id).unwrap(), record);
        assert_eq!(archive.list().unwrap(), vec![WorkflowId::from("WF-A")]);
    }

    #[test]
    fn test_load_missing_is_not_found() {
        let (_dir, archive) = make_archive();
        match archive.load(&WorkflowId::from("WF-NONE")) {
            Err(StateError::NotFound(id)) => assert_eq!(id.as_str(), "WF-NONE"),
            other => panic!("expected NotFound, got {other:?}"),
        }
    }
}
