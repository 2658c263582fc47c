use std::fs;
use std::io::Write;
use std::path::Path;

use camino::{Utf8Path, Utf8PathBuf};
use serde::Serialize;
use tracing::debug;

use crate::aggregate::RawDocumentSink;
use crate::domain::{Dataset, Endpoint, EntityIdentity};
use crate::error::HarvestError;
use crate::pipeline::RunOutput;

pub const DATASET_FILE: &str = "euronext_esg_data.json";
pub const FAILURES_FILE: &str = "failed_requests.json";

/// On-disk layout of one scrape run:
/// `{root}/json_data/*.json` and `{root}/html_files/{key}_{endpoint}.html`.
#[derive(Debug, Clone)]
pub struct Store {
    output_root: Utf8PathBuf,
}

#[derive(Debug, Clone, Serialize)]
pub struct PersistedRun {
    pub dataset: Utf8PathBuf,
    pub failures: Utf8PathBuf,
    pub html_files: Utf8PathBuf,
}

impl Store {
    pub fn new(output_root: &Path) -> Result<Self, HarvestError> {
        let output_root = Utf8PathBuf::from_path_buf(output_root.to_path_buf())
            .map_err(|_| HarvestError::Filesystem("invalid output path".to_string()))?;
        Ok(Self { output_root })
    }

    pub fn new_with_root(output_root: Utf8PathBuf) -> Self {
        Self { output_root }
    }

    pub fn html_dir(&self) -> Utf8PathBuf {
        self.output_root.join("html_files")
    }

    pub fn json_dir(&self) -> Utf8PathBuf {
        self.output_root.join("json_data")
    }

    pub fn dataset_path(&self) -> Utf8PathBuf {
        self.json_dir().join(DATASET_FILE)
    }

    pub fn failures_path(&self) -> Utf8PathBuf {
        self.json_dir().join(FAILURES_FILE)
    }

    pub fn raw_document_path(&self, identity: &EntityIdentity, endpoint: Endpoint) -> Utf8PathBuf {
        self.html_dir()
            .join(format!("{}_{}.html", identity.composite_key(), endpoint))
    }

    pub fn ensure_layout(&self) -> Result<(), HarvestError> {
        for dir in [self.html_dir(), self.json_dir()] {
            fs::create_dir_all(dir.as_std_path())
                .map_err(|err| HarvestError::Filesystem(err.to_string()))?;
        }
        debug!(root = %self.output_root, "output directories ready");
        Ok(())
    }

    /// Writes both run documents; each lands whole or not at all.
    pub fn persist_run(&self, output: &RunOutput) -> Result<PersistedRun, HarvestError> {
        let dataset = self.dataset_path();
        let failures = self.failures_path();
        Self::write_json_atomic(&dataset, &output.dataset)?;
        Self::write_json_atomic(&failures, &output.failure_log)?;
        Ok(PersistedRun {
            dataset,
            failures,
            html_files: self.html_dir(),
        })
    }

    pub fn load_dataset(path: &Utf8Path) -> Result<Dataset, HarvestError> {
        if !path.as_std_path().exists() {
            return Err(HarvestError::DatasetNotFound(path.as_std_path().to_path_buf()));
        }
        let content = fs::read_to_string(path.as_std_path())
            .map_err(|err| HarvestError::Filesystem(err.to_string()))?;
        serde_json::from_str(&content).map_err(|err| HarvestError::DatasetParse(err.to_string()))
    }

    pub fn write_json_atomic<T: Serialize>(path: &Utf8Path, value: &T) -> Result<(), HarvestError> {
        let content = serde_json::to_vec_pretty(value)
            .map_err(|err| HarvestError::Serialization(err.to_string()))?;
        Self::write_bytes_atomic(path, &content)
    }

    pub fn write_bytes_atomic(path: &Utf8Path, content: &[u8]) -> Result<(), HarvestError> {
        let parent = path
            .parent()
            .ok_or_else(|| HarvestError::Filesystem("invalid destination path".to_string()))?;
        fs::create_dir_all(parent.as_std_path())
            .map_err(|err| HarvestError::Filesystem(err.to_string()))?;
        let mut temp = tempfile::Builder::new()
            .prefix(".esg-harvester")
            .tempfile_in(parent.as_std_path())
            .map_err(|err| HarvestError::Filesystem(err.to_string()))?;
        temp.write_all(content)
            .map_err(|err| HarvestError::Filesystem(err.to_string()))?;
        temp.persist(path.as_std_path())
            .map_err(|err| HarvestError::Filesystem(err.to_string()))?;
        Ok(())
    }
}

impl RawDocumentSink for Store {
    fn store_raw(
        &self,
        identity: &EntityIdentity,
        endpoint: Endpoint,
        html: &str,
    ) -> Result<(), HarvestError> {
        let path = self.raw_document_path(identity, endpoint);
        fs::create_dir_all(self.html_dir().as_std_path())
            .map_err(|err| HarvestError::Filesystem(err.to_string()))?;
        fs::write(path.as_std_path(), html)
            .map_err(|err| HarvestError::Filesystem(format!("write {path}: {err}")))?;
        debug!(path = %path, "saved raw document");
        Ok(())
    }
}
