use std::fs;

use camino::{Utf8Path, Utf8PathBuf};
use directories::BaseDirs;
use serde::{Deserialize, Serialize};

use crate::domain::{DatasetName, Genome, expression_type_slug};
use crate::error::GexError;

pub const DATABASE_FILE: &str = "gex.db";
pub const MANIFEST_FILE: &str = "import.json";

#[derive(Debug, Clone)]
pub struct Store {
    root: Utf8PathBuf,
}

impl Store {
    pub fn new(root: Utf8PathBuf) -> Self {
        Self { root }
    }

    pub fn default_root() -> Result<Utf8PathBuf, GexError> {
        BaseDirs::new()
            .and_then(|dirs| {
                Utf8PathBuf::from_path_buf(dirs.data_dir().join("gex-etl").join("gex")).ok()
            })
            .ok_or_else(|| GexError::Filesystem("unable to resolve data directory".to_string()))
    }

    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    pub fn database_path(&self) -> Utf8PathBuf {
        self.root.join(DATABASE_FILE)
    }

    pub fn manifest_path(&self) -> Utf8PathBuf {
        self.root.join(MANIFEST_FILE)
    }

    pub fn resolve_url(&self, url: &str) -> Utf8PathBuf {
        self.root.join(url)
    }

    pub fn ensure_root(&self) -> Result<(), GexError> {
        fs::create_dir_all(self.root.as_std_path())
            .map_err(|err| GexError::Filesystem(format!("create {}: {err}", self.root)))
    }

    pub fn ensure_dir(path: &Utf8Path) -> Result<(), GexError> {
        fs::create_dir_all(path.as_std_path())
            .map_err(|err| GexError::Filesystem(format!("create {path}: {err}")))
    }

    /// Removes the database and its WAL side files so the next import starts clean.
    pub fn remove_database(&self) -> Result<bool, GexError> {
        let db = self.database_path();
        let mut removed = false;
        for path in [
            db.clone(),
            Utf8PathBuf::from(format!("{db}-wal")),
            Utf8PathBuf::from(format!("{db}-shm")),
        ] {
            if path.as_std_path().exists() {
                fs::remove_file(path.as_std_path())
                    .map_err(|err| GexError::Filesystem(format!("remove {path}: {err}")))?;
                removed = true;
            }
        }
        Ok(removed)
    }

    pub fn write_manifest(&self, manifest: &Manifest) -> Result<(), GexError> {
        let path = self.manifest_path();
        let content = serde_json::to_vec_pretty(manifest)
            .map_err(|err| GexError::Filesystem(err.to_string()))?;
        Self::write_bytes_atomic(&path, &content)
    }

    pub fn read_manifest(&self) -> Result<Option<Manifest>, GexError> {
        let path = self.manifest_path();
        if !path.as_std_path().exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(path.as_std_path())
            .map_err(|err| GexError::Filesystem(err.to_string()))?;
        serde_json::from_str(&content)
            .map(Some)
            .map_err(|err| GexError::ConfigParse(err.to_string()))
    }

    pub fn write_bytes_atomic(path: &Utf8Path, content: &[u8]) -> Result<(), GexError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent.as_std_path())
                .map_err(|err| GexError::Filesystem(err.to_string()))?;
        }
        let tmp_path = path.with_extension("tmp");
        fs::write(tmp_path.as_std_path(), content)
            .map_err(|err| GexError::Filesystem(err.to_string()))?;
        fs::rename(tmp_path.as_std_path(), path.as_std_path())
            .map_err(|err| GexError::Filesystem(err.to_string()))?;
        Ok(())
    }
}

pub fn dataset_url_dir(genome: Genome, technology: &str, dataset: &DatasetName) -> String {
    format!("{genome}/{}/{}", technology.to_lowercase(), dataset.slug())
}

pub fn expression_file_url(
    genome: Genome,
    technology: &str,
    dataset: &DatasetName,
    expression_type: &str,
) -> String {
    format!(
        "{}/{}.bin",
        dataset_url_dir(genome, technology, dataset),
        expression_type_slug(expression_type)
    )
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    pub tool: String,
    pub created_at: String,
    pub layout: String,
    pub database: String,
    pub datasets: Vec<ManifestDataset>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestDataset {
    pub name: String,
    pub public_id: String,
    pub files: Vec<String>,
}
