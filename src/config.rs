use std::fs;

use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};

use crate::domain::{DatasetName, Genome, HeaderLayout};
use crate::error::GexError;

pub const DEFAULT_CONFIG: &str = "datasets.json";
pub const SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    #[serde(default)]
    pub schema_version: Option<u32>,
    #[serde(default)]
    pub output: Option<String>,
    #[serde(default)]
    pub layout: Option<HeaderLayout>,
    #[serde(default)]
    pub references: References,
    #[serde(default)]
    pub datasets: Vec<DatasetEntry>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct References {
    #[serde(default)]
    pub hugo: Option<String>,
    #[serde(default)]
    pub mgi: Option<String>,
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DatasetEntry {
    pub name: String,
    pub genome: String,
    pub technology: String,
    #[serde(default)]
    pub platform: String,
    #[serde(default)]
    pub institution: String,
    #[serde(default)]
    pub description: String,
    pub phenotypes: String,
    #[serde(default)]
    pub id_col_count: Option<usize>,
    #[serde(default)]
    pub data: Vec<DataEntry>,
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(untagged)]
pub enum DataEntry {
    Shorthand(String),
    Detailed(DataEntryObject),
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DataEntryObject {
    #[serde(rename = "type")]
    pub expression_type: String,
    pub path: String,
    #[serde(default)]
    pub id_col_count: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpressionRequest {
    pub expression_type: String,
    pub path: Utf8PathBuf,
    pub id_columns: usize,
}

impl ExpressionRequest {
    /// Parses a `TYPE=PATH` entry; the path is taken as given.
    pub fn parse(value: &str, id_columns: Option<usize>) -> Result<Self, GexError> {
        let (expression_type, path) = split_data_entry(value)?;
        Ok(Self {
            id_columns: id_columns.unwrap_or_else(|| default_id_columns_for(&expression_type)),
            expression_type,
            path: Utf8PathBuf::from(path),
        })
    }
}

#[derive(Debug, Clone)]
pub struct DatasetRequest {
    pub name: DatasetName,
    pub genome: Genome,
    pub technology: String,
    pub platform: String,
    pub institution: String,
    pub description: String,
    pub phenotypes: Utf8PathBuf,
    pub data: Vec<ExpressionRequest>,
}

#[derive(Debug, Clone, Default)]
pub struct ReferencePaths {
    pub hugo: Option<Utf8PathBuf>,
    pub mgi: Option<Utf8PathBuf>,
}

#[derive(Debug, Clone)]
pub struct ImportPlan {
    pub schema_version: u32,
    pub output: Option<Utf8PathBuf>,
    pub layout: HeaderLayout,
    pub references: ReferencePaths,
    pub datasets: Vec<DatasetRequest>,
}

pub struct ConfigLoader;

impl ConfigLoader {
    pub fn resolve(path: Option<&str>) -> Result<ImportPlan, GexError> {
        let config_path = match path {
            Some(path) => Utf8PathBuf::from(path),
            None => Utf8PathBuf::from(DEFAULT_CONFIG),
        };

        if path.is_none() && !config_path.as_std_path().exists() {
            return Err(GexError::MissingConfig);
        }

        let content = fs::read_to_string(config_path.as_std_path())
            .map_err(|_| GexError::ConfigRead(config_path.clone().into_std_path_buf()))?;
        let config: Config =
            serde_json::from_str(&content).map_err(|err| GexError::ConfigParse(err.to_string()))?;

        let base_dir = config_path
            .parent()
            .map(Utf8Path::to_path_buf)
            .unwrap_or_default();
        Self::resolve_config(config, &base_dir)
    }

    /// Relative paths in `config` are taken relative to `base_dir`.
    pub fn resolve_config(config: Config, base_dir: &Utf8Path) -> Result<ImportPlan, GexError> {
        let schema_version = config.schema_version.unwrap_or(SCHEMA_VERSION);
        if schema_version != SCHEMA_VERSION {
            return Err(GexError::ConfigParse(format!(
                "unsupported schemaVersion {schema_version} (expected {SCHEMA_VERSION})"
            )));
        }

        let datasets = config
            .datasets
            .into_iter()
            .map(|entry| {
                let default_id_columns = entry.id_col_count;
                let data = entry
                    .data
                    .into_iter()
                    .map(|data| match data {
                        DataEntry::Shorthand(value) => {
                            let request = ExpressionRequest::parse(&value, default_id_columns)?;
                            Ok(ExpressionRequest {
                                path: rebase(base_dir, request.path.as_str()),
                                ..request
                            })
                        }
                        DataEntry::Detailed(obj) => Ok(ExpressionRequest {
                            id_columns: obj
                                .id_col_count
                                .or(default_id_columns)
                                .unwrap_or_else(|| default_id_columns_for(&obj.expression_type)),
                            path: rebase(base_dir, &obj.path),
                            expression_type: obj.expression_type,
                        }),
                    })
                    .collect::<Result<Vec<_>, GexError>>()?;

                Ok(DatasetRequest {
                    name: entry.name.parse()?,
                    genome: entry.genome.parse()?,
                    technology: entry.technology,
                    platform: entry.platform,
                    institution: entry.institution,
                    description: entry.description,
                    phenotypes: rebase(base_dir, &entry.phenotypes),
                    data,
                })
            })
            .collect::<Result<Vec<_>, GexError>>()?;

        Ok(ImportPlan {
            schema_version,
            output: config.output.map(|path| rebase(base_dir, &path)),
            layout: config.layout.unwrap_or_default(),
            references: ReferencePaths {
                hugo: config.references.hugo.map(|path| rebase(base_dir, &path)),
                mgi: config.references.mgi.map(|path| rebase(base_dir, &path)),
            },
            datasets,
        })
    }
}

/// Parses `TYPE=PATH`.
pub fn split_data_entry(value: &str) -> Result<(String, String), GexError> {
    let (expression_type, path) = value
        .split_once('=')
        .ok_or_else(|| GexError::InvalidDataEntry(value.to_string()))?;
    let (expression_type, path) = (expression_type.trim(), path.trim());
    if expression_type.is_empty() || path.is_empty() {
        return Err(GexError::InvalidDataEntry(value.to_string()));
    }
    Ok((expression_type.to_string(), path.to_string()))
}

// Microarray RMA tables carry the gene symbol next to the probe id.
pub fn default_id_columns_for(expression_type: &str) -> usize {
    if expression_type.eq_ignore_ascii_case("RMA") {
        2
    } else {
        1
    }
}

fn rebase(base_dir: &Utf8Path, path: &str) -> Utf8PathBuf {
    let path = Utf8PathBuf::from(path);
    if path.is_absolute() || base_dir.as_str().is_empty() {
        path
    } else {
        base_dir.join(path)
    }
}
