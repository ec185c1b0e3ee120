use std::collections::HashSet;
use std::path::Path;

use serde::Serialize;

use crate::error::GexError;
use crate::fs_util::read_tsv;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MetadataValue {
    pub name: String,
    pub value: String,
    pub color: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Sample {
    pub name: String,
    pub metadata: Vec<MetadataValue>,
}

/// Samples in the order every matrix of the dataset must follow.
#[derive(Debug, Clone, Serialize)]
pub struct PhenotypeTable {
    pub samples: Vec<Sample>,
}

impl PhenotypeTable {
    pub fn load(path: &Path) -> Result<Self, GexError> {
        let table = read_tsv(path)?;
        let phenotype_error = |message: String| GexError::Phenotype {
            path: path.display().to_string(),
            message,
        };
        if table.header.is_empty() {
            return Err(phenotype_error("missing header".to_string()));
        }

        let mut seen = HashSet::new();
        let mut samples = Vec::with_capacity(table.rows.len());
        for row in &table.rows {
            let name = row.get(0).to_string();
            if name.is_empty() {
                return Err(phenotype_error(format!("line {}: empty sample name", row.line)));
            }
            if !seen.insert(name.clone()) {
                return Err(phenotype_error(format!(
                    "line {}: duplicate sample {name}",
                    row.line
                )));
            }

            let metadata = table
                .header
                .iter()
                .enumerate()
                .skip(1)
                .filter_map(|(index, column)| {
                    let raw = row.get(index);
                    (!raw.is_empty()).then(|| parse_metadata(column, raw))
                })
                .collect();
            samples.push(Sample { name, metadata });
        }

        Ok(Self { samples })
    }

    pub fn sample_names(&self) -> Vec<String> {
        self.samples.iter().map(|sample| sample.name.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

fn parse_metadata(column: &str, raw: &str) -> MetadataValue {
    let (value, color) = match raw.split_once('|') {
        Some((value, color)) => (value.trim(), color.trim()),
        None => (raw, ""),
    };
    MetadataValue {
        name: column.to_string(),
        value: value.to_string(),
        color: color.to_string(),
    }
}
