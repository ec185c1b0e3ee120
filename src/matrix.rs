use std::collections::HashMap;
use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;
use tracing::{debug, warn};

use crate::alias::{GeneAliasTable, strip_version};
use crate::codec::RowInput;
use crate::domain::Genome;
use crate::error::GexError;
use crate::fs_util::read_tsv;

static SAMPLE_SUFFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[ |].*$").expect("sample suffix pattern"));

#[derive(Debug, Clone)]
pub struct ExpressionMatrix {
    source: String,
    probes: Vec<String>,
    genes: Vec<String>,
    samples: Vec<String>,
    values: Vec<Vec<f32>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedRow {
    pub probe: String,
    pub gene_key: u32,
    pub values: Vec<f32>,
}

#[derive(Debug, Clone)]
pub struct ResolvedMatrix {
    pub samples: Vec<String>,
    pub rows: Vec<ResolvedRow>,
    pub dropped: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AlignReport {
    pub ignored_columns: Vec<String>,
}

impl ExpressionMatrix {
    pub fn new(
        source: impl Into<String>,
        probes: Vec<String>,
        genes: Vec<String>,
        samples: Vec<String>,
        values: Vec<Vec<f32>>,
    ) -> Result<Self, GexError> {
        let source = source.into();
        if probes.len() != genes.len() || probes.len() != values.len() {
            return Err(GexError::Matrix {
                path: source,
                message: format!(
                    "{} probes, {} genes and {} value rows",
                    probes.len(),
                    genes.len(),
                    values.len()
                ),
            });
        }
        if let Some((row, bad)) = values
            .iter()
            .enumerate()
            .find(|(_, row)| row.len() != samples.len())
        {
            return Err(GexError::RowShape {
                row,
                expected: samples.len(),
                actual: bad.len(),
            });
        }
        Ok(Self {
            source,
            probes,
            genes,
            samples,
            values,
        })
    }

    /// Column 0 is the probe; with two or more identifier columns, column 1
    /// holds the gene label.
    pub fn load(path: &Path, id_columns: usize) -> Result<Self, GexError> {
        let source = path.display().to_string();
        let matrix_error = |message: String| GexError::Matrix {
            path: source.clone(),
            message,
        };
        let id_columns = id_columns.max(1);
        let table = read_tsv(path)?;
        if table.header.len() < id_columns {
            return Err(matrix_error(format!(
                "header has {} columns, expected at least {id_columns} identifier columns",
                table.header.len()
            )));
        }

        let samples: Vec<String> = table.header[id_columns..]
            .iter()
            .map(|name| clean_sample_name(name))
            .collect();
        let width = id_columns + samples.len();

        let mut probes = Vec::with_capacity(table.rows.len());
        let mut genes = Vec::with_capacity(table.rows.len());
        let mut values = Vec::with_capacity(table.rows.len());
        for row in &table.rows {
            if row.fields.len() != width {
                return Err(matrix_error(format!(
                    "line {}: {} fields, expected {width}",
                    row.line,
                    row.fields.len()
                )));
            }
            let probe = strip_version(row.get(0));
            let gene = if id_columns >= 2 {
                strip_version(row.get(1))
            } else {
                probe.clone()
            };
            let parsed = row.fields[id_columns..]
                .iter()
                .map(|raw| {
                    parse_value(raw).ok_or_else(|| {
                        matrix_error(format!("line {}: invalid value {raw:?}", row.line))
                    })
                })
                .collect::<Result<Vec<_>, _>>()?;
            probes.push(probe);
            genes.push(gene);
            values.push(parsed);
        }

        debug!(
            path = %source,
            rows = probes.len(),
            samples = samples.len(),
            "loaded expression matrix"
        );
        Self::new(source, probes, genes, samples, values)
    }

    pub fn samples(&self) -> &[String] {
        &self.samples
    }

    pub fn probes(&self) -> &[String] {
        &self.probes
    }

    pub fn len(&self) -> usize {
        self.probes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.probes.is_empty()
    }

    /// Reorders columns into `canonical` order. A canonical sample with no
    /// column is fatal; columns outside `canonical` are dropped.
    pub fn align(self, canonical: &[String]) -> Result<(Self, AlignReport), GexError> {
        let mut positions = HashMap::with_capacity(self.samples.len());
        for (index, name) in self.samples.iter().enumerate() {
            positions.entry(name.as_str()).or_insert(index);
        }

        let order = canonical
            .iter()
            .map(|sample| {
                positions
                    .get(sample.as_str())
                    .copied()
                    .ok_or_else(|| GexError::MissingSampleColumn {
                        path: self.source.clone(),
                        sample: sample.clone(),
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let ignored_columns: Vec<String> = self
            .samples
            .iter()
            .filter(|name| !canonical.contains(name))
            .cloned()
            .collect();
        if !ignored_columns.is_empty() {
            warn!(
                path = %self.source,
                ignored = ignored_columns.len(),
                "matrix columns without phenotype rows are ignored"
            );
        }

        let values = self
            .values
            .iter()
            .map(|row| order.iter().map(|&index| row[index]).collect())
            .collect();

        let aligned = Self {
            source: self.source,
            probes: self.probes,
            genes: self.genes,
            samples: canonical.to_vec(),
            values,
        };
        Ok((aligned, AlignReport { ignored_columns }))
    }

    pub fn resolve(self, aliases: &GeneAliasTable, genome: Genome) -> ResolvedMatrix {
        let mut rows = Vec::with_capacity(self.probes.len());
        let mut dropped = Vec::new();
        let entries = self.probes.into_iter().zip(self.genes).zip(self.values);
        for ((probe, gene), values) in entries {
            match aliases.resolve(genome, &gene) {
                Some(record) => rows.push(ResolvedRow {
                    probe,
                    gene_key: record.key,
                    values,
                }),
                None => dropped.push(probe),
            }
        }
        if !dropped.is_empty() {
            warn!(
                path = %self.source,
                dropped = dropped.len(),
                kept = rows.len(),
                "rows with unresolvable gene labels dropped"
            );
        }
        ResolvedMatrix {
            samples: self.samples,
            rows,
            dropped,
        }
    }
}

impl ResolvedMatrix {
    pub fn row_inputs<'a>(&'a self, ids: &[u32]) -> Vec<RowInput<'a>> {
        self.rows
            .iter()
            .zip(ids)
            .map(|(row, &id)| RowInput {
                id,
                values: &row.values,
            })
            .collect()
    }
}

pub fn clean_sample_name(name: &str) -> String {
    SAMPLE_SUFFIX.replace(name.trim(), "").into_owned()
}

fn parse_value(raw: &str) -> Option<f32> {
    match raw {
        "" | "NA" | "na" | "N/A" => Some(f32::NAN),
        _ => raw.parse::<f32>().ok(),
    }
}
