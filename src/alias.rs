use std::collections::HashMap;
use std::path::Path;

use serde::Serialize;
use tracing::debug;

use crate::domain::Genome;
use crate::error::GexError;
use crate::fs_util::{TsvRow, TsvTable, read_tsv};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GeneRecord {
    pub key: u32,
    pub genome: Genome,
    pub gene_id: String,
    pub symbol: String,
    pub ensembl: String,
    pub refseq: String,
    pub ncbi: String,
}

#[derive(Debug, Clone, Default)]
pub struct NewGene {
    pub gene_id: String,
    pub symbol: String,
    pub ensembl: String,
    pub refseq: Vec<String>,
    pub ncbi: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchTier {
    Official,
    Previous,
    Alias,
}

#[derive(Debug, Default, Clone)]
struct GenomeLabels {
    official: HashMap<String, usize>,
    previous: HashMap<String, String>,
    alias: HashMap<String, String>,
}

/// Label -> canonical gene lookup, immutable once built.
#[derive(Debug, Default, Clone)]
pub struct GeneAliasTable {
    genes: Vec<GeneRecord>,
    labels: HashMap<Genome, GenomeLabels>,
}

impl GeneAliasTable {
    pub fn builder() -> GeneAliasTableBuilder {
        GeneAliasTableBuilder::default()
    }

    pub fn resolve(&self, genome: Genome, label: &str) -> Option<&GeneRecord> {
        self.resolve_with_tier(genome, label).map(|(gene, _)| gene)
    }

    pub fn resolve_with_tier(
        &self,
        genome: Genome,
        label: &str,
    ) -> Option<(&GeneRecord, MatchTier)> {
        if label.is_empty() {
            return None;
        }
        let labels = self.labels.get(&genome)?;
        if let Some(&index) = labels.official.get(label) {
            return Some((&self.genes[index], MatchTier::Official));
        }
        let canonical = |gene_id: &String| {
            labels
                .official
                .get(gene_id)
                .map(|&index| &self.genes[index])
        };
        if let Some(gene) = labels.previous.get(label).and_then(canonical) {
            return Some((gene, MatchTier::Previous));
        }
        labels
            .alias
            .get(label)
            .and_then(canonical)
            .map(|gene| (gene, MatchTier::Alias))
    }

    pub fn genes(&self) -> &[GeneRecord] {
        &self.genes
    }

    pub fn gene(&self, key: u32) -> Option<&GeneRecord> {
        let index = usize::try_from(key).ok()?.checked_sub(1)?;
        self.genes.get(index)
    }

    pub fn len(&self) -> usize {
        self.genes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.genes.is_empty()
    }
}

#[derive(Debug, Default)]
pub struct GeneAliasTableBuilder {
    table: GeneAliasTable,
}

impl GeneAliasTableBuilder {
    pub fn add_gene(&mut self, genome: Genome, gene: NewGene) -> u32 {
        let index = self.table.genes.len();
        let key = index as u32 + 1;
        let labels = self.table.labels.entry(genome).or_default();

        let official = [gene.gene_id.as_str(), gene.symbol.as_str(), gene.ensembl.as_str()]
            .into_iter()
            .chain(gene.refseq.iter().map(String::as_str))
            .chain(gene.ncbi.iter().map(String::as_str));
        for label in official.filter(|label| !label.is_empty()) {
            labels.official.insert(label.to_string(), index);
        }

        self.table.genes.push(GeneRecord {
            key,
            genome,
            gene_id: gene.gene_id,
            symbol: gene.symbol,
            ensembl: gene.ensembl,
            refseq: gene.refseq.join(","),
            ncbi: gene.ncbi.join(","),
        });
        key
    }

    pub fn add_previous(&mut self, genome: Genome, label: &str, gene_id: &str) -> &mut Self {
        if !label.is_empty() {
            self.table
                .labels
                .entry(genome)
                .or_default()
                .previous
                .insert(label.to_string(), gene_id.to_string());
        }
        self
    }

    pub fn add_alias(&mut self, genome: Genome, label: &str, gene_id: &str) -> &mut Self {
        if !label.is_empty() {
            self.table
                .labels
                .entry(genome)
                .or_default()
                .alias
                .insert(label.to_string(), gene_id.to_string());
        }
        self
    }

    pub fn load_hugo(&mut self, path: &Path) -> Result<&mut Self, GexError> {
        let table = read_tsv(path)?;
        let hgnc = required_column(&table, path, "HGNC ID")?;
        let symbol = required_column(&table, path, "Approved symbol")?;
        let previous = table.column("Previous symbols");
        let aliases = table.column("Alias symbols");
        let ensembl = table.column("Ensembl gene ID");
        let refseq = table.column("RefSeq IDs");
        let ncbi = table.column("NCBI Gene ID");

        for row in &table.rows {
            let gene_id = row.get(hgnc).to_string();
            if gene_id.is_empty() {
                continue;
            }
            self.add_gene(
                Genome::Human,
                NewGene {
                    gene_id: gene_id.clone(),
                    symbol: row.get(symbol).to_string(),
                    ensembl: ensembl.map(|col| strip_version(row.get(col))).unwrap_or_default(),
                    refseq: refseq.map(|col| split_list(row.get(col))).unwrap_or_default(),
                    ncbi: ncbi.map(|col| split_list(row.get(col))).unwrap_or_default(),
                },
            );
            if let Some(col) = previous {
                for label in split_list(row.get(col)) {
                    self.add_previous(Genome::Human, &label, &gene_id);
                }
            }
            if let Some(col) = aliases {
                for label in split_list(row.get(col)) {
                    self.add_alias(Genome::Human, &label, &gene_id);
                }
            }
        }
        debug!(path = %path.display(), genes = table.rows.len(), "loaded HUGO reference");
        Ok(self)
    }

    pub fn load_mgi(&mut self, path: &Path) -> Result<&mut Self, GexError> {
        let table = read_tsv(path)?;
        let mgi = required_column(&table, path, "mgi")?;
        let symbol = required_column(&table, path, "gene_symbol")?;
        let ensembl = table.column("ensembl");
        let refseq = table.column("refseq");
        let entrez = table.column("entrez");

        let field = |row: &TsvRow, col: Option<usize>| {
            col.map(|col| row.get(col).replace("null", ""))
                .unwrap_or_default()
        };

        for row in &table.rows {
            let gene_id = row.get(mgi).to_string();
            if gene_id.is_empty() {
                continue;
            }
            self.add_gene(
                Genome::Mouse,
                NewGene {
                    gene_id,
                    symbol: row.get(symbol).to_string(),
                    ensembl: strip_version(&field(row, ensembl)),
                    refseq: split_list(&field(row, refseq)),
                    ncbi: split_list(&field(row, entrez)),
                },
            );
        }
        debug!(path = %path.display(), genes = table.rows.len(), "loaded MGI reference");
        Ok(self)
    }

    pub fn build(self) -> GeneAliasTable {
        self.table
    }
}

fn required_column(table: &TsvTable, path: &Path, name: &str) -> Result<usize, GexError> {
    table.column(name).ok_or_else(|| GexError::Reference {
        path: path.display().to_string(),
        message: format!("missing column {name:?}"),
    })
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split([',', '|'])
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

pub fn strip_version(label: &str) -> String {
    label.split('.').next().unwrap_or_default().trim().to_string()
}
