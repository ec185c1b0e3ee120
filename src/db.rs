use std::path::Path;

use rusqlite::{Connection, params};
use tracing::debug;
use uuid::Uuid;

use crate::alias::GeneAliasTable;
use crate::domain::Genome;
use crate::error::GexError;
use crate::intern::InternTable;
use crate::phenotype::Sample;

pub const DEFAULT_TECHNOLOGIES: [(&str, &str); 3] = [
    ("RNA-seq", "RNA sequencing"),
    ("Microarray", "Microarray"),
    ("scRNA-seq", "Single-cell RNA sequencing"),
];

pub const VIEW_PERMISSION: &str = "rdf:view";

const SCHEMA: &str = "
CREATE TABLE genomes (
    id INTEGER PRIMARY KEY,
    public_id TEXT NOT NULL UNIQUE,
    name TEXT NOT NULL,
    scientific_name TEXT NOT NULL,
    UNIQUE(name, scientific_name));

CREATE TABLE genes (
    id INTEGER PRIMARY KEY,
    public_id TEXT NOT NULL UNIQUE,
    genome_id INTEGER NOT NULL,
    gene_id TEXT NOT NULL,
    ensembl TEXT NOT NULL DEFAULT '',
    refseq TEXT NOT NULL DEFAULT '',
    ncbi TEXT NOT NULL DEFAULT '',
    gene_symbol TEXT NOT NULL DEFAULT '',
    FOREIGN KEY(genome_id) REFERENCES genomes(id));

CREATE TABLE probes (
    id INTEGER PRIMARY KEY,
    public_id TEXT NOT NULL UNIQUE,
    genome_id INTEGER NOT NULL,
    name TEXT NOT NULL,
    gene_id INTEGER NOT NULL,
    UNIQUE(genome_id, name),
    FOREIGN KEY(genome_id) REFERENCES genomes(id),
    FOREIGN KEY(gene_id) REFERENCES genes(id));

CREATE TABLE technologies (
    id INTEGER PRIMARY KEY,
    public_id TEXT NOT NULL UNIQUE,
    name TEXT NOT NULL UNIQUE,
    description TEXT NOT NULL DEFAULT '');

CREATE TABLE datasets (
    id INTEGER PRIMARY KEY,
    public_id TEXT NOT NULL UNIQUE,
    genome_id INTEGER NOT NULL,
    name TEXT NOT NULL UNIQUE,
    technology_id INTEGER NOT NULL,
    platform TEXT NOT NULL,
    institution TEXT NOT NULL,
    description TEXT NOT NULL DEFAULT '',
    FOREIGN KEY(genome_id) REFERENCES genomes(id),
    FOREIGN KEY(technology_id) REFERENCES technologies(id));

CREATE TABLE permissions (
    id INTEGER PRIMARY KEY,
    public_id TEXT NOT NULL UNIQUE,
    name TEXT NOT NULL UNIQUE);

CREATE TABLE dataset_permissions (
    dataset_id INTEGER NOT NULL,
    permission_id INTEGER NOT NULL,
    PRIMARY KEY(dataset_id, permission_id),
    FOREIGN KEY(dataset_id) REFERENCES datasets(id),
    FOREIGN KEY(permission_id) REFERENCES permissions(id));

CREATE TABLE samples (
    id INTEGER PRIMARY KEY,
    public_id TEXT NOT NULL UNIQUE,
    dataset_id INTEGER NOT NULL,
    name TEXT NOT NULL,
    description TEXT NOT NULL DEFAULT '',
    UNIQUE(dataset_id, name),
    FOREIGN KEY(dataset_id) REFERENCES datasets(id));

CREATE TABLE metadata (
    id INTEGER PRIMARY KEY,
    public_id TEXT NOT NULL UNIQUE,
    name TEXT NOT NULL UNIQUE,
    color TEXT NOT NULL DEFAULT '',
    description TEXT NOT NULL DEFAULT '');

CREATE TABLE sample_metadata (
    sample_id INTEGER NOT NULL,
    metadata_id INTEGER NOT NULL,
    value TEXT NOT NULL DEFAULT '',
    color TEXT NOT NULL DEFAULT '',
    PRIMARY KEY(sample_id, metadata_id),
    FOREIGN KEY(sample_id) REFERENCES samples(id),
    FOREIGN KEY(metadata_id) REFERENCES metadata(id));

CREATE TABLE expression_types (
    id INTEGER PRIMARY KEY,
    public_id TEXT NOT NULL UNIQUE,
    name TEXT NOT NULL UNIQUE);

CREATE TABLE files (
    id INTEGER PRIMARY KEY,
    public_id TEXT NOT NULL UNIQUE,
    url TEXT NOT NULL UNIQUE);

CREATE TABLE expression (
    id INTEGER PRIMARY KEY,
    dataset_id INTEGER NOT NULL,
    probe_id INTEGER NOT NULL,
    expression_type_id INTEGER NOT NULL,
    file_id INTEGER NOT NULL,
    dtype TEXT NOT NULL DEFAULT 'float32',
    offset INTEGER NOT NULL,
    length INTEGER NOT NULL,
    version INTEGER NOT NULL,
    UNIQUE(dataset_id, probe_id, expression_type_id),
    FOREIGN KEY(dataset_id) REFERENCES datasets(id),
    FOREIGN KEY(probe_id) REFERENCES probes(id),
    FOREIGN KEY(expression_type_id) REFERENCES expression_types(id),
    FOREIGN KEY(file_id) REFERENCES files(id));
";

const SECONDARY_INDEXES: &str = "
CREATE INDEX samples_name_idx ON samples (name);
CREATE INDEX genes_ensembl_idx ON genes (ensembl);
CREATE INDEX genes_refseq_idx ON genes (refseq);
CREATE INDEX genes_gene_symbol_idx ON genes (gene_symbol);
CREATE INDEX expression_dataset_type_idx ON expression (dataset_id, expression_type_id);
";

pub fn public_id() -> String {
    Uuid::now_v7().to_string()
}

pub fn open(path: &Path) -> Result<Connection, GexError> {
    let conn = Connection::open(path)?;
    conn.execute_batch("PRAGMA journal_mode = WAL; PRAGMA foreign_keys = ON;")?;
    Ok(conn)
}

pub fn create_schema(conn: &mut Connection) -> Result<(), GexError> {
    let tx = conn.transaction()?;
    tx.execute_batch(SCHEMA)?;
    for genome in Genome::ALL {
        tx.execute(
            "INSERT INTO genomes (id, public_id, name, scientific_name) VALUES (?1, ?2, ?3, ?4)",
            params![
                genome.db_id(),
                public_id(),
                genome.display_name(),
                genome.scientific_name()
            ],
        )?;
    }
    for (index, (name, description)) in DEFAULT_TECHNOLOGIES.iter().enumerate() {
        tx.execute(
            "INSERT INTO technologies (id, public_id, name, description) VALUES (?1, ?2, ?3, ?4)",
            params![index as u32 + 1, public_id(), name, description],
        )?;
    }
    tx.execute(
        "INSERT INTO permissions (id, public_id, name) VALUES (1, ?1, ?2)",
        params![public_id(), VIEW_PERMISSION],
    )?;
    tx.commit()?;
    debug!("schema created");
    Ok(())
}

pub fn insert_genes(conn: &mut Connection, aliases: &GeneAliasTable) -> Result<usize, GexError> {
    let tx = conn.transaction()?;
    {
        let mut stmt = tx.prepare(
            "INSERT INTO genes (id, public_id, genome_id, gene_id, ensembl, refseq, ncbi, gene_symbol)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        )?;
        for gene in aliases.genes() {
            stmt.execute(params![
                gene.key,
                public_id(),
                gene.genome.db_id(),
                gene.gene_id,
                gene.ensembl,
                gene.refseq,
                gene.ncbi,
                gene.symbol,
            ])?;
        }
    }
    tx.commit()?;
    Ok(aliases.len())
}

pub fn create_secondary_indexes(conn: &mut Connection) -> Result<(), GexError> {
    let tx = conn.transaction()?;
    tx.execute_batch(SECONDARY_INDEXES)?;
    tx.commit()?;
    Ok(())
}

#[derive(Debug, Clone)]
pub struct DatasetRow<'a> {
    pub name: &'a str,
    pub genome: Genome,
    pub technology: &'a str,
    pub platform: &'a str,
    pub institution: &'a str,
    pub description: &'a str,
}

#[derive(Debug, Clone)]
pub struct InsertedDataset {
    pub id: u32,
    pub public_id: String,
    pub samples: usize,
}

/// Datasets, technologies, samples and sample metadata, with ids memoized for
/// the whole run.
#[derive(Debug)]
pub struct CatalogWriter {
    datasets: InternTable<String>,
    technologies: InternTable<String>,
    metadata: InternTable<String>,
    next_sample_id: u32,
}

impl CatalogWriter {
    pub fn new() -> Self {
        Self {
            datasets: InternTable::new(),
            technologies: InternTable::seeded(
                DEFAULT_TECHNOLOGIES.iter().map(|(name, _)| name.to_string()),
            ),
            metadata: InternTable::new(),
            next_sample_id: 1,
        }
    }

    pub fn technology_id(&mut self, conn: &Connection, name: &str) -> Result<u32, GexError> {
        let interned = self.technologies.intern(name.to_string());
        if interned.fresh {
            conn.execute(
                "INSERT INTO technologies (id, public_id, name) VALUES (?1, ?2, ?3)",
                params![interned.id, public_id(), name],
            )?;
        }
        Ok(interned.id)
    }

    pub fn insert_dataset(
        &mut self,
        conn: &Connection,
        row: &DatasetRow<'_>,
        samples: &[Sample],
    ) -> Result<InsertedDataset, GexError> {
        let technology_id = self.technology_id(conn, row.technology)?;
        let interned = self.datasets.intern(row.name.to_string());
        if !interned.fresh {
            return Err(GexError::InvalidDatasetName(format!(
                "{} is listed more than once",
                row.name
            )));
        }
        let dataset_public_id = public_id();
        conn.execute(
            "INSERT INTO datasets (id, public_id, genome_id, name, technology_id, platform, institution, description)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                interned.id,
                dataset_public_id,
                row.genome.db_id(),
                row.name,
                technology_id,
                row.platform,
                row.institution,
                row.description,
            ],
        )?;
        conn.execute(
            "INSERT INTO dataset_permissions (dataset_id, permission_id) VALUES (?1, 1)",
            params![interned.id],
        )?;

        let mut sample_stmt = conn.prepare(
            "INSERT INTO samples (id, public_id, dataset_id, name) VALUES (?1, ?2, ?3, ?4)",
        )?;
        let mut value_stmt = conn.prepare(
            "INSERT INTO sample_metadata (sample_id, metadata_id, value, color) VALUES (?1, ?2, ?3, ?4)",
        )?;
        for sample in samples {
            let sample_id = self.next_sample_id;
            self.next_sample_id += 1;
            sample_stmt.execute(params![sample_id, public_id(), interned.id, sample.name])?;

            for item in &sample.metadata {
                let metadata = self.metadata.intern(item.name.clone());
                if metadata.fresh {
                    conn.execute(
                        "INSERT INTO metadata (id, public_id, name, color) VALUES (?1, ?2, ?3, ?4)",
                        params![metadata.id, public_id(), item.name, item.color],
                    )?;
                }
                value_stmt.execute(params![sample_id, metadata.id, item.value, item.color])?;
            }
        }

        Ok(InsertedDataset {
            id: interned.id,
            public_id: dataset_public_id,
            samples: samples.len(),
        })
    }
}

impl Default for CatalogWriter {
    fn default() -> Self {
        Self::new()
    }
}

pub fn dataset_id(conn: &Connection, name: &str) -> Result<Option<u32>, GexError> {
    optional_id(
        conn,
        "SELECT id FROM datasets WHERE name = ?1 OR public_id = ?1",
        name,
    )
}

pub fn expression_type_id(conn: &Connection, name: &str) -> Result<Option<u32>, GexError> {
    optional_id(
        conn,
        "SELECT id FROM expression_types WHERE name = ?1 COLLATE NOCASE",
        name,
    )
}

pub fn dataset_samples(conn: &Connection, dataset_id: u32) -> Result<Vec<String>, GexError> {
    let mut stmt = conn.prepare("SELECT name FROM samples WHERE dataset_id = ?1 ORDER BY id")?;
    let names = stmt
        .query_map(params![dataset_id], |row| row.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(names)
}

fn optional_id(conn: &Connection, sql: &str, value: &str) -> Result<Option<u32>, GexError> {
    let mut stmt = conn.prepare(sql)?;
    let mut rows = stmt.query(params![value])?;
    match rows.next()? {
        Some(row) => Ok(Some(row.get(0)?)),
        None => Ok(None),
    }
}
