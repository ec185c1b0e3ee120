use rusqlite::{Connection, ErrorCode, params};
use serde::Serialize;

use crate::db::public_id;
use crate::domain::Genome;
use crate::error::GexError;
use crate::intern::InternTable;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct IndexEntry {
    pub dataset_id: u32,
    pub probe_id: u32,
    pub expression_type_id: u32,
    pub file_id: u32,
    pub offset: u64,
    pub length: u64,
    pub version: u32,
}

/// Writes the expression index. Probe, expression-type and file keys are
/// assigned on first sight and reused for the rest of the run.
#[derive(Debug, Default)]
pub struct IndexWriter {
    probes: InternTable<(Genome, String)>,
    expression_types: InternTable<String>,
    files: InternTable<String>,
    file_owners: Vec<String>,
}

impl IndexWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn probe_id(
        &mut self,
        conn: &Connection,
        genome: Genome,
        probe: &str,
        gene_key: u32,
    ) -> Result<u32, GexError> {
        let interned = self.probes.intern((genome, probe.to_string()));
        if interned.fresh {
            conn.execute(
                "INSERT INTO probes (id, public_id, genome_id, name, gene_id) VALUES (?1, ?2, ?3, ?4, ?5)",
                params![interned.id, public_id(), genome.db_id(), probe, gene_key],
            )?;
        }
        Ok(interned.id)
    }

    pub fn expression_type_id(&mut self, conn: &Connection, name: &str) -> Result<u32, GexError> {
        let interned = self.expression_types.intern(name.to_string());
        if interned.fresh {
            conn.execute(
                "INSERT INTO expression_types (id, public_id, name) VALUES (?1, ?2, ?3)",
                params![interned.id, public_id(), name],
            )?;
        }
        Ok(interned.id)
    }

    /// Registers the file at `url` for `owner`. Each url belongs to exactly
    /// one (dataset, expression type) per run.
    pub fn file_id(&mut self, conn: &Connection, url: &str, owner: &str) -> Result<u32, GexError> {
        let interned = self.files.intern(url.to_string());
        if !interned.fresh {
            let first = self
                .file_owners
                .get(interned.id as usize - 1)
                .cloned()
                .unwrap_or_default();
            return Err(GexError::FileUrlCollision {
                url: url.to_string(),
                first,
                second: owner.to_string(),
            });
        }
        conn.execute(
            "INSERT INTO files (id, public_id, url) VALUES (?1, ?2, ?3)",
            params![interned.id, public_id(), url],
        )?;
        self.file_owners.push(owner.to_string());
        Ok(interned.id)
    }

    pub fn insert_entry(&self, conn: &Connection, entry: &IndexEntry) -> Result<(), GexError> {
        let offset = to_i64("offset", entry.offset)?;
        let length = to_i64("length", entry.length)?;
        let result = conn.execute(
            "INSERT INTO expression (dataset_id, probe_id, expression_type_id, file_id, offset, length, version)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                entry.dataset_id,
                entry.probe_id,
                entry.expression_type_id,
                entry.file_id,
                offset,
                length,
                entry.version,
            ],
        );
        match result {
            Ok(_) => Ok(()),
            Err(rusqlite::Error::SqliteFailure(err, _))
                if err.code == ErrorCode::ConstraintViolation
                    && err.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE =>
            {
                Err(GexError::DuplicateIndexEntry {
                    dataset_id: entry.dataset_id,
                    probe: self.probe_name(entry.probe_id),
                    expression_type_id: entry.expression_type_id,
                })
            }
            Err(err) => Err(err.into()),
        }
    }

    pub fn probe_count(&self) -> usize {
        self.probes.len()
    }

    fn probe_name(&self, probe_id: u32) -> String {
        self.probes
            .key(probe_id)
            .map(|(_, name)| name.clone())
            .unwrap_or_else(|| probe_id.to_string())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct IndexHit {
    pub probe_id: u32,
    pub probe: String,
    pub gene_id: String,
    pub gene_symbol: String,
    pub url: String,
    pub offset: u64,
    pub length: u64,
    pub version: u32,
}

pub fn entries_for_gene(
    conn: &Connection,
    dataset_id: u32,
    expression_type_id: u32,
    label: &str,
) -> Result<Vec<IndexHit>, GexError> {
    let mut stmt = conn.prepare(
        "SELECT p.id, p.name, g.gene_id, g.gene_symbol, f.url, e.offset, e.length, e.version
         FROM expression e
         JOIN probes p ON e.probe_id = p.id
         JOIN genes g ON p.gene_id = g.id
         JOIN files f ON e.file_id = f.id
         WHERE e.dataset_id = ?1
           AND e.expression_type_id = ?2
           AND (g.gene_id = ?3
                OR g.gene_symbol = ?3 COLLATE NOCASE
                OR g.ensembl = ?3
                OR p.name = ?3)
         ORDER BY e.offset",
    )?;
    let rows = stmt.query_map(params![dataset_id, expression_type_id, label], |row| {
        Ok((
            row.get::<_, u32>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, String>(2)?,
            row.get::<_, String>(3)?,
            row.get::<_, String>(4)?,
            row.get::<_, i64>(5)?,
            row.get::<_, i64>(6)?,
            row.get::<_, u32>(7)?,
        ))
    })?;

    let mut hits = Vec::new();
    for row in rows {
        let (probe_id, probe, gene_id, gene_symbol, url, offset, length, version) = row?;
        hits.push(IndexHit {
            probe_id,
            probe,
            gene_id,
            gene_symbol,
            url,
            offset: to_u64("offset", offset)?,
            length: to_u64("length", length)?,
            version,
        });
    }
    Ok(hits)
}

fn to_i64(what: &'static str, value: u64) -> Result<i64, GexError> {
    i64::try_from(value).map_err(|_| GexError::Overflow { what, value })
}

fn to_u64(what: &str, value: i64) -> Result<u64, GexError> {
    u64::try_from(value)
        .map_err(|_| GexError::Corrupt(format!("negative {what} {value} in expression index")))
}
