use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::fs::File;
use std::path::Path;
use std::time::{Duration, Instant};

use rusqlite::Connection;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::alias::GeneAliasTable;
use crate::codec::{self, FileHeader, FileSummary};
use crate::config::{DatasetRequest, ExpressionRequest, ImportPlan, ReferencePaths};
use crate::db::{self, CatalogWriter, DatasetRow};
use crate::domain::{Genome, HeaderLayout};
use crate::error::GexError;
use crate::index::{self, IndexEntry, IndexWriter};
use crate::matrix::ExpressionMatrix;
use crate::phenotype::PhenotypeTable;
use crate::store::{DATABASE_FILE, Manifest, ManifestDataset, Store, expression_file_url};

#[derive(Debug, Clone, Serialize)]
pub struct ImportResult {
    pub output: String,
    pub database: String,
    pub layout: HeaderLayout,
    pub genes: usize,
    pub probes: usize,
    pub datasets: Vec<DatasetResult>,
    pub elapsed_ms: u64,
}

impl ImportResult {
    pub fn rows_written(&self) -> usize {
        self.files().map(|file| file.rows_written).sum()
    }

    pub fn rows_dropped(&self) -> usize {
        self.files().map(|file| file.rows_dropped).sum()
    }

    fn files(&self) -> impl Iterator<Item = &ExpressionFileResult> {
        self.datasets.iter().flat_map(|dataset| dataset.files.iter())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DatasetResult {
    pub name: String,
    pub public_id: String,
    pub genome: Genome,
    pub technology: String,
    pub samples: usize,
    pub files: Vec<ExpressionFileResult>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExpressionFileResult {
    pub expression_type: String,
    pub source: String,
    pub url: String,
    pub rows_read: usize,
    pub rows_written: usize,
    pub rows_dropped: usize,
    pub dropped_probes: Vec<String>,
    pub ignored_columns: Vec<String>,
    pub bytes_written: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct LookupResult {
    pub dataset: String,
    pub expression_type: String,
    pub samples: Vec<String>,
    pub features: Vec<FeatureValues>,
    pub missing: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FeatureValues {
    pub query: String,
    pub probe: String,
    pub gene_id: String,
    pub gene_symbol: String,
    pub values: Vec<f32>,
}

#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub message: String,
    pub elapsed: Option<Duration>,
}

pub trait ProgressSink {
    fn event(&self, event: ProgressEvent);
}

#[derive(Debug, Clone)]
pub struct App {
    store: Store,
}

impl App {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn load_aliases(
        references: &ReferencePaths,
        sink: &dyn ProgressSink,
    ) -> Result<GeneAliasTable, GexError> {
        if references.hugo.is_none() && references.mgi.is_none() {
            return Err(GexError::Reference {
                path: "-".to_string(),
                message: "no HUGO or MGI table configured".to_string(),
            });
        }

        let started = Instant::now();
        let mut builder = GeneAliasTable::builder();
        if let Some(hugo) = &references.hugo {
            builder.load_hugo(hugo.as_std_path())?;
        }
        if let Some(mgi) = &references.mgi {
            builder.load_mgi(mgi.as_std_path())?;
        }
        let aliases = builder.build();
        sink.event(ProgressEvent {
            message: format!("phase=Reference; {} genes", aliases.len()),
            elapsed: Some(started.elapsed()),
        });
        Ok(aliases)
    }

    /// Rebuilds the database and every binary file listed in `plan`. Phases
    /// commit independently; after an error, committed rows remain and
    /// binary files written so far should not be trusted.
    pub fn import(
        &self,
        plan: &ImportPlan,
        aliases: &GeneAliasTable,
        sink: &dyn ProgressSink,
    ) -> Result<ImportResult, GexError> {
        let started = Instant::now();
        self.store.ensure_root()?;
        if self.store.remove_database()? {
            info!(path = %self.store.database_path(), "removed previous database");
        }

        let database = self.store.database_path();
        let mut conn = db::open(database.as_std_path())?;
        db::create_schema(&mut conn)?;
        sink.event(ProgressEvent {
            message: format!("phase=Schema; {database}"),
            elapsed: Some(started.elapsed()),
        });

        let genes = db::insert_genes(&mut conn, aliases)?;
        sink.event(ProgressEvent {
            message: format!("phase=Genes; {genes} genes"),
            elapsed: Some(started.elapsed()),
        });

        let mut catalog = CatalogWriter::new();
        let mut index = IndexWriter::new();
        let mut datasets = Vec::with_capacity(plan.datasets.len());
        for request in &plan.datasets {
            let dataset = self.import_dataset(
                &mut conn,
                plan.layout,
                request,
                aliases,
                &mut catalog,
                &mut index,
                sink,
            )?;
            sink.event(ProgressEvent {
                message: format!(
                    "phase=Dataset; {} ({} samples, {} files)",
                    dataset.name,
                    dataset.samples,
                    dataset.files.len()
                ),
                elapsed: Some(started.elapsed()),
            });
            datasets.push(dataset);
        }

        db::create_secondary_indexes(&mut conn)?;
        sink.event(ProgressEvent {
            message: "phase=Index; secondary indexes created".to_string(),
            elapsed: Some(started.elapsed()),
        });

        let manifest = Manifest {
            tool: format!("gex-etl {}", env!("CARGO_PKG_VERSION")),
            created_at: chrono::Utc::now().to_rfc3339(),
            layout: plan.layout.to_string(),
            database: DATABASE_FILE.to_string(),
            datasets: datasets
                .iter()
                .map(|dataset| ManifestDataset {
                    name: dataset.name.clone(),
                    public_id: dataset.public_id.clone(),
                    files: dataset.files.iter().map(|file| file.url.clone()).collect(),
                })
                .collect(),
        };
        self.store.write_manifest(&manifest)?;

        let result = ImportResult {
            output: self.store.root().to_string(),
            database: database.to_string(),
            layout: plan.layout,
            genes,
            probes: index.probe_count(),
            datasets,
            elapsed_ms: started.elapsed().as_millis() as u64,
        };
        info!(
            datasets = result.datasets.len(),
            rows_written = result.rows_written(),
            rows_dropped = result.rows_dropped(),
            "import finished"
        );
        Ok(result)
    }

    #[allow(clippy::too_many_arguments)]
    fn import_dataset(
        &self,
        conn: &mut Connection,
        layout: HeaderLayout,
        request: &DatasetRequest,
        aliases: &GeneAliasTable,
        catalog: &mut CatalogWriter,
        index: &mut IndexWriter,
        sink: &dyn ProgressSink,
    ) -> Result<DatasetResult, GexError> {
        let phenotypes = PhenotypeTable::load(request.phenotypes.as_std_path())?;
        if phenotypes.is_empty() {
            warn!(dataset = request.name.as_str(), "phenotype table has no samples");
        }
        let canonical = phenotypes.sample_names();

        let row = DatasetRow {
            name: request.name.as_str(),
            genome: request.genome,
            technology: &request.technology,
            platform: &request.platform,
            institution: &request.institution,
            description: &request.description,
        };
        let inserted = {
            let tx = conn.transaction()?;
            let inserted = catalog.insert_dataset(&tx, &row, &phenotypes.samples)?;
            tx.commit()?;
            inserted
        };
        debug!(
            dataset = request.name.as_str(),
            id = inserted.id,
            samples = inserted.samples,
            "dataset inserted"
        );

        let tx = conn.transaction()?;
        let mut files = Vec::with_capacity(request.data.len());
        for data in &request.data {
            let file =
                self.import_expression(&tx, layout, request, inserted.id, &canonical, data, aliases, index)?;
            sink.event(ProgressEvent {
                message: format!(
                    "phase=Encode; {} {}: {} rows written, {} dropped",
                    request.name.as_str(),
                    file.expression_type,
                    file.rows_written,
                    file.rows_dropped
                ),
                elapsed: None,
            });
            files.push(file);
        }
        tx.commit()?;

        Ok(DatasetResult {
            name: request.name.as_str().to_string(),
            public_id: inserted.public_id,
            genome: request.genome,
            technology: request.technology.clone(),
            samples: inserted.samples,
            files,
        })
    }

    #[allow(clippy::too_many_arguments)]
    fn import_expression(
        &self,
        conn: &Connection,
        layout: HeaderLayout,
        request: &DatasetRequest,
        dataset_id: u32,
        canonical: &[String],
        data: &ExpressionRequest,
        aliases: &GeneAliasTable,
        index: &mut IndexWriter,
    ) -> Result<ExpressionFileResult, GexError> {
        let matrix = ExpressionMatrix::load(data.path.as_std_path(), data.id_columns)?;
        let rows_read = matrix.len();
        let (matrix, report) = matrix.align(canonical)?;
        let resolved = matrix.resolve(aliases, request.genome);

        let expression_type_id = index.expression_type_id(conn, &data.expression_type)?;
        let url = expression_file_url(
            request.genome,
            &request.technology,
            &request.name,
            &data.expression_type,
        );
        let owner = format!("{} {}", request.name.as_str(), data.expression_type);
        let file_id = index.file_id(conn, &url, &owner)?;
        let probe_ids = resolved
            .rows
            .iter()
            .map(|row| index.probe_id(conn, request.genome, &row.probe, row.gene_key))
            .collect::<Result<Vec<_>, _>>()?;

        let path = self.store.resolve_url(&url);
        if let Some(parent) = path.parent() {
            Store::ensure_dir(parent)?;
        }
        let encoded = codec::write_file(
            path.as_std_path(),
            layout,
            canonical.len(),
            &resolved.row_inputs(&probe_ids),
        )?;

        for (span, &probe_id) in encoded.spans.iter().zip(&probe_ids) {
            index.insert_entry(
                conn,
                &IndexEntry {
                    dataset_id,
                    probe_id,
                    expression_type_id,
                    file_id,
                    offset: span.offset,
                    length: span.length,
                    version: encoded.header.version(),
                },
            )?;
        }
        debug!(
            url = %url,
            rows = encoded.spans.len(),
            bytes = encoded.bytes_written,
            "expression file written"
        );

        Ok(ExpressionFileResult {
            expression_type: data.expression_type.clone(),
            source: data.path.to_string(),
            url,
            rows_read,
            rows_written: encoded.spans.len(),
            rows_dropped: resolved.dropped.len(),
            dropped_probes: resolved.dropped,
            ignored_columns: report.ignored_columns,
            bytes_written: encoded.bytes_written,
        })
    }

    pub fn lookup(
        &self,
        dataset: &str,
        expression_type: &str,
        genes: &[String],
        sink: &dyn ProgressSink,
    ) -> Result<LookupResult, GexError> {
        let database = self.store.database_path();
        if !database.as_std_path().exists() {
            return Err(GexError::Filesystem(format!("no database at {database}")));
        }
        let conn = db::open(database.as_std_path())?;

        let dataset_id = db::dataset_id(&conn, dataset)?
            .ok_or_else(|| GexError::DatasetNotFound(dataset.to_string()))?;
        let expression_type_id = db::expression_type_id(&conn, expression_type)?.ok_or_else(|| {
            GexError::ExpressionTypeNotFound {
                dataset: dataset.to_string(),
                expression_type: expression_type.to_string(),
            }
        })?;
        let samples = db::dataset_samples(&conn, dataset_id)?;
        sink.event(ProgressEvent {
            message: format!("phase=Resolve; {dataset} {expression_type} ({} samples)", samples.len()),
            elapsed: None,
        });

        let mut open_files: HashMap<String, (File, FileHeader)> = HashMap::new();
        let mut features = Vec::new();
        let mut missing = Vec::new();
        for gene in genes {
            let hits = index::entries_for_gene(&conn, dataset_id, expression_type_id, gene)?;
            if hits.is_empty() {
                missing.push(gene.clone());
                continue;
            }

            for hit in hits {
                let (file, header) = match open_files.entry(hit.url.clone()) {
                    Entry::Occupied(entry) => entry.into_mut(),
                    Entry::Vacant(entry) => {
                        let path = self.store.resolve_url(&hit.url);
                        let (file, header) = open_expression_file(path.as_std_path())?;
                        entry.insert((file, header))
                    }
                };
                if header.version() != hit.version {
                    return Err(GexError::Corrupt(format!(
                        "{} has version {}, index expects {}",
                        hit.url,
                        header.version(),
                        hit.version
                    )));
                }

                let record = codec::read_record(file, header.layout, hit.offset, hit.length)?;
                if record.id.is_some_and(|id| id != hit.probe_id) {
                    return Err(GexError::Corrupt(format!(
                        "record at offset {} of {} belongs to probe key {:?}, index expects {} ({})",
                        hit.offset, hit.url, record.id, hit.probe_id, hit.probe
                    )));
                }
                if record.values.len() != samples.len() {
                    return Err(GexError::Corrupt(format!(
                        "record for {} has {} values for {} samples",
                        hit.probe,
                        record.values.len(),
                        samples.len()
                    )));
                }

                features.push(FeatureValues {
                    query: gene.clone(),
                    probe: hit.probe,
                    gene_id: hit.gene_id,
                    gene_symbol: hit.gene_symbol,
                    values: record.values,
                });
            }
        }
        if !missing.is_empty() {
            warn!(dataset, missing = missing.len(), "genes without expression data");
        }

        Ok(LookupResult {
            dataset: dataset.to_string(),
            expression_type: expression_type.to_string(),
            samples,
            features,
            missing,
        })
    }

    pub fn inspect(path: &Path, sink: &dyn ProgressSink) -> Result<FileSummary, GexError> {
        sink.event(ProgressEvent {
            message: format!("phase=Inspect; {}", path.display()),
            elapsed: None,
        });
        let summary = codec::inspect(path)?;
        if summary.trailing_bytes > 0 {
            warn!(
                path = %path.display(),
                trailing = summary.trailing_bytes,
                "file is longer than its header declares"
            );
        }
        if summary.truncated {
            warn!(path = %path.display(), "file is shorter than its header declares");
        }
        Ok(summary)
    }
}

fn open_expression_file(path: &Path) -> Result<(File, FileHeader), GexError> {
    let mut file = File::open(path)
        .map_err(|err| GexError::Filesystem(format!("open {}: {err}", path.display())))?;
    let header = codec::read_header(&mut file)?;
    Ok((file, header))
}
