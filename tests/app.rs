use std::fs::{self, OpenOptions};
use std::io::{Seek, SeekFrom, Write};
use std::sync::Mutex;

use assert_matches::assert_matches;
use camino::Utf8PathBuf;
use rusqlite::Connection;
use tempfile::TempDir;

use gex_etl::alias::GeneAliasTable;
use gex_etl::app::{App, ImportResult, ProgressEvent, ProgressSink};
use gex_etl::codec;
use gex_etl::config::{ConfigLoader, ImportPlan};
use gex_etl::domain::HeaderLayout;
use gex_etl::error::GexError;
use gex_etl::store::Store;

const HUGO: &str = "HGNC ID\tApproved symbol\tPrevious symbols\tAlias symbols\tEnsembl gene ID\tRefSeq IDs\tNCBI Gene ID
HGNC:11998\tTP53\tLFS1\tp53\tENSG00000141510\tNM_000546\t7157
HGNC:1100\tBRCA1\t\tRNF53\tENSG00000012048\tNM_007294\t672
";

const PHENOTYPES: &str = "Sample\tCOO\nS1\tABC|#ff0000\nS2\tGCB\nS3\tABC\n";

#[derive(Default)]
struct RecordingSink {
    messages: Mutex<Vec<String>>,
}

impl ProgressSink for RecordingSink {
    fn event(&self, event: ProgressEvent) {
        self.messages.lock().unwrap().push(event.message);
    }
}

struct Fixture {
    dir: TempDir,
}

impl Fixture {
    fn new() -> Self {
        let fixture = Self {
            dir: tempfile::tempdir().unwrap(),
        };
        fixture.write("hugo.tsv", HUGO);
        fixture.write("phenotypes.tsv", PHENOTYPES);
        fixture.write(
            "tpm.tsv",
            "gene\tS3\tS1\tS2\textra\nTP53\t3\t1\t2\t9\nBRCA1.2\t6\t4\t5\t9\nNOTAGENE\t0\t0\t0\t0\n",
        );
        fixture.write("counts.tsv", "gene\tS1\tS2\tS3\nLFS1\t10\t20\t30\n");
        fixture
    }

    fn write(&self, name: &str, content: &str) {
        fs::write(self.dir.path().join(name), content).unwrap();
    }

    fn root(&self) -> Utf8PathBuf {
        Utf8PathBuf::from_path_buf(self.dir.path().to_path_buf()).unwrap()
    }

    fn plan(&self, data: &str, layout: &str) -> ImportPlan {
        self.plan_with_datasets(&dataset_json("RDF Test", data), layout)
    }

    fn plan_with_datasets(&self, datasets: &str, layout: &str) -> ImportPlan {
        let config = format!(
            r#"{{
                "output": "out",
                "layout": "{layout}",
                "references": {{ "hugo": "hugo.tsv" }},
                "datasets": [{datasets}]
            }}"#
        );
        self.write("datasets.json", &config);
        let path = self.root().join("datasets.json");
        ConfigLoader::resolve(Some(path.as_str())).unwrap()
    }

    fn import(&self, plan: &ImportPlan) -> (App, Result<ImportResult, GexError>) {
        let sink = RecordingSink::default();
        let aliases = App::load_aliases(&plan.references, &sink).unwrap();
        let app = App::new(Store::new(plan.output.clone().unwrap()));
        let result = app.import(plan, &aliases, &sink);
        (app, result)
    }
}

fn dataset_json(name: &str, data: &str) -> String {
    format!(
        r#"{{
            "name": "{name}",
            "genome": "Human",
            "technology": "RNA-seq",
            "platform": "Illumina",
            "institution": "Lab",
            "phenotypes": "phenotypes.tsv",
            "data": {data}
        }}"#
    )
}

#[test]
fn import_then_lookup() {
    let fixture = Fixture::new();
    let plan = fixture.plan(r#"["TPM=tpm.tsv", {"type": "Counts", "path": "counts.tsv"}]"#, "keyed");
    let (app, result) = fixture.import(&plan);
    let result = result.unwrap();

    assert_eq!(result.genes, 2);
    assert_eq!(result.probes, 3);
    assert_eq!(result.rows_written(), 3);
    assert_eq!(result.rows_dropped(), 1);

    let tpm = &result.datasets[0].files[0];
    assert_eq!(tpm.url, "human/rna-seq/rdf_test/tpm.bin");
    assert_eq!(tpm.rows_read, 3);
    assert_eq!(tpm.dropped_probes, ["NOTAGENE"]);
    assert_eq!(tpm.ignored_columns, ["extra"]);
    assert_eq!(tpm.bytes_written, 20 + 2 * 16);

    let conn = Connection::open(app.store().database_path()).unwrap();
    let entries: u32 = conn
        .query_row("SELECT COUNT(*) FROM expression", [], |row| row.get(0))
        .unwrap();
    assert_eq!(entries, 3);
    let dropped: u32 = conn
        .query_row("SELECT COUNT(*) FROM probes WHERE name = 'NOTAGENE'", [], |row| row.get(0))
        .unwrap();
    assert_eq!(dropped, 0);

    let sink = RecordingSink::default();
    let genes = ["tp53", "ENSG00000012048", "MISSING"].map(String::from);
    let lookup = app.lookup("RDF Test", "TPM", &genes, &sink).unwrap();
    assert_eq!(lookup.samples, ["S1", "S2", "S3"]);
    assert_eq!(lookup.features.len(), 2);
    assert_eq!(lookup.features[0].gene_symbol, "TP53");
    assert_eq!(lookup.features[0].values, [1.0, 2.0, 3.0]);
    assert_eq!(lookup.features[1].probe, "BRCA1");
    assert_eq!(lookup.features[1].values, [4.0, 5.0, 6.0]);
    assert_eq!(lookup.missing, ["MISSING"]);

    let counts = app
        .lookup("RDF Test", "counts", &["TP53".to_string()], &sink)
        .unwrap();
    assert_eq!(counts.features[0].probe, "LFS1");
    assert_eq!(counts.features[0].values, [10.0, 20.0, 30.0]);

    let manifest = app.store().read_manifest().unwrap().unwrap();
    assert_eq!(manifest.layout, "keyed");
    assert_eq!(manifest.datasets[0].files.len(), 2);
}

#[test]
fn progress_reports_each_phase() {
    let fixture = Fixture::new();
    let plan = fixture.plan(r#"["TPM=tpm.tsv"]"#, "keyed");
    let sink = RecordingSink::default();
    let aliases = App::load_aliases(&plan.references, &sink).unwrap();
    let app = App::new(Store::new(plan.output.clone().unwrap()));
    app.import(&plan, &aliases, &sink).unwrap();

    let messages = sink.messages.lock().unwrap();
    for phase in ["phase=Reference", "phase=Schema", "phase=Genes", "phase=Encode", "phase=Index"] {
        assert!(
            messages.iter().any(|message| message.starts_with(phase)),
            "missing {phase}"
        );
    }
}

#[test]
fn reimport_replaces_previous_output() {
    let fixture = Fixture::new();
    let plan = fixture.plan(r#"["TPM=tpm.tsv"]"#, "keyed");
    fixture.import(&plan).1.unwrap();

    fixture.write("tpm.tsv", "gene\tS1\tS2\tS3\nTP53\t7\t8\t9\n");
    let (app, result) = fixture.import(&plan);
    assert_eq!(result.unwrap().rows_written(), 1);

    let path = app.store().resolve_url("human/rna-seq/rdf_test/tpm.bin");
    let summary = App::inspect(path.as_std_path(), &RecordingSink::default()).unwrap();
    assert_eq!(summary.rows, 1);
    assert_eq!(summary.trailing_bytes, 0);
}

#[test]
fn legacy_layout_round_trips() {
    let fixture = Fixture::new();
    let plan = fixture.plan(r#"["TPM=tpm.tsv"]"#, "legacy");
    assert_eq!(plan.layout, HeaderLayout::Legacy);
    let (app, result) = fixture.import(&plan);
    assert_eq!(result.unwrap().datasets[0].files[0].bytes_written, 16 + 2 * 12);

    let conn = Connection::open(app.store().database_path()).unwrap();
    let version: u32 = conn
        .query_row("SELECT DISTINCT version FROM expression", [], |row| row.get(0))
        .unwrap();
    assert_eq!(version, 1);

    let lookup = app
        .lookup("RDF Test", "TPM", &["BRCA1".to_string()], &RecordingSink::default())
        .unwrap();
    assert_eq!(lookup.features[0].values, [4.0, 5.0, 6.0]);
}

#[test]
fn missing_sample_column_aborts_import() {
    let fixture = Fixture::new();
    fixture.write("phenotypes.tsv", "Sample\nS1\nS2\nS3\nS4\n");
    let plan = fixture.plan(r#"["TPM=tpm.tsv"]"#, "keyed");
    let (_, result) = fixture.import(&plan);
    assert_matches!(
        result,
        Err(GexError::MissingSampleColumn { sample, .. }) if sample == "S4"
    );
}

#[test]
fn repeated_probe_is_a_duplicate_index_entry() {
    let fixture = Fixture::new();
    fixture.write("tpm.tsv", "gene\tS1\tS2\tS3\nTP53\t1\t2\t3\nTP53\t4\t5\t6\n");
    let plan = fixture.plan(r#"["TPM=tpm.tsv"]"#, "keyed");
    let (_, result) = fixture.import(&plan);
    assert_matches!(
        result,
        Err(GexError::DuplicateIndexEntry { probe, .. }) if probe == "TP53"
    );
}

// Columns are matched by header name only. A header that labels the wrong
// sample is accepted and its values are attributed to that sample.
#[test]
fn mislabelled_columns_change_meaning_silently() {
    let fixture = Fixture::new();
    fixture.write("tpm.tsv", "gene\tS2\tS1\tS3\nTP53\t1\t2\t3\n");
    let plan = fixture.plan(r#"["TPM=tpm.tsv"]"#, "keyed");
    let (app, result) = fixture.import(&plan);
    result.unwrap();

    let lookup = app
        .lookup("RDF Test", "TPM", &["TP53".to_string()], &RecordingSink::default())
        .unwrap();
    assert_eq!(lookup.samples, ["S1", "S2", "S3"]);
    assert_eq!(lookup.features[0].values, [2.0, 1.0, 3.0]);
}

#[test]
fn lookup_detects_record_for_another_probe() {
    let fixture = Fixture::new();
    let plan = fixture.plan(r#"["TPM=tpm.tsv"]"#, "keyed");
    let (app, result) = fixture.import(&plan);
    result.unwrap();

    let path = app.store().resolve_url("human/rna-seq/rdf_test/tpm.bin");
    let mut file = OpenOptions::new().write(true).open(path.as_std_path()).unwrap();
    file.seek(SeekFrom::Start(20)).unwrap();
    file.write_all(&999u32.to_le_bytes()).unwrap();
    drop(file);

    let err = app
        .lookup("RDF Test", "TPM", &["TP53".to_string()], &RecordingSink::default())
        .unwrap_err();
    assert_matches!(err, GexError::Corrupt(_));
}

#[test]
fn lookup_unknown_dataset_and_type() {
    let fixture = Fixture::new();
    let plan = fixture.plan(r#"["TPM=tpm.tsv"]"#, "keyed");
    let (app, result) = fixture.import(&plan);
    result.unwrap();
    let sink = RecordingSink::default();
    let genes = ["TP53".to_string()];

    let err = app.lookup("Nope", "TPM", &genes, &sink).unwrap_err();
    assert_matches!(err, GexError::DatasetNotFound(_));
    let err = app.lookup("RDF Test", "FPKM", &genes, &sink).unwrap_err();
    assert_matches!(err, GexError::ExpressionTypeNotFound { .. });
}

#[test]
fn aliases_need_a_reference() {
    let fixture = Fixture::new();
    let mut plan = fixture.plan(r#"["TPM=tpm.tsv"]"#, "keyed");
    plan.references.hugo = None;
    let err = App::load_aliases(&plan.references, &RecordingSink::default()).unwrap_err();
    assert_matches!(err, GexError::Reference { .. });

    let table = GeneAliasTable::builder().build();
    let app = App::new(Store::new(plan.output.clone().unwrap()));
    let result = app.import(&plan, &table, &RecordingSink::default()).unwrap();
    assert_eq!(result.rows_written(), 0);
    assert_eq!(result.rows_dropped(), 3);
}

#[test]
fn colliding_file_urls_are_rejected() {
    let fixture = Fixture::new();
    fixture.write("tpm_b.tsv", "gene\tS1\tS2\tS3\nTP53\t100\t200\t300\n");

    let datasets = format!(
        "{},{}",
        dataset_json("RDF A/B", r#"["TPM=tpm.tsv"]"#),
        dataset_json("RDF A B", r#"["TPM=tpm_b.tsv"]"#)
    );
    let plan = fixture.plan_with_datasets(&datasets, "legacy");
    let (app, result) = fixture.import(&plan);
    assert_matches!(
        result,
        Err(GexError::FileUrlCollision { url, first, second })
            if url == "human/rna-seq/rdf_a_b/tpm.bin"
                && first == "RDF A/B TPM"
                && second == "RDF A B TPM"
    );

    let path = app.store().resolve_url("human/rna-seq/rdf_a_b/tpm.bin");
    let mut file = fs::File::open(path.as_std_path()).unwrap();
    let header = codec::read_header(&mut file).unwrap();
    let record = codec::read_record(&mut file, header.layout, 16, 12).unwrap();
    assert_eq!(record.values, [1.0, 2.0, 3.0]);

    let plan = fixture.plan(r#"["TPM=tpm.tsv", "tpm=tpm_b.tsv"]"#, "keyed");
    let (_, result) = fixture.import(&plan);
    assert_matches!(
        result,
        Err(GexError::FileUrlCollision { first, second, .. })
            if first == "RDF Test TPM" && second == "RDF Test tpm"
    );
}
