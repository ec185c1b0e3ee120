use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum GexError {
    #[error("invalid genome: {0}")]
    InvalidGenome(String),

    #[error("invalid header layout: {0}")]
    InvalidLayout(String),

    #[error("invalid data entry (expected TYPE=PATH): {0}")]
    InvalidDataEntry(String),

    #[error("invalid dataset name: {0}")]
    InvalidDatasetName(String),

    #[error("missing config file datasets.json in current directory")]
    MissingConfig,

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("filesystem error: {0}")]
    Filesystem(String),

    #[error("reference table {path}: {message}")]
    Reference { path: String, message: String },

    #[error("phenotype table {path}: {message}")]
    Phenotype { path: String, message: String },

    #[error("expression matrix {path}: {message}")]
    Matrix { path: String, message: String },

    #[error("expression matrix {path} has no column for sample {sample}")]
    #[diagnostic(help(
        "every sample in the phenotype table must be present in each matrix; column order is positional"
    ))]
    MissingSampleColumn { path: String, sample: String },

    #[error("row {row} has {actual} values, expected {expected}")]
    RowShape {
        row: usize,
        expected: usize,
        actual: usize,
    },

    #[error("{what} does not fit in a u32: {value}")]
    Overflow { what: &'static str, value: u64 },

    #[error("bad magic number {0} (expected 42)")]
    BadMagic(u32),

    #[error("unsupported format version {0}")]
    UnsupportedVersion(u32),

    #[error("corrupt expression file: {0}")]
    Corrupt(String),

    #[error("read of {length} bytes at offset {offset} is out of bounds (file size {file_size})")]
    OutOfBounds {
        offset: u64,
        length: u64,
        file_size: u64,
    },

    #[error("record length {0} is not a multiple of 4")]
    MisalignedLength(u64),

    #[error(
        "duplicate index entry for dataset {dataset_id}, probe {probe}, expression type {expression_type_id}"
    )]
    #[diagnostic(help("the source matrix most likely contains the same probe twice"))]
    DuplicateIndexEntry {
        dataset_id: u32,
        probe: String,
        expression_type_id: u32,
    },

    #[error("{second} would overwrite {url}, already written for {first}")]
    #[diagnostic(help(
        "file names are built from lowercased, slugged dataset and expression type names; rename one of them"
    ))]
    FileUrlCollision {
        url: String,
        first: String,
        second: String,
    },

    #[error("database error: {0}")]
    Database(String),

    #[error("dataset not found: {0}")]
    DatasetNotFound(String),

    #[error("expression type {expression_type} not found for dataset {dataset}")]
    ExpressionTypeNotFound {
        dataset: String,
        expression_type: String,
    },
}

impl From<rusqlite::Error> for GexError {
    fn from(err: rusqlite::Error) -> Self {
        GexError::Database(err.to_string())
    }
}
