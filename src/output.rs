use std::io::{self, Write};

use serde::Serialize;
use tracing::info;

use crate::app::{ImportResult, LookupResult, ProgressEvent, ProgressSink};
use crate::codec::FileSummary;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    Human,
    Json,
}

const GREEN: &str = "\x1b[32m";
const YELLOW: &str = "\x1b[33m";
const CYAN: &str = "\x1b[36m";
const RESET: &str = "\x1b[0m";

pub struct JsonOutput;

impl JsonOutput {
    pub fn print_import(result: &ImportResult) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_lookup(result: &LookupResult) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_inspect(summary: &FileSummary) -> io::Result<()> {
        Self::print_json(summary)
    }

    fn print_json<T: Serialize>(value: &T) -> io::Result<()> {
        let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
        let mut stdout = io::stdout();
        stdout.write_all(json.as_bytes())?;
        stdout.write_all(b"\n")?;
        Ok(())
    }
}

pub struct HumanOutput;

impl HumanOutput {
    pub fn print_import(result: &ImportResult) {
        println!("{CYAN}gex-etl import summary{RESET}");
        println!(
            "{GREEN}{} datasets, {} genes, {} probes, {} rows written{RESET}",
            result.datasets.len(),
            result.genes,
            result.probes,
            result.rows_written()
        );
        let dropped = result.rows_dropped();
        if dropped > 0 {
            println!("{YELLOW}{dropped} rows dropped (unresolved gene labels){RESET}");
        }
        for dataset in &result.datasets {
            println!(
                "  {} [{} / {}] {} samples",
                dataset.name, dataset.genome, dataset.technology, dataset.samples
            );
            for file in &dataset.files {
                let color = if file.rows_dropped > 0 { YELLOW } else { GREEN };
                println!(
                    "{color}    {}: {} written, {} dropped -> {}{RESET}",
                    file.expression_type, file.rows_written, file.rows_dropped, file.url
                );
                if !file.ignored_columns.is_empty() {
                    println!(
                        "{YELLOW}      ignored columns: {}{RESET}",
                        file.ignored_columns.join(", ")
                    );
                }
            }
        }
        println!("database: {}", result.database);
    }

    pub fn print_lookup(result: &LookupResult) {
        println!(
            "{CYAN}{} / {} ({} samples){RESET}",
            result.dataset,
            result.expression_type,
            result.samples.len()
        );
        for feature in &result.features {
            println!(
                "{GREEN}{} -> {} ({}, {}){RESET}",
                feature.query, feature.probe, feature.gene_symbol, feature.gene_id
            );
            for (sample, value) in result.samples.iter().zip(&feature.values) {
                println!("  {sample}\t{value}");
            }
        }
        for gene in &result.missing {
            println!("{YELLOW}{gene}: no expression data{RESET}");
        }
    }

    pub fn print_inspect(summary: &FileSummary) {
        println!("{CYAN}{}{RESET}", summary.path);
        println!(
            "  layout {} (version {}), {} rows x {} columns",
            summary.layout, summary.version, summary.rows, summary.columns
        );
        println!(
            "  header {} bytes, record {} bytes, file {} bytes (expected {})",
            summary.header_size, summary.record_size, summary.file_size, summary.expected_size
        );
        if summary.truncated {
            println!("{YELLOW}  truncated{RESET}");
        } else if summary.trailing_bytes > 0 {
            println!("{YELLOW}  {} trailing bytes{RESET}", summary.trailing_bytes);
        }
    }
}

/// Progress lines on stderr for interactive runs.
pub struct ConsoleProgress;

impl ProgressSink for ConsoleProgress {
    fn event(&self, event: ProgressEvent) {
        match event.elapsed {
            Some(elapsed) => eprintln!("[{:>7.2}s] {}", elapsed.as_secs_f64(), event.message),
            None => eprintln!("           {}", event.message),
        }
    }
}

pub struct LogProgress;

impl ProgressSink for LogProgress {
    fn event(&self, event: ProgressEvent) {
        match event.elapsed {
            Some(elapsed) => info!(elapsed_ms = elapsed.as_millis() as u64, "{}", event.message),
            None => info!("{}", event.message),
        }
    }
}
