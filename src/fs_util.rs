use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use csv::{ReaderBuilder, Trim};
use flate2::read::MultiGzDecoder;

use crate::error::GexError;

pub fn open_text(path: &Path) -> Result<Box<dyn BufRead>, GexError> {
    let file = File::open(path)
        .map_err(|err| GexError::Filesystem(format!("open {}: {err}", path.display())))?;
    let is_gzip = path
        .extension()
        .map(|ext| ext.eq_ignore_ascii_case("gz"))
        .unwrap_or(false);
    if is_gzip {
        Ok(Box::new(BufReader::new(MultiGzDecoder::new(file))))
    } else {
        Ok(Box::new(BufReader::new(file)))
    }
}

#[derive(Debug, Clone)]
pub struct TsvTable {
    pub header: Vec<String>,
    pub rows: Vec<TsvRow>,
}

#[derive(Debug, Clone)]
pub struct TsvRow {
    pub line: usize,
    pub fields: Vec<String>,
}

impl TsvTable {
    pub fn column(&self, name: &str) -> Option<usize> {
        self.header.iter().position(|column| column == name)
    }
}

impl TsvRow {
    pub fn get(&self, index: usize) -> &str {
        self.fields.get(index).map(String::as_str).unwrap_or("")
    }
}

/// Reads a tab-separated table with double-quote quoting. The first
/// non-blank record is the header; blank records are skipped.
pub fn read_tsv(path: &Path) -> Result<TsvTable, GexError> {
    let mut reader = ReaderBuilder::new()
        .delimiter(b'\t')
        .has_headers(false)
        .flexible(true)
        .trim(Trim::All)
        .from_reader(open_text(path)?);

    let mut header = None;
    let mut rows = Vec::new();
    for record in reader.records() {
        let record =
            record.map_err(|err| GexError::Filesystem(format!("read {}: {err}", path.display())))?;
        if record.iter().all(str::is_empty) {
            continue;
        }
        let fields: Vec<String> = record.iter().map(str::to_string).collect();
        if header.is_none() {
            header = Some(fields);
            continue;
        }
        rows.push(TsvRow {
            line: record.position().map_or(0, |position| position.line() as usize),
            fields,
        });
    }

    let header =
        header.ok_or_else(|| GexError::Filesystem(format!("{} is empty", path.display())))?;
    Ok(TsvTable { header, rows })
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use flate2::Compression;
    use flate2::write::GzEncoder;

    use super::*;

    #[test]
    fn reads_plain_and_gzip_tables() {
        let dir = tempfile::tempdir().unwrap();
        let content = "id\tA\tB\n\np1\t1\t2\r\n";

        let plain = dir.path().join("m.tsv");
        std::fs::write(&plain, content).unwrap();

        let gz = dir.path().join("m.tsv.gz");
        let mut encoder = GzEncoder::new(File::create(&gz).unwrap(), Compression::default());
        encoder.write_all(content.as_bytes()).unwrap();
        encoder.finish().unwrap();

        for path in [plain, gz] {
            let table = read_tsv(&path).unwrap();
            assert_eq!(table.header, ["id", "A", "B"]);
            assert_eq!(table.rows.len(), 1);
            assert_eq!(table.rows[0].line, 3);
            assert_eq!(table.rows[0].fields, ["p1", "1", "2"]);
            assert_eq!(table.column("B"), Some(2));
        }
    }

    #[test]
    fn quoted_fields_keep_tabs_and_escaped_quotes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("phenotypes.tsv");
        std::fs::write(
            &path,
            "Sample\tCOO\tNote\nS1\t\"ABC\tGCB\"\t\"say \"\"hi\"\"\"\nS2\tGCB\n",
        )
        .unwrap();

        let table = read_tsv(&path).unwrap();
        assert_eq!(table.header, ["Sample", "COO", "Note"]);
        assert_eq!(table.rows[0].fields, ["S1", "ABC\tGCB", "say \"hi\""]);
        assert_eq!(table.rows[1].fields, ["S2", "GCB"]);
        assert_eq!(table.rows[1].get(2), "");
    }
}
