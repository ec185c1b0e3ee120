use std::fs::File;
use std::io::{self, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::Path;

use serde::Serialize;

use crate::domain::HeaderLayout;
use crate::error::GexError;

pub const MAGIC: u32 = 42;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FileHeader {
    pub layout: HeaderLayout,
    pub rows: u32,
    pub columns: u32,
}

impl FileHeader {
    pub fn new(layout: HeaderLayout, rows: usize, columns: usize) -> Result<Self, GexError> {
        Ok(Self {
            layout,
            rows: to_u32("row count", rows as u64)?,
            columns: to_u32("column count", columns as u64)?,
        })
    }

    pub fn version(&self) -> u32 {
        self.layout.version()
    }

    pub fn header_size(&self) -> u64 {
        self.layout.header_size()
    }

    pub fn record_size(&self) -> u64 {
        self.layout.record_size(self.columns)
    }

    pub fn expected_file_size(&self) -> u64 {
        self.header_size() + u64::from(self.rows) * self.record_size()
    }

    fn to_bytes(self) -> Result<Vec<u8>, GexError> {
        let mut bytes = Vec::with_capacity(self.header_size() as usize);
        bytes.extend_from_slice(&MAGIC.to_le_bytes());
        bytes.extend_from_slice(&self.version().to_le_bytes());
        bytes.extend_from_slice(&self.rows.to_le_bytes());
        bytes.extend_from_slice(&self.columns.to_le_bytes());
        if self.layout == HeaderLayout::Keyed {
            let block_size = to_u32("block size", self.record_size())?;
            bytes.extend_from_slice(&block_size.to_le_bytes());
        }
        Ok(bytes)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RowSpan {
    pub offset: u64,
    pub length: u64,
}

#[derive(Debug, Clone, Copy)]
pub struct RowInput<'a> {
    pub id: u32,
    pub values: &'a [f32],
}

#[derive(Debug, Clone)]
pub struct EncodedFile {
    pub header: FileHeader,
    pub spans: Vec<RowSpan>,
    pub bytes_written: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RowRecord {
    pub id: Option<u32>,
    pub values: Vec<f32>,
}

struct CountingWriter<W> {
    inner: W,
    position: u64,
}

impl<W: Write> Write for CountingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let written = self.inner.write(buf)?;
        self.position += written as u64;
        Ok(written)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

pub fn encode<W: Write>(
    writer: W,
    layout: HeaderLayout,
    columns: usize,
    rows: &[RowInput<'_>],
) -> Result<EncodedFile, GexError> {
    let header = FileHeader::new(layout, rows.len(), columns)?;
    let mut out = CountingWriter {
        inner: writer,
        position: 0,
    };
    out.write_all(&header.to_bytes()?).map_err(io_error)?;

    let mut spans = Vec::with_capacity(rows.len());
    let mut record = Vec::with_capacity(header.record_size() as usize);
    for (index, row) in rows.iter().enumerate() {
        if row.values.len() != columns {
            return Err(GexError::RowShape {
                row: index,
                expected: columns,
                actual: row.values.len(),
            });
        }
        record.clear();
        if layout == HeaderLayout::Keyed {
            record.extend_from_slice(&row.id.to_le_bytes());
        }
        for value in row.values {
            record.extend_from_slice(&value.to_le_bytes());
        }

        let offset = out.position;
        out.write_all(&record).map_err(io_error)?;
        spans.push(RowSpan {
            offset,
            length: out.position - offset,
        });
    }
    out.flush().map_err(io_error)?;

    Ok(EncodedFile {
        header,
        spans,
        bytes_written: out.position,
    })
}

pub fn write_file(
    path: &Path,
    layout: HeaderLayout,
    columns: usize,
    rows: &[RowInput<'_>],
) -> Result<EncodedFile, GexError> {
    let parent = path
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let temp = tempfile::Builder::new()
        .prefix(".gex-bin")
        .tempfile_in(parent)
        .map_err(|err| GexError::Filesystem(format!("create {}: {err}", path.display())))?;

    let encoded = {
        let mut writer = BufWriter::new(temp.as_file());
        let encoded = encode(&mut writer, layout, columns, rows)?;
        writer.flush().map_err(io_error)?;
        encoded
    };
    temp.as_file().sync_all().map_err(io_error)?;

    temp.persist(path)
        .map_err(|err| GexError::Filesystem(format!("persist {}: {err}", path.display())))?;
    Ok(encoded)
}

pub fn read_header<R: Read>(reader: &mut R) -> Result<FileHeader, GexError> {
    let mut words = [0u32; 4];
    for word in &mut words {
        *word = read_u32(reader)?;
    }
    let [magic, version, rows, columns] = words;
    if magic != MAGIC {
        return Err(GexError::BadMagic(magic));
    }
    let header = FileHeader {
        layout: HeaderLayout::from_version(version)?,
        rows,
        columns,
    };
    if header.layout == HeaderLayout::Keyed {
        let block_size = u64::from(read_u32(reader)?);
        if block_size != header.record_size() {
            return Err(GexError::Corrupt(format!(
                "block size {block_size} does not match {} columns",
                header.columns
            )));
        }
    }
    Ok(header)
}

pub fn read_block<R: Read + Seek>(
    reader: &mut R,
    offset: u64,
    length: u64,
) -> Result<Vec<u8>, GexError> {
    if length % 4 != 0 {
        return Err(GexError::MisalignedLength(length));
    }
    let file_size = reader.seek(SeekFrom::End(0)).map_err(io_error)?;
    let in_bounds = offset
        .checked_add(length)
        .is_some_and(|end| end <= file_size);
    if !in_bounds {
        return Err(GexError::OutOfBounds {
            offset,
            length,
            file_size,
        });
    }
    reader.seek(SeekFrom::Start(offset)).map_err(io_error)?;
    let mut buf = vec![0u8; length as usize];
    reader.read_exact(&mut buf).map_err(io_error)?;
    Ok(buf)
}

pub fn read_values<R: Read + Seek>(
    reader: &mut R,
    offset: u64,
    length: u64,
) -> Result<Vec<f32>, GexError> {
    let block = read_block(reader, offset, length)?;
    Ok(decode_floats(&block))
}

pub fn read_record<R: Read + Seek>(
    reader: &mut R,
    layout: HeaderLayout,
    offset: u64,
    length: u64,
) -> Result<RowRecord, GexError> {
    let block = read_block(reader, offset, length)?;
    match layout {
        HeaderLayout::Legacy => Ok(RowRecord {
            id: None,
            values: decode_floats(&block),
        }),
        HeaderLayout::Keyed => {
            let Some((id, values)) = block.split_first_chunk::<4>() else {
                return Err(GexError::Corrupt(format!(
                    "keyed record at offset {offset} is shorter than its identifier"
                )));
            };
            Ok(RowRecord {
                id: Some(u32::from_le_bytes(*id)),
                values: decode_floats(values),
            })
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct FileSummary {
    pub path: String,
    pub layout: HeaderLayout,
    pub version: u32,
    pub rows: u32,
    pub columns: u32,
    pub header_size: u64,
    pub record_size: u64,
    pub file_size: u64,
    pub expected_size: u64,
    pub trailing_bytes: u64,
    pub truncated: bool,
}

pub fn inspect(path: &Path) -> Result<FileSummary, GexError> {
    let mut file = File::open(path)
        .map_err(|err| GexError::Filesystem(format!("open {}: {err}", path.display())))?;
    let file_size = file.metadata().map_err(io_error)?.len();
    let header = read_header(&mut file)?;
    let expected_size = header.expected_file_size();
    Ok(FileSummary {
        path: path.display().to_string(),
        layout: header.layout,
        version: header.version(),
        rows: header.rows,
        columns: header.columns,
        header_size: header.header_size(),
        record_size: header.record_size(),
        file_size,
        expected_size,
        trailing_bytes: file_size.saturating_sub(expected_size),
        truncated: file_size < expected_size,
    })
}

fn decode_floats(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

fn read_u32<R: Read>(reader: &mut R) -> Result<u32, GexError> {
    let mut buf = [0u8; 4];
    reader.read_exact(&mut buf).map_err(|err| {
        if err.kind() == io::ErrorKind::UnexpectedEof {
            GexError::Corrupt("file is shorter than its header".to_string())
        } else {
            io_error(err)
        }
    })?;
    Ok(u32::from_le_bytes(buf))
}

fn to_u32(what: &'static str, value: u64) -> Result<u32, GexError> {
    u32::try_from(value).map_err(|_| GexError::Overflow { what, value })
}

fn io_error(err: io::Error) -> GexError {
    GexError::Filesystem(err.to_string())
}
