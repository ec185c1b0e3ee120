use std::fmt;
use std::str::FromStr;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::error::GexError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Genome {
    Human,
    Mouse,
}

impl Genome {
    pub const ALL: [Genome; 2] = [Genome::Human, Genome::Mouse];

    pub fn db_id(self) -> u32 {
        match self {
            Genome::Human => 1,
            Genome::Mouse => 2,
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            Genome::Human => "Human",
            Genome::Mouse => "Mouse",
        }
    }

    pub fn scientific_name(self) -> &'static str {
        match self {
            Genome::Human => "Homo sapiens",
            Genome::Mouse => "Mus musculus",
        }
    }
}

impl fmt::Display for Genome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Genome::Human => write!(f, "human"),
            Genome::Mouse => write!(f, "mouse"),
        }
    }
}

impl FromStr for Genome {
    type Err = GexError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "human" | "homo sapiens" | "hg19" | "grch37" | "hg38" | "grch38" => Ok(Genome::Human),
            "mouse" | "mus musculus" | "mm10" | "grcm38" | "grcm39" => Ok(Genome::Mouse),
            _ => Err(GexError::InvalidGenome(value.to_string())),
        }
    }
}

/// On-disk header layout of an expression file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum HeaderLayout {
    /// 16-byte header, records are bare float vectors. Version 1.
    Legacy,
    /// 20-byte header with block size, records carry a u32 row identifier. Version 2.
    #[default]
    Keyed,
}

impl HeaderLayout {
    pub fn version(self) -> u32 {
        match self {
            HeaderLayout::Legacy => 1,
            HeaderLayout::Keyed => 2,
        }
    }

    pub fn from_version(version: u32) -> Result<Self, GexError> {
        match version {
            1 => Ok(HeaderLayout::Legacy),
            2 => Ok(HeaderLayout::Keyed),
            other => Err(GexError::UnsupportedVersion(other)),
        }
    }

    pub fn header_size(self) -> u64 {
        match self {
            HeaderLayout::Legacy => 16,
            HeaderLayout::Keyed => 20,
        }
    }

    pub fn record_size(self, columns: u32) -> u64 {
        let values = u64::from(columns) * 4;
        match self {
            HeaderLayout::Legacy => values,
            HeaderLayout::Keyed => 4 + values,
        }
    }
}

impl fmt::Display for HeaderLayout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HeaderLayout::Legacy => write!(f, "legacy"),
            HeaderLayout::Keyed => write!(f, "keyed"),
        }
    }
}

impl FromStr for HeaderLayout {
    type Err = GexError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "legacy" | "a" => Ok(HeaderLayout::Legacy),
            "keyed" | "b" => Ok(HeaderLayout::Keyed),
            _ => Err(GexError::InvalidLayout(value.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DatasetName(String);

impl DatasetName {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn slug(&self) -> String {
        self.0.replace([' ', '/'], "_").to_lowercase()
    }
}

impl fmt::Display for DatasetName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for DatasetName {
    type Err = GexError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return Err(GexError::InvalidDatasetName(value.to_string()));
        }
        Ok(Self(trimmed.to_string()))
    }
}

pub fn expression_type_slug(name: &str) -> String {
    name.to_lowercase()
        .replace([' ', '/', '.', '+'], "_")
        .replace(['(', ')'], "")
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn parse_genome_aliases() {
        assert_eq!("Human".parse::<Genome>().unwrap(), Genome::Human);
        assert_eq!("mm10".parse::<Genome>().unwrap(), Genome::Mouse);
        let err = "yeast".parse::<Genome>().unwrap_err();
        assert_matches!(err, GexError::InvalidGenome(_));
    }

    #[test]
    fn layout_sizes() {
        assert_eq!(HeaderLayout::Legacy.header_size(), 16);
        assert_eq!(HeaderLayout::Keyed.header_size(), 20);
        assert_eq!(HeaderLayout::Legacy.record_size(4), 16);
        assert_eq!(HeaderLayout::Keyed.record_size(4), 20);
    }

    #[test]
    fn slugs() {
        let name: DatasetName = "RDF N/GC B".parse().unwrap();
        assert_eq!(name.slug(), "rdf_n_gc_b");
        assert_eq!(expression_type_slug("log2(TPM+1)"), "log2tpm_1");
        assert_eq!(expression_type_slug("VST.norm"), "vst_norm");
    }
}
