use assert_matches::assert_matches;

use gex_etl::domain::{DatasetName, Genome, HeaderLayout, expression_type_slug};
use gex_etl::error::GexError;

#[test]
fn parse_domain_values() {
    assert_eq!("Mus musculus".parse::<Genome>().unwrap(), Genome::Mouse);
    assert_eq!("hg38".parse::<Genome>().unwrap(), Genome::Human);
    assert_eq!(Genome::Mouse.to_string(), "mouse");

    assert_eq!("B".parse::<HeaderLayout>().unwrap(), HeaderLayout::Keyed);
    assert_eq!("legacy".parse::<HeaderLayout>().unwrap(), HeaderLayout::Legacy);
    assert_matches!("wide".parse::<HeaderLayout>(), Err(GexError::InvalidLayout(_)));
    assert_matches!("".parse::<DatasetName>(), Err(GexError::InvalidDatasetName(_)));
}

#[test]
fn layout_versions_round_trip() {
    for layout in [HeaderLayout::Legacy, HeaderLayout::Keyed] {
        assert_eq!(HeaderLayout::from_version(layout.version()).unwrap(), layout);
    }
    assert_matches!(HeaderLayout::from_version(3), Err(GexError::UnsupportedVersion(3)));
}

#[test]
fn expression_type_slugs() {
    assert_eq!(expression_type_slug("Counts"), "counts");
    assert_eq!(expression_type_slug("RMA (gene)"), "rma_gene");
    assert_eq!(expression_type_slug("z/score"), "z_score");
}
