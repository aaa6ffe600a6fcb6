use assert_matches::assert_matches;

use marker_curator::domain::{
    GenomeAccession, GenomeId, MarkerId, NameScheme, Outgroup, SequenceType, TaxonId,
};
use marker_curator::error::CurateError;

#[test]
fn parse_genome_accession_invalid() {
    let err = "ABC_123".parse::<GenomeAccession>().unwrap_err();
    assert_matches!(err, CurateError::InvalidGenomeAccession(_));
}

#[test]
fn parse_taxon_id() {
    let id: TaxonId = " 562 ".parse().unwrap();
    assert_eq!(id.as_str(), "562");
    let err = "E. coli".parse::<TaxonId>().unwrap_err();
    assert_matches!(err, CurateError::InvalidTaxonId(_));
}

#[test]
fn ids_must_be_file_safe() {
    assert_matches!(
        "COG__1".parse::<MarkerId>().unwrap_err(),
        CurateError::InvalidMarkerId(_)
    );
    assert_matches!(
        "a/b".parse::<GenomeId>().unwrap_err(),
        CurateError::InvalidGenomeId(_)
    );
    assert_matches!(
        ".hidden".parse::<GenomeId>().unwrap_err(),
        CurateError::InvalidGenomeId(_)
    );
    let accession: GenomeAccession = "GCA_000001405.29".parse().unwrap();
    assert_eq!(GenomeId::from(&accession).as_str(), "GCA_000001405.29");
}

#[test]
fn parse_outgroup() {
    assert_eq!("2173".parse::<Outgroup>().unwrap(), Outgroup::default_species());
    assert_eq!("false".parse::<Outgroup>().unwrap(), Outgroup::Disabled);
    assert_eq!(
        "isolate_7".parse::<Outgroup>().unwrap(),
        Outgroup::Local("isolate_7".parse().unwrap())
    );
}

#[test]
fn parse_enums() {
    assert_eq!("nucl".parse::<SequenceType>().unwrap(), SequenceType::Nucl);
    assert_eq!(SequenceType::Nucl.extension(), "fna");
    assert_eq!("tx_id".parse::<NameScheme>().unwrap(), NameScheme::TaxonId);
    assert_matches!(
        "genus".parse::<NameScheme>().unwrap_err(),
        CurateError::InvalidNameScheme(_)
    );
}
