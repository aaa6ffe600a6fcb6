use std::fs;

use assert_matches::assert_matches;

use marker_curator::catalog::ResolutionPolicy;
use marker_curator::config::{Config, ConfigLoader, OutgroupEntry, SpeciesEntry};
use marker_curator::domain::{NameScheme, Outgroup, SequenceType};
use marker_curator::error::CurateError;

#[test]
fn parse_config_detailed() {
    let json = r#"{
        "schema_version": 1,
        "output": "runs/archaea",
        "species": ["2173", 2190],
        "accessions": ["GCF_000005845.2"],
        "local": "isolates",
        "outgroup": "isolate_7",
        "sequence_type": "nucl",
        "name_type": "tx_id",
        "resolution": "tolerant",
        "panel": "panels/fetchmgs",
        "min_genomes": 4,
        "threads": 8
    }"#;
    let config: Config = serde_json::from_str(json).unwrap();
    let resolved = ConfigLoader::resolve_config(config).unwrap();

    assert_eq!(resolved.output.as_str(), "runs/archaea");
    assert_eq!(resolved.species.len(), 2);
    assert_eq!(resolved.species[1].as_str(), "2190");
    assert_eq!(resolved.accessions[0].as_str(), "GCF_000005845.2");
    assert_eq!(resolved.outgroup, Outgroup::Local("isolate_7".parse().unwrap()));
    assert_eq!(resolved.sequence_type, SequenceType::Nucl);
    assert_eq!(resolved.name_type, NameScheme::TaxonId);
    assert_eq!(resolved.resolution, ResolutionPolicy::Tolerant);
    assert_eq!(resolved.min_genomes, 4);
    assert_eq!(resolved.threads, Some(8));
}

#[test]
fn outgroup_forms() {
    let resolve = |entry: Option<OutgroupEntry>| {
        let config = Config {
            species: vec![SpeciesEntry::Numeric(562)],
            outgroup: entry,
            ..Config::default()
        };
        ConfigLoader::resolve_config(config).unwrap().outgroup
    };
    assert_eq!(resolve(None), Outgroup::default_species());
    assert_eq!(resolve(Some(OutgroupEntry::Flag(true))), Outgroup::default_species());
    assert_eq!(resolve(Some(OutgroupEntry::Flag(false))), Outgroup::Disabled);
    assert_eq!(
        resolve(Some(OutgroupEntry::Numeric(2190))),
        Outgroup::Species("2190".parse().unwrap())
    );
    assert_eq!(
        resolve(Some(OutgroupEntry::Shorthand("none".to_string()))),
        Outgroup::Disabled
    );
}

#[test]
fn invalid_accession_is_rejected() {
    let config = Config {
        accessions: vec!["ABC_1".to_string()],
        ..Config::default()
    };
    let err = ConfigLoader::resolve_config(config).unwrap_err();
    assert_matches!(err, CurateError::InvalidGenomeAccession(_));
}

#[test]
fn unknown_name_type_fails_to_parse() {
    let err = serde_json::from_str::<Config>(r#"{"name_type": "genus"}"#).unwrap_err();
    assert!(err.to_string().contains("genus"));
}

#[test]
fn explicit_path_must_exist() {
    let temp = tempfile::tempdir().unwrap();
    let missing = temp.path().join("curate.json");
    let err = ConfigLoader::resolve(missing.to_str()).unwrap_err();
    assert_matches!(err, CurateError::ConfigRead(_));

    fs::write(&missing, "{ not json").unwrap();
    let err = ConfigLoader::resolve(missing.to_str()).unwrap_err();
    assert_matches!(err, CurateError::ConfigParse(_));

    fs::write(&missing, r#"{"species": [562]}"#).unwrap();
    let resolved = ConfigLoader::resolve(missing.to_str()).unwrap();
    assert!(resolved.has_requests());
}

#[test]
fn leaves_default_to_taxon_ids() {
    let config = Config {
        species: vec![SpeciesEntry::Numeric(562)],
        ..Config::default()
    };
    let resolved = ConfigLoader::resolve_config(config).unwrap();
    assert_eq!(resolved.name_type, NameScheme::TaxonId);
}
