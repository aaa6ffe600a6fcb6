use std::fs;

use camino::Utf8PathBuf;

use marker_curator::aggregate::Aggregator;
use marker_curator::catalog::AssemblyCatalog;
use marker_curator::domain::{GenomeId, MarkerId, NameScheme, SequenceType};
use marker_curator::fasta;
use marker_curator::store::{self, Layout};

fn layout() -> (tempfile::TempDir, Layout) {
    let temp = tempfile::tempdir().unwrap();
    let root = Utf8PathBuf::from_path_buf(temp.path().join("output")).unwrap();
    (temp, Layout::new(root))
}

fn write_filtered(layout: &Layout, marker: &str, genome: &str, sequence: &str) {
    let marker: MarkerId = marker.parse().unwrap();
    let genome: GenomeId = genome.parse().unwrap();
    let path = layout.filtered_path(&marker, &genome, SequenceType::Prot);
    fs::create_dir_all(path.parent().unwrap().as_std_path()).unwrap();
    fs::write(path.as_std_path(), format!(">WP_{genome} annotated\n{sequence}\n")).unwrap();
}

fn ids(values: &[&str]) -> Vec<GenomeId> {
    values.iter().map(|value| value.parse().unwrap()).collect()
}

fn merged_headers(layout: &Layout, marker: &str) -> Vec<String> {
    let marker: MarkerId = marker.parse().unwrap();
    fasta::read_records(&layout.merged_path(&marker))
        .unwrap()
        .into_iter()
        .map(|record| record.header)
        .collect()
}

#[test]
fn second_merge_leaves_no_residue_from_first() {
    let (_temp, layout) = layout();
    let aggregator = Aggregator::new(&layout, None, NameScheme::Accession);

    write_filtered(&layout, "M1", "G1", "MKV");
    write_filtered(&layout, "M1", "G2", "MKA");
    write_filtered(&layout, "M2", "G1", "MST");
    let first = aggregator
        .aggregate(&ids(&["G1", "G2"]), SequenceType::Prot)
        .unwrap();
    assert_eq!(first.written.len(), 2);

    store::clear_dir(&layout.filtered_dir(SequenceType::Prot)).unwrap();
    write_filtered(&layout, "M2", "G3", "MQQ");
    let second = aggregator
        .aggregate(&ids(&["G3"]), SequenceType::Prot)
        .unwrap();

    assert_eq!(second.cleared, 2);
    assert_eq!(second.markers(), vec!["M2".parse::<MarkerId>().unwrap()]);
    assert!(!layout.merged_path(&"M1".parse().unwrap()).as_std_path().exists());
    assert_eq!(merged_headers(&layout, "M2"), vec!["G3".to_string()]);
}

#[test]
fn genomes_follow_supplied_order() {
    let (_temp, layout) = layout();
    let aggregator = Aggregator::new(&layout, None, NameScheme::Accession);
    write_filtered(&layout, "M1", "G1", "MKV");
    write_filtered(&layout, "M1", "G2", "MKA");

    aggregator
        .aggregate(&ids(&["G2", "G1"]), SequenceType::Prot)
        .unwrap();
    assert_eq!(merged_headers(&layout, "M1"), vec!["G2", "G1"]);

    aggregator
        .aggregate(&ids(&["G1", "G2"]), SequenceType::Prot)
        .unwrap();
    assert_eq!(merged_headers(&layout, "M1"), vec!["G1", "G2"]);
}

#[test]
fn genomes_outside_the_run_are_ignored() {
    let (_temp, layout) = layout();
    let aggregator = Aggregator::new(&layout, None, NameScheme::Accession);
    write_filtered(&layout, "M1", "G1", "MKV");
    write_filtered(&layout, "M1", "G9", "MKA");

    let report = aggregator
        .aggregate(&ids(&["G1"]), SequenceType::Prot)
        .unwrap();
    assert_eq!(report.written[0].genomes, 1);
    assert_eq!(merged_headers(&layout, "M1"), vec!["G1"]);
}

#[test]
fn headers_use_catalog_labels() {
    let (_temp, layout) = layout();
    let catalog = AssemblyCatalog::parse(
        "# comment\n# assembly_accession\tspecies_taxid\trefseq_category\tassembly_level\tftp_path\n\
         GCF_000005845.2\t562\treference genome\tComplete Genome\tftp://x/a\n",
    )
    .unwrap();
    let aggregator = Aggregator::new(&layout, Some(&catalog), NameScheme::TaxonId);
    write_filtered(&layout, "M1", "GCF_000005845.2", "MKV");
    write_filtered(&layout, "M1", "isolate_1", "MKA");

    let report = aggregator
        .aggregate(&ids(&["GCF_000005845.2", "isolate_1"]), SequenceType::Prot)
        .unwrap();
    assert_eq!(merged_headers(&layout, "M1"), vec!["562", "isolate_1"]);

    assert!(aggregator.check_outgroup(&report, &"GCF_000005845.2".parse().unwrap()));
    assert!(!aggregator.check_outgroup(&report, &"isolate_2".parse().unwrap()));
}
