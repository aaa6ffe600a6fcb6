use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::sync::Mutex;

use camino::{Utf8Path, Utf8PathBuf};
use flate2::Compression;
use flate2::write::GzEncoder;

use marker_curator::acquire::{self, FileAction, GenomeAcquirer};
use marker_curator::app::{ProgressEvent, ProgressSink};
use marker_curator::catalog::{AssemblyCatalog, ResolutionPolicy};
use marker_curator::domain::{GenomeDescriptor, GenomeId, SequenceType};
use marker_curator::error::CurateError;
use marker_curator::ncbi::{self, ASSEMBLY_SUMMARY_URL, RemoteFetcher};
use marker_curator::store::Layout;

const NCBI_HEADER: &str = "#   See ftp://ftp.ncbi.nlm.nih.gov/genomes/README_assembly_summary.txt for a description of the columns\n# assembly_accession\tbioproject\tbiosample\twgs_master\trefseq_category\ttaxid\tspecies_taxid\torganism_name\tinfraspecific_name\tisolate\tversion_status\tassembly_level\trelease_type\tgenome_rep\tseq_rel_date\tasm_name\tsubmitter\tgbrs_paired_asm\tpaired_asm_comp\tftp_path\texcluded_from_refseq\trelation_to_type_material\tasm_not_live_date\n";

const FTP_ROOT: &str = "https://ftp.ncbi.nlm.nih.gov/genomes/all/GCF/000/000";

fn row(accession: &str, refseq_category: &str, species: &str, level: &str) -> String {
    format!(
        "{accession}\tPRJNA1\tSAMN1\t\t{refseq_category}\t{species}\t{species}\tOrganism {species}\tstrain=S{species}\t\tlatest\t{level}\tMajor\tFull\t2020/01/01\tASM1\tLab\tna\tna\t{FTP_ROOT}/{accession}_ASM1\t\t\tna\n"
    )
}

fn table(rows: &[String]) -> String {
    let mut text = NCBI_HEADER.to_string();
    for row in rows {
        text.push_str(row);
    }
    text
}

fn gzip(content: &[u8]) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(content).unwrap();
    encoder.finish().unwrap()
}

#[derive(Default)]
struct MockFetcher {
    files: HashMap<String, Vec<u8>>,
    calls: Mutex<usize>,
}

impl MockFetcher {
    fn with_file(mut self, url: &str, content: &str) -> Self {
        self.files.insert(url.to_string(), content.as_bytes().to_vec());
        self
    }

    fn with_genome(self, accession: &str) -> Self {
        let base = format!("{FTP_ROOT}/{accession}_ASM1/{accession}_ASM1");
        self.with_file(
            &format!("{base}{}", ncbi::PROTEIN_SUFFIX),
            &format!(">WP_{accession} protein\nMKV\n"),
        )
        .with_file(
            &format!("{base}{}", ncbi::CDS_SUFFIX),
            &format!(">lcl|{accession}_cds [protein_id=WP_{accession}]\nATGAAAGTT\n"),
        )
    }

    fn calls(&self) -> usize {
        *self.calls.lock().unwrap()
    }
}

impl RemoteFetcher for MockFetcher {
    fn fetch(&self, url: &str, destination_dir: &Utf8Path) -> Result<Utf8PathBuf, CurateError> {
        let mut guard = self.calls.lock().unwrap();
        *guard += 1;
        let content = self.files.get(url).ok_or_else(|| CurateError::NcbiStatus {
            status: 404,
            message: url.to_string(),
        })?;
        let name = ncbi::file_name(url).unwrap();
        let destination = destination_dir.join(name);
        let bytes = if name.ends_with(".gz") {
            gzip(content)
        } else {
            content.clone()
        };
        fs::write(destination.as_std_path(), bytes).unwrap();
        Ok(destination)
    }
}

struct NoopSink;

impl ProgressSink for NoopSink {
    fn event(&self, _event: ProgressEvent) {}
}

fn temp_layout() -> (tempfile::TempDir, Layout) {
    let temp = tempfile::tempdir().unwrap();
    let root = Utf8PathBuf::from_path_buf(temp.path().join("output")).unwrap();
    (temp, Layout::new(root))
}

#[test]
fn second_acquisition_performs_no_fetches() {
    let (_temp, layout) = temp_layout();
    let catalog = AssemblyCatalog::parse(&table(&[row(
        "GCF_000000001.1",
        "representative genome",
        "23",
        "Complete Genome",
    )]))
    .unwrap();
    let fetcher = MockFetcher::default().with_genome("GCF_000000001.1");
    let descriptors = vec![GenomeDescriptor::Species("23".parse().unwrap())];
    let resolution = acquire::resolve_descriptors(Some(&catalog), &descriptors, ResolutionPolicy::Strict);
    assert_eq!(resolution.genomes.len(), 1);

    let acquirer = GenomeAcquirer::new(&layout, &fetcher);
    let first = acquirer.acquire_all(&resolution.genomes, &NoopSink).unwrap();
    assert_eq!(first.materialized.len(), 1);
    assert_eq!(first.network_operations(), 2);
    assert_eq!(fetcher.calls(), 2);

    let genome: GenomeId = "GCF_000000001.1".parse().unwrap();
    let protein = fs::read_to_string(layout.genome_path(&genome, SequenceType::Prot).as_std_path()).unwrap();
    assert_eq!(protein, ">WP_GCF_000000001.1 protein\nMKV\n");
    assert!(layout.genome_metadata_path(&genome).as_std_path().is_file());

    let second = acquirer.acquire_all(&resolution.genomes, &NoopSink).unwrap();
    assert_eq!(second.materialized.len(), 1);
    assert_eq!(second.network_operations(), 0);
    assert_eq!(second.outcomes[0].protein, FileAction::Skipped);
    assert_eq!(second.outcomes[0].nucleotide, FileAction::Skipped);
    assert_eq!(fetcher.calls(), 2);
    let again = fs::read_to_string(layout.genome_path(&genome, SequenceType::Prot).as_std_path()).unwrap();
    assert_eq!(again, protein);
}

#[test]
fn failed_nucleotide_fetch_still_attempts_protein() {
    let (_temp, layout) = temp_layout();
    let catalog = AssemblyCatalog::parse(&table(&[row(
        "GCF_000000002.1",
        "reference genome",
        "42",
        "Complete Genome",
    )]))
    .unwrap();
    let base = format!("{FTP_ROOT}/GCF_000000002.1_ASM1/GCF_000000002.1_ASM1");
    let fetcher =
        MockFetcher::default().with_file(&format!("{base}{}", ncbi::PROTEIN_SUFFIX), ">WP_2\nMA\n");
    let descriptors = vec![GenomeDescriptor::Accession("GCF_000000002.1".parse().unwrap())];
    let resolution = acquire::resolve_descriptors(Some(&catalog), &descriptors, ResolutionPolicy::Strict);

    let report = GenomeAcquirer::new(&layout, &fetcher)
        .acquire_all(&resolution.genomes, &NoopSink)
        .unwrap();
    assert!(report.materialized.is_empty());
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.outcomes[0].protein, FileAction::Fetched);
    assert!(matches!(report.outcomes[0].nucleotide, FileAction::Failed(_)));
    assert_eq!(fetcher.calls(), 2);
}

#[test]
fn local_pairs_are_copied_and_sources_kept() {
    let (temp, layout) = temp_layout();
    let local = Utf8PathBuf::from_path_buf(temp.path().join("local")).unwrap();
    fs::create_dir_all(local.as_std_path()).unwrap();
    fs::write(local.join("isolate_a.faa").as_std_path(), ">p1\nMK\n").unwrap();
    fs::write(local.join("isolate_a.fna").as_std_path(), ">p1\nATG\n").unwrap();
    fs::write(local.join("isolate_b.faa").as_std_path(), ">p2\nMK\n").unwrap();

    let descriptors = acquire::discover_local(&local).unwrap();
    assert_eq!(descriptors.len(), 1);
    let resolution = acquire::resolve_descriptors(None, &descriptors, ResolutionPolicy::Strict);
    assert!(resolution.unresolved.is_empty());

    let fetcher = MockFetcher::default();
    let report = GenomeAcquirer::new(&layout, &fetcher)
        .acquire_all(&resolution.genomes, &NoopSink)
        .unwrap();
    assert_eq!(report.materialized.len(), 1);
    assert_eq!(report.outcomes[0].protein, FileAction::Copied);
    assert_eq!(fetcher.calls(), 0);
    assert!(local.join("isolate_a.faa").as_std_path().is_file());

    let genome: GenomeId = "isolate_a".parse().unwrap();
    assert!(layout.genome_path(&genome, SequenceType::Nucl).as_std_path().is_file());
}

#[test]
fn duplicate_requests_resolve_to_one_genome() {
    let catalog = AssemblyCatalog::parse(&table(&[row(
        "GCF_000000003.1",
        "representative genome",
        "99",
        "Complete Genome",
    )]))
    .unwrap();
    let descriptors = vec![
        GenomeDescriptor::Species("99".parse().unwrap()),
        GenomeDescriptor::Accession("GCF_000000003.1".parse().unwrap()),
        GenomeDescriptor::Species("12345".parse().unwrap()),
    ];
    let resolution = acquire::resolve_descriptors(Some(&catalog), &descriptors, ResolutionPolicy::Strict);
    assert_eq!(resolution.genomes.len(), 1);
    assert_eq!(resolution.unresolved, vec!["species:12345".to_string()]);
}

#[test]
fn missing_summary_is_fetched_once_with_default_outgroup() {
    let (_temp, layout) = temp_layout();
    let fetcher = MockFetcher::default().with_file(
        ASSEMBLY_SUMMARY_URL,
        &table(&[row("GCF_000000004.1", "representative genome", "23", "Complete Genome")]),
    );

    let catalog = acquire::ensure_catalog(&layout, &fetcher).unwrap();
    assert_eq!(catalog.len(), 2);
    let outgroup = catalog
        .resolve_by_species(&"2173".parse().unwrap(), ResolutionPolicy::Strict)
        .unwrap();
    assert_eq!(outgroup.accession.as_str(), "GCF_000016525.1");

    let reloaded = acquire::ensure_catalog(&layout, &fetcher).unwrap();
    assert_eq!(reloaded.len(), 2);
    assert_eq!(fetcher.calls(), 1);
}
