//! Turns genome requests into `{genome_id}.faa` / `{genome_id}.fna` pairs under the
//! genomes directory. The files themselves are the only state: a present, non-empty
//! target is never fetched or copied again.

use std::collections::BTreeSet;
use std::fs::OpenOptions;
use std::io::Write;

use camino::{Utf8Path, Utf8PathBuf};
use rayon::prelude::*;
use serde::Serialize;

use crate::app::{ProgressEvent, ProgressSink};
use crate::catalog::{AssemblyCatalog, AssemblyRecord, DEFAULT_OUTGROUP_ROW, ResolutionPolicy};
use crate::domain::{GenomeAccession, GenomeDescriptor, GenomeId, SequenceType, TaxonId};
use crate::error::CurateError;
use crate::fs_util;
use crate::ncbi::{self, ASSEMBLY_SUMMARY_URL, CDS_SUFFIX, PROTEIN_SUFFIX, RemoteFetcher};
use crate::store::{self, Layout, Metadata};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolvedGenome {
    Remote(AssemblyRecord),
    Local { name: GenomeId, dir: Utf8PathBuf },
}

impl ResolvedGenome {
    pub fn genome_id(&self) -> GenomeId {
        match self {
            ResolvedGenome::Remote(record) => record.genome_id(),
            ResolvedGenome::Local { name, .. } => name.clone(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Resolution {
    pub genomes: Vec<ResolvedGenome>,
    pub unresolved: Vec<String>,
}

/// Maps descriptors onto concrete genomes. Species are resolved with `policy`;
/// a genome requested twice is kept once, at its first position.
pub fn resolve_descriptors(
    catalog: Option<&AssemblyCatalog>,
    descriptors: &[GenomeDescriptor],
    policy: ResolutionPolicy,
) -> Resolution {
    let mut species: Vec<TaxonId> = Vec::new();
    let mut accessions: Vec<GenomeAccession> = Vec::new();
    for descriptor in descriptors {
        match descriptor {
            GenomeDescriptor::Species(taxon) => species.push(taxon.clone()),
            GenomeDescriptor::Accession(accession) => accessions.push(accession.clone()),
            GenomeDescriptor::Local { .. } => {}
        }
    }

    let mut resolution = Resolution::default();
    let mut remote = Vec::new();
    match catalog {
        Some(catalog) => {
            let by_species = catalog.resolve_species_batch(&species, policy);
            let by_accession = catalog.resolve_accessions(&accessions);
            remote.extend(by_species.resolved);
            remote.extend(by_accession.resolved);
            resolution.unresolved.extend(
                by_species
                    .unresolved
                    .into_iter()
                    .map(|taxon| format!("species:{taxon}")),
            );
            resolution.unresolved.extend(
                by_accession
                    .unresolved
                    .into_iter()
                    .map(|accession| format!("accession:{accession}")),
            );
        }
        None => {
            resolution.unresolved.extend(
                descriptors
                    .iter()
                    .filter(|descriptor| !matches!(descriptor, GenomeDescriptor::Local { .. }))
                    .map(GenomeDescriptor::label),
            );
        }
    }

    let mut seen = BTreeSet::new();
    for record in remote {
        if seen.insert(record.genome_id()) {
            resolution.genomes.push(ResolvedGenome::Remote(record));
        }
    }
    for descriptor in descriptors {
        if let GenomeDescriptor::Local { name, dir } = descriptor {
            let Ok(dir) = Utf8PathBuf::from_path_buf(dir.clone()) else {
                resolution.unresolved.push(descriptor.label());
                continue;
            };
            if seen.insert(name.clone()) {
                resolution.genomes.push(ResolvedGenome::Local {
                    name: name.clone(),
                    dir,
                });
            }
        }
    }
    resolution
}

/// Local genomes eligible for collection: both files present under one base name.
pub fn discover_local(dir: &Utf8Path) -> Result<Vec<GenomeDescriptor>, CurateError> {
    if !dir.as_std_path().is_dir() {
        tracing::warn!("path {dir} doesn't exist, skipping local genomes");
        return Ok(Vec::new());
    }
    let mut descriptors = Vec::new();
    for name in fs_util::paired_genome_names(dir)? {
        match name.parse::<GenomeId>() {
            Ok(genome) => descriptors.push(GenomeDescriptor::Local {
                name: genome,
                dir: dir.as_std_path().to_path_buf(),
            }),
            Err(err) => tracing::warn!("skipping local genome: {err}"),
        }
    }
    Ok(descriptors)
}

/// Loads the assembly summary, fetching it first when the output directory has none.
pub fn ensure_catalog<F: RemoteFetcher>(
    layout: &Layout,
    fetcher: &F,
) -> Result<AssemblyCatalog, CurateError> {
    let path = layout.assembly_summary_path();
    if !path.as_std_path().exists() {
        tracing::info!("assembly_summary.txt not found, fetching...");
        Layout::ensure_dir(layout.root())?;
        let fetched = fetcher.fetch(ASSEMBLY_SUMMARY_URL, layout.root())?;
        if fetched != path {
            std::fs::rename(fetched.as_std_path(), path.as_std_path())
                .map_err(|err| CurateError::Filesystem(err.to_string()))?;
        }
        append_default_outgroup(&path)?;
    }
    AssemblyCatalog::load(path.as_std_path())
}

fn append_default_outgroup(path: &Utf8Path) -> Result<(), CurateError> {
    let content = std::fs::read_to_string(path.as_std_path())
        .map_err(|err| CurateError::Filesystem(err.to_string()))?;
    let accession = DEFAULT_OUTGROUP_ROW.split('\t').next().unwrap_or_default();
    if content
        .lines()
        .any(|line| line.split('\t').next() == Some(accession))
    {
        return Ok(());
    }
    let mut file = OpenOptions::new()
        .append(true)
        .open(path.as_std_path())
        .map_err(|err| CurateError::Filesystem(err.to_string()))?;
    let separator = if content.ends_with('\n') || content.is_empty() {
        ""
    } else {
        "\n"
    };
    writeln!(file, "{separator}{DEFAULT_OUTGROUP_ROW}")
        .map_err(|err| CurateError::Filesystem(err.to_string()))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", content = "detail", rename_all = "lowercase")]
pub enum FileAction {
    Skipped,
    Fetched,
    Copied,
    Failed(String),
}

impl FileAction {
    pub fn is_ok(&self) -> bool {
        !matches!(self, FileAction::Failed(_))
    }

    fn did_work(&self) -> bool {
        matches!(self, FileAction::Fetched | FileAction::Copied)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MaterializedGenome {
    pub genome_id: GenomeId,
    pub protein_path: Utf8PathBuf,
    pub nucleotide_path: Utf8PathBuf,
}

#[derive(Debug, Clone, Serialize)]
pub struct AcquireOutcome {
    pub genome_id: GenomeId,
    pub protein: FileAction,
    pub nucleotide: FileAction,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct AcquisitionReport {
    pub materialized: Vec<MaterializedGenome>,
    pub failed: Vec<GenomeId>,
    pub unresolved: Vec<String>,
    pub outcomes: Vec<AcquireOutcome>,
}

impl AcquisitionReport {
    pub fn network_operations(&self) -> usize {
        self.outcomes
            .iter()
            .flat_map(|outcome| [&outcome.protein, &outcome.nucleotide])
            .filter(|action| matches!(action, FileAction::Fetched))
            .count()
    }
}

pub struct GenomeAcquirer<'a, F: RemoteFetcher> {
    layout: &'a Layout,
    fetcher: &'a F,
}

impl<'a, F: RemoteFetcher> GenomeAcquirer<'a, F> {
    pub fn new(layout: &'a Layout, fetcher: &'a F) -> Self {
        Self { layout, fetcher }
    }

    pub fn materialized(&self, genome: &GenomeId) -> Option<MaterializedGenome> {
        let protein_path = self.layout.genome_path(genome, SequenceType::Prot);
        let nucleotide_path = self.layout.genome_path(genome, SequenceType::Nucl);
        (store::is_materialized(&protein_path) && store::is_materialized(&nucleotide_path)).then(
            || MaterializedGenome {
                genome_id: genome.clone(),
                protein_path,
                nucleotide_path,
            },
        )
    }

    /// Never fails for a single genome; failures are reported per file.
    pub fn acquire(&self, genome: &ResolvedGenome) -> AcquireOutcome {
        let genome_id = genome.genome_id();
        let (protein, nucleotide) = match genome {
            ResolvedGenome::Remote(record) => (
                self.fetch_file(record, &genome_id, SequenceType::Prot, PROTEIN_SUFFIX),
                self.fetch_file(record, &genome_id, SequenceType::Nucl, CDS_SUFFIX),
            ),
            ResolvedGenome::Local { dir, .. } => (
                self.copy_file(dir, &genome_id, SequenceType::Prot),
                self.copy_file(dir, &genome_id, SequenceType::Nucl),
            ),
        };

        if protein.did_work() || nucleotide.did_work() {
            self.record_provenance(genome, &genome_id);
        }
        AcquireOutcome {
            genome_id,
            protein,
            nucleotide,
        }
    }

    pub fn acquire_all(
        &self,
        genomes: &[ResolvedGenome],
        sink: &dyn ProgressSink,
    ) -> Result<AcquisitionReport, CurateError> {
        self.layout.ensure_collect_dirs()?;
        let outcomes: Vec<AcquireOutcome> = genomes
            .par_iter()
            .map(|genome| {
                let outcome = self.acquire(genome);
                sink.event(ProgressEvent::message(format!(
                    "phase=Acquire; {} protein={:?} nucleotide={:?}",
                    outcome.genome_id, outcome.protein, outcome.nucleotide
                )));
                outcome
            })
            .collect();

        let mut report = AcquisitionReport::default();
        for outcome in &outcomes {
            match self.materialized(&outcome.genome_id) {
                Some(genome) if outcome.protein.is_ok() && outcome.nucleotide.is_ok() => {
                    report.materialized.push(genome)
                }
                _ => {
                    tracing::warn!("failed to acquire {}", outcome.genome_id);
                    report.failed.push(outcome.genome_id.clone());
                }
            }
        }
        report.outcomes = outcomes;
        Ok(report)
    }

    fn fetch_file(
        &self,
        record: &AssemblyRecord,
        genome_id: &GenomeId,
        seq_type: SequenceType,
        suffix: &str,
    ) -> FileAction {
        let target = self.layout.genome_path(genome_id, seq_type);
        if store::is_materialized(&target) {
            tracing::warn!("found {target}, skipping...");
            return FileAction::Skipped;
        }
        let Some(base_name) = record.base_name() else {
            return FileAction::Failed(format!("no ftp path for {genome_id}"));
        };
        let url = ncbi::assembly_file_url(&record.ftp_path, base_name, suffix);
        tracing::info!("downloading {seq_type} genome for {genome_id}");
        let result = self
            .fetcher
            .fetch(&url, &self.layout.genomes_dir())
            .and_then(|archive| fs_util::gunzip_to(&archive, &target));
        match result {
            Ok(()) => FileAction::Fetched,
            Err(err) => {
                tracing::error!("{genome_id}: {err}");
                FileAction::Failed(err.to_string())
            }
        }
    }

    fn copy_file(&self, dir: &Utf8Path, genome_id: &GenomeId, seq_type: SequenceType) -> FileAction {
        let target = self.layout.genome_path(genome_id, seq_type);
        if store::is_materialized(&target) {
            tracing::warn!("found {target}, skipping...");
            return FileAction::Skipped;
        }
        let source = dir.join(format!("{genome_id}.{}", seq_type.extension()));
        tracing::info!("copying {seq_type} genome for {genome_id}");
        match store::copy_file_atomic(&source, &target) {
            Ok(()) => FileAction::Copied,
            Err(err) => {
                tracing::error!("{genome_id}: {err}");
                FileAction::Failed(err.to_string())
            }
        }
    }

    fn record_provenance(&self, genome: &ResolvedGenome, genome_id: &GenomeId) {
        let (source, origin) = match genome {
            ResolvedGenome::Remote(record) => ("ncbi", record.ftp_path.clone()),
            ResolvedGenome::Local { dir, .. } => ("local", dir.to_string()),
        };
        let metadata = Metadata {
            source: source.to_string(),
            genome_id: genome_id.to_string(),
            origin,
            acquired_at: chrono::Utc::now().to_rfc3339(),
            tool: format!("marker-curator/{}", env!("CARGO_PKG_VERSION")),
        };
        if let Err(err) = store::write_metadata(&self.layout.genome_metadata_path(genome_id), &metadata)
        {
            tracing::warn!("could not record provenance for {genome_id}: {err}");
        }
    }
}
