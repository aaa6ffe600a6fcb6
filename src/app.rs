use std::time::{Duration, Instant};

use camino::{Utf8Path, Utf8PathBuf};
use rayon::prelude::*;
use serde::Serialize;

use crate::acquire::{self, FileAction, GenomeAcquirer, MaterializedGenome, ResolvedGenome};
use crate::aggregate::{Aggregator, MarkerSummary};
use crate::catalog::AssemblyCatalog;
use crate::classify::{self, OrthologClassifier};
use crate::config::ResolvedConfig;
use crate::domain::{GenomeDescriptor, GenomeId, Outgroup, SequenceType};
use crate::error::CurateError;
use crate::extract::SequenceExtractor;
use crate::fs_util;
use crate::manifest::{ManifestWriter, OutgroupDesignation, RunManifest};
use crate::ncbi::RemoteFetcher;
use crate::scorer::{self, MarkerPanel, MarkerScorer};
use crate::store::{self, Layout};

/// Lists longer than this are truncated in `info` logs and printed in full at `debug`.
pub const PREVIEW_LIMIT: usize = 50;

#[derive(Debug, Clone, Copy, Default)]
pub struct CollectOptions {
    pub dry_run: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct CollectResult {
    pub dry_run: bool,
    pub planned: Vec<GenomeId>,
    pub materialized: Vec<GenomeId>,
    pub failed: Vec<GenomeId>,
    pub unresolved: Vec<String>,
    pub fetched: usize,
    pub skipped: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", content = "detail", rename_all = "lowercase")]
pub enum GenomeStatus {
    Extracted,
    Skipped,
    Failed(String),
}

#[derive(Debug, Clone, Serialize)]
pub struct GenomeReport {
    pub genome_id: GenomeId,
    pub status: GenomeStatus,
    pub assignments: usize,
    pub ambiguous: usize,
    pub missing: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExtractResult {
    pub genomes: Vec<GenomeReport>,
    pub markers: Vec<MarkerSummary>,
    pub below_threshold: Vec<String>,
    pub manifest: RunManifest,
}

impl ExtractResult {
    pub fn failed(&self) -> usize {
        self.genomes
            .iter()
            .filter(|genome| matches!(genome.status, GenomeStatus::Failed(_)))
            .count()
    }

    pub fn ambiguous(&self) -> usize {
        self.genomes.iter().map(|genome| genome.ambiguous).sum()
    }
}

#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub message: String,
    pub elapsed: Option<Duration>,
}

impl ProgressEvent {
    pub fn message(message: String) -> Self {
        Self {
            message,
            elapsed: None,
        }
    }

    pub fn timed(message: String, started: Instant) -> Self {
        Self {
            message,
            elapsed: Some(started.elapsed()),
        }
    }
}

/// Receives stage progress. Events may arrive from worker threads.
pub trait ProgressSink: Sync {
    fn event(&self, event: ProgressEvent);
}

#[derive(Clone)]
pub struct App<F: RemoteFetcher, S: MarkerScorer> {
    layout: Layout,
    fetcher: F,
    scorer: S,
}

impl<F: RemoteFetcher, S: MarkerScorer> App<F, S> {
    pub fn new(layout: Layout, fetcher: F, scorer: S) -> Self {
        Self {
            layout,
            fetcher,
            scorer,
        }
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    /// Resolves every request in `config` and materializes the genomes under
    /// `genomes/`. Per-genome failures are reported, not returned as errors.
    pub fn collect(
        &self,
        config: &ResolvedConfig,
        options: CollectOptions,
        sink: &dyn ProgressSink,
    ) -> Result<CollectResult, CurateError> {
        let started = Instant::now();
        sink.event(ProgressEvent::message(
            "phase=Resolve; reading genome requests".to_string(),
        ));

        let catalog = if needs_catalog(config) {
            Some(acquire::ensure_catalog(&self.layout, &self.fetcher)?)
        } else {
            None
        };
        let descriptors = build_descriptors(config, catalog.as_ref())?;
        let resolution = acquire::resolve_descriptors(catalog.as_ref(), &descriptors, config.resolution);
        for missing in &resolution.unresolved {
            tracing::warn!("could not resolve {missing}");
        }
        let planned: Vec<GenomeId> = resolution.genomes.iter().map(ResolvedGenome::genome_id).collect();

        if options.dry_run {
            log_preview(
                "genomes to collect",
                &planned.iter().map(GenomeId::to_string).collect::<Vec<_>>(),
            );
            return Ok(CollectResult {
                dry_run: true,
                planned,
                materialized: Vec::new(),
                failed: Vec::new(),
                unresolved: resolution.unresolved,
                fetched: 0,
                skipped: 0,
            });
        }

        let acquirer = GenomeAcquirer::new(&self.layout, &self.fetcher);
        let mut report = acquirer.acquire_all(&resolution.genomes, sink)?;
        report.unresolved = resolution.unresolved;

        let skipped = report
            .outcomes
            .iter()
            .filter(|outcome| outcome.protein == FileAction::Skipped && outcome.nucleotide == FileAction::Skipped)
            .count();
        sink.event(ProgressEvent::timed(
            format!(
                "phase=Acquire; {} materialized, {} failed",
                report.materialized.len(),
                report.failed.len()
            ),
            started,
        ));

        Ok(CollectResult {
            dry_run: false,
            planned,
            fetched: report.network_operations(),
            skipped,
            materialized: report
                .materialized
                .iter()
                .map(|genome| genome.genome_id.clone())
                .collect(),
            failed: report.failed,
            unresolved: report.unresolved,
        })
    }

    /// Classifies and extracts every materialized genome, then merges per marker and
    /// writes the manifest. Aggregation starts only after all genomes are done.
    pub fn extract(
        &self,
        config: &ResolvedConfig,
        panel: &MarkerPanel,
        sink: &dyn ProgressSink,
    ) -> Result<ExtractResult, CurateError> {
        let started = Instant::now();
        self.layout.ensure_extract_dirs(config.sequence_type)?;
        let genomes = self.materialized_genomes()?;
        sink.event(ProgressEvent::message(format!(
            "phase=Classify; {} genomes against {} markers",
            genomes.len(),
            panel.len()
        )));

        let classifier = OrthologClassifier::new(&self.scorer, panel);
        let extractor = SequenceExtractor::new(&self.layout);
        let reports: Vec<GenomeReport> = genomes
            .par_iter()
            .map(|genome| {
                let report = self.process_genome(genome, &classifier, &extractor, config);
                sink.event(ProgressEvent::message(format!(
                    "phase=Extract; {} {:?}",
                    report.genome_id, report.status
                )));
                report
            })
            .collect();

        let finished: Vec<GenomeId> = reports
            .iter()
            .filter(|report| !matches!(report.status, GenomeStatus::Failed(_)))
            .map(|report| report.genome_id.clone())
            .collect();

        let catalog = self.load_catalog_if_present()?;
        let aggregator = Aggregator::new(&self.layout, catalog.as_ref(), config.name_type)
            .with_min_genomes(config.min_genomes);
        let aggregate = aggregator.aggregate(&finished, config.sequence_type)?;
        sink.event(ProgressEvent::timed(
            format!("phase=Merge; {} markers", aggregate.written.len()),
            started,
        ));

        let outgroup_label = match resolve_outgroup(config, catalog.as_ref()) {
            Some(genome) if !finished.contains(&genome) => {
                tracing::warn!("outgroup {genome} is not among the processed genomes, rooting disabled");
                None
            }
            Some(genome) => aggregator
                .check_outgroup(&aggregate, &genome)
                .then(|| aggregator.label(&genome)),
            None => None,
        };
        let outgroup = OutgroupDesignation::from_label(outgroup_label);
        let manifest = ManifestWriter::new(&self.layout).write(outgroup, config.sequence_type)?;

        Ok(ExtractResult {
            genomes: reports,
            below_threshold: aggregate
                .below_threshold
                .iter()
                .map(ToString::to_string)
                .collect(),
            markers: aggregate.written,
            manifest,
        })
    }

    fn process_genome(
        &self,
        genome: &MaterializedGenome,
        classifier: &OrthologClassifier<'_, S>,
        extractor: &SequenceExtractor<'_>,
        config: &ResolvedConfig,
    ) -> GenomeReport {
        let mut report = GenomeReport {
            genome_id: genome.genome_id.clone(),
            status: GenomeStatus::Skipped,
            assignments: 0,
            ambiguous: 0,
            missing: 0,
        };

        if extractor.is_done(&genome.genome_id) {
            tracing::info!("found filtered sequences for {}, skipping...", genome.genome_id);
            if config.sequence_type == SequenceType::Nucl {
                match extractor.pair_from_filtered(genome) {
                    Ok(paired) => report.missing = paired.nucleotide_missing.len(),
                    Err(err) => report.status = GenomeStatus::Failed(err.to_string()),
                }
            }
            return report;
        }

        let result = classifier.classify(genome).and_then(|classification| {
            report.ambiguous = classification.ambiguous.len();
            let assignments = classify::one_per_marker(&classification.winners);
            report.assignments = assignments.len();
            extractor.extract_genome(genome, &assignments, config.sequence_type)
        });
        match result {
            Ok(extraction) => {
                report.missing = extraction.missing.len() + extraction.nucleotide_missing.len();
                report.status = GenomeStatus::Extracted;
            }
            Err(err) => {
                tracing::error!("{}: {err}", genome.genome_id);
                report.status = GenomeStatus::Failed(err.to_string());
            }
        }
        report
    }

    /// Genomes with both files present under `genomes/`, sorted by id.
    pub fn materialized_genomes(&self) -> Result<Vec<MaterializedGenome>, CurateError> {
        let acquirer = GenomeAcquirer::new(&self.layout, &self.fetcher);
        let dir = self.layout.genomes_dir();
        if !dir.as_std_path().is_dir() {
            return Ok(Vec::new());
        }
        let mut genomes = Vec::new();
        for name in fs_util::paired_genome_names(&dir)? {
            let Ok(genome) = name.parse::<GenomeId>() else {
                tracing::debug!("file {name} doesn't meet naming standards, skipping...");
                continue;
            };
            match acquirer.materialized(&genome) {
                Some(materialized) => genomes.push(materialized),
                None => tracing::warn!("{genome} has an empty genome file, skipping..."),
            }
        }
        Ok(genomes)
    }

    fn load_catalog_if_present(&self) -> Result<Option<AssemblyCatalog>, CurateError> {
        let path = self.layout.assembly_summary_path();
        if path.as_std_path().exists() {
            AssemblyCatalog::load(path.as_std_path()).map(Some)
        } else {
            Ok(None)
        }
    }
}

/// Loads the panel from `dir`, or fetches the default panel into the shared cache.
pub fn resolve_panel<F: RemoteFetcher>(
    fetcher: &F,
    dir: Option<&Utf8Path>,
) -> Result<MarkerPanel, CurateError> {
    match dir {
        Some(dir) => MarkerPanel::load(dir),
        None => {
            let dir: Utf8PathBuf = store::default_cache_root()?.join("panel");
            scorer::ensure_default_panel(fetcher, &dir)
        }
    }
}

fn needs_catalog(config: &ResolvedConfig) -> bool {
    !config.species.is_empty()
        || !config.accessions.is_empty()
        || config.all_species
        || matches!(config.outgroup, Outgroup::Species(_))
}

fn build_descriptors(
    config: &ResolvedConfig,
    catalog: Option<&AssemblyCatalog>,
) -> Result<Vec<GenomeDescriptor>, CurateError> {
    let mut descriptors: Vec<GenomeDescriptor> = config
        .species
        .iter()
        .cloned()
        .map(GenomeDescriptor::Species)
        .collect();
    if let Outgroup::Species(taxon) = &config.outgroup
        && !config.species.contains(taxon)
    {
        descriptors.push(GenomeDescriptor::Species(taxon.clone()));
    }
    descriptors.extend(config.accessions.iter().cloned().map(GenomeDescriptor::Accession));
    if config.all_species
        && let Some(catalog) = catalog
    {
        let representatives = catalog.all_species();
        tracing::info!("collecting {} species from the catalog", representatives.len());
        descriptors.extend(
            representatives
                .into_iter()
                .map(|record| GenomeDescriptor::Accession(record.accession)),
        );
    }

    if let Some(local) = &config.local {
        let found = acquire::discover_local(local)?;
        if let Outgroup::Local(name) = &config.outgroup {
            let present = found
                .iter()
                .any(|descriptor| matches!(descriptor, GenomeDescriptor::Local { name: local_name, .. } if local_name == name));
            if !present {
                tracing::warn!("outgroup {name} not found in {local}");
            }
        }
        descriptors.extend(found);
    } else if let Outgroup::Local(name) = &config.outgroup {
        tracing::warn!("outgroup {name} is a local genome name but no local directory is set");
    }
    Ok(descriptors)
}

fn resolve_outgroup(config: &ResolvedConfig, catalog: Option<&AssemblyCatalog>) -> Option<GenomeId> {
    match &config.outgroup {
        Outgroup::Disabled => None,
        Outgroup::Local(name) => Some(name.clone()),
        Outgroup::Species(taxon) => {
            let resolved = catalog
                .and_then(|catalog| catalog.resolve_by_species(taxon, config.resolution))
                .map(|record| record.genome_id());
            if resolved.is_none() {
                tracing::warn!("outgroup species {taxon} did not resolve to a genome, rooting disabled");
            }
            resolved
        }
    }
}

/// Logs `items` under `label`, truncated at `info` level.
pub fn log_preview(label: &str, items: &[String]) {
    tracing::info!("{label} ({}):", items.len());
    if items.len() > PREVIEW_LIMIT {
        tracing::info!("{}, ...", items[..PREVIEW_LIMIT].join(", "));
        tracing::debug!("{}", items.join(", "));
    } else {
        tracing::info!("{}", items.join(", "));
    }
}
