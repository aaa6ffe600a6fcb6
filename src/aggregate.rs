//! Cross-genome merge: one `{marker}.fasta` per marker holding one relabelled
//! record per genome. Runs only after every per-genome stage has finished.

use std::collections::{BTreeMap, BTreeSet};

use rayon::prelude::*;
use serde::Serialize;

use crate::catalog::AssemblyCatalog;
use crate::domain::{GenomeId, MarkerId, NameScheme, SequenceType};
use crate::error::CurateError;
use crate::extract::FilteredIndex;
use crate::fasta::{self, SequenceRecord};
use crate::store::{self, Layout};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MergedRecord {
    pub genome_id: GenomeId,
    pub record: SequenceRecord,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MergedMarkerFile {
    pub marker_id: MarkerId,
    pub records: Vec<MergedRecord>,
}

impl MergedMarkerFile {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.records.iter().map(|entry| entry.record.header.as_str())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MarkerSummary {
    pub marker_id: MarkerId,
    pub genomes: usize,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct AggregateReport {
    pub cleared: usize,
    pub written: Vec<MarkerSummary>,
    pub below_threshold: Vec<MarkerId>,
    pub labels: BTreeSet<String>,
}

impl AggregateReport {
    pub fn markers(&self) -> Vec<MarkerId> {
        self.written.iter().map(|summary| summary.marker_id.clone()).collect()
    }
}

pub struct Aggregator<'a> {
    layout: &'a Layout,
    catalog: Option<&'a AssemblyCatalog>,
    scheme: NameScheme,
    min_genomes: usize,
}

impl<'a> Aggregator<'a> {
    pub fn new(layout: &'a Layout, catalog: Option<&'a AssemblyCatalog>, scheme: NameScheme) -> Self {
        Self {
            layout,
            catalog,
            scheme,
            min_genomes: 1,
        }
    }

    pub fn with_min_genomes(mut self, min_genomes: usize) -> Self {
        self.min_genomes = min_genomes.max(1);
        self
    }

    /// Tree-leaf label for a genome under the configured scheme.
    pub fn label(&self, genome: &GenomeId) -> String {
        match self.catalog {
            Some(catalog) => catalog.label_for(genome, self.scheme),
            None => genome.to_string(),
        }
    }

    /// Builds the merged file for one marker from records in caller order.
    /// A genome appearing twice is an upstream bug and fails the marker.
    pub fn merge<I>(&self, marker: &MarkerId, per_genome_records: I) -> Result<MergedMarkerFile, CurateError>
    where
        I: IntoIterator<Item = (GenomeId, SequenceRecord)>,
    {
        let mut seen = BTreeSet::new();
        let mut records = Vec::new();
        for (genome_id, record) in per_genome_records {
            if !seen.insert(genome_id.clone()) {
                return Err(CurateError::DuplicateGenome {
                    marker: marker.to_string(),
                    genome: genome_id.to_string(),
                });
            }
            let record = record.renamed(self.label(&genome_id));
            records.push(MergedRecord { genome_id, record });
        }
        Ok(MergedMarkerFile {
            marker_id: marker.clone(),
            records,
        })
    }

    /// Clears the merged directory, then writes one file per marker found in the
    /// filtered outputs of `genomes`. Each marker file is written by a single task.
    pub fn aggregate(
        &self,
        genomes: &[GenomeId],
        seq_type: SequenceType,
    ) -> Result<AggregateReport, CurateError> {
        Layout::ensure_dir(&self.layout.merged_dir())?;
        let cleared = store::clear_dir(&self.layout.merged_dir())?;
        if cleared > 0 {
            tracing::info!("cleared {cleared} stale merged files");
        }

        let index = FilteredIndex::scan(self.layout, seq_type)?;
        let mut by_marker: BTreeMap<&MarkerId, Vec<&GenomeId>> = BTreeMap::new();
        for genome in genomes {
            for (marker, _) in index.for_genome(genome) {
                by_marker.entry(marker).or_default().push(genome);
            }
        }

        let merged: Vec<Result<MergedMarkerFile, CurateError>> = by_marker
            .into_par_iter()
            .map(|(marker, contributors)| {
                let mut records = Vec::with_capacity(contributors.len());
                for genome in contributors {
                    let Some(path) = index.path(genome, marker) else {
                        continue;
                    };
                    match fasta::read_records(path)?.into_iter().next() {
                        Some(record) => records.push((genome.clone(), record)),
                        None => tracing::debug!("{path} is empty, skipping..."),
                    }
                }
                let merged = self.merge(marker, records)?;
                if merged.len() >= self.min_genomes {
                    let bytes = fasta::to_bytes(merged.records.iter().map(|entry| &entry.record))?;
                    store::write_bytes_atomic(&self.layout.merged_path(marker), &bytes)?;
                }
                Ok(merged)
            })
            .collect();

        let mut report = AggregateReport {
            cleared,
            ..AggregateReport::default()
        };
        for merged in merged {
            let merged = merged?;
            if merged.len() < self.min_genomes {
                tracing::debug!(
                    "{} has {} genomes, below minimum of {}",
                    merged.marker_id,
                    merged.len(),
                    self.min_genomes
                );
                report.below_threshold.push(merged.marker_id);
                continue;
            }
            report
                .labels
                .extend(merged.labels().map(str::to_string));
            report.written.push(MarkerSummary {
                genomes: merged.len(),
                marker_id: merged.marker_id,
            });
        }
        tracing::info!("merged {} markers", report.written.len());
        Ok(report)
    }

    /// Warns when the outgroup genome contributed to no merged file.
    pub fn check_outgroup(&self, report: &AggregateReport, outgroup: &GenomeId) -> bool {
        let label = self.label(outgroup);
        if report.labels.contains(&label) {
            return true;
        }
        if label != outgroup.as_str() && report.labels.contains(outgroup.as_str()) {
            tracing::warn!("outgroup {outgroup} not found among merged labels, did you mean {label}?");
        } else {
            tracing::warn!("outgroup {label} not found among merged labels, tree rooting may fail");
        }
        false
    }
}
