//! Pulls winning records out of genome files into `{marker}__{genome}.{ext}` files.
//!
//! A `.done_{genome}` marker is written once every assignment of a genome has been
//! extracted; genomes carrying it are not classified again. Outputs of a genome
//! without the marker are partial and are cleared before re-extraction.

use std::collections::BTreeMap;
use std::fs;

use camino::{Utf8Path, Utf8PathBuf};
use serde::Serialize;

use crate::acquire::MaterializedGenome;
use crate::classify::WinningAssignment;
use crate::domain::{GenomeId, MarkerId, SequenceType};
use crate::error::CurateError;
use crate::fasta::{self, HeaderMatcher, SequenceRecord, SubstringMatcher};
use crate::fs_util;
use crate::store::{self, Layout};

#[derive(Debug, Clone, Default, Serialize)]
pub struct GenomeExtraction {
    pub genome_id: Option<GenomeId>,
    pub extracted: Vec<MarkerId>,
    pub missing: Vec<MarkerId>,
    pub nucleotide_missing: Vec<MarkerId>,
}

pub struct SequenceExtractor<'a> {
    layout: &'a Layout,
    matcher: Box<dyn HeaderMatcher>,
}

impl<'a> SequenceExtractor<'a> {
    pub fn new(layout: &'a Layout) -> Self {
        Self::with_matcher(layout, Box::new(SubstringMatcher))
    }

    pub fn with_matcher(layout: &'a Layout, matcher: Box<dyn HeaderMatcher>) -> Self {
        Self { layout, matcher }
    }

    /// First protein record matching `query_id`, optionally relabelled.
    pub fn extract(
        &self,
        protein_file: &Utf8Path,
        query_id: &str,
        rename_to: Option<&str>,
    ) -> Result<Option<SequenceRecord>, CurateError> {
        self.find(protein_file, query_id, rename_to)
    }

    /// Nucleotide record for the same feature. CDS headers embed the protein id,
    /// so the protein query id locates it.
    pub fn extract_paired_nucleotide(
        &self,
        nucleotide_file: &Utf8Path,
        query_id: &str,
        rename_to: Option<&str>,
    ) -> Result<Option<SequenceRecord>, CurateError> {
        self.find(nucleotide_file, query_id, rename_to)
    }

    fn find(
        &self,
        path: &Utf8Path,
        query_id: &str,
        rename_to: Option<&str>,
    ) -> Result<Option<SequenceRecord>, CurateError> {
        let found = fasta::find_first(path, query_id, self.matcher.as_ref())?;
        Ok(match (found, rename_to) {
            (Some(record), Some(label)) => Some(record.renamed(label)),
            (found, _) => found,
        })
    }

    pub fn is_done(&self, genome: &GenomeId) -> bool {
        self.layout.done_marker_path(genome).as_std_path().exists()
    }

    /// Writes one filtered file per assignment. `assignments` must already hold at
    /// most one entry per marker.
    pub fn extract_genome(
        &self,
        genome: &MaterializedGenome,
        assignments: &[WinningAssignment],
        seq_type: SequenceType,
    ) -> Result<GenomeExtraction, CurateError> {
        if !self.is_done(&genome.genome_id) {
            let removed = self.clear_genome_outputs(&genome.genome_id)?;
            if removed > 0 {
                tracing::warn!(
                    "found partial filter files for {}, overwriting...",
                    genome.genome_id
                );
            }
        }

        let mut report = GenomeExtraction {
            genome_id: Some(genome.genome_id.clone()),
            ..GenomeExtraction::default()
        };
        for assignment in assignments {
            let marker = &assignment.marker_id;
            let Some(record) = self.extract(&genome.protein_path, &assignment.query_id, None)? else {
                tracing::warn!(
                    "{}: no record for {} ({marker})",
                    genome.genome_id,
                    assignment.query_id
                );
                report.missing.push(marker.clone());
                continue;
            };
            let path = self
                .layout
                .filtered_path(marker, &genome.genome_id, SequenceType::Prot);
            store::write_bytes_atomic(&path, &fasta::to_bytes([&record])?)?;
            report.extracted.push(marker.clone());

            if seq_type == SequenceType::Nucl
                && !self.write_nucleotide(genome, marker, &assignment.query_id)?
            {
                report.nucleotide_missing.push(marker.clone());
            }
        }

        store::write_bytes_atomic(&self.layout.done_marker_path(&genome.genome_id), b"")?;
        Ok(report)
    }

    /// Fills in nucleotide files for a genome extracted in an earlier run, taking the
    /// query id from the first header token of each filtered protein file.
    pub fn pair_from_filtered(
        &self,
        genome: &MaterializedGenome,
    ) -> Result<GenomeExtraction, CurateError> {
        let mut report = GenomeExtraction {
            genome_id: Some(genome.genome_id.clone()),
            ..GenomeExtraction::default()
        };
        let index = FilteredIndex::scan(self.layout, SequenceType::Prot)?;
        for (marker, path) in index.for_genome(&genome.genome_id) {
            let nucl_path = self
                .layout
                .filtered_path(marker, &genome.genome_id, SequenceType::Nucl);
            if store::is_materialized(&nucl_path) {
                continue;
            }
            let Some(header) = fasta::first_header(path)? else {
                continue;
            };
            let query_id = header.split_whitespace().next().unwrap_or_default();
            if self.write_nucleotide(genome, marker, query_id)? {
                report.extracted.push(marker.clone());
            } else {
                report.nucleotide_missing.push(marker.clone());
            }
        }
        Ok(report)
    }

    fn write_nucleotide(
        &self,
        genome: &MaterializedGenome,
        marker: &MarkerId,
        query_id: &str,
    ) -> Result<bool, CurateError> {
        match self.extract_paired_nucleotide(&genome.nucleotide_path, query_id, None)? {
            Some(record) => {
                let path = self
                    .layout
                    .filtered_path(marker, &genome.genome_id, SequenceType::Nucl);
                store::write_bytes_atomic(&path, &fasta::to_bytes([&record])?)?;
                Ok(true)
            }
            None => {
                tracing::warn!(
                    "{}: no nucleotide record for {query_id} ({marker})",
                    genome.genome_id
                );
                Ok(false)
            }
        }
    }

    fn clear_genome_outputs(&self, genome: &GenomeId) -> Result<usize, CurateError> {
        let mut removed = 0;
        for seq_type in [SequenceType::Prot, SequenceType::Nucl] {
            let index = FilteredIndex::scan(self.layout, seq_type)?;
            for (_, path) in index.for_genome(genome) {
                fs::remove_file(path.as_std_path())
                    .map_err(|err| CurateError::Filesystem(err.to_string()))?;
                removed += 1;
            }
        }
        Ok(removed)
    }
}

/// Filtered files of one sequence type, keyed by genome then marker.
#[derive(Debug, Default)]
pub struct FilteredIndex {
    entries: BTreeMap<GenomeId, BTreeMap<MarkerId, Utf8PathBuf>>,
}

impl FilteredIndex {
    pub fn scan(layout: &Layout, seq_type: SequenceType) -> Result<Self, CurateError> {
        let mut index = Self::default();
        for path in fs_util::list_with_extension(&layout.filtered_dir(seq_type), seq_type.extension())? {
            let Some((marker, genome)) = path.file_stem().and_then(split_filtered_name) else {
                tracing::debug!("file {path} doesn't meet naming standards, skipping...");
                continue;
            };
            index
                .entries
                .entry(genome)
                .or_default()
                .insert(marker, path);
        }
        Ok(index)
    }

    pub fn for_genome(&self, genome: &GenomeId) -> impl Iterator<Item = (&MarkerId, &Utf8PathBuf)> {
        self.entries.get(genome).into_iter().flat_map(|markers| markers.iter())
    }

    pub fn path(&self, genome: &GenomeId, marker: &MarkerId) -> Option<&Utf8PathBuf> {
        self.entries.get(genome).and_then(|markers| markers.get(marker))
    }
}

fn split_filtered_name(stem: &str) -> Option<(MarkerId, GenomeId)> {
    let (marker, genome) = stem.split_once("__")?;
    Some((marker.parse().ok()?, genome.parse().ok()?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filtered_names_split_on_double_underscore() {
        let (marker, genome) = split_filtered_name("COG0012__GCF_000005845.2").unwrap();
        assert_eq!(marker.as_str(), "COG0012");
        assert_eq!(genome.as_str(), "GCF_000005845.2");
        assert!(split_filtered_name("no-separator").is_none());
    }
}
