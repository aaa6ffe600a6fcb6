//! Index over an NCBI-style assembly summary table.
//!
//! The table's first line is free text, the second holds the column names with a
//! two-character comment prefix (`# `) on the first cell, every further line is one
//! assembly. Rows too short for the indexed columns are skipped.

use std::collections::{BTreeSet, HashMap};
use std::fs;
use std::path::Path;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::domain::{GenomeAccession, GenomeId, NameScheme, TaxonId};
use crate::error::CurateError;

pub const COMPLETE_GENOME: &str = "Complete Genome";

/// Row appended to a freshly fetched summary so the default outgroup
/// (Methanobrevibacter smithii, species 2173) always resolves.
pub const DEFAULT_OUTGROUP_ROW: &str = "GCF_000016525.1\tPRJNA224116\tSAMN02604313\t\trepresentative genome\t420247\t2173\tMethanobrevibacter smithii ATCC 35061\tstrain=ATCC 35061; PS; DSMZ 861\t\tlatest\tComplete Genome\tMajor\tFull\t2007/06/04\tASM1652v1\tWashington University Center for Genome Sciences\tGCA_000016525.1\tidentical\thttps://ftp.ncbi.nlm.nih.gov/genomes/all/GCF/000/016/525/GCF_000016525.1_ASM1652v1\t\tassembly from type material\tna";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AssemblyRecord {
    pub accession: GenomeAccession,
    pub species_taxid: TaxonId,
    pub refseq_category: String,
    pub assembly_level: String,
    pub ftp_path: String,
    pub organism_name: Option<String>,
    pub infraspecific_name: Option<String>,
    /// Zero-based position among the table's data rows.
    pub row: usize,
}

impl AssemblyRecord {
    pub fn genome_id(&self) -> GenomeId {
        GenomeId::from(&self.accession)
    }

    /// `na` is what NCBI writes; `unavailable` shows up in hand-built tables.
    pub fn has_refseq_category(&self) -> bool {
        let category = self.refseq_category.trim();
        !(category.is_empty()
            || category.eq_ignore_ascii_case("na")
            || category.eq_ignore_ascii_case("unavailable"))
    }

    pub fn is_complete_genome(&self) -> bool {
        self.assembly_level == COMPLETE_GENOME
    }

    /// Last path segment of the ftp path, the stem of every file in the directory.
    pub fn base_name(&self) -> Option<&str> {
        self.ftp_path
            .trim_end_matches('/')
            .rsplit('/')
            .next()
            .filter(|name| !name.is_empty())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ResolutionPolicy {
    /// Only assemblies with a RefSeq category.
    #[default]
    Strict,
    /// Strict first; if nothing qualifies, any complete genome.
    Tolerant,
}

/// Ordering key used to pick one assembly for a species. Lower wins; `None`
/// means the record is never eligible under `policy`.
///
/// Pass 0 holds records with a RefSeq category, pass 1 (tolerant only) complete
/// genomes without one. Within a pass the earlier table row wins.
pub fn selection_key(record: &AssemblyRecord, policy: ResolutionPolicy) -> Option<(u8, usize)> {
    if record.has_refseq_category() {
        return Some((0, record.row));
    }
    match policy {
        ResolutionPolicy::Tolerant if record.is_complete_genome() => Some((1, record.row)),
        _ => None,
    }
}

#[derive(Debug, Clone)]
pub struct AssemblyCatalog {
    records: Vec<AssemblyRecord>,
    by_accession: HashMap<GenomeAccession, usize>,
    by_species: HashMap<TaxonId, Vec<usize>>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SpeciesResolution {
    pub resolved: Vec<AssemblyRecord>,
    pub unresolved: Vec<TaxonId>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct AccessionResolution {
    pub resolved: Vec<AssemblyRecord>,
    pub unresolved: Vec<GenomeAccession>,
}

struct Columns {
    accession: usize,
    species: usize,
    refseq: usize,
    level: usize,
    ftp: usize,
    organism: Option<usize>,
    infraspecific: Option<usize>,
}

impl Columns {
    fn from_header(line: &str) -> Result<Self, CurateError> {
        let mut names: Vec<String> = line.split('\t').map(|cell| cell.trim().to_string()).collect();
        if let Some(first) = names.first_mut() {
            *first = first.chars().skip(2).collect();
        }
        let find = |name: &str| names.iter().position(|cell| cell == name);
        let require = |name: &str| {
            find(name).ok_or_else(|| CurateError::MalformedCatalog(format!("missing column {name}")))
        };
        Ok(Self {
            accession: require("assembly_accession")?,
            species: require("species_taxid")?,
            refseq: require("refseq_category")?,
            level: require("assembly_level")?,
            ftp: require("ftp_path")?,
            organism: find("organism_name"),
            infraspecific: find("infraspecific_name"),
        })
    }
}

impl AssemblyCatalog {
    pub fn load(path: &Path) -> Result<Self, CurateError> {
        if !path.exists() {
            return Err(CurateError::MissingCatalog(path.to_path_buf()));
        }
        let content = fs::read_to_string(path)
            .map_err(|err| CurateError::Filesystem(format!("read {}: {err}", path.display())))?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self, CurateError> {
        let mut lines = content.lines();
        lines
            .next()
            .ok_or_else(|| CurateError::MalformedCatalog("empty table".to_string()))?;
        let header = lines
            .next()
            .ok_or_else(|| CurateError::MalformedCatalog("missing header row".to_string()))?;
        let columns = Columns::from_header(header)?;

        let mut catalog = Self {
            records: Vec::new(),
            by_accession: HashMap::new(),
            by_species: HashMap::new(),
        };
        let mut skipped = 0usize;
        for (row, line) in lines.enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let fields: Vec<&str> = line.split('\t').collect();
            match parse_row(&fields, &columns, row) {
                Some(record) => catalog.insert(record),
                None => skipped += 1,
            }
        }
        if skipped > 0 {
            tracing::debug!("skipped {skipped} incomplete assembly summary rows");
        }
        Ok(catalog)
    }

    fn insert(&mut self, record: AssemblyRecord) {
        if self.by_accession.contains_key(&record.accession) {
            tracing::debug!("duplicate accession {} ignored", record.accession);
            return;
        }
        let index = self.records.len();
        self.by_accession.insert(record.accession.clone(), index);
        self.by_species
            .entry(record.species_taxid.clone())
            .or_default()
            .push(index);
        self.records.push(record);
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[AssemblyRecord] {
        &self.records
    }

    pub fn resolve_by_accession(&self, accession: &GenomeAccession) -> Option<&AssemblyRecord> {
        self.by_accession
            .get(accession)
            .map(|index| &self.records[*index])
    }

    pub fn resolve_by_species(
        &self,
        taxon: &TaxonId,
        policy: ResolutionPolicy,
    ) -> Option<&AssemblyRecord> {
        self.by_species.get(taxon).and_then(|indices| {
            indices
                .iter()
                .map(|index| &self.records[*index])
                .filter_map(|record| selection_key(record, policy).map(|key| (key, record)))
                .min_by_key(|(key, _)| *key)
                .map(|(_, record)| record)
        })
    }

    /// Resolves each distinct species once, keeping request order.
    pub fn resolve_species_batch(
        &self,
        taxa: &[TaxonId],
        policy: ResolutionPolicy,
    ) -> SpeciesResolution {
        let mut seen = BTreeSet::new();
        let mut resolution = SpeciesResolution::default();
        for taxon in taxa {
            if !seen.insert(taxon.clone()) {
                continue;
            }
            match self.resolve_by_species(taxon, policy) {
                Some(record) => resolution.resolved.push(record.clone()),
                None => resolution.unresolved.push(taxon.clone()),
            }
        }
        resolution
    }

    pub fn resolve_accessions(&self, accessions: &[GenomeAccession]) -> AccessionResolution {
        let mut seen = BTreeSet::new();
        let mut resolution = AccessionResolution::default();
        for accession in accessions {
            if !seen.insert(accession.clone()) {
                continue;
            }
            match self.resolve_by_accession(accession) {
                Some(record) => resolution.resolved.push(record.clone()),
                None => resolution.unresolved.push(accession.clone()),
            }
        }
        resolution
    }

    /// One representative per species, in table order.
    pub fn all_species(&self) -> Vec<AssemblyRecord> {
        let mut seen = BTreeSet::new();
        self.records
            .iter()
            .filter(|record| record.has_refseq_category())
            .filter(|record| seen.insert(record.species_taxid.clone()))
            .cloned()
            .collect()
    }

    /// Tree-leaf label for a genome. Genomes the catalog does not know, or whose
    /// requested field is empty, keep their own id.
    pub fn label_for(&self, genome: &GenomeId, scheme: NameScheme) -> String {
        let record = genome
            .as_str()
            .parse::<GenomeAccession>()
            .ok()
            .and_then(|accession| self.resolve_by_accession(&accession));
        let label = match (scheme, record) {
            (NameScheme::Accession, _) | (_, None) => None,
            (NameScheme::TaxonId, Some(record)) => Some(record.species_taxid.to_string()),
            (NameScheme::Strain, Some(record)) => record.infraspecific_name.clone(),
            (NameScheme::Species, Some(record)) => record.organism_name.clone(),
        };
        label
            .filter(|value| !value.trim().is_empty())
            .unwrap_or_else(|| genome.to_string())
    }
}

fn parse_row(fields: &[&str], columns: &Columns, row: usize) -> Option<AssemblyRecord> {
    let accession = fields.get(columns.accession)?.parse().ok()?;
    let species_taxid = fields.get(columns.species)?.parse().ok()?;
    let optional = |index: Option<usize>| {
        index
            .and_then(|index| fields.get(index))
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    };
    Some(AssemblyRecord {
        accession,
        species_taxid,
        refseq_category: fields.get(columns.refseq)?.trim().to_string(),
        assembly_level: fields.get(columns.level)?.trim().to_string(),
        ftp_path: fields.get(columns.ftp)?.trim().to_string(),
        organism_name: optional(columns.organism),
        infraspecific_name: optional(columns.infraspecific),
        row,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &str = "#   See ftp://ftp.ncbi.nlm.nih.gov/genomes/README_assembly_summary.txt\n# assembly_accession\tspecies_taxid\trefseq_category\tassembly_level\tftp_path\torganism_name\tinfraspecific_name\n";

    fn table(rows: &[&str]) -> String {
        let mut text = HEADER.to_string();
        for row in rows {
            text.push_str(row);
            text.push('\n');
        }
        text
    }

    #[test]
    fn first_header_cell_prefix_is_stripped() {
        let catalog = AssemblyCatalog::parse(&table(&[
            "GCF_000000001.1\t23\treference genome\tComplete Genome\tftp://x/GCF_000000001.1_A\tFoo bar\tstrain=K12",
        ]))
        .unwrap();
        let acc: GenomeAccession = "GCF_000000001.1".parse().unwrap();
        let record = catalog.resolve_by_accession(&acc).unwrap();
        assert_eq!(record.species_taxid.as_str(), "23");
        assert_eq!(record.base_name(), Some("GCF_000000001.1_A"));
    }

    #[test]
    fn short_rows_are_skipped() {
        let catalog = AssemblyCatalog::parse(&table(&[
            "GCF_000000001.1\t23",
            "GCF_000000002.1\t24\tna\tScaffold\tftp://x/GCF_000000002.1_B",
        ]))
        .unwrap();
        assert_eq!(catalog.len(), 1);
    }

    #[test]
    fn selection_key_orders_passes() {
        let catalog = AssemblyCatalog::parse(&table(&[
            "GCF_000000001.1\t23\tna\tComplete Genome\tftp://x/a",
            "GCF_000000002.1\t23\tna\tContig\tftp://x/b",
        ]))
        .unwrap();
        let records = catalog.records();
        assert_eq!(selection_key(&records[0], ResolutionPolicy::Strict), None);
        assert_eq!(
            selection_key(&records[0], ResolutionPolicy::Tolerant),
            Some((1, 0))
        );
        assert_eq!(selection_key(&records[1], ResolutionPolicy::Tolerant), None);
    }
}
