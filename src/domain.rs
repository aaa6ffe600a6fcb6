use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::OnceLock;

use clap::ValueEnum;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::CurateError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum SequenceType {
    Prot,
    Nucl,
}

impl SequenceType {
    pub fn extension(&self) -> &'static str {
        match self {
            SequenceType::Prot => "faa",
            SequenceType::Nucl => "fna",
        }
    }
}

impl fmt::Display for SequenceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SequenceType::Prot => write!(f, "prot"),
            SequenceType::Nucl => write!(f, "nucl"),
        }
    }
}

impl FromStr for SequenceType {
    type Err = CurateError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "prot" => Ok(SequenceType::Prot),
            "nucl" => Ok(SequenceType::Nucl),
            other => Err(CurateError::InvalidSequenceType(other.to_string())),
        }
    }
}

/// How merged records are labelled; labels become tree leaf names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
pub enum NameScheme {
    #[serde(rename = "acc")]
    #[value(name = "acc")]
    Accession,
    #[serde(rename = "tx_id")]
    #[value(name = "tx_id")]
    TaxonId,
    #[serde(rename = "strain")]
    #[value(name = "strain")]
    Strain,
    #[serde(rename = "species")]
    #[value(name = "species")]
    Species,
}

impl fmt::Display for NameScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NameScheme::Accession => write!(f, "acc"),
            NameScheme::TaxonId => write!(f, "tx_id"),
            NameScheme::Strain => write!(f, "strain"),
            NameScheme::Species => write!(f, "species"),
        }
    }
}

impl FromStr for NameScheme {
    type Err = CurateError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "acc" => Ok(NameScheme::Accession),
            "tx_id" => Ok(NameScheme::TaxonId),
            "strain" => Ok(NameScheme::Strain),
            "species" => Ok(NameScheme::Species),
            other => Err(CurateError::InvalidNameScheme(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TaxonId(String);

impl TaxonId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaxonId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for TaxonId {
    type Err = CurateError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim();
        if normalized.is_empty() || !normalized.chars().all(|ch| ch.is_ascii_digit()) {
            return Err(CurateError::InvalidTaxonId(value.to_string()));
        }
        Ok(Self(normalized.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GenomeAccession(String);

impl GenomeAccession {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for GenomeAccession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

fn accession_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^GC[AF]_[0-9]+(\.[0-9]+)?$").expect("accession pattern compiles")
    })
}

impl FromStr for GenomeAccession {
    type Err = CurateError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim();
        if !accession_pattern().is_match(normalized) {
            return Err(CurateError::InvalidGenomeAccession(value.to_string()));
        }
        Ok(Self(normalized.to_string()))
    }
}

/// Identity of one genome through the whole run. For remote genomes this is the
/// assembly accession, for local genomes the shared base name of the file pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GenomeId(String);

impl GenomeId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for GenomeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for GenomeId {
    type Err = CurateError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim();
        if !is_file_safe(normalized) {
            return Err(CurateError::InvalidGenomeId(value.to_string()));
        }
        Ok(Self(normalized.to_string()))
    }
}

impl From<&GenomeAccession> for GenomeId {
    fn from(value: &GenomeAccession) -> Self {
        Self(value.as_str().to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MarkerId(String);

impl MarkerId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MarkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for MarkerId {
    type Err = CurateError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim();
        if !is_file_safe(normalized) {
            return Err(CurateError::InvalidMarkerId(value.to_string()));
        }
        Ok(Self(normalized.to_string()))
    }
}

// Ids end up in `{marker}__{genome}.{ext}` file names.
fn is_file_safe(value: &str) -> bool {
    !value.is_empty()
        && !value.starts_with('.')
        && !value.contains("__")
        && !value
            .chars()
            .any(|ch| ch == '/' || ch == '\\' || ch.is_whitespace())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GenomeDescriptor {
    Species(TaxonId),
    Accession(GenomeAccession),
    Local { name: GenomeId, dir: PathBuf },
}

impl GenomeDescriptor {
    pub fn label(&self) -> String {
        match self {
            GenomeDescriptor::Species(id) => format!("species:{id}"),
            GenomeDescriptor::Accession(acc) => format!("accession:{acc}"),
            GenomeDescriptor::Local { name, .. } => format!("local:{name}"),
        }
    }
}

/// Genome used to root the tree. Integers are species taxon ids fetched from NCBI,
/// anything else names a local genome, `none` disables outgroup rooting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outgroup {
    Disabled,
    Species(TaxonId),
    Local(GenomeId),
}

impl Outgroup {
    pub fn default_species() -> Self {
        Outgroup::Species(TaxonId("2173".to_string()))
    }
}

impl fmt::Display for Outgroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outgroup::Disabled => write!(f, "none"),
            Outgroup::Species(id) => write!(f, "{id}"),
            Outgroup::Local(name) => write!(f, "{name}"),
        }
    }
}

impl FromStr for Outgroup {
    type Err = CurateError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        if trimmed.is_empty()
            || trimmed.eq_ignore_ascii_case("none")
            || trimmed.eq_ignore_ascii_case("false")
        {
            return Ok(Outgroup::Disabled);
        }
        if trimmed.chars().all(|ch| ch.is_ascii_digit()) {
            return Ok(Outgroup::Species(trimmed.parse()?));
        }
        Ok(Outgroup::Local(trimmed.parse()?))
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn parse_genome_accession_valid() {
        let acc: GenomeAccession = " GCF_000005845.2 ".parse().unwrap();
        assert_eq!(acc.as_str(), "GCF_000005845.2");
    }

    #[test]
    fn parse_genome_accession_invalid() {
        let err = "ABC_123".parse::<GenomeAccession>().unwrap_err();
        assert_matches!(err, CurateError::InvalidGenomeAccession(_));
    }

    #[test]
    fn genome_ids_must_be_file_safe() {
        assert!("Ecoli_K12".parse::<GenomeId>().is_ok());
        assert_matches!(
            "a__b".parse::<GenomeId>(),
            Err(CurateError::InvalidGenomeId(_))
        );
        assert_matches!(
            "../x".parse::<GenomeId>(),
            Err(CurateError::InvalidGenomeId(_))
        );
    }

    #[test]
    fn outgroup_forms() {
        assert_eq!("none".parse::<Outgroup>().unwrap(), Outgroup::Disabled);
        assert_eq!("2173".parse::<Outgroup>().unwrap(), Outgroup::default_species());
        assert_matches!("Msmithii".parse::<Outgroup>(), Ok(Outgroup::Local(_)));
    }
}
