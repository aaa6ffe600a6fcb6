use std::fs;
use std::path::PathBuf;

use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};

use crate::catalog::ResolutionPolicy;
use crate::domain::{GenomeAccession, NameScheme, Outgroup, SequenceType, TaxonId};
use crate::error::CurateError;

pub const DEFAULT_CONFIG_FILE: &str = "curate.json";
pub const DEFAULT_OUTPUT_DIR: &str = "output";

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub schema_version: Option<u32>,
    #[serde(default)]
    pub output: Option<String>,
    #[serde(default)]
    pub species: Vec<SpeciesEntry>,
    #[serde(default)]
    pub accessions: Vec<String>,
    #[serde(default)]
    pub local: Option<String>,
    #[serde(default)]
    pub all_species: bool,
    #[serde(default)]
    pub outgroup: Option<OutgroupEntry>,
    #[serde(default)]
    pub sequence_type: Option<SequenceType>,
    #[serde(default)]
    pub name_type: Option<NameScheme>,
    #[serde(default)]
    pub resolution: Option<ResolutionPolicy>,
    #[serde(default)]
    pub panel: Option<String>,
    #[serde(default)]
    pub min_genomes: Option<usize>,
    #[serde(default)]
    pub threads: Option<usize>,
}

/// Species ids may be written as JSON numbers or strings.
#[derive(Debug, Deserialize, Serialize)]
#[serde(untagged)]
pub enum SpeciesEntry {
    Numeric(u64),
    Shorthand(String),
}

/// `true` roots with the default outgroup, `false` disables rooting, numbers are
/// species ids and strings are parsed as [`Outgroup`].
#[derive(Debug, Deserialize, Serialize)]
#[serde(untagged)]
pub enum OutgroupEntry {
    Flag(bool),
    Numeric(u64),
    Shorthand(String),
}

#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub schema_version: u32,
    pub output: Utf8PathBuf,
    pub species: Vec<TaxonId>,
    pub accessions: Vec<GenomeAccession>,
    pub local: Option<Utf8PathBuf>,
    pub all_species: bool,
    pub outgroup: Outgroup,
    pub sequence_type: SequenceType,
    pub name_type: NameScheme,
    pub resolution: ResolutionPolicy,
    pub panel: Option<Utf8PathBuf>,
    pub min_genomes: usize,
    pub threads: Option<usize>,
}

impl ResolvedConfig {
    pub fn has_requests(&self) -> bool {
        !self.species.is_empty()
            || !self.accessions.is_empty()
            || self.local.is_some()
            || self.all_species
    }
}

impl Default for ResolvedConfig {
    fn default() -> Self {
        Self {
            schema_version: 1,
            output: Utf8PathBuf::from(DEFAULT_OUTPUT_DIR),
            species: Vec::new(),
            accessions: Vec::new(),
            local: None,
            all_species: false,
            outgroup: Outgroup::default_species(),
            sequence_type: SequenceType::Prot,
            name_type: NameScheme::TaxonId,
            resolution: ResolutionPolicy::Strict,
            panel: None,
            min_genomes: 1,
            threads: None,
        }
    }
}

pub struct ConfigLoader;

impl ConfigLoader {
    /// Reads `path`, or `curate.json` from the working directory when no path is given.
    pub fn resolve(path: Option<&str>) -> Result<ResolvedConfig, CurateError> {
        let config_path = match path {
            Some(path) => PathBuf::from(path),
            None => PathBuf::from(DEFAULT_CONFIG_FILE),
        };

        if path.is_none() && !config_path.exists() {
            return Err(CurateError::MissingConfig);
        }

        let content = fs::read_to_string(&config_path)
            .map_err(|_| CurateError::ConfigRead(config_path.clone()))?;
        let config: Config = serde_json::from_str(&content)
            .map_err(|err| CurateError::ConfigParse(err.to_string()))?;

        Self::resolve_config(config)
    }

    /// Like [`ConfigLoader::resolve`], but an absent default file yields the defaults.
    pub fn resolve_optional(path: Option<&str>) -> Result<ResolvedConfig, CurateError> {
        match Self::resolve(path) {
            Err(CurateError::MissingConfig) => Ok(ResolvedConfig::default()),
            other => other,
        }
    }

    pub fn resolve_config(config: Config) -> Result<ResolvedConfig, CurateError> {
        let defaults = ResolvedConfig::default();

        let species = config
            .species
            .into_iter()
            .map(|entry| match entry {
                SpeciesEntry::Numeric(value) => value.to_string().parse(),
                SpeciesEntry::Shorthand(value) => value.parse(),
            })
            .collect::<Result<Vec<TaxonId>, CurateError>>()?;

        let accessions = config
            .accessions
            .iter()
            .map(|value| value.parse())
            .collect::<Result<Vec<GenomeAccession>, CurateError>>()?;

        let outgroup = match config.outgroup {
            None | Some(OutgroupEntry::Flag(true)) => defaults.outgroup,
            Some(OutgroupEntry::Flag(false)) => Outgroup::Disabled,
            Some(OutgroupEntry::Numeric(value)) => Outgroup::Species(value.to_string().parse()?),
            Some(OutgroupEntry::Shorthand(value)) => value.parse()?,
        };

        Ok(ResolvedConfig {
            schema_version: config.schema_version.unwrap_or(defaults.schema_version),
            output: config.output.map(Utf8PathBuf::from).unwrap_or(defaults.output),
            species,
            accessions,
            local: config.local.map(Utf8PathBuf::from),
            all_species: config.all_species,
            outgroup,
            sequence_type: config.sequence_type.unwrap_or(defaults.sequence_type),
            name_type: config.name_type.unwrap_or(defaults.name_type),
            resolution: config.resolution.unwrap_or(defaults.resolution),
            panel: config.panel.map(Utf8PathBuf::from),
            min_genomes: config.min_genomes.unwrap_or(defaults.min_genomes).max(1),
            threads: config.threads.filter(|threads| *threads > 0),
        })
    }
}
