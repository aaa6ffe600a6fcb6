use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum CurateError {
    #[error("invalid genome accession: {0}")]
    InvalidGenomeAccession(String),

    #[error("invalid species taxon id: {0}")]
    InvalidTaxonId(String),

    #[error("invalid genome id: {0}")]
    InvalidGenomeId(String),

    #[error("invalid marker id: {0}")]
    InvalidMarkerId(String),

    #[error("invalid name scheme: {0} (expected acc|tx_id|strain|species)")]
    InvalidNameScheme(String),

    #[error("invalid sequence type: {0} (expected prot|nucl)")]
    InvalidSequenceType(String),

    #[error("missing config file curate.json in current directory")]
    MissingConfig,

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("assembly metadata table not found at {0}")]
    MissingCatalog(PathBuf),

    #[error("malformed assembly metadata table: {0}")]
    MalformedCatalog(String),

    #[error("malformed marker panel: {0}")]
    MalformedPanel(String),

    #[error("NCBI request failed: {0}")]
    NcbiHttp(String),

    #[error("NCBI returned status {status}: {message}")]
    NcbiStatus { status: u16, message: String },

    #[error("required tool not found: {0}")]
    MissingTool(String),

    #[error("scorer failed: {0}")]
    Scorer(String),

    #[error("malformed scorer output: {0}")]
    ScorerOutput(String),

    #[error("genome {genome} contributed more than one record to marker {marker}")]
    DuplicateGenome { marker: String, genome: String },

    #[error("output directory is not writable: {0}")]
    UnwritableOutput(PathBuf),

    #[error("failed to write manifest: {0}")]
    Manifest(String),

    #[error("filesystem error: {0}")]
    Filesystem(String),
}
