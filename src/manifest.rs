use std::fmt;

use camino::Utf8Path;
use serde::{Deserialize, Serialize};

use crate::domain::{MarkerId, SequenceType};
use crate::error::CurateError;
use crate::fs_util;
use crate::store::{self, Layout};

pub const TREE_ALGORITHM: &str = "supermat";

const HEADER: &str = "# Config file for tree building pipeline\n";

/// `false` when rooting is off or the outgroup did not resolve, its label otherwise.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OutgroupDesignation {
    Flag(bool),
    Label(String),
}

impl OutgroupDesignation {
    pub fn from_label(label: Option<String>) -> Self {
        match label {
            Some(label) => OutgroupDesignation::Label(label),
            None => OutgroupDesignation::Flag(false),
        }
    }
}

impl fmt::Display for OutgroupDesignation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutgroupDesignation::Flag(flag) => write!(f, "{flag}"),
            OutgroupDesignation::Label(label) => write!(f, "{label}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunManifest {
    #[serde(rename = "GENES")]
    pub genes: Vec<MarkerId>,
    #[serde(rename = "OUTGROUP")]
    pub outgroup: OutgroupDesignation,
    #[serde(rename = "TYPE")]
    pub seq_type: SequenceType,
    #[serde(rename = "ALG")]
    pub algorithm: String,
    #[serde(rename = "DATA")]
    pub data: String,
}

pub struct ManifestWriter<'a> {
    layout: &'a Layout,
}

impl<'a> ManifestWriter<'a> {
    pub fn new(layout: &'a Layout) -> Self {
        Self { layout }
    }

    /// Markers with a non-empty merged file, sorted.
    pub fn produced_markers(&self) -> Result<Vec<MarkerId>, CurateError> {
        let mut markers: Vec<MarkerId> = Vec::new();
        for path in fs_util::list_with_extension(&self.layout.merged_dir(), "fasta")? {
            if !store::is_materialized(&path) {
                continue;
            }
            if let Some(marker) = path.file_stem().and_then(|stem| stem.parse().ok()) {
                markers.push(marker);
            }
        }
        markers.sort();
        Ok(markers)
    }

    /// Writes `config.yml` for the markers actually produced.
    pub fn write(
        &self,
        outgroup: OutgroupDesignation,
        seq_type: SequenceType,
    ) -> Result<RunManifest, CurateError> {
        let manifest = RunManifest {
            genes: self.produced_markers()?,
            outgroup,
            seq_type,
            algorithm: TREE_ALGORITHM.to_string(),
            data: self.layout.root().to_string(),
        };
        write_manifest(&manifest, &self.layout.manifest_path())?;
        tracing::info!(
            "wrote {} with {} genes",
            self.layout.manifest_path(),
            manifest.genes.len()
        );
        Ok(manifest)
    }
}

pub fn write_manifest(manifest: &RunManifest, destination: &Utf8Path) -> Result<(), CurateError> {
    let body = serde_yaml::to_string(manifest).map_err(|err| CurateError::Manifest(err.to_string()))?;
    store::write_bytes_atomic(destination, format!("{HEADER}{body}").as_bytes())
}

pub fn read_manifest(path: &Utf8Path) -> Result<RunManifest, CurateError> {
    let content = std::fs::read_to_string(path.as_std_path())
        .map_err(|err| CurateError::Manifest(format!("read {path}: {err}")))?;
    serde_yaml::from_str(&content).map_err(|err| CurateError::Manifest(err.to_string()))
}
