use std::fs;

use camino::{Utf8Path, Utf8PathBuf};
use directories::BaseDirs;
use serde::{Deserialize, Serialize};

use crate::domain::{GenomeId, MarkerId, SequenceType};
use crate::error::CurateError;

/// Every on-disk location used by a run. Built once from the output root and
/// handed to each stage; file names are derived here and nowhere else.
#[derive(Debug, Clone)]
pub struct Layout {
    root: Utf8PathBuf,
}

impl Layout {
    pub fn new(root: Utf8PathBuf) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    pub fn assembly_summary_path(&self) -> Utf8PathBuf {
        self.root.join("assembly_summary.txt")
    }

    pub fn genomes_dir(&self) -> Utf8PathBuf {
        self.root.join("genomes")
    }

    pub fn genome_path(&self, genome: &GenomeId, seq_type: SequenceType) -> Utf8PathBuf {
        self.genomes_dir()
            .join(format!("{genome}.{}", seq_type.extension()))
    }

    pub fn genome_metadata_path(&self, genome: &GenomeId) -> Utf8PathBuf {
        self.genomes_dir()
            .join(".metadata")
            .join(format!("{genome}.json"))
    }

    pub fn filtered_dir(&self, seq_type: SequenceType) -> Utf8PathBuf {
        match seq_type {
            SequenceType::Prot => self.root.join("filtered-sequences"),
            SequenceType::Nucl => self.root.join("filtered-nucl-sequences"),
        }
    }

    pub fn filtered_path(
        &self,
        marker: &MarkerId,
        genome: &GenomeId,
        seq_type: SequenceType,
    ) -> Utf8PathBuf {
        self.filtered_dir(seq_type)
            .join(format!("{marker}__{genome}.{}", seq_type.extension()))
    }

    pub fn done_marker_path(&self, genome: &GenomeId) -> Utf8PathBuf {
        self.filtered_dir(SequenceType::Prot)
            .join(format!(".done_{genome}"))
    }

    pub fn merged_dir(&self) -> Utf8PathBuf {
        self.root.join("merged-sequences")
    }

    pub fn merged_path(&self, marker: &MarkerId) -> Utf8PathBuf {
        self.merged_dir().join(format!("{marker}.fasta"))
    }

    pub fn manifest_path(&self) -> Utf8PathBuf {
        self.root.join("config.yml")
    }

    pub fn ensure_dir(path: &Utf8Path) -> Result<(), CurateError> {
        fs::create_dir_all(path.as_std_path())
            .map_err(|_| CurateError::UnwritableOutput(path.as_std_path().to_path_buf()))
    }

    pub fn ensure_collect_dirs(&self) -> Result<(), CurateError> {
        Self::ensure_dir(&self.root)?;
        Self::ensure_dir(&self.genomes_dir())
    }

    pub fn ensure_extract_dirs(&self, seq_type: SequenceType) -> Result<(), CurateError> {
        Self::ensure_dir(&self.filtered_dir(SequenceType::Prot))?;
        if seq_type == SequenceType::Nucl {
            Self::ensure_dir(&self.filtered_dir(SequenceType::Nucl))?;
        }
        Self::ensure_dir(&self.merged_dir())
    }
}

/// Shared cache for files that outlive any single output directory.
pub fn default_cache_root() -> Result<Utf8PathBuf, CurateError> {
    BaseDirs::new()
        .and_then(|dirs| {
            Utf8PathBuf::from_path_buf(dirs.home_dir().join(".cache").join("marker-curator")).ok()
        })
        .ok_or_else(|| CurateError::Filesystem("unable to resolve cache directory".to_string()))
}

/// True when the path exists and holds at least one byte.
pub fn is_materialized(path: &Utf8Path) -> bool {
    fs::metadata(path.as_std_path())
        .map(|meta| meta.is_file() && meta.len() > 0)
        .unwrap_or(false)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Metadata {
    pub source: String,
    pub genome_id: String,
    pub origin: String,
    pub acquired_at: String,
    pub tool: String,
}

pub fn write_metadata(path: &Utf8Path, metadata: &Metadata) -> Result<(), CurateError> {
    let content = serde_json::to_vec_pretty(metadata)
        .map_err(|err| CurateError::Filesystem(err.to_string()))?;
    write_bytes_atomic(path, &content)
}

pub fn write_bytes_atomic(path: &Utf8Path, content: &[u8]) -> Result<(), CurateError> {
    let parent = path
        .parent()
        .ok_or_else(|| CurateError::Filesystem("invalid destination path".to_string()))?;
    fs::create_dir_all(parent.as_std_path())
        .map_err(|err| CurateError::Filesystem(err.to_string()))?;
    let temp = tempfile::Builder::new()
        .prefix(".marker-curator")
        .tempfile_in(parent.as_std_path())
        .map_err(|err| CurateError::Filesystem(err.to_string()))?;
    fs::write(temp.path(), content).map_err(|err| CurateError::Filesystem(err.to_string()))?;
    temp.persist(path.as_std_path())
        .map_err(|err| CurateError::Filesystem(err.to_string()))?;
    Ok(())
}

pub fn copy_file_atomic(source: &Utf8Path, dest: &Utf8Path) -> Result<(), CurateError> {
    let parent = dest
        .parent()
        .ok_or_else(|| CurateError::Filesystem("invalid destination path".to_string()))?;
    fs::create_dir_all(parent.as_std_path())
        .map_err(|err| CurateError::Filesystem(err.to_string()))?;
    let temp = tempfile::Builder::new()
        .prefix(".marker-curator")
        .tempfile_in(parent.as_std_path())
        .map_err(|err| CurateError::Filesystem(err.to_string()))?;
    fs::copy(source.as_std_path(), temp.path())
        .map_err(|err| CurateError::Filesystem(format!("copy {source}: {err}")))?;
    temp.persist(dest.as_std_path())
        .map_err(|err| CurateError::Filesystem(err.to_string()))?;
    Ok(())
}

/// Removes every regular file directly inside `dir`, leaving the directory.
pub fn clear_dir(dir: &Utf8Path) -> Result<usize, CurateError> {
    if !dir.as_std_path().exists() {
        return Ok(0);
    }
    let mut removed = 0;
    let entries =
        fs::read_dir(dir.as_std_path()).map_err(|err| CurateError::Filesystem(err.to_string()))?;
    for entry in entries {
        let entry = entry.map_err(|err| CurateError::Filesystem(err.to_string()))?;
        let path = entry.path();
        if path.is_file() {
            match fs::remove_file(&path) {
                Ok(()) => removed += 1,
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                    tracing::debug!("while removing {}: {err}", path.display());
                }
                Err(err) => return Err(CurateError::Filesystem(err.to_string())),
            }
        }
    }
    Ok(removed)
}
