use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use camino::{Utf8Path, Utf8PathBuf};
use serde::Serialize;

use crate::domain::MarkerId;
use crate::error::CurateError;
use crate::ncbi::RemoteFetcher;

pub const CUTOFFS_FILE: &str = "cutoffs.txt";

const PANEL_BASE_URL: &str = "https://github.com/motu-tool/fetchMGs/raw/master/lib";
const PANEL_CUTOFFS_NAME: &str = "MG_BitScoreCutoffs.allhits.txt";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassificationHit {
    pub query_id: String,
    pub marker_id: MarkerId,
    pub score: f64,
}

/// The fixed set of marker models with their per-marker bit-score cutoffs.
#[derive(Debug, Clone)]
pub struct MarkerPanel {
    cutoffs: BTreeMap<MarkerId, f64>,
    models: BTreeMap<MarkerId, Utf8PathBuf>,
}

impl MarkerPanel {
    pub fn from_cutoffs(cutoffs: impl IntoIterator<Item = (MarkerId, f64)>) -> Self {
        Self {
            cutoffs: cutoffs.into_iter().collect(),
            models: BTreeMap::new(),
        }
    }

    /// Reads `cutoffs.txt` from `dir` and expects one `{marker}.hmm` per listed marker.
    pub fn load(dir: &Utf8Path) -> Result<Self, CurateError> {
        let cutoffs_path = dir.join(CUTOFFS_FILE);
        let content = fs::read_to_string(cutoffs_path.as_std_path()).map_err(|err| {
            CurateError::MalformedPanel(format!("read {cutoffs_path}: {err}"))
        })?;
        let cutoffs = parse_cutoffs(&content)?;
        let mut models = BTreeMap::new();
        for marker in cutoffs.keys() {
            let model = dir.join(format!("{marker}.hmm"));
            if !model.as_std_path().is_file() {
                return Err(CurateError::MalformedPanel(format!("missing model {model}")));
            }
            models.insert(marker.clone(), model);
        }
        Ok(Self { cutoffs, models })
    }

    pub fn markers(&self) -> impl Iterator<Item = &MarkerId> {
        self.cutoffs.keys()
    }

    pub fn len(&self) -> usize {
        self.cutoffs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cutoffs.is_empty()
    }

    pub fn cutoff(&self, marker: &MarkerId) -> Option<f64> {
        self.cutoffs.get(marker).copied()
    }

    /// A hit is a candidate only for a panel marker and at or above its cutoff.
    pub fn passes(&self, hit: &ClassificationHit) -> bool {
        self.cutoff(&hit.marker_id)
            .map(|cutoff| hit.score >= cutoff)
            .unwrap_or(false)
    }

    /// Concatenates every model into one multi-model file at `destination`.
    pub fn write_combined_models(&self, destination: &Path) -> Result<(), CurateError> {
        if self.models.is_empty() {
            return Err(CurateError::MalformedPanel("panel has no models".to_string()));
        }
        let mut combined = Vec::new();
        for model in self.models.values() {
            let bytes = fs::read(model.as_std_path())
                .map_err(|err| CurateError::MalformedPanel(format!("read {model}: {err}")))?;
            combined.extend_from_slice(&bytes);
            if !combined.ends_with(b"\n") {
                combined.push(b'\n');
            }
        }
        fs::write(destination, combined).map_err(|err| CurateError::Filesystem(err.to_string()))
    }
}

pub fn parse_cutoffs(content: &str) -> Result<BTreeMap<MarkerId, f64>, CurateError> {
    let mut cutoffs = BTreeMap::new();
    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let mut fields = line.split('\t');
        let (Some(marker), Some(cutoff)) = (fields.next(), fields.next()) else {
            return Err(CurateError::MalformedPanel(format!("bad cutoff line: {line}")));
        };
        let cutoff: f64 = cutoff
            .trim()
            .parse()
            .map_err(|_| CurateError::MalformedPanel(format!("bad cutoff value: {line}")))?;
        cutoffs.insert(marker.parse()?, cutoff);
    }
    if cutoffs.is_empty() {
        return Err(CurateError::MalformedPanel("no markers listed".to_string()));
    }
    Ok(cutoffs)
}

/// Downloads the 40-marker fetchMGs panel into `dir` unless it is already there.
pub fn ensure_default_panel<F: RemoteFetcher>(
    fetcher: &F,
    dir: &Utf8Path,
) -> Result<MarkerPanel, CurateError> {
    let cutoffs_path = dir.join(CUTOFFS_FILE);
    if !cutoffs_path.as_std_path().is_file() {
        fs::create_dir_all(dir.as_std_path())
            .map_err(|err| CurateError::Filesystem(err.to_string()))?;
        tracing::info!("fetching marker panel into {dir}");
        let fetched = fetcher.fetch(&format!("{PANEL_BASE_URL}/{PANEL_CUTOFFS_NAME}"), dir)?;
        let content = fs::read_to_string(fetched.as_std_path())
            .map_err(|err| CurateError::Filesystem(err.to_string()))?;
        for marker in parse_cutoffs(&content)?.keys() {
            let model = dir.join(format!("{marker}.hmm"));
            if !model.as_std_path().is_file() {
                fetcher.fetch(&format!("{PANEL_BASE_URL}/{marker}.hmm"), dir)?;
            }
        }
        // Written last: its presence means the panel is complete.
        fs::rename(fetched.as_std_path(), cutoffs_path.as_std_path())
            .map_err(|err| CurateError::Filesystem(err.to_string()))?;
    }
    MarkerPanel::load(dir)
}

/// The profile-model scoring primitive: one call per genome over its whole
/// protein set, yielding every (query, marker, score) the tool reports.
pub trait MarkerScorer: Send + Sync {
    fn score(
        &self,
        protein_file: &Utf8Path,
        panel: &MarkerPanel,
    ) -> Result<Vec<ClassificationHit>, CurateError>;
}

/// CPUs for one scorer process when `concurrent` genomes are scored at once out of a
/// budget of `total`.
pub fn cpus_per_process(total: usize, concurrent: usize) -> usize {
    (total / concurrent.max(1)).max(1)
}

/// Runs the system `hmmsearch` against the concatenated panel.
pub struct HmmsearchScorer {
    program: PathBuf,
    combined: tempfile::TempDir,
    cpus: usize,
}

impl HmmsearchScorer {
    pub fn new(panel: &MarkerPanel, cpus: usize) -> Result<Self, CurateError> {
        let program =
            find_in_path("hmmsearch").ok_or_else(|| CurateError::MissingTool("hmmsearch".to_string()))?;
        let combined = tempfile::Builder::new()
            .prefix("marker-curator-panel")
            .tempdir()
            .map_err(|err| CurateError::Filesystem(err.to_string()))?;
        panel.write_combined_models(&combined.path().join("panel.hmm"))?;
        Ok(Self {
            program,
            combined,
            cpus,
        })
    }

    fn panel_path(&self) -> PathBuf {
        self.combined.path().join("panel.hmm")
    }
}

impl MarkerScorer for HmmsearchScorer {
    fn score(
        &self,
        protein_file: &Utf8Path,
        _panel: &MarkerPanel,
    ) -> Result<Vec<ClassificationHit>, CurateError> {
        let table = tempfile::Builder::new()
            .prefix("marker-curator-tblout")
            .tempfile()
            .map_err(|err| CurateError::Filesystem(err.to_string()))?;
        let output = Command::new(&self.program)
            .arg("--noali")
            .arg("--cpu")
            .arg(self.cpus.to_string())
            .arg("--tblout")
            .arg(table.path())
            .arg(self.panel_path())
            .arg(protein_file.as_std_path())
            .output()
            .map_err(|err| CurateError::Scorer(err.to_string()))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            let message = if stderr.is_empty() {
                format!("hmmsearch failed on {protein_file}")
            } else {
                stderr
            };
            return Err(CurateError::Scorer(message));
        }
        let content = fs::read_to_string(table.path())
            .map_err(|err| CurateError::Filesystem(err.to_string()))?;
        parse_tblout(&content)
    }
}

/// Parses an hmmsearch `--tblout` table: target (query protein), model name,
/// full-sequence bit score.
pub fn parse_tblout(content: &str) -> Result<Vec<ClassificationHit>, CurateError> {
    let mut hits = Vec::new();
    for line in content.lines() {
        if line.starts_with('#') || line.trim().is_empty() {
            continue;
        }
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < 6 {
            return Err(CurateError::ScorerOutput(line.to_string()));
        }
        let score: f64 = fields[5]
            .parse()
            .map_err(|_| CurateError::ScorerOutput(line.to_string()))?;
        hits.push(ClassificationHit {
            query_id: fields[0].to_string(),
            marker_id: fields[2].parse()?,
            score,
        });
    }
    Ok(hits)
}

fn find_in_path(name: &str) -> Option<PathBuf> {
    let path_var = std::env::var_os("PATH")?;
    std::env::split_paths(&path_var)
        .map(|dir| dir.join(name))
        .find(|candidate| candidate.is_file())
}
