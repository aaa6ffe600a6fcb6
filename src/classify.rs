//! Best-marker selection over scorer hits.
//!
//! Per query the highest-scoring marker wins. A query whose top score is shared by
//! two different markers is ambiguous and produces no assignment; a later hit with
//! a strictly higher score still replaces it.

use std::collections::BTreeMap;
use std::collections::btree_map::Entry;

use serde::Serialize;

use crate::acquire::MaterializedGenome;
use crate::domain::{GenomeId, MarkerId};
use crate::error::CurateError;
use crate::scorer::{ClassificationHit, MarkerPanel, MarkerScorer};

const PREVIEW_LEN: usize = 10;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WinningAssignment {
    pub genome_id: GenomeId,
    pub query_id: String,
    pub marker_id: MarkerId,
    pub score: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct Classification {
    pub genome_id: GenomeId,
    /// Ordered by query id.
    pub winners: Vec<WinningAssignment>,
    pub ambiguous: Vec<String>,
}

struct Best {
    hit: ClassificationHit,
    ambiguous: bool,
}

/// Applies the panel cutoffs, then the per-query selection. Output is sorted by
/// query id and holds at most one assignment per query.
pub fn select_winners<I>(genome_id: &GenomeId, hits: I, panel: &MarkerPanel) -> Classification
where
    I: IntoIterator<Item = ClassificationHit>,
{
    let mut best: BTreeMap<String, Best> = BTreeMap::new();
    for hit in hits.into_iter().filter(|hit| panel.passes(hit)) {
        match best.entry(hit.query_id.clone()) {
            Entry::Vacant(entry) => {
                entry.insert(Best {
                    hit,
                    ambiguous: false,
                });
            }
            Entry::Occupied(mut entry) => {
                let current = entry.get_mut();
                if hit.score > current.hit.score {
                    *current = Best {
                        hit,
                        ambiguous: false,
                    };
                } else if hit.score == current.hit.score && hit.marker_id != current.hit.marker_id {
                    current.ambiguous = true;
                }
            }
        }
    }

    let mut winners = Vec::new();
    let mut ambiguous = Vec::new();
    for (query_id, entry) in best {
        if entry.ambiguous {
            ambiguous.push(query_id);
            continue;
        }
        winners.push(WinningAssignment {
            genome_id: genome_id.clone(),
            query_id,
            marker_id: entry.hit.marker_id,
            score: entry.hit.score,
        });
    }
    Classification {
        genome_id: genome_id.clone(),
        winners,
        ambiguous,
    }
}

/// Reduces assignments to one per marker: highest score first, then the
/// lexicographically smallest query id. Result is ordered by marker id.
pub fn one_per_marker(winners: &[WinningAssignment]) -> Vec<WinningAssignment> {
    let mut chosen: BTreeMap<&MarkerId, &WinningAssignment> = BTreeMap::new();
    for winner in winners {
        match chosen.entry(&winner.marker_id) {
            Entry::Vacant(entry) => {
                entry.insert(winner);
            }
            Entry::Occupied(mut entry) => {
                let current = *entry.get();
                let better = winner.score > current.score
                    || (winner.score == current.score && winner.query_id < current.query_id);
                if better {
                    entry.insert(winner);
                }
            }
        }
    }
    chosen.into_values().cloned().collect()
}

pub struct OrthologClassifier<'a, S: MarkerScorer> {
    scorer: &'a S,
    panel: &'a MarkerPanel,
}

impl<'a, S: MarkerScorer> OrthologClassifier<'a, S> {
    pub fn new(scorer: &'a S, panel: &'a MarkerPanel) -> Self {
        Self { scorer, panel }
    }

    pub fn classify(&self, genome: &MaterializedGenome) -> Result<Classification, CurateError> {
        let hits = self.scorer.score(&genome.protein_path, self.panel)?;
        tracing::debug!("{}: {} raw hits", genome.genome_id, hits.len());
        let classification = select_winners(&genome.genome_id, hits, self.panel);

        tracing::info!("classified {}, top bitscores:", genome.genome_id);
        let mut preview: Vec<&WinningAssignment> = classification.winners.iter().collect();
        preview.sort_by(|a, b| b.score.total_cmp(&a.score).then_with(|| a.query_id.cmp(&b.query_id)));
        for winner in preview.into_iter().take(PREVIEW_LEN) {
            tracing::info!("{}\t{:.1}\t{}", winner.query_id, winner.score, winner.marker_id);
        }
        if !classification.ambiguous.is_empty() {
            tracing::debug!(
                "{}: dropped {} ambiguous queries",
                genome.genome_id,
                classification.ambiguous.len()
            );
        }
        Ok(classification)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hit(query: &str, marker: &str, score: f64) -> ClassificationHit {
        ClassificationHit {
            query_id: query.to_string(),
            marker_id: marker.parse().unwrap(),
            score,
        }
    }

    fn panel() -> MarkerPanel {
        MarkerPanel::from_cutoffs([
            ("M1".parse().unwrap(), 10.0),
            ("M2".parse().unwrap(), 10.0),
            ("M3".parse().unwrap(), 10.0),
        ])
    }

    #[test]
    fn higher_score_replaces_current_best() {
        let genome: GenomeId = "G1".parse().unwrap();
        let result = select_winners(&genome, [hit("Q1", "M1", 40.0), hit("Q1", "M2", 60.0)], &panel());
        assert_eq!(result.winners.len(), 1);
        assert_eq!(result.winners[0].marker_id.as_str(), "M2");
    }

    #[test]
    fn lower_score_after_tie_keeps_query_ambiguous() {
        let genome: GenomeId = "G1".parse().unwrap();
        let result = select_winners(
            &genome,
            [hit("Q1", "M1", 50.0), hit("Q1", "M2", 50.0), hit("Q1", "M3", 20.0)],
            &panel(),
        );
        assert!(result.winners.is_empty());
        assert_eq!(result.ambiguous, vec!["Q1".to_string()]);
    }

    #[test]
    fn hits_below_cutoff_are_not_candidates() {
        let genome: GenomeId = "G1".parse().unwrap();
        let result = select_winners(&genome, [hit("Q1", "M1", 50.0), hit("Q1", "M2", 5.0)], &panel());
        assert_eq!(result.winners[0].marker_id.as_str(), "M1");
    }

    #[test]
    fn one_per_marker_prefers_score_then_query_id() {
        let genome: GenomeId = "G1".parse().unwrap();
        let result = select_winners(
            &genome,
            [hit("Qb", "M1", 50.0), hit("Qa", "M1", 50.0), hit("Qc", "M1", 70.0), hit("Qd", "M2", 30.0)],
            &panel(),
        );
        let reduced = one_per_marker(&result.winners);
        assert_eq!(reduced.len(), 2);
        assert_eq!(reduced[0].query_id, "Qc");

        let tied = one_per_marker(&result.winners[..2]);
        assert_eq!(tied[0].query_id, "Qa");
    }
}
