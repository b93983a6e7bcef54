//! Gallery matching: single-pass best/second-best tracking plus a threshold decision, kept
//! separate from the embedder so decision tuning doesn't require re-running inference.

use crate::config::Config;
use crate::embedder::cosine_similarity;
use crate::types::{Decision, Embedding, GalleryEntry, MatchTop2};

/// Single pass over the gallery tracking both the best and second-best cosine similarity.
/// Returns [`MatchTop2::invalid`] for an empty gallery or an empty query embedding.
pub fn best_match_top2(query: &Embedding, gallery: &[GalleryEntry]) -> MatchTop2 {
    if gallery.is_empty() || query.is_empty() {
        return MatchTop2::invalid();
    }

    let mut best_idx: Option<usize> = None;
    let mut best_sim = f32::NEG_INFINITY;
    let mut second_idx: Option<usize> = None;
    let mut second_sim = f32::NEG_INFINITY;

    for (i, entry) in gallery.iter().enumerate() {
        if entry.embedding.len() != query.len() {
            continue;
        }
        let sim = cosine_similarity(query, &entry.embedding);

        if sim > best_sim {
            second_idx = best_idx;
            second_sim = best_sim;
            best_idx = Some(i);
            best_sim = sim;
        } else if sim > second_sim {
            second_idx = Some(i);
            second_sim = sim;
        }
    }

    match best_idx {
        Some(_) => MatchTop2 {
            best_idx,
            best_sim,
            second_idx,
            second_sim: if second_idx.is_some() {
                second_sim
            } else {
                crate::types::MATCH_INVALID
            },
        },
        None => MatchTop2::invalid(),
    }
}

#[derive(Debug, Clone, Copy)]
pub struct DecisionParams {
    pub accept_sim: f32,
    pub strong_accept_sim: f32,
    pub min_top2_gap: f32,
    pub min_best_only: f32,
}

impl DecisionParams {
    pub fn from_config(config: &Config) -> Self {
        Self {
            accept_sim: config.matcher.accept_sim,
            strong_accept_sim: config.matcher.strong_accept_sim,
            min_top2_gap: config.matcher.min_top2_gap,
            min_best_only: config.matcher.min_best_only,
        }
    }

    pub fn legacy_preset() -> Self {
        let cfg = crate::config::MatchConfig::legacy_preset();
        Self {
            accept_sim: cfg.accept_sim,
            strong_accept_sim: cfg.strong_accept_sim,
            min_top2_gap: cfg.min_top2_gap,
            min_best_only: cfg.min_best_only,
        }
    }
}

fn valid_sim(s: f32) -> bool {
    s.is_finite() && (-1.0..=1.0).contains(&s)
}

/// Thresholds a [`MatchTop2`] into a [`Decision`].
///
/// Evaluation order follows `SimilarityDecision::decide`: StrongAccept and Accept are tried
/// first against the full score/gap criteria, and the single-entry-gallery Tentative fallback
/// only catches what's left — a high-enough best score with no second candidate to compare
/// against. A single-entry gallery with a score that clears the StrongAccept/Accept bars is
/// still StrongAccept/Accept, not downgraded to Tentative.
pub fn decide(m: &MatchTop2, params: &DecisionParams) -> Decision {
    if !valid_sim(m.best_sim) {
        return Decision::Reject;
    }

    let has_second = m.has_second() && valid_sim(m.second_sim);
    let gap = if has_second {
        m.best_sim - m.second_sim
    } else {
        m.best_sim - (-1.0)
    };

    if m.best_sim >= params.strong_accept_sim && (!has_second || gap >= params.min_top2_gap) {
        return Decision::StrongAccept;
    }

    if m.best_sim >= params.accept_sim && (!has_second || gap >= params.min_top2_gap) {
        return Decision::Accept;
    }

    if !has_second && m.best_sim >= params.min_best_only {
        return Decision::Tentative;
    }

    Decision::Reject
}

/// True when the match is ambiguous enough that the caller should treat it as an unknown face
/// rather than a weak match on a known one.
pub fn unknown_likely(m: &MatchTop2, params: &DecisionParams) -> bool {
    if !valid_sim(m.best_sim) {
        return true;
    }
    let weak_best = m.best_sim < params.min_best_only;
    let small_gap = m.has_second()
        && valid_sim(m.second_sim)
        && (m.best_sim - m.second_sim) < (params.min_top2_gap * 0.6);
    weak_best || small_gap
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(id: u64, name: &str, embedding: Vec<f32>) -> GalleryEntry {
        GalleryEntry {
            id,
            name: name.to_string(),
            embedding,
            extra: Default::default(),
        }
    }

    #[test]
    fn empty_gallery_is_invalid() {
        let m = best_match_top2(&vec![1.0, 0.0], &[]);
        assert!(!m.is_best_valid());
    }

    #[test]
    fn tracks_best_and_second_independently() {
        let gallery = vec![
            entry(1, "alice", vec![1.0, 0.0]),
            entry(2, "bob", vec![0.0, 1.0]),
            entry(3, "carol", vec![0.7071, 0.7071]),
        ];
        let query = vec![1.0, 0.0];
        let m = best_match_top2(&query, &gallery);
        assert_eq!(m.best_idx, Some(0));
        assert_eq!(m.second_idx, Some(2));
    }

    #[test]
    fn single_candidate_mid_score_is_tentative() {
        let gallery = vec![entry(1, "alice", vec![1.0, 0.0])];
        let query = vec![0.6, 0.8];
        let m = best_match_top2(&query, &gallery);
        let params = DecisionParams {
            accept_sim: 0.97,
            strong_accept_sim: 0.98,
            min_top2_gap: 0.04,
            min_best_only: 0.40,
        };
        assert_eq!(decide(&m, &params), Decision::Tentative);
    }

    #[test]
    fn single_candidate_high_score_is_strong_accept_not_tentative() {
        // Scenario S1: a single-entry gallery with a high score is a clean StrongAccept, not
        // downgraded to Tentative just because there's no second candidate to compare against.
        let gallery = vec![entry(1, "alice", vec![1.0, 0.0])];
        let query = vec![1.0, 0.0];
        let m = best_match_top2(&query, &gallery);
        let params = DecisionParams {
            accept_sim: 0.97,
            strong_accept_sim: 0.98,
            min_top2_gap: 0.04,
            min_best_only: 0.40,
        };
        assert_eq!(decide(&m, &params), Decision::StrongAccept);
    }

    #[test]
    fn clear_winner_with_gap_is_strong_accept() {
        let gallery = vec![
            entry(1, "alice", vec![1.0, 0.0]),
            entry(2, "bob", vec![0.0, 1.0]),
        ];
        let query = vec![1.0, 0.0];
        let m = best_match_top2(&query, &gallery);
        let params = DecisionParams {
            accept_sim: 0.97,
            strong_accept_sim: 0.98,
            min_top2_gap: 0.04,
            min_best_only: 0.40,
        };
        assert_eq!(decide(&m, &params), Decision::StrongAccept);
    }

    #[test]
    fn close_top2_gap_rejects() {
        let gallery = vec![
            entry(1, "alice", vec![1.0, 0.0]),
            entry(2, "bob", vec![0.99995, 0.01]),
        ];
        let query = vec![1.0, 0.0];
        let m = best_match_top2(&query, &gallery);
        let params = DecisionParams {
            accept_sim: 0.90,
            strong_accept_sim: 0.98,
            min_top2_gap: 0.04,
            min_best_only: 0.40,
        };
        assert_eq!(decide(&m, &params), Decision::Reject);
    }
}
