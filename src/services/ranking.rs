//! Leaderboard math: ordering, ranks and percentiles for a closed exam.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use time::PrimitiveDateTime;

use crate::db::models::{SubjectPercentiles, SubjectRanks, SubjectScores};

#[derive(Debug, Clone)]
pub(crate) struct RankingEntry {
    pub(crate) attempt_id: String,
    pub(crate) total_score: i32,
    pub(crate) completed_at: Option<PrimitiveDateTime>,
    pub(crate) subject_scores: SubjectScores,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Standing {
    pub(crate) attempt_id: String,
    pub(crate) overall_rank: i32,
    pub(crate) overall_percentile: f64,
    pub(crate) subject_ranks: SubjectRanks,
    pub(crate) subject_percentiles: SubjectPercentiles,
}

pub(crate) fn round_to_hundredths(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// `100 * (1 - (rank - 1) / total)`; undefined for an empty field.
pub(crate) fn percentile(rank: usize, total: usize) -> Option<f64> {
    if total == 0 || rank == 0 {
        return None;
    }
    let fraction = (rank - 1) as f64 / total as f64;
    Some(round_to_hundredths(100.0 * (1.0 - fraction)))
}

/// Earlier finishers first, then attempt id so the order never depends on input order.
fn finish_order(a: &RankingEntry, b: &RankingEntry) -> Ordering {
    let by_time = match (a.completed_at, b.completed_at) {
        (Some(left), Some(right)) => left.cmp(&right),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    };
    by_time.then_with(|| a.attempt_id.cmp(&b.attempt_id))
}

/// Ranks every entry overall and within each topic it scored in.
/// Results come back in overall rank order; an empty field yields no standings.
pub(crate) fn compute_standings(entries: &[RankingEntry]) -> Vec<Standing> {
    let total = entries.len();
    if total == 0 {
        return Vec::new();
    }

    let mut order: Vec<usize> = (0..total).collect();
    order.sort_by(|&a, &b| {
        let (a, b) = (&entries[a], &entries[b]);
        b.total_score.cmp(&a.total_score).then_with(|| finish_order(a, b))
    });

    let mut by_topic: BTreeMap<&str, Vec<(usize, i32)>> = BTreeMap::new();
    for (index, entry) in entries.iter().enumerate() {
        for (topic, score) in &entry.subject_scores {
            by_topic.entry(topic.as_str()).or_default().push((index, *score));
        }
    }

    let mut subject_ranks: Vec<SubjectRanks> = vec![SubjectRanks::new(); total];
    let mut subject_percentiles: Vec<SubjectPercentiles> = vec![SubjectPercentiles::new(); total];
    for (topic, mut scored) in by_topic {
        scored.sort_by(|&(a, a_score), &(b, b_score)| {
            b_score.cmp(&a_score).then_with(|| finish_order(&entries[a], &entries[b]))
        });
        let topic_total = scored.len();
        for (position, (index, _)) in scored.into_iter().enumerate() {
            let rank = position + 1;
            subject_ranks[index].insert(topic.to_string(), rank as i32);
            if let Some(value) = percentile(rank, topic_total) {
                subject_percentiles[index].insert(topic.to_string(), value);
            }
        }
    }

    order
        .into_iter()
        .enumerate()
        .map(|(position, index)| {
            let rank = position + 1;
            Standing {
                attempt_id: entries[index].attempt_id.clone(),
                overall_rank: rank as i32,
                overall_percentile: percentile(rank, total).unwrap_or_default(),
                subject_ranks: std::mem::take(&mut subject_ranks[index]),
                subject_percentiles: std::mem::take(&mut subject_percentiles[index]),
            }
        })
        .collect()
}
