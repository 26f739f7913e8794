//! Rank and percentile prediction from a prior cohort's sparse curves.

use std::collections::BTreeMap;

use serde::Serialize;
use sqlx::PgPool;

use crate::db::models::HistoricalExamStats;
use crate::repositories;
use crate::services::errors::{ExamError, ExamResult};
use crate::services::ranking::round_to_hundredths;

/// Zeroes stand in for "no data"; consumers never see nulls.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub(crate) struct Prediction {
    pub(crate) predicted_percentile: f64,
    pub(crate) predicted_rank: i64,
}

/// Parses JSON object keys into numeric points, sorted by x.
pub(crate) fn curve_points(curve: &BTreeMap<String, f64>) -> Vec<(f64, f64)> {
    let mut points: Vec<(f64, f64)> = curve
        .iter()
        .filter_map(|(key, value)| match key.trim().parse::<f64>() {
            Ok(x) if x.is_finite() && value.is_finite() => Some((x, *value)),
            _ => {
                tracing::warn!(key = %key, "Skipping non-numeric historical curve point");
                None
            }
        })
        .collect();
    points.sort_by(|a, b| a.0.total_cmp(&b.0));
    points
}

/// Piecewise-linear lookup over points sorted by x. Outside the data the
/// nearest boundary segment is extended; nothing is clamped.
pub(crate) fn interpolate(x: f64, points: &[(f64, f64)]) -> Option<f64> {
    let (first, last) = match points {
        [] => return None,
        [only] => return Some(only.1),
        [first, .., last] => (*first, *last),
    };

    let segment = if x <= first.0 {
        (first, points[1])
    } else if x >= last.0 {
        (points[points.len() - 2], last)
    } else {
        let upper = points.partition_point(|point| point.0 < x);
        (points[upper - 1], points[upper])
    };

    Some(along(segment, x))
}

fn along(((x0, y0), (x1, y1)): ((f64, f64), (f64, f64)), x: f64) -> f64 {
    let dx = x1 - x0;
    if dx == 0.0 {
        return y0;
    }
    y0 + (x - x0) * (y1 - y0) / dx
}

pub(crate) fn predict(
    score: f64,
    score_to_percentile: &[(f64, f64)],
    percentile_to_rank: &[(f64, f64)],
) -> Prediction {
    let percentile = interpolate(score, score_to_percentile);

    let rank = match percentile {
        Some(p) => interpolate(p, percentile_to_rank)
            .or_else(|| Some(((100.0 - p) * 100.0).round().max(1.0))),
        None => median_rank(percentile_to_rank),
    };

    Prediction {
        predicted_percentile: round_to_hundredths(percentile.unwrap_or(0.0)),
        predicted_rank: rank.map(|value| value.round() as i64).unwrap_or(0),
    }
}

fn median_rank(percentile_to_rank: &[(f64, f64)]) -> Option<f64> {
    if percentile_to_rank.is_empty() {
        return None;
    }
    let mut ranks: Vec<f64> = percentile_to_rank.iter().map(|point| point.1).collect();
    ranks.sort_by(f64::total_cmp);
    Some(ranks[ranks.len() / 2])
}

pub(crate) fn predict_from_stats(score: f64, stats: &HistoricalExamStats) -> Prediction {
    predict(
        score,
        &curve_points(&stats.score_to_percentile.0),
        &curve_points(&stats.percentile_to_rank.0),
    )
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct PredictionReport {
    pub(crate) exam: String,
    pub(crate) exam_year: i32,
    pub(crate) prediction_based_on: i32,
    pub(crate) user_score: i32,
    #[serde(flatten)]
    pub(crate) prediction: Prediction,
}

/// Predicts from the previous year's curves of the same exam category.
pub(crate) async fn predict_for_attempt(
    pool: &PgPool,
    attempt_id: &str,
    user_id: &str,
) -> ExamResult<PredictionReport> {
    let attempt = repositories::attempts::find_by_id(pool, attempt_id)
        .await?
        .filter(|attempt| attempt.user_id == user_id && attempt.completed)
        .ok_or_else(|| {
            ExamError::NotFound("Attempt not found or exam not completed.".to_string())
        })?;
    let exam = repositories::exams::find_by_id(pool, &attempt.exam_id)
        .await?
        .ok_or_else(|| ExamError::not_found("Exam"))?;

    let based_on = exam.year - 1;
    let stats = repositories::historical_stats::find(pool, exam.category, based_on)
        .await?
        .ok_or_else(|| {
            ExamError::NotFound(
                "Prediction data not available for the given exam year and category.".to_string(),
            )
        })?;

    let user_score = attempt.total_score.unwrap_or(0);
    let prediction = predict_from_stats(f64::from(user_score), &stats);
    tracing::debug!(
        attempt_id,
        exam_id = %exam.id,
        user_score,
        predicted_rank = prediction.predicted_rank,
        "Rank predicted"
    );

    Ok(PredictionReport {
        exam: exam.title,
        exam_year: exam.year,
        prediction_based_on: based_on,
        user_score,
        prediction,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn curve(points: &[(&str, f64)]) -> Vec<(f64, f64)> {
        let map: BTreeMap<String, f64> =
            points.iter().map(|(k, v)| (k.to_string(), *v)).collect();
        curve_points(&map)
    }

    #[test]
    fn interpolates_percentile_then_rank() {
        let score_to_percentile = curve(&[("50", 40.0), ("100", 80.0)]);
        let percentile_to_rank = curve(&[("40", 1000.0), ("80", 100.0)]);

        assert_eq!(interpolate(75.0, &score_to_percentile), Some(60.0));
        assert_eq!(interpolate(60.0, &percentile_to_rank), Some(550.0));
        assert_eq!(
            predict(75.0, &score_to_percentile, &percentile_to_rank),
            Prediction { predicted_percentile: 60.0, predicted_rank: 550 }
        );
    }

    #[test]
    fn keys_sort_numerically_not_lexically() {
        let points = curve(&[("100", 80.0), ("50", 40.0), ("9", 5.0)]);
        let xs: Vec<f64> = points.iter().map(|p| p.0).collect();
        assert_eq!(xs, vec![9.0, 50.0, 100.0]);
    }

    #[test]
    fn extrapolates_beyond_the_data_without_clamping() {
        let points = curve(&[("50", 40.0), ("100", 80.0)]);
        assert_eq!(interpolate(150.0, &points), Some(120.0));
        assert_eq!(interpolate(0.0, &points), Some(0.0));
        assert_eq!(interpolate(-50.0, &points), Some(-40.0));
    }

    #[test]
    fn single_point_and_flat_segments_return_the_known_value() {
        assert_eq!(interpolate(3.0, &curve(&[("10", 70.0)])), Some(70.0));
        assert_eq!(interpolate(3.0, &[(10.0, 70.0), (10.0, 90.0)]), Some(70.0));
        assert_eq!(interpolate(3.0, &[]), None);
    }

    #[test]
    fn missing_percentile_curve_falls_back_to_median_rank() {
        let percentile_to_rank = curve(&[("10", 5.0), ("50", 50.0), ("90", 200.0)]);

        assert_eq!(
            predict(75.0, &[], &percentile_to_rank),
            Prediction { predicted_percentile: 0.0, predicted_rank: 50 }
        );
    }

    #[test]
    fn missing_rank_curve_uses_heuristic() {
        let score_to_percentile = curve(&[("50", 40.0), ("100", 80.0)]);
        assert_eq!(predict(75.0, &score_to_percentile, &[]).predicted_rank, 4000);

        let top = curve(&[("0", 99.999), ("100", 99.999)]);
        assert_eq!(predict(50.0, &top, &[]).predicted_rank, 1);
    }

    #[test]
    fn no_data_predicts_zeroes() {
        assert_eq!(
            predict(42.0, &[], &[]),
            Prediction { predicted_percentile: 0.0, predicted_rank: 0 }
        );
    }

    #[test]
    fn percentile_is_rounded_to_two_places() {
        let points = curve(&[("0", 0.0), ("3", 100.0)]);
        assert_eq!(predict(1.0, &points, &[]).predicted_percentile, 33.33);
    }

    #[test]
    fn non_numeric_keys_are_ignored() {
        let points = curve(&[("fifty", 40.0), ("100", 80.0)]);
        assert_eq!(points, vec![(100.0, 80.0)]);
    }
}
