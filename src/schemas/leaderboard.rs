use serde::{Deserialize, Serialize};

use crate::core::time::format_primitive;
use crate::repositories::attempts::{LeaderboardOrder, OverallRow, SubjectRow};
use crate::services::leaderboard::LeaderboardView;

#[derive(Debug, Default, Deserialize)]
pub(crate) struct LeaderboardQuery {
    #[serde(default)]
    pub(crate) skip: i64,
    #[serde(default)]
    pub(crate) limit: Option<i64>,
    /// Order by percentile instead of rank.
    #[serde(default)]
    pub(crate) percentile: bool,
    #[serde(default, alias = "subject")]
    pub(crate) topic_id: Option<String>,
}

impl LeaderboardQuery {
    pub(crate) fn view(&self) -> LeaderboardView {
        match self.topic_id.as_deref().map(str::trim) {
            Some(topic_id) if !topic_id.is_empty() => {
                LeaderboardView::Subject { topic_id: topic_id.to_string() }
            }
            _ if self.percentile => LeaderboardView::Overall(LeaderboardOrder::Percentile),
            _ => LeaderboardView::Overall(LeaderboardOrder::Rank),
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct OverallEntry {
    pub(crate) attempt_id: String,
    pub(crate) user_id: String,
    pub(crate) username: String,
    pub(crate) full_name: String,
    pub(crate) total_score: Option<i32>,
    pub(crate) overall_rank: Option<i32>,
    pub(crate) overall_percentile: Option<f64>,
    pub(crate) completed_at: Option<String>,
}

impl From<OverallRow> for OverallEntry {
    fn from(row: OverallRow) -> Self {
        Self {
            attempt_id: row.attempt_id,
            user_id: row.user_id,
            username: row.username,
            full_name: row.full_name,
            total_score: row.total_score,
            overall_rank: row.overall_rank,
            overall_percentile: row.overall_percentile,
            completed_at: row.completed_at.map(format_primitive),
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct SubjectEntry {
    pub(crate) attempt_id: String,
    pub(crate) user_id: String,
    pub(crate) username: String,
    pub(crate) full_name: String,
    pub(crate) topic_id: String,
    pub(crate) subject_score: Option<i32>,
    pub(crate) subject_rank: Option<i32>,
    pub(crate) subject_percentile: Option<f64>,
    pub(crate) completed_at: Option<String>,
}

impl SubjectEntry {
    pub(crate) fn from_row(row: SubjectRow, topic_id: &str) -> Self {
        Self {
            attempt_id: row.attempt_id,
            user_id: row.user_id,
            username: row.username,
            full_name: row.full_name,
            topic_id: topic_id.to_string(),
            subject_score: row.subject_score,
            subject_rank: row.subject_rank,
            subject_percentile: row.subject_percentile,
            completed_at: row.completed_at.map(format_primitive),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub(crate) enum LeaderboardEntry {
    Overall(OverallEntry),
    Subject(SubjectEntry),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query(raw: serde_json::Value) -> LeaderboardQuery {
        serde_json::from_value(raw).expect("query")
    }

    #[test]
    fn view_defaults_to_rank_order() {
        assert_eq!(
            query(serde_json::json!({})).view(),
            LeaderboardView::Overall(LeaderboardOrder::Rank)
        );
        assert_eq!(
            query(serde_json::json!({ "percentile": true })).view(),
            LeaderboardView::Overall(LeaderboardOrder::Percentile)
        );
    }

    #[test]
    fn subject_alias_selects_subject_view() {
        assert_eq!(
            query(serde_json::json!({ "subject": "algebra" })).view(),
            LeaderboardView::Subject { topic_id: "algebra".to_string() }
        );
        assert_eq!(
            query(serde_json::json!({ "topic_id": "  " })).view(),
            LeaderboardView::Overall(LeaderboardOrder::Rank)
        );
    }
}
