//! Exam closing and leaderboard reads.

use std::time::Instant;

use sqlx::PgPool;
use time::PrimitiveDateTime;

use crate::core::state::AppState;
use crate::core::time::primitive_now_utc;
use crate::repositories;
use crate::repositories::attempts::{LeaderboardOrder, OverallRow, SubjectRow};
use crate::services::attempts::score_attempt;
use crate::services::errors::{ExamError, ExamResult};
use crate::services::locks::{finalize_lock_key, run_exclusive, Exclusive};
use crate::services::ranking::{compute_standings, RankingEntry};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FinalizeOutcome {
    Closed { ranked: usize, force_completed: usize },
    AlreadyClosed,
    /// The exam is still running; nothing was written.
    NotYetDue { end_time: PrimitiveDateTime },
    LockContention,
}

impl FinalizeOutcome {
    pub(crate) fn label(&self) -> &'static str {
        match self {
            Self::Closed { ranked: 0, .. } => "closed_empty",
            Self::Closed { .. } => "closed",
            Self::AlreadyClosed => "already_closed",
            Self::NotYetDue { .. } => "not_yet_due",
            Self::LockContention => "lock_contention",
        }
    }
}

/// Entry point for finalize triggers. Safe to deliver more than once: a
/// concurrent duplicate loses the lock and a late one finds the exam closed.
pub(crate) async fn finalize_exam(state: &AppState, exam_id: &str) -> ExamResult<FinalizeOutcome> {
    let started = Instant::now();
    let key = finalize_lock_key(exam_id);
    let ttl = state.settings().finalize().lock_ttl();

    tracing::info!(exam_id, "Finalizing exam");
    let run = run_exclusive(state.locks(), &key, ttl, close_exam(state.db(), exam_id)).await;

    let result = match run {
        Ok(Exclusive::Ran(result)) => result,
        Ok(Exclusive::Contended) => {
            tracing::debug!(exam_id, "Finalize lock held elsewhere; skipping");
            Ok(FinalizeOutcome::LockContention)
        }
        Err(err) => Err(ExamError::from(err)),
    };

    let label = match &result {
        Ok(outcome) => outcome.label(),
        Err(_) => "error",
    };
    metrics::counter!("exam_finalize_total", "outcome" => label).increment(1);
    metrics::histogram!("exam_finalize_duration_seconds").record(started.elapsed().as_secs_f64());

    result
}

/// Closes the exam in one transaction: lingering attempts are completed and
/// scored, every scored attempt is ranked, and the exam is marked closed.
/// An exam whose end time has not passed is left untouched.
pub(crate) async fn close_exam(pool: &PgPool, exam_id: &str) -> ExamResult<FinalizeOutcome> {
    let mut tx = pool.begin().await?;

    let exam = repositories::exams::find_for_update(&mut *tx, exam_id)
        .await?
        .ok_or_else(|| ExamError::not_found("Exam"))?;
    if exam.closed {
        tracing::info!(exam_id, "Exam already closed; nothing to do");
        return Ok(FinalizeOutcome::AlreadyClosed);
    }

    let now = primitive_now_utc();
    if now < exam.end_time {
        tracing::info!(exam_id, end_time = %exam.end_time, "Exam still running; not closing");
        return Ok(FinalizeOutcome::NotYetDue { end_time: exam.end_time });
    }
    let lingering =
        repositories::attempts::force_complete_for_exam(&mut *tx, exam_id, exam.end_time, now)
            .await?;
    for attempt in &lingering {
        score_attempt(&mut tx, &exam, attempt, now).await?;
    }

    let entries: Vec<RankingEntry> =
        repositories::attempts::list_scored_for_exam(&mut *tx, exam_id)
            .await?
            .into_iter()
            .filter_map(|attempt| {
                attempt.total_score.map(|total_score| RankingEntry {
                    attempt_id: attempt.id,
                    total_score,
                    completed_at: attempt.completed_at,
                    subject_scores: attempt.subject_scores.0,
                })
            })
            .collect();

    let standings = compute_standings(&entries);
    if standings.is_empty() {
        tracing::warn!(exam_id, "No scored attempts; closing exam without a leaderboard");
    }

    repositories::attempts::apply_standings(&mut *tx, &standings, now).await?;
    repositories::exams::mark_closed(&mut *tx, exam_id, now).await?;
    tx.commit().await?;

    tracing::info!(
        exam_id,
        ranked = standings.len(),
        force_completed = lingering.len(),
        "Exam finalized"
    );

    Ok(FinalizeOutcome::Closed { ranked: standings.len(), force_completed: lingering.len() })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum LeaderboardView {
    Overall(LeaderboardOrder),
    Subject { topic_id: String },
}

#[derive(Debug)]
pub(crate) enum LeaderboardPage {
    Overall { rows: Vec<OverallRow>, total_count: i64 },
    Subject { topic_id: String, rows: Vec<SubjectRow>, total_count: i64 },
}

pub(crate) async fn get_leaderboard(
    pool: &PgPool,
    exam_id: &str,
    view: LeaderboardView,
    skip: i64,
    limit: i64,
) -> ExamResult<LeaderboardPage> {
    let exam = repositories::exams::find_by_id(pool, exam_id).await?;
    if !exam.is_some_and(|exam| exam.closed) {
        return Err(ExamError::NotFound(
            "Exam not found or leaderboard not available.".to_string(),
        ));
    }

    let page = match view {
        LeaderboardView::Overall(order) => {
            let rows = repositories::attempts::list_overall_leaderboard(
                pool, exam_id, order, skip, limit,
            )
            .await?;
            let total_count = repositories::attempts::count_ranked(pool, exam_id).await?;
            LeaderboardPage::Overall { rows, total_count }
        }
        LeaderboardView::Subject { topic_id } => {
            let rows = repositories::attempts::list_subject_leaderboard(
                pool, exam_id, &topic_id, skip, limit,
            )
            .await?;
            let total_count =
                repositories::attempts::count_subject_ranked(pool, exam_id, &topic_id).await?;
            LeaderboardPage::Subject { topic_id, rows, total_count }
        }
    };

    Ok(page)
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::sync::Arc;
    use std::time::Duration;

    use sqlx::PgPool;
    use time::PrimitiveDateTime;

    use super::{finalize_exam, get_leaderboard, FinalizeOutcome, LeaderboardPage, LeaderboardView};
    use crate::core::config::Settings;
    use crate::core::redis::RedisHandle;
    use crate::core::state::AppState;
    use crate::db::types::ExamCategory;
    use crate::repositories;
    use crate::repositories::attempts::LeaderboardOrder;
    use crate::services::attempts::{self, AnswerSelection};
    use crate::services::errors::ExamError;
    use crate::services::finalize_schedule::recording::RecordingScheduler;
    use crate::services::locks::memory::InMemoryLocks;
    use crate::services::locks::{finalize_lock_key, LockService};
    use crate::test_support;

    #[test]
    fn outcome_labels_separate_empty_closures() {
        assert_eq!(FinalizeOutcome::Closed { ranked: 3, force_completed: 1 }.label(), "closed");
        assert_eq!(
            FinalizeOutcome::Closed { ranked: 0, force_completed: 0 }.label(),
            "closed_empty"
        );
        assert_eq!(FinalizeOutcome::AlreadyClosed.label(), "already_closed");
        assert_eq!(FinalizeOutcome::LockContention.label(), "lock_contention");
    }

    #[tokio::test]
    async fn held_lock_skips_finalize_without_touching_storage() {
        let _guard = test_support::env_lock().await;
        test_support::set_test_env();
        let settings = Settings::load().expect("settings");

        // Never connects; any query would fail the run.
        let db = sqlx::PgPool::connect_lazy("postgres://nobody@127.0.0.1:1/none").expect("pool");
        let redis = RedisHandle::new(settings.redis().redis_url());
        let locks = Arc::new(InMemoryLocks::default());
        let state = AppState::with_collaborators(
            settings,
            db,
            redis,
            locks.clone(),
            Arc::new(RecordingScheduler::default()),
        );

        let key = finalize_lock_key("exam-1");
        let held = locks.try_acquire(&key, Duration::from_secs(60)).await.expect("acquire");
        assert!(held.is_some());

        let outcome = finalize_exam(&state, "exam-1").await.expect("outcome");
        assert_eq!(outcome, FinalizeOutcome::LockContention);
    }

    #[tokio::test]
    async fn disconnected_lock_service_surfaces_an_error() {
        let _guard = test_support::env_lock().await;
        test_support::set_test_env();
        let settings = Settings::load().expect("settings");

        let db = sqlx::PgPool::connect_lazy("postgres://nobody@127.0.0.1:1/none").expect("pool");
        let redis = RedisHandle::new(settings.redis().redis_url());
        let state = AppState::new(settings, db, redis);

        let result = finalize_exam(&state, "exam-1").await;
        assert!(matches!(result, Err(ExamError::Lock(_))));
    }

    #[tokio::test]
    async fn concurrent_triggers_rank_the_exam_once() {
        let Some(ctx) = test_support::setup_test_context().await else {
            return;
        };
        let db = ctx.state.db();

        let topic = test_support::insert_topic(db, "Verbal").await;
        let question = test_support::insert_choice_question(db, &topic.id, 3).await;
        let exam =
            test_support::create_open_exam(&ctx.state, ExamCategory::Cat, 2026, &[&question])
                .await;

        for (name, choice) in [("ira", 3), ("joe", 1)] {
            let user = test_support::insert_user(db, name, name).await;
            let handle = attempts::create_or_get_attempt(
                db,
                ctx.state.settings().attempt(),
                &exam.id,
                &user.id,
            )
            .await
            .expect("attempt");
            let detail =
                attempts::attempt_detail(db, &handle.attempt.id, &user.id).await.expect("detail");
            attempts::submit_answer(
                db,
                &detail.answers[0].id,
                &user.id,
                AnswerSelection { selected_choice: Some(choice), input_answer: None },
            )
            .await
            .expect("answer");
            attempts::complete_attempt(db, &handle.attempt.id, &user.id).await.expect("complete");
        }

        test_support::end_exam_now(db, &exam.id).await;
        let (first, second) =
            tokio::join!(finalize_exam(&ctx.state, &exam.id), finalize_exam(&ctx.state, &exam.id));
        let mut outcomes = [first.expect("first"), second.expect("second")];
        outcomes.sort_by_key(|outcome| outcome.label());

        let closed = FinalizeOutcome::Closed { ranked: 2, force_completed: 0 };
        assert!(
            outcomes == [closed, FinalizeOutcome::LockContention]
                || outcomes == [FinalizeOutcome::AlreadyClosed, closed],
            "unexpected outcomes {outcomes:?}"
        );

        let page = get_leaderboard(
            db,
            &exam.id,
            LeaderboardView::Overall(LeaderboardOrder::Rank),
            0,
            10,
        )
        .await
        .expect("leaderboard");
        let LeaderboardPage::Overall { rows, total_count } = page else {
            panic!("expected overall page");
        };
        assert_eq!(total_count, 2);
        assert_eq!(rows[0].total_score, Some(5));
        assert_eq!(rows[0].overall_rank, Some(1));
        assert_eq!(rows[1].total_score, Some(-1));
        assert_eq!(rows[1].overall_percentile, Some(50.0));

        let exam =
            repositories::exams::find_by_id(db, &exam.id).await.expect("query").expect("exam");
        assert!(exam.closed);

        let standings_before = standings(db, &exam.id).await;
        let stats_before = category_stats(db, &rows[0].user_id).await;
        assert_eq!(stats_before.0, 1);

        let late = finalize_exam(&ctx.state, &exam.id).await.expect("late");
        assert_eq!(late, FinalizeOutcome::AlreadyClosed);
        assert_eq!(standings(db, &exam.id).await, standings_before);
        assert_eq!(category_stats(db, &rows[0].user_id).await, stats_before);
    }

    #[tokio::test]
    async fn running_exam_is_left_open() {
        let Some(ctx) = test_support::setup_test_context().await else {
            return;
        };
        let db = ctx.state.db();

        let topic = test_support::insert_topic(db, "Reasoning").await;
        let question = test_support::insert_choice_question(db, &topic.id, 2).await;
        let exam =
            test_support::create_open_exam(&ctx.state, ExamCategory::Gate, 2026, &[&question])
                .await;
        let user = test_support::insert_user(db, "kim", "Kim Lee").await;
        let handle =
            attempts::create_or_get_attempt(db, ctx.state.settings().attempt(), &exam.id, &user.id)
                .await
                .expect("attempt");

        let outcome = finalize_exam(&ctx.state, &exam.id).await.expect("outcome");
        assert_eq!(outcome, FinalizeOutcome::NotYetDue { end_time: exam.end_time });
        assert_eq!(outcome.label(), "not_yet_due");

        let stored =
            repositories::exams::find_by_id(db, &exam.id).await.expect("query").expect("exam");
        assert!(!stored.closed);
        let attempt = repositories::attempts::find_by_id(db, &handle.attempt.id)
            .await
            .expect("query")
            .expect("attempt");
        assert!(!attempt.completed);
        assert!(attempt.completed_at.is_none());
    }

    type StandingSnapshot = (
        String,
        Option<i32>,
        Option<i32>,
        Option<f64>,
        BTreeMap<String, i32>,
        BTreeMap<String, f64>,
        PrimitiveDateTime,
    );

    async fn standings(db: &PgPool, exam_id: &str) -> Vec<StandingSnapshot> {
        repositories::attempts::list_scored_for_exam(db, exam_id)
            .await
            .expect("attempts")
            .into_iter()
            .map(|attempt| {
                (
                    attempt.id,
                    attempt.total_score,
                    attempt.overall_rank,
                    attempt.overall_percentile,
                    attempt.subject_ranks.0,
                    attempt.subject_percentiles.0,
                    attempt.updated_at,
                )
            })
            .collect()
    }

    async fn category_stats(db: &PgPool, user_id: &str) -> (i32, Option<f64>, Option<i32>) {
        let stats = repositories::stats::find_category(db, user_id, ExamCategory::Cat)
            .await
            .expect("query")
            .expect("category stats");
        (stats.tests_taken, stats.average_score, stats.highest_score)
    }
}
