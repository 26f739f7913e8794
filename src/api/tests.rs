use axum::http::{Method, StatusCode};
use serde_json::json;
use time::format_description::well_known::Rfc3339;
use time::{Duration, OffsetDateTime};
use tower::ServiceExt;

use crate::db::types::ExamCategory;
use crate::test_support::{self, TestContext};

async fn send(
    ctx: &TestContext,
    method: Method,
    uri: &str,
    user_id: Option<&str>,
    body: Option<serde_json::Value>,
) -> (StatusCode, serde_json::Value) {
    let response = ctx
        .app
        .clone()
        .oneshot(test_support::json_request(method, uri, user_id, body))
        .await
        .expect("response");
    let status = response.status();
    (status, test_support::read_json(response).await)
}

fn answer_id_for(detail: &serde_json::Value, question_id: &str) -> String {
    detail["answers"]
        .as_array()
        .expect("answers")
        .iter()
        .find(|answer| answer["question_id"] == question_id)
        .and_then(|answer| answer["id"].as_str())
        .expect("answer for question")
        .to_string()
}

#[tokio::test]
async fn exam_lifecycle_from_attempt_to_prediction() {
    let Some(ctx) = test_support::setup_test_context().await else {
        return;
    };
    let db = ctx.state.db();

    let algebra = test_support::insert_topic(db, "Algebra").await;
    let geography = test_support::insert_topic(db, "Geography").await;
    let q1 = test_support::insert_choice_question(db, &algebra.id, 2).await;
    let q2 = test_support::insert_choice_question(db, &algebra.id, 3).await;
    let q3 = test_support::insert_puzzle_question(db, &geography.id, "Paris").await;

    let asha = test_support::insert_user(db, "asha", "Asha Rao").await;
    let bilal = test_support::insert_user(db, "bilal", "Bilal Khan").await;
    let chen = test_support::insert_user(db, "chen", "Chen Wei").await;

    let now = OffsetDateTime::now_utc().replace_nanosecond(0).expect("nanoseconds");
    let (status, exam) = send(
        &ctx,
        Method::POST,
        "/api/v1/exams",
        None,
        Some(json!({
            "title": "JEE Main Mock 1",
            "category": "jee_main",
            "year": 2026,
            "start_time": (now - Duration::hours(1)).format(&Rfc3339).unwrap(),
            "end_time": (now + Duration::hours(2)).format(&Rfc3339).unwrap(),
            "duration_minutes": 90,
            "max_marks": 12,
            "question_ids": [q1.id, q2.id, q3.id]
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{exam}");
    assert!(exam["finalize_job_id"].is_string());
    assert_eq!(exam["marks_per_correct"], 4);
    let exam_id = exam["id"].as_str().expect("exam id").to_string();

    let mut attempts = Vec::new();
    for user in [&asha, &bilal, &chen] {
        let uri = format!("/api/v1/exams/{exam_id}/attempts");
        let (status, attempt) = send(&ctx, Method::POST, &uri, Some(&user.id), None).await;
        assert_eq!(status, StatusCode::CREATED, "{attempt}");

        let (status, again) = send(&ctx, Method::POST, &uri, Some(&user.id), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(again["id"], attempt["id"]);

        attempts.push(attempt["id"].as_str().expect("attempt id").to_string());
    }

    let mut details = Vec::new();
    for (user, attempt_id) in [&asha, &bilal, &chen].into_iter().zip(&attempts) {
        let uri = format!("/api/v1/attempts/{attempt_id}");
        let (status, detail) = send(&ctx, Method::GET, &uri, Some(&user.id), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(detail["answers"].as_array().map(Vec::len), Some(3));
        details.push(detail);
    }

    let submissions = [
        (&asha, &details[0], &q1.id, json!({ "selected_choice": 2 })),
        (&asha, &details[0], &q2.id, json!({ "selected_choice": 3 })),
        (&asha, &details[0], &q3.id, json!({ "answer_text": "  paris " })),
        (&bilal, &details[1], &q1.id, json!({ "selected_choice": 2 })),
        (&bilal, &details[1], &q2.id, json!({ "selected_choice": 1 })),
        (&chen, &details[2], &q1.id, json!({ "selected_choice": 2 })),
    ];
    for (user, detail, question_id, body) in submissions {
        let uri = format!("/api/v1/answers/{}", answer_id_for(detail, question_id));
        let (status, answer) = send(&ctx, Method::PUT, &uri, Some(&user.id), Some(body)).await;
        assert_eq!(status, StatusCode::OK, "{answer}");
        assert_eq!(answer["completed"], true);
        assert!(answer.get("is_correct").is_none());
    }

    let uri = format!("/api/v1/answers/{}", answer_id_for(&details[1], &q3.id));
    let (status, _) = send(&ctx, Method::PUT, &uri, Some(&bilal.id), Some(json!({}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let uri = format!("/api/v1/attempts/{}/complete", attempts[0]);
    let (status, completed) = send(&ctx, Method::POST, &uri, Some(&asha.id), None).await;
    assert_eq!(status, StatusCode::OK, "{completed}");
    assert_eq!(completed["total_score"], 12);
    let (status, _) = send(&ctx, Method::POST, &uri, Some(&asha.id), None).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let uri = format!("/api/v1/attempts/{}/complete", attempts[1]);
    let (status, completed) = send(&ctx, Method::POST, &uri, Some(&bilal.id), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(completed["total_score"], 3);

    let leaderboard_uri = format!("/api/v1/exams/{exam_id}/leaderboard");
    let (status, _) = send(&ctx, Method::GET, &leaderboard_uri, None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let finalize_uri = format!("/api/v1/exams/{exam_id}/finalize");
    let (status, _) = send(&ctx, Method::POST, &finalize_uri, None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let (status, early) = send(&ctx, Method::POST, &finalize_uri, Some(&asha.id), None).await;
    assert_eq!(status, StatusCode::CONFLICT, "{early}");
    let uri = format!("/api/v1/attempts/{}", attempts[2]);
    let (_, still_open) = send(&ctx, Method::GET, &uri, Some(&chen.id), None).await;
    assert_eq!(still_open["completed"], false);

    test_support::end_exam_now(db, &exam_id).await;
    let (status, outcome) = send(&ctx, Method::POST, &finalize_uri, Some(&asha.id), None).await;
    assert_eq!(status, StatusCode::OK, "{outcome}");
    assert_eq!(outcome["outcome"], "closed");
    assert_eq!(outcome["ranked"], 3);
    assert_eq!(outcome["force_completed"], 1);

    let (status, board) = send(&ctx, Method::GET, &leaderboard_uri, None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(board["total_count"], 3);
    let rows: Vec<(String, i64, f64)> = board["items"]
        .as_array()
        .expect("items")
        .iter()
        .map(|row| {
            (
                row["user_id"].as_str().expect("user").to_string(),
                row["overall_rank"].as_i64().expect("rank"),
                row["overall_percentile"].as_f64().expect("percentile"),
            )
        })
        .collect();
    assert_eq!(
        rows,
        vec![
            (asha.id.clone(), 1, 100.0),
            (chen.id.clone(), 2, 66.67),
            (bilal.id.clone(), 3, 33.33),
        ]
    );

    let uri = format!("{leaderboard_uri}?subject={}&limit=1", geography.id);
    let (status, subject_board) = send(&ctx, Method::GET, &uri, None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(subject_board["limit"], 1);
    assert_eq!(subject_board["items"][0]["user_id"], asha.id);
    assert_eq!(subject_board["items"][0]["subject_rank"], 1);

    let (status, again) = send(&ctx, Method::POST, &finalize_uri, Some(&bilal.id), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(again["outcome"], "already_closed");

    let uri = format!("/api/v1/attempts/{}", attempts[2]);
    let (_, chen_detail) = send(&ctx, Method::GET, &uri, Some(&chen.id), None).await;
    assert_eq!(chen_detail["completed"], true);
    assert_eq!(chen_detail["total_score"], 4);
    let revealed = chen_detail["answers"]
        .as_array()
        .expect("answers")
        .iter()
        .find(|answer| answer["question_id"] == q1.id.as_str())
        .expect("q1 answer");
    assert_eq!(revealed["is_correct"], true);

    let prediction_uri = format!("/api/v1/attempts/{}/prediction", attempts[0]);
    let (status, _) = send(&ctx, Method::GET, &prediction_uri, Some(&asha.id), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    test_support::insert_historical_stats(
        db,
        ExamCategory::JeeMain,
        2025,
        &[("0", 0.0), ("20", 100.0)],
        &[("0", 1000.0), ("100", 0.0)],
    )
    .await;
    let (status, prediction) =
        send(&ctx, Method::GET, &prediction_uri, Some(&asha.id), None).await;
    assert_eq!(status, StatusCode::OK, "{prediction}");
    assert_eq!(prediction["exam"], "JEE Main Mock 1");
    assert_eq!(prediction["prediction_based_on"], 2025);
    assert_eq!(prediction["user_score"], 12);
    assert_eq!(prediction["predicted_percentile"], 60.0);
    assert_eq!(prediction["predicted_rank"], 400);

    let (status, exam_stats) =
        send(&ctx, Method::GET, "/api/v1/users/me/exam-stats/jee_main", Some(&asha.id), None)
            .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(exam_stats["tests_taken"], 1);
    assert_eq!(exam_stats["highest_score"], 12);

    let (status, topic_stats) =
        send(&ctx, Method::GET, "/api/v1/users/me/topic-stats", Some(&asha.id), None).await;
    assert_eq!(status, StatusCode::OK);
    let algebra_stats = topic_stats
        .as_array()
        .expect("stats")
        .iter()
        .find(|row| row["topic_id"] == algebra.id.as_str())
        .expect("algebra stats");
    assert_eq!(algebra_stats["questions_attempted"], 2);
    assert_eq!(algebra_stats["accuracy"], 100.0);
}

#[tokio::test]
async fn closed_exam_rejects_edits_and_new_attempts() {
    let Some(ctx) = test_support::setup_test_context().await else {
        return;
    };
    let db = ctx.state.db();

    let topic = test_support::insert_topic(db, "Logic").await;
    let question = test_support::insert_choice_question(db, &topic.id, 1).await;
    let user = test_support::insert_user(db, "dana", "Dana Ivers").await;
    let exam =
        test_support::create_open_exam(&ctx.state, ExamCategory::Cat, 2026, &[&question]).await;

    test_support::end_exam_now(db, &exam.id).await;
    let finalize_uri = format!("/api/v1/exams/{}/finalize", exam.id);
    let (status, outcome) = send(&ctx, Method::POST, &finalize_uri, Some(&user.id), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(outcome["outcome"], "closed_empty");

    let (status, _) = send(
        &ctx,
        Method::PATCH,
        &format!("/api/v1/exams/{}", exam.id),
        None,
        Some(json!({ "title": "Renamed" })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = send(
        &ctx,
        Method::POST,
        &format!("/api/v1/exams/{}/attempts", exam.id),
        Some(&user.id),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, board) =
        send(&ctx, Method::GET, &format!("/api/v1/exams/{}/leaderboard", exam.id), None, None)
            .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(board["total_count"], 0);
}

#[tokio::test]
async fn moving_the_end_time_replaces_the_finalize_job() {
    let Some(ctx) = test_support::setup_test_context().await else {
        return;
    };
    let db = ctx.state.db();

    let topic = test_support::insert_topic(db, "Biology").await;
    let question = test_support::insert_choice_question(db, &topic.id, 4).await;
    let exam =
        test_support::create_open_exam(&ctx.state, ExamCategory::Neet, 2026, &[&question]).await;
    let first_job = exam.finalize_job_id.clone().expect("initial job");

    let new_end = (OffsetDateTime::now_utc() + Duration::hours(5))
        .replace_nanosecond(0)
        .expect("nanoseconds");
    let (status, updated) = send(
        &ctx,
        Method::PATCH,
        &format!("/api/v1/exams/{}", exam.id),
        None,
        Some(json!({ "end_time": new_end.format(&Rfc3339).unwrap() })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{updated}");
    let second_job = updated["finalize_job_id"].as_str().expect("new job").to_string();
    assert_ne!(second_job, first_job);

    let old = crate::repositories::finalize_jobs::find_by_id(db, &first_job)
        .await
        .expect("query")
        .expect("old job");
    assert_eq!(old.status, crate::db::types::FinalizeJobStatus::Cancelled);

    let (status, unchanged) = send(
        &ctx,
        Method::PATCH,
        &format!("/api/v1/exams/{}", exam.id),
        None,
        Some(json!({ "title": "Same window" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(unchanged["finalize_job_id"], second_job);
}

#[tokio::test]
async fn catalog_endpoints_build_the_question_bank() {
    let Some(ctx) = test_support::setup_test_context().await else {
        return;
    };

    let (status, user) = send(
        &ctx,
        Method::POST,
        "/api/v1/users",
        None,
        Some(json!({ "username": "esha", "full_name": "Esha Patel" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{user}");
    let user_id = user["id"].as_str().expect("user id").to_string();

    let (status, _) = send(
        &ctx,
        Method::POST,
        "/api/v1/users",
        None,
        Some(json!({ "username": "esha", "full_name": "Someone Else" })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, me) = send(&ctx, Method::GET, "/api/v1/users/me", Some(&user_id), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(me["username"], "esha");

    let (status, topic) =
        send(&ctx, Method::POST, "/api/v1/topics", None, Some(json!({ "title": "Geometry" })))
            .await;
    assert_eq!(status, StatusCode::CREATED, "{topic}");
    let topic_id = topic["id"].as_str().expect("topic id").to_string();

    let (status, _) =
        send(&ctx, Method::POST, "/api/v1/topics", None, Some(json!({ "title": "Geometry" })))
            .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = send(
        &ctx,
        Method::POST,
        "/api/v1/questions",
        None,
        Some(json!({ "topic_id": topic_id, "question_type": "puzzle" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(
        &ctx,
        Method::POST,
        "/api/v1/questions",
        None,
        Some(json!({
            "topic_id": "missing",
            "question_type": "single_choice",
            "correct_choice": 1
        })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, question) = send(
        &ctx,
        Method::POST,
        "/api/v1/questions",
        None,
        Some(json!({
            "topic_id": topic_id,
            "question_type": "single_choice",
            "difficulty": "hard",
            "correct_choice": 3
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{question}");
    assert_eq!(question["difficulty"], "hard");
    assert!(question.get("correct_choice").is_none());

    let (status, stats) = send(
        &ctx,
        Method::PUT,
        "/api/v1/historical-stats/gate/2025",
        None,
        Some(json!({
            "score_to_percentile": { "0": 0.0, "100": 100.0 },
            "percentile_to_rank": { "0": 5000.0, "100": 1.0 }
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{stats}");
    assert_eq!(stats["category"], "gate");
    assert_eq!(stats["year"], 2025);

    let (status, exam_stats) =
        send(&ctx, Method::GET, "/api/v1/users/me/exam-stats/gate", Some(&user_id), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(exam_stats["tests_taken"], 0);
    assert!(exam_stats["average_score"].is_null());
}
