use std::sync::Arc;

use axum::http::StatusCode;
use serde_json::json;

mod common;

use common::{
    create_session, create_test_app, create_test_app_with_upload_limit, generated_session, jpeg_data_uri, send,
    send_raw, wait_until_settled, FakeService, PNG_DATA_URI,
};

#[tokio::test]
async fn test_health_reports_service_and_exam() {
    let app = create_test_app();
    let (status, json) = send(&app, "GET", "/api/v1/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["ok"], true);
    assert_eq!(json["promptService"], "fake");
    assert_eq!(json["exam"], "NEET");
}

#[tokio::test]
async fn test_new_session_is_idle() {
    let app = create_test_app();
    let id = create_session(&app).await;
    let (status, json) = send(&app, "GET", &format!("/api/v1/sessions/{id}"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["sessionId"], id.as_str());
    assert_eq!(json["stage"], "idle");
    assert_eq!(json["progress"], 0);
    assert_eq!(json["questionCount"], 0);
    assert!(json["imagePreview"].is_null());
}

#[tokio::test]
async fn test_generate_installs_ten_questions() {
    let app = create_test_app();
    let id = generated_session(&app).await;

    let (_, snap) = send(&app, "GET", &format!("/api/v1/sessions/{id}"), None).await;
    assert_eq!(snap["progress"], 100);
    assert_eq!(snap["status"], "Test generated successfully!");
    assert_eq!(snap["questionCount"], 10);
    assert!(snap["error"].is_null());
    assert!(snap["imagePreview"].as_str().unwrap().starts_with("data:image/png;base64,"));
}

#[tokio::test]
async fn test_generate_without_image_is_rejected() {
    let app = create_test_app();
    let id = create_session(&app).await;
    let (status, json) = send(&app, "POST", &format!("/api/v1/sessions/{id}/generate"), Some(json!({}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["kind"], "no_input");

    let (_, snap) = send(&app, "GET", &format!("/api/v1/sessions/{id}"), None).await;
    assert_eq!(snap["stage"], "idle");
}

#[tokio::test]
async fn test_generate_with_non_image_type_is_rejected() {
    let app = create_test_app();
    let id = create_session(&app).await;
    let body = json!({ "imageBase64": "AQID", "mime": "application/pdf" });
    let (status, json) = send(&app, "POST", &format!("/api/v1/sessions/{id}/generate"), Some(body)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["kind"], "invalid_image");
}

#[tokio::test]
async fn test_blank_extraction_fails_the_run() {
    let app = common::create_test_app_with(Arc::new(FakeService { text: "   ".into() }));
    let id = create_session(&app).await;
    let body = json!({ "imageDataUri": PNG_DATA_URI });
    let (status, _) = send(&app, "POST", &format!("/api/v1/sessions/{id}/generate"), Some(body)).await;
    assert_eq!(status, StatusCode::ACCEPTED);

    let snap = wait_until_settled(&app, &id).await;
    assert_eq!(snap["stage"], "failed");
    assert_eq!(snap["status"], "Failed. Please try again.");
    assert_eq!(snap["questionCount"], 0);
    assert!(snap["error"].as_str().unwrap().contains("No text could be extracted"));
}

#[tokio::test]
async fn test_quiz_view_hides_answer_key() {
    let app = create_test_app();
    let id = generated_session(&app).await;

    let (status, view) = send(&app, "GET", &format!("/api/v1/sessions/{id}/quiz"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(view["index"], 0);
    assert_eq!(view["total"], 10);
    assert_eq!(view["elapsed"], "00:00");
    assert!(view.get("correctAnswerIndex").is_none());
    assert!(!view.to_string().contains("correct"));

    let (_, view) = send(&app, "POST", &format!("/api/v1/sessions/{id}/quiz/goto"), Some(json!({ "index": 3 }))).await;
    assert_eq!(view["difficultyNote"], "Pure recall.");
}

#[tokio::test]
async fn test_navigation_clamps_and_rejects_out_of_range() {
    let app = create_test_app();
    let id = generated_session(&app).await;

    let (_, view) = send(&app, "POST", &format!("/api/v1/sessions/{id}/quiz/previous"), None).await;
    assert_eq!(view["index"], 0);
    let (_, view) = send(&app, "POST", &format!("/api/v1/sessions/{id}/quiz/next"), None).await;
    assert_eq!(view["index"], 1);

    let (status, json) = send(&app, "POST", &format!("/api/v1/sessions/{id}/quiz/goto"), Some(json!({ "index": 10 }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["kind"], "question_out_of_range");
}

#[tokio::test]
async fn test_answer_submit_and_results() {
    let app = create_test_app();
    let id = generated_session(&app).await;

    // Correct answers are i % 4; get questions 0, 1, 2 right and 3 wrong.
    for (q, opt) in [(0, 0), (1, 1), (2, 2), (3, 0)] {
        let body = json!({ "questionIndex": q, "optionIndex": opt });
        let (status, _) = send(&app, "POST", &format!("/api/v1/sessions/{id}/quiz/answer"), Some(body)).await;
        assert_eq!(status, StatusCode::OK);
    }

    let (status, json) = send(&app, "POST", &format!("/api/v1/sessions/{id}/quiz/answer"), Some(json!({ "optionIndex": 4 }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["kind"], "option_out_of_range");

    let (status, json) = send(&app, "GET", &format!("/api/v1/sessions/{id}/results"), None).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(json["kind"], "results_not_ready");

    let (status, results) = send(&app, "POST", &format!("/api/v1/sessions/{id}/quiz/submit"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(results["score"], 30);
    assert_eq!(results["correctAnswersCount"], 3);
    assert_eq!(results["totalQuestions"], 10);
    assert_eq!(results["passed"], false);
    assert_eq!(results["breakdown"].as_array().unwrap().len(), 10);
    assert_eq!(results["breakdown"][3]["isCorrect"], false);

    let (status, again) = send(&app, "GET", &format!("/api/v1/sessions/{id}/results"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(again, results);
}

#[tokio::test]
async fn test_double_submit_is_conflict() {
    let app = create_test_app();
    let id = generated_session(&app).await;
    send(&app, "GET", &format!("/api/v1/sessions/{id}/quiz"), None).await;

    let (status, _) = send(&app, "POST", &format!("/api/v1/sessions/{id}/quiz/submit"), None).await;
    assert_eq!(status, StatusCode::OK);
    let (status, json) = send(&app, "POST", &format!("/api/v1/sessions/{id}/quiz/submit"), None).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(json["kind"], "already_submitted");
}

#[tokio::test]
async fn test_quiz_before_generation_is_conflict() {
    let app = create_test_app();
    let id = create_session(&app).await;
    let (status, json) = send(&app, "GET", &format!("/api/v1/sessions/{id}/quiz"), None).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(json["kind"], "no_questions");
}

#[tokio::test]
async fn test_reset_returns_to_idle() {
    let app = create_test_app();
    let id = generated_session(&app).await;
    let (status, snap) = send(&app, "POST", &format!("/api/v1/sessions/{id}/reset"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(snap["stage"], "idle");
    assert_eq!(snap["questionCount"], 0);
    assert!(snap["imagePreview"].is_null());
}

#[tokio::test]
async fn test_unknown_session_is_not_found() {
    let app = create_test_app();
    for (method, path) in [
        ("GET", "/api/v1/sessions/nope"),
        ("GET", "/api/v1/sessions/nope/quiz"),
        ("POST", "/api/v1/sessions/nope/quiz/submit"),
        ("DELETE", "/api/v1/sessions/nope"),
    ] {
        let (status, json) = send(&app, method, path, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND, "{method} {path}");
        assert_eq!(json["kind"], "unknown_session");
    }
}

#[tokio::test]
async fn test_delete_session() {
    let app = create_test_app();
    let id = create_session(&app).await;
    let (status, _) = send(&app, "DELETE", &format!("/api/v1/sessions/{id}"), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = send(&app, "GET", &format!("/api/v1/sessions/{id}"), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_phone_sized_photo_is_accepted() {
    let app = create_test_app();
    let id = create_session(&app).await;
    // A 3-4 MB photo is about 5 MB once base64-encoded.
    let body = json!({ "imageDataUri": jpeg_data_uri(5 * 1024 * 1024) });
    let (status, json) = send(&app, "POST", &format!("/api/v1/sessions/{id}/generate"), Some(body)).await;
    assert_eq!(status, StatusCode::ACCEPTED, "{json}");

    let snap = wait_until_settled(&app, &id).await;
    assert_eq!(snap["stage"], "succeeded");
    assert!(snap["imagePreview"].as_str().unwrap().starts_with("data:image/jpeg;base64,"));
}

#[tokio::test]
async fn test_upload_over_limit_is_json_413() {
    let app = create_test_app_with_upload_limit(64 * 1024);
    let id = create_session(&app).await;
    let body = json!({ "imageDataUri": jpeg_data_uri(128 * 1024) });
    let (status, json) = send(&app, "POST", &format!("/api/v1/sessions/{id}/generate"), Some(body)).await;
    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(json["kind"], "payload_too_large");
    assert!(json["error"].is_string());

    let (_, snap) = send(&app, "GET", &format!("/api/v1/sessions/{id}"), None).await;
    assert_eq!(snap["stage"], "idle");
}

#[tokio::test]
async fn test_malformed_bodies_get_json_errors() {
    let app = create_test_app();
    let id = generated_session(&app).await;

    let (status, json) = send(
        &app,
        "POST",
        &format!("/api/v1/sessions/{id}/quiz/answer"),
        Some(json!({ "optionIndex": -1 })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["kind"], "bad_request");
    assert!(json["error"].as_str().unwrap().contains("optionIndex"));

    let (status, json) =
        send_raw(&app, "POST", &format!("/api/v1/sessions/{id}/quiz/goto"), Some("{\"index\":".into())).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["kind"], "bad_request");

    let (status, json) = send(&app, "POST", &format!("/api/v1/sessions/{id}/quiz/answer"), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["kind"], "bad_request");

    // Nothing was recorded and the quiz clock was not started by the bad requests.
    let (_, snap) = send(&app, "GET", &format!("/api/v1/sessions/{id}"), None).await;
    assert_eq!(snap["answeredCount"], 0);
    assert!(snap["startedAt"].is_null());
}
