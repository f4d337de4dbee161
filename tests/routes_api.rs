#![cfg(feature = "inmem-store")]

use actix_web::{test, App};
use futurelog::auth::create_jwt;
use futurelog::models::*;
use futurelog::rate_limit::{InMemoryRateLimiter, RateLimitConfig, RateLimiterFacade};
use futurelog::repo::inmem::InMemRepo;
use futurelog::repo::RepoResult;
use futurelog::routes::{config, AppState};
use futurelog::security::SecurityHeaders;
use serial_test::serial;
use std::sync::Arc;

// Helper to ensure JWT secret present & unique temp data dir per test.
// The returned guard keeps the directory alive for the test's duration.
fn setup_env() -> tempfile::TempDir {
    std::env::set_var("JWT_SECRET", "test-secret-must-be-32-bytes-long!!");
    let tmp = tempfile::tempdir().unwrap();
    std::env::set_var("FUTURELOG_DATA_DIR", tmp.path().to_str().unwrap());
    tmp
}

fn token(user_id: i64) -> String {
    create_jwt(user_id).unwrap()
}

macro_rules! app {
    () => {
        app!(RateLimiterFacade::disabled())
    };
    ($limiter:expr) => {
        test::init_service(
            App::new()
                .wrap(SecurityHeaders::from_env())
                .app_data(actix_web::web::Data::new(AppState {
                    repo: Arc::new(InMemRepo::new()),
                    limiter: $limiter,
                }))
                .configure(config),
        )
        .await
    };
}

macro_rules! create_diary {
    ($app:expr, $user:expr, $body:expr) => {{
        let req = test::TestRequest::post()
            .uri("/diary")
            .insert_header(("Authorization", format!("Bearer {}", token($user))))
            .set_json(&$body)
            .to_request();
        let resp = test::call_service(&$app, req).await;
        assert_eq!(resp.status(), 201);
        let v: serde_json::Value = serde_json::from_slice(&test::read_body(resp).await).unwrap();
        v
    }};
}

fn sample_diary() -> serde_json::Value {
    serde_json::json!({
        "title": "Passed the exam",
        "content": "Months of evening study finally paid off today.",
        "emotions": ["happy"],
        "topics": ["growth"],
        "metadata": {"sentimentScore": 0.8}
    })
}

#[actix_web::test]
#[serial]
async fn feedback_generate_fetch_and_regenerate() {
    let _data_dir = setup_env();
    let app = app!();
    let diary = create_diary!(app, 1, sample_diary());
    let diary_id = diary["id"].as_i64().unwrap();

    // no body: defaults to emotional/encouraging
    let req = test::TestRequest::post()
        .uri(&format!("/diary/{diary_id}/future-feedback"))
        .insert_header(("Authorization", format!("Bearer {}", token(1))))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);
    let fb: serde_json::Value = serde_json::from_slice(&test::read_body(resp).await).unwrap();
    assert_eq!(fb["type"], "emotional");
    assert_eq!(fb["style"], "encouraging");
    assert_eq!(fb["diaryId"].as_i64().unwrap(), diary_id);
    // the synthesized text references the diary's primary emotion
    assert!(fb["content"].as_str().unwrap().contains("happy"));
    assert!(fb.get("rating").is_none());
    let first_id = fb["id"].as_i64().unwrap();

    // fetching returns the stored record
    let req = test::TestRequest::get()
        .uri(&format!("/diary/{diary_id}/future-feedback"))
        .insert_header(("Authorization", format!("Bearer {}", token(1))))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);
    let got: serde_json::Value = serde_json::from_slice(&test::read_body(resp).await).unwrap();
    assert_eq!(got["id"].as_i64().unwrap(), first_id);

    // regeneration rewrites in place under the same id
    let req = test::TestRequest::post()
        .uri(&format!("/diary/{diary_id}/future-feedback"))
        .insert_header(("Authorization", format!("Bearer {}", token(1))))
        .set_json(&serde_json::json!({"type": "thinking", "style": "analytical"}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);
    let regen: serde_json::Value = serde_json::from_slice(&test::read_body(resp).await).unwrap();
    assert_eq!(regen["id"].as_i64().unwrap(), first_id);
    assert_eq!(regen["type"], "thinking");
    assert_eq!(regen["style"], "analytical");
}

#[actix_web::test]
#[serial]
async fn feedback_hidden_behind_ownership() {
    let _data_dir = setup_env();
    let app = app!();
    let diary = create_diary!(app, 1, sample_diary());
    let diary_id = diary["id"].as_i64().unwrap();

    // a stranger sees 404, not 403, for both generate and fetch
    for req in [
        test::TestRequest::post()
            .uri(&format!("/diary/{diary_id}/future-feedback"))
            .insert_header(("Authorization", format!("Bearer {}", token(2))))
            .to_request(),
        test::TestRequest::get()
            .uri(&format!("/diary/{diary_id}/future-feedback"))
            .insert_header(("Authorization", format!("Bearer {}", token(2))))
            .to_request(),
    ] {
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 404);
    }

    // missing diary
    let req = test::TestRequest::post()
        .uri("/diary/9999/future-feedback")
        .insert_header(("Authorization", format!("Bearer {}", token(1))))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 404);

    // fetch before any generation
    let req = test::TestRequest::get()
        .uri(&format!("/diary/{diary_id}/future-feedback"))
        .insert_header(("Authorization", format!("Bearer {}", token(1))))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 404);
}

#[actix_web::test]
#[serial]
async fn rating_validation_and_ownership() {
    let _data_dir = setup_env();
    let app = app!();
    let diary = create_diary!(app, 1, sample_diary());
    let diary_id = diary["id"].as_i64().unwrap();
    let req = test::TestRequest::post()
        .uri(&format!("/diary/{diary_id}/future-feedback"))
        .insert_header(("Authorization", format!("Bearer {}", token(1))))
        .to_request();
    let fb: serde_json::Value =
        serde_json::from_slice(&test::read_body(test::call_service(&app, req).await).await).unwrap();
    let fb_id = fb["id"].as_i64().unwrap();

    // out-of-range and non-integer scores are 400s
    for score in [serde_json::json!(0), serde_json::json!(6), serde_json::json!(3.5)] {
        let req = test::TestRequest::post()
            .uri(&format!("/feedback/{fb_id}/rating"))
            .insert_header(("Authorization", format!("Bearer {}", token(1))))
            .set_json(&serde_json::json!({"score": score.clone()}))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 400, "score {score} should be rejected");
    }

    // someone else's feedback
    let req = test::TestRequest::post()
        .uri(&format!("/feedback/{fb_id}/rating"))
        .insert_header(("Authorization", format!("Bearer {}", token(2))))
        .set_json(&serde_json::json!({"score": 5}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 403);

    // valid rating with tags
    let req = test::TestRequest::post()
        .uri(&format!("/feedback/{fb_id}/rating"))
        .insert_header(("Authorization", format!("Bearer {}", token(1))))
        .set_json(&serde_json::json!({"score": 5, "tags": ["useful"]}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);
    let body: serde_json::Value = serde_json::from_slice(&test::read_body(resp).await).unwrap();
    assert_eq!(body["msg"], "Rating submitted successfully");

    // missing feedback
    let req = test::TestRequest::post()
        .uri("/feedback/9999/rating")
        .insert_header(("Authorization", format!("Bearer {}", token(1))))
        .set_json(&serde_json::json!({"score": 3}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 404);
}

#[actix_web::test]
#[serial]
async fn conversation_tone_follows_current_rating() {
    let _data_dir = setup_env();
    let app = app!();
    let diary = create_diary!(app, 1, sample_diary());
    let diary_id = diary["id"].as_i64().unwrap();
    let req = test::TestRequest::post()
        .uri(&format!("/diary/{diary_id}/future-feedback"))
        .insert_header(("Authorization", format!("Bearer {}", token(1))))
        .to_request();
    let fb: serde_json::Value =
        serde_json::from_slice(&test::read_body(test::call_service(&app, req).await).await).unwrap();
    let fb_id = fb["id"].as_i64().unwrap();

    // blank messages are refused
    let req = test::TestRequest::post()
        .uri(&format!("/feedback/{fb_id}/conversation"))
        .insert_header(("Authorization", format!("Bearer {}", token(1))))
        .set_json(&serde_json::json!({"message": "   "}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 400);

    // high rating: grateful opener
    let req = test::TestRequest::post()
        .uri(&format!("/feedback/{fb_id}/rating"))
        .insert_header(("Authorization", format!("Bearer {}", token(1))))
        .set_json(&serde_json::json!({"score": 5}))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 200);

    let req = test::TestRequest::post()
        .uri(&format!("/feedback/{fb_id}/conversation"))
        .insert_header(("Authorization", format!("Bearer {}", token(1))))
        .set_json(&serde_json::json!({"message": "was it really that good?"}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);
    let turn: serde_json::Value = serde_json::from_slice(&test::read_body(resp).await).unwrap();
    assert_eq!(turn["message"], "was it really that good?");
    assert!(turn["response"].as_str().unwrap().to_lowercase().contains("thank"));
    assert!(turn.get("createdAt").is_some());

    // low rating flips the opener on the next turn
    let req = test::TestRequest::post()
        .uri(&format!("/feedback/{fb_id}/rating"))
        .insert_header(("Authorization", format!("Bearer {}", token(1))))
        .set_json(&serde_json::json!({"score": 1, "tags": ["wrong_style"]}))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 200);

    let req = test::TestRequest::post()
        .uri(&format!("/feedback/{fb_id}/conversation"))
        .insert_header(("Authorization", format!("Bearer {}", token(1))))
        .set_json(&serde_json::json!({"message": "that tone was off"}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);
    let turn: serde_json::Value = serde_json::from_slice(&test::read_body(resp).await).unwrap();
    assert!(turn["response"].as_str().unwrap().to_lowercase().contains("sorry"));

    // both turns are preserved in order
    let req = test::TestRequest::get()
        .uri(&format!("/diary/{diary_id}/future-feedback"))
        .insert_header(("Authorization", format!("Bearer {}", token(1))))
        .to_request();
    let got: serde_json::Value =
        serde_json::from_slice(&test::read_body(test::call_service(&app, req).await).await).unwrap();
    let convs = got["conversations"].as_array().unwrap();
    assert_eq!(convs.len(), 2);
    assert_eq!(convs[0]["message"], "was it really that good?");
    assert_eq!(convs[1]["message"], "that tone was off");

    // only the owner may converse
    let req = test::TestRequest::post()
        .uri(&format!("/feedback/{fb_id}/conversation"))
        .insert_header(("Authorization", format!("Bearer {}", token(2))))
        .set_json(&serde_json::json!({"message": "hello"}))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 403);
}

#[actix_web::test]
#[serial]
async fn generation_is_rate_limited() {
    let _data_dir = setup_env();
    std::env::set_var("RL_FEEDBACK_LIMIT", "2");
    std::env::set_var("RL_FEEDBACK_WINDOW", "60");
    let limiter = RateLimiterFacade::new(InMemoryRateLimiter::new(true), RateLimitConfig::from_env());
    std::env::remove_var("RL_FEEDBACK_LIMIT");
    std::env::remove_var("RL_FEEDBACK_WINDOW");

    let app = app!(limiter);
    let diary = create_diary!(app, 1, sample_diary());
    let diary_id = diary["id"].as_i64().unwrap();

    for expected in [200, 200, 429] {
        let req = test::TestRequest::post()
            .uri(&format!("/diary/{diary_id}/future-feedback"))
            .insert_header(("Authorization", format!("Bearer {}", token(1))))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), expected);
    }

    // a different user is unaffected
    let diary2 = create_diary!(app, 2, sample_diary());
    let req = test::TestRequest::post()
        .uri(&format!("/diary/{}/future-feedback", diary2["id"].as_i64().unwrap()))
        .insert_header(("Authorization", format!("Bearer {}", token(2))))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 200);
}

#[actix_web::test]
#[serial]
async fn missing_or_bad_token_is_unauthorized() {
    let _data_dir = setup_env();
    let app = app!();

    let req = test::TestRequest::post()
        .uri("/diary/1/future-feedback")
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 401);

    let req = test::TestRequest::post()
        .uri("/diary/1/future-feedback")
        .insert_header(("Authorization", "Bearer not-a-jwt"))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 401);
}

#[actix_web::test]
#[serial]
async fn security_headers_present() {
    let _data_dir = setup_env();
    let app = app!();
    let req = test::TestRequest::get()
        .uri("/diary/1")
        .insert_header(("Authorization", format!("Bearer {}", token(1))))
        .to_request();
    let resp = test::call_service(&app, req).await;
    let headers = resp.headers();
    assert_eq!(headers.get("x-content-type-options").unwrap(), "nosniff");
    assert_eq!(headers.get("x-frame-options").unwrap(), "DENY");
    assert!(headers.get("content-security-policy").is_some());
}

/// Storage double where every operation fails like a dead database.
struct UnreachableStore;

fn down() -> futurelog::repo::RepoError {
    futurelog::repo::RepoError::Internal("connection refused".into())
}

#[async_trait::async_trait]
impl futurelog::repo::DiaryRepo for UnreachableStore {
    async fn create_diary(&self, _: NewDiary) -> RepoResult<Diary> {
        Err(down())
    }
    async fn get_diary(&self, _: Id) -> RepoResult<Diary> {
        Err(down())
    }
}

#[async_trait::async_trait]
impl futurelog::repo::ShareRepo for UnreachableStore {
    async fn share_with_friends(
        &self,
        _: Id,
        _: Id,
        _: &[Id],
        _: &ShareSettings,
    ) -> RepoResult<u32> {
        Err(down())
    }
    async fn get_share(&self, _: Id, _: Id) -> RepoResult<Option<DiaryShare>> {
        Err(down())
    }
    async fn add_comment(&self, _: NewComment) -> RepoResult<DiaryComment> {
        Err(down())
    }
    async fn list_future_comments(&self, _: Id, _: Id) -> RepoResult<Vec<FriendComment>> {
        Err(down())
    }
}

#[async_trait::async_trait]
impl futurelog::repo::FeedbackRepo for UnreachableStore {
    async fn find_feedback_by_diary(&self, _: Id) -> RepoResult<Option<FutureFeedback>> {
        Err(down())
    }
    async fn get_feedback(&self, _: Id) -> RepoResult<FutureFeedback> {
        Err(down())
    }
    async fn upsert_feedback(&self, _: NewFeedback) -> RepoResult<FutureFeedback> {
        Err(down())
    }
    async fn update_rating(&self, _: Id, _: Rating) -> RepoResult<()> {
        Err(down())
    }
    async fn append_conversation(&self, _: Id, _: &str, _: &str) -> RepoResult<ConversationMessage> {
        Err(down())
    }
}

#[async_trait::async_trait]
impl futurelog::repo::FriendRepo for UnreachableStore {
    async fn send_friend_request(
        &self,
        _: Id,
        _: Id,
        _: Option<String>,
    ) -> RepoResult<FriendRequest> {
        Err(down())
    }
    async fn get_friend_request(&self, _: Id) -> RepoResult<FriendRequest> {
        Err(down())
    }
    async fn list_pending_requests(&self, _: Id) -> RepoResult<Vec<FriendRequest>> {
        Err(down())
    }
    async fn respond_friend_request(&self, _: Id, _: bool) -> RepoResult<()> {
        Err(down())
    }
    async fn are_friends(&self, _: Id, _: Id) -> RepoResult<bool> {
        Err(down())
    }
    async fn list_friends(&self, _: Id) -> RepoResult<Vec<Id>> {
        Err(down())
    }
}

#[actix_web::test]
#[serial]
async fn storage_failures_surface_as_server_errors() {
    let _data_dir = setup_env();
    let app = test::init_service(
        App::new()
            .app_data(actix_web::web::Data::new(AppState {
                repo: Arc::new(UnreachableStore),
                limiter: RateLimiterFacade::disabled(),
            }))
            .configure(config),
    )
    .await;

    // a dead store is a 500, never a 404, and the detail stays internal
    for req in [
        test::TestRequest::get()
            .uri("/diary/1")
            .insert_header(("Authorization", format!("Bearer {}", token(1))))
            .to_request(),
        test::TestRequest::get()
            .uri("/diary/1/future-feedback")
            .insert_header(("Authorization", format!("Bearer {}", token(1))))
            .to_request(),
        test::TestRequest::post()
            .uri("/diary/1/future-feedback")
            .insert_header(("Authorization", format!("Bearer {}", token(1))))
            .to_request(),
        test::TestRequest::post()
            .uri("/feedback/1/rating")
            .insert_header(("Authorization", format!("Bearer {}", token(1))))
            .set_json(&serde_json::json!({"score": 3}))
            .to_request(),
        test::TestRequest::post()
            .uri("/feedback/1/conversation")
            .insert_header(("Authorization", format!("Bearer {}", token(1))))
            .set_json(&serde_json::json!({"message": "hello"}))
            .to_request(),
        test::TestRequest::post()
            .uri("/friends/request/1/respond")
            .insert_header(("Authorization", format!("Bearer {}", token(1))))
            .set_json(&serde_json::json!({"accept": true}))
            .to_request(),
    ] {
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 500);
        let body: serde_json::Value = serde_json::from_slice(&test::read_body(resp).await).unwrap();
        assert_eq!(body["message"], "server error");
    }
}
