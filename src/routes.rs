use actix_web::{web, HttpResponse};
use std::sync::Arc;

use crate::auth::Auth;
use crate::error::ApiError;
use crate::models::*;
use crate::permissions;
use crate::rate_limit::RateLimiterFacade;
use crate::repo::{Repo, RepoError};
use crate::synthesis;

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/diary").route(web::post().to(create_diary)))
        .service(web::resource("/diary/{id}").route(web::get().to(get_diary)))
        .service(
            web::resource("/diary/{id}/future-feedback")
                .route(web::get().to(get_future_feedback))
                .route(web::post().to(generate_future_feedback)),
        )
        .service(web::resource("/diary/{id}/share").route(web::post().to(share_diary)))
        .service(
            web::resource("/diary/{id}/friends-feedback").route(web::get().to(friends_feedback)),
        )
        .service(web::resource("/diary/{id}/comments").route(web::post().to(add_friend_comment)))
        .service(web::resource("/feedback/{id}/rating").route(web::post().to(submit_rating)))
        .service(
            web::resource("/feedback/{id}/conversation").route(web::post().to(add_conversation)),
        )
        .service(web::resource("/friends").route(web::get().to(list_friends)))
        .service(
            web::resource("/friends/requests/pending")
                .route(web::get().to(pending_friend_requests)),
        )
        .service(web::resource("/friends/request").route(web::post().to(send_friend_request)))
        .service(
            web::resource("/friends/request/{id}/respond")
                .route(web::post().to(respond_friend_request)),
        );
}

#[derive(Clone)]
pub struct AppState {
    pub repo: Arc<dyn Repo>,
    pub limiter: RateLimiterFacade,
}

// ---------------- diary plumbing ----------------------------------

#[derive(Debug, serde::Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateDiaryRequest {
    pub title: String,
    pub content: String,
    #[serde(default)]
    pub emotions: Vec<String>,
    #[serde(default)]
    pub topics: Vec<String>,
    #[serde(default)]
    pub visibility: Visibility,
    #[serde(default)]
    pub metadata: NewDiaryMetadata,
}

#[utoipa::path(
    post,
    path = "/diary",
    request_body = CreateDiaryRequest,
    responses(
        (status = 201, description = "Diary created", body = Diary),
        (status = 401, description = "Unauthorized")
    )
)]
pub async fn create_diary(
    auth: Auth,
    data: web::Data<AppState>,
    payload: web::Json<CreateDiaryRequest>,
) -> Result<HttpResponse, ApiError> {
    let req = payload.into_inner();
    if req.title.trim().is_empty() || req.content.trim().is_empty() {
        return Err(ApiError::BadRequest("title and content are required".into()));
    }
    let diary = data
        .repo
        .create_diary(NewDiary {
            user_id: auth.user_id(),
            title: req.title,
            content: req.content,
            emotions: req.emotions,
            topics: req.topics,
            visibility: req.visibility,
            metadata: req.metadata,
        })
        .await?;
    Ok(HttpResponse::Created().json(diary))
}

pub async fn get_diary(
    auth: Auth,
    data: web::Data<AppState>,
    path: web::Path<Id>,
) -> Result<HttpResponse, ApiError> {
    let diary = data
        .repo
        .get_diary(path.into_inner())
        .await?;
    if !permissions::can_view(data.repo.as_ref(), &diary, auth.user_id()).await? {
        return Err(ApiError::Forbidden);
    }
    Ok(HttpResponse::Ok().json(diary))
}

// ---------------- future feedback ---------------------------------

#[derive(Debug, Default, serde::Deserialize, utoipa::ToSchema)]
pub struct GenerateFeedbackRequest {
    #[serde(default, rename = "type")]
    pub kind: FeedbackType,
    #[serde(default)]
    pub style: FeedbackStyle,
}

#[utoipa::path(
    get,
    path = "/diary/{id}/future-feedback",
    params(("id" = Id, Path, description = "Diary id")),
    responses(
        (status = 200, description = "Feedback for the diary", body = FutureFeedback),
        (status = 404, description = "Diary or feedback not found")
    )
)]
pub async fn get_future_feedback(
    auth: Auth,
    data: web::Data<AppState>,
    path: web::Path<Id>,
) -> Result<HttpResponse, ApiError> {
    let diary_id = path.into_inner();
    let diary = data
        .repo
        .get_diary(diary_id)
        .await?;
    // a stranger's diary reads as absent, not forbidden
    if diary.user_id != auth.user_id() {
        return Err(ApiError::NotFound);
    }
    let feedback = data
        .repo
        .find_feedback_by_diary(diary_id)
        .await?
        .ok_or(ApiError::NotFound)?;
    Ok(HttpResponse::Ok().json(feedback))
}

#[utoipa::path(
    post,
    path = "/diary/{id}/future-feedback",
    request_body = GenerateFeedbackRequest,
    params(("id" = Id, Path, description = "Diary id")),
    responses(
        (status = 200, description = "Feedback created or regenerated", body = FutureFeedback),
        (status = 404, description = "Diary not found or not owned"),
        (status = 429, description = "Rate limited")
    )
)]
pub async fn generate_future_feedback(
    auth: Auth,
    data: web::Data<AppState>,
    path: web::Path<Id>,
    payload: Option<web::Json<GenerateFeedbackRequest>>,
) -> Result<HttpResponse, ApiError> {
    let diary_id = path.into_inner();
    let req = payload.map(web::Json::into_inner).unwrap_or_default();
    let diary = data
        .repo
        .get_diary(diary_id)
        .await?;
    if diary.user_id != auth.user_id() {
        return Err(ApiError::NotFound);
    }
    if !data.limiter.allow_feedback(auth.user_id()) {
        return Err(ApiError::TooManyRequests);
    }

    let content = synthesis::synthesize(&diary, req.kind, req.style, &mut rand::thread_rng());
    let feedback = data
        .repo
        .upsert_feedback(NewFeedback {
            diary_id,
            user_id: auth.user_id(),
            kind: req.kind,
            style: req.style,
            content,
        })
        .await?;
    metrics::increment_counter!("futurelog_feedback_generated_total");
    Ok(HttpResponse::Ok().json(feedback))
}

// ---------------- rating ------------------------------------------

#[derive(Debug, serde::Deserialize, utoipa::ToSchema)]
pub struct RatingRequest {
    pub score: i32,
    #[serde(default)]
    pub feedback: Option<String>,
    #[serde(default)]
    pub tags: Vec<RatingTag>,
}

#[derive(Debug, serde::Serialize, utoipa::ToSchema)]
pub struct MsgResponse {
    pub msg: String,
}

#[utoipa::path(
    post,
    path = "/feedback/{id}/rating",
    request_body = RatingRequest,
    params(("id" = Id, Path, description = "Feedback id")),
    responses(
        (status = 200, description = "Rating stored", body = MsgResponse),
        (status = 400, description = "Invalid score"),
        (status = 403, description = "Not the feedback owner"),
        (status = 404, description = "Feedback not found")
    )
)]
pub async fn submit_rating(
    auth: Auth,
    data: web::Data<AppState>,
    path: web::Path<Id>,
    payload: web::Json<RatingRequest>,
) -> Result<HttpResponse, ApiError> {
    let req = payload.into_inner();
    if !(1..=5).contains(&req.score) {
        return Err(ApiError::BadRequest(
            "score must be an integer between 1 and 5".into(),
        ));
    }
    let feedback = data
        .repo
        .get_feedback(path.into_inner())
        .await?;
    if feedback.user_id != auth.user_id() {
        return Err(ApiError::Forbidden);
    }
    data.repo
        .update_rating(
            feedback.id,
            Rating {
                score: req.score,
                feedback: req.feedback,
                tags: req.tags,
            },
        )
        .await?;
    Ok(HttpResponse::Ok().json(MsgResponse {
        msg: "Rating submitted successfully".into(),
    }))
}

// ---------------- conversation ------------------------------------

#[derive(Debug, serde::Deserialize, utoipa::ToSchema)]
pub struct ConversationRequest {
    pub message: String,
}

#[utoipa::path(
    post,
    path = "/feedback/{id}/conversation",
    request_body = ConversationRequest,
    params(("id" = Id, Path, description = "Feedback id")),
    responses(
        (status = 200, description = "Turn appended", body = ConversationMessage),
        (status = 400, description = "Empty message"),
        (status = 403, description = "Not the feedback owner"),
        (status = 404, description = "Feedback not found"),
        (status = 429, description = "Rate limited")
    )
)]
pub async fn add_conversation(
    auth: Auth,
    data: web::Data<AppState>,
    path: web::Path<Id>,
    payload: web::Json<ConversationRequest>,
) -> Result<HttpResponse, ApiError> {
    let message = payload.into_inner().message;
    if message.trim().is_empty() {
        return Err(ApiError::BadRequest("message cannot be empty".into()));
    }
    let feedback = data
        .repo
        .get_feedback(path.into_inner())
        .await?;
    if feedback.user_id != auth.user_id() {
        return Err(ApiError::Forbidden);
    }
    if !data.limiter.allow_conversation(auth.user_id()) {
        return Err(ApiError::TooManyRequests);
    }

    // the current rating steers the tone of this turn, never past ones
    let response = synthesis::conversation_reply(
        message.trim(),
        &feedback,
        &feedback.conversations,
        &mut rand::thread_rng(),
    );
    let turn = data
        .repo
        .append_conversation(feedback.id, &message, &response)
        .await?;
    metrics::increment_counter!("futurelog_conversation_turns_total");
    Ok(HttpResponse::Ok().json(turn))
}

// ---------------- sharing -----------------------------------------

#[derive(Debug, serde::Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ShareRequest {
    pub friend_ids: Vec<Id>,
    #[serde(default)]
    pub settings: ShareSettings,
}

#[derive(Debug, serde::Serialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ShareResponse {
    pub success: bool,
    pub shared_count: u32,
}

#[utoipa::path(
    post,
    path = "/diary/{id}/share",
    request_body = ShareRequest,
    params(("id" = Id, Path, description = "Diary id")),
    responses(
        (status = 200, description = "Share result", body = ShareResponse),
        (status = 400, description = "Invalid friend list"),
        (status = 404, description = "Diary not found or not owned")
    )
)]
pub async fn share_diary(
    auth: Auth,
    data: web::Data<AppState>,
    path: web::Path<Id>,
    payload: web::Json<ShareRequest>,
) -> Result<HttpResponse, ApiError> {
    let req = payload.into_inner();
    if req.friend_ids.is_empty() {
        return Err(ApiError::BadRequest(
            "friendIds must contain at least one friend id".into(),
        ));
    }
    if req.friend_ids.iter().any(|&id| id <= 0) {
        return Err(ApiError::BadRequest("friendIds contains invalid ids".into()));
    }
    let diary_id = path.into_inner();
    let diary = data
        .repo
        .get_diary(diary_id)
        .await?;
    // only the owner may share
    if diary.user_id != auth.user_id() {
        return Err(ApiError::NotFound);
    }
    let shared_count = data
        .repo
        .share_with_friends(diary_id, auth.user_id(), &req.friend_ids, &req.settings)
        .await?;
    metrics::increment_counter!("futurelog_shares_total");
    Ok(HttpResponse::Ok().json(ShareResponse {
        success: true,
        shared_count,
    }))
}

#[derive(Debug, serde::Serialize, utoipa::ToSchema)]
pub struct FriendsFeedbackResponse {
    pub comments: Vec<FriendComment>,
}

#[utoipa::path(
    get,
    path = "/diary/{id}/friends-feedback",
    params(("id" = Id, Path, description = "Diary id")),
    responses(
        (status = 200, description = "Friends' future-comments", body = FriendsFeedbackResponse),
        (status = 403, description = "No view permission"),
        (status = 404, description = "Diary not found")
    )
)]
pub async fn friends_feedback(
    auth: Auth,
    data: web::Data<AppState>,
    path: web::Path<Id>,
) -> Result<HttpResponse, ApiError> {
    let diary_id = path.into_inner();
    let diary = data
        .repo
        .get_diary(diary_id)
        .await?;
    if !permissions::can_view(data.repo.as_ref(), &diary, auth.user_id()).await? {
        return Err(ApiError::Forbidden);
    }
    let comments = data
        .repo
        .list_future_comments(diary_id, auth.user_id())
        .await?;
    Ok(HttpResponse::Ok().json(FriendsFeedbackResponse { comments }))
}

#[derive(Debug, serde::Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CommentRequest {
    pub comment: String,
    #[serde(default)]
    pub is_future_comment: bool,
}

#[derive(Debug, serde::Serialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CommentResponse {
    pub success: bool,
    pub comment_id: Id,
}

pub async fn add_friend_comment(
    auth: Auth,
    data: web::Data<AppState>,
    path: web::Path<Id>,
    payload: web::Json<CommentRequest>,
) -> Result<HttpResponse, ApiError> {
    let req = payload.into_inner();
    if req.comment.trim().is_empty() {
        return Err(ApiError::BadRequest("comment cannot be empty".into()));
    }
    let diary_id = path.into_inner();
    let diary = data
        .repo
        .get_diary(diary_id)
        .await?;
    if !permissions::can_comment(data.repo.as_ref(), &diary, auth.user_id()).await? {
        return Err(ApiError::Forbidden);
    }
    let comment = data
        .repo
        .add_comment(NewComment {
            diary_id,
            author_id: auth.user_id(),
            comment: req.comment.trim().to_string(),
            is_future_comment: req.is_future_comment,
        })
        .await?;
    Ok(HttpResponse::Created().json(CommentResponse {
        success: true,
        comment_id: comment.id,
    }))
}

// ---------------- friend graph ------------------------------------

#[derive(Debug, serde::Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct FriendRequestBody {
    pub user_id: Id,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, serde::Deserialize, utoipa::ToSchema)]
pub struct RespondRequestBody {
    pub accept: bool,
}

pub async fn list_friends(auth: Auth, data: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    let friends = data.repo.list_friends(auth.user_id()).await?;
    Ok(HttpResponse::Ok().json(serde_json::json!({ "friends": friends })))
}

pub async fn pending_friend_requests(
    auth: Auth,
    data: web::Data<AppState>,
) -> Result<HttpResponse, ApiError> {
    let requests = data.repo.list_pending_requests(auth.user_id()).await?;
    Ok(HttpResponse::Ok().json(requests))
}

pub async fn send_friend_request(
    auth: Auth,
    data: web::Data<AppState>,
    payload: web::Json<FriendRequestBody>,
) -> Result<HttpResponse, ApiError> {
    let req = payload.into_inner();
    if req.user_id == auth.user_id() {
        return Err(ApiError::BadRequest("cannot befriend yourself".into()));
    }
    let request = data
        .repo
        .send_friend_request(auth.user_id(), req.user_id, req.message)
        .await
        .map_err(|e| match e {
            RepoError::Conflict => {
                ApiError::BadRequest("already friends or request pending".into())
            }
            other => other.into(),
        })?;
    Ok(HttpResponse::Created().json(serde_json::json!({
        "success": true,
        "requestId": request.id
    })))
}

pub async fn respond_friend_request(
    auth: Auth,
    data: web::Data<AppState>,
    path: web::Path<Id>,
    payload: web::Json<RespondRequestBody>,
) -> Result<HttpResponse, ApiError> {
    let request_id = path.into_inner();
    let request = data
        .repo
        .get_friend_request(request_id)
        .await?;
    if request.to_user_id != auth.user_id() {
        return Err(ApiError::Forbidden);
    }
    let accept = payload.accept;
    data.repo
        .respond_friend_request(request_id, accept)
        .await
        .map_err(|e| match e {
            RepoError::Conflict => ApiError::BadRequest("request already handled".into()),
            other => other.into(),
        })?;
    Ok(HttpResponse::Ok().json(serde_json::json!({
        "success": true,
        "requestId": request_id,
        "action": if accept { "accepted" } else { "rejected" }
    })))
}
