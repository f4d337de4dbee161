use crate::models::{
    ConversationMessage, Diary, DiaryComment, DiaryShare, FriendComment, FriendRequest,
    FutureFeedback, Rating, ShareSettings,
};
use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::routes::create_diary,
        crate::routes::get_future_feedback,
        crate::routes::generate_future_feedback,
        crate::routes::submit_rating,
        crate::routes::add_conversation,
        crate::routes::share_diary,
        crate::routes::friends_feedback,
    ),
    components(schemas(
        Diary, DiaryShare, DiaryComment, FriendComment, FriendRequest,
        FutureFeedback, Rating, ConversationMessage, ShareSettings,
        crate::routes::CreateDiaryRequest, crate::routes::GenerateFeedbackRequest,
        crate::routes::RatingRequest, crate::routes::ConversationRequest,
        crate::routes::ShareRequest, crate::routes::ShareResponse,
        crate::routes::CommentRequest, crate::routes::CommentResponse,
        crate::routes::FriendsFeedbackResponse, crate::routes::MsgResponse
    )),
    tags(
        (name = "diary", description = "Diary entries and sharing"),
        (name = "feedback", description = "Future-self feedback, ratings and conversations"),
        (name = "friends", description = "Friend graph"),
    )
)]
pub struct ApiDoc;
