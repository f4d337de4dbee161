use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

pub type Id = i64;

/// Content focus of a future-self feedback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema, Default)]
#[serde(rename_all = "lowercase")]
pub enum FeedbackType {
    #[default]
    Emotional,
    Thinking,
    Action,
    Memory,
}

/// Tone of a future-self feedback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema, Default)]
#[serde(rename_all = "lowercase")]
pub enum FeedbackStyle {
    #[default]
    Encouraging,
    Analytical,
    Humorous,
}

impl FeedbackType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FeedbackType::Emotional => "emotional",
            FeedbackType::Thinking => "thinking",
            FeedbackType::Action => "action",
            FeedbackType::Memory => "memory",
        }
    }
}

impl std::str::FromStr for FeedbackType {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "emotional" => Ok(FeedbackType::Emotional),
            "thinking" => Ok(FeedbackType::Thinking),
            "action" => Ok(FeedbackType::Action),
            "memory" => Ok(FeedbackType::Memory),
            other => Err(format!("unknown feedback type '{other}'")),
        }
    }
}

impl FeedbackStyle {
    pub fn as_str(&self) -> &'static str {
        match self {
            FeedbackStyle::Encouraging => "encouraging",
            FeedbackStyle::Analytical => "analytical",
            FeedbackStyle::Humorous => "humorous",
        }
    }
}

impl std::str::FromStr for FeedbackStyle {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "encouraging" => Ok(FeedbackStyle::Encouraging),
            "analytical" => Ok(FeedbackStyle::Analytical),
            "humorous" => Ok(FeedbackStyle::Humorous),
            other => Err(format!("unknown feedback style '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum RatingTag {
    Useful,
    Inaccurate,
    WrongStyle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema, Default)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    #[default]
    Private,
    Friends,
    Public,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DiaryMetadata {
    pub word_count: i64,
    pub reading_time: i64,
    pub sentiment_score: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Diary {
    pub id: Id,
    pub user_id: Id,
    pub title: String,
    pub content: String,
    pub emotions: Vec<String>,
    pub topics: Vec<String>,
    pub visibility: Visibility,
    pub metadata: DiaryMetadata,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Diary {
    /// First emotion tag is the primary one; "mixed" when the entry is untagged.
    pub fn primary_emotion(&self) -> &str {
        self.emotions.first().map(String::as_str).unwrap_or("mixed")
    }

    pub fn primary_topic(&self) -> &str {
        self.topics.first().map(String::as_str).unwrap_or("daily")
    }
}

/// Partial metadata accepted on diary creation; missing pieces are derived
/// from the content.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct NewDiaryMetadata {
    pub word_count: Option<i64>,
    pub reading_time: Option<i64>,
    pub sentiment_score: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct NewDiary {
    pub user_id: Id,
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

impl NewDiary {
    /// Resolve partial metadata into the stored form.
    pub fn resolved_metadata(&self) -> DiaryMetadata {
        let word_count = self
            .metadata
            .word_count
            .unwrap_or_else(|| self.content.split_whitespace().count() as i64);
        DiaryMetadata {
            word_count,
            reading_time: self
                .metadata
                .reading_time
                .unwrap_or_else(|| (word_count + 199) / 200),
            sentiment_score: self.metadata.sentiment_score.unwrap_or(0.0),
        }
    }
}

/// Per-friend sharing settings supplied by the owner.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ShareSettings {
    #[serde(default)]
    pub allow_comment: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visibility: Option<String>,
}

/// One share grant: at most one row per (diary, friend) pair.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DiaryShare {
    pub diary_id: Id,
    pub friend_id: Id,
    pub sharer_id: Id,
    pub allow_comment: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub visibility: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Append-only comment left on a shared diary.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DiaryComment {
    pub id: Id,
    pub diary_id: Id,
    pub author_id: Id,
    pub comment: String,
    pub is_future_comment: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct NewComment {
    pub diary_id: Id,
    pub author_id: Id,
    pub comment: String,
    pub is_future_comment: bool,
}

/// A friend's comment as surfaced to the diary viewer.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct FriendComment {
    pub friend_id: Id,
    pub comment: String,
    pub is_future_comment: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Rating {
    pub score: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feedback: Option<String>,
    #[serde(default)]
    pub tags: Vec<RatingTag>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ConversationMessage {
    pub message: String,
    pub response: String,
    pub created_at: DateTime<Utc>,
}

/// The synthesized future-self commentary attached to one diary.
///
/// Exactly one logical feedback exists per diary; regeneration rewrites
/// type/style/content in place, keeping the id, rating and conversations.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct FutureFeedback {
    pub id: Id,
    pub diary_id: Id,
    pub user_id: Id,
    #[serde(rename = "type")]
    pub kind: FeedbackType,
    pub style: FeedbackStyle,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rating: Option<Rating>,
    pub conversations: Vec<ConversationMessage>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct NewFeedback {
    pub diary_id: Id,
    pub user_id: Id,
    #[serde(rename = "type")]
    pub kind: FeedbackType,
    pub style: FeedbackStyle,
    pub content: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum RequestStatus {
    Pending,
    Accepted,
    Rejected,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct FriendRequest {
    pub id: Id,
    pub from_user_id: Id,
    pub to_user_id: Id,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub status: RequestStatus,
    pub created_at: DateTime<Utc>,
}
