use crate::models::*;

#[derive(thiserror::Error, Debug)]
pub enum RepoError {
    #[error("not found")]
    NotFound,
    #[error("conflict")]
    Conflict,
    #[error("internal: {0}")]
    Internal(String),
}

pub type RepoResult<T> = Result<T, RepoError>;

use async_trait::async_trait;

#[async_trait]
pub trait DiaryRepo: Send + Sync {
    async fn create_diary(&self, new: NewDiary) -> RepoResult<Diary>;
    async fn get_diary(&self, id: Id) -> RepoResult<Diary>;
}

#[async_trait]
pub trait ShareRepo: Send + Sync {
    /// Batch-share a diary. Pairs that already exist are skipped silently and
    /// do not count; the returned number is newly created rows only.
    async fn share_with_friends(
        &self,
        diary_id: Id,
        sharer_id: Id,
        friend_ids: &[Id],
        settings: &ShareSettings,
    ) -> RepoResult<u32>;
    async fn get_share(&self, diary_id: Id, friend_id: Id) -> RepoResult<Option<DiaryShare>>;
    async fn add_comment(&self, new: NewComment) -> RepoResult<DiaryComment>;
    /// Future-comments on a diary written by friends of the viewer, newest first.
    async fn list_future_comments(&self, diary_id: Id, viewer_id: Id)
        -> RepoResult<Vec<FriendComment>>;
}

#[async_trait]
pub trait FeedbackRepo: Send + Sync {
    async fn find_feedback_by_diary(&self, diary_id: Id) -> RepoResult<Option<FutureFeedback>>;
    async fn get_feedback(&self, id: Id) -> RepoResult<FutureFeedback>;
    /// Insert-or-update keyed on diary id. An existing record keeps its id,
    /// rating and conversation history; type, style and content are rewritten
    /// and `updatedAt` bumped.
    async fn upsert_feedback(&self, new: NewFeedback) -> RepoResult<FutureFeedback>;
    /// Wholesale overwrite of the rating; no history is kept.
    async fn update_rating(&self, feedback_id: Id, rating: Rating) -> RepoResult<()>;
    async fn append_conversation(
        &self,
        feedback_id: Id,
        message: &str,
        response: &str,
    ) -> RepoResult<ConversationMessage>;
}

#[async_trait]
pub trait FriendRepo: Send + Sync {
    async fn send_friend_request(
        &self,
        from_user_id: Id,
        to_user_id: Id,
        message: Option<String>,
    ) -> RepoResult<FriendRequest>;
    async fn get_friend_request(&self, id: Id) -> RepoResult<FriendRequest>;
    /// Pending requests addressed to the user, newest first.
    async fn list_pending_requests(&self, user_id: Id) -> RepoResult<Vec<FriendRequest>>;
    /// Accepting creates the friendship in both directions atomically.
    async fn respond_friend_request(&self, request_id: Id, accept: bool) -> RepoResult<()>;
    async fn are_friends(&self, a: Id, b: Id) -> RepoResult<bool>;
    async fn list_friends(&self, user_id: Id) -> RepoResult<Vec<Id>>;
}

pub trait Repo: DiaryRepo + ShareRepo + FeedbackRepo + FriendRepo {}

impl<T> Repo for T where T: DiaryRepo + ShareRepo + FeedbackRepo + FriendRepo {}

#[cfg(feature = "inmem-store")]
pub mod inmem {
    use super::*;
    use chrono::Utc;
    use serde::{Deserialize, Serialize};
    use std::collections::{HashMap, HashSet};
    use std::path::{Path, PathBuf};
    use std::sync::{Arc, RwLock};

    const SNAPSHOT_PATH: &str = "data/state.json";

    #[derive(Default, Serialize, Deserialize)]
    struct State {
        diaries: HashMap<Id, Diary>,
        shares: Vec<DiaryShare>,
        comments: Vec<DiaryComment>,
        feedbacks: HashMap<Id, FutureFeedback>,
        friend_requests: HashMap<Id, FriendRequest>,
        // stored in both directions, mirroring the relational schema
        friendships: HashSet<(Id, Id)>,
        next_id: Id,
    }

    #[derive(Clone)]
    pub struct InMemRepo {
        state: Arc<RwLock<State>>,
        snapshot_path: Arc<PathBuf>,
    }

    impl InMemRepo {
        fn data_dir() -> PathBuf {
            std::env::var("FUTURELOG_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("data"))
        }

        fn snapshot_path() -> PathBuf {
            if std::env::var("FUTURELOG_DATA_DIR").is_ok() {
                let mut p = Self::data_dir();
                p.push("state.json");
                p
            } else {
                PathBuf::from(SNAPSHOT_PATH)
            }
        }

        fn load_state_from(path: &Path) -> State {
            match std::fs::read(path) {
                Ok(bytes) => match serde_json::from_slice::<State>(&bytes) {
                    Ok(s) => {
                        log::info!("loaded snapshot '{}'", path.display());
                        s
                    }
                    Err(e) => {
                        log::warn!(
                            "failed to parse snapshot '{}': {e}. Starting empty.",
                            path.display()
                        );
                        State::default()
                    }
                },
                Err(_) => State::default(),
            }
        }

        fn persist(&self) {
            let path = self.snapshot_path.clone();
            if let Ok(s) = serde_json::to_vec_pretty(&*self.state.read().unwrap()) {
                if let Some(dir) = path.parent() {
                    let _ = std::fs::create_dir_all(dir);
                }
                if let Err(e) = std::fs::write(&*path, s) {
                    log::warn!("failed to write snapshot '{}': {e}", path.display());
                }
            }
        }

        pub fn new() -> Self {
            let snapshot_path = Self::snapshot_path();
            let state = Self::load_state_from(&snapshot_path);
            Self {
                state: Arc::new(RwLock::new(state)),
                snapshot_path: Arc::new(snapshot_path),
            }
        }

        fn next_id(state: &mut State) -> Id {
            state.next_id += 1;
            state.next_id
        }
    }

    impl Default for InMemRepo {
        fn default() -> Self {
            Self::new()
        }
    }

    #[async_trait]
    impl DiaryRepo for InMemRepo {
        async fn create_diary(&self, new: NewDiary) -> RepoResult<Diary> {
            let mut s = self.state.write().unwrap();
            let now = Utc::now();
            let id = Self::next_id(&mut s);
            let metadata = new.resolved_metadata();
            let diary = Diary {
                id,
                user_id: new.user_id,
                title: new.title,
                content: new.content,
                emotions: new.emotions,
                topics: new.topics,
                visibility: new.visibility,
                metadata,
                created_at: now,
                updated_at: now,
            };
            s.diaries.insert(id, diary.clone());
            drop(s);
            self.persist();
            Ok(diary)
        }

        async fn get_diary(&self, id: Id) -> RepoResult<Diary> {
            let s = self.state.read().unwrap();
            s.diaries.get(&id).cloned().ok_or(RepoError::NotFound)
        }
    }

    #[async_trait]
    impl ShareRepo for InMemRepo {
        async fn share_with_friends(
            &self,
            diary_id: Id,
            sharer_id: Id,
            friend_ids: &[Id],
            settings: &ShareSettings,
        ) -> RepoResult<u32> {
            let mut s = self.state.write().unwrap();
            if !s.diaries.contains_key(&diary_id) {
                return Err(RepoError::NotFound);
            }
            let mut created = 0u32;
            for &friend_id in friend_ids {
                // existing pair is a no-op, not an error
                if s.shares
                    .iter()
                    .any(|sh| sh.diary_id == diary_id && sh.friend_id == friend_id)
                {
                    continue;
                }
                s.shares.push(DiaryShare {
                    diary_id,
                    friend_id,
                    sharer_id,
                    allow_comment: settings.allow_comment,
                    visibility: settings.visibility.clone(),
                    created_at: Utc::now(),
                });
                created += 1;
            }
            drop(s);
            self.persist();
            Ok(created)
        }

        async fn get_share(&self, diary_id: Id, friend_id: Id) -> RepoResult<Option<DiaryShare>> {
            let s = self.state.read().unwrap();
            Ok(s.shares
                .iter()
                .find(|sh| sh.diary_id == diary_id && sh.friend_id == friend_id)
                .cloned())
        }

        async fn add_comment(&self, new: NewComment) -> RepoResult<DiaryComment> {
            let mut s = self.state.write().unwrap();
            if !s.diaries.contains_key(&new.diary_id) {
                return Err(RepoError::NotFound);
            }
            let id = Self::next_id(&mut s);
            let comment = DiaryComment {
                id,
                diary_id: new.diary_id,
                author_id: new.author_id,
                comment: new.comment,
                is_future_comment: new.is_future_comment,
                created_at: Utc::now(),
            };
            s.comments.push(comment.clone());
            drop(s);
            self.persist();
            Ok(comment)
        }

        async fn list_future_comments(
            &self,
            diary_id: Id,
            viewer_id: Id,
        ) -> RepoResult<Vec<FriendComment>> {
            let s = self.state.read().unwrap();
            let mut v: Vec<_> = s
                .comments
                .iter()
                .filter(|c| {
                    c.diary_id == diary_id
                        && c.is_future_comment
                        && s.friendships.contains(&(viewer_id, c.author_id))
                })
                .map(|c| FriendComment {
                    friend_id: c.author_id,
                    comment: c.comment.clone(),
                    is_future_comment: c.is_future_comment,
                    created_at: c.created_at,
                })
                .collect();
            v.sort_by(|a, b| b.created_at.cmp(&a.created_at)); // newest first
            Ok(v)
        }
    }

    #[async_trait]
    impl FeedbackRepo for InMemRepo {
        async fn find_feedback_by_diary(&self, diary_id: Id) -> RepoResult<Option<FutureFeedback>> {
            let s = self.state.read().unwrap();
            let mut found = s
                .feedbacks
                .values()
                .find(|f| f.diary_id == diary_id)
                .cloned();
            if let Some(f) = found.as_mut() {
                f.conversations.sort_by(|a, b| a.created_at.cmp(&b.created_at));
            }
            Ok(found)
        }

        async fn get_feedback(&self, id: Id) -> RepoResult<FutureFeedback> {
            let s = self.state.read().unwrap();
            let mut f = s.feedbacks.get(&id).cloned().ok_or(RepoError::NotFound)?;
            f.conversations.sort_by(|a, b| a.created_at.cmp(&b.created_at));
            Ok(f)
        }

        async fn upsert_feedback(&self, new: NewFeedback) -> RepoResult<FutureFeedback> {
            let mut s = self.state.write().unwrap();
            if !s.diaries.contains_key(&new.diary_id) {
                return Err(RepoError::NotFound);
            }
            let now = Utc::now();
            let updated = if let Some(existing) =
                s.feedbacks.values_mut().find(|f| f.diary_id == new.diary_id)
            {
                existing.kind = new.kind;
                existing.style = new.style;
                existing.content = new.content;
                existing.updated_at = now;
                existing.clone()
            } else {
                let id = Self::next_id(&mut s);
                let feedback = FutureFeedback {
                    id,
                    diary_id: new.diary_id,
                    user_id: new.user_id,
                    kind: new.kind,
                    style: new.style,
                    content: new.content,
                    rating: None,
                    conversations: Vec::new(),
                    created_at: now,
                    updated_at: now,
                };
                s.feedbacks.insert(id, feedback.clone());
                feedback
            };
            drop(s);
            self.persist();
            Ok(updated)
        }

        async fn update_rating(&self, feedback_id: Id, rating: Rating) -> RepoResult<()> {
            let mut s = self.state.write().unwrap();
            let f = s
                .feedbacks
                .get_mut(&feedback_id)
                .ok_or(RepoError::NotFound)?;
            f.rating = Some(rating);
            f.updated_at = Utc::now();
            drop(s);
            self.persist();
            Ok(())
        }

        async fn append_conversation(
            &self,
            feedback_id: Id,
            message: &str,
            response: &str,
        ) -> RepoResult<ConversationMessage> {
            let mut s = self.state.write().unwrap();
            let f = s
                .feedbacks
                .get_mut(&feedback_id)
                .ok_or(RepoError::NotFound)?;
            let msg = ConversationMessage {
                message: message.to_string(),
                response: response.to_string(),
                created_at: Utc::now(),
            };
            f.conversations.push(msg.clone());
            drop(s);
            self.persist();
            Ok(msg)
        }
    }

    #[async_trait]
    impl FriendRepo for InMemRepo {
        async fn send_friend_request(
            &self,
            from_user_id: Id,
            to_user_id: Id,
            message: Option<String>,
        ) -> RepoResult<FriendRequest> {
            let mut s = self.state.write().unwrap();
            if s.friendships.contains(&(from_user_id, to_user_id)) {
                return Err(RepoError::Conflict);
            }
            if s.friend_requests.values().any(|r| {
                r.from_user_id == from_user_id
                    && r.to_user_id == to_user_id
                    && r.status == RequestStatus::Pending
            }) {
                return Err(RepoError::Conflict);
            }
            let id = Self::next_id(&mut s);
            let request = FriendRequest {
                id,
                from_user_id,
                to_user_id,
                message,
                status: RequestStatus::Pending,
                created_at: Utc::now(),
            };
            s.friend_requests.insert(id, request.clone());
            drop(s);
            self.persist();
            Ok(request)
        }

        async fn get_friend_request(&self, id: Id) -> RepoResult<FriendRequest> {
            let s = self.state.read().unwrap();
            s.friend_requests
                .get(&id)
                .cloned()
                .ok_or(RepoError::NotFound)
        }

        async fn list_pending_requests(&self, user_id: Id) -> RepoResult<Vec<FriendRequest>> {
            let s = self.state.read().unwrap();
            let mut v: Vec<_> = s
                .friend_requests
                .values()
                .filter(|r| r.to_user_id == user_id && r.status == RequestStatus::Pending)
                .cloned()
                .collect();
            v.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
            Ok(v)
        }

        async fn respond_friend_request(&self, request_id: Id, accept: bool) -> RepoResult<()> {
            let mut s = self.state.write().unwrap();
            let request = s
                .friend_requests
                .get_mut(&request_id)
                .ok_or(RepoError::NotFound)?;
            if request.status != RequestStatus::Pending {
                return Err(RepoError::Conflict);
            }
            request.status = if accept {
                RequestStatus::Accepted
            } else {
                RequestStatus::Rejected
            };
            let (from, to) = (request.from_user_id, request.to_user_id);
            if accept {
                s.friendships.insert((from, to));
                s.friendships.insert((to, from));
            }
            drop(s);
            self.persist();
            Ok(())
        }

        async fn are_friends(&self, a: Id, b: Id) -> RepoResult<bool> {
            let s = self.state.read().unwrap();
            Ok(s.friendships.contains(&(a, b)) || s.friendships.contains(&(b, a)))
        }

        async fn list_friends(&self, user_id: Id) -> RepoResult<Vec<Id>> {
            let s = self.state.read().unwrap();
            let mut v: Vec<Id> = s
                .friendships
                .iter()
                .filter(|(u, _)| *u == user_id)
                .map(|(_, f)| *f)
                .collect();
            v.sort_unstable();
            Ok(v)
        }
    }
}

// Postgres implementation (feature = "postgres-store")
#[cfg(feature = "postgres-store")]
pub mod pg {
    use super::*;
    use chrono::{DateTime, Utc};
    use sqlx::types::Json;
    use sqlx::{Pool, Postgres, Row};
    use std::str::FromStr;

    #[derive(Clone)]
    pub struct PgRepo {
        pool: Pool<Postgres>,
    }

    impl PgRepo {
        pub fn new(pool: Pool<Postgres>) -> Self {
            Self { pool }
        }
    }

    fn db_err(e: sqlx::Error) -> RepoError {
        match e {
            sqlx::Error::RowNotFound => RepoError::NotFound,
            other => RepoError::Internal(other.to_string()),
        }
    }

    #[derive(sqlx::FromRow)]
    struct DiaryRow {
        id: Id,
        user_id: Id,
        title: String,
        content: String,
        emotions: Json<Vec<String>>,
        topics: Json<Vec<String>>,
        visibility: String,
        metadata: Json<DiaryMetadata>,
        created_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
    }

    impl TryFrom<DiaryRow> for Diary {
        type Error = RepoError;
        fn try_from(r: DiaryRow) -> Result<Self, RepoError> {
            let visibility = match r.visibility.as_str() {
                "private" => Visibility::Private,
                "friends" => Visibility::Friends,
                "public" => Visibility::Public,
                other => return Err(RepoError::Internal(format!("bad visibility '{other}'"))),
            };
            Ok(Diary {
                id: r.id,
                user_id: r.user_id,
                title: r.title,
                content: r.content,
                emotions: r.emotions.0,
                topics: r.topics.0,
                visibility,
                metadata: r.metadata.0,
                created_at: r.created_at,
                updated_at: r.updated_at,
            })
        }
    }

    #[derive(sqlx::FromRow)]
    struct FeedbackRow {
        id: Id,
        diary_id: Id,
        user_id: Id,
        kind: String,
        style: String,
        content: String,
        rating_score: Option<i32>,
        rating_feedback: Option<String>,
        rating_tags: Option<Json<Vec<RatingTag>>>,
        created_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
    }

    impl FeedbackRow {
        fn into_feedback(self, conversations: Vec<ConversationMessage>) -> RepoResult<FutureFeedback> {
            let kind = FeedbackType::from_str(&self.kind).map_err(RepoError::Internal)?;
            let style = FeedbackStyle::from_str(&self.style).map_err(RepoError::Internal)?;
            let rating = self.rating_score.map(|score| Rating {
                score,
                feedback: self.rating_feedback.clone(),
                tags: self.rating_tags.map(|t| t.0).unwrap_or_default(),
            });
            Ok(FutureFeedback {
                id: self.id,
                diary_id: self.diary_id,
                user_id: self.user_id,
                kind,
                style,
                content: self.content,
                rating,
                conversations,
                created_at: self.created_at,
                updated_at: self.updated_at,
            })
        }
    }

    const FEEDBACK_COLS: &str =
        "id, diary_id, user_id, kind, style, content, rating_score, rating_feedback, rating_tags, created_at, updated_at";

    impl PgRepo {
        async fn load_conversations(&self, feedback_id: Id) -> RepoResult<Vec<ConversationMessage>> {
            let rows = sqlx::query(
                "SELECT message, response, created_at FROM feedback_conversations
                 WHERE feedback_id = $1 ORDER BY created_at ASC, id ASC",
            )
            .bind(feedback_id)
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;
            Ok(rows
                .into_iter()
                .map(|r| ConversationMessage {
                    message: r.get("message"),
                    response: r.get("response"),
                    created_at: r.get("created_at"),
                })
                .collect())
        }

        async fn load_feedback(&self, row: FeedbackRow) -> RepoResult<FutureFeedback> {
            let conversations = self.load_conversations(row.id).await?;
            row.into_feedback(conversations)
        }
    }

    #[async_trait]
    impl DiaryRepo for PgRepo {
        async fn create_diary(&self, new: NewDiary) -> RepoResult<Diary> {
            let metadata = new.resolved_metadata();
            let visibility = match new.visibility {
                Visibility::Private => "private",
                Visibility::Friends => "friends",
                Visibility::Public => "public",
            };
            let row = sqlx::query_as::<_, DiaryRow>(
                "INSERT INTO diaries (user_id, title, content, emotions, topics, visibility, metadata)
                 VALUES ($1, $2, $3, $4, $5, $6, $7)
                 RETURNING id, user_id, title, content, emotions, topics, visibility, metadata, created_at, updated_at",
            )
            .bind(new.user_id)
            .bind(&new.title)
            .bind(&new.content)
            .bind(Json(&new.emotions))
            .bind(Json(&new.topics))
            .bind(visibility)
            .bind(Json(&metadata))
            .fetch_one(&self.pool)
            .await
            .map_err(db_err)?;
            row.try_into()
        }

        async fn get_diary(&self, id: Id) -> RepoResult<Diary> {
            let row = sqlx::query_as::<_, DiaryRow>(
                "SELECT id, user_id, title, content, emotions, topics, visibility, metadata, created_at, updated_at
                 FROM diaries WHERE id = $1",
            )
            .bind(id)
            .fetch_one(&self.pool)
            .await
            .map_err(db_err)?;
            row.try_into()
        }
    }

    #[async_trait]
    impl ShareRepo for PgRepo {
        async fn share_with_friends(
            &self,
            diary_id: Id,
            sharer_id: Id,
            friend_ids: &[Id],
            settings: &ShareSettings,
        ) -> RepoResult<u32> {
            // one transaction for the whole batch; duplicates are skipped via
            // the primary key, any other failure rolls everything back
            let mut tx = self.pool.begin().await.map_err(db_err)?;
            let mut created = 0u32;
            for &friend_id in friend_ids {
                let res = sqlx::query(
                    "INSERT INTO diary_shares (diary_id, friend_id, sharer_id, allow_comment, visibility)
                     VALUES ($1, $2, $3, $4, $5)
                     ON CONFLICT (diary_id, friend_id) DO NOTHING",
                )
                .bind(diary_id)
                .bind(friend_id)
                .bind(sharer_id)
                .bind(settings.allow_comment)
                .bind(settings.visibility.as_deref())
                .execute(&mut *tx)
                .await
                .map_err(db_err)?;
                created += res.rows_affected() as u32;
            }
            tx.commit().await.map_err(db_err)?;
            Ok(created)
        }

        async fn get_share(&self, diary_id: Id, friend_id: Id) -> RepoResult<Option<DiaryShare>> {
            let row = sqlx::query(
                "SELECT diary_id, friend_id, sharer_id, allow_comment, visibility, created_at
                 FROM diary_shares WHERE diary_id = $1 AND friend_id = $2",
            )
            .bind(diary_id)
            .bind(friend_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
            Ok(row.map(|r| DiaryShare {
                diary_id: r.get("diary_id"),
                friend_id: r.get("friend_id"),
                sharer_id: r.get("sharer_id"),
                allow_comment: r.get("allow_comment"),
                visibility: r.get("visibility"),
                created_at: r.get("created_at"),
            }))
        }

        async fn add_comment(&self, new: NewComment) -> RepoResult<DiaryComment> {
            let row = sqlx::query(
                "INSERT INTO diary_comments (diary_id, author_id, comment, is_future_comment)
                 VALUES ($1, $2, $3, $4)
                 RETURNING id, created_at",
            )
            .bind(new.diary_id)
            .bind(new.author_id)
            .bind(&new.comment)
            .bind(new.is_future_comment)
            .fetch_one(&self.pool)
            .await
            .map_err(db_err)?;
            Ok(DiaryComment {
                id: row.get("id"),
                diary_id: new.diary_id,
                author_id: new.author_id,
                comment: new.comment,
                is_future_comment: new.is_future_comment,
                created_at: row.get("created_at"),
            })
        }

        async fn list_future_comments(
            &self,
            diary_id: Id,
            viewer_id: Id,
        ) -> RepoResult<Vec<FriendComment>> {
            let rows = sqlx::query(
                "SELECT c.author_id, c.comment, c.is_future_comment, c.created_at
                 FROM diary_comments c
                 WHERE c.diary_id = $1
                   AND c.is_future_comment
                   AND EXISTS (
                     SELECT 1 FROM friendships f
                     WHERE f.user_id = $2 AND f.friend_id = c.author_id
                   )
                 ORDER BY c.created_at DESC, c.id DESC",
            )
            .bind(diary_id)
            .bind(viewer_id)
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;
            Ok(rows
                .into_iter()
                .map(|r| FriendComment {
                    friend_id: r.get("author_id"),
                    comment: r.get("comment"),
                    is_future_comment: r.get("is_future_comment"),
                    created_at: r.get("created_at"),
                })
                .collect())
        }
    }

    #[async_trait]
    impl FeedbackRepo for PgRepo {
        async fn find_feedback_by_diary(&self, diary_id: Id) -> RepoResult<Option<FutureFeedback>> {
            let row = sqlx::query_as::<_, FeedbackRow>(&format!(
                "SELECT {FEEDBACK_COLS} FROM future_feedbacks WHERE diary_id = $1"
            ))
            .bind(diary_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
            match row {
                Some(r) => Ok(Some(self.load_feedback(r).await?)),
                None => Ok(None),
            }
        }

        async fn get_feedback(&self, id: Id) -> RepoResult<FutureFeedback> {
            let row = sqlx::query_as::<_, FeedbackRow>(&format!(
                "SELECT {FEEDBACK_COLS} FROM future_feedbacks WHERE id = $1"
            ))
            .bind(id)
            .fetch_one(&self.pool)
            .await
            .map_err(db_err)?;
            self.load_feedback(row).await
        }

        async fn upsert_feedback(&self, new: NewFeedback) -> RepoResult<FutureFeedback> {
            // UNIQUE(diary_id) makes this atomic against concurrent callers
            let row = sqlx::query_as::<_, FeedbackRow>(&format!(
                "INSERT INTO future_feedbacks (diary_id, user_id, kind, style, content)
                 VALUES ($1, $2, $3, $4, $5)
                 ON CONFLICT (diary_id) DO UPDATE SET
                   kind = EXCLUDED.kind,
                   style = EXCLUDED.style,
                   content = EXCLUDED.content,
                   updated_at = now()
                 RETURNING {FEEDBACK_COLS}"
            ))
            .bind(new.diary_id)
            .bind(new.user_id)
            .bind(new.kind.as_str())
            .bind(new.style.as_str())
            .bind(&new.content)
            .fetch_one(&self.pool)
            .await
            .map_err(db_err)?;
            self.load_feedback(row).await
        }

        async fn update_rating(&self, feedback_id: Id, rating: Rating) -> RepoResult<()> {
            let res = sqlx::query(
                "UPDATE future_feedbacks SET
                   rating_score = $2,
                   rating_feedback = $3,
                   rating_tags = $4,
                   updated_at = now()
                 WHERE id = $1",
            )
            .bind(feedback_id)
            .bind(rating.score)
            .bind(rating.feedback.as_deref())
            .bind(Json(&rating.tags))
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
            if res.rows_affected() == 0 {
                return Err(RepoError::NotFound);
            }
            Ok(())
        }

        async fn append_conversation(
            &self,
            feedback_id: Id,
            message: &str,
            response: &str,
        ) -> RepoResult<ConversationMessage> {
            let row = sqlx::query(
                "INSERT INTO feedback_conversations (feedback_id, message, response)
                 VALUES ($1, $2, $3)
                 RETURNING message, response, created_at",
            )
            .bind(feedback_id)
            .bind(message)
            .bind(response)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| match e {
                // FK violation means the feedback is gone
                sqlx::Error::Database(ref d) if d.is_foreign_key_violation() => RepoError::NotFound,
                other => db_err(other),
            })?;
            Ok(ConversationMessage {
                message: row.get("message"),
                response: row.get("response"),
                created_at: row.get("created_at"),
            })
        }
    }

    fn request_from_row(row: &sqlx::postgres::PgRow) -> RepoResult<FriendRequest> {
        let status = match row.get::<String, _>("status").as_str() {
            "pending" => RequestStatus::Pending,
            "accepted" => RequestStatus::Accepted,
            "rejected" => RequestStatus::Rejected,
            other => return Err(RepoError::Internal(format!("bad status '{other}'"))),
        };
        Ok(FriendRequest {
            id: row.get("id"),
            from_user_id: row.get("from_user_id"),
            to_user_id: row.get("to_user_id"),
            message: row.get("message"),
            status,
            created_at: row.get("created_at"),
        })
    }

    #[async_trait]
    impl FriendRepo for PgRepo {
        async fn send_friend_request(
            &self,
            from_user_id: Id,
            to_user_id: Id,
            message: Option<String>,
        ) -> RepoResult<FriendRequest> {
            if self.are_friends(from_user_id, to_user_id).await? {
                return Err(RepoError::Conflict);
            }
            let pending: Option<i64> = sqlx::query_scalar(
                "SELECT 1 FROM friend_requests
                 WHERE from_user_id = $1 AND to_user_id = $2 AND status = 'pending'",
            )
            .bind(from_user_id)
            .bind(to_user_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
            if pending.is_some() {
                return Err(RepoError::Conflict);
            }
            let row = sqlx::query(
                "INSERT INTO friend_requests (from_user_id, to_user_id, message)
                 VALUES ($1, $2, $3) RETURNING id, created_at",
            )
            .bind(from_user_id)
            .bind(to_user_id)
            .bind(message.as_deref())
            .fetch_one(&self.pool)
            .await
            .map_err(db_err)?;
            Ok(FriendRequest {
                id: row.get("id"),
                from_user_id,
                to_user_id,
                message,
                status: RequestStatus::Pending,
                created_at: row.get("created_at"),
            })
        }

        async fn get_friend_request(&self, id: Id) -> RepoResult<FriendRequest> {
            let row = sqlx::query(
                "SELECT id, from_user_id, to_user_id, message, status, created_at
                 FROM friend_requests WHERE id = $1",
            )
            .bind(id)
            .fetch_one(&self.pool)
            .await
            .map_err(db_err)?;
            request_from_row(&row)
        }

        async fn list_pending_requests(&self, user_id: Id) -> RepoResult<Vec<FriendRequest>> {
            let rows = sqlx::query(
                "SELECT id, from_user_id, to_user_id, message, status, created_at
                 FROM friend_requests
                 WHERE to_user_id = $1 AND status = 'pending'
                 ORDER BY created_at DESC, id DESC",
            )
            .bind(user_id)
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;
            rows.iter().map(request_from_row).collect()
        }

        async fn respond_friend_request(&self, request_id: Id, accept: bool) -> RepoResult<()> {
            let request = self.get_friend_request(request_id).await?;
            if request.status != RequestStatus::Pending {
                return Err(RepoError::Conflict);
            }
            let mut tx = self.pool.begin().await.map_err(db_err)?;
            if accept {
                sqlx::query(
                    "INSERT INTO friendships (user_id, friend_id) VALUES ($1, $2), ($2, $1)
                     ON CONFLICT DO NOTHING",
                )
                .bind(request.from_user_id)
                .bind(request.to_user_id)
                .execute(&mut *tx)
                .await
                .map_err(db_err)?;
            }
            sqlx::query("UPDATE friend_requests SET status = $2 WHERE id = $1")
                .bind(request_id)
                .bind(if accept { "accepted" } else { "rejected" })
                .execute(&mut *tx)
                .await
                .map_err(db_err)?;
            tx.commit().await.map_err(db_err)?;
            Ok(())
        }

        async fn are_friends(&self, a: Id, b: Id) -> RepoResult<bool> {
            let row: Option<i64> = sqlx::query_scalar(
                "SELECT 1 FROM friendships
                 WHERE (user_id = $1 AND friend_id = $2) OR (user_id = $2 AND friend_id = $1)",
            )
            .bind(a)
            .bind(b)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
            Ok(row.is_some())
        }

        async fn list_friends(&self, user_id: Id) -> RepoResult<Vec<Id>> {
            sqlx::query_scalar(
                "SELECT friend_id FROM friendships WHERE user_id = $1 ORDER BY friend_id",
            )
            .bind(user_id)
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)
        }
    }
}
