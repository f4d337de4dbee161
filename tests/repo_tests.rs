#![cfg(feature = "inmem-store")]

use futurelog::models::*;
use futurelog::repo::inmem::InMemRepo;
use futurelog::repo::{DiaryRepo, FeedbackRepo, FriendRepo, RepoError, ShareRepo};
use serial_test::serial;

// The returned guard keeps the temp data dir alive for the test's duration.
fn setup_env() -> tempfile::TempDir {
    std::env::set_var("JWT_SECRET", "test-secret-must-be-32-bytes-long!!");
    let tmp = tempfile::tempdir().unwrap();
    std::env::set_var("FUTURELOG_DATA_DIR", tmp.path().to_str().unwrap());
    tmp
}

fn new_diary(user_id: Id) -> NewDiary {
    NewDiary {
        user_id,
        title: "A day at the lake".into(),
        content: "We rowed out early and watched the fog lift off the water.".into(),
        emotions: vec!["calm".into()],
        topics: vec!["nature".into()],
        visibility: Visibility::Private,
        metadata: NewDiaryMetadata::default(),
    }
}

fn new_feedback(diary_id: Id, user_id: Id) -> NewFeedback {
    NewFeedback {
        diary_id,
        user_id,
        kind: FeedbackType::Emotional,
        style: FeedbackStyle::Encouraging,
        content: "Looking back, that calm morning mattered.".into(),
    }
}

#[actix_web::test]
#[serial]
async fn share_counts_new_rows_only() {
    let _data_dir = setup_env();
    let repo = InMemRepo::new();
    let diary = repo.create_diary(new_diary(1)).await.unwrap();

    let settings = ShareSettings::default();
    let n = repo
        .share_with_friends(diary.id, 1, &[2, 3], &settings)
        .await
        .unwrap();
    assert_eq!(n, 2);

    // re-sharing the same pairs is a no-op
    let n = repo
        .share_with_friends(diary.id, 1, &[2, 3, 4], &settings)
        .await
        .unwrap();
    assert_eq!(n, 1);

    let share = repo.get_share(diary.id, 2).await.unwrap().unwrap();
    assert!(!share.allow_comment);
    assert!(repo.get_share(diary.id, 99).await.unwrap().is_none());
}

#[actix_web::test]
#[serial]
async fn upsert_keeps_id_rating_and_history() {
    let _data_dir = setup_env();
    let repo = InMemRepo::new();
    let diary = repo.create_diary(new_diary(1)).await.unwrap();

    let first = repo.upsert_feedback(new_feedback(diary.id, 1)).await.unwrap();
    repo.update_rating(
        first.id,
        Rating {
            score: 4,
            feedback: None,
            tags: vec![RatingTag::Useful],
        },
    )
    .await
    .unwrap();
    repo.append_conversation(first.id, "really?", "Yes, really.")
        .await
        .unwrap();

    let mut regen = new_feedback(diary.id, 1);
    regen.kind = FeedbackType::Thinking;
    regen.style = FeedbackStyle::Analytical;
    regen.content = "A different take on the same morning.".into();
    let second = repo.upsert_feedback(regen).await.unwrap();

    assert_eq!(second.id, first.id);
    assert_eq!(second.kind, FeedbackType::Thinking);
    assert_eq!(second.style, FeedbackStyle::Analytical);
    assert_eq!(second.rating.as_ref().unwrap().score, 4);
    assert_eq!(second.conversations.len(), 1);
    assert!(second.updated_at >= first.updated_at);
}

#[actix_web::test]
#[serial]
async fn conversations_come_back_oldest_first() {
    let _data_dir = setup_env();
    let repo = InMemRepo::new();
    let diary = repo.create_diary(new_diary(1)).await.unwrap();
    let fb = repo.upsert_feedback(new_feedback(diary.id, 1)).await.unwrap();

    repo.append_conversation(fb.id, "m1", "r1").await.unwrap();
    repo.append_conversation(fb.id, "m2", "r2").await.unwrap();
    repo.append_conversation(fb.id, "m3", "r3").await.unwrap();

    let loaded = repo.get_feedback(fb.id).await.unwrap();
    let messages: Vec<_> = loaded.conversations.iter().map(|c| c.message.as_str()).collect();
    assert_eq!(messages, ["m1", "m2", "m3"]);
}

#[actix_web::test]
#[serial]
async fn rating_overwrites_wholesale() {
    let _data_dir = setup_env();
    let repo = InMemRepo::new();
    let diary = repo.create_diary(new_diary(1)).await.unwrap();
    let fb = repo.upsert_feedback(new_feedback(diary.id, 1)).await.unwrap();

    repo.update_rating(
        fb.id,
        Rating {
            score: 2,
            feedback: Some("missed the point".into()),
            tags: vec![RatingTag::Inaccurate, RatingTag::WrongStyle],
        },
    )
    .await
    .unwrap();
    repo.update_rating(
        fb.id,
        Rating {
            score: 5,
            feedback: None,
            tags: vec![],
        },
    )
    .await
    .unwrap();

    let loaded = repo.get_feedback(fb.id).await.unwrap();
    let rating = loaded.rating.unwrap();
    assert_eq!(rating.score, 5);
    assert!(rating.feedback.is_none());
    assert!(rating.tags.is_empty());

    // missing feedback id
    let err = repo
        .update_rating(
            9999,
            Rating {
                score: 3,
                feedback: None,
                tags: vec![],
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, RepoError::NotFound));
}

#[actix_web::test]
#[serial]
async fn friend_request_lifecycle() {
    let _data_dir = setup_env();
    let repo = InMemRepo::new();

    let req = repo
        .send_friend_request(1, 2, Some("hi".into()))
        .await
        .unwrap();
    assert_eq!(req.status, RequestStatus::Pending);

    // duplicate pending request is rejected
    let err = repo.send_friend_request(1, 2, None).await.unwrap_err();
    assert!(matches!(err, RepoError::Conflict));

    // only the recipient's inbox lists the pending request
    let pending = repo.list_pending_requests(2).await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].id, req.id);
    assert!(repo.list_pending_requests(1).await.unwrap().is_empty());

    repo.respond_friend_request(req.id, true).await.unwrap();
    assert!(repo.list_pending_requests(2).await.unwrap().is_empty());
    assert!(repo.are_friends(1, 2).await.unwrap());
    assert!(repo.are_friends(2, 1).await.unwrap());
    assert_eq!(repo.list_friends(1).await.unwrap(), vec![2]);

    // already handled
    let err = repo.respond_friend_request(req.id, false).await.unwrap_err();
    assert!(matches!(err, RepoError::Conflict));

    // once friends, a fresh request is a conflict too
    let err = repo.send_friend_request(1, 2, None).await.unwrap_err();
    assert!(matches!(err, RepoError::Conflict));
}

#[actix_web::test]
#[serial]
async fn future_comments_filtered_to_viewer_friends() {
    let _data_dir = setup_env();
    let repo = InMemRepo::new();
    let diary = repo.create_diary(new_diary(1)).await.unwrap();

    // viewer 1 is friends with 2 but not with 3
    let req = repo.send_friend_request(2, 1, None).await.unwrap();
    repo.respond_friend_request(req.id, true).await.unwrap();

    for (author, text, future) in [(2, "from a friend", true), (3, "from a stranger", true), (2, "ordinary note", false)] {
        repo.add_comment(NewComment {
            diary_id: diary.id,
            author_id: author,
            comment: text.into(),
            is_future_comment: future,
        })
        .await
        .unwrap();
    }

    let comments = repo.list_future_comments(diary.id, 1).await.unwrap();
    assert_eq!(comments.len(), 1);
    assert_eq!(comments[0].friend_id, 2);
    assert_eq!(comments[0].comment, "from a friend");
}
