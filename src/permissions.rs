//! Permission Evaluator: view/comment rights for a (diary, user) pair.
//!
//! Rights are recomputed per call against the repository; absence of rights
//! is reported as `false`, never as an error. Callers translate the boolean
//! into a 403/404 at the HTTP boundary.

use crate::models::{Diary, Id};
use crate::repo::{Repo, RepoResult};

/// True iff the user owns the diary or holds a share row for it.
pub async fn can_view(repo: &dyn Repo, diary: &Diary, user_id: Id) -> RepoResult<bool> {
    if diary.user_id == user_id {
        return Ok(true);
    }
    Ok(repo.get_share(diary.id, user_id).await?.is_some())
}

/// True iff a share row exists with commenting enabled. Ownership alone does
/// not grant this: comments model friend reactions, not the owner's notes.
pub async fn can_comment(repo: &dyn Repo, diary: &Diary, user_id: Id) -> RepoResult<bool> {
    Ok(repo
        .get_share(diary.id, user_id)
        .await?
        .map(|s| s.allow_comment)
        .unwrap_or(false))
}
