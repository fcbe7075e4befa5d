use actix_web::{web, HttpRequest, HttpResponse};
use tracing::{info, warn};

use crate::auth::{comment_author, login_required, Ownership};
use crate::config::*;
use crate::core::errors::AppError;
use crate::core::helpers::{checked_id, new_id, now};
use crate::core::session::Session;
use crate::core::store::Store;
use crate::models::models::{Comment, CommentInput};
use crate::posts::find_post;
use crate::validation::{parse_payload, COMMENT_SCHEMA};
use crate::AppState;

pub async fn find_comment(store: &Store, comment_id: &str) -> anyhow::Result<Option<Comment>> {
    store.get_json::<Comment>(&comment_key(comment_id)).await
}

/// Comment ids of the post, oldest first.
pub async fn comment_ids(store: &Store, post_id: &str) -> anyhow::Result<Vec<String>> {
    store.list_all(&post_comments_key(post_id)).await
}

/// Writes the comment, then appends its id to the post's comment list. The
/// two writes are not atomic; a failure in between leaves an unreferenced
/// comment record.
pub async fn insert_comment(store: &Store, comment: &Comment) -> anyhow::Result<()> {
    store.set_json(&comment_key(&comment.id), comment).await?;
    store.list_push_back(&post_comments_key(&comment.post_id), &comment.id).await
}

/// Unlinks the comment from its post and deletes it.
pub async fn remove_comment(store: &Store, post_id: &str, comment_id: &str) -> anyhow::Result<()> {
    store.list_remove(&post_comments_key(post_id), comment_id).await?;
    store.delete(&comment_key(comment_id)).await
}

// === HTTP Handlers ===

pub async fn create_comment(
    state: web::Data<AppState>,
    mut session: Session,
    req: HttpRequest,
    path: web::Path<String>,
    body: web::Bytes,
) -> Result<HttpResponse, AppError> {
    let user_id = match session.user_id() {
        Some(uid) => uid.to_string(),
        None => return login_required(&state, session, &req).await,
    };

    let input: CommentInput = COMMENT_SCHEMA.validate(&parse_payload(&req, &body)?)?;

    let post = find_post(&state.store, checked_id(&path)?)
        .await?
        .ok_or_else(|| AppError::NotFound("Post not found".to_string()))?;

    let comment = Comment {
        id: new_id(),
        body: input.body,
        author: user_id,
        post_id: post.id.clone(),
        created_at: now(),
    };
    insert_comment(&state.store, &comment).await?;
    info!(post_id = %post.id, comment_id = %comment.id, "comment added");

    session.flash_success("Commented Successfully!");
    session.redirect(&state, &format!("/posts/{}", post.id)).await
}

pub async fn delete_comment(
    state: web::Data<AppState>,
    mut session: Session,
    req: HttpRequest,
    path: web::Path<(String, String)>,
) -> Result<HttpResponse, AppError> {
    let user_id = match session.user_id() {
        Some(uid) => uid.to_string(),
        None => return login_required(&state, session, &req).await,
    };
    let (post_id, comment_id) = path.into_inner();
    let post_id = checked_id(&post_id)?.to_string();

    let comment = match comment_author(&state.store, &comment_id, &user_id).await? {
        Ownership::Owner(comment) => comment,
        Ownership::NotOwner => return session.redirect(&state, &format!("/posts/{}", post_id)).await,
    };
    if comment.post_id != post_id {
        warn!(post_id = %post_id, comment_id = %comment.id, "comment belongs to another post");
        return Err(AppError::NotFound("Comment not found".to_string()));
    }

    remove_comment(&state.store, &post_id, &comment.id).await?;
    info!(post_id = %post_id, comment_id = %comment.id, "comment deleted");

    session.flash_success("Comment Deleted");
    session.redirect(&state, &format!("/posts/{}", post_id)).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::models::Post;
    use crate::posts::{insert_post, save_post};

    fn post_by(author: &str) -> Post {
        Post {
            id: new_id(),
            title: "Rex".to_string(),
            image: "https://example.com/rex.jpg".to_string(),
            description: "Good boy".to_string(),
            author: author.to_string(),
            created_at: now(),
            updated_at: None,
        }
    }

    fn comment_on(post: &Post, body: &str) -> Comment {
        Comment {
            id: new_id(),
            body: body.to_string(),
            author: "bob".to_string(),
            post_id: post.id.clone(),
            created_at: now(),
        }
    }

    #[tokio::test]
    async fn comments_keep_insertion_order_and_can_be_removed() {
        let store = Store::memory();
        let post = post_by("alice");
        insert_post(&store, &post).await.unwrap();

        let mut ids = Vec::new();
        for body in ["first", "second", "third"] {
            let comment = comment_on(&post, body);
            insert_comment(&store, &comment).await.unwrap();
            ids.push(comment.id);
        }
        assert_eq!(comment_ids(&store, &post.id).await.unwrap(), ids);

        remove_comment(&store, &post.id, &ids[1]).await.unwrap();
        assert_eq!(
            comment_ids(&store, &post.id).await.unwrap(),
            vec![ids[0].clone(), ids[2].clone()]
        );
        assert!(find_comment(&store, &ids[1]).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn concurrent_comments_are_all_referenced() {
        let store = Store::memory();
        let post = post_by("alice");
        insert_post(&store, &post).await.unwrap();

        let tasks: Vec<_> = (0..20)
            .map(|i| {
                let store = store.clone();
                let comment = comment_on(&post, &format!("comment {}", i));
                tokio::spawn(async move {
                    insert_comment(&store, &comment).await.unwrap();
                    comment.id
                })
            })
            .collect();

        let mut expected = Vec::new();
        for task in tasks {
            expected.push(task.await.unwrap());
        }

        let mut stored = comment_ids(&store, &post.id).await.unwrap();
        stored.sort();
        expected.sort();
        assert_eq!(stored, expected);
    }

    #[tokio::test]
    async fn saving_a_stale_post_keeps_newer_comments() {
        let store = Store::memory();
        let mut post = post_by("alice");
        insert_post(&store, &post).await.unwrap();

        let loaded = find_post(&store, &post.id).await.unwrap().unwrap();
        let comment = comment_on(&post, "arrived mid-edit");
        insert_comment(&store, &comment).await.unwrap();

        post = loaded;
        post.title = "Rex, edited".to_string();
        save_post(&store, &post).await.unwrap();

        assert_eq!(comment_ids(&store, &post.id).await.unwrap(), vec![comment.id]);
    }
}
