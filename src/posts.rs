use actix_web::{web, HttpRequest, HttpResponse};
use tracing::info;

use crate::auth::{login_required, post_author, Ownership};
use crate::comments::{comment_ids, find_comment};
use crate::config::*;
use crate::core::errors::{ApiError, AppError};
use crate::core::helpers::{checked_id, new_id, now};
use crate::core::query_params::{get_positive, parse_query_params};
use crate::core::session::Session;
use crate::core::store::Store;
use crate::models::models::{CommentDetail, Post, PostDetail, PostEntry, PostInput, PostPage};
use crate::templates::{self, render};
use crate::users::find_user;
use crate::validation::{parse_payload, POST_SCHEMA};
use crate::AppState;

pub async fn find_post(store: &Store, post_id: &str) -> anyhow::Result<Option<Post>> {
    store.get_json::<Post>(&post_key(post_id)).await
}

pub async fn save_post(store: &Store, post: &Post) -> anyhow::Result<()> {
    store.set_json(&post_key(&post.id), post).await
}

/// Persists a new post and prepends it to the global feed and the author's list.
pub async fn insert_post(store: &Store, post: &Post) -> anyhow::Result<()> {
    save_post(store, post).await?;
    store.list_push_front(FEED_KEY, &post.id).await?;
    store.list_push_front(&user_posts_key(&post.author), &post.id).await?;
    Ok(())
}

/// Deletes the post's comments first, then the post and its list entries.
/// Returns how many comments went with it.
pub async fn delete_post_cascade(store: &Store, post: &Post) -> anyhow::Result<usize> {
    let comments = comment_ids(store, &post.id).await?;
    for comment_id in &comments {
        store.delete(&comment_key(comment_id)).await?;
    }
    store.delete(&post_comments_key(&post.id)).await?;
    store.delete(&post_key(&post.id)).await?;
    store.list_remove(FEED_KEY, &post.id).await?;
    store.list_remove(&user_posts_key(&post.author), &post.id).await?;
    Ok(comments.len())
}

async fn load_posts(store: &Store, ids: &[String]) -> anyhow::Result<Vec<Post>> {
    let mut posts = Vec::with_capacity(ids.len());
    for id in ids {
        if let Some(p) = find_post(store, id).await? {
            posts.push(p);
        }
    }
    Ok(posts)
}

/// Newest-first slice of the global feed.
pub async fn recent_posts(store: &Store, offset: usize, count: usize) -> anyhow::Result<Vec<Post>> {
    let ids = store.list_range(FEED_KEY, offset, count).await?;
    load_posts(store, &ids).await
}

pub async fn posts_by_author(store: &Store, user_id: &str) -> anyhow::Result<Vec<Post>> {
    let ids = store.list_all(&user_posts_key(user_id)).await?;
    load_posts(store, &ids).await
}

/// Pairs each post with its comment ids for the JSON feed.
async fn feed_entries(store: &Store, posts: Vec<Post>) -> anyhow::Result<Vec<PostEntry>> {
    let mut entries = Vec::with_capacity(posts.len());
    for post in posts {
        let comments = comment_ids(store, &post.id).await?;
        entries.push(PostEntry { post, comments });
    }
    Ok(entries)
}

/// Resolves the post's author and every comment with its author.
/// Comment ids whose record is gone are skipped.
pub async fn populate(store: &Store, post: Post) -> anyhow::Result<PostDetail> {
    let author = find_user(store, &post.author).await?;

    let ids = comment_ids(store, &post.id).await?;
    let mut comments = Vec::with_capacity(ids.len());
    for comment_id in &ids {
        if let Some(comment) = find_comment(store, comment_id).await? {
            let author = find_user(store, &comment.author).await?;
            comments.push(CommentDetail { comment, author });
        }
    }

    Ok(PostDetail { post, author, comments })
}

fn post_not_found() -> AppError {
    AppError::NotFound("Post not found".to_string())
}

// === HTTP Handlers ===

pub async fn list_posts(state: web::Data<AppState>, session: Session) -> Result<HttpResponse, AppError> {
    let posts = recent_posts(&state.store, 0, POSTS_PER_PAGE).await?;
    render(&state, session, templates::posts_index_page(&posts)?).await
}

pub async fn api_list_posts(state: web::Data<AppState>, req: HttpRequest) -> Result<HttpResponse, ApiError> {
    let params = parse_query_params(req.query_string());
    let page = get_positive(&params, "page", 1)?;
    let size = get_positive(&params, "size", DEFAULT_API_PAGE_SIZE)?;
    if size > MAX_API_PAGE_SIZE {
        return Err(AppError::Validation(format!(
            "\"size\" must be less than or equal to {}",
            MAX_API_PAGE_SIZE
        ))
        .into());
    }

    let offset = (page - 1).checked_mul(size).ok_or_else(|| {
        AppError::Validation("\"page\" is too large".to_string())
    })?;
    let posts = recent_posts(&state.store, offset, size).await?;
    let data = feed_entries(&state.store, posts).await?;
    let total = state.store.list_len(FEED_KEY).await?;

    Ok(HttpResponse::Ok().json(PostPage { page, size, total, data }))
}

pub async fn new_post_form(
    state: web::Data<AppState>,
    session: Session,
    req: HttpRequest,
) -> Result<HttpResponse, AppError> {
    if session.user_id().is_none() {
        return login_required(&state, session, &req).await;
    }
    render(&state, session, templates::new_post_page()?).await
}

pub async fn create_post(
    state: web::Data<AppState>,
    mut session: Session,
    req: HttpRequest,
    body: web::Bytes,
) -> Result<HttpResponse, AppError> {
    let user_id = match session.user_id() {
        Some(uid) => uid.to_string(),
        None => return login_required(&state, session, &req).await,
    };

    let input: PostInput = POST_SCHEMA.validate(&parse_payload(&req, &body)?)?;

    let post = Post {
        id: new_id(),
        title: input.title,
        image: input.image,
        description: input.description,
        author: user_id,
        created_at: now(),
        updated_at: None,
    };
    insert_post(&state.store, &post).await?;
    info!(post_id = %post.id, author = %post.author, "post created");

    session.flash_success("Post Created Successfully!");
    session.redirect(&state, "/posts").await
}

pub async fn show_post(
    state: web::Data<AppState>,
    session: Session,
    path: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    let post = find_post(&state.store, checked_id(&path)?)
        .await?
        .ok_or_else(post_not_found)?;
    let detail = populate(&state.store, post).await?;

    let viewer = session.user_id().map(str::to_string);
    render(&state, session, templates::post_show_page(&detail, viewer.as_deref())?).await
}

pub async fn edit_post_form(
    state: web::Data<AppState>,
    session: Session,
    path: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    let post = find_post(&state.store, checked_id(&path)?)
        .await?
        .ok_or_else(post_not_found)?;
    render(&state, session, templates::edit_post_page(&post)?).await
}

pub async fn update_post(
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
    let post_id = path.into_inner();

    let mut post = match post_author(&state.store, &post_id, &user_id).await? {
        Ownership::Owner(post) => post,
        Ownership::NotOwner => return session.redirect(&state, &format!("/posts/{}", post_id)).await,
    };

    let input: PostInput = POST_SCHEMA.validate(&parse_payload(&req, &body)?)?;
    post.title = input.title;
    post.image = input.image;
    post.description = input.description;
    post.updated_at = Some(now());
    save_post(&state.store, &post).await?;
    info!(post_id = %post.id, "post updated");

    session.flash_success("Post Edited Successfully!");
    session.redirect(&state, &format!("/posts/{}", post.id)).await
}

pub async fn delete_post(
    state: web::Data<AppState>,
    mut session: Session,
    req: HttpRequest,
    path: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    let user_id = match session.user_id() {
        Some(uid) => uid.to_string(),
        None => return login_required(&state, session, &req).await,
    };
    let post_id = path.into_inner();

    let post = match post_author(&state.store, &post_id, &user_id).await? {
        Ownership::Owner(post) => post,
        Ownership::NotOwner => return session.redirect(&state, &format!("/posts/{}", post_id)).await,
    };

    let comments = delete_post_cascade(&state.store, &post).await?;
    info!(post_id = %post.id, comments, "post deleted");

    session.flash_success("Post Deleted");
    session.redirect(&state, "/posts").await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comments::insert_comment;
    use crate::models::models::Comment;

    fn post_by(author: &str, title: &str) -> Post {
        Post {
            id: new_id(),
            title: title.to_string(),
            image: "https://example.com/dog.jpg".to_string(),
            description: "A dog".to_string(),
            author: author.to_string(),
            created_at: now(),
            updated_at: None,
        }
    }

    #[tokio::test]
    async fn feed_pages_are_newest_first_without_overlap() {
        let store = Store::memory();
        for i in 0..5 {
            insert_post(&store, &post_by("alice", &format!("dog {}", i))).await.unwrap();
        }

        let first: Vec<String> = recent_posts(&store, 0, 2).await.unwrap().into_iter().map(|p| p.title).collect();
        let second: Vec<String> = recent_posts(&store, 2, 2).await.unwrap().into_iter().map(|p| p.title).collect();
        let third: Vec<String> = recent_posts(&store, 4, 2).await.unwrap().into_iter().map(|p| p.title).collect();

        assert_eq!(first, vec!["dog 4", "dog 3"]);
        assert_eq!(second, vec!["dog 2", "dog 1"]);
        assert_eq!(third, vec!["dog 0"]);
    }

    #[tokio::test]
    async fn cascade_removes_comments_and_list_entries() {
        let store = Store::memory();
        let post = post_by("alice", "Rex");
        insert_post(&store, &post).await.unwrap();

        let comment = Comment {
            id: new_id(),
            body: "cute".to_string(),
            author: "bob".to_string(),
            post_id: post.id.clone(),
            created_at: now(),
        };
        insert_comment(&store, &comment).await.unwrap();

        assert_eq!(delete_post_cascade(&store, &post).await.unwrap(), 1);

        assert!(find_post(&store, &post.id).await.unwrap().is_none());
        assert!(find_comment(&store, &comment.id).await.unwrap().is_none());
        assert_eq!(store.list_len(FEED_KEY).await.unwrap(), 0);
        assert!(posts_by_author(&store, "alice").await.unwrap().is_empty());
        assert!(comment_ids(&store, &post.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn populate_skips_dangling_comment_ids() {
        let store = Store::memory();
        let post = post_by("alice", "Rex");
        insert_post(&store, &post).await.unwrap();
        store
            .list_push_back(&post_comments_key(&post.id), &new_id())
            .await
            .unwrap();

        let detail = populate(&store, post).await.unwrap();
        assert!(detail.comments.is_empty());
        assert!(detail.author.is_none());
    }
}
