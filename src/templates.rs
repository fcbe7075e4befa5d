//! HTML pages.
//!
//! Page skeletons are embedded from `templates/` and carry `{{NAME}}`
//! placeholders. [`fill`] substitutes them in a single pass, so text coming
//! from users is never re-scanned for placeholders. Every user-supplied value
//! is escaped before it is substituted.

use std::sync::OnceLock;

use actix_web::HttpResponse;
use html_escape::{encode_double_quoted_attribute, encode_text};
use regex::{Captures, Regex};
use rust_embed::RustEmbed;

use crate::core::errors::AppError;
use crate::core::session::{Flash, Session};
use crate::models::models::{CommentDetail, Post, PostDetail, User};
use crate::users::find_user;
use crate::AppState;

#[derive(RustEmbed)]
#[folder = "templates"]
struct Templates;

pub struct Page {
    pub title: String,
    pub body: String,
}

fn placeholder_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| Regex::new(r"\{\{([A-Z_]+)\}\}").expect("Regex should compile"))
}

fn url_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| Regex::new(r"https?://[^\s]+").expect("Regex should compile"))
}

fn load_template(name: &str) -> anyhow::Result<String> {
    let file = Templates::get(name).ok_or_else(|| anyhow::anyhow!("Template {} not found", name))?;
    Ok(String::from_utf8(file.data.to_vec())?)
}

/// Replaces every `{{NAME}}` with its value; unknown names become empty.
pub fn fill(template: &str, values: &[(&str, String)]) -> String {
    placeholder_regex()
        .replace_all(template, |caps: &Captures| {
            values
                .iter()
                .find(|(name, _)| *name == &caps[1])
                .map(|(_, value)| value.clone())
                .unwrap_or_default()
        })
        .into_owned()
}

/// Escapes `text` and turns http(s) URLs in it into links.
pub fn linkify(text: &str) -> String {
    let mut html = String::with_capacity(text.len());
    let mut last = 0;

    for found in url_regex().find_iter(text) {
        html.push_str(&encode_text(&text[last..found.start()]));
        let url = found.as_str();
        html.push_str(&format!(
            r#"<a href="{}" target="_blank" rel="noopener noreferrer">{}</a>"#,
            encode_double_quoted_attribute(url),
            encode_text(url)
        ));
        last = found.end();
    }
    html.push_str(&encode_text(&text[last..]));
    html
}

fn flash_html(flash: &Flash) -> String {
    let success = flash
        .success
        .iter()
        .map(|msg| format!(r#"<div class="notification is-success">{}</div>"#, encode_text(msg)));
    let error = flash
        .error
        .iter()
        .map(|msg| format!(r#"<div class="notification is-danger">{}</div>"#, encode_text(msg)));
    success.chain(error).collect()
}

fn nav_html(current_user: Option<&User>) -> String {
    match current_user {
        Some(user) => format!(
            r#"<a class="navbar-item" href="/users/{}">{}</a><a class="navbar-item" href="/logout">Logout</a>"#,
            user.id,
            encode_text(&user.username)
        ),
        None => r#"<a class="navbar-item" href="/login">Login</a><a class="navbar-item" href="/register">Register</a>"#
            .to_string(),
    }
}

/// Wraps `page` in the site layout. `nav` fills the account links slot.
fn layout(page: &Page, nav: String, flash: &Flash) -> anyhow::Result<String> {
    let template = load_template("layout.html")?;
    Ok(fill(
        &template,
        &[
            ("TITLE", encode_text(&page.title).into_owned()),
            ("NAV", nav),
            ("FLASH", flash_html(flash)),
            ("BODY", page.body.clone()),
        ],
    ))
}

/// Renders `page` for the session's user, draining its flash queue.
pub async fn render(state: &AppState, mut session: Session, page: Page) -> Result<HttpResponse, AppError> {
    let current_user = match session.user_id() {
        Some(user_id) => find_user(&state.store, user_id).await?,
        None => None,
    };
    let flash = session.drain_flash();
    session.save(&state.store).await?;

    let html = layout(&page, nav_html(current_user.as_ref()), &flash)?;
    Ok(HttpResponse::Ok()
        .content_type("text/html; charset=utf-8")
        .cookie(session.cookie(&state.cookie_key))
        .body(html))
}

/// Error pages are built without the request, so they carry no account links.
pub fn error_page(status: u16, message: &str) -> String {
    let page = load_template("error.html").map(|template| Page {
        title: "Error".to_string(),
        body: fill(
            &template,
            &[
                ("STATUS", status.to_string()),
                ("MESSAGE", encode_text(message).into_owned()),
            ],
        ),
    });

    page.and_then(|page| layout(&page, String::new(), &Flash::default()))
        .unwrap_or_else(|_| format!("<h1>{}</h1><p>{}</p>", status, encode_text(message)))
}

fn post_card(post: &Post) -> String {
    format!(
        r#"<div class="column is-one-third">
  <div class="box has-text-centered index-box">
    <a href="/posts/{id}">
      <h4 class="title is-5">{title}</h4>
      <figure class="image"><img src="{image}" alt="{alt}"></figure>
    </a>
    <a href="/posts/{id}" class="card-footer-item">View Full Post!</a>
  </div>
</div>"#,
        id = post.id,
        title = encode_text(&post.title),
        image = encode_double_quoted_attribute(&post.image),
        alt = encode_double_quoted_attribute(&post.title),
    )
}

fn author_link(author: Option<&User>) -> String {
    match author {
        Some(user) => format!(r#"<a href="/users/{}">{}</a>"#, user.id, encode_text(&user.username)),
        None => "unknown".to_string(),
    }
}

fn comment_html(post_id: &str, detail: &CommentDetail, viewer: Option<&str>) -> String {
    let delete = if viewer == Some(detail.comment.author.as_str()) {
        format!(
            r#"<form action="/posts/{}/comments/{}?_method=DELETE" method="POST"><button class="button is-small is-danger">Delete</button></form>"#,
            post_id, detail.comment.id
        )
    } else {
        String::new()
    };

    format!(
        r#"<article class="media"><div class="media-content"><p><strong>{}</strong><br>{}</p></div>{}</article>"#,
        author_link(detail.author.as_ref()),
        linkify(&detail.comment.body),
        delete
    )
}

pub fn home_page() -> anyhow::Result<Page> {
    Ok(Page {
        title: "Home".to_string(),
        body: load_template("home.html")?,
    })
}

pub fn posts_index_page(posts: &[Post]) -> anyhow::Result<Page> {
    let cards: String = posts.iter().map(post_card).collect();
    Ok(Page {
        title: "All Posts".to_string(),
        body: fill(&load_template("posts/index.html")?, &[("POSTS", cards)]),
    })
}

pub fn post_show_page(detail: &PostDetail, viewer: Option<&str>) -> anyhow::Result<Page> {
    let post = &detail.post;
    let is_owner = viewer == Some(post.author.as_str());

    let owner_controls = if is_owner {
        format!(
            r#"<a class="button is-info" href="/posts/{id}/edit">Edit</a>
<form class="is-inline" action="/posts/{id}?_method=DELETE" method="POST"><button class="button is-danger">Delete</button></form>"#,
            id = post.id
        )
    } else {
        String::new()
    };

    let comments: String = detail
        .comments
        .iter()
        .map(|c| comment_html(&post.id, c, viewer))
        .collect();

    let comment_form = if viewer.is_some() {
        fill(&load_template("posts/comment_form.html")?, &[("POST_ID", post.id.clone())])
    } else {
        r#"<p><a href="/login">Log in</a> to leave a comment.</p>"#.to_string()
    };

    let edited = post
        .updated_at
        .map(|at| format!(" (edited {})", at.format("%b %e, %Y")))
        .unwrap_or_default();

    Ok(Page {
        title: post.title.clone(),
        body: fill(
            &load_template("posts/show.html")?,
            &[
                ("POST_TITLE", encode_text(&post.title).into_owned()),
                ("POST_ALT", encode_double_quoted_attribute(&post.title).into_owned()),
                ("POST_IMAGE", encode_double_quoted_attribute(&post.image).into_owned()),
                ("POST_DESCRIPTION", linkify(&post.description)),
                ("POST_AUTHOR", author_link(detail.author.as_ref())),
                ("POST_DATE", format!("{}{}", post.created_at.format("%b %e, %Y"), edited)),
                ("OWNER_CONTROLS", owner_controls),
                ("COMMENT_COUNT", detail.comments.len().to_string()),
                ("COMMENTS", comments),
                ("COMMENT_FORM", comment_form),
            ],
        ),
    })
}

pub fn new_post_page() -> anyhow::Result<Page> {
    Ok(Page {
        title: "New Post".to_string(),
        body: load_template("posts/new.html")?,
    })
}

pub fn edit_post_page(post: &Post) -> anyhow::Result<Page> {
    Ok(Page {
        title: format!("Edit {}", post.title),
        body: fill(
            &load_template("posts/edit.html")?,
            &[
                ("POST_ID", post.id.clone()),
                ("POST_TITLE", encode_double_quoted_attribute(&post.title).into_owned()),
                ("POST_IMAGE", encode_double_quoted_attribute(&post.image).into_owned()),
                ("POST_DESCRIPTION", encode_text(&post.description).into_owned()),
            ],
        ),
    })
}

pub fn register_page() -> anyhow::Result<Page> {
    Ok(Page {
        title: "Register".to_string(),
        body: load_template("users/register.html")?,
    })
}

pub fn login_page() -> anyhow::Result<Page> {
    Ok(Page {
        title: "Login".to_string(),
        body: load_template("users/login.html")?,
    })
}

pub fn profile_page(user: &User, posts: &[Post], total_posts: usize) -> anyhow::Result<Page> {
    let cards: String = posts.iter().map(post_card).collect();
    Ok(Page {
        title: user.username.clone(),
        body: fill(
            &load_template("users/profile.html")?,
            &[
                ("PROFILE_USERNAME", encode_text(&user.username).into_owned()),
                ("PROFILE_JOINED", user.created_at.format("%b %e, %Y").to_string()),
                ("PROFILE_TOTAL_POSTS", total_posts.to_string()),
                ("POSTS", cards),
            ],
        ),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::helpers::{new_id, now};

    #[test]
    fn fill_is_single_pass() {
        let html = fill(
            "<h1>{{TITLE}}</h1><p>{{BODY}}</p>{{MISSING}}",
            &[("TITLE", "{{BODY}}".to_string()), ("BODY", "hello".to_string())],
        );
        assert_eq!(html, "<h1>{{BODY}}</h1><p>hello</p>");
    }

    #[test]
    fn linkify_escapes_around_links() {
        let html = linkify("see https://example.com/a?b=1&c=2 & <enjoy>");
        assert_eq!(
            html,
            "see <a href=\"https://example.com/a?b=1&amp;c=2\" target=\"_blank\" rel=\"noopener noreferrer\">https://example.com/a?b=1&amp;c=2</a> &amp; &lt;enjoy&gt;"
        );
    }

    #[test]
    fn user_text_is_escaped_in_pages() {
        let post = Post {
            id: new_id(),
            title: "\"><script>alert(1)</script>".to_string(),
            image: "https://example.com/dog.jpg".to_string(),
            description: "dog".to_string(),
            author: new_id(),
            created_at: now(),
            updated_at: None,
        };

        let page = posts_index_page(&[post.clone()]).unwrap();
        assert!(!page.body.contains("<script>"));
        assert!(page.body.contains(&format!("/posts/{}", post.id)));

        let edit = edit_post_page(&post).unwrap();
        assert!(!edit.body.contains("<script>"));
        assert!(edit.body.contains(&format!("/posts/{}?_method=PUT", post.id)));
    }

    #[test]
    fn owner_sees_edit_controls_others_do_not() {
        let author = new_id();
        let detail = PostDetail {
            post: Post {
                id: new_id(),
                title: "Rex".to_string(),
                image: "https://example.com/rex.jpg".to_string(),
                description: "Good boy".to_string(),
                author: author.clone(),
                created_at: now(),
                updated_at: None,
            },
            author: None,
            comments: Vec::new(),
        };

        let own = post_show_page(&detail, Some(&author)).unwrap();
        assert!(own.body.contains("?_method=DELETE"));
        assert!(own.body.contains("comment[body]"));

        let other = post_show_page(&detail, None).unwrap();
        assert!(!other.body.contains("?_method=DELETE"));
        assert!(!other.body.contains("comment[body]"));
    }

    #[test]
    fn error_page_shows_status_and_message() {
        let html = error_page(404, "Page Not found!");
        assert!(html.contains("404"));
        assert!(html.contains("Page Not found!"));
        assert!(!html.contains("href=\"/login\""));
        assert!(!html.contains("href=\"/logout\""));
    }
}
