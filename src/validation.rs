//! Payload schemas for posts and comments.
//!
//! Payloads arrive either as urlencoded forms with bracketed keys
//! (`post[title]=...`) or as JSON bodies; both are normalised to a JSON value
//! before a [`Schema`] checks them. Every failing field contributes one
//! message and the messages are joined into a single 400.

use std::collections::HashSet;

use actix_web::http::header;
use actix_web::HttpRequest;
use ammonia::Builder;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::core::errors::AppError;
use crate::core::query_params::decode;

pub struct Field {
    pub name: &'static str,
    pub escape_html: bool,
}

pub struct Schema {
    pub root: &'static str,
    pub fields: &'static [Field],
}

pub const POST_SCHEMA: Schema = Schema {
    root: "post",
    fields: &[
        Field { name: "title", escape_html: true },
        Field { name: "image", escape_html: true },
        Field { name: "description", escape_html: true },
    ],
};

pub const COMMENT_SCHEMA: Schema = Schema {
    root: "comment",
    fields: &[Field { name: "body", escape_html: true }],
};

impl Schema {
    /// Every violation in `payload`, in field order.
    pub fn check(&self, payload: &Value) -> Vec<String> {
        let root = match payload.get(self.root) {
            None | Some(Value::Null) => return vec![format!("\"{}\" is required", self.root)],
            Some(Value::Object(root)) => root,
            Some(_) => return vec![format!("\"{}\" must be of type object", self.root)],
        };

        self.fields
            .iter()
            .filter_map(|field| {
                let label = format!("{}.{}", self.root, field.name);
                match root.get(field.name) {
                    None | Some(Value::Null) => Some(format!("\"{}\" is required", label)),
                    Some(Value::String(s)) if s.is_empty() => {
                        Some(format!("\"{}\" is not allowed to be empty", label))
                    }
                    Some(Value::String(s)) if field.escape_html && contains_markup(s) => {
                        Some(format!("\"{}\" must not include html!", label))
                    }
                    Some(Value::String(_)) => None,
                    Some(_) => Some(format!("\"{}\" must be a string", label)),
                }
            })
            .collect()
    }

    pub fn validate<T: DeserializeOwned>(&self, payload: &Value) -> Result<T, AppError> {
        let errors = self.check(payload);
        if !errors.is_empty() {
            return Err(AppError::Validation(errors.join(", ")));
        }

        serde_json::from_value(payload[self.root].clone())
            .map_err(|e| AppError::Validation(e.to_string()))
    }
}

fn sanitize_text(text: &str) -> String {
    Builder::default()
        .tags(HashSet::new())
        .clean(text)
        .to_string()
}

/// True when stripping every tag changes the text. Line endings are
/// normalised first: the HTML parser folds `\r\n` into `\n`, and browsers
/// submit textarea line breaks as `\r\n`.
pub fn contains_markup(text: &str) -> bool {
    let text = text.replace("\r\n", "\n").replace('\r', "\n");
    sanitize_text(&text) != text
}

/// Normalises a request body into a JSON value.
pub fn parse_payload(req: &HttpRequest, body: &[u8]) -> Result<Value, AppError> {
    let is_json = req
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.starts_with("application/json"));

    if is_json {
        return serde_json::from_slice(body)
            .map_err(|e| AppError::Validation(format!("Malformed JSON body: {}", e)));
    }

    let text = std::str::from_utf8(body)
        .map_err(|_| AppError::Validation("Body must be valid UTF-8".to_string()))?;
    Ok(parse_form(text))
}

/// Builds nested objects out of bracketed form keys: `post[title]=x` becomes
/// `{"post": {"title": "x"}}`.
pub fn parse_form(body: &str) -> Value {
    let mut root = Map::new();

    for pair in body.split('&').filter(|p| !p.is_empty()) {
        let (raw_key, raw_value) = pair.split_once('=').unwrap_or((pair, ""));
        let path = split_key(&decode(raw_key));
        insert_path(&mut root, &path, decode(raw_value));
    }

    Value::Object(root)
}

fn split_key(key: &str) -> Vec<String> {
    let (head, rest) = match key.find('[') {
        Some(idx) => key.split_at(idx),
        None => return vec![key.to_string()],
    };

    let mut path = vec![head.to_string()];
    path.extend(
        rest.split('[')
            .filter(|s| !s.is_empty())
            .map(|s| s.trim_end_matches(']').to_string()),
    );
    path
}

fn insert_path(root: &mut Map<String, Value>, path: &[String], value: String) {
    match path {
        [] => {}
        [last] => {
            root.insert(last.clone(), Value::String(value));
        }
        [head, rest @ ..] => {
            let child = root
                .entry(head.clone())
                .or_insert_with(|| Value::Object(Map::new()));
            if !child.is_object() {
                *child = Value::Object(Map::new());
            }
            if let Value::Object(child) = child {
                insert_path(child, rest, value);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::models::{CommentInput, PostInput};
    use serde_json::json;

    fn valid_post() -> Value {
        json!({"post": {
            "title": "Good boy",
            "image": "https://example.com/rex.jpg",
            "description": "Rex at the beach"
        }})
    }

    #[test]
    fn accepts_a_complete_post() {
        let input: PostInput = POST_SCHEMA.validate(&valid_post()).unwrap();
        assert_eq!(input.title, "Good boy");
        assert_eq!(input.image, "https://example.com/rex.jpg");
    }

    #[test]
    fn names_each_missing_field() {
        let payload = json!({"post": {"title": "Good boy"}});
        let err = POST_SCHEMA.validate::<PostInput>(&payload).unwrap_err();
        match err {
            AppError::Validation(msg) => assert_eq!(
                msg,
                "\"post.image\" is required, \"post.description\" is required"
            ),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn missing_root_is_reported() {
        let errors = COMMENT_SCHEMA.check(&json!({}));
        assert_eq!(errors, vec!["\"comment\" is required"]);

        let errors = COMMENT_SCHEMA.check(&json!({"comment": "hi"}));
        assert_eq!(errors, vec!["\"comment\" must be of type object"]);
    }

    #[test]
    fn rejects_markup_in_any_field() {
        let mut payload = valid_post();
        payload["post"]["description"] = json!("<script>alert(1)</script>");
        payload["post"]["title"] = json!("<b>bold</b>");

        let errors = POST_SCHEMA.check(&payload);
        assert_eq!(
            errors,
            vec![
                "\"post.title\" must not include html!",
                "\"post.description\" must not include html!",
            ]
        );
    }

    #[test]
    fn rejects_empty_and_non_string_values() {
        let payload = json!({"post": {"title": "", "image": 42, "description": "ok"}});
        let errors = POST_SCHEMA.check(&payload);
        assert_eq!(
            errors,
            vec![
                "\"post.title\" is not allowed to be empty",
                "\"post.image\" must be a string",
            ]
        );
    }

    #[test]
    fn multi_line_text_is_not_markup() {
        assert!(!contains_markup("Line one\r\nLine two"));
        assert!(!contains_markup("Line one\rLine two\n\nLine three"));
        assert!(contains_markup("Line one\r\n<b>Line two</b>"));

        let payload = json!({"post": {
            "title": "Rex",
            "image": "https://example.com/rex.jpg",
            "description": "Beach day.\r\nThen a nap."
        }});
        let input: PostInput = POST_SCHEMA.validate(&payload).unwrap();
        assert_eq!(input.description, "Beach day.\r\nThen a nap.");
    }

    #[test]
    fn plain_text_comments_pass() {
        let input: CommentInput = COMMENT_SCHEMA
            .validate(&json!({"comment": {"body": "What a cute pup"}}))
            .unwrap();
        assert_eq!(input.body, "What a cute pup");
        assert!(!contains_markup("What a cute pup"));
    }

    #[test]
    fn bracketed_form_keys_become_nested_objects() {
        let value = parse_form(
            "post%5Btitle%5D=Good+boy&post[image]=https%3A%2F%2Fexample.com%2Frex.jpg&post[description]=Rex&username=ann",
        );
        assert_eq!(value["post"]["title"], "Good boy");
        assert_eq!(value["post"]["image"], "https://example.com/rex.jpg");
        assert_eq!(value["post"]["description"], "Rex");
        assert_eq!(value["username"], "ann");
        assert!(POST_SCHEMA.check(&value).is_empty());
    }
}
