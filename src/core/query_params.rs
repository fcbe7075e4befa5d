use std::collections::HashMap;

use crate::core::errors::AppError;

/// Parse a query string (`page=2&size=6`) into a map.
///
/// Handles URL decoding (`+` counts as a space). Multiple values for the same
/// key are not supported (only the last is kept).
pub fn parse_query_params(query: &str) -> HashMap<String, String> {
    let mut params = HashMap::new();

    for param in query.trim_start_matches('?').split('&') {
        if param.is_empty() {
            continue;
        }
        match param.split_once('=') {
            Some((key, value)) => {
                params.insert(decode(key), decode(value));
            }
            // Flag parameter without value
            None => {
                params.insert(decode(param), String::new());
            }
        }
    }

    params
}

pub fn decode(raw: &str) -> String {
    let spaced = raw.replace('+', " ");
    urlencoding::decode(&spaced)
        .map(|s| s.into_owned())
        .unwrap_or(spaced)
}

/// Get a strictly positive integer parameter, or `default` when absent.
pub fn get_positive(
    params: &HashMap<String, String>,
    key: &str,
    default: usize,
) -> Result<usize, AppError> {
    let Some(raw) = params.get(key) else {
        return Ok(default);
    };

    match raw.trim().parse::<usize>() {
        Ok(value) if value > 0 => Ok(value),
        _ => Err(AppError::Validation(format!(
            "\"{}\" must be a positive integer",
            key
        ))),
    }
}
