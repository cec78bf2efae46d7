use serde::{Deserialize, Serialize};

use crate::error::ParseError;

/// The four derived formats every generation produces.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepurposedContent {
    /// Short social posts with hashtags.
    pub social: String,
    /// Newsletter body with a subject line.
    pub email: String,
    /// Professional thread for LinkedIn.
    pub linkedin: String,
    /// Short-form video script.
    pub youtube: String,
}

/// Strict parse of the model's reply into [`RepurposedContent`].
///
/// The model is instructed to answer with a JSON object carrying
/// exactly the four keys; a markdown code fence around that object is
/// tolerated since models add one routinely. Anything else is a
/// [`ParseError`] and the caller compensates the consumed quota.
pub fn parse_generated(raw: &str) -> Result<RepurposedContent, ParseError> {
    let body = strip_code_fence(raw);
    Ok(serde_json::from_str(body)?)
}

fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    let rest = rest.trim_start();
    let rest = rest.trim_end();
    rest.strip_suffix("```").map(str::trim_end).unwrap_or(rest)
}
