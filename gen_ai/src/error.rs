use thiserror::Error;

use common::error::AppError;

/// The model's reply did not match the expected schema. Parsing fails
/// closed; there is no salvage path that slices raw text into the four
/// formats.
#[derive(Error, Debug)]
pub enum ParseError {
    #[error("generated content is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Error, Debug)]
pub enum GenerateError {
    #[error("generation request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("generation API returned status {status}: {body}")]
    Api { status: u16, body: String },

    #[error("generation API returned no candidates")]
    EmptyResponse,

    #[error(transparent)]
    Parse(#[from] ParseError),
}

impl From<GenerateError> for AppError {
    fn from(err: GenerateError) -> Self {
        AppError::Upstream(err.to_string())
    }
}
