pub mod client;
pub mod error;
pub mod parse;
pub mod prompt;

pub use client::{ContentGenerator, GeminiClient, MockGenerator};
pub use error::{GenerateError, ParseError};
pub use parse::{RepurposedContent, parse_generated};
pub use prompt::build_prompt;
