//! Semantic query resolution.
//!
//! Turns a natural-language search ("a girl in a red dress, no glasses,
//! moody film look") into canonical positive and negative tags plus an
//! optional dense vector for the parts tags cannot express.

pub mod prompt;
pub mod resolver;
pub mod schema;

pub use resolver::{QueryResolver, DEFAULT_MATCH_THRESHOLD};
pub use schema::{KeywordGroup, ParsedSemanticQuery};
