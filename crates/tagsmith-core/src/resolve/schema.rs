//! The decomposition contract the language model must honour.
//!
//! ```json
//! {
//!   "positive": { "red dress": ["red_dress", "crimson_dress"] },
//!   "negative": { "glasses": ["glasses", "eyewear"] },
//!   "residual_text": "soft film grain, golden hour"
//! }
//! ```
//!
//! All three fields are required; `residual_text` may be `null`. Keyword
//! order is preserved as written. Anything else is a decomposition error.

use serde_json::{Map, Value};

use crate::error::PipelineError;

/// One keyword and its candidate tags, best guess first.
#[derive(Debug, Clone, PartialEq)]
pub struct KeywordGroup {
    pub keyword: String,
    pub candidates: Vec<String>,
}

/// Validated language-model output.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedSemanticQuery {
    pub positive: Vec<KeywordGroup>,
    pub negative: Vec<KeywordGroup>,
    pub residual_text: Option<String>,
}

impl ParsedSemanticQuery {
    /// Parse raw model output, tolerating a surrounding markdown code fence.
    pub fn parse(raw: &str) -> Result<Self, PipelineError> {
        let body = strip_code_fence(raw);
        let value: Value = serde_json::from_str(body)
            .map_err(|e| decomposition(format!("Output is not valid JSON: {e}")))?;

        let Value::Object(root) = value else {
            return Err(decomposition("Output is not a JSON object"));
        };

        let positive = keyword_groups(&root, "positive")?;
        let negative = keyword_groups(&root, "negative")?;
        let residual_text = match root.get("residual_text") {
            None => return Err(decomposition("Missing field `residual_text`")),
            Some(Value::Null) => None,
            Some(Value::String(s)) => Some(s.trim().to_string()).filter(|s| !s.is_empty()),
            Some(other) => {
                return Err(decomposition(format!(
                    "`residual_text` must be a string or null, got {other}"
                )));
            }
        };

        Ok(Self {
            positive,
            negative,
            residual_text,
        })
    }
}

fn keyword_groups(root: &Map<String, Value>, field: &str) -> Result<Vec<KeywordGroup>, PipelineError> {
    let Some(value) = root.get(field) else {
        return Err(decomposition(format!("Missing field `{field}`")));
    };
    let Value::Object(map) = value else {
        return Err(decomposition(format!("`{field}` must be an object")));
    };

    map.iter()
        .map(|(keyword, candidates)| {
            let Value::Array(items) = candidates else {
                return Err(decomposition(format!(
                    "`{field}.{keyword}` must be an array of strings"
                )));
            };
            let candidates = items
                .iter()
                .map(|item| match item {
                    Value::String(s) => Ok(s.clone()),
                    other => Err(decomposition(format!(
                        "`{field}.{keyword}` contains non-string {other}"
                    ))),
                })
                .collect::<Result<Vec<_>, _>>()?;
            Ok(KeywordGroup {
                keyword: keyword.clone(),
                candidates,
            })
        })
        .collect()
}

/// Drop a leading ```/```json fence and its closing fence, if present.
fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.split_once('\n').map(|(_, body)| body).unwrap_or("");
    rest.trim_end().strip_suffix("```").unwrap_or(rest).trim()
}

fn decomposition(message: impl Into<String>) -> PipelineError {
    PipelineError::Decomposition {
        message: message.into(),
    }
}
