//! Instructions for the decomposition call.

use crate::config::LlmConfig;
use crate::llm::LlmRequest;

/// System prompt: tag-vocabulary expert with a strict JSON contract.
pub const SYSTEM_PROMPT: &str = r#"You are an image search expert fluent in the Danbooru tag vocabulary.
Split the user's natural-language search into tags.

Tags:
- Identify the concrete visual elements the user wants and does not want.
- Give 3-5 candidate tags per keyword, best guess first: the core tag, then attribute tags, then synonyms.
- Format: all lowercase, spaces become underscores. Bind characters to their series as character_(series), e.g. keqing_(genshin_impact).

Residual:
- Put style, mood, lighting or composition that no tag can express into residual_text as a short English phrase.
- Use null when everything is covered by tags.

Output strict JSON with exactly these fields and no comments:
{
  "positive": {"keyword": ["tag1", "tag2", "tag3"]},
  "negative": {"unwanted keyword": ["tag1", "tag2"]},
  "residual_text": "description" | null
}

Example:
Input: a cyberpunk hatsune miku in a black sailor uniform, no glasses, neon rim light
Output: {
  "positive": {
    "hatsune miku": ["hatsune_miku", "vocaloid", "aqua_hair", "twintails"],
    "black sailor uniform": ["black_serafuku", "serafuku", "school_uniform", "sailor_collar"]
  },
  "negative": {
    "glasses": ["glasses", "eyewear", "bespectacled"]
  },
  "residual_text": "cyberpunk style, neon rim lighting"
}

Example:
Input: a cozy everyday scene
Output: {"positive": {}, "negative": {}, "residual_text": "cozy everyday scene"}
"#;

/// Build the single request for `query`.
pub fn decomposition_request(query: &str, config: &LlmConfig) -> LlmRequest {
    LlmRequest {
        system: SYSTEM_PROMPT.to_string(),
        user: format!("Input: {}\nOutput: ", query.trim()),
        max_tokens: config.max_tokens,
        temperature: config.temperature,
        json: true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolve::schema::ParsedSemanticQuery;

    #[test]
    fn test_request_carries_query_and_settings() {
        let config = LlmConfig::default();
        let request = decomposition_request("  red dress  ", &config);
        assert_eq!(request.user, "Input: red dress\nOutput: ");
        assert!(request.json);
        assert_eq!(request.max_tokens, config.max_tokens);
    }

    #[test]
    fn test_prompt_mentions_every_required_field() {
        for field in ["positive", "negative", "residual_text"] {
            assert!(SYSTEM_PROMPT.contains(field));
        }
    }

    #[test]
    fn test_examples_satisfy_schema() {
        let example = r#"{"positive": {}, "negative": {}, "residual_text": "cozy everyday scene"}"#;
        assert!(SYSTEM_PROMPT.contains(example));
        assert!(ParsedSemanticQuery::parse(example).is_ok());
    }
}
