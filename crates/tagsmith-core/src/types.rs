//! Core data types shared by the tagging and resolution pipelines.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A predicted tag with its category, as listed by [`categorized_tags`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategorizedTag {
    /// Canonical tag name (e.g., "cherry_blossoms")
    pub tag: String,

    /// Category from the model metadata (e.g., "general", "character")
    pub category: String,

    /// Sigmoid probability from 0.0 to 1.0
    pub confidence: f32,
}

/// A tag and its confidence inside a category group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredTag {
    pub tag: String,
    pub confidence: f32,
}

/// Tagging output: category name to tags sorted by descending confidence.
pub type TagMap = BTreeMap<String, Vec<ScoredTag>>;

/// Flatten a category map into `tag -> confidence`.
pub fn flatten_tag_map(map: &TagMap) -> BTreeMap<String, f32> {
    map.values()
        .flatten()
        .map(|t| (t.tag.clone(), t.confidence))
        .collect()
}

/// List every tag in a category map, highest confidence first.
///
/// Ties keep category order, then the order within the category.
pub fn categorized_tags(map: &TagMap) -> Vec<CategorizedTag> {
    let mut tags: Vec<CategorizedTag> = map
        .iter()
        .flat_map(|(category, tags)| {
            tags.iter().map(move |t| CategorizedTag {
                tag: t.tag.clone(),
                category: category.clone(),
                confidence: t.confidence,
            })
        })
        .collect();
    tags.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
    tags
}

/// A canonical tag that a free-text candidate resolved to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TagMatch {
    /// Canonical tag name as stored in the vocabulary
    pub tag: String,

    /// Cosine similarity between the candidate and the canonical tag
    pub similarity: f32,
}

/// Canonical tags resolved from a free-text query.
///
/// Order follows keyword order in the decomposed query. Sign semantics
/// (e.g. a `-` prefix for exclusion) belong to the caller.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResolvedTags {
    pub positive: Vec<String>,
    pub negative: Vec<String>,
}

impl ResolvedTags {
    /// Whether neither list holds a tag.
    pub fn is_empty(&self) -> bool {
        self.positive.is_empty() && self.negative.is_empty()
    }
}

/// Full result of resolving a semantic query.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SemanticResolution {
    /// Canonical tags for the taggable part of the query
    pub tags: ResolvedTags,

    /// Style or mood description that could not be expressed as tags
    #[serde(skip_serializing_if = "Option::is_none")]
    pub residual_text: Option<String>,

    /// Dual-encoder embedding of `residual_text`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_map() -> TagMap {
        let mut map = TagMap::new();
        map.insert(
            "general".into(),
            vec![
                ScoredTag {
                    tag: "1girl".into(),
                    confidence: 0.9,
                },
                ScoredTag {
                    tag: "solo".into(),
                    confidence: 0.8,
                },
            ],
        );
        map.insert(
            "character".into(),
            vec![ScoredTag {
                tag: "hatsune_miku".into(),
                confidence: 0.7,
            }],
        );
        map
    }

    #[test]
    fn test_flatten_tag_map() {
        let flat = flatten_tag_map(&sample_map());
        assert_eq!(flat.len(), 3);
        assert!((flat["hatsune_miku"] - 0.7).abs() < f32::EPSILON);
    }

    #[test]
    fn test_categorized_tags_sorted_by_confidence() {
        let tags = categorized_tags(&sample_map());
        let order: Vec<_> = tags
            .iter()
            .map(|t| (t.tag.as_str(), t.category.as_str()))
            .collect();
        assert_eq!(
            order,
            vec![
                ("1girl", "general"),
                ("solo", "general"),
                ("hatsune_miku", "character"),
            ]
        );
        assert!(categorized_tags(&TagMap::new()).is_empty());
    }

    #[test]
    fn test_resolution_skips_empty_optionals() {
        let resolution = SemanticResolution::default();
        let json = serde_json::to_string(&resolution).unwrap();
        assert!(!json.contains("residual_text"));
        assert!(!json.contains("embedding"));
        assert!(resolution.tags.is_empty());
    }
}
