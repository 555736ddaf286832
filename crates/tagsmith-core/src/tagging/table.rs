//! Class index to tag/category lookup, built once from model metadata.
//!
//! The tagger ships a JSON sidecar shaped like:
//!
//! ```json
//! {
//!   "dataset_info": {
//!     "tag_mapping": {
//!       "idx_to_tag": { "0": "1girl", "1": "solo" },
//!       "tag_to_category": { "1girl": "general" }
//!     }
//!   },
//!   "model_info": { "img_size": 512 }
//! }
//! ```
//!
//! Loose keys are validated here so inference never deals with missing indices.

use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;

/// Category for tags the metadata does not classify.
pub const DEFAULT_CATEGORY: &str = "general";

#[derive(Deserialize)]
struct RawMetadata {
    dataset_info: RawDatasetInfo,
    model_info: RawModelInfo,
}

#[derive(Deserialize)]
struct RawDatasetInfo {
    tag_mapping: RawTagMapping,
}

#[derive(Deserialize)]
struct RawTagMapping {
    idx_to_tag: HashMap<String, String>,
    #[serde(default)]
    tag_to_category: HashMap<String, String>,
}

#[derive(Deserialize)]
struct RawModelInfo {
    img_size: u32,
}

/// Validated lookup table: dense class indices `0..len`.
#[derive(Debug, Clone)]
pub struct TagTable {
    tags: Vec<String>,
    categories: Vec<String>,
    image_size: u32,
}

impl TagTable {
    /// Build a table from `(tag, category)` pairs in class-index order.
    pub fn new(entries: Vec<(String, String)>, image_size: u32) -> Self {
        let (tags, categories) = entries.into_iter().unzip();
        Self {
            tags,
            categories,
            image_size,
        }
    }

    /// Parse and validate metadata JSON.
    pub fn from_json(text: &str) -> Result<Self, String> {
        let raw: RawMetadata =
            serde_json::from_str(text).map_err(|e| format!("Malformed tagger metadata: {e}"))?;

        let image_size = raw.model_info.img_size;
        if image_size == 0 {
            return Err("model_info.img_size must be > 0".to_string());
        }

        let mapping = raw.dataset_info.tag_mapping;
        let count = mapping.idx_to_tag.len();
        if count == 0 {
            return Err("idx_to_tag is empty".to_string());
        }

        let mut tags: Vec<Option<String>> = vec![None; count];
        for (key, tag) in mapping.idx_to_tag {
            let idx: usize = key
                .parse()
                .map_err(|_| format!("idx_to_tag key {key:?} is not a class index"))?;
            let slot = tags.get_mut(idx).ok_or_else(|| {
                format!("idx_to_tag index {idx} out of range for {count} classes")
            })?;
            *slot = Some(tag);
        }

        // Keys are unique and in range, so every slot is filled.
        let tags: Vec<String> = tags.into_iter().flatten().collect();
        if tags.len() != count {
            return Err("idx_to_tag indices are not contiguous".to_string());
        }

        let categories = tags
            .iter()
            .map(|tag| {
                mapping
                    .tag_to_category
                    .get(tag)
                    .cloned()
                    .unwrap_or_else(|| DEFAULT_CATEGORY.to_string())
            })
            .collect();

        Ok(Self {
            tags,
            categories,
            image_size,
        })
    }

    /// Read and validate a metadata file.
    pub fn load(path: &Path) -> Result<Self, String> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read tagger metadata {:?}: {e}", path))?;
        Self::from_json(&text)
    }

    /// Number of classes.
    pub fn len(&self) -> usize {
        self.tags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }

    /// Square input size the model expects.
    pub fn image_size(&self) -> u32 {
        self.image_size
    }

    pub fn tag(&self, idx: usize) -> Option<&str> {
        self.tags.get(idx).map(String::as_str)
    }

    pub fn category(&self, idx: usize) -> Option<&str> {
        self.categories.get(idx).map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const METADATA: &str = r#"{
        "dataset_info": {
            "tag_mapping": {
                "idx_to_tag": {"0": "1girl", "2": "hatsune_miku", "1": "solo"},
                "tag_to_category": {"1girl": "general", "hatsune_miku": "character"}
            },
            "total_tags": 3
        },
        "model_info": {"img_size": 512, "backbone": "vit"}
    }"#;

    #[test]
    fn test_from_json_orders_by_index() {
        let table = TagTable::from_json(METADATA).unwrap();
        assert_eq!(table.len(), 3);
        assert_eq!(table.image_size(), 512);
        assert_eq!(table.tag(0), Some("1girl"));
        assert_eq!(table.tag(1), Some("solo"));
        assert_eq!(table.tag(2), Some("hatsune_miku"));
        assert_eq!(table.category(2), Some("character"));
    }

    #[test]
    fn test_missing_category_defaults_to_general() {
        let table = TagTable::from_json(METADATA).unwrap();
        assert_eq!(table.category(1), Some(DEFAULT_CATEGORY));
    }

    #[test]
    fn test_rejects_gap_in_indices() {
        let json = r#"{
            "dataset_info": {"tag_mapping": {"idx_to_tag": {"0": "a", "2": "b"}}},
            "model_info": {"img_size": 448}
        }"#;
        let err = TagTable::from_json(json).unwrap_err();
        assert!(err.contains("out of range"));
    }

    #[test]
    fn test_rejects_non_numeric_index() {
        let json = r#"{
            "dataset_info": {"tag_mapping": {"idx_to_tag": {"zero": "a"}}},
            "model_info": {"img_size": 448}
        }"#;
        let err = TagTable::from_json(json).unwrap_err();
        assert!(err.contains("not a class index"));
    }

    #[test]
    fn test_rejects_missing_sections() {
        assert!(TagTable::from_json(r#"{"model_info": {"img_size": 448}}"#).is_err());
        assert!(TagTable::from_json("not json").is_err());
    }

    #[test]
    fn test_rejects_empty_vocabulary_and_zero_size() {
        let empty = r#"{
            "dataset_info": {"tag_mapping": {"idx_to_tag": {}}},
            "model_info": {"img_size": 448}
        }"#;
        assert!(TagTable::from_json(empty).is_err());

        let zero = r#"{
            "dataset_info": {"tag_mapping": {"idx_to_tag": {"0": "a"}}},
            "model_info": {"img_size": 0}
        }"#;
        assert!(TagTable::from_json(zero).is_err());
    }

    #[test]
    fn test_load_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("metadata.json");
        std::fs::write(&path, METADATA).unwrap();
        assert_eq!(TagTable::load(&path).unwrap().len(), 3);
        assert!(TagTable::load(&dir.path().join("missing.json")).is_err());
    }
}
