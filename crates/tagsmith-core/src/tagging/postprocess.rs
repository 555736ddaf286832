//! Turning raw tagger logits into grouped, ranked tags.
//!
//! Selection rule: keep every class whose probability clears the threshold.
//! When fewer than `min_results` clear it, ignore the threshold and keep the
//! `min_results` most probable classes instead, so a request never comes back
//! nearly empty just because the model is unsure.

use crate::config::TaggingConfig;
use crate::math::sigmoid;
use crate::types::{ScoredTag, TagMap};

use super::table::TagTable;

/// Per-request tagging options.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TagOptions {
    /// Minimum probability for a tag to be kept
    pub threshold: f32,

    /// Maximum tags returned per category
    pub max_per_category: usize,

    /// Top-k fallback size when too few tags clear the threshold
    pub min_results: usize,
}

impl Default for TagOptions {
    fn default() -> Self {
        Self {
            threshold: 0.61,
            max_per_category: 50,
            min_results: 5,
        }
    }
}

impl From<&TaggingConfig> for TagOptions {
    fn from(config: &TaggingConfig) -> Self {
        Self {
            threshold: config.threshold,
            max_per_category: config.max_per_category,
            min_results: config.min_results,
        }
    }
}

/// Pick which model output holds the per-class logits.
///
/// Multi-head taggers emit a coarse head first and the refined head second,
/// so the second output wins when present.
pub fn logits_output_index(output_count: usize) -> Option<usize> {
    match output_count {
        0 => None,
        1 => Some(0),
        _ => Some(1),
    }
}

/// Element-wise sigmoid.
pub fn probabilities(logits: &[f32]) -> Vec<f32> {
    logits.iter().map(|&x| sigmoid(x)).collect()
}

/// Class indices to keep, per the threshold/top-k rule.
pub fn select_indices(probs: &[f32], threshold: f32, min_results: usize) -> Vec<usize> {
    let above: Vec<usize> = probs
        .iter()
        .enumerate()
        .filter(|(_, &p)| p >= threshold)
        .map(|(i, _)| i)
        .collect();

    if above.len() >= min_results {
        return above;
    }

    let mut ranked: Vec<usize> = (0..probs.len()).collect();
    ranked.sort_by(|&a, &b| probs[b].total_cmp(&probs[a]).then(a.cmp(&b)));
    ranked.truncate(min_results);
    ranked
}

/// Group selected classes by category, sort each group, and cap its size.
pub fn group_by_category(
    probs: &[f32],
    indices: &[usize],
    table: &TagTable,
    max_per_category: usize,
) -> TagMap {
    let mut grouped: TagMap = TagMap::new();

    for &idx in indices {
        let (Some(tag), Some(category), Some(&confidence)) =
            (table.tag(idx), table.category(idx), probs.get(idx))
        else {
            continue;
        };
        grouped
            .entry(category.to_string())
            .or_default()
            .push(ScoredTag {
                tag: tag.to_string(),
                confidence,
            });
    }

    for tags in grouped.values_mut() {
        // Stable sort keeps class-index order among equal confidences
        tags.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
        tags.truncate(max_per_category);
    }
    grouped.retain(|_, tags| !tags.is_empty());

    grouped
}

/// Full postprocessing: sigmoid, selection, grouping.
///
/// `logits` must have one entry per class in `table`.
pub fn postprocess(logits: &[f32], table: &TagTable, options: &TagOptions) -> TagMap {
    let probs = probabilities(logits);
    let indices = select_indices(&probs, options.threshold, options.min_results);
    group_by_category(&probs, &indices, table, options.max_per_category)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn logit(p: f32) -> f32 {
        (p / (1.0 - p)).ln()
    }

    fn table(entries: &[(&str, &str)]) -> TagTable {
        TagTable::new(
            entries
                .iter()
                .map(|(t, c)| (t.to_string(), c.to_string()))
                .collect(),
            448,
        )
    }

    #[test]
    fn test_output_selection() {
        assert_eq!(logits_output_index(0), None);
        assert_eq!(logits_output_index(1), Some(0));
        assert_eq!(logits_output_index(2), Some(1));
        assert_eq!(logits_output_index(3), Some(1));
    }

    #[test]
    fn test_fallback_returns_all_when_vocabulary_is_small() {
        let table = table(&[("sky", "general"), ("sakura", "general"), ("tree", "general")]);
        let logits = [logit(0.3), logit(0.8), logit(0.7)];

        let result = postprocess(&logits, &table, &TagOptions::default());

        // Only two clear 0.61, fewer than five, so the top-k path keeps all three
        let general = &result["general"];
        let names: Vec<&str> = general.iter().map(|t| t.tag.as_str()).collect();
        assert_eq!(names, vec!["sakura", "tree", "sky"]);
        assert!((general[0].confidence - 0.8).abs() < 1e-4);
        assert!((general[2].confidence - 0.3).abs() < 1e-4);
    }

    #[test]
    fn test_fallback_takes_exactly_min_results() {
        let probs: Vec<f32> = (0..20).map(|i| i as f32 / 100.0).collect();
        let selected = select_indices(&probs, 0.61, 5);
        assert_eq!(selected, vec![19, 18, 17, 16, 15]);
    }

    #[test]
    fn test_threshold_path_keeps_everything_above() {
        let mut probs = vec![0.1; 30];
        for p in probs.iter_mut().take(8) {
            *p = 0.9;
        }
        let selected = select_indices(&probs, 0.61, 5);
        assert_eq!(selected.len(), 8);
        assert!(selected.iter().all(|&i| probs[i] >= 0.61));
    }

    #[test]
    fn test_threshold_is_inclusive() {
        let probs = [0.5, 0.5, 0.5, 0.5, 0.5, 0.1];
        assert_eq!(select_indices(&probs, 0.5, 5), vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_ties_break_by_class_index() {
        let probs = [0.2, 0.4, 0.4, 0.4];
        assert_eq!(select_indices(&probs, 0.9, 2), vec![1, 2]);
    }

    #[test]
    fn test_groups_by_category_and_caps() {
        let table = table(&[
            ("a", "general"),
            ("b", "general"),
            ("c", "general"),
            ("miku", "character"),
            ("d", "general"),
            ("e", "general"),
        ]);
        let logits: Vec<f32> = [0.91, 0.95, 0.93, 0.99, 0.92, 0.94]
            .iter()
            .map(|&p| logit(p))
            .collect();
        let options = TagOptions {
            max_per_category: 3,
            ..TagOptions::default()
        };

        let result = postprocess(&logits, &table, &options);

        assert_eq!(result.len(), 2);
        assert_eq!(result["character"].len(), 1);
        let general: Vec<&str> = result["general"].iter().map(|t| t.tag.as_str()).collect();
        assert_eq!(general, vec!["b", "e", "c"]);
    }

    #[test]
    fn test_every_tag_appears_once() {
        let table = table(&[("x", "meta"), ("y", "meta"), ("z", "rating")]);
        let result = postprocess(&[3.0, 2.0, 1.0], &table, &TagOptions::default());
        let total: usize = result.values().map(Vec::len).sum();
        assert_eq!(total, 3);
    }
}
