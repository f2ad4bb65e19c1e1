//! Pattern Selector — picks the arrangement archetype for a slide.
//!
//! # Selection rules
//! - A structure-preference hint wins when it is feasible for the container count.
//! - Otherwise by count: 1 → single-focal; 2–3 → rule-of-thirds (high density) or
//!   golden-ratio; 4 → z-pattern (headline present) or grid; ≥5 → grid.
//! - Nothing here returns an error; the last resort is a vertical stack.

use serde::{Deserialize, Serialize};

use crate::models::slide::{
    ContainerRole, ContentDensity, SemanticContainer, SlideHints, StructurePreference,
};

pub const GOLDEN_RATIOS: [f64; 2] = [0.618, 0.382];
pub const THIRDS_RATIOS: [f64; 2] = [0.667, 0.333];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Pattern {
    SingleFocal,
    VerticalStack,
    HorizontalSplit,
    Grid,
    GoldenRatio,
    RuleOfThirds,
    ZPattern,
    Symmetrical,
}

impl Pattern {
    pub fn name(&self) -> &'static str {
        match self {
            Pattern::SingleFocal => "single_focal",
            Pattern::VerticalStack => "vertical_stack",
            Pattern::HorizontalSplit => "horizontal_split",
            Pattern::Grid => "grid",
            Pattern::GoldenRatio => "golden_ratio",
            Pattern::RuleOfThirds => "rule_of_thirds",
            Pattern::ZPattern => "z_pattern",
            Pattern::Symmetrical => "symmetrical",
        }
    }

    pub fn from_name(name: &str) -> Option<Pattern> {
        let normalized = name.trim().to_lowercase().replace(['-', ' '], "_");
        let pattern = match normalized.as_str() {
            "single_focal" => Pattern::SingleFocal,
            "vertical_stack" | "vertical" => Pattern::VerticalStack,
            "horizontal_split" | "horizontal" => Pattern::HorizontalSplit,
            "grid" => Pattern::Grid,
            "golden_ratio" => Pattern::GoldenRatio,
            "rule_of_thirds" => Pattern::RuleOfThirds,
            "z_pattern" => Pattern::ZPattern,
            "symmetrical" => Pattern::Symmetrical,
            _ => return None,
        };
        Some(pattern)
    }

    /// Whether the pattern can place `count` containers.
    pub fn is_feasible(&self, count: usize) -> bool {
        match self {
            Pattern::SingleFocal => count == 1,
            Pattern::VerticalStack => (1..=6).contains(&count),
            Pattern::HorizontalSplit => (2..=4).contains(&count),
            Pattern::Grid => count >= 2,
            Pattern::GoldenRatio => (2..=4).contains(&count),
            Pattern::RuleOfThirds => (2..=3).contains(&count),
            Pattern::ZPattern => (3..=4).contains(&count),
            Pattern::Symmetrical => (2..=7).contains(&count),
        }
    }

    /// Auxiliary split ratios the pattern emits by default. Empty = equal/weight-driven.
    pub fn default_ratios(&self) -> Vec<f64> {
        match self {
            Pattern::GoldenRatio | Pattern::ZPattern => GOLDEN_RATIOS.to_vec(),
            Pattern::RuleOfThirds => THIRDS_RATIOS.to_vec(),
            _ => Vec::new(),
        }
    }

    /// True when the pattern's split ratios matter to the calculator.
    pub fn uses_ratios(&self) -> bool {
        matches!(
            self,
            Pattern::GoldenRatio | Pattern::RuleOfThirds | Pattern::ZPattern
        )
    }
}

impl From<StructurePreference> for Pattern {
    fn from(pref: StructurePreference) -> Self {
        match pref {
            StructurePreference::SingleFocal => Pattern::SingleFocal,
            StructurePreference::Vertical => Pattern::VerticalStack,
            StructurePreference::Horizontal => Pattern::HorizontalSplit,
            StructurePreference::Grid => Pattern::Grid,
            StructurePreference::GoldenRatio => Pattern::GoldenRatio,
            StructurePreference::RuleOfThirds => Pattern::RuleOfThirds,
            StructurePreference::ZPattern => Pattern::ZPattern,
            StructurePreference::Symmetrical => Pattern::Symmetrical,
        }
    }
}

/// Where a pattern choice came from. Reported for transparency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChoiceSource {
    Hint,
    Heuristic,
    Strategy,
    Fallback,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatternChoice {
    pub pattern: Pattern,
    pub split_ratios: Vec<f64>,
    pub source: ChoiceSource,
}

impl PatternChoice {
    pub fn new(pattern: Pattern, source: ChoiceSource) -> Self {
        Self {
            pattern,
            split_ratios: pattern.default_ratios(),
            source,
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Selection
// ────────────────────────────────────────────────────────────────────────────

/// Chooses a pattern for the given containers and hints. Never fails.
pub fn select_pattern(containers: &[SemanticContainer], hints: &SlideHints) -> PatternChoice {
    let count = containers.len();

    if let Some(pref) = hints.structure_preference {
        let hinted = Pattern::from(pref);
        if hinted.is_feasible(count) {
            return PatternChoice::new(hinted, ChoiceSource::Hint);
        }
    }

    let has_headline = containers.iter().any(|c| c.role == ContainerRole::Headline);
    let pattern = match count {
        0 => return PatternChoice::new(Pattern::VerticalStack, ChoiceSource::Fallback),
        1 => Pattern::SingleFocal,
        2 | 3 => {
            if hints.content_density == ContentDensity::High {
                Pattern::RuleOfThirds
            } else {
                Pattern::GoldenRatio
            }
        }
        4 => {
            if has_headline {
                Pattern::ZPattern
            } else {
                Pattern::Grid
            }
        }
        _ => Pattern::Grid,
    };

    if pattern.is_feasible(count) {
        PatternChoice::new(pattern, ChoiceSource::Heuristic)
    } else {
        PatternChoice::new(Pattern::VerticalStack, ChoiceSource::Fallback)
    }
}

/// Accepts an externally proposed choice if it is feasible, otherwise re-selects.
///
/// Ratios are sanitised: non-finite or non-positive entries are dropped, the rest are
/// normalised to sum to 1. A pattern that needs ratios falls back to its defaults when
/// fewer than two usable ratios remain.
pub fn resolve_choice(
    candidate: PatternChoice,
    containers: &[SemanticContainer],
    hints: &SlideHints,
) -> PatternChoice {
    if !candidate.pattern.is_feasible(containers.len()) {
        return select_pattern(containers, hints);
    }

    let mut ratios: Vec<f64> = candidate
        .split_ratios
        .iter()
        .copied()
        .filter(|r| r.is_finite() && *r > 0.0)
        .collect();
    let total: f64 = ratios.iter().sum();
    if ratios.len() >= 2 && total > 0.0 {
        if (total - 1.0).abs() > 1e-9 {
            ratios.iter_mut().for_each(|r| *r /= total);
        }
    } else {
        ratios = candidate.pattern.default_ratios();
    }
    if !candidate.pattern.uses_ratios() {
        ratios.clear();
    }

    PatternChoice {
        pattern: candidate.pattern,
        split_ratios: ratios,
        source: candidate.source,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::slide::Importance;

    fn container(id: &str, role: ContainerRole) -> SemanticContainer {
        SemanticContainer {
            id: id.to_string(),
            role,
            hierarchy_level: 2,
            importance: Importance::Medium,
            visual_weight: 0.5,
        }
    }

    fn points(n: usize) -> Vec<SemanticContainer> {
        (0..n)
            .map(|i| container(&format!("c{i}"), ContainerRole::MainPoint))
            .collect()
    }

    #[test]
    fn test_single_container_is_single_focal() {
        let containers = vec![container("h", ContainerRole::Headline)];
        let choice = select_pattern(&containers, &SlideHints::default());
        assert_eq!(choice.pattern, Pattern::SingleFocal);
        assert_eq!(choice.source, ChoiceSource::Heuristic);
    }

    #[test]
    fn test_two_containers_golden_ratio_with_ratios() {
        let choice = select_pattern(&points(2), &SlideHints::default());
        assert_eq!(choice.pattern, Pattern::GoldenRatio);
        assert_eq!(choice.split_ratios, vec![0.618, 0.382]);
    }

    #[test]
    fn test_three_dense_containers_rule_of_thirds() {
        let hints = SlideHints {
            structure_preference: None,
            content_density: ContentDensity::High,
        };
        let choice = select_pattern(&points(3), &hints);
        assert_eq!(choice.pattern, Pattern::RuleOfThirds);
    }

    #[test]
    fn test_four_without_headline_is_grid() {
        assert_eq!(
            select_pattern(&points(4), &SlideHints::default()).pattern,
            Pattern::Grid
        );
    }

    #[test]
    fn test_four_with_headline_is_z_pattern() {
        let mut containers = points(3);
        containers.insert(0, container("h", ContainerRole::Headline));
        assert_eq!(
            select_pattern(&containers, &SlideHints::default()).pattern,
            Pattern::ZPattern
        );
    }

    #[test]
    fn test_many_containers_grid() {
        assert_eq!(
            select_pattern(&points(11), &SlideHints::default()).pattern,
            Pattern::Grid
        );
    }

    #[test]
    fn test_feasible_hint_wins() {
        let hints = SlideHints {
            structure_preference: Some(StructurePreference::Horizontal),
            content_density: ContentDensity::Medium,
        };
        let choice = select_pattern(&points(3), &hints);
        assert_eq!(choice.pattern, Pattern::HorizontalSplit);
        assert_eq!(choice.source, ChoiceSource::Hint);
    }

    #[test]
    fn test_infeasible_hint_ignored() {
        let hints = SlideHints {
            structure_preference: Some(StructurePreference::SingleFocal),
            content_density: ContentDensity::Medium,
        };
        let choice = select_pattern(&points(4), &hints);
        assert_eq!(choice.pattern, Pattern::Grid);
        assert_eq!(choice.source, ChoiceSource::Heuristic);
    }

    #[test]
    fn test_empty_slide_falls_back_to_vertical_stack() {
        let choice = select_pattern(&[], &SlideHints::default());
        assert_eq!(choice.pattern, Pattern::VerticalStack);
        assert_eq!(choice.source, ChoiceSource::Fallback);
    }

    #[test]
    fn test_resolve_rejects_infeasible_candidate() {
        let candidate = PatternChoice::new(Pattern::SingleFocal, ChoiceSource::Strategy);
        let resolved = resolve_choice(candidate, &points(2), &SlideHints::default());
        assert_eq!(resolved.pattern, Pattern::GoldenRatio);
        assert_eq!(resolved.source, ChoiceSource::Heuristic);
    }

    #[test]
    fn test_resolve_normalises_ratios() {
        let candidate = PatternChoice {
            pattern: Pattern::GoldenRatio,
            split_ratios: vec![3.0, 1.0, f64::NAN, -2.0],
            source: ChoiceSource::Strategy,
        };
        let resolved = resolve_choice(candidate, &points(2), &SlideHints::default());
        assert_eq!(resolved.split_ratios, vec![0.75, 0.25]);
        assert_eq!(resolved.source, ChoiceSource::Strategy);
    }

    #[test]
    fn test_resolve_restores_default_ratios_when_unusable() {
        let candidate = PatternChoice {
            pattern: Pattern::RuleOfThirds,
            split_ratios: vec![0.0],
            source: ChoiceSource::Strategy,
        };
        let resolved = resolve_choice(candidate, &points(2), &SlideHints::default());
        assert_eq!(resolved.split_ratios, THIRDS_RATIOS.to_vec());
    }

    #[test]
    fn test_pattern_name_round_trip() {
        for pattern in [
            Pattern::SingleFocal,
            Pattern::VerticalStack,
            Pattern::HorizontalSplit,
            Pattern::Grid,
            Pattern::GoldenRatio,
            Pattern::RuleOfThirds,
            Pattern::ZPattern,
            Pattern::Symmetrical,
        ] {
            assert_eq!(Pattern::from_name(pattern.name()), Some(pattern));
        }
        assert_eq!(Pattern::from_name("Golden-Ratio"), Some(Pattern::GoldenRatio));
        assert_eq!(Pattern::from_name("diagonal"), None);
    }
}
