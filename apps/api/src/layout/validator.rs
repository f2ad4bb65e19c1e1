//! Layout Validator — scores a proposal against the hard and soft constraints.
//!
//! Checks run in a fixed order: overlap, margin, alignment, white space. The report
//! records every finding; `dominant_violation` picks the one the refinement loop
//! should correct first.

use serde::{Deserialize, Serialize};

use crate::layout::grid::{LayoutConfig, WorkArea};
use crate::layout::proposal::Placement;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationReport {
    pub white_space_ratio: f64,
    pub alignment_score: f64,
    /// Container-id pairs whose boxes intersect with positive area.
    pub overlaps: Vec<(String, String)>,
    /// Containers that leave the work area.
    pub margin_violations: Vec<String>,
    pub white_space_in_range: bool,
    pub alignment_ok: bool,
    pub is_valid: bool,
}

/// Violation kinds in correction priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Violation {
    Overlap,
    Margin,
    WhiteSpace,
    Alignment,
}

impl ValidationReport {
    pub fn dominant_violation(&self) -> Option<Violation> {
        if !self.overlaps.is_empty() {
            Some(Violation::Overlap)
        } else if !self.margin_violations.is_empty() {
            Some(Violation::Margin)
        } else if !self.white_space_in_range {
            Some(Violation::WhiteSpace)
        } else if !self.alignment_ok {
            Some(Violation::Alignment)
        } else {
            None
        }
    }

    /// Distance of the white-space ratio from the allowed band; 0 when inside.
    pub fn white_space_deviation(&self, config: &LayoutConfig) -> f64 {
        if self.white_space_ratio < config.white_space_min {
            config.white_space_min - self.white_space_ratio
        } else if self.white_space_ratio > config.white_space_max {
            self.white_space_ratio - config.white_space_max
        } else {
            0.0
        }
    }
}

pub fn validate_layout(
    placements: &[Placement],
    area: &WorkArea,
    config: &LayoutConfig,
) -> ValidationReport {
    let overlaps = find_overlaps(placements);

    let margin_violations: Vec<String> = placements
        .iter()
        .filter(|p| !area.contains(&p.position))
        .map(|p| p.container_id.clone())
        .collect();

    let alignment_score = alignment_score(placements);
    let white_space_ratio = white_space_ratio(placements, area);

    let white_space_in_range = (config.white_space_min..=config.white_space_max)
        .contains(&white_space_ratio);
    let alignment_ok = alignment_score >= config.alignment_threshold;
    let is_valid = white_space_in_range
        && overlaps.is_empty()
        && margin_violations.is_empty()
        && alignment_ok;

    ValidationReport {
        white_space_ratio,
        alignment_score,
        overlaps,
        margin_violations,
        white_space_in_range,
        alignment_ok,
        is_valid,
    }
}

fn find_overlaps(placements: &[Placement]) -> Vec<(String, String)> {
    let mut pairs = Vec::new();
    for (i, a) in placements.iter().enumerate() {
        for b in &placements[i + 1..] {
            if a.position.overlaps(&b.position) {
                pairs.push((a.container_id.clone(), b.container_id.clone()));
            }
        }
    }
    pairs
}

/// Fraction of containers sharing at least one exact edge with another container.
pub fn alignment_score(placements: &[Placement]) -> f64 {
    if placements.len() < 2 {
        return 1.0;
    }
    let aligned = placements
        .iter()
        .enumerate()
        .filter(|(i, a)| {
            placements.iter().enumerate().any(|(j, b)| {
                *i != j
                    && (a.position.left == b.position.left
                        || a.position.top == b.position.top
                        || a.position.right() == b.position.right()
                        || a.position.bottom() == b.position.bottom())
            })
        })
        .count();
    aligned as f64 / placements.len() as f64
}

/// `1 − Σ container area / work area`, floored at 0. An empty work area reads as all white.
pub fn white_space_ratio(placements: &[Placement], area: &WorkArea) -> f64 {
    let total = area.area() as f64;
    if total <= 0.0 {
        return 1.0;
    }
    let used: f64 = placements.iter().map(|p| p.position.area() as f64).sum();
    (1.0 - used / total).max(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::grid::GridPosition;
    use crate::models::slide::ContainerRole;

    fn place(id: &str, left: u16, top: u16, width: u16, height: u16) -> Placement {
        Placement {
            container_id: id.to_string(),
            role: ContainerRole::MainPoint,
            position: GridPosition::new(left, top, width, height),
        }
    }

    fn area() -> WorkArea {
        LayoutConfig::default().work_area(None)
    }

    #[test]
    fn test_full_area_single_box_has_zero_white_space() {
        let report = validate_layout(&[place("h", 8, 8, 144, 74)], &area(), &LayoutConfig::default());
        assert_eq!(report.white_space_ratio, 0.0);
        assert_eq!(report.alignment_score, 1.0);
        assert!(!report.white_space_in_range);
        assert_eq!(report.dominant_violation(), Some(Violation::WhiteSpace));
    }

    #[test]
    fn test_valid_two_by_two() {
        // 4 × 56 × 29 = 6496 of 10656 → ws ≈ 0.39
        let placements = vec![
            place("a", 14, 11, 56, 29),
            place("b", 90, 11, 56, 29),
            place("c", 14, 50, 56, 29),
            place("d", 90, 50, 56, 29),
        ];
        let report = validate_layout(&placements, &area(), &LayoutConfig::default());
        assert!(report.is_valid, "{report:?}");
        assert!((report.white_space_ratio - 0.3904).abs() < 1e-3);
        assert_eq!(report.alignment_score, 1.0);
        assert_eq!(report.dominant_violation(), None);
    }

    #[test]
    fn test_overlap_detected_and_dominant() {
        let placements = vec![place("a", 10, 10, 40, 30), place("b", 30, 20, 40, 30)];
        let report = validate_layout(&placements, &area(), &LayoutConfig::default());
        assert_eq!(report.overlaps, vec![("a".to_string(), "b".to_string())]);
        assert!(!report.is_valid);
        assert_eq!(report.dominant_violation(), Some(Violation::Overlap));
    }

    #[test]
    fn test_margin_violation_listed() {
        let placements = vec![place("a", 2, 10, 40, 30), place("b", 60, 10, 40, 30)];
        let report = validate_layout(&placements, &area(), &LayoutConfig::default());
        assert_eq!(report.margin_violations, vec!["a".to_string()]);
        assert_eq!(report.dominant_violation(), Some(Violation::Margin));
    }

    #[test]
    fn test_alignment_counts_containers_with_shared_edge() {
        let placements = vec![
            place("a", 10, 10, 20, 20),
            place("b", 10, 40, 30, 20),
            place("c", 60, 62, 15, 15),
        ];
        let score = alignment_score(&placements);
        assert!((score - 2.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_white_space_deviation() {
        let config = LayoutConfig::default();
        let mut report = validate_layout(&[], &area(), &config);
        assert_eq!(report.white_space_ratio, 1.0);
        assert!((report.white_space_deviation(&config) - 0.5).abs() < 1e-9);
        report.white_space_ratio = 0.4;
        assert_eq!(report.white_space_deviation(&config), 0.0);
    }

    #[test]
    fn test_violation_priority_order() {
        assert!(Violation::Overlap < Violation::Margin);
        assert!(Violation::Margin < Violation::WhiteSpace);
        assert!(Violation::WhiteSpace < Violation::Alignment);
    }
}
