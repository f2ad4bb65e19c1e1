//! Variety Tracker — keeps consecutive slides from looking identical.
//!
//! A `PresentationContext` is owned by one presentation session and remembers the last
//! `window` delivered layouts. A freshly finalized layout that is too similar to any of
//! them gets one deterministic variation (mirror first, then size jitter), which must
//! pass validation again or is discarded.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::layout::balance::balance_score;
use crate::layout::grid::{GridPosition, LayoutConfig, WorkArea};
use crate::layout::pattern::{Pattern, PatternChoice};
use crate::layout::positions::{compute_cells, SplitParams};
use crate::layout::proposal::Placement;
use crate::layout::refinement::{FinalizedLayout, LayoutStatus};
use crate::layout::validator::validate_layout;
use crate::models::slide::SlideInput;

const RATIO_TOLERANCE: f64 = 0.05;
const JITTER_PERCENT: i8 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Variation {
    HorizontalMirror,
    /// Container areas scaled by `percent` (negative shrinks).
    SizeJitter { percent: i8 },
}

/// What the tracker remembers about a delivered layout.
#[derive(Debug, Clone, PartialEq)]
pub struct LayoutSignature {
    pub slide_id: String,
    pub pattern: Pattern,
    pub split_ratios: Vec<f64>,
    pub positions: Vec<GridPosition>,
}

impl LayoutSignature {
    pub fn of(layout: &FinalizedLayout) -> Self {
        Self {
            slide_id: layout.slide_id.clone(),
            pattern: layout.pattern,
            split_ratios: layout.split_ratios.clone(),
            positions: layout.placements.iter().map(|p| p.position).collect(),
        }
    }
}

/// Pattern term (0.5 / 0.25 / 0) plus half the fraction of matching positions.
pub fn similarity(a: &LayoutSignature, b: &LayoutSignature, tolerance: u16) -> f64 {
    let pattern_term = if a.pattern != b.pattern {
        0.0
    } else if ratios_close(&a.split_ratios, &b.split_ratios) {
        0.5
    } else {
        0.25
    };

    let slots = a.positions.len().max(b.positions.len());
    let position_term = if slots == 0 {
        1.0
    } else {
        let matching = a
            .positions
            .iter()
            .zip(&b.positions)
            .filter(|(p, q)| positions_close(p, q, tolerance))
            .count();
        matching as f64 / slots as f64
    };

    pattern_term + 0.5 * position_term
}

fn ratios_close(a: &[f64], b: &[f64]) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|(x, y)| (x - y).abs() <= RATIO_TOLERANCE)
}

fn positions_close(a: &GridPosition, b: &GridPosition, tolerance: u16) -> bool {
    a.left.abs_diff(b.left) <= tolerance
        && a.top.abs_diff(b.top) <= tolerance
        && a.width.abs_diff(b.width) <= tolerance
        && a.height.abs_diff(b.height) <= tolerance
}

// ────────────────────────────────────────────────────────────────────────────
// Presentation context
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct PresentationContext {
    window: usize,
    history: VecDeque<LayoutSignature>,
}

impl PresentationContext {
    pub fn new(window: usize) -> Self {
        Self {
            window: window.max(1),
            history: VecDeque::with_capacity(window.max(1)),
        }
    }

    pub fn len(&self) -> usize {
        self.history.len()
    }

    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }

    pub fn record(&mut self, signature: LayoutSignature) {
        self.history.push_back(signature);
        while self.history.len() > self.window {
            self.history.pop_front();
        }
    }

    /// Highest similarity against anything in the window; 0.0 when empty.
    pub fn max_similarity(&self, signature: &LayoutSignature, tolerance: u16) -> f64 {
        self.history
            .iter()
            .map(|past| similarity(signature, past, tolerance))
            .fold(0.0, f64::max)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Variations
// ────────────────────────────────────────────────────────────────────────────

/// Reflects every box across the vertical centre line of the work area.
pub fn mirror_horizontally(placements: &[Placement], area: &WorkArea) -> Vec<Placement> {
    let axis = area.left as u32 + area.right();
    placements
        .iter()
        .map(|p| {
            let left = axis.saturating_sub(p.position.right()) as u16;
            Placement {
                position: GridPosition::new(left, p.position.top, p.position.width, p.position.height),
                ..p.clone()
            }
        })
        .collect()
}

/// Scales each box's area by `percent` about its centre, kept inside its cell.
pub fn jitter_sizes(placements: &[Placement], cells: &[GridPosition], percent: i8) -> Vec<Placement> {
    let linear = (1.0 + percent as f64 / 100.0).max(0.0).sqrt();
    placements
        .iter()
        .zip(cells)
        .map(|(p, cell)| {
            let pos = p.position;
            let width = ((pos.width as f64 * linear).round() as u16).clamp(1, cell.width.max(1));
            let height = ((pos.height as f64 * linear).round() as u16).clamp(1, cell.height.max(1));
            let (cx, cy) = pos.center();
            let left = (cx - width as f64 / 2.0).round().max(0.0) as u16;
            let top = (cy - height as f64 / 2.0).round().max(0.0) as u16;
            Placement {
                position: fit_within(GridPosition::new(left, top, width, height), cell),
                ..p.clone()
            }
        })
        .collect()
}

fn fit_within(pos: GridPosition, cell: &GridPosition) -> GridPosition {
    let width = pos.width.min(cell.width);
    let height = pos.height.min(cell.height);
    let max_left = cell.left + (cell.width - width);
    let max_top = cell.top + (cell.height - height);
    GridPosition::new(
        pos.left.clamp(cell.left, max_left),
        pos.top.clamp(cell.top, max_top),
        width,
        height,
    )
}

/// Applies one variation when `layout` repeats recent history, then records what is delivered.
///
/// Only `Finalized` layouts with good quality are varied. Everything is recorded.
pub fn apply_variety(
    layout: FinalizedLayout,
    input: &SlideInput,
    context: &mut PresentationContext,
    config: &LayoutConfig,
) -> FinalizedLayout {
    let signature = LayoutSignature::of(&layout);
    if layout.status != LayoutStatus::Finalized || layout.is_degraded() {
        context.record(signature);
        return layout;
    }

    let score = context.max_similarity(&signature, config.variety_position_tolerance);
    if score <= config.variety_similarity_threshold {
        context.record(signature);
        return layout;
    }

    let area = layout.work_area;
    let mirrored = mirror_horizontally(&layout.placements, &area);
    let (variation, candidate) = if mirrored != layout.placements {
        (Variation::HorizontalMirror, mirrored)
    } else {
        let percent = if layout.report.white_space_ratio < config.white_space_midpoint() {
            -JITTER_PERCENT
        } else {
            JITTER_PERCENT
        };
        let choice = PatternChoice {
            pattern: layout.pattern,
            split_ratios: layout.split_ratios.clone(),
            source: layout.choice_source,
        };
        let cells = compute_cells(
            &choice,
            &input.containers,
            area,
            SplitParams {
                row_gutter: config.gutter,
                column_gutter: config.column_gutter(config.gutter),
            },
        );
        (
            Variation::SizeJitter { percent },
            jitter_sizes(&layout.placements, &cells, percent),
        )
    };

    let report = validate_layout(&candidate, &area, config);
    if !report.is_valid {
        debug!(
            slide_id = %layout.slide_id,
            similarity = score,
            ?variation,
            "Variation rejected by validation; keeping original layout"
        );
        context.record(signature);
        return layout;
    }

    debug!(slide_id = %layout.slide_id, similarity = score, ?variation, "Applied layout variation");
    let balance = balance_score(candidate.iter().map(|p| &p.position), &area);
    let varied = FinalizedLayout {
        placements: candidate,
        report,
        balance_score: balance,
        variation: Some(variation),
        ..layout
    };
    context.record(LayoutSignature::of(&varied));
    varied
}
