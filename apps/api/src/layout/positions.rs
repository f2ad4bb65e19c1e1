//! Grid Position Calculator — turns a pattern choice into integer cells on the grid.
//!
//! # Algorithm
//! 1. Allocate the pattern's primary regions from the work area using its split ratios.
//! 2. Subdivide each region among its containers proportionally to `visual_weight`.
//! 3. Floor every size. Residual units from rounding are added to the gutters, never
//!    to a container, so siblings can only touch, not overlap.
//!
//! Cells are the space a container is *allowed* to use. The refinement loop then
//! scales each container inside its cell (`scale_within`) to hit the white-space target.

use std::cmp::Reverse;

use crate::layout::grid::{GridPosition, WorkArea};
use crate::layout::pattern::{Pattern, PatternChoice, GOLDEN_RATIOS, THIRDS_RATIOS};
use crate::models::slide::{ContainerRole, SemanticContainer};

/// Weight floor so a zero-weight container still gets a usable share.
const MIN_WEIGHT: f64 = 0.1;
/// Smallest fill scale the loop may apply.
pub const MIN_SCALE: f64 = 0.2;
/// Grid overflow grouping kicks in beyond this many cells (3×3).
const MAX_GRID_CELLS: usize = 9;
/// Share of the work-area height given to a headline band in symmetrical layouts.
const HEADLINE_BAND_SHARE: f64 = 0.25;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SplitParams {
    pub row_gutter: u16,
    pub column_gutter: u16,
}

// ────────────────────────────────────────────────────────────────────────────
// Public entry point
// ────────────────────────────────────────────────────────────────────────────

/// Computes one cell per container, index-aligned with `containers`.
pub fn compute_cells(
    choice: &PatternChoice,
    containers: &[SemanticContainer],
    area: WorkArea,
    params: SplitParams,
) -> Vec<GridPosition> {
    let n = containers.len();
    if n == 0 {
        return Vec::new();
    }

    let region = area.as_position();
    let mut cells = vec![GridPosition::new(area.left, area.top, 0, 0); n];
    let reading: Vec<usize> = (0..n).collect();

    match choice.pattern {
        Pattern::SingleFocal if n == 1 => cells[0] = region,
        Pattern::SingleFocal | Pattern::VerticalStack => {
            stack_vertical(&mut cells, region, &reading, containers, params.row_gutter);
        }
        Pattern::HorizontalSplit => {
            stack_horizontal(&mut cells, region, &reading, containers, params.column_gutter);
        }
        Pattern::Grid => grid_cells(&mut cells, region, containers, params),
        Pattern::GoldenRatio => {
            let ratios = ratio_pair(&choice.split_ratios, GOLDEN_RATIOS);
            let primary = priority_order(containers)[0];
            let columns = split_horizontal(region, params.column_gutter, &ratios);
            cells[primary] = columns[0];
            let rest: Vec<usize> = reading.iter().copied().filter(|&i| i != primary).collect();
            stack_vertical(&mut cells, columns[1], &rest, containers, params.row_gutter);
        }
        Pattern::RuleOfThirds => {
            let ratios = ratio_pair(&choice.split_ratios, THIRDS_RATIOS);
            let primary = priority_order(containers)[0];
            let rows = split_vertical(region, params.row_gutter, &ratios);
            cells[primary] = rows[0];
            let rest: Vec<usize> = reading.iter().copied().filter(|&i| i != primary).collect();
            stack_horizontal(&mut cells, rows[1], &rest, containers, params.column_gutter);
        }
        Pattern::ZPattern => z_cells(&mut cells, region, &choice.split_ratios, params),
        Pattern::Symmetrical => symmetrical_cells(&mut cells, region, containers, params),
    }

    cells
}

/// Scales a container about the centre of its cell. Never grows beyond the cell.
pub fn scale_within(cell: &GridPosition, scale: f64) -> GridPosition {
    let scale = if scale.is_finite() {
        scale.clamp(MIN_SCALE, 1.0)
    } else {
        1.0
    };
    let width = scale_dim(cell.width, scale);
    let height = scale_dim(cell.height, scale);
    GridPosition::new(
        cell.left + (cell.width - width) / 2,
        cell.top + (cell.height - height) / 2,
        width,
        height,
    )
}

/// Fill scale that brings the cells' coverage of the work area to `target_white_space`.
pub fn initial_fill_scale(cells: &[GridPosition], area: &WorkArea, target_white_space: f64) -> f64 {
    let area_total = area.area() as f64;
    let covered: f64 = cells.iter().map(|c| c.area() as f64).sum();
    if area_total <= 0.0 || covered <= 0.0 {
        return 1.0;
    }
    let coverage = covered / area_total;
    ((1.0 - target_white_space) / coverage)
        .sqrt()
        .clamp(MIN_SCALE, 1.0)
}

/// Container indices ordered by placement priority: importance, then hierarchy, then input order.
pub fn priority_order(containers: &[SemanticContainer]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..containers.len()).collect();
    order.sort_by_key(|&i| {
        let c = &containers[i];
        (Reverse(c.importance.rank()), c.hierarchy_level, i)
    });
    order
}

// ────────────────────────────────────────────────────────────────────────────
// Span splitting
// ────────────────────────────────────────────────────────────────────────────

/// Splits `[start, start+length)` into `shares.len()` spans separated by `gutter`.
///
/// Returns `(offset, size)` pairs. Sizes are floored; the leftover units are spread
/// over the gutters left to right. A gutter too wide for the span is shrunk so the
/// spans never leave the range.
pub fn split_span(start: u16, length: u16, gutter: u16, shares: &[f64]) -> Vec<(u16, u16)> {
    let k = shares.len();
    if k == 0 {
        return Vec::new();
    }

    let length = length as u32;
    let gaps = (k - 1) as u32;
    let gutter = if gaps == 0 {
        0
    } else {
        (gutter as u32).min(length / gaps)
    };
    let available = length - gutter * gaps;

    let weights: Vec<f64> = shares
        .iter()
        .map(|s| if s.is_finite() && *s > 0.0 { *s } else { 0.0 })
        .collect();
    let total: f64 = weights.iter().sum();

    let mut sizes: Vec<u32> = if total > 0.0 {
        weights
            .iter()
            .map(|w| (available as f64 * w / total + 1e-9).floor() as u32)
            .collect()
    } else {
        vec![available / k as u32; k]
    };

    // Float noise must never push the sum past the span.
    while sizes.iter().sum::<u32>() > available {
        if let Some(largest) = sizes.iter_mut().max() {
            *largest -= 1;
        }
    }

    // Nobody vanishes while there is room for everyone.
    if available >= k as u32 {
        for i in 0..k {
            if sizes[i] == 0 {
                let donor = (0..k).max_by_key(|&j| (sizes[j], Reverse(j)));
                if let Some(j) = donor {
                    if sizes[j] > 1 {
                        sizes[j] -= 1;
                        sizes[i] = 1;
                    }
                }
            }
        }
    }

    let residual = available - sizes.iter().sum::<u32>();
    let mut spans = Vec::with_capacity(k);
    let mut cursor = start as u32;
    for (i, size) in sizes.iter().enumerate() {
        spans.push((cursor as u16, *size as u16));
        cursor += size;
        let i = i as u32;
        if i < gaps {
            let extra = residual / gaps + u32::from(i < residual % gaps);
            cursor += gutter + extra;
        }
    }
    spans
}

pub fn split_horizontal(region: GridPosition, gutter: u16, shares: &[f64]) -> Vec<GridPosition> {
    split_span(region.left, region.width, gutter, shares)
        .into_iter()
        .map(|(left, width)| GridPosition::new(left, region.top, width, region.height))
        .collect()
}

pub fn split_vertical(region: GridPosition, gutter: u16, shares: &[f64]) -> Vec<GridPosition> {
    split_span(region.top, region.height, gutter, shares)
        .into_iter()
        .map(|(top, height)| GridPosition::new(region.left, top, region.width, height))
        .collect()
}

// ────────────────────────────────────────────────────────────────────────────
// Pattern helpers
// ────────────────────────────────────────────────────────────────────────────

fn weight_share(container: &SemanticContainer) -> f64 {
    if container.visual_weight.is_finite() {
        container.visual_weight.clamp(MIN_WEIGHT, 1.0)
    } else {
        MIN_WEIGHT
    }
}

fn ratio_pair(ratios: &[f64], default: [f64; 2]) -> [f64; 2] {
    match ratios {
        [a, b, ..] if a.is_finite() && b.is_finite() && *a > 0.0 && *b > 0.0 => [*a, *b],
        _ => default,
    }
}

fn stack_vertical(
    cells: &mut [GridPosition],
    region: GridPosition,
    members: &[usize],
    containers: &[SemanticContainer],
    gutter: u16,
) {
    let shares: Vec<f64> = members.iter().map(|&i| weight_share(&containers[i])).collect();
    for (&idx, cell) in members.iter().zip(split_vertical(region, gutter, &shares)) {
        cells[idx] = cell;
    }
}

fn stack_horizontal(
    cells: &mut [GridPosition],
    region: GridPosition,
    members: &[usize],
    containers: &[SemanticContainer],
    gutter: u16,
) {
    let shares: Vec<f64> = members.iter().map(|&i| weight_share(&containers[i])).collect();
    for (&idx, cell) in members.iter().zip(split_horizontal(region, gutter, &shares)) {
        cells[idx] = cell;
    }
}

/// Equal cells in reading order, at most 3×3. Short last rows stretch to full width.
/// Beyond nine containers the lowest-priority ones share the ninth cell.
fn grid_cells(
    cells: &mut [GridPosition],
    region: GridPosition,
    containers: &[SemanticContainer],
    params: SplitParams,
) {
    let n = containers.len();
    let slots = n.min(MAX_GRID_CELLS);
    let cols = match slots {
        1 => 1,
        2..=4 => 2,
        _ => 3,
    };
    let rows = slots.div_ceil(cols);

    let row_regions = split_vertical(region, params.row_gutter, &vec![1.0; rows]);
    let mut slot_cells = Vec::with_capacity(slots);
    for (r, row) in row_regions.into_iter().enumerate() {
        let in_row = cols.min(slots - r * cols);
        slot_cells.extend(split_horizontal(row, params.column_gutter, &vec![1.0; in_row]));
    }

    if n <= MAX_GRID_CELLS {
        for (idx, cell) in slot_cells.into_iter().enumerate() {
            cells[idx] = cell;
        }
        return;
    }

    let overflow = n - (MAX_GRID_CELLS - 1);
    let order = priority_order(containers);
    let mut grouped: Vec<usize> = order[order.len() - overflow..].to_vec();
    grouped.sort_unstable();
    let solo: Vec<usize> = (0..n).filter(|i| !grouped.contains(i)).collect();

    for (&idx, cell) in solo.iter().zip(slot_cells.iter()) {
        cells[idx] = *cell;
    }
    stack_vertical(
        cells,
        slot_cells[MAX_GRID_CELLS - 1],
        &grouped,
        containers,
        params.row_gutter,
    );
}

/// Two rows read left-to-right; the bottom row mirrors the top row's ratios.
fn z_cells(cells: &mut [GridPosition], region: GridPosition, ratios: &[f64], params: SplitParams) {
    let n = cells.len();
    let [major, minor] = ratio_pair(ratios, GOLDEN_RATIOS);
    let rows = split_vertical(region, params.row_gutter, &[1.0, 1.0]);

    let top = split_horizontal(rows[0], params.column_gutter, &[major, minor]);
    cells[0] = top[0];
    cells[1] = top[1];

    if n >= 4 {
        let bottom = split_horizontal(rows[1], params.column_gutter, &[minor, major]);
        cells[2] = bottom[0];
        cells[3] = bottom[1];
    } else if n == 3 {
        cells[2] = rows[1];
    }
}

/// Two mirrored columns; a leading headline gets a full-width band on top.
fn symmetrical_cells(
    cells: &mut [GridPosition],
    region: GridPosition,
    containers: &[SemanticContainer],
    params: SplitParams,
) {
    let n = containers.len();
    let primary = priority_order(containers)[0];
    let banded = n >= 3 && containers[primary].role == ContainerRole::Headline;

    let (body, rest): (GridPosition, Vec<usize>) = if banded {
        let bands = split_vertical(
            region,
            params.row_gutter,
            &[HEADLINE_BAND_SHARE, 1.0 - HEADLINE_BAND_SHARE],
        );
        cells[primary] = bands[0];
        (bands[1], (0..n).filter(|&i| i != primary).collect())
    } else {
        (region, (0..n).collect())
    };

    if rest.len() == 1 {
        cells[rest[0]] = body;
        return;
    }

    let columns = split_horizontal(body, params.column_gutter, &[1.0, 1.0]);
    let left: Vec<usize> = rest.iter().copied().step_by(2).collect();
    let right: Vec<usize> = rest.iter().copied().skip(1).step_by(2).collect();
    stack_vertical(cells, columns[0], &left, containers, params.row_gutter);
    stack_vertical(cells, columns[1], &right, containers, params.row_gutter);
}

fn scale_dim(dim: u16, scale: f64) -> u16 {
    if dim == 0 {
        return 0;
    }
    ((dim as f64 * scale).round() as u16).clamp(1, dim)
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::grid::LayoutConfig;
    use crate::layout::pattern::ChoiceSource;
    use crate::models::slide::Importance;

    fn container(id: &str, role: ContainerRole, importance: Importance, weight: f64) -> SemanticContainer {
        SemanticContainer {
            id: id.to_string(),
            role,
            hierarchy_level: 2,
            importance,
            visual_weight: weight,
        }
    }

    fn equal(n: usize) -> Vec<SemanticContainer> {
        (0..n)
            .map(|i| container(&format!("c{i}"), ContainerRole::MainPoint, Importance::Medium, 0.5))
            .collect()
    }

    fn params() -> SplitParams {
        let config = LayoutConfig::default();
        SplitParams {
            row_gutter: config.gutter,
            column_gutter: config.column_gutter(config.gutter),
        }
    }

    fn area() -> WorkArea {
        LayoutConfig::default().work_area(None)
    }

    fn assert_disjoint_and_inside(cells: &[GridPosition], area: &WorkArea) {
        for (i, a) in cells.iter().enumerate() {
            assert!(area.contains(a), "cell {i} {a:?} escapes {area:?}");
            for b in &cells[i + 1..] {
                assert!(!a.overlaps(b), "{a:?} overlaps {b:?}");
            }
        }
    }

    // ── split_span ──────────────────────────────────────────────────────────

    #[test]
    fn test_split_span_residual_goes_to_gutter() {
        let spans = split_span(8, 144, 7, &[1.0, 1.0]);
        assert_eq!(spans, vec![(8, 68), (84, 68)]);
    }

    #[test]
    fn test_split_span_exact_fit() {
        let spans = split_span(8, 74, 4, &[1.0, 1.0]);
        assert_eq!(spans, vec![(8, 35), (47, 35)]);
    }

    #[test]
    fn test_split_span_ends_inside_range() {
        let spans = split_span(0, 100, 3, &[0.618, 0.382]);
        let (last_start, last_size) = *spans.last().unwrap();
        assert!(last_start as u32 + last_size as u32 <= 100);
        assert_eq!(spans[0].1, 59);
        assert_eq!(spans[1].1, 37);
    }

    #[test]
    fn test_split_span_shrinks_oversized_gutter() {
        let spans = split_span(0, 10, 20, &[1.0, 1.0, 1.0]);
        let (last_start, last_size) = *spans.last().unwrap();
        assert!(last_start as u32 + last_size as u32 <= 10);
    }

    #[test]
    fn test_split_span_tiny_share_still_gets_a_unit() {
        let spans = split_span(0, 20, 0, &[1000.0, 0.001]);
        assert!(spans[1].1 >= 1);
    }

    // ── patterns ────────────────────────────────────────────────────────────

    #[test]
    fn test_single_focal_fills_work_area() {
        let containers = vec![container("h", ContainerRole::Headline, Importance::Critical, 0.9)];
        let choice = PatternChoice::new(Pattern::SingleFocal, ChoiceSource::Heuristic);
        let cells = compute_cells(&choice, &containers, area(), params());
        assert_eq!(cells, vec![GridPosition::new(8, 8, 144, 74)]);
    }

    #[test]
    fn test_grid_of_four_yields_68_by_35_cells() {
        let choice = PatternChoice::new(Pattern::Grid, ChoiceSource::Heuristic);
        let cells = compute_cells(&choice, &equal(4), area(), params());
        assert_eq!(
            cells,
            vec![
                GridPosition::new(8, 8, 68, 35),
                GridPosition::new(84, 8, 68, 35),
                GridPosition::new(8, 47, 68, 35),
                GridPosition::new(84, 47, 68, 35),
            ]
        );
        assert_disjoint_and_inside(&cells, &area());
    }

    #[test]
    fn test_grid_short_last_row_stretches() {
        let choice = PatternChoice::new(Pattern::Grid, ChoiceSource::Heuristic);
        let cells = compute_cells(&choice, &equal(3), area(), params());
        assert_eq!(cells[2].width, 144);
        assert_disjoint_and_inside(&cells, &area());
    }

    #[test]
    fn test_grid_overflow_groups_lowest_priority_into_last_cell() {
        let mut containers = equal(11);
        containers[3].importance = Importance::Low;
        containers[7].importance = Importance::Low;
        containers[10].importance = Importance::Critical;
        let choice = PatternChoice::new(Pattern::Grid, ChoiceSource::Heuristic);
        let cells = compute_cells(&choice, &containers, area(), params());

        assert_disjoint_and_inside(&cells, &area());
        // The two low-importance containers plus the last medium one share the ninth cell.
        let last_cell_left = cells[3].left;
        assert_eq!(cells[7].left, last_cell_left);
        assert_eq!(cells[9].left, last_cell_left);
        assert!(cells[3].top < cells[7].top && cells[7].top < cells[9].top);
    }

    #[test]
    fn test_golden_ratio_puts_primary_in_major_column() {
        let containers = vec![
            container("a", ContainerRole::SupportingEvidence, Importance::Medium, 0.4),
            container("b", ContainerRole::KeyTakeaway, Importance::Critical, 0.8),
            container("c", ContainerRole::Context, Importance::Low, 0.3),
        ];
        let choice = PatternChoice::new(Pattern::GoldenRatio, ChoiceSource::Heuristic);
        let cells = compute_cells(&choice, &containers, area(), params());

        assert_eq!(cells[1].left, 8);
        assert_eq!(cells[1].height, 74);
        assert!(cells[1].width > cells[0].width);
        assert_eq!(cells[0].left, cells[2].left);
        assert!(cells[0].top < cells[2].top);
        assert_disjoint_and_inside(&cells, &area());
    }

    #[test]
    fn test_vertical_stack_is_weight_proportional() {
        let containers = vec![
            container("a", ContainerRole::MainPoint, Importance::Medium, 0.75),
            container("b", ContainerRole::MainPoint, Importance::Medium, 0.25),
        ];
        let choice = PatternChoice::new(Pattern::VerticalStack, ChoiceSource::Heuristic);
        let cells = compute_cells(&choice, &containers, area(), params());
        // (74 - 4) split 3:1 → 52 / 17, one residual unit in the gutter.
        assert_eq!(cells[0].height, 52);
        assert_eq!(cells[1].height, 17);
        assert_eq!(cells[1].top, 8 + 52 + 5);
    }

    #[test]
    fn test_z_pattern_mirrors_bottom_row() {
        let choice = PatternChoice::new(Pattern::ZPattern, ChoiceSource::Heuristic);
        let cells = compute_cells(&choice, &equal(4), area(), params());
        assert!(cells[0].width > cells[1].width);
        assert!(cells[2].width < cells[3].width);
        assert_eq!(cells[0].left, cells[2].left);
        assert_disjoint_and_inside(&cells, &area());
    }

    #[test]
    fn test_symmetrical_headline_band() {
        let mut containers = equal(3);
        containers[0] = container("h", ContainerRole::Headline, Importance::Critical, 0.6);
        let choice = PatternChoice::new(Pattern::Symmetrical, ChoiceSource::Hint);
        let cells = compute_cells(&choice, &containers, area(), params());
        assert_eq!(cells[0].width, 144);
        assert_eq!(cells[1].width, cells[2].width);
        assert_eq!(cells[1].top, cells[2].top);
        assert_disjoint_and_inside(&cells, &area());
    }

    #[test]
    fn test_every_pattern_stays_disjoint() {
        for pattern in [
            Pattern::VerticalStack,
            Pattern::HorizontalSplit,
            Pattern::Grid,
            Pattern::GoldenRatio,
            Pattern::RuleOfThirds,
            Pattern::ZPattern,
            Pattern::Symmetrical,
        ] {
            let n = (2..=6).find(|n| pattern.is_feasible(*n)).unwrap();
            let choice = PatternChoice::new(pattern, ChoiceSource::Heuristic);
            let cells = compute_cells(&choice, &equal(n), area(), params());
            assert_eq!(cells.len(), n);
            assert_disjoint_and_inside(&cells, &area());
        }
    }

    // ── scaling ─────────────────────────────────────────────────────────────

    #[test]
    fn test_scale_within_centres_and_never_grows() {
        let cell = GridPosition::new(8, 8, 68, 35);
        let scaled = scale_within(&cell, 0.8);
        assert_eq!(scaled.width, 54);
        assert_eq!(scaled.height, 28);
        assert_eq!(scaled.left, 8 + 7);
        assert_eq!(scaled.top, 8 + 3);
        assert_eq!(scale_within(&cell, 3.0), cell);
    }

    #[test]
    fn test_initial_fill_scale_targets_white_space() {
        let area = area();
        let cells = vec![area.as_position()];
        let scale = initial_fill_scale(&cells, &area, 0.40);
        assert!((scale - 0.6_f64.sqrt()).abs() < 1e-9);
    }

    #[test]
    fn test_priority_order_importance_then_hierarchy() {
        let mut containers = equal(3);
        containers[2].importance = Importance::Critical;
        containers[0].hierarchy_level = 4;
        assert_eq!(priority_order(&containers), vec![2, 1, 0]);
    }
}
