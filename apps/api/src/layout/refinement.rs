//! Refinement Loop — propose, validate, correct, until valid or out of iterations.
//!
//! # Architecture
//! - `refine_layout` is synchronous CPU work. The engine runs it on `spawn_blocking`.
//! - Phases are an explicit enum driven by the pure `transition` function:
//!   `Propose → Validate → (Finalize | Adjust → Propose)`, with `Fallback` once the
//!   iteration budget is spent.
//! - Each Adjust applies exactly one `Correction`, chosen from the dominant violation
//!   (overlap > margin > white space > alignment).
//! - `SlideLayoutState` remembers the least-invalid proposal seen so far. Exhaustion
//!   delivers that proposal as a degraded layout; it is never an error.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::layout::balance::balance_score;
use crate::layout::grid::{GridPosition, LayoutConfig, WorkArea};
use crate::layout::pattern::{ChoiceSource, Pattern, PatternChoice};
use crate::layout::positions::{compute_cells, initial_fill_scale, scale_within, SplitParams, MIN_SCALE};
use crate::layout::proposal::{LayoutProposal, Placement};
use crate::layout::validator::{validate_layout, ValidationReport, Violation};
use crate::layout::variety::Variation;
use crate::models::slide::SlideInput;

/// Gutter growth per overlap correction.
const GUTTER_STEP: u16 = 2;
const SCALE_FACTOR_MIN: f64 = 0.5;
const SCALE_FACTOR_MAX: f64 = 1.5;

// ────────────────────────────────────────────────────────────────────────────
// Phases
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefinementPhase {
    Propose,
    Validate,
    Adjust,
    Finalize,
    Fallback,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhaseEvent {
    Proposed,
    Validated { valid: bool },
    Adjusted,
}

/// Pure phase transition. Terminal phases and mismatched events leave the phase unchanged.
pub fn transition(
    phase: RefinementPhase,
    event: PhaseEvent,
    iteration: u32,
    max_iterations: u32,
) -> RefinementPhase {
    match (phase, event) {
        (RefinementPhase::Propose, PhaseEvent::Proposed) => RefinementPhase::Validate,
        (RefinementPhase::Validate, PhaseEvent::Validated { valid: true }) => {
            RefinementPhase::Finalize
        }
        (RefinementPhase::Validate, PhaseEvent::Validated { valid: false }) => {
            if iteration >= max_iterations {
                RefinementPhase::Fallback
            } else {
                RefinementPhase::Adjust
            }
        }
        (RefinementPhase::Adjust, PhaseEvent::Adjusted) => RefinementPhase::Propose,
        (current, _) => current,
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Corrections
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Correction {
    WidenGutters,
    ClampToWorkArea,
    ScaleSizes { factor: f64 },
    SnapEdges,
}

/// Knobs that turn a pattern choice into a concrete proposal.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProposalParams {
    pub row_gutter: u16,
    pub column_gutter: u16,
    /// Linear fill scale applied to every container inside its cell.
    pub scale: f64,
    pub snap_edges: bool,
    pub clamp: bool,
}

impl ProposalParams {
    /// Starting point: configured gutters and a fill scale aimed at the density's white-space target.
    pub fn initial(
        input: &SlideInput,
        choice: &PatternChoice,
        area: &WorkArea,
        config: &LayoutConfig,
    ) -> Self {
        let row_gutter = config.gutter;
        let column_gutter = config.column_gutter(config.gutter);
        let cells = compute_cells(
            choice,
            &input.containers,
            *area,
            SplitParams {
                row_gutter,
                column_gutter,
            },
        );
        let target = config.white_space_target(input.hints.content_density);
        Self {
            row_gutter,
            column_gutter,
            scale: initial_fill_scale(&cells, area, target),
            snap_edges: false,
            clamp: false,
        }
    }

    pub fn apply(mut self, correction: Correction) -> Self {
        match correction {
            Correction::WidenGutters => {
                self.row_gutter = self.row_gutter.saturating_add(GUTTER_STEP);
                self.column_gutter = self.column_gutter.saturating_add(GUTTER_STEP);
            }
            Correction::ClampToWorkArea => self.clamp = true,
            Correction::ScaleSizes { factor } => {
                self.scale = (self.scale * factor).clamp(MIN_SCALE, 1.0);
            }
            Correction::SnapEdges => self.snap_edges = true,
        }
        self
    }

    fn split(&self) -> SplitParams {
        SplitParams {
            row_gutter: self.row_gutter,
            column_gutter: self.column_gutter,
        }
    }
}

pub fn choose_correction(report: &ValidationReport, config: &LayoutConfig) -> Option<Correction> {
    report.dominant_violation().map(|violation| match violation {
        Violation::Overlap => Correction::WidenGutters,
        Violation::Margin => Correction::ClampToWorkArea,
        Violation::WhiteSpace => Correction::ScaleSizes {
            factor: scale_factor(report.white_space_ratio, config.white_space_midpoint()),
        },
        Violation::Alignment => Correction::SnapEdges,
    })
}

/// Linear scale factor that moves the white-space ratio from `ratio` to `target`.
pub fn scale_factor(ratio: f64, target: f64) -> f64 {
    let covered = 1.0 - ratio;
    if covered <= 0.0 {
        return SCALE_FACTOR_MAX;
    }
    ((1.0 - target) / covered)
        .sqrt()
        .clamp(SCALE_FACTOR_MIN, SCALE_FACTOR_MAX)
}

// ────────────────────────────────────────────────────────────────────────────
// Proposal construction
// ────────────────────────────────────────────────────────────────────────────

pub fn build_proposal(
    input: &SlideInput,
    choice: &PatternChoice,
    area: &WorkArea,
    params: &ProposalParams,
    config: &LayoutConfig,
    iteration: u32,
) -> LayoutProposal {
    let cells = compute_cells(choice, &input.containers, *area, params.split());
    let mut placements: Vec<Placement> = input
        .containers
        .iter()
        .zip(cells.iter())
        .map(|(container, cell)| {
            let mut position = scale_within(cell, params.scale);
            if params.clamp {
                position = clamp_into(&position, area);
            }
            Placement {
                container_id: container.id.clone(),
                role: container.role,
                position,
            }
        })
        .collect();

    if params.snap_edges {
        snap_edges(&mut placements, area, config.snap_tolerance);
    }

    LayoutProposal {
        slide_id: input.slide_id.clone(),
        placements,
        pattern: choice.pattern,
        split_ratios: choice.split_ratios.clone(),
        iteration,
    }
}

/// Shrinks then shifts a box until it lies inside the work area.
pub fn clamp_into(pos: &GridPosition, area: &WorkArea) -> GridPosition {
    let width = pos.width.min(area.width);
    let height = pos.height.min(area.height);
    let max_left = area.left + (area.width - width);
    let max_top = area.top + (area.height - height);
    GridPosition::new(
        pos.left.clamp(area.left, max_left),
        pos.top.clamp(area.top, max_top),
        width,
        height,
    )
}

#[derive(Debug, Clone, Copy)]
enum Edge {
    Left,
    Top,
    Right,
    Bottom,
}

const SNAP_ORDER: [Edge; 4] = [Edge::Left, Edge::Top, Edge::Right, Edge::Bottom];

fn edge(pos: &GridPosition, edge: Edge) -> u32 {
    match edge {
        Edge::Left => pos.left as u32,
        Edge::Top => pos.top as u32,
        Edge::Right => pos.right(),
        Edge::Bottom => pos.bottom(),
    }
}

fn shares_any_edge(placements: &[Placement], idx: usize) -> bool {
    let pos = &placements[idx].position;
    placements.iter().enumerate().any(|(j, other)| {
        j != idx
            && SNAP_ORDER
                .iter()
                .any(|e| edge(pos, *e) == edge(&other.position, *e))
    })
}

/// Translates unaligned containers onto a nearby shared line.
///
/// Containers are visited in placement order and edges in the order left, top, right,
/// bottom. Candidate lines are same-kind edges of other containers within `tolerance`;
/// the most frequent wins, ties to the smaller coordinate. A move is kept only if the
/// box stays inside the work area and overlaps nothing. The first kept move ends the
/// search for that container.
pub fn snap_edges(placements: &mut [Placement], area: &WorkArea, tolerance: u16) {
    let tolerance = tolerance as u32;

    for idx in 0..placements.len() {
        if shares_any_edge(placements, idx) {
            continue;
        }

        for kind in SNAP_ORDER {
            let current = edge(&placements[idx].position, kind);
            let mut candidates: Vec<u32> = placements
                .iter()
                .enumerate()
                .filter(|(j, _)| *j != idx)
                .map(|(_, other)| edge(&other.position, kind))
                .filter(|line| *line != current && line.abs_diff(current) <= tolerance)
                .collect();
            if candidates.is_empty() {
                continue;
            }
            candidates.sort_unstable();

            let mut best: Option<(usize, u32)> = None;
            let mut i = 0;
            while i < candidates.len() {
                let line = candidates[i];
                let count = candidates[i..].iter().take_while(|c| **c == line).count();
                if best.map_or(true, |(top, _)| count > top) {
                    best = Some((count, line));
                }
                i += count;
            }
            let Some((_, target)) = best else { continue };

            let moved = translate(&placements[idx].position, kind, current, target);
            let Some(moved) = moved else { continue };
            let clear = area.contains(&moved)
                && placements
                    .iter()
                    .enumerate()
                    .all(|(j, other)| j == idx || !moved.overlaps(&other.position));
            if clear {
                placements[idx].position = moved;
                break;
            }
        }
    }
}

fn translate(pos: &GridPosition, kind: Edge, from: u32, to: u32) -> Option<GridPosition> {
    let shift = |value: u16| -> Option<u16> {
        let moved = value as i64 + to as i64 - from as i64;
        u16::try_from(moved).ok()
    };
    match kind {
        Edge::Left | Edge::Right => Some(GridPosition::new(shift(pos.left)?, pos.top, pos.width, pos.height)),
        Edge::Top | Edge::Bottom => Some(GridPosition::new(pos.left, shift(pos.top)?, pos.width, pos.height)),
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Output types
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LayoutStatus {
    Pending,
    Refining,
    Finalized,
    Fallback,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LayoutQuality {
    Good,
    Degraded,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LayoutWarning {
    ExhaustedRefinement { iterations: u32 },
    IrrecoverableOverlap { overlaps: Vec<(String, String)> },
    EmptySlide,
}

/// One line of the refinement trace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IterationSummary {
    pub iteration: u32,
    pub white_space_ratio: f64,
    pub alignment_score: f64,
    pub overlap_count: usize,
    pub is_valid: bool,
}

/// Terminal result of a refinement run, the layout producer's payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FinalizedLayout {
    pub slide_id: String,
    pub pattern: Pattern,
    pub split_ratios: Vec<f64>,
    pub choice_source: ChoiceSource,
    pub placements: Vec<Placement>,
    pub report: ValidationReport,
    pub balance_score: f64,
    pub iterations: u32,
    pub status: LayoutStatus,
    pub layout_quality: LayoutQuality,
    #[serde(default)]
    pub warnings: Vec<LayoutWarning>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variation: Option<Variation>,
    pub work_area: WorkArea,
    #[serde(default)]
    pub history: Vec<IterationSummary>,
}

impl FinalizedLayout {
    pub fn position_of(&self, container_id: &str) -> Option<GridPosition> {
        self.placements
            .iter()
            .find(|p| p.container_id == container_id)
            .map(|p| p.position)
    }

    pub fn is_degraded(&self) -> bool {
        self.layout_quality == LayoutQuality::Degraded
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Slide state
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
struct Scored {
    proposal: LayoutProposal,
    report: ValidationReport,
    balance: f64,
}

/// Per-slide refinement bookkeeping. Owned by one refinement run.
#[derive(Debug)]
pub struct SlideLayoutState {
    pub slide_id: String,
    pub status: LayoutStatus,
    best: Option<Scored>,
    history: Vec<IterationSummary>,
}

impl SlideLayoutState {
    pub fn new(slide_id: &str) -> Self {
        Self {
            slide_id: slide_id.to_string(),
            status: LayoutStatus::Pending,
            best: None,
            history: Vec::new(),
        }
    }

    fn observe(&mut self, proposal: LayoutProposal, report: ValidationReport, balance: f64, config: &LayoutConfig) {
        self.history.push(IterationSummary {
            iteration: proposal.iteration,
            white_space_ratio: report.white_space_ratio,
            alignment_score: report.alignment_score,
            overlap_count: report.overlaps.len(),
            is_valid: report.is_valid,
        });

        let candidate = Scored {
            proposal,
            report,
            balance,
        };
        let replace = match &self.best {
            None => true,
            Some(best) => least_invalid_order(&candidate, best, config) == Ordering::Less,
        };
        if replace {
            self.best = Some(candidate);
        }
    }

    fn finish(
        self,
        terminal: Scored,
        status: LayoutStatus,
        choice: &PatternChoice,
        area: WorkArea,
        iterations: u32,
    ) -> FinalizedLayout {
        let mut warnings = Vec::new();
        let layout_quality = match status {
            LayoutStatus::Finalized => LayoutQuality::Good,
            _ => {
                warnings.push(LayoutWarning::ExhaustedRefinement { iterations });
                LayoutQuality::Degraded
            }
        };
        if !terminal.report.overlaps.is_empty() {
            warnings.push(LayoutWarning::IrrecoverableOverlap {
                overlaps: terminal.report.overlaps.clone(),
            });
        }

        FinalizedLayout {
            slide_id: self.slide_id,
            pattern: terminal.proposal.pattern,
            split_ratios: terminal.proposal.split_ratios,
            choice_source: choice.source,
            placements: terminal.proposal.placements,
            report: terminal.report,
            balance_score: terminal.balance,
            iterations,
            status,
            layout_quality,
            warnings,
            variation: None,
            work_area: area,
            history: self.history,
        }
    }
}

/// Ordering for "least invalid": fewer overlaps, fewer margin violations, smaller
/// white-space deviation, higher alignment, higher balance.
fn least_invalid_order(a: &Scored, b: &Scored, config: &LayoutConfig) -> Ordering {
    a.report
        .overlaps
        .len()
        .cmp(&b.report.overlaps.len())
        .then(a.report.margin_violations.len().cmp(&b.report.margin_violations.len()))
        .then(
            a.report
                .white_space_deviation(config)
                .total_cmp(&b.report.white_space_deviation(config)),
        )
        .then(b.report.alignment_score.total_cmp(&a.report.alignment_score))
        .then(b.balance.total_cmp(&a.balance))
}

// ────────────────────────────────────────────────────────────────────────────
// Public entry point
// ────────────────────────────────────────────────────────────────────────────

/// Runs the refinement loop for one slide. Never fails.
pub fn refine_layout(input: &SlideInput, choice: &PatternChoice, config: &LayoutConfig) -> FinalizedLayout {
    let area = config.work_area(input.theme.as_ref());
    if input.containers.is_empty() {
        return empty_layout(input, choice, area, config);
    }
    let params = ProposalParams::initial(input, choice, &area, config);
    refine_from(input, choice, config, params)
}

/// Same as `refine_layout` but starting from explicit proposal parameters.
pub fn refine_from(
    input: &SlideInput,
    choice: &PatternChoice,
    config: &LayoutConfig,
    mut params: ProposalParams,
) -> FinalizedLayout {
    let area = config.work_area(input.theme.as_ref());
    if input.containers.is_empty() {
        return empty_layout(input, choice, area, config);
    }

    let max_iterations = config.max_iterations.max(1);
    let mut state = SlideLayoutState::new(&input.slide_id);
    state.status = LayoutStatus::Refining;

    let mut phase = RefinementPhase::Propose;
    let mut iteration = 0u32;
    let mut proposal = build_proposal(input, choice, &area, &params, config, 1);
    let mut latest: Option<Scored> = None;
    let mut pending: Option<Correction> = None;

    loop {
        match phase {
            RefinementPhase::Propose => {
                iteration += 1;
                if iteration > 1 {
                    proposal = build_proposal(input, choice, &area, &params, config, iteration);
                }
                phase = transition(phase, PhaseEvent::Proposed, iteration, max_iterations);
            }
            RefinementPhase::Validate => {
                let report = validate_layout(&proposal.placements, &area, config);
                let balance = balance_score(proposal.positions(), &area);
                let valid = report.is_valid;
                debug!(
                    slide_id = %input.slide_id,
                    iteration,
                    white_space = report.white_space_ratio,
                    alignment = report.alignment_score,
                    overlaps = report.overlaps.len(),
                    valid,
                    "refinement iteration"
                );

                pending = choose_correction(&report, config);
                let scored = Scored {
                    proposal: proposal.clone(),
                    report: report.clone(),
                    balance,
                };
                state.observe(proposal.clone(), report, balance, config);
                latest = Some(scored);
                phase = transition(phase, PhaseEvent::Validated { valid }, iteration, max_iterations);
            }
            RefinementPhase::Adjust => {
                if let Some(correction) = pending.take() {
                    params = params.apply(correction);
                }
                phase = transition(phase, PhaseEvent::Adjusted, iteration, max_iterations);
            }
            RefinementPhase::Finalize => {
                let Some(terminal) = latest.take() else { break };
                state.status = LayoutStatus::Finalized;
                return state.finish(terminal, LayoutStatus::Finalized, choice, area, iteration);
            }
            RefinementPhase::Fallback => {
                let Some(terminal) = state.best.clone() else { break };
                warn!(
                    slide_id = %input.slide_id,
                    iterations = iteration,
                    white_space = terminal.report.white_space_ratio,
                    overlaps = terminal.report.overlaps.len(),
                    "Refinement exhausted: delivering least-invalid layout"
                );
                state.status = LayoutStatus::Fallback;
                return state.finish(terminal, LayoutStatus::Fallback, choice, area, iteration);
            }
        }
    }

    // Only reachable if a terminal phase had nothing to deliver.
    empty_layout(input, choice, area, config)
}

fn empty_layout(
    input: &SlideInput,
    choice: &PatternChoice,
    area: WorkArea,
    config: &LayoutConfig,
) -> FinalizedLayout {
    let placements: Vec<Placement> = Vec::new();
    let report = validate_layout(&placements, &area, config);
    FinalizedLayout {
        slide_id: input.slide_id.clone(),
        pattern: choice.pattern,
        split_ratios: choice.split_ratios.clone(),
        choice_source: choice.source,
        placements,
        report,
        balance_score: 1.0,
        iterations: 0,
        status: LayoutStatus::Finalized,
        layout_quality: LayoutQuality::Degraded,
        warnings: vec![LayoutWarning::EmptySlide],
        variation: None,
        work_area: area,
        history: Vec::new(),
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────
