//! Layout Engine — the async façade over selection, refinement and variety.
//!
//! # Architecture
//! - `choose_pattern` asks the configured `StrategyProvider`, then re-checks the answer
//!   with `resolve_choice`. Provider errors fall back to the heuristic selector.
//! - `layout_slide` runs the refinement loop inside `tokio::task::spawn_blocking`
//!   (owned input, `'static` closure) and applies variety under a short lock on the
//!   session's `PresentationContext`.

use std::collections::BTreeMap;
use std::sync::Mutex;

use tracing::{info, warn};

use crate::errors::AppError;
use crate::layout::grid::{GridPosition, LayoutConfig};
use crate::layout::pattern::{resolve_choice, select_pattern, ChoiceSource, Pattern, PatternChoice};
use crate::layout::positions::{compute_cells, SplitParams};
use crate::layout::refinement::{refine_layout, FinalizedLayout};
use crate::layout::strategy::StrategyProvider;
use crate::layout::variety::{apply_variety, PresentationContext};
use crate::models::slide::SlideInput;

#[derive(Debug, Clone)]
pub struct LayoutEngine {
    config: LayoutConfig,
}

impl LayoutEngine {
    pub fn new(config: LayoutConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &LayoutConfig {
        &self.config
    }

    pub fn new_context(&self) -> PresentationContext {
        PresentationContext::new(self.config.variety_window)
    }

    pub async fn choose_pattern(
        &self,
        input: &SlideInput,
        strategy: &dyn StrategyProvider,
    ) -> PatternChoice {
        let candidate = match strategy.choose(input).await {
            Ok(choice) => choice,
            Err(e) => {
                warn!(
                    slide_id = %input.slide_id,
                    provider = strategy.name(),
                    error = %e,
                    "Strategy provider failed; using heuristic selection"
                );
                select_pattern(&input.containers, &input.hints)
            }
        };
        let resolved = resolve_choice(candidate.clone(), &input.containers, &input.hints);
        if resolved.pattern != candidate.pattern {
            warn!(
                slide_id = %input.slide_id,
                proposed = candidate.pattern.name(),
                used = resolved.pattern.name(),
                "Proposed pattern infeasible for container count"
            );
        }
        resolved
    }

    /// Selects, refines and varies one slide. Only infrastructure failures error.
    pub async fn layout_slide(
        &self,
        input: &SlideInput,
        strategy: &dyn StrategyProvider,
        context: &Mutex<PresentationContext>,
    ) -> Result<FinalizedLayout, AppError> {
        let choice = self.choose_pattern(input, strategy).await;

        let owned = input.clone();
        let config = self.config.clone();
        let refined = tokio::task::spawn_blocking(move || refine_layout(&owned, &choice, &config))
            .await
            .map_err(|e| {
                AppError::Internal(anyhow::anyhow!("spawn_blocking failed in refinement: {e}"))
            })?;

        let delivered = {
            let mut ctx = context
                .lock()
                .map_err(|_| AppError::Internal(anyhow::anyhow!("presentation context poisoned")))?;
            apply_variety(refined, input, &mut ctx, &self.config)
        };

        info!(
            slide_id = %delivered.slide_id,
            pattern = delivered.pattern.name(),
            iterations = delivered.iterations,
            quality = ?delivered.layout_quality,
            white_space = delivered.report.white_space_ratio,
            varied = delivered.variation.is_some(),
            "Slide layout finalized"
        );
        Ok(delivered)
    }

    /// Positions used when the layout producer fails: plain cells of a vertical stack
    /// (grid beyond six containers), unscaled.
    pub fn default_positions(&self, input: &SlideInput) -> BTreeMap<String, GridPosition> {
        let n = input.containers.len();
        let pattern = if Pattern::VerticalStack.is_feasible(n) {
            Pattern::VerticalStack
        } else {
            Pattern::Grid
        };
        let cells = compute_cells(
            &PatternChoice::new(pattern, ChoiceSource::Fallback),
            &input.containers,
            self.config.work_area(input.theme.as_ref()),
            SplitParams {
                row_gutter: self.config.gutter,
                column_gutter: self.config.column_gutter(self.config.gutter),
            },
        );
        input
            .containers
            .iter()
            .zip(cells)
            .map(|(c, cell)| (c.id.clone(), cell))
            .collect()
    }
}
