use serde::{Deserialize, Serialize};

use crate::layout::grid::GridPosition;
use crate::layout::pattern::Pattern;
use crate::models::slide::ContainerRole;

/// One container pinned to a grid position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Placement {
    pub container_id: String,
    pub role: ContainerRole,
    pub position: GridPosition,
}

/// A single layout attempt. Built fresh on every iteration and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LayoutProposal {
    pub slide_id: String,
    /// Same order as the slide's containers.
    pub placements: Vec<Placement>,
    pub pattern: Pattern,
    pub split_ratios: Vec<f64>,
    pub iteration: u32,
}

impl LayoutProposal {
    pub fn positions(&self) -> impl Iterator<Item = &GridPosition> + '_ {
        self.placements.iter().map(|p| &p.position)
    }

    pub fn position_of(&self, container_id: &str) -> Option<GridPosition> {
        self.placements
            .iter()
            .find(|p| p.container_id == container_id)
            .map(|p| p.position)
    }
}
