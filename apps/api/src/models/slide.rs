use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::errors::AppError;

/// Semantic role of a content unit, as classified upstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContainerRole {
    Headline,
    Subheadline,
    KeyTakeaway,
    MainPoint,
    SupportingEvidence,
    VisualElement,
    DataVisualization,
    Context,
    CallToAction,
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Importance {
    Critical,
    High,
    Medium,
    Low,
}

impl Importance {
    /// Higher rank = placed first.
    pub fn rank(self) -> u8 {
        match self {
            Importance::Critical => 3,
            Importance::High => 2,
            Importance::Medium => 1,
            Importance::Low => 0,
        }
    }
}

/// One content unit of a slide. Immutable once produced upstream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SemanticContainer {
    pub id: String,
    pub role: ContainerRole,
    /// 1 (top of hierarchy) – 5.
    pub hierarchy_level: u8,
    pub importance: Importance,
    /// Estimated visual weight, 0.0 – 1.0.
    pub visual_weight: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentDensity {
    High,
    #[default]
    Medium,
    Low,
}

/// Upstream hint for the arrangement archetype.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StructurePreference {
    SingleFocal,
    Vertical,
    Horizontal,
    Grid,
    GoldenRatio,
    RuleOfThirds,
    ZPattern,
    Symmetrical,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SlideHints {
    #[serde(default)]
    pub structure_preference: Option<StructurePreference>,
    #[serde(default)]
    pub content_density: ContentDensity,
}

/// Theme reference. Opaque apart from the reserved header/footer zones.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThemeRef {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub header_height: u16,
    #[serde(default)]
    pub footer_height: u16,
}

/// Everything the layout engine and the coordinator need to know about one slide.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SlideInput {
    pub slide_id: String,
    pub containers: Vec<SemanticContainer>,
    #[serde(default)]
    pub hints: SlideHints,
    /// Unenhanced text per container id, used when the content producer fails.
    #[serde(default)]
    pub base_text: BTreeMap<String, String>,
    #[serde(default)]
    pub theme: Option<ThemeRef>,
}

impl SlideInput {
    /// Rejects input the engine cannot place meaningfully.
    pub fn validate(&self) -> Result<(), AppError> {
        if self.slide_id.trim().is_empty() {
            return Err(AppError::Validation("slideId cannot be empty".to_string()));
        }

        let mut seen = HashSet::new();
        for container in &self.containers {
            if container.id.trim().is_empty() {
                return Err(AppError::Validation(
                    "container id cannot be empty".to_string(),
                ));
            }
            if !seen.insert(container.id.as_str()) {
                return Err(AppError::Validation(format!(
                    "duplicate container id '{}'",
                    container.id
                )));
            }
            if !(1..=5).contains(&container.hierarchy_level) {
                return Err(AppError::Validation(format!(
                    "container '{}': hierarchyLevel must be 1-5, got {}",
                    container.id, container.hierarchy_level
                )));
            }
            if !container.visual_weight.is_finite()
                || !(0.0..=1.0).contains(&container.visual_weight)
            {
                return Err(AppError::Validation(format!(
                    "container '{}': visualWeight must be within 0.0-1.0",
                    container.id
                )));
            }
        }

        Ok(())
    }
}
