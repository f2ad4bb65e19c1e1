//! Merged view — the slide as the consumer should currently see it.
//!
//! Built from scratch on every accepted contribution by overlaying each producer's
//! latest payload onto the slide base. Field ownership is disjoint:
//! - layout   → positions, white space, alignment, quality, overlaps
//! - content  → text
//! - visuals  → image references
//! - charts   → chart references
//!
//! A producer in error contributes its declared defaults instead and is listed in
//! `fallbacks`. Other producers are unaffected.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::assembly::contribution::{ContributionStatus, Payload, ProducerEntry, ProducerKind};
use crate::layout::grid::GridPosition;
use crate::layout::refinement::LayoutQuality;
use crate::models::slide::{ContainerRole, SemanticContainer, SlideInput};

pub const PLACEHOLDER_VISUAL: &str = "placeholder://visual";
pub const PLACEHOLDER_CHART: &str = "placeholder://chart";

/// What the coordinator knows about a slide before any producer reports.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SlideBase {
    pub containers: Vec<SemanticContainer>,
    pub base_text: BTreeMap<String, String>,
    /// Positions used if the layout producer fails.
    pub default_positions: BTreeMap<String, GridPosition>,
}

impl SlideBase {
    pub fn from_input(input: &SlideInput, default_positions: BTreeMap<String, GridPosition>) -> Self {
        Self {
            containers: input.containers.clone(),
            base_text: input.base_text.clone(),
            default_positions,
        }
    }

    fn role_of(&self, id: &str) -> Option<ContainerRole> {
        self.containers.iter().find(|c| c.id == id).map(|c| c.role)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MergedContainer {
    pub name: String,
    pub position: Option<GridPosition>,
    pub text: Option<String>,
    pub visual_ref: Option<String>,
    pub chart_ref: Option<String>,
}

impl MergedContainer {
    fn named(name: &str) -> Self {
        Self {
            name: name.to_string(),
            position: None,
            text: None,
            visual_ref: None,
            chart_ref: None,
        }
    }

    /// Wire `contentRef`: a chart wins over an image.
    pub fn content_ref(&self) -> Option<&str> {
        self.chart_ref.as_deref().or(self.visual_ref.as_deref())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MergedView {
    pub containers: Vec<MergedContainer>,
    pub white_space_ratio: Option<f64>,
    pub alignment_score: Option<f64>,
    pub layout_quality: Option<LayoutQuality>,
    pub overlaps: Vec<(String, String)>,
    pub fallbacks: BTreeSet<ProducerKind>,
}

impl MergedView {
    pub fn container(&self, name: &str) -> Option<&MergedContainer> {
        self.containers.iter().find(|c| c.name == name)
    }
}

/// Recomputes the merged view. Pure: same base and entries, same view.
pub fn merge_view(base: &SlideBase, entries: &BTreeMap<ProducerKind, ProducerEntry>) -> MergedView {
    let mut view = MergedView {
        containers: container_names(base, entries)
            .iter()
            .map(|name| {
                let mut c = MergedContainer::named(name);
                c.text = base.base_text.get(name.as_str()).cloned();
                c
            })
            .collect(),
        ..MergedView::default()
    };

    for (kind, entry) in entries {
        if entry.status == ContributionStatus::Error {
            view.fallbacks.insert(*kind);
            apply_defaults(&mut view, base, *kind);
            continue;
        }
        let Some(payload) = &entry.payload else { continue };
        match payload {
            Payload::Layout(layout) => {
                for c in view.containers.iter_mut() {
                    c.position = layout.position_of(&c.name);
                }
                view.white_space_ratio = Some(layout.report.white_space_ratio);
                view.alignment_score = Some(layout.report.alignment_score);
                view.layout_quality = Some(layout.layout_quality);
                view.overlaps = layout.report.overlaps.clone();
            }
            Payload::Content { texts } => {
                for c in view.containers.iter_mut() {
                    if let Some(text) = texts.get(&c.name) {
                        c.text = Some(text.clone());
                    }
                }
            }
            Payload::Visuals { images } => {
                for c in view.containers.iter_mut() {
                    c.visual_ref = images.get(&c.name).cloned();
                }
            }
            Payload::Charts { charts } => {
                for c in view.containers.iter_mut() {
                    c.chart_ref = charts.get(&c.name).cloned();
                }
            }
        }
    }

    view
}

fn apply_defaults(view: &mut MergedView, base: &SlideBase, kind: ProducerKind) {
    match kind {
        ProducerKind::Layout => {
            for c in view.containers.iter_mut() {
                c.position = base.default_positions.get(&c.name).copied();
            }
            view.layout_quality = Some(LayoutQuality::Degraded);
        }
        // Base text is already in place.
        ProducerKind::Content => {}
        ProducerKind::Visuals => {
            for c in view.containers.iter_mut() {
                if base.role_of(&c.name) == Some(ContainerRole::VisualElement) {
                    c.visual_ref = Some(PLACEHOLDER_VISUAL.to_string());
                }
            }
        }
        ProducerKind::Charts => {
            for c in view.containers.iter_mut() {
                if base.role_of(&c.name) == Some(ContainerRole::DataVisualization) {
                    c.chart_ref = Some(PLACEHOLDER_CHART.to_string());
                }
            }
        }
    }
}

/// Base containers in declared order, then ids only producers know about, sorted.
fn container_names(base: &SlideBase, entries: &BTreeMap<ProducerKind, ProducerEntry>) -> Vec<String> {
    let mut names: Vec<String> = base.containers.iter().map(|c| c.id.clone()).collect();
    let known: BTreeSet<String> = names.iter().cloned().collect();

    let mut extra = BTreeSet::new();
    for entry in entries.values() {
        let ids: Vec<&String> = match &entry.payload {
            Some(Payload::Layout(layout)) => layout.placements.iter().map(|p| &p.container_id).collect(),
            Some(Payload::Content { texts }) => texts.keys().collect(),
            Some(Payload::Visuals { images }) => images.keys().collect(),
            Some(Payload::Charts { charts }) => charts.keys().collect(),
            None => Vec::new(),
        };
        extra.extend(ids.into_iter().filter(|id| !known.contains(*id)).cloned());
    }
    names.extend(extra);
    names
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::slide::Importance;
    use chrono::{TimeZone, Utc};

    fn base() -> SlideBase {
        let containers = vec![
            SemanticContainer {
                id: "h".into(),
                role: ContainerRole::Headline,
                hierarchy_level: 1,
                importance: Importance::Critical,
                visual_weight: 0.6,
            },
            SemanticContainer {
                id: "v".into(),
                role: ContainerRole::VisualElement,
                hierarchy_level: 2,
                importance: Importance::Medium,
                visual_weight: 0.4,
            },
        ];
        SlideBase {
            containers,
            base_text: BTreeMap::from([("h".to_string(), "Quarterly results".to_string())]),
            default_positions: BTreeMap::from([
                ("h".to_string(), GridPosition::new(8, 8, 144, 35)),
                ("v".to_string(), GridPosition::new(8, 47, 144, 35)),
            ]),
        }
    }

    fn entry(status: ContributionStatus, payload: Option<Payload>) -> ProducerEntry {
        ProducerEntry {
            status,
            payload,
            error: None,
            timestamp: Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap(),
        }
    }

    #[test]
    fn test_base_only_view_carries_base_text() {
        let view = merge_view(&base(), &BTreeMap::new());
        assert_eq!(view.containers.len(), 2);
        assert_eq!(view.container("h").unwrap().text.as_deref(), Some("Quarterly results"));
        assert!(view.container("h").unwrap().position.is_none());
        assert!(view.fallbacks.is_empty());
    }

    #[test]
    fn test_content_overrides_base_text() {
        let entries = BTreeMap::from([(
            ProducerKind::Content,
            entry(
                ContributionStatus::Complete,
                Some(Payload::Content {
                    texts: BTreeMap::from([("h".to_string(), "Revenue up 12%".to_string())]),
                }),
            ),
        )]);
        let view = merge_view(&base(), &entries);
        assert_eq!(view.container("h").unwrap().text.as_deref(), Some("Revenue up 12%"));
    }

    #[test]
    fn test_visuals_error_yields_placeholder_and_fallback() {
        let entries = BTreeMap::from([(ProducerKind::Visuals, entry(ContributionStatus::Error, None))]);
        let view = merge_view(&base(), &entries);
        assert_eq!(view.container("v").unwrap().content_ref(), Some(PLACEHOLDER_VISUAL));
        assert_eq!(view.container("h").unwrap().content_ref(), None);
        assert!(view.fallbacks.contains(&ProducerKind::Visuals));
    }

    #[test]
    fn test_layout_error_uses_default_positions() {
        let entries = BTreeMap::from([(ProducerKind::Layout, entry(ContributionStatus::Error, None))]);
        let view = merge_view(&base(), &entries);
        assert_eq!(
            view.container("v").unwrap().position,
            Some(GridPosition::new(8, 47, 144, 35))
        );
        assert_eq!(view.layout_quality, Some(LayoutQuality::Degraded));
        assert!(view.fallbacks.contains(&ProducerKind::Layout));
    }

    #[test]
    fn test_chart_ref_wins_content_ref() {
        let entries = BTreeMap::from([
            (
                ProducerKind::Visuals,
                entry(
                    ContributionStatus::Complete,
                    Some(Payload::Visuals {
                        images: BTreeMap::from([("v".to_string(), "img://1".to_string())]),
                    }),
                ),
            ),
            (
                ProducerKind::Charts,
                entry(
                    ContributionStatus::Complete,
                    Some(Payload::Charts {
                        charts: BTreeMap::from([("v".to_string(), "chart://1".to_string())]),
                    }),
                ),
            ),
        ]);
        let view = merge_view(&base(), &entries);
        assert_eq!(view.container("v").unwrap().content_ref(), Some("chart://1"));
    }

    #[test]
    fn test_unknown_ids_appended_after_base() {
        let entries = BTreeMap::from([(
            ProducerKind::Content,
            entry(
                ContributionStatus::Pending,
                Some(Payload::Content {
                    texts: BTreeMap::from([("zz".to_string(), "late".to_string())]),
                }),
            ),
        )]);
        let view = merge_view(&base(), &entries);
        let names: Vec<&str> = view.containers.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["h", "v", "zz"]);
    }
}
