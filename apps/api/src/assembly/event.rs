//! Update events — what a slide actor emits and what consumers apply.
//!
//! An `UpdateEvent` is immutable once minted. Its sequence is strictly increasing per
//! slide and re-delivery always hands out the same logged event, so consumers can
//! apply idempotently by ignoring anything at or below the last sequence they saw.
//!
//! A partial update cannot say "this is now unset": consumers read a missing field as
//! unchanged. Any change that clears a value or drops a container is therefore sent as
//! a full update.

use std::sync::{Arc, PoisonError, RwLock};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::assembly::contribution::ProducerKind;
use crate::assembly::merge::{MergedContainer, MergedView};
use crate::layout::grid::GridPosition;
use crate::layout::refinement::LayoutQuality;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateOperation {
    FullUpdate,
    PartialUpdate,
}

/// Top-level fields of the merged view, for change tracking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ViewField {
    Containers,
    WhiteSpaceRatio,
    AlignmentScore,
    LayoutQuality,
    Overlaps,
    Fallbacks,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateEvent {
    pub slide_id: String,
    pub sequence: u64,
    pub operation: UpdateOperation,
    pub changed_fields: Vec<ViewField>,
    pub changed_containers: Vec<String>,
    pub snapshot: MergedView,
    pub emitted_at: DateTime<Utc>,
}

impl UpdateEvent {
    /// Mints the next event. `previous` is the last emitted view; `None`, or a change
    /// that clears something, means full update.
    pub fn between(
        slide_id: &str,
        sequence: u64,
        previous: Option<&MergedView>,
        current: &MergedView,
    ) -> Self {
        let previous = previous.filter(|prev| !clears_anything(prev, current));
        let (operation, changed_fields, changed_containers) = match previous {
            None => (
                UpdateOperation::FullUpdate,
                vec![
                    ViewField::Containers,
                    ViewField::WhiteSpaceRatio,
                    ViewField::AlignmentScore,
                    ViewField::LayoutQuality,
                    ViewField::Overlaps,
                    ViewField::Fallbacks,
                ],
                current.containers.iter().map(|c| c.name.clone()).collect(),
            ),
            Some(prev) => {
                let containers = changed_containers(prev, current);
                let mut fields = Vec::new();
                if !containers.is_empty() {
                    fields.push(ViewField::Containers);
                }
                if prev.white_space_ratio != current.white_space_ratio {
                    fields.push(ViewField::WhiteSpaceRatio);
                }
                if prev.alignment_score != current.alignment_score {
                    fields.push(ViewField::AlignmentScore);
                }
                if prev.layout_quality != current.layout_quality {
                    fields.push(ViewField::LayoutQuality);
                }
                if prev.overlaps != current.overlaps {
                    fields.push(ViewField::Overlaps);
                }
                if prev.fallbacks != current.fallbacks {
                    fields.push(ViewField::Fallbacks);
                }
                (UpdateOperation::PartialUpdate, fields, containers)
            }
        };

        Self {
            slide_id: slide_id.to_string(),
            sequence,
            operation,
            changed_fields,
            changed_containers,
            snapshot: current.clone(),
            emitted_at: Utc::now(),
        }
    }

    /// Wire form: full updates carry everything, partial updates only what changed.
    pub fn to_message(&self) -> UpdateMessage {
        let full = self.operation == UpdateOperation::FullUpdate;
        let has = |field: ViewField| full || self.changed_fields.contains(&field);
        let view = &self.snapshot;

        UpdateMessage {
            slide_id: self.slide_id.clone(),
            sequence: self.sequence,
            operation: self.operation,
            containers: has(ViewField::Containers).then(|| {
                view.containers
                    .iter()
                    .filter(|c| full || self.changed_containers.contains(&c.name))
                    .map(ContainerUpdate::from)
                    .collect()
            }),
            white_space_ratio: if has(ViewField::WhiteSpaceRatio) {
                view.white_space_ratio
            } else {
                None
            },
            alignment_score: if has(ViewField::AlignmentScore) {
                view.alignment_score
            } else {
                None
            },
            layout_quality: if has(ViewField::LayoutQuality) {
                view.layout_quality
            } else {
                None
            },
            overlaps: has(ViewField::Overlaps).then(|| view.overlaps.clone()),
            fallbacks: has(ViewField::Fallbacks).then(|| view.fallbacks.iter().copied().collect()),
        }
    }
}

/// True when `current` unsets a value `prev` had, or lacks one of its containers.
fn clears_anything(prev: &MergedView, current: &MergedView) -> bool {
    let unset = |before: bool, after: bool| before && !after;
    if unset(prev.white_space_ratio.is_some(), current.white_space_ratio.is_some())
        || unset(prev.alignment_score.is_some(), current.alignment_score.is_some())
        || unset(prev.layout_quality.is_some(), current.layout_quality.is_some())
    {
        return true;
    }
    prev.containers.iter().any(|before| match current.container(&before.name) {
        None => true,
        Some(after) => {
            unset(before.position.is_some(), after.position.is_some())
                || unset(before.text.is_some(), after.text.is_some())
                || unset(before.content_ref().is_some(), after.content_ref().is_some())
        }
    })
}

fn changed_containers(prev: &MergedView, current: &MergedView) -> Vec<String> {
    current
        .containers
        .iter()
        .filter(|c| prev.container(&c.name) != Some(*c))
        .map(|c| c.name.clone())
        .collect()
}

// ────────────────────────────────────────────────────────────────────────────
// Wire format
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerUpdate {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<GridPosition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_ref: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

impl From<&MergedContainer> for ContainerUpdate {
    fn from(c: &MergedContainer) -> Self {
        Self {
            name: c.name.clone(),
            position: c.position,
            content_ref: c.content_ref().map(str::to_string),
            text: c.text.clone(),
        }
    }
}

/// A missing field means "unchanged".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateMessage {
    pub slide_id: String,
    pub sequence: u64,
    pub operation: UpdateOperation,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub containers: Option<Vec<ContainerUpdate>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub white_space_ratio: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alignment_score: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub layout_quality: Option<LayoutQuality>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub overlaps: Option<Vec<(String, String)>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallbacks: Option<Vec<ProducerKind>>,
}

// ────────────────────────────────────────────────────────────────────────────
// Event log
// ────────────────────────────────────────────────────────────────────────────

/// Append-only log of a slide's events, shared by its actor and its forwarders.
/// Only the actor appends; sequences start at 1 with no gaps.
#[derive(Debug, Clone, Default)]
pub struct EventLog {
    events: Arc<RwLock<Vec<UpdateEvent>>>,
}

impl EventLog {
    pub fn push(&self, event: UpdateEvent) {
        self.events
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event);
    }

    /// Logged events with a sequence above `after`, in order.
    pub fn after(&self, after: u64) -> Vec<UpdateEvent> {
        let events = self.events.read().unwrap_or_else(PoisonError::into_inner);
        // The log index of an event is its sequence - 1.
        let start = usize::try_from(after).unwrap_or(usize::MAX).min(events.len());
        events[start..].to_vec()
    }
}

/// Reference consumer that rebuilds a slide from update messages.
#[cfg(test)]
pub(crate) mod mirror {
    use std::collections::BTreeMap;

    use super::*;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum MirrorOutcome {
        Applied,
        /// Already seen; nothing changed.
        Duplicate,
        /// A sequence was skipped; the consumer should resubscribe from `expected - 1`.
        Gap { expected: u64, received: u64 },
    }

    #[derive(Debug, Clone, Default, PartialEq)]
    pub struct ConsumerMirror {
        pub last_sequence: u64,
        pub containers: BTreeMap<String, ContainerUpdate>,
        pub white_space_ratio: Option<f64>,
        pub alignment_score: Option<f64>,
        pub layout_quality: Option<LayoutQuality>,
        pub overlaps: Vec<(String, String)>,
        pub fallbacks: Vec<ProducerKind>,
    }

    impl ConsumerMirror {
        pub fn apply(&mut self, message: &UpdateMessage) -> MirrorOutcome {
            if message.sequence <= self.last_sequence {
                return MirrorOutcome::Duplicate;
            }
            let expected = self.last_sequence + 1;
            if message.sequence != expected && message.operation != UpdateOperation::FullUpdate {
                return MirrorOutcome::Gap {
                    expected,
                    received: message.sequence,
                };
            }

            if message.operation == UpdateOperation::FullUpdate {
                *self = ConsumerMirror::default();
            }
            if let Some(containers) = &message.containers {
                for c in containers {
                    self.containers.insert(c.name.clone(), c.clone());
                }
            }
            if let Some(ws) = message.white_space_ratio {
                self.white_space_ratio = Some(ws);
            }
            if let Some(alignment) = message.alignment_score {
                self.alignment_score = Some(alignment);
            }
            if let Some(quality) = message.layout_quality {
                self.layout_quality = Some(quality);
            }
            if let Some(overlaps) = &message.overlaps {
                self.overlaps = overlaps.clone();
            }
            if let Some(fallbacks) = &message.fallbacks {
                self.fallbacks = fallbacks.clone();
            }
            self.last_sequence = message.sequence;
            MirrorOutcome::Applied
        }

        /// True when the mirror shows exactly what `view` holds.
        pub fn matches(&self, view: &MergedView) -> bool {
            let containers: BTreeMap<String, ContainerUpdate> = view
                .containers
                .iter()
                .map(|c| (c.name.clone(), ContainerUpdate::from(c)))
                .collect();
            self.containers == containers
                && self.white_space_ratio == view.white_space_ratio
                && self.alignment_score == view.alignment_score
                && self.layout_quality == view.layout_quality
                && self.overlaps == view.overlaps
                && self.fallbacks == view.fallbacks.iter().copied().collect::<Vec<_>>()
        }
    }
}
