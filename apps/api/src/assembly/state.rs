use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::assembly::contribution::{Contribution, ContributionStatus, ProducerEntry, ProducerKind};
use crate::assembly::event::{EventLog, UpdateEvent};
use crate::assembly::merge::{merge_view, MergedView, SlideBase};
use crate::errors::AppError;

/// What happened to one contribution.
#[derive(Debug, Clone, PartialEq)]
pub enum ApplyOutcome {
    Emitted(UpdateEvent),
    /// Accepted, but the merged view did not change.
    Unchanged,
    /// Older than (or a same-time replay of a terminal) entry already held.
    Stale,
}

/// Per-slide assembly state. Owned and mutated by exactly one slide actor.
#[derive(Debug)]
pub struct AssemblySlideState {
    slide_id: String,
    base: SlideBase,
    registered: bool,
    entries: BTreeMap<ProducerKind, ProducerEntry>,
    last_sent_sequence: u64,
    merged_view: MergedView,
    last_emitted: Option<MergedView>,
    log: EventLog,
}

impl AssemblySlideState {
    pub fn new(slide_id: &str) -> Self {
        Self {
            slide_id: slide_id.to_string(),
            base: SlideBase::default(),
            registered: false,
            entries: BTreeMap::new(),
            last_sent_sequence: 0,
            merged_view: MergedView::default(),
            last_emitted: None,
            log: EventLog::default(),
        }
    }

    pub fn slide_id(&self) -> &str {
        &self.slide_id
    }

    pub fn is_registered(&self) -> bool {
        self.registered
    }

    pub fn last_sent_sequence(&self) -> u64 {
        self.last_sent_sequence
    }

    pub fn merged_view(&self) -> &MergedView {
        &self.merged_view
    }

    pub fn producer_statuses(&self) -> BTreeMap<ProducerKind, ContributionStatus> {
        self.entries.iter().map(|(k, e)| (*k, e.status)).collect()
    }

    /// Attaches the slide base. A slide registers once; contributions may arrive before it.
    pub fn register(&mut self, base: SlideBase) -> Result<Option<UpdateEvent>, AppError> {
        if self.registered {
            return Err(AppError::Conflict(format!(
                "slide '{}' is already registered",
                self.slide_id
            )));
        }
        self.base = base;
        self.registered = true;
        Ok(self.recompute_and_emit())
    }

    /// Steps 1–4: last-write-wins, re-merge, emit on change, log.
    pub fn apply(&mut self, contribution: Contribution) -> ApplyOutcome {
        let producer = contribution.producer;
        if let Some(current) = self.entries.get(&producer) {
            let older = contribution.timestamp < current.timestamp;
            let replay = contribution.timestamp == current.timestamp && current.status.is_terminal();
            if older || replay {
                debug!(
                    slide_id = %self.slide_id,
                    producer = producer.name(),
                    "Dropping stale contribution"
                );
                return ApplyOutcome::Stale;
            }
        }

        self.entries.insert(producer, ProducerEntry::from(contribution));
        match self.recompute_and_emit() {
            Some(event) => ApplyOutcome::Emitted(event),
            None => ApplyOutcome::Unchanged,
        }
    }

    /// Fails `producer` because its deadline passed. A producer that already reported
    /// a terminal status keeps it.
    pub fn expire(&mut self, producer: ProducerKind, reason: &str, now: DateTime<Utc>) -> ApplyOutcome {
        let at = match self.entries.get(&producer) {
            Some(entry) if entry.status.is_terminal() => return ApplyOutcome::Stale,
            // A pending entry stamped ahead of our clock must still be replaced.
            Some(entry) => now.max(entry.timestamp),
            None => now,
        };
        debug!(slide_id = %self.slide_id, producer = producer.name(), reason, "Producer deadline passed");
        let failed = Contribution::failed(&self.slide_id, producer, reason, at);
        self.apply(failed)
    }

    /// Shared handle on the event log, for forwarders.
    pub fn log(&self) -> EventLog {
        self.log.clone()
    }

    fn recompute_and_emit(&mut self) -> Option<UpdateEvent> {
        self.merged_view = merge_view(&self.base, &self.entries);
        if self.last_emitted.as_ref() == Some(&self.merged_view) {
            return None;
        }

        let sequence = self.last_sent_sequence + 1;
        let event = UpdateEvent::between(
            &self.slide_id,
            sequence,
            self.last_emitted.as_ref(),
            &self.merged_view,
        );
        self.last_sent_sequence = sequence;
        self.last_emitted = Some(self.merged_view.clone());
        self.log.push(event.clone());
        Some(event)
    }
}
