//! Slide actor — the single owner of one slide's `AssemblySlideState`.
//!
//! # Architecture
//! ```text
//!  producers ──▶ mailbox (bounded) ──▶ actor ──▶ event log ──▶ forwarder per subscriber ──▶ subscriber (bounded)
//! ```
//! - The actor processes commands strictly in arrival order and never awaits a consumer.
//!   Emitted events are appended to the slide's log and announced on a watch channel.
//! - Every subscriber gets its own forwarder task walking the log by sequence from its
//!   cursor. A stalled subscriber holds up its own forwarder only, and nothing is
//!   buffered outside the log.
//! - Replay and live delivery are the same walk, so they join without gaps or repeats.
//! - Cancellation stops the actor and every forwarder; subscriber streams end.

use std::collections::BTreeMap;

use chrono::Utc;
use serde::Serialize;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, info};

use crate::assembly::cancellation::CancellationToken;
use crate::assembly::contribution::{Contribution, ContributionStatus, ProducerKind};
use crate::assembly::event::{EventLog, UpdateEvent};
use crate::assembly::merge::{MergedView, SlideBase};
use crate::assembly::state::{ApplyOutcome, AssemblySlideState};
use crate::errors::AppError;

pub const MAILBOX_CAPACITY: usize = 64;

/// Current state of a slide as returned by the snapshot endpoint.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SlideSnapshot {
    pub slide_id: String,
    pub registered: bool,
    pub last_sequence: u64,
    pub view: MergedView,
    pub producers: BTreeMap<ProducerKind, ContributionStatus>,
}

#[derive(Debug)]
pub enum SlideCommand {
    Register {
        base: SlideBase,
        reply: oneshot::Sender<Result<(), AppError>>,
    },
    Contribute {
        contribution: Contribution,
    },
    /// Deadline for a producer passed; fail it unless it already finished.
    Expire {
        producer: ProducerKind,
        reason: String,
    },
    Subscribe {
        after: u64,
        reply: oneshot::Sender<mpsc::Receiver<UpdateEvent>>,
    },
    Snapshot {
        reply: oneshot::Sender<SlideSnapshot>,
    },
}

/// Cloneable address of a running slide actor.
#[derive(Debug, Clone)]
pub struct SlideHandle {
    slide_id: String,
    tx: mpsc::Sender<SlideCommand>,
}

impl SlideHandle {
    pub async fn register(&self, base: SlideBase) -> Result<(), AppError> {
        let (reply, rx) = oneshot::channel();
        self.send(SlideCommand::Register { base, reply }).await?;
        rx.await.map_err(|_| self.closed())?
    }

    pub async fn contribute(&self, contribution: Contribution) -> Result<(), AppError> {
        self.send(SlideCommand::Contribute { contribution }).await
    }

    pub async fn expire(&self, producer: ProducerKind, reason: String) -> Result<(), AppError> {
        self.send(SlideCommand::Expire { producer, reason }).await
    }

    /// Receiver yields every logged event after `after`, then live events.
    pub async fn subscribe(&self, after: u64) -> Result<mpsc::Receiver<UpdateEvent>, AppError> {
        let (reply, rx) = oneshot::channel();
        self.send(SlideCommand::Subscribe { after, reply }).await?;
        rx.await.map_err(|_| self.closed())
    }

    pub async fn snapshot(&self) -> Result<SlideSnapshot, AppError> {
        let (reply, rx) = oneshot::channel();
        self.send(SlideCommand::Snapshot { reply }).await?;
        rx.await.map_err(|_| self.closed())
    }

    async fn send(&self, command: SlideCommand) -> Result<(), AppError> {
        self.tx.send(command).await.map_err(|_| self.closed())
    }

    fn closed(&self) -> AppError {
        AppError::SessionClosed(format!("slide '{}' is no longer accepting updates", self.slide_id))
    }
}

/// Spawns the actor. It and its forwarders exit when `cancel` fires.
/// `subscriber_capacity` bounds each subscriber's channel.
pub fn spawn_slide_actor(
    slide_id: &str,
    subscriber_capacity: usize,
    cancel: CancellationToken,
) -> SlideHandle {
    let (tx, mailbox) = mpsc::channel(MAILBOX_CAPACITY);
    let (published, _) = watch::channel(0u64);

    let actor = SlideActor {
        state: AssemblySlideState::new(slide_id),
        mailbox,
        published,
        subscriber_capacity: subscriber_capacity.max(1),
        cancel,
    };
    tokio::spawn(actor.run());

    SlideHandle {
        slide_id: slide_id.to_string(),
        tx,
    }
}

struct SlideActor {
    state: AssemblySlideState,
    mailbox: mpsc::Receiver<SlideCommand>,
    /// Last logged sequence. Dropping it tells forwarders no more events will come.
    published: watch::Sender<u64>,
    subscriber_capacity: usize,
    cancel: CancellationToken,
}

impl SlideActor {
    async fn run(mut self) {
        debug!(slide_id = %self.state.slide_id(), "Slide actor started");
        let cancel = self.cancel.clone();
        loop {
            let command = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    debug!(slide_id = %self.state.slide_id(), "Slide actor cancelled");
                    return;
                }
                command = self.mailbox.recv() => command,
            };
            match command {
                Some(command) => self.handle(command),
                None => break,
            }
        }
        debug!(slide_id = %self.state.slide_id(), "Slide mailbox closed");
    }

    fn handle(&mut self, command: SlideCommand) {
        match command {
            SlideCommand::Register { base, reply } => {
                let result = self.state.register(base).map(|event| {
                    if let Some(event) = event {
                        self.publish(&event);
                    }
                });
                let _ = reply.send(result);
            }
            SlideCommand::Contribute { contribution } => {
                let producer = contribution.producer;
                let outcome = self.state.apply(contribution);
                self.announce_outcome(producer, outcome);
            }
            SlideCommand::Expire { producer, reason } => {
                let outcome = self.state.expire(producer, &reason, Utc::now());
                self.announce_outcome(producer, outcome);
            }
            SlideCommand::Subscribe { after, reply } => {
                let (tx, rx) = mpsc::channel(self.subscriber_capacity);
                if reply.send(rx).is_ok() {
                    tokio::spawn(forward(Forwarder {
                        slide_id: self.state.slide_id().to_string(),
                        cursor: after,
                        log: self.state.log(),
                        published: self.published.subscribe(),
                        tx,
                        cancel: self.cancel.clone(),
                    }));
                }
            }
            SlideCommand::Snapshot { reply } => {
                let _ = reply.send(SlideSnapshot {
                    slide_id: self.state.slide_id().to_string(),
                    registered: self.state.is_registered(),
                    last_sequence: self.state.last_sent_sequence(),
                    view: self.state.merged_view().clone(),
                    producers: self.state.producer_statuses(),
                });
            }
        }
    }

    fn announce_outcome(&self, producer: ProducerKind, outcome: ApplyOutcome) {
        match outcome {
            ApplyOutcome::Emitted(event) => {
                debug!(
                    slide_id = %event.slide_id,
                    sequence = event.sequence,
                    producer = producer.name(),
                    "Update event emitted"
                );
                self.publish(&event);
            }
            ApplyOutcome::Unchanged | ApplyOutcome::Stale => {}
        }
    }

    /// The event is already in the log; wake the forwarders.
    fn publish(&self, event: &UpdateEvent) {
        self.published.send_replace(event.sequence);
    }
}

/// One subscriber's walk over the log.
struct Forwarder {
    slide_id: String,
    /// Last sequence handed to the subscriber.
    cursor: u64,
    log: EventLog,
    published: watch::Receiver<u64>,
    tx: mpsc::Sender<UpdateEvent>,
    cancel: CancellationToken,
}

impl Forwarder {
    /// Sends everything logged after the cursor. False once the subscriber is gone or
    /// the session was cancelled.
    async fn catch_up(&mut self) -> bool {
        for event in self.log.after(self.cursor) {
            let sequence = event.sequence;
            let sent = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => false,
                sent = self.tx.send(event) => sent.is_ok(),
            };
            if !sent {
                return false;
            }
            self.cursor = sequence;
        }
        true
    }
}

async fn forward(mut forwarder: Forwarder) {
    loop {
        // Mark the current sequence seen before reading the log, so nothing logged
        // after this read can go unnoticed.
        let _ = forwarder.published.borrow_and_update();
        if !forwarder.catch_up().await {
            debug!(slide_id = %forwarder.slide_id, cursor = forwarder.cursor, "Subscriber detached");
            return;
        }
        let live = tokio::select! {
            biased;
            _ = forwarder.cancel.cancelled() => return,
            changed = forwarder.published.changed() => changed.is_ok(),
        };
        if !live {
            break;
        }
    }
    // The actor stopped without cancellation: deliver the tail, then end the stream.
    forwarder.catch_up().await;
    info!(slide_id = %forwarder.slide_id, cursor = forwarder.cursor, "Slide stream ended");
}
