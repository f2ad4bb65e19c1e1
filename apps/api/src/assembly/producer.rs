//! Producers — independent tasks that each fill one slice of a slide.
//!
//! Only the layout producer lives in this service. Content, visuals and charts arrive
//! as external contributions over HTTP, or from any other `Producer` implementation
//! handed to `PresentationSession::spawn_producer`.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use thiserror::Error;
use tracing::{debug, warn};

use crate::assembly::actor::SlideHandle;
use crate::assembly::cancellation::CancellationToken;
use crate::assembly::contribution::{Contribution, Payload, ProducerKind};
use crate::layout::engine::LayoutEngine;
use crate::layout::strategy::StrategyProvider;
use crate::layout::variety::PresentationContext;
use crate::models::slide::SlideInput;

#[derive(Debug, Error)]
pub enum ProducerError {
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("{0}")]
    Failed(String),

    #[error("cancelled")]
    Cancelled,
}

#[async_trait]
pub trait Producer: Send + Sync {
    fn kind(&self) -> ProducerKind;

    async fn produce(&self, slide: &SlideInput) -> Result<Payload, ProducerError>;
}

/// Runs the layout engine against the session's shared presentation context.
pub struct LayoutProducer {
    engine: LayoutEngine,
    strategy: Arc<dyn StrategyProvider>,
    context: Arc<Mutex<PresentationContext>>,
}

impl LayoutProducer {
    pub fn new(
        engine: LayoutEngine,
        strategy: Arc<dyn StrategyProvider>,
        context: Arc<Mutex<PresentationContext>>,
    ) -> Self {
        Self {
            engine,
            strategy,
            context,
        }
    }
}

#[async_trait]
impl Producer for LayoutProducer {
    fn kind(&self) -> ProducerKind {
        ProducerKind::Layout
    }

    async fn produce(&self, slide: &SlideInput) -> Result<Payload, ProducerError> {
        self.engine
            .layout_slide(slide, self.strategy.as_ref(), &self.context)
            .await
            .map(Payload::Layout)
            .map_err(|e| ProducerError::Failed(e.to_string()))
    }
}

/// Drives one producer to a single terminal contribution.
///
/// Expiry of `budget` becomes an error contribution. Cancellation sends nothing.
pub async fn run_producer(
    producer: Arc<dyn Producer>,
    slide: SlideInput,
    handle: SlideHandle,
    budget: Duration,
    cancel: CancellationToken,
) {
    let kind = producer.kind();
    let outcome = tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(ProducerError::Cancelled),
        result = tokio::time::timeout(budget, producer.produce(&slide)) => match result {
            Ok(inner) => inner,
            Err(_) => Err(ProducerError::Timeout(budget)),
        },
    };

    let contribution = match outcome {
        Ok(payload) if payload.producer() == kind => {
            Contribution::complete(&slide.slide_id, payload, Utc::now())
        }
        Ok(payload) => {
            warn!(
                slide_id = %slide.slide_id,
                producer = kind.name(),
                payload = payload.producer().name(),
                "Producer returned a payload it does not own"
            );
            Contribution::failed(&slide.slide_id, kind, "mismatched payload kind", Utc::now())
        }
        Err(ProducerError::Cancelled) => {
            debug!(slide_id = %slide.slide_id, producer = kind.name(), "Producer cancelled");
            return;
        }
        Err(e) => {
            warn!(
                slide_id = %slide.slide_id,
                producer = kind.name(),
                error = %e,
                "Producer failed; its fields fall back to defaults"
            );
            Contribution::failed(&slide.slide_id, kind, e.to_string(), Utc::now())
        }
    };

    if cancel.is_cancelled() {
        return;
    }
    if let Err(e) = handle.contribute(contribution).await {
        debug!(slide_id = %slide.slide_id, producer = kind.name(), error = %e, "Contribution dropped");
    }
}
