use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::AppError;
use crate::layout::refinement::FinalizedLayout;

/// The independent sources that feed a slide. Each owns a disjoint set of view fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProducerKind {
    Layout,
    Content,
    Visuals,
    Charts,
}

impl ProducerKind {
    pub fn name(&self) -> &'static str {
        match self {
            ProducerKind::Layout => "layout",
            ProducerKind::Content => "content",
            ProducerKind::Visuals => "visuals",
            ProducerKind::Charts => "charts",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContributionStatus {
    Pending,
    Complete,
    Error,
}

impl ContributionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ContributionStatus::Complete | ContributionStatus::Error)
    }
}

/// Producer output, tagged by kind. Maps are keyed by container id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub enum Payload {
    Layout(FinalizedLayout),
    Content { texts: BTreeMap<String, String> },
    Visuals { images: BTreeMap<String, String> },
    Charts { charts: BTreeMap<String, String> },
}

impl Payload {
    pub fn producer(&self) -> ProducerKind {
        match self {
            Payload::Layout(_) => ProducerKind::Layout,
            Payload::Content { .. } => ProducerKind::Content,
            Payload::Visuals { .. } => ProducerKind::Visuals,
            Payload::Charts { .. } => ProducerKind::Charts,
        }
    }
}

/// One message from a producer to a slide's assembly actor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Contribution {
    pub slide_id: String,
    pub producer: ProducerKind,
    pub status: ContributionStatus,
    #[serde(default)]
    pub payload: Option<Payload>,
    #[serde(default)]
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl Contribution {
    pub fn complete(slide_id: &str, payload: Payload, timestamp: DateTime<Utc>) -> Self {
        Self {
            slide_id: slide_id.to_string(),
            producer: payload.producer(),
            status: ContributionStatus::Complete,
            payload: Some(payload),
            error: None,
            timestamp,
        }
    }

    pub fn failed(
        slide_id: &str,
        producer: ProducerKind,
        message: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            slide_id: slide_id.to_string(),
            producer,
            status: ContributionStatus::Error,
            payload: None,
            error: Some(message.into()),
            timestamp,
        }
    }

    /// Rejects contributions whose payload cannot belong to the named producer.
    pub fn validate(&self) -> Result<(), AppError> {
        if self.slide_id.trim().is_empty() {
            return Err(AppError::Validation("slideId cannot be empty".to_string()));
        }
        if let Some(payload) = &self.payload {
            if payload.producer() != self.producer {
                return Err(AppError::Validation(format!(
                    "payload kind '{}' does not match producer '{}'",
                    payload.producer().name(),
                    self.producer.name()
                )));
            }
        }
        if self.status == ContributionStatus::Complete && self.payload.is_none() {
            return Err(AppError::Validation(format!(
                "complete contribution from '{}' carries no payload",
                self.producer.name()
            )));
        }
        Ok(())
    }
}

/// Latest accepted state of one producer for one slide.
#[derive(Debug, Clone, PartialEq)]
pub struct ProducerEntry {
    pub status: ContributionStatus,
    pub payload: Option<Payload>,
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl From<Contribution> for ProducerEntry {
    fn from(c: Contribution) -> Self {
        Self {
            status: c.status,
            payload: c.payload,
            error: c.error,
            timestamp: c.timestamp,
        }
    }
}
