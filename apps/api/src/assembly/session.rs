//! Presentation sessions — one cancellation scope, one variety context, many slides.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info};
use uuid::Uuid;

use crate::assembly::actor::{spawn_slide_actor, SlideHandle, SlideSnapshot};
use crate::assembly::cancellation::CancellationSource;
use crate::assembly::contribution::{Contribution, ContributionStatus, ProducerKind};
use crate::assembly::event::UpdateEvent;
use crate::assembly::merge::SlideBase;
use crate::assembly::producer::{run_producer, LayoutProducer, Producer};
use crate::errors::AppError;
use crate::layout::engine::LayoutEngine;
use crate::layout::strategy::StrategyProvider;
use crate::layout::variety::PresentationContext;
use crate::models::slide::SlideInput;

#[derive(Debug, Clone, Copy)]
pub struct SessionSettings {
    pub producer_timeout: Duration,
    /// Bound of each subscriber's event channel.
    pub outbound_capacity: usize,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            producer_timeout: Duration::from_secs(30),
            outbound_capacity: 32,
        }
    }
}

pub struct PresentationSession {
    id: Uuid,
    created_at: DateTime<Utc>,
    engine: LayoutEngine,
    strategy: Arc<dyn StrategyProvider>,
    context: Arc<Mutex<PresentationContext>>,
    slides: Mutex<HashMap<String, SlideHandle>>,
    /// (slide, producer) pairs whose deadline is already running.
    deadlines: Mutex<HashSet<(String, ProducerKind)>>,
    settings: SessionSettings,
    cancel: CancellationSource,
}

impl PresentationSession {
    pub fn new(engine: LayoutEngine, strategy: Arc<dyn StrategyProvider>, settings: SessionSettings) -> Self {
        let context = Arc::new(Mutex::new(engine.new_context()));
        Self {
            id: Uuid::new_v4(),
            created_at: Utc::now(),
            engine,
            strategy,
            context,
            slides: Mutex::new(HashMap::new()),
            deadlines: Mutex::new(HashSet::new()),
            settings,
            cancel: CancellationSource::new(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Registers the slide base and starts its layout producer. Each of `expected` that
    /// has not finished within the producer timeout is failed, so its defaults apply.
    pub async fn register_slide(&self, input: SlideInput, expected: &[ProducerKind]) -> Result<(), AppError> {
        input.validate()?;
        let handle = self.slide_or_spawn(&input.slide_id)?;
        let base = SlideBase::from_input(&input, self.engine.default_positions(&input));
        handle.register(base).await?;

        for producer in expected {
            self.arm_deadline(&input.slide_id, *producer, &handle)?;
        }
        let producer = LayoutProducer::new(self.engine.clone(), self.strategy.clone(), self.context.clone());
        self.spawn_producer(Arc::new(producer), input)?;
        Ok(())
    }

    /// Routes one contribution to its slide's actor, creating the actor if needed.
    /// A producer's first `pending` report starts its deadline.
    pub async fn submit(&self, contribution: Contribution) -> Result<(), AppError> {
        contribution.validate()?;
        let handle = self.slide_or_spawn(&contribution.slide_id)?;
        if contribution.status == ContributionStatus::Pending {
            self.arm_deadline(&contribution.slide_id, contribution.producer, &handle)?;
        }
        handle.contribute(contribution).await
    }

    /// Starts the timeout for a producer that reports from outside this process.
    /// At most one deadline runs per slide and producer. The layout producer runs
    /// in-process under its own budget and is skipped.
    fn arm_deadline(&self, slide_id: &str, producer: ProducerKind, handle: &SlideHandle) -> Result<(), AppError> {
        if producer == ProducerKind::Layout {
            return Ok(());
        }
        let first = self
            .deadlines
            .lock()
            .map_err(|_| AppError::Internal(anyhow::anyhow!("deadline registry poisoned")))?
            .insert((slide_id.to_string(), producer));
        if !first {
            return Ok(());
        }

        let budget = self.settings.producer_timeout;
        let handle = handle.clone();
        let cancel = self.cancel.token();
        debug!(
            presentation_id = %self.id,
            slide_id = %slide_id,
            producer = producer.name(),
            budget_ms = budget.as_millis() as u64,
            "Producer deadline armed"
        );
        tokio::spawn(async move {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {}
                _ = tokio::time::sleep(budget) => {
                    let reason = format!("no result within {}ms", budget.as_millis());
                    if let Err(e) = handle.expire(producer, reason).await {
                        debug!(producer = producer.name(), error = %e, "Deadline fired after slide closed");
                    }
                }
            }
        });
        Ok(())
    }

    pub fn spawn_producer(
        &self,
        producer: Arc<dyn Producer>,
        input: SlideInput,
    ) -> Result<JoinHandle<()>, AppError> {
        let handle = self.slide_or_spawn(&input.slide_id)?;
        debug!(
            presentation_id = %self.id,
            slide_id = %input.slide_id,
            producer = producer.kind().name(),
            "Starting producer"
        );
        Ok(tokio::spawn(run_producer(
            producer,
            input,
            handle,
            self.settings.producer_timeout,
            self.cancel.token(),
        )))
    }

    pub async fn subscribe(&self, slide_id: &str, after: u64) -> Result<mpsc::Receiver<UpdateEvent>, AppError> {
        self.existing_slide(slide_id)?.subscribe(after).await
    }

    pub async fn snapshot(&self, slide_id: &str) -> Result<SlideSnapshot, AppError> {
        self.existing_slide(slide_id)?.snapshot().await
    }

    /// Cancels every producer, actor, deadline and forwarder of this session. Idempotent.
    pub fn close(&self) {
        if self.is_closed() {
            return;
        }
        self.cancel.cancel();
        if let Ok(mut slides) = self.slides.lock() {
            slides.clear();
        }
        if let Ok(mut deadlines) = self.deadlines.lock() {
            deadlines.clear();
        }
        info!(presentation_id = %self.id, "Presentation session closed");
    }

    fn ensure_open(&self) -> Result<(), AppError> {
        if self.is_closed() {
            return Err(AppError::SessionClosed(format!("presentation {} is closed", self.id)));
        }
        Ok(())
    }

    fn slide_or_spawn(&self, slide_id: &str) -> Result<SlideHandle, AppError> {
        self.ensure_open()?;
        let mut slides = self.lock_slides()?;
        let handle = slides
            .entry(slide_id.to_string())
            .or_insert_with(|| spawn_slide_actor(slide_id, self.settings.outbound_capacity, self.cancel.token()));
        Ok(handle.clone())
    }

    fn existing_slide(&self, slide_id: &str) -> Result<SlideHandle, AppError> {
        self.ensure_open()?;
        self.lock_slides()?
            .get(slide_id)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("slide '{slide_id}'")))
    }

    fn lock_slides(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, SlideHandle>>, AppError> {
        self.slides
            .lock()
            .map_err(|_| AppError::Internal(anyhow::anyhow!("slide registry poisoned")))
    }
}

/// All sessions of this process, keyed by presentation id. Closed sessions stay listed
/// so late requests get 410 rather than 404.
pub struct SessionRegistry {
    engine: LayoutEngine,
    strategy: Arc<dyn StrategyProvider>,
    settings: SessionSettings,
    sessions: RwLock<HashMap<Uuid, Arc<PresentationSession>>>,
}

impl SessionRegistry {
    pub fn new(engine: LayoutEngine, strategy: Arc<dyn StrategyProvider>, settings: SessionSettings) -> Self {
        Self {
            engine,
            strategy,
            settings,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    pub async fn open(&self) -> Arc<PresentationSession> {
        let session = Arc::new(PresentationSession::new(
            self.engine.clone(),
            self.strategy.clone(),
            self.settings,
        ));
        self.sessions.write().await.insert(session.id(), session.clone());
        info!(presentation_id = %session.id(), strategy = self.strategy.name(), "Presentation session opened");
        session
    }

    /// Open session by id. Unknown → 404, closed → 410.
    pub async fn get(&self, id: Uuid) -> Result<Arc<PresentationSession>, AppError> {
        let session = self
            .sessions
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("presentation {id}")))?;
        session.ensure_open()?;
        Ok(session)
    }

    pub async fn close(&self, id: Uuid) -> Result<(), AppError> {
        let session = self.get(id).await?;
        session.close();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assembly::contribution::Payload;
    use crate::assembly::merge::PLACEHOLDER_VISUAL;
    use crate::assembly::producer::ProducerError;
    use crate::layout::grid::LayoutConfig;
    use crate::layout::strategy::HeuristicStrategyProvider;
    use crate::models::slide::{ContainerRole, Importance, SemanticContainer, SlideHints};
    use async_trait::async_trait;
    use std::collections::BTreeMap;

    struct StalledVisuals;

    #[async_trait]
    impl Producer for StalledVisuals {
        fn kind(&self) -> ProducerKind {
            ProducerKind::Visuals
        }

        async fn produce(&self, _slide: &SlideInput) -> Result<Payload, ProducerError> {
            std::future::pending().await
        }
    }

    fn registry(timeout: Duration) -> SessionRegistry {
        SessionRegistry::new(
            LayoutEngine::new(LayoutConfig::default()),
            Arc::new(HeuristicStrategyProvider),
            SessionSettings {
                producer_timeout: timeout,
                outbound_capacity: 8,
            },
        )
    }

    fn slide(id: &str) -> SlideInput {
        SlideInput {
            slide_id: id.into(),
            containers: vec![
                SemanticContainer {
                    id: "title".into(),
                    role: ContainerRole::Headline,
                    hierarchy_level: 1,
                    importance: Importance::Critical,
                    visual_weight: 0.5,
                },
                SemanticContainer {
                    id: "photo".into(),
                    role: ContainerRole::VisualElement,
                    hierarchy_level: 2,
                    importance: Importance::High,
                    visual_weight: 0.5,
                },
            ],
            hints: SlideHints::default(),
            base_text: BTreeMap::from([("title".to_string(), "Roadmap".to_string())]),
            theme: None,
        }
    }

    async fn wait_for<F>(session: &PresentationSession, slide_id: &str, done: F) -> SlideSnapshot
    where
        F: Fn(&SlideSnapshot) -> bool,
    {
        for _ in 0..200 {
            let snapshot = session.snapshot(slide_id).await.unwrap();
            if done(&snapshot) {
                return snapshot;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("slide {slide_id} never reached the expected state");
    }

    #[tokio::test]
    async fn test_layout_success_with_visuals_timeout() {
        let registry = registry(Duration::from_millis(50));
        let session = registry.open().await;
        session.register_slide(slide("s1"), &[]).await.unwrap();
        session.spawn_producer(Arc::new(StalledVisuals), slide("s1")).unwrap();

        let snapshot = wait_for(&session, "s1", |s| {
            s.view.white_space_ratio.is_some() && s.view.fallbacks.contains(&ProducerKind::Visuals)
        })
        .await;

        let photo = snapshot.view.container("photo").unwrap();
        assert!(photo.position.is_some());
        assert_eq!(photo.content_ref(), Some(PLACEHOLDER_VISUAL));
        let title = snapshot.view.container("title").unwrap();
        assert!(title.position.is_some());
        assert_eq!(title.text.as_deref(), Some("Roadmap"));
        assert!(!snapshot.view.fallbacks.contains(&ProducerKind::Layout));
        assert!(snapshot.view.layout_quality.is_some());
    }

    #[tokio::test]
    async fn test_register_twice_conflicts() {
        let registry = registry(Duration::from_secs(5));
        let session = registry.open().await;
        session.register_slide(slide("s1"), &[]).await.unwrap();
        let again = session.register_slide(slide("s1"), &[]).await;
        assert!(matches!(again, Err(AppError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_closed_session_is_gone() {
        let registry = registry(Duration::from_secs(5));
        let session = registry.open().await;
        let id = session.id();
        registry.close(id).await.unwrap();

        assert!(matches!(registry.get(id).await, Err(AppError::SessionClosed(_))));
        assert!(matches!(registry.get(Uuid::new_v4()).await, Err(AppError::NotFound(_))));
        let late = session
            .submit(Contribution::failed("s1", ProducerKind::Charts, "late", Utc::now()))
            .await;
        assert!(matches!(late, Err(AppError::SessionClosed(_))));
    }

    #[tokio::test]
    async fn test_slides_progress_independently() {
        let registry = registry(Duration::from_secs(5));
        let session = registry.open().await;
        session.register_slide(slide("a"), &[]).await.unwrap();
        session.register_slide(slide("b"), &[]).await.unwrap();
        session
            .submit(Contribution::failed("a", ProducerKind::Charts, "renderer down", Utc::now()))
            .await
            .unwrap();

        let b = wait_for(&session, "b", |s| s.view.white_space_ratio.is_some()).await;
        assert!(b.view.fallbacks.is_empty());
        let a = wait_for(&session, "a", |s| s.view.fallbacks.contains(&ProducerKind::Charts)).await;
        assert_eq!(a.view.container("title").unwrap().text.as_deref(), Some("Roadmap"));
    }

    #[tokio::test]
    async fn test_unknown_slide_not_found() {
        let registry = registry(Duration::from_secs(5));
        let session = registry.open().await;
        assert!(matches!(session.snapshot("nope").await, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_expected_producer_that_never_reports_falls_back() {
        let registry = registry(Duration::from_millis(50));
        let session = registry.open().await;
        session.register_slide(slide("s1"), &[ProducerKind::Visuals]).await.unwrap();

        let snapshot = wait_for(&session, "s1", |s| s.view.fallbacks.contains(&ProducerKind::Visuals)).await;
        assert_eq!(snapshot.producers[&ProducerKind::Visuals], ContributionStatus::Error);
        assert_eq!(
            snapshot.view.container("photo").unwrap().content_ref(),
            Some(PLACEHOLDER_VISUAL)
        );
    }

    #[tokio::test]
    async fn test_pending_report_arms_deadline_and_late_result_wins() {
        let registry = registry(Duration::from_millis(50));
        let session = registry.open().await;
        session.register_slide(slide("s1"), &[]).await.unwrap();
        let mut pending = Contribution::failed("s1", ProducerKind::Charts, "", Utc::now());
        pending.status = ContributionStatus::Pending;
        pending.error = None;
        session.submit(pending).await.unwrap();

        wait_for(&session, "s1", |s| s.view.fallbacks.contains(&ProducerKind::Charts)).await;

        let chart = Contribution::complete(
            "s1",
            Payload::Charts {
                charts: BTreeMap::from([("photo".to_string(), "chart://q3".to_string())]),
            },
            Utc::now() + chrono::Duration::seconds(1),
        );
        session.submit(chart).await.unwrap();
        let snapshot = wait_for(&session, "s1", |s| !s.view.fallbacks.contains(&ProducerKind::Charts)).await;
        assert_eq!(snapshot.view.container("photo").unwrap().content_ref(), Some("chart://q3"));
    }

    #[tokio::test]
    async fn test_finished_producer_is_not_expired() {
        let registry = registry(Duration::from_millis(30));
        let session = registry.open().await;
        session.register_slide(slide("s1"), &[ProducerKind::Content]).await.unwrap();
        let texts = Payload::Content {
            texts: BTreeMap::from([("title".to_string(), "Roadmap 2027".to_string())]),
        };
        session.submit(Contribution::complete("s1", texts, Utc::now())).await.unwrap();

        tokio::time::sleep(Duration::from_millis(120)).await;
        let snapshot = session.snapshot("s1").await.unwrap();
        assert_eq!(snapshot.producers[&ProducerKind::Content], ContributionStatus::Complete);
        assert!(!snapshot.view.fallbacks.contains(&ProducerKind::Content));
    }
}
