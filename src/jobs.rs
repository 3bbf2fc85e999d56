use crate::generation::{
    GenerationError, GenerationOrchestrator, GenerationRequest, GenerationState, ProgressInfo,
    StateObserver, StatusKind,
};
use async_trait::async_trait;
use std::{
    collections::HashMap,
    sync::Arc,
    time::{Duration, Instant},
};
use tokio::{
    sync::{Mutex, mpsc},
    task::JoinHandle,
};
use tracing::{debug, error, warn};
use uuid::Uuid;

struct Entry {
    info: ProgressInfo,
    touched: Instant,
}

impl Entry {
    fn expired(&self, now: Instant, ttl: Duration) -> bool {
        self.info.status.is_terminal() && now.duration_since(self.touched) >= ttl
    }
}

/// Latest snapshot per processing id. Terminal snapshots are dropped once
/// they are older than `ttl`; running ones are kept.
#[derive(Clone)]
struct StatusStore {
    statuses: Arc<Mutex<HashMap<Uuid, Entry>>>,
    ttl: Duration,
}

impl StatusStore {
    fn new(ttl: Duration) -> Self {
        Self {
            statuses: Arc::new(Mutex::new(HashMap::new())),
            ttl,
        }
    }

    async fn get(&self, id: Uuid) -> Option<ProgressInfo> {
        let statuses = self.statuses.lock().await;
        statuses
            .get(&id)
            .filter(|entry| !entry.expired(Instant::now(), self.ttl))
            .map(|entry| entry.info.clone())
    }

    async fn remove(&self, id: Uuid) {
        self.statuses.lock().await.remove(&id);
    }

    #[cfg(test)]
    async fn len(&self) -> usize {
        self.statuses.lock().await.len()
    }
}

#[async_trait]
impl StateObserver for StatusStore {
    async fn observe(&self, info: ProgressInfo) {
        let now = Instant::now();
        let mut statuses = self.statuses.lock().await;
        let before = statuses.len();
        statuses.retain(|_, entry| !entry.expired(now, self.ttl));
        let evicted = before - statuses.len();
        if evicted > 0 {
            debug!(target = "hermes.jobs", evicted, "status_evicted");
        }
        statuses.insert(info.processing_id, Entry { info, touched: now });
    }
}

struct Job {
    id: Uuid,
    request: GenerationRequest,
}

/// Accepts generation requests and runs each on its own task.
#[derive(Clone)]
pub struct JobQueue {
    tx: mpsc::Sender<Job>,
    store: StatusStore,
}

impl JobQueue {
    pub fn spawn(
        orchestrator: Arc<GenerationOrchestrator>,
        capacity: usize,
        status_ttl: Duration,
    ) -> (Self, JoinHandle<()>) {
        let (tx, mut rx) = mpsc::channel::<Job>(capacity.max(1));
        let store = StatusStore::new(status_ttl);
        let store_bg = store.clone();

        let handle = tokio::spawn(async move {
            while let Some(job) = rx.recv().await {
                let orchestrator = orchestrator.clone();
                let store = store_bg.clone();
                tokio::spawn(async move {
                    let product_id = job.request.product_id.clone();
                    let result = orchestrator
                        .execute_with_id(job.id, job.request, &store)
                        .await;
                    if let Err(err) = result {
                        warn!(
                            target = "hermes.jobs",
                            processing_id = %job.id,
                            code = err.code(),
                            error = %err,
                            "generation_rejected"
                        );
                        store.observe(rejected(job.id, &product_id, &err)).await;
                    }
                });
            }
        });

        (Self { tx, store }, handle)
    }

    pub async fn enqueue(&self, request: GenerationRequest) -> Result<ProgressInfo, GenerationError> {
        let id = Uuid::new_v4();
        let pending = GenerationState::new(id, &request.product_id, Default::default()).progress_info();
        self.store.observe(pending.clone()).await;
        if self.tx.send(Job { id, request }).await.is_err() {
            self.store.remove(id).await;
            error!(target = "hermes.jobs", processing_id = %id, "queue_send_failed");
            return Err(GenerationError::Internal("generation worker not available".into()));
        }
        Ok(pending)
    }

    pub async fn get(&self, id: Uuid) -> Option<ProgressInfo> {
        self.store.get(id).await
    }
}

fn rejected(id: Uuid, product_id: &str, err: &GenerationError) -> ProgressInfo {
    ProgressInfo {
        status: StatusKind::Failed,
        error_code: Some(err.code().to_string()),
        error_message: Some(err.to_string()),
        estimated_remaining_seconds: 0,
        ..GenerationState::new(id, product_id, Default::default()).progress_info()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::testing::MockSuite;
    use crate::compliance::ComplianceValidator;
    use crate::generation::OrchestratorConfig;
    use crate::listing::ProductImage;
    use crate::progress::ProgressBroadcaster;

    fn queue(suite: &MockSuite) -> JobQueue {
        let orchestrator = GenerationOrchestrator::new(
            suite.collaborators(),
            Arc::new(ComplianceValidator::default()),
            ProgressBroadcaster::new(Duration::from_millis(50)),
            OrchestratorConfig::default(),
        );
        JobQueue::spawn(Arc::new(orchestrator), 8, Duration::from_secs(60)).0
    }

    fn request(prompt: &str) -> GenerationRequest {
        GenerationRequest {
            product_id: "P7".into(),
            images: vec![ProductImage {
                key: "front".into(),
                url: "https://cdn.example.com/front.jpg".into(),
                format: "jpg".into(),
                width: 800,
                height: 800,
            }],
            prompt: prompt.into(),
            category_hint: None,
            price_range: None,
            target_audience: None,
            regenerate: false,
        }
    }

    async fn wait_terminal(queue: &JobQueue, id: Uuid) -> ProgressInfo {
        for _ in 0..200 {
            if let Some(info) = queue.get(id).await
                && info.status.is_terminal()
            {
                return info;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("job {id} never finished");
    }

    #[tokio::test]
    async fn enqueued_job_is_pending_then_completes() {
        let suite = MockSuite::new();
        let queue = queue(&suite);
        let pending = queue.enqueue(request("Bicicleta rodado 26 usada")).await.unwrap();
        assert_eq!(pending.status, StatusKind::Pending);
        assert_eq!(pending.progress_percentage, 0.0);

        let done = wait_terminal(&queue, pending.processing_id).await;
        assert_eq!(done.status, StatusKind::Completed);
        assert_eq!(done.progress_percentage, 100.0);
        assert!(done.content_id.is_some());
    }

    #[tokio::test]
    async fn rejected_request_is_recorded_as_failed() {
        let suite = MockSuite::new();
        let queue = queue(&suite);
        let pending = queue.enqueue(request("   ")).await.unwrap();

        let done = wait_terminal(&queue, pending.processing_id).await;
        assert_eq!(done.status, StatusKind::Failed);
        assert_eq!(done.error_code.as_deref(), Some("INVALID_REQUEST"));
    }

    #[tokio::test]
    async fn unknown_ids_have_no_status() {
        let queue = queue(&MockSuite::new());
        assert!(queue.get(Uuid::new_v4()).await.is_none());
    }

    fn snapshot(status: StatusKind) -> ProgressInfo {
        ProgressInfo {
            status,
            ..GenerationState::new(Uuid::new_v4(), "P9", Default::default()).progress_info()
        }
    }

    #[tokio::test]
    async fn finished_snapshots_expire_but_running_ones_stay() {
        let store = StatusStore::new(Duration::from_millis(20));
        let done = snapshot(StatusKind::Completed);
        let failed = snapshot(StatusKind::Failed);
        let running = snapshot(StatusKind::Processing);
        for info in [&done, &failed, &running] {
            store.observe(info.clone()).await;
        }
        assert!(store.get(done.processing_id).await.is_some());

        tokio::time::sleep(Duration::from_millis(40)).await;
        assert!(store.get(done.processing_id).await.is_none());

        let fresh = snapshot(StatusKind::Pending);
        store.observe(fresh.clone()).await;
        assert_eq!(store.len().await, 2);
        assert!(store.get(running.processing_id).await.is_some());
        assert!(store.get(fresh.processing_id).await.is_some());
        assert!(store.get(failed.processing_id).await.is_none());
    }
}
