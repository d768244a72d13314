/// Admission control for download requests.
///
/// Uses a tokio Semaphore to bound how many downloader processes run at once
/// and tracks every request it has seen for the /status command.
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, Semaphore, OwnedSemaphorePermit};
use tracing::{info, warn};
use chrono::Utc;
use uuid::Uuid;

/// Status of a tracked request.
#[derive(Debug, Clone)]
pub struct TrackedTask {
    pub request_id: Uuid,
    pub chat_id: i64,
    pub status: TaskState,
    pub enqueued_at: chrono::DateTime<Utc>,
    pub started_at: Option<chrono::DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskState {
    Queued,
    Running,
    Done,
    Failed,
}

/// Bounded download queue.
pub struct TaskQueue {
    semaphore: Arc<Semaphore>,
    /// Permits held by running requests.
    permits: Mutex<HashMap<Uuid, OwnedSemaphorePermit>>,
    tasks: Mutex<HashMap<Uuid, TrackedTask>>,
    max_concurrent: usize,
}

impl TaskQueue {
    pub fn new(max_concurrent: usize) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(max_concurrent)),
            permits: Mutex::new(HashMap::new()),
            tasks: Mutex::new(HashMap::new()),
            max_concurrent,
        }
    }

    /// Track a request. Returns false if it is already tracked.
    pub async fn enqueue(&self, request_id: Uuid, chat_id: i64) -> bool {
        let mut tasks = self.tasks.lock().await;
        if tasks.contains_key(&request_id) {
            warn!(%request_id, "request already queued");
            return false;
        }

        tasks.insert(request_id, TrackedTask {
            request_id,
            chat_id,
            status: TaskState::Queued,
            enqueued_at: Utc::now(),
            started_at: None,
        });
        info!(%request_id, chat_id, "request queued");
        true
    }

    /// Wait for a free download slot. Returns false if the queue was closed.
    pub async fn acquire(&self, request_id: Uuid) -> bool {
        let permit = match self.semaphore.clone().acquire_owned().await {
            Ok(p) => p,
            Err(_) => {
                warn!(%request_id, "download queue closed");
                return false;
            }
        };

        self.permits.lock().await.insert(request_id, permit);
        if let Some(task) = self.tasks.lock().await.get_mut(&request_id) {
            task.status = TaskState::Running;
            task.started_at = Some(Utc::now());
        }
        info!(%request_id, "download slot acquired");
        true
    }

    /// Mark a request done and release its slot.
    pub async fn complete(&self, request_id: Uuid) {
        self.finish(request_id, TaskState::Done).await;
    }

    /// Mark a request failed and release its slot (if it held one).
    pub async fn fail(&self, request_id: Uuid) {
        self.finish(request_id, TaskState::Failed).await;
    }

    async fn finish(&self, request_id: Uuid, state: TaskState) {
        if let Some(task) = self.tasks.lock().await.get_mut(&request_id) {
            task.status = state.clone();
        }
        let released = self.permits.lock().await.remove(&request_id).is_some();
        info!(%request_id, ?state, released, "request finished");
    }

    /// Stop handing out slots; pending `acquire` calls return false.
    pub fn close(&self) {
        self.semaphore.close();
    }

    /// Queued and running requests of one chat, oldest first.
    pub async fn active_for_chat(&self, chat_id: i64) -> Vec<TrackedTask> {
        let tasks = self.tasks.lock().await;
        let mut active: Vec<TrackedTask> = tasks
            .values()
            .filter(|t| t.chat_id == chat_id)
            .filter(|t| t.status == TaskState::Queued || t.status == TaskState::Running)
            .cloned()
            .collect();
        active.sort_by_key(|t| t.enqueued_at);
        active
    }

    pub async fn stats(&self) -> QueueStats {
        let tasks = self.tasks.lock().await;
        let running = self.permits.lock().await.len();
        QueueStats {
            max_concurrent: self.max_concurrent,
            running,
            queued: tasks.values().filter(|t| t.status == TaskState::Queued).count(),
            completed: tasks.values().filter(|t| t.status == TaskState::Done).count(),
            failed: tasks.values().filter(|t| t.status == TaskState::Failed).count(),
        }
    }

    /// Forget finished requests older than `max_age_secs`.
    pub async fn cleanup_old(&self, max_age_secs: i64) {
        let cutoff = Utc::now() - chrono::Duration::seconds(max_age_secs);
        let mut tasks = self.tasks.lock().await;
        tasks.retain(|_, t| {
            t.status == TaskState::Queued
                || t.status == TaskState::Running
                || t.enqueued_at > cutoff
        });
    }
}

/// Queue statistics snapshot.
#[derive(Debug, Clone)]
pub struct QueueStats {
    pub max_concurrent: usize,
    pub running: usize,
    pub queued: usize,
    pub completed: usize,
    pub failed: usize,
}
